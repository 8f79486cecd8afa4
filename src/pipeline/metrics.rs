// src/pipeline/metrics.rs
//
// Run counters shared between the frame loop and the telemetry tasks.
// Cloning shares the counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub frames_processed: Arc<AtomicU64>,
    pub person_detections: Arc<AtomicU64>,
    pub people_registered: Arc<AtomicU64>,
    pub people_evicted: Arc<AtomicU64>,
    pub passengers_entered: Arc<AtomicU64>,
    pub alerts_fired: Arc<AtomicU64>,
    pub detector_failures: Arc<AtomicU64>,
    pub events_dropped: Arc<AtomicU64>,
    pub publish_successes: Arc<AtomicU64>,
    pub publish_failures: Arc<AtomicU64>,
    pub authority_failures: Arc<AtomicU64>,
    pub detector_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: Arc::new(AtomicU64::new(0)),
            person_detections: Arc::new(AtomicU64::new(0)),
            people_registered: Arc::new(AtomicU64::new(0)),
            people_evicted: Arc::new(AtomicU64::new(0)),
            passengers_entered: Arc::new(AtomicU64::new(0)),
            alerts_fired: Arc::new(AtomicU64::new(0)),
            detector_failures: Arc::new(AtomicU64::new(0)),
            events_dropped: Arc::new(AtomicU64::new(0)),
            publish_successes: Arc::new(AtomicU64::new(0)),
            publish_failures: Arc::new(AtomicU64::new(0)),
            authority_failures: Arc::new(AtomicU64::new(0)),
            detector_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSummary {
            frames_processed: load(&self.frames_processed),
            fps: self.fps(),
            person_detections: load(&self.person_detections),
            people_registered: load(&self.people_registered),
            people_evicted: load(&self.people_evicted),
            passengers_entered: load(&self.passengers_entered),
            alerts_fired: load(&self.alerts_fired),
            detector_failures: load(&self.detector_failures),
            events_dropped: load(&self.events_dropped),
            publish_successes: load(&self.publish_successes),
            publish_failures: load(&self.publish_failures),
            authority_failures: load(&self.authority_failures),
            last_detector_us: load(&self.detector_time_us),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }

    pub fn log_report(&self) {
        let s = self.summary();
        info!("═══════════════════════════════════════════");
        info!("📊 RUN REPORT");
        info!(
            "  Frames:       {} ({:.1} FPS over {:.1}s)",
            s.frames_processed, s.fps, s.elapsed_secs
        );
        info!(
            "  Detections:   {} person boxes, {} detector failures",
            s.person_detections, s.detector_failures
        );
        info!(
            "  Tracking:     {} registered, {} evicted",
            s.people_registered, s.people_evicted
        );
        info!(
            "  Counting:     {} entered, {} alerts",
            s.passengers_entered, s.alerts_fired
        );
        info!(
            "  Telemetry:    {} ok, {} failed, {} authority failures, {} dropped",
            s.publish_successes, s.publish_failures, s.authority_failures, s.events_dropped
        );
        info!("═══════════════════════════════════════════");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_processed: u64,
    pub fps: f64,
    pub person_detections: u64,
    pub people_registered: u64,
    pub people_evicted: u64,
    pub passengers_entered: u64,
    pub alerts_fired: u64,
    pub detector_failures: u64,
    pub events_dropped: u64,
    pub publish_successes: u64,
    pub publish_failures: u64,
    pub authority_failures: u64,
    pub last_detector_us: u64,
    pub elapsed_secs: f64,
}
