// src/pipeline/driver.rs
//
// The per-frame loop. Single writer for the tracker, the run session and
// the alert latches; everything outside sees snapshots or queued events.
//
// Per frame:
//   detect -> person filter -> tracker.update -> crossings -> alerts
//   -> drain event bus -> telemetry queue, counts snapshot

use anyhow::{bail, Context, Result};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::event_bus::{EventBus, PipelineEvent};
use super::metrics::PipelineMetrics;
use super::session::{CountSnapshot, DashboardSnapshot, RunSession};
use crate::alerts::{AlertKind, AlertStateMachine, LatchState, SafetyHooks, TelemetryEvent};
use crate::detector::{person_boxes, Detector};
use crate::source::{Frame, FrameSource};
use crate::tracking::{CentroidTracker, CrossingDetector};
use crate::transport::TelemetrySender;
use crate::types::Config;

const PROGRESS_EVERY: u64 = 300;

/// Where the loop's results go.
pub struct DriverOutputs {
    /// `None` when telemetry is disabled or the transport never connected
    pub telemetry: Option<TelemetrySender>,
    pub counts: watch::Sender<CountSnapshot>,
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub events: Vec<PipelineEvent>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub frames: u64,
    pub counts: CountSnapshot,
    pub dashboard: DashboardSnapshot,
    pub low_occupancy_alert: LatchState,
    pub door_close_alert: LatchState,
    pub door_alerts: u64,
    pub stopped_by_signal: bool,
}

/// Pull the first frame. No frame, or a zero-sized one, aborts the run.
pub fn read_first_frame(source: &mut dyn FrameSource) -> Result<Frame> {
    let frame = source
        .next_frame()
        .with_context(|| format!("Cannot read from source {}", source.describe()))?;
    match frame {
        Some(frame) if !frame.is_empty() => Ok(frame),
        Some(frame) => bail!(
            "First frame from {} is empty ({}x{})",
            source.describe(),
            frame.width,
            frame.height
        ),
        None => bail!("Source {} produced no frames", source.describe()),
    }
}

pub struct PipelineDriver {
    tracker: CentroidTracker,
    crossing: CrossingDetector,
    alerts: AlertStateMachine,
    session: RunSession,
    safety: SafetyHooks,
    bus: EventBus,
    metrics: PipelineMetrics,
    person_class_id: u32,
    frames: u64,
    resolution_warned: bool,
}

impl PipelineDriver {
    /// The counting line is pinned to `first_frame`'s width for the whole run.
    pub fn new(config: &Config, first_frame: &Frame, metrics: PipelineMetrics) -> Result<Self> {
        if first_frame.is_empty() {
            bail!(
                "Cannot place counting line on an empty frame ({}x{})",
                first_frame.width,
                first_frame.height
            );
        }

        let crossing = CrossingDetector::new(&config.counting, first_frame.width);
        info!(
            "📏 Counting line at x={:.0} ({:.0}% of {}px)",
            crossing.line().x(),
            config.counting.line_position * 100.0,
            first_frame.width
        );

        Ok(Self {
            tracker: CentroidTracker::new(config.tracking.clone()),
            crossing,
            alerts: AlertStateMachine::new(config.alerts.clone()),
            session: RunSession::new(config.alerts.capacity),
            safety: SafetyHooks::new(config.safety.clone()),
            bus: EventBus::new(),
            metrics,
            person_class_id: config.detector.person_class_id,
            frames: 0,
            resolution_warned: false,
        })
    }

    #[cfg(test)]
    pub fn session(&self) -> &RunSession {
        &self.session
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &CentroidTracker {
        &self.tracker
    }

    #[cfg(test)]
    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }

    /// Run one frame through every stage. Events come back only once the
    /// whole frame has been evaluated.
    pub fn process_frame(&mut self, frame: &Frame, detector: &mut dyn Detector) -> FrameReport {
        self.frames += 1;
        self.metrics.inc(&self.metrics.frames_processed);
        self.check_resolution(frame);

        let started = Instant::now();
        let detections = match detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("⚠️  Frame {}: {} detector failed: {:#}", frame.index, detector.name(), e);
                self.metrics.inc(&self.metrics.detector_failures);
                return FrameReport {
                    frame_index: frame.index,
                    events: Vec::new(),
                };
            }
        };
        self.metrics.set_timing(
            &self.metrics.detector_time_us,
            started.elapsed().as_micros() as u64,
        );

        let boxes = person_boxes(&detections, self.person_class_id);
        self.metrics.add(&self.metrics.person_detections, boxes.len() as u64);

        let update = self.tracker.update(&boxes);
        self.metrics.add(&self.metrics.people_registered, update.registered.len() as u64);
        self.metrics.add(&self.metrics.people_evicted, update.evicted.len() as u64);
        debug!(
            "Frame {}: {} boxes, {} matched, {} new, {} gone",
            frame.index,
            boxes.len(),
            update.matched,
            update.registered.len(),
            update.evicted.len()
        );

        for crossing in self.crossing.evaluate(&mut self.tracker, &mut self.session) {
            self.metrics.inc(&self.metrics.passengers_entered);
            self.bus.publish(PipelineEvent::PassengerEntered(crossing));
        }

        for alert in self.alerts.evaluate(self.session.counts()) {
            if matches!(alert, TelemetryEvent::DoorClose { .. }) {
                self.safety.door_alert();
            }
            self.metrics.inc(&self.metrics.alerts_fired);
            self.bus.publish(PipelineEvent::Alert(alert));
        }

        if frame.index % PROGRESS_EVERY == 0 {
            let counts = self.session.counts();
            info!(
                "Frame {}: {} tracked, {} entered, {} inside",
                frame.index,
                self.tracker.len(),
                counts.total_entered,
                counts.count_inside
            );
        }

        FrameReport {
            frame_index: frame.index,
            events: self.bus.drain(),
        }
    }

    fn check_resolution(&mut self, frame: &Frame) {
        let pinned = self.crossing.line().frame_width();
        if frame.width != pinned && !self.resolution_warned {
            warn!(
                "⚠️  Frame {} is {}px wide, counting line stays pinned to the first frame ({}px)",
                frame.index, frame.width, pinned
            );
            self.resolution_warned = true;
        }
    }

    /// Drive the loop until the source runs dry, a read fails, or `shutdown`
    /// flips. The frame in flight when the signal arrives is completed.
    pub fn run(
        mut self,
        first_frame: Frame,
        source: &mut dyn FrameSource,
        detector: &mut dyn Detector,
        outputs: DriverOutputs,
        shutdown: watch::Receiver<bool>,
    ) -> RunSummary {
        info!("▶️  Processing {} with {} detector", source.describe(), detector.name());

        let mut frame = first_frame;
        let mut stopped_by_signal = false;

        loop {
            let report = self.process_frame(&frame, detector);

            for event in &report.events {
                if let Some(telemetry) = &outputs.telemetry {
                    telemetry.emit(event.telemetry());
                }
            }

            let counts = self.session.counts();
            outputs.counts.send_if_modified(|current| {
                if *current == counts {
                    return false;
                }
                *current = counts;
                true
            });

            if *shutdown.borrow() {
                info!("🛑 Stop requested, finished frame {}", report.frame_index);
                stopped_by_signal = true;
                break;
            }

            frame = match source.next_frame() {
                Ok(Some(next)) => next,
                Ok(None) => {
                    info!("⏹️  Source exhausted after {} frames", self.frames);
                    break;
                }
                Err(e) => {
                    error!("❌ Reading {} failed: {:#}", source.describe(), e);
                    break;
                }
            };
            debug!("Frame {} read", frame.index);
        }

        if !self.tracker.is_empty() {
            debug!(
                "End of run: {} live identities ({} counted), {} allocated",
                self.tracker.len(),
                self.tracker.people().filter(|p| p.entered()).count(),
                self.tracker.next_id()
            );
        }

        RunSummary {
            frames: self.frames,
            counts: self.session.counts(),
            dashboard: self.session.dashboard(),
            low_occupancy_alert: self.alerts.state(AlertKind::LowOccupancy),
            door_close_alert: self.alerts.state(AlertKind::DoorClose),
            door_alerts: self.safety.door_alerts(),
            stopped_by_signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::RawDetection;
    use crate::pipeline::session::OccupancyStatus;
    use crate::source::replay::{ReplayDetector, ReplaySource};
    use crate::source::FrameData;
    use crate::types::{BoundingBox, DetectorConfig};
    use std::collections::VecDeque;

    struct VecSource {
        frames: VecDeque<Frame>,
    }

    impl VecSource {
        fn new(frames: Vec<Frame>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(self.frames.pop_front())
        }

        fn describe(&self) -> String {
            "vec".to_string()
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
            bail!("model exploded")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// 500px wide: the default line lands at x=400.
    fn frame_sized(index: u64, width: u32, xs: &[f32]) -> Frame {
        let detections = xs
            .iter()
            .map(|x| RawDetection {
                bbox: BoundingBox::new(x - 20.0, 100.0, x + 20.0, 300.0),
                confidence: 0.9,
                class_id: 0,
            })
            .collect();
        Frame {
            index,
            width,
            height: 400,
            data: FrameData::Recorded(detections),
        }
    }

    fn frame(index: u64, xs: &[f32]) -> Frame {
        frame_sized(index, 500, xs)
    }

    /// People walk through one at a time: in at 350, across at 420, gone.
    fn walkers(count: u64) -> Vec<Frame> {
        let mut frames = Vec::new();
        for i in 0..count {
            frames.push(frame(i * 3 + 1, &[350.0]));
            frames.push(frame(i * 3 + 2, &[420.0]));
            frames.push(frame(i * 3 + 3, &[]));
        }
        frames
    }

    fn sequential_config() -> Config {
        let mut config = Config::default();
        config.tracking.max_disappeared = 0;
        config
    }

    fn outputs() -> (DriverOutputs, watch::Receiver<CountSnapshot>) {
        let (counts, counts_rx) = watch::channel(CountSnapshot::default());
        (
            DriverOutputs {
                telemetry: None,
                counts,
            },
            counts_rx,
        )
    }

    #[test]
    fn test_crossing_and_first_alert_surface_in_same_frame() {
        let mut config = Config::default();
        config.tracking.max_distance = 400.0;
        let first = frame(1, &[100.0]);
        let mut driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        let mut detector = ReplayDetector::new(&DetectorConfig::default());

        assert!(driver.process_frame(&first, &mut detector).events.is_empty());
        assert!(driver
            .process_frame(&frame(2, &[395.0]), &mut detector)
            .events
            .is_empty());

        let report = driver.process_frame(&frame(3, &[405.0]), &mut detector);
        let telemetry: Vec<TelemetryEvent> = report.events.iter().map(|e| e.telemetry()).collect();
        assert_eq!(
            telemetry,
            vec![
                TelemetryEvent::PassengerEntered { total_entered: 1 },
                TelemetryEvent::BusFull {
                    message: Config::default().alerts.low_occupancy_message,
                    count_inside: 1,
                },
            ]
        );

        let report = driver.process_frame(&frame(4, &[398.0]), &mut detector);
        assert!(report.events.is_empty());
        assert_eq!(driver.session().counts().total_entered, 1);
        assert_eq!(driver.tracker().next_id(), 1);
    }

    #[test]
    fn test_ten_boardings_close_the_door_once() {
        let config = sequential_config();
        let mut frames = walkers(12);
        let first = frames.remove(0);
        let metrics = PipelineMetrics::new();
        let driver = PipelineDriver::new(&config, &first, metrics.clone()).unwrap();

        let mut source = VecSource::new(frames);
        let mut detector = ReplayDetector::new(&config.detector);
        let (outputs, counts_rx) = outputs();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let summary = driver.run(first, &mut source, &mut detector, outputs, stop_rx);

        assert_eq!(summary.frames, 36);
        assert_eq!(summary.counts.total_entered, 12);
        assert_eq!(summary.counts.count_inside, 12);
        assert_eq!(summary.dashboard.status, OccupancyStatus::Full);
        assert!(!summary.stopped_by_signal);
        assert_eq!(summary.door_close_alert, LatchState::Sent);
        // Ten boardings close the door; the two after it must not sound it again
        assert_eq!(summary.door_alerts, 1);
        assert_eq!(*counts_rx.borrow(), summary.counts);

        let report = metrics.summary();
        assert_eq!(report.passengers_entered, 12);
        // One low-occupancy alert, one door-close alert
        assert_eq!(report.alerts_fired, 2);
        assert_eq!(report.people_registered, 12);
    }

    #[test]
    fn test_latches_end_run_as_sent() {
        let config = sequential_config();
        let frames = walkers(10);
        let first = frames[0].clone();
        let mut driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        let mut detector = ReplayDetector::new(&config.detector);

        let mut door_close_frames = Vec::new();
        for f in &frames {
            let report = driver.process_frame(f, &mut detector);
            if report
                .events
                .iter()
                .any(|e| matches!(e, PipelineEvent::Alert(TelemetryEvent::DoorClose { .. })))
            {
                door_close_frames.push(f.index);
            }
        }

        assert_eq!(door_close_frames, vec![29]);
        assert_eq!(driver.alerts().state(AlertKind::DoorClose), LatchState::Sent);
        assert_eq!(driver.alerts().state(AlertKind::LowOccupancy), LatchState::Sent);
    }

    #[test]
    fn test_first_frame_is_tracked_not_just_measured() {
        let config = Config::default();
        let first = frame(1, &[390.0]);
        let metrics = PipelineMetrics::new();
        let driver = PipelineDriver::new(&config, &first, metrics.clone()).unwrap();
        let mut source = VecSource::new(vec![frame(2, &[420.0]), frame(3, &[440.0])]);
        let mut detector = ReplayDetector::new(&config.detector);
        let (outputs, _counts_rx) = outputs();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let summary = driver.run(first, &mut source, &mut detector, outputs, stop_rx);

        // The person seen in frame 1 keeps id 0 and their first step crosses
        assert_eq!(summary.frames, 3);
        assert_eq!(metrics.summary().people_registered, 1);
        assert_eq!(summary.counts.total_entered, 1);
    }

    #[test]
    fn test_first_frame_detections_take_the_first_id() {
        let config = Config::default();
        let first = frame(1, &[100.0, 250.0]);
        let mut driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        let mut detector = ReplayDetector::new(&config.detector);

        driver.process_frame(&first, &mut detector);
        assert_eq!(driver.tracker().next_id(), 2);

        driver.process_frame(&frame(2, &[110.0, 260.0, 450.0]), &mut detector);
        let ids: Vec<u64> = driver.tracker().people().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(driver.tracker().get(0).unwrap().centroid.x, 110.0);
    }

    #[test]
    fn test_stop_signal_finishes_in_flight_frame_only() {
        let config = Config::default();
        let first = frame(1, &[390.0]);
        let driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        let mut source = VecSource::new(vec![frame(2, &[420.0]), frame(3, &[430.0])]);
        let mut detector = ReplayDetector::new(&config.detector);
        let (outputs, _counts_rx) = outputs();
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let summary = driver.run(first, &mut source, &mut detector, outputs, stop_rx);
        assert_eq!(summary.frames, 1);
        assert!(summary.stopped_by_signal);
        assert_eq!(source.frames.len(), 2);
    }

    #[test]
    fn test_line_stays_pinned_when_resolution_changes() {
        let config = Config::default();
        let first = frame(1, &[350.0]);
        let mut driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        let mut detector = ReplayDetector::new(&config.detector);

        driver.process_frame(&first, &mut detector);
        // 1000px wide frame would put the line at 800, but 400 still applies
        let report = driver.process_frame(&frame_sized(2, 1000, &[420.0]), &mut detector);
        assert!(matches!(
            report.events.first(),
            Some(PipelineEvent::PassengerEntered(_))
        ));
    }

    #[test]
    fn test_detector_failure_skips_frame() {
        let config = Config::default();
        let first = frame(1, &[350.0]);
        let metrics = PipelineMetrics::new();
        let mut driver = PipelineDriver::new(&config, &first, metrics.clone()).unwrap();

        let report = driver.process_frame(&first, &mut FailingDetector);
        assert!(report.events.is_empty());
        assert!(driver.tracker().is_empty());
        assert_eq!(metrics.summary().detector_failures, 1);
        assert_eq!(metrics.summary().frames_processed, 1);
    }

    #[test]
    fn test_non_person_detections_ignored() {
        let config = Config::default();
        let first = Frame {
            index: 1,
            width: 500,
            height: 400,
            data: FrameData::Recorded(vec![RawDetection {
                bbox: BoundingBox::new(330.0, 100.0, 370.0, 300.0),
                confidence: 0.9,
                class_id: 2,
            }]),
        };
        let mut driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        let mut detector = ReplayDetector::new(&config.detector);
        driver.process_frame(&first, &mut detector);
        assert!(driver.tracker().is_empty());
    }

    #[test]
    fn test_demo_replay_counts_every_walker() {
        let config = Config::default();
        let mut source = ReplaySource::open("demos/passenger_video.jsonl").unwrap();
        let first = read_first_frame(&mut source).unwrap();
        let driver = PipelineDriver::new(&config, &first, PipelineMetrics::new()).unwrap();
        assert_eq!(driver.crossing.line().x(), 512.0);

        let mut detector = ReplayDetector::new(&config.detector);
        let (outputs, _counts_rx) = outputs();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let summary = driver.run(first, &mut source, &mut detector, outputs, stop_rx);

        assert_eq!(summary.frames, 332);
        assert_eq!(summary.counts.total_entered, 12);
        assert_eq!(summary.low_occupancy_alert, LatchState::Sent);
        assert_eq!(summary.door_close_alert, LatchState::Sent);
    }

    #[test]
    fn test_first_frame_requirements() {
        let mut empty = VecSource::new(vec![]);
        assert!(read_first_frame(&mut empty).is_err());

        let mut zero = VecSource::new(vec![frame_sized(1, 0, &[])]);
        assert!(read_first_frame(&mut zero).is_err());

        let mut ok = VecSource::new(vec![frame(1, &[])]);
        assert_eq!(read_first_frame(&mut ok).unwrap().width, 500);

        assert!(PipelineDriver::new(
            &Config::default(),
            &frame_sized(1, 0, &[]),
            PipelineMetrics::new()
        )
        .is_err());
    }
}
