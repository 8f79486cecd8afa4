// src/transport/dispatcher.rs
//
// Background telemetry. The frame loop hands events over with a
// non-blocking `try_send`; one task publishes them in order and, on a
// timer, publishes the latest occupancy snapshot. Nothing here can stall
// counting: a full queue drops the event, a failed publish is logged.
//
// Shutdown: a stop signal discards whatever is still queued and stops the
// status timer. A closed queue (source exhausted) is drained first.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::Transport;
use crate::alerts::{AuthorityNotice, Stamped, StatusReport, TelemetryEvent};
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::session::CountSnapshot;
use crate::types::TransportConfig;

/// Frame-loop side of the telemetry queue.
#[derive(Clone)]
pub struct TelemetrySender {
    tx: mpsc::Sender<Stamped<TelemetryEvent>>,
    metrics: PipelineMetrics,
}

impl TelemetrySender {
    /// Timestamp the event now and queue it. Never blocks.
    pub fn emit(&self, event: TelemetryEvent) {
        match self.tx.try_send(Stamped::now(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "⚠️  Telemetry queue full, dropping {} event",
                    dropped.body.name()
                );
                self.metrics.inc(&self.metrics.events_dropped);
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(
                    "Telemetry stopped, {} event not sent",
                    dropped.body.name()
                );
                self.metrics.inc(&self.metrics.events_dropped);
            }
        }
    }
}

pub struct TelemetryTask {
    handle: JoinHandle<()>,
}

impl TelemetryTask {
    /// Wait for the queue to drain (or be discarded) and the transport to close.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            error!("Telemetry task failed: {}", e);
        }
    }
}

struct Topics {
    main: String,
    authorities: String,
}

pub fn spawn<T: Transport>(
    transport: T,
    config: &TransportConfig,
    counts: watch::Receiver<CountSnapshot>,
    shutdown: watch::Receiver<bool>,
    metrics: PipelineMetrics,
) -> (TelemetrySender, TelemetryTask) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let topics = Topics {
        main: config.topic.clone(),
        authorities: config.authorities_topic.clone(),
    };
    let period = Duration::from_secs(config.publish_interval_secs.max(1));
    let sender = TelemetrySender {
        tx,
        metrics: metrics.clone(),
    };

    let handle = tokio::spawn(async move {
        info!(
            "📡 Telemetry via {} → {} (status every {}s)",
            transport.name(),
            topics.main,
            period.as_secs()
        );

        tokio::join!(
            dispatch_events(&transport, &topics, rx, shutdown.clone(), &metrics),
            publish_status(&transport, &topics.main, counts, shutdown, period, &metrics),
        );

        match transport.close().await {
            Ok(()) => info!("📡 Telemetry transport closed"),
            Err(e) => warn!("📡 Closing {} transport failed: {}", transport.name(), e),
        }
    });

    (sender, TelemetryTask { handle })
}

/// Resolves once the stop flag is set. A dropped sender never stops anything.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

async fn dispatch_events<T: Transport>(
    transport: &T,
    topics: &Topics,
    mut rx: mpsc::Receiver<Stamped<TelemetryEvent>>,
    mut shutdown: watch::Receiver<bool>,
    metrics: &PipelineMetrics,
) {
    loop {
        let stamped = tokio::select! {
            biased;
            _ = wait_for_stop(&mut shutdown) => {
                rx.close();
                let mut discarded = 0u64;
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    warn!("🛑 Shutdown: discarding {} queued telemetry events", discarded);
                    metrics.add(&metrics.events_dropped, discarded);
                }
                break;
            }
            next = rx.recv() => match next {
                Some(stamped) => stamped,
                None => break,
            },
        };

        publish_event(transport, topics, stamped, &shutdown, metrics).await;
    }
}

async fn publish_event<T: Transport>(
    transport: &T,
    topics: &Topics,
    stamped: Stamped<TelemetryEvent>,
    shutdown: &watch::Receiver<bool>,
    metrics: &PipelineMetrics,
) {
    let name = stamped.body.name();

    let result = match stamped.to_json() {
        Ok(payload) => transport.publish(&topics.main, payload).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => {
            metrics.inc(&metrics.publish_successes);
            debug!("📡 Published {}", name);
        }
        Err(e) => {
            metrics.inc(&metrics.publish_failures);
            warn!("📡 {} publish failed: {}", name, e);
        }
    }

    // Authorities hear about alerts whatever happened on the main topic
    if let Some(notice) = stamped.body.authority_notice() {
        if stopping(shutdown) {
            return;
        }
        notify_authorities(
            transport,
            &topics.authorities,
            Stamped::at(notice, stamped.timestamp),
            metrics,
        )
        .await;
    }
}

/// Best effort. Failures are logged and counted, never returned.
async fn notify_authorities<T: Transport>(
    transport: &T,
    topic: &str,
    notice: Stamped<AuthorityNotice>,
    metrics: &PipelineMetrics,
) {
    let result = match notice.to_json() {
        Ok(payload) => transport.publish(topic, payload).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => {
            metrics.inc(&metrics.publish_successes);
            info!("🚨 Authorities notified: {}", notice.body.event);
        }
        Err(e) => {
            metrics.inc(&metrics.authority_failures);
            warn!("🚨 Authority notification ({}) failed: {}", notice.body.event, e);
        }
    }
}

async fn publish_status<T: Transport>(
    transport: &T,
    topic: &str,
    mut counts: watch::Receiver<CountSnapshot>,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
    metrics: &PipelineMetrics,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut shutdown) => break,
            _ = ticker.tick() => {
                // Copy out; the borrow must not live across the publish
                let snapshot = *counts.borrow_and_update();
                let report = Stamped::now(StatusReport { count: snapshot.count_inside });
                let result = match report.to_json() {
                    Ok(payload) => transport.publish(topic, payload).await,
                    Err(e) => Err(e.into()),
                };
                match result {
                    Ok(()) => {
                        metrics.inc(&metrics.publish_successes);
                        debug!("📡 Status published: {} inside", snapshot.count_inside);
                    }
                    Err(e) => {
                        metrics.inc(&metrics.publish_failures);
                        warn!("📡 Status publish failed: {}", e);
                    }
                }
            }
            // Frame loop gone: nothing left to report
            changed = counts.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
