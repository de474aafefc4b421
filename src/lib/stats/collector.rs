use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::*;

use crate::provider::SnapshotProvider;

use super::{
    classifier::{classify, Category},
    normalizer,
    path_selector,
    raw::{RawRecord, RawSnapshot},
    types::{Notification, StatsEvent},
};

pub const DEFAULT_INTERVAL_MS: u64 = 1000;
const NOTIFICATION_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorOptions {
    /// Collection interval in milliseconds, 0 means the default.
    #[serde(rename = "getStatsInterval")]
    pub interval_ms: u64,
    /// Attach the raw report to every event.
    pub include_raw_stats: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            include_raw_stats: false,
        }
    }
}

impl CollectorOptions {
    pub fn interval(&self) -> Duration {
        match self.interval_ms {
            0 => Duration::from_millis(DEFAULT_INTERVAL_MS),
            interval_ms => Duration::from_millis(interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("Problem collecting the WebRTC statistics - {0}")]
    Fetch(String),
}

/// Builds one cycle's event out of a report and the previous cycle's event.
///
/// Every record is handled on its own: records that cannot be classified or
/// that carry no fresh sample are left out without affecting the others.
pub fn assemble(
    snapshot: RawSnapshot,
    last: Option<&StatsEvent>,
    include_raw_stats: bool,
    timestamp: String,
) -> StatsEvent {
    let mut event = StatsEvent {
        timestamp,
        ..Default::default()
    };

    for record in &snapshot {
        match (classify(record), record) {
            (Category::OutboundAudio, RawRecord::OutboundRtp(entry)) => {
                let last = last.and_then(|last| {
                    last.output
                        .audio
                        .iter()
                        .find(|audio| audio.base.id == entry.id)
                });
                if let Some(audio) = normalizer::outbound_audio(&snapshot, entry, last) {
                    event.output.audio.push(audio);
                }
            }
            (Category::OutboundVideo, RawRecord::OutboundRtp(entry)) => {
                let last = last.and_then(|last| {
                    last.output
                        .video
                        .iter()
                        .find(|video| video.base.id == entry.id)
                });
                if let Some(video) = normalizer::outbound_video(&snapshot, entry, last) {
                    event.output.video.push(video);
                }
            }
            (Category::InboundAudio, RawRecord::InboundRtp(entry)) => {
                let last = last.and_then(|last| {
                    last.input
                        .audio
                        .iter()
                        .find(|audio| audio.base.id == entry.id)
                });
                if let Some(audio) = normalizer::inbound_audio(&snapshot, entry, last) {
                    event.input.audio.push(audio);
                }
            }
            (Category::InboundVideo, RawRecord::InboundRtp(entry)) => {
                let last = last.and_then(|last| {
                    last.input
                        .video
                        .iter()
                        .find(|video| video.base.id == entry.id)
                });
                if let Some(video) = normalizer::inbound_video(&snapshot, entry, last) {
                    event.input.video.push(video);
                }
            }
            (Category::ConnectivityPath, RawRecord::CandidatePair(entry)) => {
                path_selector::apply(entry, &mut event);
            }
            (category, record) => {
                trace!(
                    "Ignoring {:?} record {:?} ({category:?})",
                    record.stats_type(),
                    record.id()
                );
            }
        }
    }

    if include_raw_stats {
        event.raw_stats = Some(snapshot);
    }

    event
}

/// Same format as javascript's `Date.toISOString()`.
fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        "snapshot provider panicked".to_string()
    }
}

/// Last published event of a run, the reference for the next cycle's deltas.
#[derive(Default)]
struct Baseline {
    /// Bumped by every start. Only cycles of the same run may replace the event.
    generation: u64,
    last_stats: Option<Arc<StatsEvent>>,
}

struct Shared {
    provider: Arc<dyn SnapshotProvider>,
    include_raw_stats: bool,
    baseline: ArcSwap<Baseline>,
    sender: broadcast::Sender<Notification>,
}

impl Shared {
    async fn cycle(&self, generation: u64) -> Result<Arc<StatsEvent>, CollectError> {
        trace!("Requesting WebRTC statistics...");
        let started = tokio::time::Instant::now();

        let snapshot = match AssertUnwindSafe(self.provider.snapshot())
            .catch_unwind()
            .await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(error)) => return Err(self.publish_error(format!("{error:#}"))),
            Err(panic) => return Err(self.publish_error(panic_reason(panic.as_ref()))),
        };
        let timestamp = now_iso8601();

        let last = {
            let baseline = self.baseline.load();
            (baseline.generation == generation)
                .then(|| baseline.last_stats.clone())
                .flatten()
        };
        let event = Arc::new(assemble(
            snapshot,
            last.as_deref(),
            self.include_raw_stats,
            timestamp,
        ));

        debug!(
            "Collected WebRTC statistics in {:?}: {} outbound audio, {} outbound video, {} inbound audio, {} inbound video",
            started.elapsed(),
            event.output.audio.len(),
            event.output.video.len(),
            event.input.audio.len(),
            event.input.video.len(),
        );

        if !self.keep_as_baseline(generation, &event) {
            debug!("Collection restarted while this cycle was running, not keeping it as baseline");
        }

        let _ = self.sender.send(Notification::Stats(event.clone()));

        Ok(event)
    }

    /// Replaces the baseline, unless a restart happened since `generation` began.
    /// The check and the swap are a single atomic update.
    fn keep_as_baseline(&self, generation: u64, event: &Arc<StatsEvent>) -> bool {
        let mut kept = false;
        self.baseline.rcu(|baseline| {
            kept = baseline.generation == generation;
            if kept {
                Arc::new(Baseline {
                    generation,
                    last_stats: Some(event.clone()),
                })
            } else {
                baseline.clone()
            }
        });
        kept
    }

    fn publish_error(&self, reason: String) -> CollectError {
        let error = CollectError::Fetch(reason);
        error!("{error}");

        let _ = self.sender.send(Notification::Error(error.to_string()));

        error
    }
}

/// Periodically polls a [`SnapshotProvider`] and publishes normalized [`StatsEvent`]s.
///
/// Must be started from within a tokio runtime.
pub struct StatsCollector {
    interval: Duration,
    shared: Arc<Shared>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for StatsCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl StatsCollector {
    pub fn new(options: CollectorOptions, provider: impl SnapshotProvider + 'static) -> Self {
        Self::with_provider(options, Arc::new(provider))
    }

    pub fn with_provider(options: CollectorOptions, provider: Arc<dyn SnapshotProvider>) -> Self {
        let (sender, _receiver) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            interval: options.interval(),
            shared: Arc::new(Shared {
                provider,
                include_raw_stats: options.include_raw_stats,
                baseline: ArcSwap::from_pointee(Baseline::default()),
                sender,
            }),
            timer: None,
        }
    }

    /// Receives every result and error notification published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.shared.sender.subscribe()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Starts, or restarts, the collection. Deltas are never computed against
    /// anything collected before this call.
    #[instrument(level = "debug", skip(self), fields(interval = ?self.interval))]
    pub fn start(&mut self) {
        info!("WebRTC statistics collection is starting...");

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let generation = self.shared.baseline.load().generation + 1;
        self.shared.baseline.store(Arc::new(Baseline {
            generation,
            last_stats: None,
        }));

        let span = span!(Level::DEBUG, "StatsCollector timer", generation);
        self.timer = Some(tokio::spawn(
            Self::timer(self.shared.clone(), self.interval, generation).instrument(span),
        ));
    }

    /// Cancels future cycles. A cycle already waiting on the provider still completes.
    #[instrument(level = "debug", skip(self))]
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            info!("WebRTC statistics collection has stopped.");
        }
    }

    /// Runs a single cycle right away, publishing its outcome like a timer tick would.
    #[instrument(level = "debug", skip(self))]
    pub async fn collect_once(&self) -> Result<Arc<StatsEvent>, CollectError> {
        let generation = self.shared.baseline.load().generation;
        self.shared.cycle(generation).await
    }

    /// The baseline the next cycle will compute its deltas against.
    pub fn last_stats(&self) -> Option<Arc<StatsEvent>> {
        self.shared.baseline.load().last_stats.clone()
    }

    async fn timer(shared: Arc<Shared>, interval: Duration, generation: u64) {
        debug!("timer started!");

        loop {
            tokio::time::sleep(interval).await;

            // Cycles are not serialized: a slow provider may overlap with the next tick.
            let shared = shared.clone();
            tokio::spawn(
                async move {
                    let _ = shared.cycle(generation).await;
                }
                .instrument(span!(Level::TRACE, "StatsCollector cycle")),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use serial_test::serial;
    use tracing_test::traced_test;

    use super::*;
    use crate::provider::ProviderFn;

    #[test]
    fn options_defaults() {
        let options = CollectorOptions::default();
        assert_eq!(options.interval(), Duration::from_secs(1));
        assert!(!options.include_raw_stats);

        let options = CollectorOptions {
            interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(options.interval(), Duration::from_secs(1));
    }

    #[test]
    fn options_from_json() {
        let options: CollectorOptions =
            serde_json::from_value(json!({"getStatsInterval": 250, "includeRawStats": true}))
                .unwrap();
        assert_eq!(options.interval(), Duration::from_millis(250));
        assert!(options.include_raw_stats);

        let options: CollectorOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, CollectorOptions::default());
    }

    #[test]
    fn iso8601_timestamp() {
        let timestamp = now_iso8601();
        assert!(timestamp.ends_with('Z'), "{timestamp}");
        assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
    }

    fn report(timestamp: f64, bytes: u64, packets: u64) -> RawSnapshot {
        RawSnapshot::from_value(json!([
            {
                "id": "OT01A1",
                "type": "outbound-rtp",
                "timestamp": timestamp,
                "kind": "audio",
                "bytesSent": bytes,
                "packetsSent": packets
            },
            {"id": "CERT01", "type": "certificate", "timestamp": timestamp},
            {"id": "RIA01", "type": "remote-inbound-rtp", "timestamp": timestamp, "kind": "audio"},
            {"id": "OT01X1", "type": "outbound-rtp", "timestamp": timestamp, "kind": "data"},
            {
                "id": "RTCInboundRTPVideoStream_01",
                "type": "inbound-rtp",
                "timestamp": timestamp,
                "bytesReceived": bytes
            },
            {
                "id": "CP01",
                "type": "candidate-pair",
                "timestamp": timestamp,
                "nominated": true,
                "currentRoundTripTime": 0.05
            },
            {
                "id": "CP02",
                "type": "candidate-pair",
                "timestamp": timestamp,
                "nominated": false,
                "currentRoundTripTime": 9.0
            }
        ]))
        .unwrap()
    }

    #[test]
    fn assemble_dispatches_by_category() {
        let event = assemble(report(1000.0, 1000, 10), None, false, "now".into());

        assert_eq!(event.timestamp, "now");
        assert_eq!(event.output.audio.len(), 1);
        assert!(event.output.video.is_empty());
        assert!(event.input.audio.is_empty());
        assert_eq!(event.input.video.len(), 1);
        assert_eq!(event.input.video[0].base.id, "RTCInboundRTPVideoStream_01");
        assert_eq!(event.current_round_trip_time, Some(0.05));
        assert_eq!(event.raw_stats, None);
    }

    #[test]
    fn assemble_against_last_event() {
        let first = assemble(report(1000.0, 1000, 10), None, false, "first".into());
        let second = assemble(report(2000.0, 2000, 20), Some(&first), true, "second".into());

        let audio = &second.output.audio[0].base;
        assert_eq!(audio.bitrate, 1000.0);
        assert_eq!(audio.packet_rate, 10.0);
        assert_eq!(audio.bytes_sent_delta, Some(1000));
        assert_eq!(audio.packets_sent_delta, Some(10));
        assert_eq!(second.input.video[0].base.bitrate, 1000.0);
        assert_eq!(second.raw_stats.as_ref().map(RawSnapshot::len), Some(7));

        let third = assemble(report(2000.0, 2000, 20), Some(&second), false, "third".into());
        assert!(third.output.audio.is_empty());
        assert!(third.input.video.is_empty());
        assert_eq!(third.current_round_trip_time, Some(0.05));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    #[serial]
    async fn lifecycle_is_logged() {
        let mut collector = StatsCollector::new(
            CollectorOptions {
                interval_ms: 10,
                ..Default::default()
            },
            ProviderFn(|| async {
                Err::<RawSnapshot, _>(anyhow::anyhow!("getStats is not available"))
            }),
        );

        collector.start();
        tokio::time::sleep(Duration::from_millis(15)).await;
        collector.stop();

        assert!(logs_contain("WebRTC statistics collection is starting"));
        assert!(logs_contain(
            "Problem collecting the WebRTC statistics - getStats is not available"
        ));
        assert!(logs_contain("WebRTC statistics collection has stopped"));
    }

    #[traced_test]
    #[tokio::test]
    #[serial]
    async fn stop_without_start_is_silent() {
        let mut collector = StatsCollector::new(
            CollectorOptions::default(),
            ProviderFn(|| async { anyhow::Ok(RawSnapshot::new()) }),
        );

        collector.stop();
        assert!(!collector.is_running());
        assert!(!logs_contain("WebRTC statistics collection has stopped"));

        let event = collector.collect_once().await.unwrap();
        assert!(event.output.audio.is_empty());
        assert_eq!(collector.last_stats(), Some(event));
    }

    #[tokio::test]
    async fn previous_run_never_replaces_the_baseline() {
        let mut collector = StatsCollector::new(
            CollectorOptions::default(),
            ProviderFn(|| async { anyhow::Ok(RawSnapshot::new()) }),
        );
        let event = Arc::new(StatsEvent {
            timestamp: "first run".into(),
            ..Default::default()
        });

        collector.start();
        let first_run = collector.shared.baseline.load().generation;
        assert!(collector.shared.keep_as_baseline(first_run, &event));
        assert_eq!(collector.last_stats(), Some(event.clone()));

        collector.start();
        assert!(collector.last_stats().is_none());
        assert!(!collector.shared.keep_as_baseline(first_run, &event));
        assert!(collector.last_stats().is_none());

        collector.stop();
    }
}
