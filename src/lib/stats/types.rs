use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::raw::RawSnapshot;

/// Why the encoder is currently limiting the outgoing resolution or framerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum QualityLimitationReason {
    #[default]
    None,
    Cpu,
    Bandwidth,
    Other,
}

impl QualityLimitationReason {
    /// Unknown or missing reasons map to [`QualityLimitationReason::None`].
    pub fn from_raw(reason: Option<&str>) -> Self {
        reason
            .and_then(|reason| reason.parse().ok())
            .unwrap_or_default()
    }
}

impl std::str::FromStr for QualityLimitationReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "cpu" => Ok(Self::Cpu),
            "bandwidth" => Ok(Self::Bandwidth),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "unknown quality limitation reason: {other:?} (expected none|cpu|bandwidth|other)"
            )),
        }
    }
}

/// Fields shared by both sent stream shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct OutboundBase {
    pub id: String,
    /// Milliseconds since the UNIX epoch, as reported by the provider.
    pub timestamp: f64,
    /// Media stream "identification-tag" negotiated in the SDP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Bytes per second since the previous collection.
    pub bitrate: f64,
    /// Packets per second since the previous collection.
    pub packet_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes_sent: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent_delta: Option<i64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_packets_sent: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_sent_delta: Option<i64>,
    /// Current encoder target in bits per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_bitrate: Option<f64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmitted_packets_sent: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmitted_packets_sent_delta: Option<i64>,
    /// Payload bytes only.
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmitted_bytes_sent: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmitted_bytes_sent_delta: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct OutputAudio {
    #[serde(flatten)]
    pub base: OutboundBase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct OutputVideo {
    #[serde(flatten)]
    pub base: OutboundBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
    /// Encoded frames during the last second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_per_second: Option<f64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_sent: Option<u64>,
    pub quality_limitation_reason: QualityLimitationReason,
    /// Seconds spent in each limitation state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_limitation_durations: Option<BTreeMap<String, f64>>,
}

/// Fields shared by both received stream shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InboundBase {
    pub id: String,
    /// Milliseconds since the UNIX epoch, as reported by the provider.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_identifier: Option<String>,
    /// Bytes per second since the previous collection.
    pub bitrate: f64,
    /// Packets per second since the previous collection.
    pub packet_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Packet jitter in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    /// Sum of the time, in seconds, each sample or frame spent in the jitter buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_buffer_delay: Option<f64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_buffer_emitted_count: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes_received: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_packets_received: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_packets_lost: Option<i64>,
    pub packet_loss_ratio: f64,
    #[ts(type = "number")]
    pub packet_loss_delta: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InputAudio {
    #[serde(flatten)]
    pub base: InboundBase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InputVideo {
    #[serde(flatten)]
    pub base: InboundBase,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_frames_decoded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_decoded: Option<u64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_dropped: Option<u64>,
    /// Decoded frames during the last second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_per_second: Option<f64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_received: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct AudioVideoCollect<A, V> {
    pub audio: Vec<A>,
    pub video: Vec<V>,
}

impl<A, V> Default for AudioVideoCollect<A, V> {
    fn default() -> Self {
        Self {
            audio: Vec::new(),
            video: Vec::new(),
        }
    }
}

/// Everything collected during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StatsEvent {
    /// Collection time, ISO 8601 in UTC.
    pub timestamp: String,
    pub input: AudioVideoCollect<InputAudio, InputVideo>,
    pub output: AudioVideoCollect<OutputAudio, OutputVideo>,
    #[ts(type = "Array<Record<string, unknown>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_stats: Option<RawSnapshot>,
    /// Sum of all STUN round trip times, in seconds, since the session started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_round_trip_time: Option<f64>,
    #[ts(type = "number")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses_received: Option<u64>,
    /// Latest STUN round trip time, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_round_trip_time: Option<f64>,
    /// Bits per second the congestion control allows for all outgoing RTP streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_outgoing_bitrate: Option<f64>,
    /// Bits per second the congestion control allows for all incoming RTP streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_incoming_bitrate: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Notification {
    Stats(Arc<StatsEvent>),
    Error(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn quality_limitation_reason_parsing() {
        assert_eq!(
            QualityLimitationReason::from_raw(Some("bandwidth")),
            QualityLimitationReason::Bandwidth
        );
        assert_eq!(
            QualityLimitationReason::from_raw(Some("cpu")),
            QualityLimitationReason::Cpu
        );
        assert_eq!(
            QualityLimitationReason::from_raw(Some("thermal")),
            QualityLimitationReason::None
        );
        assert_eq!(
            QualityLimitationReason::from_raw(None),
            QualityLimitationReason::None
        );
    }

    #[test]
    fn event_serializes_in_camel_case_without_absent_fields() {
        let event = StatsEvent {
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            output: AudioVideoCollect {
                audio: vec![],
                video: vec![OutputVideo {
                    base: OutboundBase {
                        id: "OT01V".into(),
                        timestamp: 1000.0,
                        bitrate: 10.0,
                        total_bytes_sent: Some(10),
                        ..Default::default()
                    },
                    quality_limitation_reason: QualityLimitationReason::Cpu,
                    ..Default::default()
                }],
            },
            current_round_trip_time: Some(0.07),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "timestamp": "2024-01-01T00:00:00.000Z",
                "input": {"audio": [], "video": []},
                "output": {
                    "audio": [],
                    "video": [{
                        "id": "OT01V",
                        "timestamp": 1000.0,
                        "bitrate": 10.0,
                        "packetRate": 0.0,
                        "totalBytesSent": 10,
                        "qualityLimitationReason": "cpu"
                    }]
                },
                "currentRoundTripTime": 0.07
            })
        );
    }

    #[test]
    fn typescript_declarations() {
        let decl = QualityLimitationReason::decl();
        assert!(decl.contains("\"bandwidth\""), "{decl}");

        let decl = StatsEvent::decl();
        assert!(decl.contains("rawStats"), "{decl}");
        assert!(decl.contains("Array<Record<string, unknown>>"), "{decl}");
        assert!(decl.contains("currentRoundTripTime"), "{decl}");

        let decl = InputAudio::decl();
        assert!(decl.contains("packetLossRatio: number"), "{decl}");
    }
}
