//! Raw `getStats()` records as handed over by a snapshot provider.
//!
//! Every record is tagged by its `type` field. The few types the collector
//! normalizes get their own structured variant, everything else is kept as
//! [`OtherStats`] so the snapshot can be re-emitted verbatim. Fields that a
//! variant does not model are preserved in its `extra` map.

use std::collections::{BTreeMap, HashMap};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::*;

pub const OUTBOUND_RTP: &str = "outbound-rtp";
pub const INBOUND_RTP: &str = "inbound-rtp";
pub const CANDIDATE_PAIR: &str = "candidate-pair";
pub const CODEC: &str = "codec";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Stats record is not an object: {0}")]
    NotAnObject(Value),

    #[error("Stats record has no \"type\" field")]
    MissingType,

    #[error("Invalid {stats_type:?} stats record: {source}")]
    InvalidRecord {
        stats_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stats report must be an array or an object, got: {0}")]
    InvalidReport(Value),

    #[error("Malformed stats report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRtpStats {
    pub id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_bitrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmitted_packets_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retransmitted_bytes_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_per_second: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_sent: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_limitation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_limitation_durations: Option<BTreeMap<String, f64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRtpStats {
    pub id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_buffer_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_buffer_emitted_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<u64>,
    /// Signed: the estimate goes negative when duplicates outnumber losses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_lost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_frames_decoded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_decoded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_dropped: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_per_second: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_received: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePairStats {
    pub id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_round_trip_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_round_trip_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_outgoing_bitrate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_incoming_bitrate: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecStats {
    pub id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Any record type the collector does not normalize (certificate, transport, track...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherStats {
    pub id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(skip)]
    pub stats_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    OutboundRtp(OutboundRtpStats),
    InboundRtp(InboundRtpStats),
    CandidatePair(CandidatePairStats),
    Codec(CodecStats),
    Other(OtherStats),
}

impl RawRecord {
    pub fn id(&self) -> &str {
        match self {
            Self::OutboundRtp(stats) => &stats.id,
            Self::InboundRtp(stats) => &stats.id,
            Self::CandidatePair(stats) => &stats.id,
            Self::Codec(stats) => &stats.id,
            Self::Other(stats) => &stats.id,
        }
    }

    pub fn stats_type(&self) -> &str {
        match self {
            Self::OutboundRtp(_) => OUTBOUND_RTP,
            Self::InboundRtp(_) => INBOUND_RTP,
            Self::CandidatePair(_) => CANDIDATE_PAIR,
            Self::Codec(_) => CODEC,
            Self::Other(stats) => &stats.stats_type,
        }
    }

    /// The declared `kind` and `mediaType` of the record, whatever its type.
    pub fn media_hints(&self) -> (Option<&str>, Option<&str>) {
        fn from_extra(extra: &Map<String, Value>) -> (Option<&str>, Option<&str>) {
            (
                extra.get("kind").and_then(Value::as_str),
                extra.get("mediaType").and_then(Value::as_str),
            )
        }

        match self {
            Self::OutboundRtp(stats) => (stats.kind.as_deref(), stats.media_type.as_deref()),
            Self::InboundRtp(stats) => (stats.kind.as_deref(), stats.media_type.as_deref()),
            Self::CandidatePair(stats) => from_extra(&stats.extra),
            Self::Codec(stats) => from_extra(&stats.extra),
            Self::Other(stats) => from_extra(&stats.extra),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = match self {
            Self::OutboundRtp(stats) => serde_json::to_value(stats)?,
            Self::InboundRtp(stats) => serde_json::to_value(stats)?,
            Self::CandidatePair(stats) => serde_json::to_value(stats)?,
            Self::Codec(stats) => serde_json::to_value(stats)?,
            Self::Other(stats) => serde_json::to_value(stats)?,
        };

        if let Value::Object(map) = &mut value {
            map.insert("type".into(), Value::String(self.stats_type().to_string()));
        }

        Ok(value)
    }

    /// Splits the `type` discriminator off a raw record.
    fn split(value: Value) -> Result<(String, Value), ParseError> {
        let Value::Object(mut map) = value else {
            return Err(ParseError::NotAnObject(value));
        };

        match map.remove("type") {
            Some(Value::String(stats_type)) => Ok((stats_type, Value::Object(map))),
            _ => Err(ParseError::MissingType),
        }
    }

    fn parse(stats_type: &str, record: &Value) -> Result<Self, ParseError> {
        fn typed<T: de::DeserializeOwned>(
            stats_type: &str,
            record: &Value,
        ) -> Result<T, ParseError> {
            T::deserialize(record).map_err(|source| ParseError::InvalidRecord {
                stats_type: stats_type.to_string(),
                source,
            })
        }

        let record = match stats_type {
            OUTBOUND_RTP => Self::OutboundRtp(typed(stats_type, record)?),
            INBOUND_RTP => Self::InboundRtp(typed(stats_type, record)?),
            CANDIDATE_PAIR => Self::CandidatePair(typed(stats_type, record)?),
            CODEC => Self::Codec(typed(stats_type, record)?),
            _ => Self::opaque(stats_type, record)?,
        };

        Ok(record)
    }

    fn opaque(stats_type: &str, record: &Value) -> Result<Self, ParseError> {
        let mut other = OtherStats::deserialize(record).map_err(|source| {
            ParseError::InvalidRecord {
                stats_type: stats_type.to_string(),
                source,
            }
        })?;
        other.stats_type = stats_type.to_string();

        Ok(Self::Other(other))
    }

    /// Same as [`TryFrom`], except that a record whose fields don't fit its
    /// type's structure is kept as [`RawRecord::Other`], so it is still
    /// available verbatim but never normalized.
    pub fn from_value_lossy(value: Value) -> Result<Self, ParseError> {
        let (stats_type, record) = Self::split(value)?;

        match Self::parse(&stats_type, &record) {
            Err(error)
                if matches!(
                    stats_type.as_str(),
                    OUTBOUND_RTP | INBOUND_RTP | CANDIDATE_PAIR | CODEC
                ) =>
            {
                warn!("{error}. Keeping it as an opaque record");
                Self::opaque(&stats_type, &record)
            }
            parsed => parsed,
        }
    }
}

impl TryFrom<Value> for RawRecord {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let (stats_type, record) = Self::split(value)?;
        Self::parse(&stats_type, &record)
    }
}

impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(de::Error::custom)
    }
}

/// One point-in-time report: records keyed by id, in provider order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    records: Vec<RawRecord>,
    /// Position of every id in `records`.
    index: HashMap<String, usize>,
}

impl RawSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing (in place) a previous record with the same id.
    pub fn insert(&mut self, record: RawRecord) -> Option<RawRecord> {
        if let Some(&position) = self.index.get(record.id()) {
            return Some(std::mem::replace(&mut self.records[position], record));
        }

        self.index.insert(record.id().to_string(), self.records.len());
        self.records.push(record);
        None
    }

    pub fn get(&self, id: &str) -> Option<&RawRecord> {
        self.records.get(*self.index.get(id)?)
    }

    pub fn codec(&self, id: &str) -> Option<&CodecStats> {
        match self.get(id)? {
            RawRecord::Codec(codec) => Some(codec),
            _ => None,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Accepts either an array of records or an object keyed by record id.
    ///
    /// Only a report that is neither is an error: a single record that can't
    /// be used is logged and dropped without affecting the others.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let values: Vec<Value> = match value {
            Value::Array(values) => values,
            Value::Object(map) => map.into_iter().map(|(_id, record)| record).collect(),
            other => return Err(ParseError::InvalidReport(other)),
        };

        let mut snapshot = Self::new();
        for value in values {
            match RawRecord::from_value_lossy(value) {
                Ok(record) => {
                    snapshot.insert(record);
                }
                Err(error) => warn!("Dropping stats record: {error}"),
            }
        }

        Ok(snapshot)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ParseError> {
        Self::from_value(serde_json::from_str(json)?)
    }
}

impl FromIterator<RawRecord> for RawSnapshot {
    fn from_iter<I: IntoIterator<Item = RawRecord>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

impl<'a> IntoIterator for &'a RawSnapshot {
    type Item = &'a RawRecord;
    type IntoIter = std::slice::Iter<'a, RawRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for RawSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.iter())
    }
}

impl<'de> Deserialize<'de> for RawSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}
