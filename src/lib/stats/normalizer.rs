use tracing::*;

use super::{
    calculator::{loss_ratio, rate},
    raw::{InboundRtpStats, OutboundRtpStats, RawSnapshot},
    types::{
        InboundBase, InputAudio, InputVideo, OutboundBase, OutputAudio, OutputVideo,
        QualityLimitationReason,
    },
};

/// A previous sample is only a valid baseline if the new one is strictly newer.
/// Providers may hand back a cached report, which must not produce a zero rate.
fn is_stale(timestamp: f64, last_timestamp: Option<f64>) -> bool {
    last_timestamp.is_some_and(|last_timestamp| timestamp <= last_timestamp)
}

/// Change of a cumulative counter since the last sample of the same stream.
/// Without a previous sample there is no baseline and the delta is 0.
/// Counters come straight from the provider, so the difference saturates.
fn delta<L>(
    current: Option<i64>,
    last: Option<&L>,
    last_value: impl Fn(&L) -> Option<i64>,
) -> Option<i64> {
    let current = current?;
    match last {
        Some(last) => Some(current.saturating_sub(last_value(last).unwrap_or(0))),
        None => Some(0),
    }
}

/// Counters above `i64::MAX` saturate; browsers never get anywhere close.
fn signed(counter: Option<u64>) -> Option<i64> {
    counter.map(|counter| i64::try_from(counter).unwrap_or(i64::MAX))
}

fn mime_type(snapshot: &RawSnapshot, codec_id: Option<&str>) -> Option<String> {
    snapshot.codec(codec_id?)?.mime_type.clone()
}

fn outbound_base(
    snapshot: &RawSnapshot,
    entry: &OutboundRtpStats,
    last: Option<&OutboundBase>,
) -> OutboundBase {
    let last_timestamp = last.map(|last| last.timestamp);
    let counter_rate = |value: Option<u64>, last_value: Option<u64>| {
        value
            .map(|value| rate(entry.timestamp, value, last_timestamp, last_value))
            .unwrap_or_default()
    };

    OutboundBase {
        id: entry.id.clone(),
        timestamp: entry.timestamp,
        mid: entry.mid.clone(),
        bitrate: counter_rate(entry.bytes_sent, last.and_then(|last| last.total_bytes_sent)),
        packet_rate: counter_rate(
            entry.packets_sent,
            last.and_then(|last| last.total_packets_sent),
        ),
        mime_type: mime_type(snapshot, entry.codec_id.as_deref()),
        total_bytes_sent: entry.bytes_sent,
        bytes_sent_delta: delta(signed(entry.bytes_sent), last, |last| {
            signed(last.total_bytes_sent)
        }),
        total_packets_sent: entry.packets_sent,
        packets_sent_delta: delta(signed(entry.packets_sent), last, |last| {
            signed(last.total_packets_sent)
        }),
        target_bitrate: entry.target_bitrate,
        retransmitted_packets_sent: entry.retransmitted_packets_sent,
        retransmitted_packets_sent_delta: delta(
            signed(entry.retransmitted_packets_sent),
            last,
            |last| signed(last.retransmitted_packets_sent),
        ),
        retransmitted_bytes_sent: entry.retransmitted_bytes_sent,
        retransmitted_bytes_sent_delta: delta(
            signed(entry.retransmitted_bytes_sent),
            last,
            |last| signed(last.retransmitted_bytes_sent),
        ),
    }
}

pub fn outbound_audio(
    snapshot: &RawSnapshot,
    entry: &OutboundRtpStats,
    last: Option<&OutputAudio>,
) -> Option<OutputAudio> {
    let last = last.map(|last| &last.base);
    if is_stale(entry.timestamp, last.map(|last| last.timestamp)) {
        trace!("Skipping outbound audio {:?}: no fresh sample", entry.id);
        return None;
    }

    Some(OutputAudio {
        base: outbound_base(snapshot, entry, last),
    })
}

pub fn outbound_video(
    snapshot: &RawSnapshot,
    entry: &OutboundRtpStats,
    last: Option<&OutputVideo>,
) -> Option<OutputVideo> {
    let last = last.map(|last| &last.base);
    if is_stale(entry.timestamp, last.map(|last| last.timestamp)) {
        trace!("Skipping outbound video {:?}: no fresh sample", entry.id);
        return None;
    }

    Some(OutputVideo {
        base: outbound_base(snapshot, entry, last),
        frame_width: entry.frame_width,
        frame_height: entry.frame_height,
        frames_per_second: entry.frames_per_second,
        frames_sent: entry.frames_sent,
        quality_limitation_reason: QualityLimitationReason::from_raw(
            entry.quality_limitation_reason.as_deref(),
        ),
        quality_limitation_durations: entry.quality_limitation_durations.clone(),
    })
}

fn inbound_base(
    snapshot: &RawSnapshot,
    entry: &InboundRtpStats,
    last: Option<&InboundBase>,
) -> InboundBase {
    let last_timestamp = last.map(|last| last.timestamp);
    let counter_rate = |value: Option<u64>, last_value: Option<u64>| {
        value
            .map(|value| rate(entry.timestamp, value, last_timestamp, last_value))
            .unwrap_or_default()
    };
    let last_received = last.and_then(|last| last.total_packets_received);
    let last_lost = last.and_then(|last| last.total_packets_lost);

    InboundBase {
        id: entry.id.clone(),
        timestamp: entry.timestamp,
        mid: entry.mid.clone(),
        track_identifier: entry.track_identifier.clone(),
        bitrate: counter_rate(
            entry.bytes_received,
            last.and_then(|last| last.total_bytes_received),
        ),
        packet_rate: counter_rate(entry.packets_received, last_received),
        mime_type: mime_type(snapshot, entry.codec_id.as_deref()),
        jitter: entry.jitter,
        jitter_buffer_delay: entry.jitter_buffer_delay,
        jitter_buffer_emitted_count: entry.jitter_buffer_emitted_count,
        total_bytes_received: entry.bytes_received,
        total_packets_received: entry.packets_received,
        total_packets_lost: entry.packets_lost,
        packet_loss_ratio: loss_ratio(
            entry.packets_received.unwrap_or(0),
            entry.packets_lost.unwrap_or(0),
            last_received,
            last_lost,
        ),
        packet_loss_delta: delta(Some(entry.packets_lost.unwrap_or(0)), last, |last| {
            last.total_packets_lost
        })
        .unwrap_or_default(),
    }
}

pub fn inbound_audio(
    snapshot: &RawSnapshot,
    entry: &InboundRtpStats,
    last: Option<&InputAudio>,
) -> Option<InputAudio> {
    let last = last.map(|last| &last.base);
    if is_stale(entry.timestamp, last.map(|last| last.timestamp)) {
        trace!("Skipping inbound audio {:?}: no fresh sample", entry.id);
        return None;
    }

    Some(InputAudio {
        base: inbound_base(snapshot, entry, last),
    })
}

pub fn inbound_video(
    snapshot: &RawSnapshot,
    entry: &InboundRtpStats,
    last: Option<&InputVideo>,
) -> Option<InputVideo> {
    let last = last.map(|last| &last.base);
    if is_stale(entry.timestamp, last.map(|last| last.timestamp)) {
        trace!("Skipping inbound video {:?}: no fresh sample", entry.id);
        return None;
    }

    Some(InputVideo {
        base: inbound_base(snapshot, entry, last),
        key_frames_decoded: entry.key_frames_decoded,
        frame_width: entry.frame_width,
        frame_height: entry.frame_height,
        frames_decoded: entry.frames_decoded,
        frames_dropped: entry.frames_dropped,
        frames_per_second: entry.frames_per_second,
        frames_received: entry.frames_received,
    })
}
