use super::raw::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    OutboundAudio,
    OutboundVideo,
    InboundAudio,
    InboundVideo,
    ConnectivityPath,
    Other,
}

/// Resolves the media kind from `kind`, then `mediaType`.
///
/// Some browsers (Safari) report neither on `inbound-rtp`, so inbound records
/// fall back to looking for "video" in their id and default to audio.
/// Any other record without a usable hint has no media kind.
pub fn media_kind(record: &RawRecord) -> Option<MediaKind> {
    let (kind, media_type) = record.media_hints();
    let declared = kind.filter(|kind| !kind.is_empty()).or(media_type);

    if let Some(media_kind) = declared.and_then(MediaKind::parse) {
        return Some(media_kind);
    }

    match record {
        RawRecord::InboundRtp(stats) if stats.id.to_lowercase().contains("video") => {
            Some(MediaKind::Video)
        }
        RawRecord::InboundRtp(_) => Some(MediaKind::Audio),
        _ => None,
    }
}

pub fn classify(record: &RawRecord) -> Category {
    match record {
        RawRecord::OutboundRtp(_) => match media_kind(record) {
            Some(MediaKind::Audio) => Category::OutboundAudio,
            Some(MediaKind::Video) => Category::OutboundVideo,
            None => Category::Other,
        },
        RawRecord::InboundRtp(_) => match media_kind(record) {
            Some(MediaKind::Audio) => Category::InboundAudio,
            Some(MediaKind::Video) => Category::InboundVideo,
            None => Category::Other,
        },
        RawRecord::CandidatePair(_) => Category::ConnectivityPath,
        RawRecord::Codec(_) | RawRecord::Other(_) => Category::Other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> RawRecord {
        RawRecord::try_from(value).unwrap()
    }

    #[test]
    fn media_kind_resolution() {
        let descriptions = vec![
            (
                json!({"id": "", "type": "candidate-pair", "kind": ""}),
                None,
            ),
            (
                json!({"id": "", "type": "candidate-pair", "kind": "video"}),
                Some(MediaKind::Video),
            ),
            (
                json!({"id": "", "type": "candidate-pair", "kind": "", "mediaType": "audio"}),
                Some(MediaKind::Audio),
            ),
            (
                json!({"id": "ITaudio1V3534943364", "type": "candidate-pair", "kind": ""}),
                None,
            ),
            (
                json!({"id": "ITaudio1V3534943364", "type": "inbound-rtp", "kind": ""}),
                Some(MediaKind::Audio),
            ),
            (
                json!({"id": "OTvideo1A1219987693", "type": "inbound-rtp", "kind": ""}),
                Some(MediaKind::Video),
            ),
            (
                json!({"id": "RTCInboundRTPVIDEOStream_1", "type": "inbound-rtp"}),
                Some(MediaKind::Video),
            ),
            (
                json!({"id": "OTvideo1A1219987693", "type": "outbound-rtp", "kind": "data"}),
                None,
            ),
        ];

        for (value, expected) in descriptions {
            assert_eq!(media_kind(&record(value.clone())), expected, "{value}");
        }
    }

    #[test]
    fn kind_takes_precedence_over_media_type() {
        let inbound = record(json!({
            "id": "video-looking-id",
            "type": "inbound-rtp",
            "kind": "audio",
            "mediaType": "video"
        }));

        assert_eq!(media_kind(&inbound), Some(MediaKind::Audio));
    }

    #[test]
    fn categories() {
        let descriptions = vec![
            (
                json!({"id": "1", "type": "outbound-rtp", "kind": "audio"}),
                Category::OutboundAudio,
            ),
            (
                json!({"id": "2", "type": "outbound-rtp", "mediaType": "video"}),
                Category::OutboundVideo,
            ),
            (json!({"id": "3", "type": "outbound-rtp"}), Category::Other),
            (json!({"id": "4", "type": "inbound-rtp"}), Category::InboundAudio),
            (
                json!({"id": "5", "type": "inbound-rtp", "kind": "video"}),
                Category::InboundVideo,
            ),
            (
                json!({"id": "6", "type": "candidate-pair"}),
                Category::ConnectivityPath,
            ),
            (json!({"id": "7", "type": "codec"}), Category::Other),
            (
                json!({"id": "8", "type": "remote-inbound-rtp", "kind": "video"}),
                Category::Other,
            ),
        ];

        for (value, expected) in descriptions {
            assert_eq!(classify(&record(value.clone())), expected, "{value}");
        }
    }
}
