use tracing::*;

use super::{raw::CandidatePairStats, types::StatsEvent};

/// Copies the connection summary of the nominated (active) candidate pair onto
/// the event. Returns `false` for pairs that are not nominated, which are ignored.
///
/// These are point-in-time values, taken as-is: the last nominated pair of a
/// report wins.
pub fn apply(entry: &CandidatePairStats, event: &mut StatsEvent) -> bool {
    if entry.nominated != Some(true) {
        return false;
    }

    trace!("Using nominated candidate pair {:?}", entry.id);

    event.total_round_trip_time = entry.total_round_trip_time;
    event.current_round_trip_time = entry.current_round_trip_time;
    event.responses_received = entry.responses_received;
    event.available_outgoing_bitrate = entry.available_outgoing_bitrate;
    event.available_incoming_bitrate = entry.available_incoming_bitrate;

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_nominated_pairs_are_applied() {
        let mut event = StatsEvent::default();

        let waiting = CandidatePairStats {
            id: "CPwaiting".into(),
            nominated: Some(false),
            current_round_trip_time: Some(1.0),
            ..Default::default()
        };
        assert!(!apply(&waiting, &mut event));
        assert_eq!(event, StatsEvent::default());

        let unknown = CandidatePairStats {
            id: "CPunknown".into(),
            current_round_trip_time: Some(1.0),
            ..Default::default()
        };
        assert!(!apply(&unknown, &mut event));
        assert_eq!(event.current_round_trip_time, None);
    }

    #[test]
    fn nominated_pair_overwrites_summary() {
        let mut event = StatsEvent {
            available_incoming_bitrate: Some(1.0),
            ..Default::default()
        };

        let nominated = CandidatePairStats {
            id: "CPnominated".into(),
            nominated: Some(true),
            total_round_trip_time: Some(0.275),
            current_round_trip_time: Some(0.07),
            responses_received: Some(12),
            available_outgoing_bitrate: Some(2752533.0),
            ..Default::default()
        };
        assert!(apply(&nominated, &mut event));

        assert_eq!(event.total_round_trip_time, Some(0.275));
        assert_eq!(event.current_round_trip_time, Some(0.07));
        assert_eq!(event.responses_received, Some(12));
        assert_eq!(event.available_outgoing_bitrate, Some(2752533.0));
        assert_eq!(event.available_incoming_bitrate, None);
    }
}
