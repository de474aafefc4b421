//! Rate and loss arithmetic over cumulative counters.
//!
//! Timestamps are in milliseconds, as reported by `getStats()`.

/// Per-second rate of a cumulative counter between two samples.
///
/// A missing or zero prior value/timestamp means there is no baseline and the
/// rate is 0, as is any pair of samples without positive elapsed time.
pub fn rate(timestamp: f64, value: u64, prior_timestamp: Option<f64>, prior_value: Option<u64>) -> f64 {
    let (Some(prior_timestamp), Some(prior_value)) = (
        prior_timestamp.filter(|&prior| prior != 0.0),
        prior_value.filter(|&prior| prior != 0),
    ) else {
        return 0.0;
    };

    let elapsed_secs = (timestamp - prior_timestamp) / 1000.0;
    if elapsed_secs <= 0.0 {
        return 0.0;
    }

    (value as f64 - prior_value as f64) / elapsed_secs
}

/// Ratio of packets lost over packets received since the prior sample.
///
/// Note the argument order: received first, lost second. Omitted priors count
/// as 0, so without a baseline this is the lifetime ratio.
pub fn loss_ratio(
    total_received: u64,
    total_lost: i64,
    prior_received: Option<u64>,
    prior_lost: Option<i64>,
) -> f64 {
    if total_received == 0 {
        return 0.0;
    }

    let lost = total_lost as f64 - prior_lost.unwrap_or(0) as f64;
    let received = total_received as f64 - prior_received.unwrap_or(0) as f64;
    if received == 0.0 {
        return 0.0;
    }

    lost / received
}
