pub mod calculator;
pub mod classifier;
pub mod collector;
pub mod normalizer;
pub mod path_selector;
pub mod raw;
pub mod types;

pub use collector::{CollectError, CollectorOptions, StatsCollector};
pub use raw::{RawRecord, RawSnapshot};
pub use types::{Notification, StatsEvent};
