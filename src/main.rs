use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::*;

use webrtc_stats::{
    cli, logger,
    provider::JsonFileProvider,
    stats::{Notification, StatsCollector, StatsEvent},
};

fn print_event(event: &StatsEvent) -> Result<()> {
    let json = if cli::manager::is_pretty() {
        serde_json::to_string_pretty(event)
    } else {
        serde_json::to_string(event)
    }
    .context("Failed serializing stats event")?;

    println!("{json}");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    // Logger should start before everything else to register any log information
    logger::manager::init();

    let provider = JsonFileProvider::new(cli::manager::stats_file());
    info!("Collecting WebRTC statistics from {:?}", provider.path());

    let mut collector = StatsCollector::new(cli::manager::collector_options(), provider);
    let mut notifications = collector.subscribe();
    collector.start();

    let count = cli::manager::count();
    let mut published = 0;

    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Ok(Notification::Stats(event)) => {
                    print_event(&event)?;

                    published += 1;
                    if count.is_some_and(|count| published >= count) {
                        debug!("Published {published} events, exiting");
                        break;
                    }
                }
                Ok(Notification::Error(reason)) => debug!("Skipped cycle: {reason}"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output is too slow, {skipped} notifications were dropped")
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, exiting");
                break;
            }
        }
    }

    collector.stop();

    Ok(())
}
