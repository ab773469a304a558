//! Per-room ticker supervision (spec §4.4, §4.6 "ticker failure is not
//! recoverable silently... the design requires the ticker to be
//! automatically restarted").
//!
//! The ticker itself carries no state — it only notifies the owning room's
//! command queue on a timer, so tick handling stays on the room's serial
//! event-router path and total ordering (spec §5) is preserved.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::resilience::timeout::TICK_PERIOD;

/// An empty tick notification; the room actor reacts to its arrival.
#[derive(Debug, Clone, Copy)]
pub struct Tick;

async fn ticker_loop(period: Duration, tx: mpsc::Sender<Tick>) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // the first tick fires immediately; skip it
    loop {
        interval.tick().await;
        if tx.send(Tick).await.is_err() {
            return;
        }
    }
}

/// Spawns the ticker under a supervisor that restarts it if it panics.
/// Returns once the room's channel is closed (the room no longer exists),
/// at which point there is nothing left to supervise.
pub fn spawn_supervised_ticker(room_code: String, tx: mpsc::Sender<Tick>) -> tokio::task::JoinHandle<()> {
    spawn_supervised_ticker_with_period(room_code, tx, TICK_PERIOD)
}

fn spawn_supervised_ticker_with_period(
    room_code: String,
    tx: mpsc::Sender<Tick>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let handle = tokio::spawn(ticker_loop(period, tx.clone()));
            match handle.await {
                Ok(()) => {
                    // The send failed inside ticker_loop, meaning the room is gone.
                    break;
                }
                Err(join_error) => {
                    error!(room = %room_code, error = %join_error, "ticker task panicked, restarting");
                    warn!(room = %room_code, "room clock may have skipped a tick during restart");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_supervising_once_channel_closes() {
        let (tx, mut rx) = mpsc::channel(1);
        let supervisor = spawn_supervised_ticker_with_period("TEST01".into(), tx, Duration::from_millis(10));
        rx.close();
        tokio::time::timeout(Duration::from_secs(2), supervisor)
            .await
            .expect("supervisor should stop once the channel closes")
            .unwrap();
    }
}
