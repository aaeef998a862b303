// ===============================
// src/schedule.rs
// ===============================
//
// Timers bound to the view that owns them:
// - RepeatingTask : spawns `tick` every `period` until stop() (or drop).
//                   Ticks run on their own tasks and may overlap; each one
//                   gets the task's CancellationToken and must check it
//                   before touching shared state.
// - after         : one-shot delayed message. The receiver decides whether
//                   the message still means anything when it arrives.
//
use std::future::Future;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct RepeatingTask {
    token: CancellationToken,
}

impl RepeatingTask {
    /// First tick fires one `period` after spawning.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, tick: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let stop = token.clone();
        tokio::spawn(async move {
            let mut every = interval_at(Instant::now() + period, period);
            every.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = every.tick() => {
                        tokio::spawn(tick(stop.clone()));
                    }
                }
            }
            debug!(task = name, "repeating task stopped");
        });
        Self { token }
    }

    #[cfg(test)]
    fn stopper(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Idempotent. Ticks already running finish on their own.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Deliver `msg` on `tx` after `delay`. A closed channel is not an error:
/// the owner is gone.
pub fn after<M: Send + 'static>(delay: Duration, tx: mpsc::Sender<M>, msg: M) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(msg).await;
    })
}
