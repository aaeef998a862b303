// ===============================
// src/autoplay.rs
// ===============================
//
// Pool autoplay flags and the decision taken each time a trigger fires.
//
//   running = user intent (play continuously)
//   trigger fires -> not running          : nothing, chain ends
//                 -> games data Loaded    : play one round, next trigger after round_delay
//                 -> games data not ready : no round, next trigger after retry_delay
//
// Pausing never cancels a scheduled trigger; the trigger checks `running`
// when it fires and does nothing. Triggers also carry the chain they belong
// to, so a pause followed by a restart leaves only one chain alive.
//
use tokio::time::Duration;

use crate::metrics::AUTOPLAY_RUNNING;

pub const ROUND_DELAY: Duration = Duration::from_millis(1000);
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Idle,
    PlayRound { next_in: Duration },
    Retry { next_in: Duration },
}

#[derive(Debug, Clone)]
pub struct AutoPlay {
    running: bool,
    chain: u64,
    round_delay: Duration,
    retry_delay: Duration,
}

impl Default for AutoPlay {
    fn default() -> Self {
        Self::new(ROUND_DELAY, RETRY_DELAY)
    }
}

impl AutoPlay {
    pub fn new(round_delay: Duration, retry_delay: Duration) -> Self {
        Self { running: false, chain: 0, round_delay, retry_delay }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Chain id of the current run; every trigger of that run carries it.
    pub fn chain(&self) -> u64 {
        self.chain
    }

    /// True when this call turned autoplay on; the caller fires the first trigger.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.chain += 1;
        AUTOPLAY_RUNNING.set(1);
        true
    }

    /// True when this call turned autoplay off.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        AUTOPLAY_RUNNING.set(0);
        true
    }

    pub fn on_trigger(&self, chain: u64, games_loaded: bool) -> Step {
        if !self.running || chain != self.chain {
            return Step::Idle;
        }
        if games_loaded {
            Step::PlayRound { next_in: self.round_delay }
        } else {
            Step::Retry { next_in: self.retry_delay }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_games_play_a_round_then_wait_a_second() {
        let mut ap = AutoPlay::default();
        assert!(ap.start());
        assert_eq!(ap.on_trigger(ap.chain(), true), Step::PlayRound { next_in: Duration::from_millis(1000) });
    }

    #[test]
    fn unready_games_retry_fast_without_a_round() {
        let mut ap = AutoPlay::default();
        ap.start();
        assert_eq!(ap.on_trigger(ap.chain(), false), Step::Retry { next_in: Duration::from_millis(10) });
    }

    #[test]
    fn pause_makes_pending_trigger_idle() {
        let mut ap = AutoPlay::default();
        ap.start();
        assert!(ap.pause());
        assert_eq!(ap.on_trigger(ap.chain(), true), Step::Idle);
        assert!(!ap.pause());
    }

    #[test]
    fn restart_orphans_the_old_chain() {
        let mut ap = AutoPlay::default();
        ap.start();
        let old = ap.chain();
        ap.pause();
        ap.start();
        assert_eq!(ap.on_trigger(old, true), Step::Idle);
        assert!(matches!(ap.on_trigger(ap.chain(), true), Step::PlayRound { .. }));
    }

    #[test]
    fn start_is_not_reentrant() {
        let mut ap = AutoPlay::default();
        assert!(ap.start());
        assert!(!ap.start());
        assert!(ap.is_running());
    }
}
