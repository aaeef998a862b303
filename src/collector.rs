// ===============================
// src/collector.rs
// ===============================
//
// Generation-guarded collector: one concurrent fetch per input item, results
// appended as they arrive. A new input list mints a new Generation; answers
// tagged with an older one are dropped.
//
// "loaded" fires once per generation, only when every item succeeded. When all
// items have answered but some failed, status() reports NotFound instead of
// waiting forever.
//
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use crate::fetcher::NetworkError;
use crate::maybe::{Generation, MaybeLoad};
use crate::metrics::STALE_RESPONSES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Tagged with a superseded generation; ignored.
    Stale,
    /// Recorded, more answers outstanding.
    Pending,
    /// The answer that completed the generation. Returned once.
    Loaded,
    /// Every item answered but at least one failed. Returned once.
    Failed,
}

#[derive(Debug)]
pub struct Collector<T> {
    generation: Generation,
    issued_at: DateTime<Utc>,
    expected: Option<usize>,
    items: Vec<T>,
    failed: usize,
    loaded: bool,
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self {
            generation: Generation::default(),
            issued_at: Utc::now(),
            expected: None,
            items: Vec::new(),
            failed: 0,
            loaded: false,
        }
    }
}

impl<T> Collector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting `expected` answers. An empty list is loaded at once.
    pub fn begin(&mut self, expected: usize) -> Generation {
        self.generation = self.generation.next();
        self.issued_at = Utc::now();
        self.expected = Some(expected);
        self.items.clear();
        self.failed = 0;
        self.loaded = expected == 0;
        self.generation
    }

    /// Drop everything; outstanding answers become stale.
    pub fn abandon(&mut self) {
        self.generation = self.generation.next();
        self.expected = None;
        self.items.clear();
        self.failed = 0;
        self.loaded = false;
    }

    pub fn accept(&mut self, generation: Generation, item: T) -> Outcome {
        if generation != self.generation || self.expected.is_none() {
            STALE_RESPONSES.with_label_values(&["collector"]).inc();
            debug!(%generation, current = %self.generation, "collector: stale answer dropped");
            return Outcome::Stale;
        }
        self.items.push(item);
        self.settle()
    }

    pub fn reject(&mut self, generation: Generation) -> Outcome {
        if generation != self.generation || self.expected.is_none() {
            STALE_RESPONSES.with_label_values(&["collector"]).inc();
            return Outcome::Stale;
        }
        self.failed += 1;
        self.settle()
    }

    fn settle(&mut self) -> Outcome {
        let expected = self.expected.unwrap_or(0);
        if self.loaded {
            return Outcome::Pending;
        }
        if self.items.len() == expected && self.failed == 0 {
            self.loaded = true;
            return Outcome::Loaded;
        }
        if self.items.len() + self.failed == expected {
            return Outcome::Failed;
        }
        Outcome::Pending
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Successful answers so far.
    pub fn received(&self) -> usize {
        self.items.len()
    }

    pub fn status(&self) -> MaybeLoad<()> {
        match self.expected {
            None => MaybeLoad::Uninitialised,
            Some(_) if self.loaded => MaybeLoad::Loaded(()),
            Some(n) if self.items.len() + self.failed >= n => MaybeLoad::NotFound,
            Some(_) => MaybeLoad::Waiting { issued_at: self.issued_at },
        }
    }

    /// Items in display order. Arrival order is whatever the network produced.
    pub fn sorted_by_key<K: Ord>(&self, mut key: impl FnMut(&T) -> K) -> Vec<&T> {
        let mut out: Vec<&T> = self.items.iter().collect();
        out.sort_by_key(|t| key(t));
        out
    }
}

/// Issue one fetch per item, each on its own task. Every answer is sent back
/// through `tx` tagged with `generation`, the one current at issue time.
pub fn fan_out<I, T, M, F, Fut>(
    generation: Generation,
    items: Vec<I>,
    fetch: F,
    tx: mpsc::Sender<M>,
    wrap: fn(Generation, Result<T, NetworkError>) -> M,
) where
    I: Send + 'static,
    T: Send + 'static,
    M: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, NetworkError>> + Send + 'static,
{
    for item in items {
        let fut = fetch(item);
        let tx = tx.clone();
        tokio::spawn(async move {
            let res = fut.await;
            // receiver gone = owning view torn down
            let _ = tx.send(wrap(generation, res)).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn loads_once_after_all_answers() {
        let mut c: Collector<u32> = Collector::new();
        let g = c.begin(3);
        assert_eq!(c.accept(g, 2), Outcome::Pending);
        assert_eq!(c.accept(g, 1), Outcome::Pending);
        assert!(c.status().is_waiting());
        assert_eq!(c.accept(g, 3), Outcome::Loaded);
        assert_eq!(c.received(), 3);
        assert!(c.status().is_loaded());
        assert_eq!(c.sorted_by_key(|x| *x), vec![&1, &2, &3]);
    }

    #[test]
    fn stale_generation_is_dropped() {
        let mut c: Collector<&str> = Collector::new();
        let old = c.begin(3);
        assert_eq!(c.accept(old, "a"), Outcome::Pending);

        let new = c.begin(2);
        assert_eq!(c.accept(old, "b"), Outcome::Stale);
        assert_eq!(c.accept(new, "x"), Outcome::Pending);
        assert_eq!(c.accept(old, "c"), Outcome::Stale);
        assert_eq!(c.accept(new, "y"), Outcome::Loaded);

        let mut got: Vec<_> = c.sorted_by_key(|s| *s).into_iter().copied().collect();
        got.sort();
        assert_eq!(got, vec!["x", "y"]);
    }

    #[test]
    fn empty_list_is_loaded_immediately() {
        let mut c: Collector<u8> = Collector::new();
        assert_eq!(c.status(), MaybeLoad::Uninitialised);
        c.begin(0);
        assert!(c.is_loaded());
    }

    #[test]
    fn failed_item_surfaces_as_not_found() {
        let mut c: Collector<u8> = Collector::new();
        let g = c.begin(2);
        assert_eq!(c.reject(g), Outcome::Pending);
        assert_eq!(c.accept(g, 1), Outcome::Failed);
        assert!(!c.is_loaded());
        assert!(c.status().is_not_found());
        assert_eq!(c.received(), 1);
    }

    #[test]
    fn abandon_makes_outstanding_stale() {
        let mut c: Collector<u8> = Collector::new();
        let g = c.begin(1);
        c.abandon();
        assert_eq!(c.accept(g, 1), Outcome::Stale);
        assert_eq!(c.status(), MaybeLoad::Uninitialised);
    }

    #[derive(Debug)]
    struct Answer(Generation, Result<u64, NetworkError>);

    fn wrap(g: Generation, r: Result<u64, NetworkError>) -> Answer {
        Answer(g, r)
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_races_are_resolved_by_generation() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut c: Collector<u64> = Collector::new();

        // first list: slow answers
        let old = c.begin(3);
        fan_out(old, vec![1u64, 2, 3], |n| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(n)
        }, tx.clone(), wrap);

        // list replaced before any answer arrives: fast answers
        let new = c.begin(2);
        fan_out(new, vec![10u64, 20], |n| async move {
            tokio::time::sleep(Duration::from_millis(10 * n)).await;
            Ok(n)
        }, tx.clone(), wrap);
        drop(tx);

        let mut loaded = 0;
        while let Some(Answer(g, r)) = rx.recv().await {
            let outcome = match r {
                Ok(v) => c.accept(g, v),
                Err(_) => c.reject(g),
            };
            if outcome == Outcome::Loaded {
                loaded += 1;
            }
        }

        assert_eq!(loaded, 1);
        assert_eq!(c.received(), 2);
        assert_eq!(c.sorted_by_key(|v| *v), vec![&10, &20]);
    }
}
