// ===============================
// src/maybe.rs
// ===============================
//
// Optional-value types shared by every view:
// - Maybe<T>      : Just / Nothing
// - MaybeLoad<T>  : Uninitialised / Waiting / Loaded / NotFound
// - Generation    : request id, bumped on every new request
// - LoadSlot<T>   : MaybeLoad + latest Generation, drops stale resolutions
//
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Maybe<T> {
    Just(T),
    Nothing,
}

pub fn just<T>(value: T) -> Maybe<T> {
    Maybe::Just(value)
}

pub fn nothing<T>() -> Maybe<T> {
    Maybe::Nothing
}

/// Lift a possibly-absent value. JSON `null` and a missing field both
/// deserialize to `None`, so both end up as `Nothing`.
pub fn maybe_of<T>(value: Option<T>) -> Maybe<T> {
    match value {
        Some(v) => Maybe::Just(v),
        None => Maybe::Nothing,
    }
}

impl<T> Maybe<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Maybe<U> {
        match self {
            Maybe::Just(v) => Maybe::Just(f(v)),
            Maybe::Nothing => Maybe::Nothing,
        }
    }

    pub fn is_just(&self) -> bool {
        matches!(self, Maybe::Just(_))
    }

    pub fn as_ref(&self) -> Maybe<&T> {
        match self {
            Maybe::Just(v) => Maybe::Just(v),
            Maybe::Nothing => Maybe::Nothing,
        }
    }
}

impl<T> Default for Maybe<T> {
    fn default() -> Self {
        Maybe::Nothing
    }
}

impl<T> From<Option<T>> for Maybe<T> {
    fn from(value: Option<T>) -> Self {
        maybe_of(value)
    }
}

/// State of a value that lives on the backend.
///
/// Consumers read the value only through `Loaded`; `Waiting` carries the
/// issue time for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeLoad<T> {
    Uninitialised,
    Waiting { issued_at: DateTime<Utc> },
    Loaded(T),
    NotFound,
}

impl<T> MaybeLoad<T> {
    pub fn waiting() -> Self {
        MaybeLoad::Waiting { issued_at: Utc::now() }
    }

    pub fn loaded(value: T) -> Self {
        MaybeLoad::Loaded(value)
    }

    pub fn from_result<E>(res: Result<T, E>) -> Self {
        match res {
            Ok(v) => MaybeLoad::Loaded(v),
            Err(_) => MaybeLoad::NotFound,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, MaybeLoad::Loaded(_))
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, MaybeLoad::Waiting { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MaybeLoad::NotFound)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            MaybeLoad::Loaded(v) => Some(v),
            _ => None,
        }
    }

    /// Short tag for logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            MaybeLoad::Uninitialised => "uninitialised",
            MaybeLoad::Waiting { .. } => "waiting",
            MaybeLoad::Loaded(_) => "loaded",
            MaybeLoad::NotFound => "not_found",
        }
    }
}

impl<T> Default for MaybeLoad<T> {
    fn default() -> Self {
        MaybeLoad::Uninitialised
    }
}

/// Identity of one issued request (or batch of requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A `MaybeLoad` that only accepts the resolution of its latest request.
#[derive(Debug, Clone)]
pub struct LoadSlot<T> {
    state: MaybeLoad<T>,
    latest: Generation,
}

impl<T> LoadSlot<T> {
    pub fn new() -> Self {
        Self { state: MaybeLoad::Uninitialised, latest: Generation::default() }
    }

    /// Start a new request: state goes to `Waiting`, earlier requests become stale.
    pub fn begin(&mut self) -> Generation {
        self.latest = self.latest.next();
        self.state = MaybeLoad::waiting();
        self.latest
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.latest
    }

    /// Apply a resolution. Returns false (and leaves the state alone) when stale.
    pub fn resolve<E>(&mut self, generation: Generation, res: Result<T, E>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = MaybeLoad::from_result(res);
        true
    }

    /// Forget the value without issuing a request; in-flight requests become stale.
    pub fn reset(&mut self) {
        self.latest = self.latest.next();
        self.state = MaybeLoad::Uninitialised;
    }

    pub fn state(&self) -> &MaybeLoad<T> {
        &self.state
    }

    pub fn value(&self) -> Option<&T> {
        self.state.value()
    }
}

impl<T> Default for LoadSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
