// Fetch tracking - per data set state of one chart's fetch cycle
use crate::domain::telemetry::DataSet;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    /// Request sent, timeout armed.
    Waiting,
    /// Data arrived and is being reduced.
    Received,
    /// Timer fired before data arrived.
    TimedOut,
    Completed,
}

/// Result of resolving one name.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Name was not waiting (stale timer, late data, unknown name).
    Ignored,
    /// Name done, others still outstanding.
    Pending { remaining: usize },
    /// Every name of the cycle is done. Data sets are in request order.
    Batch(Vec<DataSet>),
}

/// Snapshot of which names are where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStatus {
    pub cycle: u64,
    pub waiting: BTreeSet<String>,
    pub fetching: BTreeSet<String>,
    pub completed: BTreeSet<String>,
}

impl FetchStatus {
    pub fn is_idle(&self) -> bool {
        self.fetching.is_empty()
    }
}

/// Tracks one fetch cycle at a time. Not thread safe on purpose: the
/// orchestrator task is its only owner.
#[derive(Debug, Default)]
pub struct FetchTracker {
    cycle: u64,
    order: Vec<String>,
    states: HashMap<String, FetchState>,
    completed: HashMap<String, DataSet>,
}

impl FetchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Drop whatever is in flight and start a new cycle for `names`.
    /// Duplicate names are fetched once.
    pub fn begin(&mut self, names: &[String]) -> u64 {
        self.reset();
        self.cycle += 1;
        for name in names {
            if self.states.insert(name.clone(), FetchState::Waiting).is_none() {
                self.order.push(name.clone());
            }
        }
        self.cycle
    }

    /// Forget the current cycle. Names go back to idle.
    pub fn reset(&mut self) {
        self.order.clear();
        self.states.clear();
        self.completed.clear();
    }

    /// Names of the current cycle in request order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn state(&self, name: &str) -> FetchState {
        self.states.get(name).copied().unwrap_or(FetchState::Idle)
    }

    pub fn is_waiting(&self, name: &str) -> bool {
        self.state(name) == FetchState::Waiting
    }

    /// Waiting → Received. Returns false if the name was not waiting.
    pub fn mark_received(&mut self, name: &str) -> bool {
        self.transition(name, FetchState::Waiting, FetchState::Received)
    }

    /// Waiting → TimedOut. Returns false for stale timers.
    pub fn mark_timed_out(&mut self, name: &str) -> bool {
        self.transition(name, FetchState::Waiting, FetchState::TimedOut)
    }

    /// Received/TimedOut → Completed, storing the finished data set.
    pub fn complete(&mut self, name: &str, data_set: DataSet) -> Resolution {
        match self.state(name) {
            FetchState::Received | FetchState::TimedOut => {}
            _ => return Resolution::Ignored,
        }
        self.states.insert(name.to_string(), FetchState::Completed);
        self.completed.insert(name.to_string(), data_set);

        let remaining = self
            .states
            .values()
            .filter(|s| **s != FetchState::Completed)
            .count();
        if remaining > 0 {
            return Resolution::Pending { remaining };
        }

        let batch = self
            .order
            .iter()
            .filter_map(|name| self.completed.remove(name))
            .collect();
        self.reset();
        Resolution::Batch(batch)
    }

    pub fn status(&self) -> FetchStatus {
        let with = |wanted: &[FetchState]| -> BTreeSet<String> {
            self.states
                .iter()
                .filter(|(_, s)| wanted.contains(s))
                .map(|(name, _)| name.clone())
                .collect()
        };

        FetchStatus {
            cycle: self.cycle,
            waiting: with(&[FetchState::Waiting]),
            fetching: with(&[FetchState::Waiting, FetchState::Received, FetchState::TimedOut]),
            completed: with(&[FetchState::Completed]),
        }
    }

    fn transition(&mut self, name: &str, from: FetchState, to: FetchState) -> bool {
        match self.states.get_mut(name) {
            Some(state) if *state == from => {
                *state = to;
                true
            }
            _ => false,
        }
    }
}
