// Status line - user facing progress text for a chart
use crate::application::fetch_tracker::FetchStatus;
use crate::application::orchestrator::ChartEvent;
use std::collections::BTreeSet;

/// Message for a status snapshot, `None` when nothing is in flight.
pub fn status_message(status: &FetchStatus) -> Option<String> {
    if status.is_idle() {
        return None;
    }
    let processing: Vec<&str> = status
        .fetching
        .difference(&status.waiting)
        .map(String::as_str)
        .collect();
    if !processing.is_empty() {
        return Some(format!("Processing {}", processing.join(", ")));
    }
    if status.completed.is_empty() {
        return Some(format!("Fetching {} data sets", status.waiting.len()));
    }
    Some(format!("Waiting for {}", join(&status.waiting)))
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Follows the orchestrator's events and keeps the message for the overlay.
#[derive(Debug, Default)]
pub struct StatusLine {
    status: FetchStatus,
    failed: BTreeSet<String>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from one event; returns the message to show (`None` hides the overlay).
    pub fn apply(&mut self, event: &ChartEvent) -> Option<String> {
        match event {
            ChartEvent::FetchStarted { cycle, names, .. } => {
                let names: BTreeSet<String> = names.iter().cloned().collect();
                self.status = FetchStatus {
                    cycle: *cycle,
                    waiting: names.clone(),
                    fetching: names,
                    completed: BTreeSet::new(),
                };
                self.failed.clear();
            }
            ChartEvent::DataSetReady { cycle, name, .. } | ChartEvent::FetchTimedOut { cycle, name }
                if *cycle == self.status.cycle =>
            {
                self.status.waiting.remove(name);
                self.status.fetching.remove(name);
                self.status.completed.insert(name.clone());
            }
            ChartEvent::FetchFailed { cycle, name, .. } if *cycle == self.status.cycle => {
                self.failed.insert(name.clone());
            }
            ChartEvent::FetchCompletedBatch { cycle, .. } | ChartEvent::FetchCancelled { cycle }
                if *cycle == self.status.cycle =>
            {
                self.status = FetchStatus {
                    cycle: *cycle,
                    ..FetchStatus::default()
                };
                self.failed.clear();
            }
            _ => {}
        }
        self.message()
    }

    pub fn message(&self) -> Option<String> {
        let base = status_message(&self.status)?;
        if self.failed.is_empty() {
            return Some(base);
        }
        Some(format!("{} ({} failed)", base, join(&self.failed)))
    }
}
