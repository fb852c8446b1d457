// Chart orchestrator - fans out data set fetches and applies them in one batch
//
// One actor task per chart owns the fetch tracker and the chart adapter. Fetch
// requests and per-name timeout timers run as separate tasks and only report
// back through the command channel, so all state changes and every adapter
// call happen on the actor task.
use crate::application::chart_adapter::{ChartAdapter, XFormatter};
use crate::application::chart_range::ChartRange;
use crate::application::data_source::DataSetSource;
use crate::application::fetch_tracker::{FetchStatus, FetchTracker, Resolution};
use crate::application::recipe::{RecipeSettings, ReductionContext, ReductionRecipe};
use crate::application::reduction::zero_placeholder;
use crate::domain::period::TimeRangeLimits;
use crate::domain::telemetry::{DataSet, Entry, HistorySample, XKeys};
use crate::error::{ChartError, Result};
use futures::{FutureExt, Stream};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Observable progress of a chart's fetch cycles.
#[derive(Debug, Clone)]
pub enum ChartEvent {
    FetchStarted {
        cycle: u64,
        names: Vec<String>,
        limits: TimeRangeLimits,
    },
    DataSetReady {
        cycle: u64,
        name: String,
        points: usize,
    },
    FetchFailed {
        cycle: u64,
        name: String,
        message: String,
    },
    FetchTimedOut {
        cycle: u64,
        name: String,
    },
    /// Every data set of the cycle has been handed to the chart.
    FetchCompletedBatch {
        cycle: u64,
        data_sets: Vec<DataSet>,
    },
    FetchCancelled {
        cycle: u64,
    },
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub fetch_timeout: Duration,
    /// Recipe for names without an override. Defaults to the chart kind's recipe.
    pub default_recipe: Option<ReductionRecipe>,
    pub recipes: HashMap<String, ReductionRecipe>,
    pub recipe_settings: RecipeSettings,
    pub event_capacity: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            default_recipe: None,
            recipes: HashMap::new(),
            recipe_settings: RecipeSettings::default(),
            event_capacity: 100,
        }
    }
}

impl OrchestratorOptions {
    pub fn with_recipe(mut self, name: impl Into<String>, recipe: ReductionRecipe) -> Self {
        self.recipes.insert(name.into(), recipe);
        self
    }
}

enum Command {
    Fetch {
        names: Vec<String>,
        limits: TimeRangeLimits,
        reply: oneshot::Sender<u64>,
    },
    Cancel,
    Received {
        cycle: u64,
        name: String,
        result: anyhow::Result<Vec<HistorySample>>,
    },
    TimedOut {
        cycle: u64,
        name: String,
    },
    Status {
        reply: oneshot::Sender<FetchStatus>,
    },
    Shutdown,
}

/// Handle to a running chart actor.
#[derive(Clone)]
pub struct ChartOrchestrator {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ChartEvent>,
}

impl ChartOrchestrator {
    /// Start the actor. The join handle yields the adapter back once the actor
    /// stops (on `shutdown` or when every handle is dropped).
    pub fn spawn<A: ChartAdapter>(
        adapter: A,
        source: Arc<dyn DataSetSource>,
        options: OrchestratorOptions,
    ) -> Result<(Self, JoinHandle<A>)> {
        let default_recipe = match options.default_recipe {
            Some(recipe) => recipe,
            None => ReductionRecipe::for_kind(adapter.kind(), &options.recipe_settings)?,
        };

        let (tx, rx) = mpsc::channel(100);
        let (events, _) = broadcast::channel(options.event_capacity.max(1));

        let actor = ChartActor {
            formatter: adapter.x_formatter(),
            adapter,
            source,
            tracker: FetchTracker::new(),
            timers: HashMap::new(),
            in_flight: HashMap::new(),
            limits: None,
            default_recipe,
            recipes: options.recipes,
            fetch_timeout: options.fetch_timeout,
            commands: tx.downgrade(),
            events: events.clone(),
        };
        let handle = tokio::spawn(actor.run(rx));

        Ok((Self { commands: tx, events }, handle))
    }

    /// Start a fetch cycle for `names`, replacing any cycle in flight.
    /// Returns the new cycle id.
    pub async fn fetch<I, S>(&self, names: I, limits: TimeRangeLimits) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (reply, cycle) = oneshot::channel();
        let names = names.into_iter().map(Into::into).collect();
        self.send(Command::Fetch { names, limits, reply }).await?;
        cycle.await.map_err(|_| ChartError::OrchestratorClosed)
    }

    /// Fetch the window `range` describes right now.
    pub async fn fetch_range<I, S>(&self, names: I, range: &ChartRange) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let limits = range.limits(chrono::Utc::now())?;
        self.fetch(names, limits).await
    }

    /// Abandon the cycle in flight. The chart keeps what it shows.
    pub async fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel).await
    }

    pub async fn status(&self) -> Result<FetchStatus> {
        let (reply, status) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        status.await.map_err(|_| ChartError::OrchestratorClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChartEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChartError::OrchestratorClosed)
    }
}

/// Turn a subscription into a stream. Lagging subscribers skip what they missed.
pub fn event_stream(mut rx: broadcast::Receiver<ChartEvent>) -> impl Stream<Item = ChartEvent> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Chart event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

struct ChartActor<A> {
    adapter: A,
    formatter: Arc<dyn XFormatter>,
    source: Arc<dyn DataSetSource>,
    tracker: FetchTracker,
    timers: HashMap<String, AbortHandle>,
    in_flight: HashMap<String, AbortHandle>,
    limits: Option<TimeRangeLimits>,
    default_recipe: ReductionRecipe,
    recipes: HashMap<String, ReductionRecipe>,
    fetch_timeout: Duration,
    commands: mpsc::WeakSender<Command>,
    events: broadcast::Sender<ChartEvent>,
}

impl<A: ChartAdapter> ChartActor<A> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) -> A {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Fetch { names, limits, reply } => {
                    let cycle = self.start_cycle(names, limits);
                    let _ = reply.send(cycle);
                }
                Command::Cancel => self.cancel(),
                Command::Received { cycle, name, result } => self.on_received(cycle, name, result),
                Command::TimedOut { cycle, name } => self.on_timeout(cycle, name),
                Command::Status { reply } => {
                    let _ = reply.send(self.tracker.status());
                }
                Command::Shutdown => break,
            }
        }

        self.teardown();
        tracing::debug!("Chart orchestrator stopped");
        self.adapter
    }

    fn start_cycle(&mut self, names: Vec<String>, limits: TimeRangeLimits) -> u64 {
        if !self.tracker.status().is_idle() {
            tracing::debug!("Restarting fetch, dropping cycle {}", self.tracker.cycle());
        }
        self.teardown();

        let cycle = self.tracker.begin(&names);
        self.limits = Some(limits);
        let names = self.tracker.names().to_vec();
        tracing::debug!("Fetch cycle {} started for {} data sets", cycle, names.len());
        self.emit(ChartEvent::FetchStarted {
            cycle,
            names: names.clone(),
            limits,
        });

        if names.is_empty() {
            self.apply_batch(cycle, Vec::new());
            self.tracker.reset();
            return cycle;
        }

        for name in names {
            self.arm_timer(cycle, &name);
            self.spawn_fetch(cycle, &name, limits);
        }

        cycle
    }

    fn arm_timer(&mut self, cycle: u64, name: &str) {
        let commands = self.commands.clone();
        let timeout = self.fetch_timeout;
        let timer_name = name.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::TimedOut { cycle, name: timer_name }).await;
            }
        });
        self.timers.insert(name.to_string(), timer.abort_handle());
    }

    fn spawn_fetch(&mut self, cycle: u64, name: &str, limits: TimeRangeLimits) {
        let commands = self.commands.clone();
        let source = self.source.clone();
        let fetch_name = name.to_string();
        let fetch = tokio::spawn(async move {
            let result = AssertUnwindSafe(source.fetch(&fetch_name, limits))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("data source panicked")));
            if let Some(tx) = commands.upgrade() {
                let _ = tx
                    .send(Command::Received {
                        cycle,
                        name: fetch_name,
                        result,
                    })
                    .await;
            }
        });
        self.in_flight.insert(name.to_string(), fetch.abort_handle());
    }

    fn on_received(&mut self, cycle: u64, name: String, result: anyhow::Result<Vec<HistorySample>>) {
        if cycle != self.tracker.cycle() {
            tracing::debug!("Ignoring {} from finished cycle {}", name, cycle);
            return;
        }
        self.in_flight.remove(&name);
        if !self.tracker.is_waiting(&name) {
            tracing::debug!("Ignoring late result for {}", name);
            return;
        }

        let samples = match result {
            Ok(samples) => samples,
            Err(e) => {
                // The armed timer resolves this name with a placeholder.
                tracing::warn!("Fetching {} failed: {:#}", name, e);
                self.emit(ChartEvent::FetchFailed {
                    cycle,
                    name,
                    message: format!("{e:#}"),
                });
                return;
            }
        };

        self.tracker.mark_received(&name);
        if let Some(timer) = self.timers.remove(&name) {
            timer.abort();
        }

        let Some(limits) = self.limits else {
            return;
        };
        let data_set = self.build_data_set(&name, samples, limits);
        tracing::debug!("Data set {} ready with {} points", name, data_set.len());
        self.emit(ChartEvent::DataSetReady {
            cycle,
            name: name.clone(),
            points: data_set.len(),
        });

        let resolution = self.tracker.complete(&name, data_set);
        self.resolve(cycle, resolution);
    }

    fn on_timeout(&mut self, cycle: u64, name: String) {
        if cycle != self.tracker.cycle() || !self.tracker.mark_timed_out(&name) {
            return;
        }
        self.timers.remove(&name);
        if let Some(fetch) = self.in_flight.remove(&name) {
            fetch.abort();
        }

        let Some(limits) = self.limits else {
            return;
        };
        tracing::warn!(
            "Fetching {} timed out after {:?}, using empty data",
            name,
            self.fetch_timeout
        );
        let label = self.adapter.data_set_label(&name);
        let placeholder = zero_placeholder(&name, &label, self.formatter.as_ref(), &limits);
        self.emit(ChartEvent::FetchTimedOut {
            cycle,
            name: name.clone(),
        });

        let resolution = self.tracker.complete(&name, placeholder);
        self.resolve(cycle, resolution);
    }

    fn build_data_set(&self, name: &str, samples: Vec<HistorySample>, limits: TimeRangeLimits) -> DataSet {
        let entries = samples
            .iter()
            .map(|s| Entry::new(self.formatter.from_date(s.time), s.value))
            .collect();
        let raw = DataSet::new(name, self.adapter.data_set_label(name), XKeys::Date, entries);

        let recipe = self.recipes.get(name).unwrap_or(&self.default_recipe);
        let ctx = ReductionContext {
            formatter: self.formatter.as_ref(),
            limits,
        };
        recipe.apply(&raw, &ctx)
    }

    fn resolve(&mut self, cycle: u64, resolution: Resolution) {
        match resolution {
            Resolution::Ignored => {}
            Resolution::Pending { remaining } => {
                tracing::debug!("Cycle {}: waiting for {} more data sets", cycle, remaining);
            }
            Resolution::Batch(data_sets) => self.apply_batch(cycle, data_sets),
        }
    }

    /// Hand every data set of the cycle to the chart and redraw once.
    fn apply_batch(&mut self, cycle: u64, data_sets: Vec<DataSet>) {
        let mut applied = Vec::with_capacity(data_sets.len());
        for data_set in data_sets {
            self.adapter.remove_data_set(&data_set.name);
            let prepared = self.adapter.prepare_data_set(data_set);
            self.adapter.add_data_set(prepared.clone());
            applied.push(prepared);
        }
        self.adapter.invalidate();
        self.timers.clear();
        self.in_flight.clear();

        tracing::info!("Fetch cycle {} completed with {} data sets", cycle, applied.len());
        self.emit(ChartEvent::FetchCompletedBatch {
            cycle,
            data_sets: applied,
        });
    }

    fn cancel(&mut self) {
        if self.tracker.status().is_idle() {
            return;
        }
        let cycle = self.tracker.cycle();
        self.teardown();
        tracing::debug!("Fetch cycle {} cancelled", cycle);
        self.emit(ChartEvent::FetchCancelled { cycle });
    }

    fn teardown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        for (_, fetch) in self.in_flight.drain() {
            fetch.abort();
        }
        self.tracker.reset();
    }

    fn emit(&self, event: ChartEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::chart_adapter::DateXFormatter;
    use crate::domain::chart::ChartKind;
    use crate::domain::period_table::PeriodTable;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Remove(String),
        Add(String, Vec<Entry>),
        Invalidate,
    }

    struct RecordingChart {
        formatter: Arc<DateXFormatter>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl ChartAdapter for RecordingChart {
        fn kind(&self) -> ChartKind {
            ChartKind::Line
        }

        fn x_formatter(&self) -> Arc<dyn XFormatter> {
            self.formatter.clone()
        }

        fn data_set_label(&self, name: &str) -> String {
            name.to_uppercase()
        }

        fn add_data_set(&mut self, data_set: DataSet) {
            self.calls.lock().unwrap().push(Call::Add(data_set.name, data_set.entries));
        }

        fn remove_data_set(&mut self, name: &str) {
            self.calls.lock().unwrap().push(Call::Remove(name.to_string()));
        }

        fn invalidate(&mut self) {
            self.calls.lock().unwrap().push(Call::Invalidate);
        }
    }

    enum Reply {
        Now(Vec<HistorySample>),
        After(Duration, Vec<HistorySample>),
        Fail,
        Never,
    }

    #[derive(Default)]
    struct ScriptedSource {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    }

    impl ScriptedSource {
        fn reply(self, name: &str, reply: Reply) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default()
                .push_back(reply);
            self
        }
    }

    #[async_trait]
    impl DataSetSource for ScriptedSource {
        async fn fetch(&self, name: &str, _limits: TimeRangeLimits) -> anyhow::Result<Vec<HistorySample>> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get_mut(name)
                .and_then(|q| q.pop_front())
                .unwrap_or(Reply::Never);
            match reply {
                Reply::Now(samples) => Ok(samples),
                Reply::After(delay, samples) => {
                    tokio::time::sleep(delay).await;
                    Ok(samples)
                }
                Reply::Fail => anyhow::bail!("device offline"),
                Reply::Never => std::future::pending().await,
            }
        }
    }

    fn origin() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn limits() -> TimeRangeLimits {
        TimeRangeLimits::new(origin(), origin() + chrono::Duration::seconds(10)).unwrap()
    }

    fn samples(values: &[f64]) -> Vec<HistorySample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| HistorySample::new(origin() + chrono::Duration::seconds(i as i64), *v))
            .collect()
    }

    fn start(
        source: ScriptedSource,
    ) -> (ChartOrchestrator, JoinHandle<RecordingChart>, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chart = RecordingChart {
            formatter: Arc::new(DateXFormatter::new(origin(), Arc::new(PeriodTable::default()))),
            calls: calls.clone(),
        };
        let options = OrchestratorOptions {
            default_recipe: Some(ReductionRecipe::passthrough()),
            ..OrchestratorOptions::default()
        };
        let (orchestrator, handle) = ChartOrchestrator::spawn(chart, Arc::new(source), options).unwrap();
        (orchestrator, handle, calls)
    }

    async fn next_batch(rx: &mut broadcast::Receiver<ChartEvent>) -> (u64, Vec<DataSet>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(120), rx.recv())
                .await
                .expect("no batch before deadline")
                .expect("event channel closed");
            if let ChartEvent::FetchCompletedBatch { cycle, data_sets } = event {
                return (cycle, data_sets);
            }
        }
    }

    fn invalidations(calls: &Arc<Mutex<Vec<Call>>>) -> usize {
        calls.lock().unwrap().iter().filter(|c| **c == Call::Invalidate).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_and_data_land_in_one_update() {
        let source = ScriptedSource::default()
            .reply("a", Reply::Now(samples(&[1.0, 2.0, 3.0])))
            .reply("b", Reply::Never);
        let (orchestrator, _handle, calls) = start(source);
        let mut rx = orchestrator.subscribe();

        let started = tokio::time::Instant::now();
        orchestrator.fetch(["a", "b"], limits()).await.unwrap();
        let (_, batch) = next_batch(&mut rx).await;

        assert!(started.elapsed() >= DEFAULT_FETCH_TIMEOUT);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].name, "a");
        assert_eq!(batch[0].label, "A");
        assert_eq!(batch[0].len(), 3);
        assert_eq!(batch[1].name, "b");
        assert_eq!(
            batch[1].entries,
            vec![Entry::new(0.0, 0.0), Entry::new(10_000.0, 0.0)]
        );

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| **c == Call::Invalidate).count(), 1);
        assert_eq!(calls.last(), Some(&Call::Invalidate));
        assert_eq!(calls[0], Call::Remove("a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_redraw_before_every_name_resolves() {
        let source = ScriptedSource::default()
            .reply("a", Reply::Now(samples(&[1.0])))
            .reply("b", Reply::After(Duration::from_secs(3), samples(&[5.0])));
        let (orchestrator, _handle, calls) = start(source);
        let mut rx = orchestrator.subscribe();

        orchestrator.fetch(["a", "b"], limits()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = orchestrator.status().await.unwrap();
        assert_eq!(status.completed.len(), 1);
        assert!(status.waiting.contains("b"));
        assert_eq!(invalidations(&calls), 0);

        let (_, batch) = next_batch(&mut rx).await;
        assert_eq!(batch[1].entries, vec![Entry::new(0.0, 5.0)]);
        assert_eq!(invalidations(&calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_after_completion_is_noop() {
        let source = ScriptedSource::default().reply("a", Reply::Now(samples(&[1.0, 2.0])));
        let (orchestrator, _handle, calls) = start(source);
        let mut rx = orchestrator.subscribe();

        orchestrator.fetch(["a"], limits()).await.unwrap();
        next_batch(&mut rx).await;
        tokio::time::sleep(DEFAULT_FETCH_TIMEOUT * 3).await;

        assert_eq!(invalidations(&calls), 1);
        let adds = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Add(..)))
            .count();
        assert_eq!(adds, 1);
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, ChartEvent::FetchTimedOut { .. }), "{event:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_for_completed_name_is_ignored() {
        let source = ScriptedSource::default()
            .reply("a", Reply::Now(samples(&[1.0, 2.0])))
            .reply("b", Reply::Never);
        let (orchestrator, _handle, calls) = start(source);
        let mut rx = orchestrator.subscribe();

        let cycle = orchestrator.fetch(["a", "b"], limits()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(orchestrator.status().await.unwrap().completed.contains("a"));

        // A timer message for "a" that was already queued when its data landed
        orchestrator
            .send(Command::TimedOut {
                cycle,
                name: "a".to_string(),
            })
            .await
            .unwrap();

        let status = orchestrator.status().await.unwrap();
        assert!(status.completed.contains("a"));
        assert!(status.waiting.contains("b"));
        assert_eq!(invalidations(&calls), 0);

        let mut timed_out = Vec::new();
        let batch = loop {
            match rx.recv().await.unwrap() {
                ChartEvent::FetchTimedOut { name, .. } => timed_out.push(name),
                ChartEvent::FetchCompletedBatch { data_sets, .. } => break data_sets,
                _ => {}
            }
        };
        assert_eq!(timed_out, vec!["b".to_string()]);
        assert_eq!(batch[0].entries, vec![Entry::new(0.0, 1.0), Entry::new(1_000.0, 2.0)]);
        assert_eq!(invalidations(&calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_after_timeout_is_dropped() {
        let source = ScriptedSource::default().reply("a", Reply::Never);
        let (orchestrator, _handle, calls) = start(source);
        let mut rx = orchestrator.subscribe();

        let cycle = orchestrator.fetch(["a"], limits()).await.unwrap();
        next_batch(&mut rx).await;

        orchestrator
            .send(Command::Received {
                cycle,
                name: "a".to_string(),
                result: Err(anyhow::anyhow!("connection reset")),
            })
            .await
            .unwrap();
        assert!(orchestrator.status().await.unwrap().is_idle());

        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, ChartEvent::FetchFailed { .. }), "{event:?}");
        }
        assert_eq!(invalidations(&calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_resolves_through_timeout() {
        let source = ScriptedSource::default()
            .reply("a", Reply::Fail)
            .reply("b", Reply::Now(samples(&[4.0])));
        let (orchestrator, _handle, calls) = start(source);
        let mut rx = orchestrator.subscribe();

        orchestrator.fetch(["a", "b"], limits()).await.unwrap();

        let mut failed = false;
        let mut timed_out = false;
        let batch = loop {
            match rx.recv().await.unwrap() {
                ChartEvent::FetchFailed { name, message, .. } => {
                    assert_eq!(name, "a");
                    assert!(message.contains("device offline"));
                    failed = true;
                }
                ChartEvent::FetchTimedOut { name, .. } => {
                    assert_eq!(name, "a");
                    timed_out = true;
                }
                ChartEvent::FetchCompletedBatch { data_sets, .. } => break data_sets,
                _ => {}
            }
        };

        assert!(failed && timed_out);
        assert_eq!(batch[0].entries.iter().map(|e| e.y).sum::<f64>(), 0.0);
        assert_eq!(batch[1].entries, vec![Entry::new(0.0, 4.0)]);
        assert_eq!(invalidations(&calls), 1);
    }

    struct PanickingSource;

    #[async_trait]
    impl DataSetSource for PanickingSource {
        async fn fetch(&self, _name: &str, _limits: TimeRangeLimits) -> anyhow::Result<Vec<HistorySample>> {
            panic!("decoder bug");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_is_reported_and_times_out() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chart = RecordingChart {
            formatter: Arc::new(DateXFormatter::new(origin(), Arc::new(PeriodTable::default()))),
            calls: calls.clone(),
        };
        let options = OrchestratorOptions {
            default_recipe: Some(ReductionRecipe::passthrough()),
            ..OrchestratorOptions::default()
        };
        let (orchestrator, _handle) = ChartOrchestrator::spawn(chart, Arc::new(PanickingSource), options).unwrap();
        let mut rx = orchestrator.subscribe();

        orchestrator.fetch(["a"], limits()).await.unwrap();
        let mut failed = false;
        loop {
            match rx.recv().await.unwrap() {
                ChartEvent::FetchFailed { message, .. } => {
                    assert!(message.contains("panicked"));
                    failed = true;
                }
                ChartEvent::FetchCompletedBatch { data_sets, .. } => {
                    assert_eq!(data_sets.len(), 1);
                    break;
                }
                _ => {}
            }
        }
        assert!(failed);
        assert_eq!(invalidations(&calls), 1);
    }

    /// Slow for the first window, instant for any other.
    struct SlowFirstWindow {
        slow: TimeRangeLimits,
    }

    #[async_trait]
    impl DataSetSource for SlowFirstWindow {
        async fn fetch(&self, _name: &str, limits: TimeRangeLimits) -> anyhow::Result<Vec<HistorySample>> {
            if limits == self.slow {
                tokio::time::sleep(Duration::from_secs(5)).await;
                return Ok(samples(&[1.0]));
            }
            Ok(samples(&[2.0]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_fetch_replaces_cycle_in_flight() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chart = RecordingChart {
            formatter: Arc::new(DateXFormatter::new(origin(), Arc::new(PeriodTable::default()))),
            calls: calls.clone(),
        };
        let slow = limits();
        let fast = TimeRangeLimits::new(origin(), origin() + chrono::Duration::seconds(20)).unwrap();
        let options = OrchestratorOptions {
            default_recipe: Some(ReductionRecipe::passthrough()),
            ..OrchestratorOptions::default()
        };
        let (orchestrator, _handle) =
            ChartOrchestrator::spawn(chart, Arc::new(SlowFirstWindow { slow }), options).unwrap();
        let mut rx = orchestrator.subscribe();

        let first = orchestrator.fetch(["a"], slow).await.unwrap();
        let second = orchestrator.fetch(["a"], fast).await.unwrap();
        assert!(second > first);

        let (cycle, batch) = next_batch(&mut rx).await;
        assert_eq!(cycle, second);
        assert_eq!(batch[0].entries, vec![Entry::new(0.0, 2.0)]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(invalidations(&calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_cycle() {
        let source = ScriptedSource::default().reply("a", Reply::Never);
        let (orchestrator, _handle, calls) = start(source);
        let mut events = Box::pin(event_stream(orchestrator.subscribe()));

        let cycle = orchestrator.fetch(["a"], limits()).await.unwrap();
        orchestrator.cancel().await.unwrap();

        assert!(matches!(events.next().await, Some(ChartEvent::FetchStarted { .. })));
        match events.next().await {
            Some(ChartEvent::FetchCancelled { cycle: cancelled }) => assert_eq!(cancelled, cycle),
            other => panic!("expected cancellation, got {other:?}"),
        }

        tokio::time::sleep(DEFAULT_FETCH_TIMEOUT * 2).await;
        assert!(orchestrator.status().await.unwrap().is_idle());
        assert_eq!(invalidations(&calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fetch_clears_immediately() {
        let (orchestrator, _handle, calls) = start(ScriptedSource::default());
        let mut rx = orchestrator.subscribe();

        let cycle = orchestrator.fetch(Vec::<String>::new(), limits()).await.unwrap();
        let (done, batch) = next_batch(&mut rx).await;

        assert_eq!(done, cycle);
        assert!(batch.is_empty());
        assert_eq!(invalidations(&calls), 1);
        assert!(orchestrator.status().await.unwrap().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_adapter() {
        let (orchestrator, handle, _calls) = start(ScriptedSource::default());
        orchestrator.shutdown().await.unwrap();

        let chart = handle.await.unwrap();
        assert_eq!(chart.kind(), ChartKind::Line);
        assert_eq!(orchestrator.status().await, Err(ChartError::OrchestratorClosed));
    }
}
