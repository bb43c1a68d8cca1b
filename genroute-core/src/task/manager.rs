//! Task poller and reconciler.
//!
//! `TaskManager` owns the in-flight set, the two notification seen-sets and
//! the visible list. A single timer task drives polling; every poll round and
//! the cold-start recovery go through the same fold.

use arc_swap::ArcSwap;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use super::board::{JobBoard, StatusQuery};
use super::classify::{classify_failure, FailureKind, SUCCESS_KEY};
use super::{sort_entries, EntryStatus, Task, TaskId, TaskStatus, VisibleEntry};
use crate::config::PollerConfig;
use crate::error::GenError;

/// Shortest poll period; `tokio::time::interval` rejects zero
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Formats the prompt of a recovered entry
pub type PromptFormatter = dyn Fn(&Task) -> String + Send + Sync;

/// Stream of one-time notifications
pub type Notifications = UnboundedReceiverStream<Notification>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Succeeded,
    Failed(FailureKind),
    /// The status query itself failed
    QueryFailed,
}

/// A one-time, user-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// `None` for query failures
    pub task_id: Option<TaskId>,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn message_key(&self) -> &'static str {
        match self.kind {
            NotificationKind::Succeeded => SUCCESS_KEY,
            NotificationKind::Failed(kind) => kind.message_key(),
            NotificationKind::QueryFailed => FailureKind::GenerationFailed.message_key(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == NotificationKind::Succeeded
    }
}

/// Result of one poll round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing in flight; the timer was stopped and no query was issued
    Idle,
    /// Results were folded in
    Polled { remaining: usize },
    /// Polling was stopped while the query was outstanding
    Discarded,
    /// The status query failed; polling was stopped
    QueryFailed,
}

#[derive(Default)]
struct PollState {
    in_flight: Vec<TaskId>,
    notified_success: HashSet<TaskId>,
    notified_failure: HashSet<TaskId>,
    entries: Vec<VisibleEntry>,
    timer: Option<JoinHandle<()>>,
}

impl PollState {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn forget(&mut self, id: TaskId) {
        self.in_flight.retain(|known| *known != id);
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.matches(id))
    }

    /// Fold one batch of reported tasks into the visible list
    fn fold(&mut self, tasks: Vec<Task>, notify: bool) -> Vec<Notification> {
        let mut notes = Vec::new();

        for task in tasks {
            if task.id.is_example() {
                continue;
            }

            match task.status {
                TaskStatus::Succeeded => {
                    self.apply_success(&task);
                    if notify && self.notified_success.insert(task.id) {
                        notes.push(Notification {
                            task_id: Some(task.id),
                            kind: NotificationKind::Succeeded,
                        });
                    }
                }
                TaskStatus::Processing | TaskStatus::Pending => {
                    self.apply_in_progress(&task);
                }
                TaskStatus::Failed | TaskStatus::Finished | TaskStatus::Replaced => {
                    if task.status.is_failure() && notify && self.notified_failure.insert(task.id) {
                        let kind =
                            classify_failure(task.failure.as_deref(), task.failure_code.as_deref());
                        debug!(task = %task.id, ?kind, "task failed");
                        notes.push(Notification {
                            task_id: Some(task.id),
                            kind: NotificationKind::Failed(kind),
                        });
                    }
                    self.entries
                        .retain(|entry| entry.is_example() || !entry.matches(task.id));
                }
            }

            if task.status.is_terminal() {
                self.forget(task.id);
            }
            sort_entries(&mut self.entries);
        }

        notes
    }

    fn apply_success(&mut self, task: &Task) {
        let canonical = task.generation_id.unwrap_or(task.id);
        let position = self.position(task.id).or_else(|| self.position(canonical));

        match position {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.id != canonical {
                    entry.task_id = Some(entry.id);
                    entry.id = canonical;
                }
                entry.status = EntryStatus::Done;
                if task.output.is_some() {
                    entry.output = task.output.clone();
                }
                if entry.created_at.is_none() {
                    entry.created_at = task.created_at;
                }
            }
            None => self.entries.push(VisibleEntry {
                id: canonical,
                task_id: (canonical != task.id).then_some(task.id),
                status: EntryStatus::Done,
                output: task.output.clone(),
                prompt: task.prompt.clone().unwrap_or_default(),
                created_at: task.created_at,
            }),
        }

        // re-keying may collide with an entry already carrying the generation id
        let mut seen = HashSet::new();
        self.entries.retain(|entry| seen.insert(entry.id));
    }

    fn apply_in_progress(&mut self, task: &Task) {
        match self.position(task.id) {
            Some(index) => self.entries[index].status = EntryStatus::Generating,
            None => self.entries.insert(
                0,
                VisibleEntry::generating(
                    task.id,
                    task.prompt.clone().unwrap_or_default(),
                    task.created_at.unwrap_or_else(Utc::now),
                ),
            ),
        }
    }
}

struct Inner {
    board: Arc<dyn JobBoard>,
    interval: Duration,
    state: Mutex<PollState>,
    snapshot: ArcSwap<Vec<VisibleEntry>>,
    // serializes poll rounds and recovery
    gate: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
    notifier: mpsc::UnboundedSender<Notification>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PollState) {
        self.snapshot.store(Arc::new(state.entries.clone()));
    }

    fn emit(&self, notes: Vec<Notification>) {
        for note in notes {
            // a dropped receiver only means nobody is listening
            let _ = self.notifier.send(note);
        }
    }

    async fn poll_round(&self) -> PollOutcome {
        let _gate = self.gate.lock().await;

        let (epoch, ids) = {
            let mut state = self.lock_state();
            if state.in_flight.is_empty() {
                state.stop_timer();
                return PollOutcome::Idle;
            }
            (self.epoch.load(Ordering::SeqCst), state.in_flight.clone())
        };

        debug!(count = ids.len(), "polling task status");
        let result = self.board.query(StatusQuery::by_ids(ids)).await;

        let mut state = self.lock_state();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("discarding poll result after stop");
            return PollOutcome::Discarded;
        }

        match result {
            Ok(tasks) => {
                let notes = state.fold(tasks, true);
                self.publish(&state);
                let remaining = state.in_flight.len();
                drop(state);
                self.emit(notes);
                PollOutcome::Polled { remaining }
            }
            Err(err) => {
                warn!(error = %err, "task status query failed, stopping poller");
                self.epoch.fetch_add(1, Ordering::SeqCst);
                state.stop_timer();
                let in_flight = state.in_flight.clone();
                state
                    .entries
                    .retain(|entry| !in_flight.iter().any(|id| entry.matches(*id)));
                self.publish(&state);
                drop(state);
                self.emit(vec![Notification {
                    task_id: None,
                    kind: NotificationKind::QueryFailed,
                }]);
                PollOutcome::QueryFailed
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.lock_state().stop_timer();
    }
}

fn spawn_timer(inner: &Arc<Inner>) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime, poll timer not started");
        return None;
    };

    let weak: Weak<Inner> = Arc::downgrade(inner);
    let period = inner.interval;
    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            match inner.poll_round().await {
                PollOutcome::Polled { .. } => {}
                _ => break,
            }
        }
    }))
}

/// Builder for [`TaskManager`]
pub struct TaskManagerBuilder {
    board: Arc<dyn JobBoard>,
    interval: Duration,
    example: Option<VisibleEntry>,
}

impl TaskManagerBuilder {
    /// Poll interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Seed the sentinel example entry
    pub fn example(mut self, output: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.example = Some(VisibleEntry::example(output, prompt));
        self
    }

    /// Apply a poller configuration
    pub fn config(mut self, config: &PollerConfig) -> Self {
        self.interval = config.interval();
        if let Some(example) = &config.example {
            self.example = Some(VisibleEntry::example(&example.output, &example.prompt));
        }
        self
    }

    /// Build the manager and the stream its notifications are delivered on.
    /// Intervals shorter than [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn build(self) -> (TaskManager, Notifications) {
        let interval = if self.interval < MIN_POLL_INTERVAL {
            warn!(requested = ?self.interval, "poll interval too short, using the minimum");
            MIN_POLL_INTERVAL
        } else {
            self.interval
        };
        let (notifier, receiver) = mpsc::unbounded_channel();
        let entries: Vec<VisibleEntry> = self.example.into_iter().collect();

        let inner = Inner {
            board: self.board,
            interval,
            snapshot: ArcSwap::from_pointee(entries.clone()),
            state: Mutex::new(PollState {
                entries,
                ..PollState::default()
            }),
            gate: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
            notifier,
        };

        (
            TaskManager {
                inner: Arc::new(inner),
            },
            UnboundedReceiverStream::new(receiver),
        )
    }
}

/// Tracks submitted tasks until they reach a terminal status
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("TaskManager")
            .field("interval", &self.inner.interval)
            .field("in_flight", &state.in_flight)
            .field("visible", &state.entries.len())
            .finish()
    }
}

impl TaskManager {
    pub fn builder(board: Arc<dyn JobBoard>) -> TaskManagerBuilder {
        TaskManagerBuilder {
            board,
            interval: PollerConfig::default().interval(),
            example: None,
        }
    }

    /// Add a task to the in-flight set, starting the timer if it is idle.
    /// Returns false for the example id and for ids already in flight.
    pub fn add_task(&self, id: TaskId) -> bool {
        self.add_tasks([id]) == 1
    }

    /// Add several tasks; returns how many were new
    pub fn add_tasks(&self, ids: impl IntoIterator<Item = TaskId>) -> usize {
        let mut state = self.inner.lock_state();
        let mut added = 0;
        for id in ids {
            if id.is_example() || state.in_flight.contains(&id) {
                continue;
            }
            state.in_flight.push(id);
            added += 1;
        }
        if added > 0 {
            debug!(added, in_flight = state.in_flight.len(), "tasks added");
            self.ensure_timer(&mut state);
        }
        added
    }

    /// Stop tracking a task. Its visible entry is left as is.
    pub fn remove_task(&self, id: TaskId) -> bool {
        let mut state = self.inner.lock_state();
        let before = state.in_flight.len();
        state.forget(id);
        before != state.in_flight.len()
    }

    /// Run one poll round immediately
    pub async fn poll_once(&self) -> PollOutcome {
        self.inner.poll_round().await
    }

    /// Start the timer if tasks are in flight and it is not running
    pub fn start(&self) {
        let mut state = self.inner.lock_state();
        if !state.in_flight.is_empty() {
            self.ensure_timer(&mut state);
        }
    }

    /// Stop polling. Idempotent; results of an outstanding query are
    /// discarded when they arrive.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        state.stop_timer();
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .lock_state()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Ids currently awaiting a terminal status
    pub fn in_flight(&self) -> Vec<TaskId> {
        self.inner.lock_state().in_flight.clone()
    }

    /// Current visible list, in display order
    pub fn visible(&self) -> Arc<Vec<VisibleEntry>> {
        self.inner.snapshot.load_full()
    }

    /// Seed the visible list from a previous session.
    ///
    /// For every tool, persisted results and still-running tasks are loaded,
    /// merged and de-duplicated by id, then folded in without notifications.
    /// Running tasks join the in-flight set. Lookup failures for a tool are
    /// logged and treated as empty.
    pub async fn recover(
        &self,
        tools: &[&str],
        formatter: Option<&PromptFormatter>,
    ) -> Result<usize, GenError> {
        let board = &self.inner.board;
        let loads = tools.iter().map(|tool| async move {
            let (running, results) = futures::join!(
                board.query(StatusQuery::in_flight_for_tool(*tool)),
                board.load_results(tool)
            );
            let running = running.unwrap_or_else(|err| {
                warn!(tool, error = %err, "failed to recover running tasks");
                Vec::new()
            });
            let results = results.unwrap_or_else(|err| {
                warn!(tool, error = %err, "failed to load persisted results");
                Vec::new()
            });
            (running, results)
        });
        let loaded = futures::future::join_all(loads).await;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut running = Vec::new();
        for (tool_running, tool_results) in loaded {
            for task in tool_results {
                if seen.insert(task.id) {
                    results.push(task);
                }
            }
            for task in tool_running {
                if seen.insert(task.id) {
                    running.push(task);
                }
            }
        }

        let format = |mut task: Task| {
            if let Some(formatter) = formatter {
                task.prompt = Some(formatter(&task));
            }
            task
        };
        let running: Vec<Task> = running.into_iter().map(format).collect();
        let results: Vec<Task> = results
            .into_iter()
            .map(|mut task| {
                task.status = TaskStatus::Succeeded;
                format(task)
            })
            .collect();

        let _gate = self.inner.gate.lock().await;
        let mut state = self.inner.lock_state();
        let running_ids: Vec<TaskId> = running.iter().map(|task| task.id).collect();
        state.fold(results, false);
        state.fold(running, false);
        for id in running_ids {
            if !state.in_flight.contains(&id) {
                state.in_flight.push(id);
            }
        }
        if !state.in_flight.is_empty() {
            self.ensure_timer(&mut state);
        }
        self.inner.publish(&state);

        debug!(visible = state.entries.len(), "recovered task state");
        Ok(state.entries.len())
    }

    fn ensure_timer(&self, state: &mut PollState) {
        let running = state
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished());
        if !running {
            state.timer = spawn_timer(&self.inner);
        }
    }
}
