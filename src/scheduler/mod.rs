//! Global task admission
//!
//! Bounds the number of tasks in flight across all domains. Pending tasks
//! wait in a priority queue (higher priority first, then submission order)
//! and start as slots free up. The scheduler never retries; a task's
//! future decides that for itself.

mod task;

pub use task::{ScrapingTask, TaskCallbacks, TaskOptions, TaskStatus};

use crate::config::SchedulerConfig;
use crate::{CrawlError, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{self, AtomicU64};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Type-erased task that has not started yet
trait Launch: Send {
    /// Runs the task to settlement, then frees its slot
    fn launch(self: Box<Self>, task: ScrapingTask, pool: Arc<PoolInner>) -> BoxFuture<'static, ()>;

    /// Rejects the task without running it
    fn cancel(self: Box<Self>, task: ScrapingTask, error: CrawlError);
}

struct TypedLaunch<T, Fut> {
    future: Fut,
    reply: oneshot::Sender<Result<T>>,
    callbacks: TaskCallbacks<T>,
}

impl<T, Fut> Launch for TypedLaunch<T, Fut>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    fn launch(self: Box<Self>, task: ScrapingTask, pool: Arc<PoolInner>) -> BoxFuture<'static, ()> {
        let TypedLaunch {
            future,
            reply,
            callbacks,
        } = *self;

        Box::pin(async move {
            let slot = Slot(pool);

            if let Some(on_start) = &callbacks.on_start {
                run_callback(task.id, "on_start", || on_start(&task));
            }

            // A separate task so a panic still settles and frees the slot
            let outcome = match tokio::spawn(future).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Task {} aborted: {}", task.id, e);
                    Err(CrawlError::TaskAborted { task_id: task.id })
                }
            };

            let settled = slot.0.settle(task, outcome.as_ref().err());
            match &outcome {
                Ok(value) => {
                    if let Some(on_complete) = &callbacks.on_complete {
                        run_callback(settled.id, "on_complete", || on_complete(&settled, value));
                    }
                }
                Err(error) => {
                    if let Some(on_error) = &callbacks.on_error {
                        run_callback(settled.id, "on_error", || on_error(&settled, error));
                    }
                }
            }

            drop(slot);
            let _ = reply.send(outcome);
        })
    }

    fn cancel(self: Box<Self>, task: ScrapingTask, error: CrawlError) {
        if let Some(on_error) = &self.callbacks.on_error {
            run_callback(task.id, "on_error", || on_error(&task, &error));
        }
        let _ = self.reply.send(Err(error));
    }
}

/// Runs a user callback, logging a panic instead of unwinding
fn run_callback(task_id: u64, name: &str, callback: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!("Task {}: {} callback panicked", task_id, name);
    }
}

/// An occupied slot, freed when dropped
struct Slot(Arc<PoolInner>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// A queued task, ordered for the max-heap
struct PendingEntry {
    id: u64,
    priority: i32,
    launch: Box<dyn Launch>,
}

// Higher priority first; among equals the lower id (earlier submission)
impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PendingEntry {}

#[derive(Default)]
struct PoolState {
    pending: BinaryHeap<PendingEntry>,
    running: usize,
    /// Records of tasks that have not settled yet
    tasks: HashMap<u64, ScrapingTask>,
}

struct PoolInner {
    max_concurrency: usize,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

impl PoolInner {
    /// Marks a task completed or failed and drops its record
    fn settle(&self, task: ScrapingTask, error: Option<&CrawlError>) -> ScrapingTask {
        let mut state = self.state.lock();
        let mut record = state.tasks.remove(&task.id).unwrap_or(task);

        let next = match error {
            None => TaskStatus::Completed,
            Some(e) => {
                record.error = Some(e.to_string());
                TaskStatus::Failed
            }
        };
        if let Err(e) = record.transition(next) {
            tracing::warn!("Task {}: {}", record.id, e);
        }
        record
    }

    /// Frees a slot and starts whatever fits
    fn release(self: &Arc<Self>) {
        self.state.lock().running -= 1;
        pump(self);
    }
}

/// Starts pending tasks while slots are free
///
/// Selection happens in one critical section, so concurrent passes never
/// start more than the configured maximum.
fn pump(inner: &Arc<PoolInner>) {
    let ready: Vec<(Box<dyn Launch>, ScrapingTask)> = {
        let mut state = inner.state.lock();
        let mut ready = Vec::new();

        while state.running < inner.max_concurrency {
            let Some(entry) = state.pending.pop() else {
                break;
            };
            let Some(task) = state.tasks.get_mut(&entry.id) else {
                continue;
            };
            if let Err(e) = task.transition(TaskStatus::Executing) {
                tracing::warn!("Task {}: {}", entry.id, e);
                continue;
            }
            let snapshot = task.clone();
            state.running += 1;
            ready.push((entry.launch, snapshot));
        }
        ready
    };

    for (launch, task) in ready {
        tracing::trace!("Starting task {} (priority {})", task.id, task.priority);
        tokio::spawn(launch.launch(task, Arc::clone(inner)));
    }
}

/// Future resolving to a task's result
///
/// Dropping the handle does not cancel the task.
pub struct TaskHandle<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(CrawlError::TaskAborted { task_id: id })))
    }
}

/// Bounded-concurrency, priority-ordered task pool
///
/// Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<PoolInner>,
}

impl TaskScheduler {
    /// Creates a scheduler running at most `max_concurrency` tasks (minimum 1)
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_concurrency: max_concurrency.max(1),
                state: Mutex::new(PoolState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_concurrent_tasks)
    }

    /// Queues a task and returns a handle to its result
    ///
    /// Must be called within a Tokio runtime.
    pub fn add_task<T, Fut>(&self, future: Fut, options: TaskOptions<T>) -> TaskHandle<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.add_task_with_id(|_| future, options)
    }

    /// Like [`add_task`](Self::add_task), building the future from the task id
    pub fn add_task_with_id<T, F, Fut>(&self, make: F, options: TaskOptions<T>) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, atomic::Ordering::Relaxed);
        let future = make(id);
        let (tx, rx) = oneshot::channel();

        let mut task = ScrapingTask::new(id, options.priority, options.domain, options.max_retries);
        if let Err(e) = task.transition(TaskStatus::Queued) {
            tracing::warn!("Task {}: {}", id, e);
        }

        {
            let mut state = self.inner.state.lock();
            state.tasks.insert(id, task);
            state.pending.push(PendingEntry {
                id,
                priority: options.priority,
                launch: Box::new(TypedLaunch {
                    future,
                    reply: tx,
                    callbacks: options.callbacks,
                }),
            });
        }

        pump(&self.inner);
        TaskHandle { id, rx }
    }

    /// Cancels every task that has not started; returns how many
    ///
    /// Executing tasks are left to finish.
    pub fn clear_pending_tasks(&self) -> usize {
        let cancelled: Vec<(Box<dyn Launch>, ScrapingTask)> = {
            let mut state = self.inner.state.lock();
            let entries: Vec<PendingEntry> = state.pending.drain().collect();
            entries
                .into_iter()
                .filter_map(|entry| {
                    let mut task = state.tasks.remove(&entry.id)?;
                    if let Err(e) = task.transition(TaskStatus::Cancelled) {
                        tracing::warn!("Task {}: {}", entry.id, e);
                    }
                    Some((entry.launch, task))
                })
                .collect()
        };

        let count = cancelled.len();
        for (launch, task) in cancelled {
            let error = CrawlError::Cancelled { task_id: task.id };
            launch.cancel(task, error);
        }
        if count > 0 {
            tracing::info!("Cancelled {} pending tasks", count);
        }
        count
    }

    /// Records that a task's own logic is retrying
    pub fn note_retry(&self, id: u64) {
        if let Some(task) = self.inner.state.lock().tasks.get_mut(&id) {
            task.retry_count += 1;
        }
    }

    /// Snapshot of an unsettled task
    pub fn task(&self, id: u64) -> Option<ScrapingTask> {
        self.inner.state.lock().tasks.get(&id).cloned()
    }

    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }
}
