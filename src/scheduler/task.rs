use crate::{CrawlError, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    // ===== Active States =====
    /// Registered but not yet in the queue
    Created,

    /// Waiting for a free slot
    Queued,

    /// Running
    Executing,

    // ===== Terminal States =====
    Completed,
    Failed,

    /// Removed from the queue before it started
    Cancelled,
}

impl TaskStatus {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// created → queued → executing → {completed | failed}; anything not
    /// yet executing may be cancelled.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Queued)
                | (Self::Created, Self::Cancelled)
                | (Self::Queued, Self::Executing)
                | (Self::Queued, Self::Cancelled)
                | (Self::Executing, Self::Completed)
                | (Self::Executing, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping record of a scheduled task
///
/// The task's result is delivered through its [`TaskHandle`](super::TaskHandle),
/// not stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapingTask {
    pub id: u64,
    pub domain: Option<String>,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ScrapingTask {
    pub fn new(id: u64, priority: i32, domain: Option<String>, max_retries: u32) -> Self {
        Self {
            id,
            domain,
            priority,
            retry_count: 0,
            max_retries,
            status: TaskStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Moves the task to `next`, stamping start and completion times
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match next {
            TaskStatus::Executing => self.started_at = Some(Utc::now()),
            status if status.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}

/// Hooks invoked as a task moves through its lifecycle
pub struct TaskCallbacks<T> {
    pub on_start: Option<Box<dyn Fn(&ScrapingTask) + Send + Sync>>,
    pub on_complete: Option<Box<dyn Fn(&ScrapingTask, &T) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(&ScrapingTask, &CrawlError) + Send + Sync>>,
}

impl<T> Default for TaskCallbacks<T> {
    fn default() -> Self {
        Self {
            on_start: None,
            on_complete: None,
            on_error: None,
        }
    }
}

/// Options for [`TaskScheduler::add_task`](super::TaskScheduler::add_task)
pub struct TaskOptions<T> {
    /// Higher runs first
    pub priority: i32,
    pub domain: Option<String>,
    /// Recorded on the task; the scheduler itself never retries
    pub max_retries: u32,
    pub callbacks: TaskCallbacks<T>,
}

impl<T> Default for TaskOptions<T> {
    fn default() -> Self {
        Self {
            priority: 0,
            domain: None,
            max_retries: 0,
            callbacks: TaskCallbacks::default(),
        }
    }
}

impl<T> TaskOptions<T> {
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}
