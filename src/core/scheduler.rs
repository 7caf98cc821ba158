//! # Per-registry task scheduler.
//!
//! Orders subscribe/drop work per registry. Each submitted task gets a
//! strictly increasing sequence number and, before it starts, waits for every
//! not-yet-completed task it depends on.
//!
//! ## Dependency rules
//! ```text
//! Drop(R, n)      waits for  Subscribe(R, m < n), Drop(R, m < n)
//! Subscribe(R, n) waits for  Drop(R, m < n)
//! ```
//! Tasks for different registries never wait for each other.
//!
//! ## Task lifecycle
//! ```text
//! submit ─► Pending ──(deps done, permit acquired)──► Running ──► Done
//!              │                                                   ▲
//!              └──── cancel_tasks_for(R) ──► Cancelled ────────────┘ (done signalled)
//! ```
//!
//! ## Rules
//! - Only `Pending` tasks can be cancelled; a running task completes and
//!   observes termination itself.
//! - Every task token is a child of the runtime token; terminate cancels
//!   everything still pending.
//! - Completion (including cancellation and a panicking task) removes the
//!   task from the queue and signals its dependents.
//! - Optional global concurrency limit via `Semaphore` (`task_concurrency`).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::registry::RegistryId;

/// Kind of per-registry work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Subscribe,
    Drop,
}

impl TaskKind {
    fn as_label(&self) -> &'static str {
        match self {
            TaskKind::Subscribe => "subscribe",
            TaskKind::Drop => "drop",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Running,
    Cancelled,
}

struct PendingTask {
    seq: u64,
    kind: TaskKind,
    registry: RegistryId,
    state: Mutex<TaskState>,
    /// Cancelled once the task left the queue.
    done: CancellationToken,
    /// Cancels the task before it starts (child of the runtime token).
    cancel: CancellationToken,
}

impl PendingTask {
    fn depends_on(&self, other: &PendingTask) -> bool {
        if other.registry != self.registry || other.seq >= self.seq {
            return false;
        }
        match self.kind {
            TaskKind::Drop => true,
            TaskKind::Subscribe => other.kind == TaskKind::Drop,
        }
    }

    /// Pending → Running. Fails if the task was cancelled first.
    fn try_start(&self) -> bool {
        let mut state = self.state.lock();
        if *state == TaskState::Pending {
            *state = TaskState::Running;
            true
        } else {
            false
        }
    }

    /// Pending → Cancelled. Fails if the task already started.
    fn try_cancel(&self) -> bool {
        let mut state = self.state.lock();
        if *state == TaskState::Pending {
            *state = TaskState::Cancelled;
            true
        } else {
            false
        }
    }
}

/// Completes its task when dropped, whether the work returned or unwound.
struct Completion {
    scheduler: Arc<TaskScheduler>,
    task: Arc<PendingTask>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.scheduler.complete(&self.task);
    }
}

/// Dependency-ordered executor for registry tasks.
pub(crate) struct TaskScheduler {
    queue: Mutex<Vec<Arc<PendingTask>>>,
    next_seq: AtomicU64,
    semaphore: Option<Arc<Semaphore>>,
    runtime_token: CancellationToken,
    bus: Bus,
}

impl TaskScheduler {
    pub(crate) fn new(bus: Bus, runtime_token: CancellationToken, concurrency: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            semaphore: concurrency.map(|n| Arc::new(Semaphore::new(n))),
            runtime_token,
            bus,
        })
    }

    /// Queues `work` for `registry`; it starts once its dependencies completed.
    ///
    /// Returns the task's sequence number.
    pub(crate) fn submit<F>(self: &Arc<Self>, kind: TaskKind, registry: RegistryId, work: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(PendingTask {
            seq,
            kind,
            registry,
            state: Mutex::new(TaskState::Pending),
            done: CancellationToken::new(),
            cancel: self.runtime_token.child_token(),
        });

        let deps: Vec<CancellationToken> = {
            let mut queue = self.queue.lock();
            let deps = queue
                .iter()
                .filter(|other| task.depends_on(other))
                .map(|other| other.done.clone())
                .collect();
            queue.push(Arc::clone(&task));
            deps
        };

        let done = Completion {
            scheduler: Arc::clone(self),
            task,
        };
        tokio::spawn(async move {
            let task = &done.task;
            let sem = done.scheduler.semaphore.clone();
            let ready = async move {
                for dep in deps {
                    dep.cancelled().await;
                }
                match sem {
                    Some(s) => s.acquire_owned().await.ok().map(Some),
                    None => Some(None),
                }
            };

            let permit = tokio::select! {
                _ = task.cancel.cancelled() => None,
                p = ready => p,
            };
            if let Some(_permit) = permit {
                if task.try_start() {
                    work.await;
                }
            }
            drop(done);
        });
        seq
    }

    /// Cancels every not-yet-started task for `registry`.
    ///
    /// Returns the number of cancelled tasks.
    pub(crate) fn cancel_tasks_for(&self, registry: &RegistryId) -> usize {
        let cancelled: Vec<Arc<PendingTask>> = self
            .queue
            .lock()
            .iter()
            .filter(|t| &t.registry == registry && t.try_cancel())
            .cloned()
            .collect();

        for task in &cancelled {
            task.cancel.cancel();
            self.bus.publish(
                Event::new(EventKind::TaskCancelled)
                    .with_registry(task.registry.clone())
                    .with_reason(task.kind.as_label()),
            );
        }
        cancelled.len()
    }

    /// Number of tasks not yet completed.
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn complete(&self, task: &Arc<PendingTask>) {
        self.queue.lock().retain(|t| !Arc::ptr_eq(t, task));
        task.done.cancel();
    }
}
