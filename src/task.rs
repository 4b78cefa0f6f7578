//! Background encode tasks with completions delivered on one thread.
//!
//! Encode jobs run on a rayon worker pool. When a job finishes, its
//! completion handler is queued on a channel owned by the
//! [`EncodeExecutor`], and runs only when the thread holding the executor
//! calls [`dispatch_pending`](EncodeExecutor::dispatch_pending),
//! [`wait_one`](EncodeExecutor::wait_one) or [`drain`](EncodeExecutor::drain).
//! Handlers therefore never run on a worker thread, and they run in
//! completion order rather than scheduling order.
//!
//! Every task holds a *subject*, typically a canvas snapshot, from
//! scheduling until its handler has returned.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, mpsc};
use std::time::Duration;

use crate::env_config::{WORKERS_VAR, env_var_positive_u64};
use crate::error::{StackError, StackResult};

pub type TaskId = u64;

/// Lifecycle of one background encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Scheduled = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Scheduled,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Handle to a scheduled task. Cheap to clone, readable from any thread.
#[derive(Clone, Debug)]
pub struct EncodeTicket {
    id: TaskId,
    state: Arc<AtomicU8>,
}

impl EncodeTicket {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// State of the job itself. A terminal state means the result is
    /// queued; the handler may not have run yet.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }
}

/// Worker-pool configuration for an [`EncodeExecutor`].
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Number of encode worker threads. Values below 1 are raised to 1.
    pub workers: usize,
    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let workers = env_var_positive_u64(WORKERS_VAR)
            .map(|n| n as usize)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });
        Self {
            workers,
            thread_name: "jpeg-stack-encode".to_string(),
        }
    }
}

/// Live task counters, updated atomically by workers and the dispatch
/// thread.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub scheduled: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    /// Tasks whose handler has not returned yet.
    pub outstanding: AtomicU64,
}

impl ExecutorStats {
    pub fn snapshot(&self) -> ExecutorStatsSnapshot {
        ExecutorStatsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Acquire),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutorStatsSnapshot {
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
    pub outstanding: u64,
}

type Completion = Box<dyn FnOnce() + Send>;

fn build_pool(config: &ExecutorConfig) -> StackResult<Arc<rayon::ThreadPool>> {
    let prefix = config.thread_name.clone();
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .thread_name(move |idx| format!("{prefix}-{idx}"))
        .build()
        .map(Arc::new)
        .map_err(|e| StackError::WorkerUnavailable(format!("failed to build worker pool: {e}")))
}

fn default_pool() -> StackResult<Arc<rayon::ThreadPool>> {
    static POOL: OnceLock<Result<Arc<rayon::ThreadPool>, String>> = OnceLock::new();
    POOL.get_or_init(|| build_pool(&ExecutorConfig::default()).map_err(|e| e.to_string()))
        .clone()
        .map_err(StackError::WorkerUnavailable)
}

/// Sending half of an executor. `Send + Sync + Clone`, so any thread can
/// schedule work whose handler will run on the executor's thread.
#[derive(Clone)]
pub struct TaskSpawner {
    pool: Arc<rayon::ThreadPool>,
    stats: Arc<ExecutorStats>,
    next_id: Arc<AtomicU64>,
    tx: mpsc::Sender<Completion>,
}

impl TaskSpawner {
    /// Run `job(&subject)` on a worker and queue `handler(result)` for the
    /// dispatch thread. `subject` is dropped only after `handler` returns.
    ///
    /// A panic inside `job` is reported to `handler` as an encode failure.
    /// A panic inside `handler` unwinds out of the dispatch call.
    pub fn spawn<S, T, J, H>(&self, subject: S, job: J, handler: H) -> EncodeTicket
    where
        S: Send + 'static,
        T: Send + 'static,
        J: FnOnce(&S) -> StackResult<T> + Send + 'static,
        H: FnOnce(StackResult<T>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(TaskState::Scheduled as u8));
        self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
        self.stats.outstanding.fetch_add(1, Ordering::AcqRel);
        log::debug!("scheduled encode task {id}");

        let task_state = Arc::clone(&state);
        let stats = Arc::clone(&self.stats);
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            task_state.store(TaskState::Running as u8, Ordering::Release);
            let result = catch_unwind(AssertUnwindSafe(|| job(&subject)))
                .unwrap_or_else(|_| Err(StackError::encode(format!("encode task {id} panicked"))));

            let terminal = match &result {
                Ok(_) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    TaskState::Completed
                }
                Err(e) => {
                    log::warn!("encode task {id} failed: {e}");
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    TaskState::Failed
                }
            };
            task_state.store(terminal as u8, Ordering::Release);

            let completion: Completion = Box::new(move || {
                handler(result);
                drop(subject);
                log::debug!("encode task {id} delivered");
            });
            if tx.send(completion).is_err() {
                log::debug!("executor gone, discarding result of encode task {id}");
            }
        });

        EncodeTicket { id, state }
    }

    pub fn stats(&self) -> &Arc<ExecutorStats> {
        &self.stats
    }
}

/// Owner of the completion queue. Deliberately not `Sync`: the thread
/// holding it is the one place handlers run.
pub struct EncodeExecutor {
    spawner: TaskSpawner,
    rx: mpsc::Receiver<Completion>,
}

impl EncodeExecutor {
    /// Executor backed by the process-wide default worker pool, sized by
    /// `JPEG_STACK_WORKERS` or the available parallelism.
    pub fn new() -> StackResult<Self> {
        Ok(Self::from_pool(default_pool()?))
    }

    /// Executor with a dedicated worker pool.
    pub fn with_config(config: ExecutorConfig) -> StackResult<Self> {
        Ok(Self::from_pool(build_pool(&config)?))
    }

    fn from_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            spawner: TaskSpawner {
                pool,
                stats: Arc::new(ExecutorStats::default()),
                next_id: Arc::new(AtomicU64::new(1)),
                tx,
            },
            rx,
        }
    }

    pub fn spawner(&self) -> &TaskSpawner {
        &self.spawner
    }

    /// Tasks scheduled through this executor whose handler has not run.
    pub fn pending(&self) -> usize {
        self.spawner.stats.outstanding.load(Ordering::Acquire) as usize
    }

    pub fn stats(&self) -> ExecutorStatsSnapshot {
        self.spawner.stats.snapshot()
    }

    /// Run every handler whose task has already finished, without
    /// blocking. Returns the number of handlers run.
    pub fn dispatch_pending(&self) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.rx.try_recv() {
            self.deliver(completion);
            delivered += 1;
        }
        delivered
    }

    /// Block until one task finishes and run its handler. Returns `false`
    /// immediately when nothing is outstanding.
    pub fn wait_one(&self) -> bool {
        if self.pending() == 0 {
            return false;
        }
        match self.rx.recv() {
            Ok(completion) => {
                self.deliver(completion);
                true
            }
            Err(mpsc::RecvError) => false,
        }
    }

    /// Like [`wait_one`](Self::wait_one) but gives up after `timeout`.
    pub fn wait_one_timeout(&self, timeout: Duration) -> bool {
        if self.pending() == 0 {
            return false;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.deliver(completion);
                true
            }
            Err(_) => false,
        }
    }

    /// Run handlers until no task is outstanding. Returns the number of
    /// handlers run.
    pub fn drain(&self) -> usize {
        let mut delivered = 0;
        while self.wait_one() {
            delivered += 1;
        }
        delivered
    }

    fn deliver(&self, completion: Completion) {
        completion();
        self.spawner.stats.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn small_executor() -> EncodeExecutor {
        EncodeExecutor::with_config(ExecutorConfig {
            workers: 2,
            thread_name: "task-test".to_string(),
        })
        .expect("pool")
    }

    #[test]
    fn handler_runs_on_dispatch_thread() {
        let executor = small_executor();
        let dispatch_thread = thread::current().id();
        let job_thread = Arc::new(Mutex::new(None));
        let handler_thread = Arc::new(Mutex::new(None));

        let job_slot = Arc::clone(&job_thread);
        let handler_slot = Arc::clone(&handler_thread);
        executor.spawner().spawn(
            (),
            move |_| {
                *job_slot.lock().unwrap() = Some(thread::current().id());
                Ok(7)
            },
            move |result: StackResult<i32>| {
                assert_eq!(result.unwrap(), 7);
                *handler_slot.lock().unwrap() = Some(thread::current().id());
            },
        );

        assert_eq!(executor.drain(), 1);
        assert_eq!(*handler_thread.lock().unwrap(), Some(dispatch_thread));
        assert_ne!(*job_thread.lock().unwrap(), Some(dispatch_thread));
    }

    #[test]
    fn ticket_reaches_terminal_state() {
        let executor = small_executor();
        let ok = executor.spawner().spawn((), |_| Ok(()), |_| {});
        let failed = executor.spawner().spawn(
            (),
            |_| -> StackResult<()> { Err(StackError::EmptyDirtyRegion) },
            |result| assert!(matches!(result, Err(StackError::EmptyDirtyRegion))),
        );
        assert_ne!(ok.id(), failed.id());

        executor.drain();
        assert_eq!(ok.state(), TaskState::Completed);
        assert_eq!(failed.state(), TaskState::Failed);

        let stats = executor.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn subject_outlives_handler() {
        struct Subject(Arc<AtomicBool>);
        impl Drop for Subject {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let executor = small_executor();
        let dropped = Arc::new(AtomicBool::new(false));
        let seen_in_handler = Arc::new(AtomicBool::new(true));
        let dropped_probe = Arc::clone(&dropped);
        let seen = Arc::clone(&seen_in_handler);
        executor.spawner().spawn(
            Subject(Arc::clone(&dropped)),
            |_| Ok(()),
            move |_| seen.store(dropped_probe.load(Ordering::SeqCst), Ordering::SeqCst),
        );

        executor.drain();
        assert!(!seen_in_handler.load(Ordering::SeqCst));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_job_is_reported_as_failure() {
        let executor = small_executor();
        let saw_error = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&saw_error);
        executor.spawner().spawn(
            (),
            |_| -> StackResult<()> { panic!("boom") },
            move |result| flag.store(result.is_err(), Ordering::SeqCst),
        );
        executor.drain();
        assert!(saw_error.load(Ordering::SeqCst));
    }

    #[test]
    #[should_panic(expected = "handler failure")]
    fn panicking_handler_propagates_to_dispatcher() {
        let executor = small_executor();
        executor
            .spawner()
            .spawn((), |_| Ok(()), |_: StackResult<()>| panic!("handler failure"));
        executor.drain();
    }

    #[test]
    fn nothing_outstanding_does_not_block() {
        let executor = small_executor();
        assert!(!executor.wait_one());
        assert!(!executor.wait_one_timeout(Duration::from_millis(1)));
        assert_eq!(executor.dispatch_pending(), 0);
        assert_eq!(executor.drain(), 0);
    }

    #[test]
    fn spawner_is_usable_from_other_threads() {
        let executor = small_executor();
        let delivered = Arc::new(AtomicU64::new(0));
        thread::scope(|scope| {
            for _ in 0..4 {
                let spawner = executor.spawner().clone();
                let delivered = Arc::clone(&delivered);
                scope.spawn(move || {
                    spawner.spawn(
                        (),
                        |_| Ok(()),
                        move |_| {
                            delivered.fetch_add(1, Ordering::SeqCst);
                        },
                    );
                });
            }
        });
        assert_eq!(executor.drain(), 4);
        assert_eq!(delivered.load(Ordering::SeqCst), 4);
    }
}
