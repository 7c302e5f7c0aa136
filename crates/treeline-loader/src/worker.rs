//! Fetch Pool
//!
//! Background worker threads that execute subtree fetches. Tasks go
//! in through a condvar-backed queue; outcomes come back over a
//! channel and are applied by the thread that owns the manager, never
//! by the workers themselves.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use treeline_core::NodeId;

use crate::provider::{ChildNode, FetchError, TreeDataProvider};

/// A dispatched load, owned by the pool until completion
#[derive(Debug, Clone, Copy)]
pub struct FetchTask {
    pub node: NodeId,
    pub priority: i32,
    pub user_initiated: bool,
}

/// Completion notification sent back to the owning thread
#[derive(Debug)]
pub struct FetchOutcome {
    pub task: FetchTask,
    pub result: Result<Vec<ChildNode>, FetchError>,
}

struct TaskQueue {
    tasks: Mutex<VecDeque<FetchTask>>,
    condvar: Condvar,
    shutdown: AtomicBool,
    accepting: AtomicBool,
}

impl TaskQueue {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
        }
    }

    fn push(&self, task: FetchTask) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }
        let mut queue = self.tasks.lock().unwrap();
        queue.push_back(task);
        self.condvar.notify_one();
        true
    }

    fn wait_for_task(&self) -> Option<FetchTask> {
        let mut queue = self.tasks.lock().unwrap();
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return None;
            }
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            // Wait with timeout to observe shutdown
            let result = self
                .condvar
                .wait_timeout(queue, Duration::from_millis(100))
                .unwrap();
            queue = result.0;
        }
    }

    /// Refuse further pushes and hand back tasks no worker has picked
    /// up yet, so the dispatcher can unwind their state.
    fn stop_accepting(&self) -> Vec<FetchTask> {
        self.accepting.store(false, Ordering::SeqCst);
        self.tasks.lock().unwrap().drain(..).collect()
    }

    fn resume(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        provider: Arc<dyn TreeDataProvider>,
        results: Sender<FetchOutcome>,
    ) -> Self {
        let thread = thread::Builder::new()
            .name(format!("treeline-fetch-{id}"))
            .spawn(move || {
                while let Some(task) = queue.wait_for_task() {
                    let result = provider.fetch_children(task.node);
                    // Receiver gone means the manager is shutting down
                    if results.send(FetchOutcome { task, result }).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn fetch worker");
        Self { id, thread: Some(thread) }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

/// Worker pool executing subtree fetches off the interactive path
pub struct FetchPool {
    queue: Arc<TaskQueue>,
    workers: Vec<Worker>,
    results: Receiver<FetchOutcome>,
}

impl FetchPool {
    pub fn new(worker_count: usize, provider: Arc<dyn TreeDataProvider>) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let (tx, rx) = channel();
        let workers = (0..worker_count.max(1))
            .map(|id| Worker::new(id, Arc::clone(&queue), Arc::clone(&provider), tx.clone()))
            .collect();
        Self { queue, workers, results: rx }
    }

    /// Hand a task to the pool. False when the pool is not accepting
    /// (after `cancel_all`).
    pub fn submit(&self, task: FetchTask) -> bool {
        self.queue.push(task)
    }

    /// Collect completions without blocking
    pub fn drain_results(&self) -> Vec<FetchOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.results.try_recv() {
                Ok(outcome) => outcomes.push(outcome),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        outcomes
    }

    /// Stop accepting further batches. In-progress fetches finish;
    /// submitted tasks no worker picked up are returned so their
    /// dispatch can be unwound.
    pub fn stop_accepting(&self) -> Vec<FetchTask> {
        self.queue.stop_accepting()
    }

    pub fn resume(&self) {
        self.queue.resume();
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown(&mut self) {
        self.queue.shutdown();
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPool")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending_tasks())
            .finish()
    }
}
