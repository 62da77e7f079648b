//! Fixed-size worker pool over a bounded work queue
//!
//! Work items are closures carrying their own argument bundle. The queue
//! capacity equals the worker count, so a producer that gets far ahead of
//! the workers blocks in `enqueue` instead of growing memory without bound.
//! Workers never see an item's failure: handlers record their own outcomes
//! and a panicking item is caught and logged, never propagated.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

/// One unit of work: a handler plus its captured arguments.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(WorkItem),
    Terminate,
}

/// A pool of long-lived worker threads pulling from one shared queue.
pub struct WorkerPool {
    sender: SyncSender<Message>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers, all idle, sharing an empty bounded
    /// queue of the same capacity.
    pub fn start(worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker pool needs at least one worker");

        let (sender, receiver) = mpsc::sync_channel::<Message>(worker_count);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("di-worker-{}", id))
                    .spawn(move || worker_loop(id, receiver))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        info!("Started worker pool with {} workers", worker_count);
        Self {
            sender,
            workers,
            worker_count,
        }
    }

    /// Queue a work item, blocking while the queue is at capacity. Items
    /// are dispatched FIFO but may complete in any order.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Message::Run(Box::new(job)))
            .expect("worker pool queue closed");
    }

    /// Send one poison pill per worker, then block until the queue has
    /// drained and every worker thread has terminated. Consuming `self`
    /// means no further `enqueue` calls can exist after shutdown.
    pub fn shutdown(self) {
        for _ in 0..self.worker_count {
            if self.sender.send(Message::Terminate).is_err() {
                break;
            }
        }
        drop(self.sender);

        for handle in self.workers {
            if handle.join().is_err() {
                error!("Worker thread terminated by panic during shutdown");
            }
        }
        debug!("Worker pool drained and joined");
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Message>>>) {
    loop {
        // Hold the lock only for the dequeue, never while running a job
        let message = {
            let guard = receiver.lock().unwrap();
            guard.recv()
        };

        match message {
            Ok(Message::Run(job)) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Worker {} caught a panicking work item", id);
                }
            }
            Ok(Message::Terminate) | Err(_) => {
                debug!("Worker {} exiting", id);
                break;
            }
        }
    }
}
