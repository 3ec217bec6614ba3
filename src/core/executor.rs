//! Background execution of prepared requests.

use futures::future::BoxFuture;
use futures::Future;
use tokio::sync::{mpsc, Mutex};

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

/// Cooperative cancellation flag shared between a task and its owner.
///
/// Body streams observe the token at chunk boundaries and the pipeline
/// observes it between attempts, so cancellation takes effect without
/// tearing anything down mid-write.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

type Task = BoxFuture<'static, ()>;

/// Returned when a task cannot be accepted anymore.
#[derive(Debug, PartialEq)]
pub struct SubmitError {
    message: String,
}

impl SubmitError {
    fn shut_down() -> SubmitError {
        SubmitError {
            message: "executor has shut down".to_owned(),
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for SubmitError {}

/// Runs submitted tasks on a fixed set of workers fed from a bounded queue.
///
/// Shutdown stops intake, lets queued tasks drain, and joins the workers.
pub struct TaskExecutor {
    sender: StdMutex<Option<mpsc::Sender<Task>>>,
    workers: StdMutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl TaskExecutor {
    /// Spawns `workers` workers draining a queue of the same depth.
    pub fn new(workers: usize) -> TaskExecutor {
        let worker_count = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Task>(worker_count);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let task = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
            }));
        }

        TaskExecutor {
            sender: StdMutex::new(Some(sender)),
            workers: StdMutex::new(handles),
        }
    }

    /// Enqueues a task, waiting for queue space when all workers are busy.
    pub async fn submit<F>(&self, task: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut sender = {
            let guard = self.sender.lock().unwrap();
            match guard.as_ref() {
                Some(sender) => sender.clone(),
                None => return Err(SubmitError::shut_down()),
            }
        };
        sender
            .send(Box::pin(task))
            .await
            .map_err(|_| SubmitError::shut_down())
    }

    /// Stops intake, drains queued tasks, and joins the workers.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().unwrap().take();
        drop(sender);
        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
