//! The bounded write pool.
//!
//! Writes are submitted to a fixed-depth queue and drained by a pool of
//! worker tasks; the store's write lock serializes the actual commits. A
//! full queue or a slow commit surfaces as `Busy`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

use ironfhir_storage::{StorageError, WriteRequest, WriteResult};

use crate::store::StoreInner;

/// Tuning for the write pool.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of worker tasks draining the queue.
    pub width: usize,
    /// Submission queue depth.
    pub queue_depth: usize,
    /// How long a submitter waits for its commit before giving up.
    pub write_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            width: 20,
            queue_depth: 100,
            write_timeout: Duration::from_secs(10),
        }
    }
}

struct WriteJob {
    request: WriteRequest,
    submitted: std::time::Instant,
    respond: oneshot::Sender<Result<WriteResult, StorageError>>,
}

pub(crate) struct WriterHandle {
    tx: mpsc::Sender<WriteJob>,
    timeout: Duration,
}

impl WriterHandle {
    pub async fn submit(&self, request: WriteRequest) -> Result<WriteResult, StorageError> {
        let (respond, receive) = oneshot::channel();
        let job = WriteJob {
            request,
            submitted: std::time::Instant::now(),
            respond,
        };
        self.tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => StorageError::busy("write queue full"),
            mpsc::error::TrySendError::Closed(_) => StorageError::fault("write pool shut down"),
        })?;
        match tokio::time::timeout(self.timeout, receive).await {
            Err(_) => Err(StorageError::busy("write timed out")),
            Ok(Err(_)) => Err(StorageError::fault("write pool dropped the request")),
            Ok(Ok(result)) => result,
        }
    }
}

pub(crate) fn spawn(inner: Arc<RwLock<StoreInner>>, config: StoreConfig) -> WriterHandle {
    let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));
    for index in 0..config.width.max(1) {
        let inner = Arc::clone(&inner);
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            worker_loop(index, inner, rx).await;
        });
    }
    WriterHandle {
        tx,
        timeout: config.write_timeout,
    }
}

async fn worker_loop(
    index: usize,
    inner: Arc<RwLock<StoreInner>>,
    rx: Arc<Mutex<mpsc::Receiver<WriteJob>>>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        let queue_wait = job.submitted.elapsed();
        let mutations = job.request.mutations.len();
        let result = {
            let mut guard = inner.write().await;
            let instant = ironfhir_core::now_utc();
            guard.apply(job.request, instant)
        };
        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    worker = index,
                    t = outcome.t,
                    mutations,
                    queue_wait_ms = queue_wait.as_millis() as u64,
                    "transaction committed"
                );
            }
            Err(err) => {
                tracing::debug!(worker = index, error = %err, "transaction rejected");
            }
        }
        // The submitter may have timed out; a dead receiver is fine.
        let _ = job.respond.send(result);
    }
}
