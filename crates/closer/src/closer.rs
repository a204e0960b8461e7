use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{OnceCell, mpsc};

use crate::{CloseError, Result};

/// Boxed error a teardown may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send>;

struct Teardown {
    name: String,
    run: TeardownFn,
}

/// Registry of teardown callbacks run once at shutdown.
///
/// Callbacks are kept in registration order and launched in reverse, so the
/// most recently started resource is asked to stop first. They then run
/// concurrently, each on its own task and isolated from the others' panics.
#[derive(Default)]
pub struct Closer {
    teardowns: Mutex<Vec<Teardown>>,
    closing: AtomicBool,
    result: OnceCell<Result<()>>,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an anonymous teardown.
    pub fn add<F, Fut, E>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let index = self.len();
        self.register(format!("teardown-{index}"), f);
    }

    /// Registers a teardown whose start, outcome and duration are logged.
    pub fn add_named<F, Fut, E>(&self, name: impl Into<String>, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.register(name, move || async move {
            tracing::info!(teardown = %label, "closing");
            let started = Instant::now();
            let result = f().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::info!(teardown = %label, elapsed_ms, "closed"),
                Err(_) => tracing::error!(teardown = %label, elapsed_ms, "close failed"),
            }
            result
        });
    }

    /// Number of registered teardowns not yet run.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every registered teardown and waits for them, at most `timeout`.
    ///
    /// Only the first call does any work; every call returns its result. The
    /// first failure observed (a teardown error, a panic, or the deadline)
    /// becomes the result and later ones are only logged. Teardowns still
    /// running at the deadline are left to finish on their own.
    pub async fn close_all(&self, timeout: Duration) -> Result<()> {
        self.result
            .get_or_init(|| self.run_all(timeout))
            .await
            .clone()
    }

    fn register<F, Fut, E>(&self, name: String, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let run: TeardownFn = Box::new(move || async move { f().await.map_err(Into::into) }.boxed());
        // Nothing may be pushed once `run_all` has taken its snapshot.
        let mut teardowns = self.lock();
        if self.closing.load(Ordering::Acquire) {
            drop(teardowns);
            tracing::warn!(teardown = %name, "closer already closed, teardown ignored");
            return;
        }
        teardowns.push(Teardown { name, run });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Teardown>> {
        self.teardowns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_all(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let teardowns = {
            let mut registry = self.lock();
            self.closing.store(true, Ordering::Release);
            std::mem::take(&mut *registry)
        };
        let total = teardowns.len();
        tracing::info!(teardowns = total, timeout_ms = timeout.as_millis() as u64, "shutting down");

        let (tx, mut rx) = mpsc::unbounded_channel();
        for teardown in teardowns.into_iter().rev() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Teardown { name, run } = teardown;
                let outcome = match AssertUnwindSafe(async move { run().await })
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(CloseError::Failed {
                        name,
                        message: e.to_string(),
                    }),
                    Err(panic) => Err(CloseError::Panicked {
                        name,
                        message: panic_message(panic.as_ref()),
                    }),
                };
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut first = None;
        let mut finished = 0;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while finished < total {
            tokio::select! {
                outcome = rx.recv() => match outcome {
                    Some(Ok(())) => finished += 1,
                    Some(Err(e)) => {
                        finished += 1;
                        record(&mut first, e);
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    record(&mut first, CloseError::DeadlineExceeded { pending: total - finished });
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        metrics::histogram!("shutdown_duration_seconds").record(elapsed.as_secs_f64());
        match &first {
            None => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "shutdown complete"),
            Some(e) => tracing::error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "shutdown finished with errors"),
        }
        first.map_or(Ok(()), Err)
    }
}

fn record(first: &mut Option<CloseError>, err: CloseError) {
    if first.is_none() {
        *first = Some(err);
    } else {
        tracing::error!(error = %err, "additional shutdown failure");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_close_with_nothing_registered() {
        let closer = Closer::new();
        assert!(closer.is_empty());
        assert_eq!(closer.close_all(Duration::from_secs(1)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_registry_is_cleared_by_close() {
        let closer = Closer::new();
        closer.add(|| async { Ok::<(), BoxError>(()) });
        closer.add_named("db", || async { Ok::<(), BoxError>(()) });
        assert_eq!(closer.len(), 2);

        closer.close_all(Duration::from_secs(1)).await.unwrap();
        assert!(closer.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_added_after_close_is_ignored() {
        let closer = Closer::new();
        closer.close_all(Duration::from_secs(1)).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        closer.add(move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        });
        assert!(closer.is_empty());
        closer.close_all(Duration::from_secs(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registration_racing_close_is_run_or_ignored() {
        let closer = Arc::new(Closer::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let mut adders = Vec::new();
        for _ in 0..4 {
            let closer = closer.clone();
            let ran = ran.clone();
            adders.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let ran = ran.clone();
                    closer.add(move || async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), BoxError>(())
                    });
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::task::yield_now().await;
        closer.close_all(Duration::from_secs(5)).await.unwrap();
        for adder in adders {
            adder.await.unwrap();
        }

        // Nothing may be left behind in the registry once closing started.
        assert!(closer.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_error_is_reported_with_name() {
        let closer = Closer::new();
        closer.add_named("kafka producer", || async { Err::<(), _>("flush failed") });

        let err = closer.close_all(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(
            err,
            CloseError::Failed {
                name: "kafka producer".to_string(),
                message: "flush failed".to_string(),
            }
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
