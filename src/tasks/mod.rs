use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::api::error;

/// Supervised background tasks.
///
/// A task is registered with the tracker before it starts and released when it
/// ends, whether it returned `Ok`, `Err` or panicked. Errors and panics are
/// logged here and never reach the caller.
#[derive(Clone)]
pub struct TaskRunner {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    handle: Handle,
}

impl TaskRunner {
    /// Bind the runner to the current runtime, so tasks outlive the actix
    /// worker that scheduled them. Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            handle: Handle::current(),
        }
    }

    /// Fires once when shutdown begins.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), error::SystemError>> + Send + 'static,
    {
        self.tracker.spawn_on(
            async move {
                match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(Ok(())) => tracing::debug!(task = name, "Background task finished"),
                    Ok(Err(e)) => tracing::error!(task = name, "Background task failed: {}", e),
                    Err(panic) => tracing::error!(
                        task = name,
                        "Background task panicked: {}",
                        panic_message(panic.as_ref())
                    ),
                }
            },
            &self.handle,
        );
    }

    /// Signal shutdown and wait for registered tasks, at most `deadline`.
    /// Returns `false` if tasks were still running when the deadline elapsed.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.shutdown.cancel();
        self.tracker.close();

        tracing::info!("Waiting for {} background task(s)", self.tracker.len());
        match tokio::time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("All background tasks finished");
                true
            }
            Err(_) => {
                tracing::warn!(
                    "Shutdown deadline elapsed with {} background task(s) still running",
                    self.tracker.len()
                );
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
