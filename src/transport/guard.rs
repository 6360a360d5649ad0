//! Cleanup that survives cancellation
//!
//! Adapter calls such as "stop scanning" or "disconnect" must still happen
//! when the future that started the operation is dropped mid-flight (the
//! supervisor drops in-flight futures on stop or timeout). [`CleanupGuard`]
//! holds that cleanup and spawns it on drop unless it was run or dismissed.

use std::future::Future;
use tracing::trace;

/// Runs a cleanup future when dropped
#[must_use = "dropping the guard immediately runs the cleanup"]
pub struct CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    cleanup: Option<F>,
}

impl<F> CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// Await the cleanup in place
    pub async fn run(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.await;
        }
    }

    /// The operation succeeded; forget the cleanup
    pub fn dismiss(mut self) {
        self.cleanup = None;
    }
}

impl<F> Drop for CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(cleanup);
            },
            // Runtime already gone; nothing left to clean up with
            Err(_) => trace!("No runtime to run dropped cleanup"),
        }
    }
}
