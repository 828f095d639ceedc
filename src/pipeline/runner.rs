//! Uniform lifecycle wrapper for pipeline stages

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// An independently scheduled loop implementing one pipeline role
#[async_trait]
pub trait Stage: Send {
    /// Short name used in lifecycle logs
    fn name(&self) -> &'static str;

    /// Run the stage loop until `cancel` fires
    ///
    /// Returning an interrupt error ([`crate::Error::is_interrupt`]) counts as
    /// a clean exit.
    async fn run(&mut self, cancel: CancellationToken) -> Result<()>;
}

/// Owns one stage, its cancellation token and its task handle
///
/// `start`, `stop` and drop are all safe to call in any order and more than
/// once. A stage that fails with a non-interrupt error cancels the
/// supervising token so the rest of the pipeline unwinds with it.
pub struct StageRunner {
    name: &'static str,
    stage: Option<Box<dyn Stage>>,
    cancel: CancellationToken,
    supervisor: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StageRunner {
    /// Wrap a stage; its token is a child of `supervisor`
    pub fn new(stage: impl Stage + 'static, supervisor: &CancellationToken) -> Self {
        Self {
            name: stage.name(),
            stage: Some(Box::new(stage)),
            cancel: supervisor.child_token(),
            supervisor: supervisor.clone(),
            handle: None,
        }
    }

    /// Launch the stage loop as a background task
    ///
    /// Must be called from within a tokio runtime. A second call is ignored.
    pub fn start(&mut self) {
        let Some(mut stage) = self.stage.take() else {
            tracing::warn!(stage = self.name, "stage already started");
            return;
        };

        let name = self.name;
        let cancel = self.cancel.clone();
        let supervisor = self.supervisor.clone();

        self.handle = Some(tokio::spawn(async move {
            tracing::info!(stage = name, "stage started");

            let watch = cancel.clone();
            let run = stage.run(cancel);
            tokio::pin!(run);
            let result = tokio::select! {
                biased;
                () = watch.cancelled() => {
                    tracing::info!(stage = name, "stage stopping");
                    run.await
                }
                result = &mut run => result,
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_interrupt() => {
                    tracing::debug!(stage = name, reason = %e, "stage interrupted");
                }
                Err(e) => {
                    tracing::error!(stage = name, error = %e, "stage failed, shutting down pipeline");
                    supervisor.cancel();
                }
            }

            tracing::info!(stage = name, "stage stopped");
        }));
    }

    /// Request the stage to stop without waiting for it
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait up to `timeout` for the stage loop to exit
    ///
    /// Returns `false` if the loop had to be aborted.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        let Some(mut handle) = self.handle.take() else {
            return true;
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(stage = self.name, error = %e, "stage task panicked");
                true
            }
            Err(_) => {
                tracing::warn!(
                    stage = self.name,
                    timeout_ms = timeout.as_millis(),
                    "stage did not stop in time, aborting"
                );
                handle.abort();
                false
            }
        }
    }

    /// Whether the stage loop is currently running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stage name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for StageRunner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("name", &self.name)
            .field("started", &self.stage.is_none())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Error;

    /// Stage that counts its runs and parks until cancelled
    struct Parked {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stage for Parked {
        fn name(&self) -> &'static str {
            "parked"
        }

        async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Err(Error::Cancelled)
        }
    }

    struct Failing;

    #[async_trait]
    impl Stage for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&mut self, _cancel: CancellationToken) -> Result<()> {
            Err(Error::InputClosed("stdin".to_string()))
        }
    }

    #[tokio::test]
    async fn test_start_stop_join() {
        let root = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut runner = StageRunner::new(
            Parked {
                runs: Arc::clone(&runs),
            },
            &root,
        );

        runner.start();
        runner.start();
        tokio::task::yield_now().await;
        assert!(runner.is_running());

        runner.stop();
        runner.stop();
        assert!(runner.join(Duration::from_secs(1)).await);
        assert!(!runner.is_running());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Stopping a runner never cancels its siblings
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_root_cancel_stops_stage() {
        let root = CancellationToken::new();
        let mut runner = StageRunner::new(
            Parked {
                runs: Arc::new(AtomicUsize::new(0)),
            },
            &root,
        );

        runner.start();
        root.cancel();
        assert!(runner.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_fatal_error_cancels_supervisor() {
        let root = CancellationToken::new();
        let mut runner = StageRunner::new(Failing, &root);

        runner.start();
        tokio::time::timeout(Duration::from_secs(1), root.cancelled())
            .await
            .expect("supervisor should be cancelled");
        assert!(runner.join(Duration::from_secs(1)).await);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_root_cancel_logs_every_lifecycle_event() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let logs = logs.clone();
                move || logs.clone()
            })
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let root = CancellationToken::new();
        let mut runner = StageRunner::new(
            Parked {
                runs: Arc::new(AtomicUsize::new(0)),
            },
            &root,
        );

        runner.start();
        tokio::task::yield_now().await;
        root.cancel();
        assert!(runner.join(Duration::from_secs(1)).await);

        let logs = logs.contents();
        let started = logs.find("stage started").expect("started logged");
        let stopping = logs.find("stage stopping").expect("stopping logged");
        let stopped = logs.find("stage stopped").expect("stopped logged");
        assert!(started < stopping && stopping < stopped, "{logs}");
    }

    #[tokio::test]
    async fn test_stop_and_drop_without_start() {
        let root = CancellationToken::new();
        let mut runner = StageRunner::new(Failing, &root);

        runner.stop();
        assert!(runner.join(Duration::from_millis(10)).await);
        drop(runner);
        assert!(!root.is_cancelled());
    }
}
