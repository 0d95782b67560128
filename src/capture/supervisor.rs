//! Capture process supervision
//!
//! A [`Session`] owns one running capture process together with the task
//! that reads its output. The task cuts the output into frames, copies each
//! into a pooled buffer and publishes it to the registry until it is told to
//! stop or the process output ends. It then tears the process down:
//! interrupt, drain, wait, and kill if the grace period runs out.

use std::future::Future;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::framer::{FrameScanner, ScanError};
use crate::registry::Registry;

/// How a session's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// A stop was requested
    Stopped,
    /// The process closed its output
    Exited,
    /// Reading the output failed
    Failed,
}

/// A running capture process and its reader task
#[derive(Debug)]
pub(crate) struct Session {
    id: u64,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Session {
    /// Spawn the capture process and start reading its output.
    ///
    /// Fails if the program cannot be launched or its output pipe cannot
    /// be opened. The process is killed if setup fails after spawning.
    pub(crate) fn start(registry: &Arc<Registry>, id: u64) -> io::Result<Self> {
        let config = registry.config();

        let mut child = Command::new(&config.program)
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "capture stdout not piped"))?;

        tracing::info!(
            session_id = id,
            program = %config.program,
            pid = ?child.id(),
            width = config.width,
            height = config.height,
            "Camera started"
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(read_loop(Arc::clone(registry), id, child, stdout, stop_rx));

        Ok(Self {
            id,
            stop: Some(stop_tx),
            task,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Ask the reader task to stop and tear the process down
    pub(crate) fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            tracing::info!(session_id = self.id, "Stopping camera");
            let _ = tx.send(());
        }
    }

    /// Whether a stop has been requested
    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.is_none()
    }

    /// Stop the session and wait for teardown to finish.
    ///
    /// Cancelling the wait leaves the session intact and joinable. Once this
    /// returns the session must be discarded, as the task cannot be awaited
    /// twice.
    pub(crate) async fn join(&mut self) {
        self.stop();
        if let Err(e) = (&mut self.task).await {
            tracing::error!(session_id = self.id, error = %e, "Capture task failed");
        }
    }
}

/// Await `fut` unless a stop arrives first
async fn unless_stopped<F: Future>(
    stop: &mut oneshot::Receiver<()>,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = stop => None,
        out = fut => Some(out),
    }
}

async fn read_loop(
    registry: Arc<Registry>,
    id: u64,
    mut child: Child,
    stdout: ChildStdout,
    mut stop: oneshot::Receiver<()>,
) {
    let config = registry.config();
    let mut scanner = FrameScanner::new(
        stdout,
        config.initial_buffer_size(),
        config.max_frame_size,
        config.read_chunk_size,
    );

    let end = loop {
        let next = match unless_stopped(&mut stop, scanner.next_frame()).await {
            Some(next) => next,
            None => break SessionEnd::Stopped,
        };

        // The scan buffer is reused by the next read, so the frame is copied
        let bytes = match next {
            Ok(Some(frame)) => {
                let mut bytes = registry.pool().acquire(frame.len());
                bytes.extend_from_slice(frame);
                bytes
            }
            Ok(None) => break SessionEnd::Exited,
            Err(ScanError::Oversized { discarded }) => {
                tracing::warn!(
                    session_id = id,
                    discarded = discarded,
                    max_frame_size = config.max_frame_size,
                    "Dropping oversized frame"
                );
                registry.counters().record_oversized();
                continue;
            }
            Err(ScanError::Io(e)) => {
                tracing::warn!(session_id = id, error = %e, "Capture read failed");
                break SessionEnd::Failed;
            }
        };

        match unless_stopped(&mut stop, registry.read()).await {
            Some(state) => {
                registry.publish(&state, bytes);
            }
            None => {
                registry.pool().release(bytes);
                break SessionEnd::Stopped;
            }
        }
    };

    tracing::debug!(session_id = id, end = ?end, "Capture read loop finished");

    terminate(id, &mut child, scanner.into_inner(), config.stop_timeout).await;
    registry.counters().record_session_stop();

    if end != SessionEnd::Stopped {
        registry.producer_exited(id, &mut stop).await;
    }

    tracing::info!(session_id = id, "Camera stopped");
}

/// Interrupt the process, drain its output and reap it.
///
/// Every step is best effort. A process that survives the forced kill is
/// logged and abandoned.
async fn terminate(id: u64, child: &mut Child, mut output: ChildStdout, grace: Duration) {
    tracing::debug!(session_id = id, "Sending interrupt signal to capture process");
    if let Err(e) = interrupt(child) {
        tracing::warn!(session_id = id, error = %e, "Failed to send interrupt signal to capture process");
        if let Err(e) = child.start_kill() {
            tracing::warn!(session_id = id, error = %e, "Failed to kill capture process");
        }
    }

    // Keep the pipe flowing so a blocked writer can reach its exit path
    let mut sink = tokio::io::sink();
    let drain = tokio::io::copy(&mut output, &mut sink);
    tokio::pin!(drain);
    let exit = reap(id, child, grace);
    tokio::pin!(exit);

    tracing::debug!(session_id = id, "Waiting for capture process to exit");
    let status = tokio::select! {
        status = &mut exit => status,
        _ = &mut drain => exit.await,
    };

    match status {
        Some(Ok(status)) => {
            tracing::debug!(session_id = id, status = %status, "Capture process exited");
        }
        Some(Err(e)) => {
            tracing::warn!(session_id = id, error = %e, "Capture process wait for exit failed");
        }
        None => {
            tracing::error!(session_id = id, "Capture process did not exit after kill, abandoning it");
        }
    }
}

/// Wait for exit, escalating to a kill once the grace period passes
async fn reap(id: u64, child: &mut Child, grace: Duration) -> Option<io::Result<ExitStatus>> {
    if let Ok(status) = timeout(grace, child.wait()).await {
        return Some(status);
    }

    tracing::warn!(
        session_id = id,
        grace_ms = grace.as_millis() as u64,
        "Capture process ignored interrupt, killing"
    );
    if let Err(e) = child.start_kill() {
        tracing::warn!(session_id = id, error = %e, "Failed to kill capture process");
    }

    timeout(grace, child.wait()).await.ok()
}

/// Send SIGINT, which capture programs handle as a clean stop
#[cfg(unix)]
fn interrupt(child: &Child) -> io::Result<()> {
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "capture process already reaped"))?;

    // SAFETY: kill(2) takes plain integers and touches no memory of ours
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interrupt signal not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_terminate_interruptible_process() {
        let mut child = sh("exec sleep 30");
        let stdout = child.stdout.take().unwrap();

        let started = std::time::Instant::now();
        terminate(1, &mut child, stdout, Duration::from_secs(5)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        // Ignores SIGINT; only the kill can stop it
        let mut child = sh("trap '' INT; while :; do sleep 0.05; done");
        let stdout = child.stdout.take().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        terminate(2, &mut child, stdout, Duration::from_millis(200)).await;

        let status = child.try_wait().unwrap().expect("process reaped");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_terminate_drains_pending_output() {
        // Writes far more than a pipe holds before checking for signals
        let mut child = sh("trap 'exit 0' INT; while :; do printf '%01024d' 0; done");
        let stdout = child.stdout.take().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        terminate(3, &mut child, stdout, Duration::from_secs(2)).await;
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unless_stopped() {
        let (tx, mut rx) = oneshot::channel::<()>();
        assert_eq!(unless_stopped(&mut rx, async { 5 }).await, Some(5));

        tx.send(()).unwrap();
        assert_eq!(unless_stopped(&mut rx, std::future::pending::<u8>()).await, None);
    }
}
