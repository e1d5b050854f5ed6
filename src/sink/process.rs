use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::{create_exclusive, ChunkSink};
use crate::error::WriteError;

const POLL_MIN: Duration = Duration::from_millis(1);
const POLL_MAX: Duration = Duration::from_millis(50);

/// Streams into an external compressor whose stdout is the destination
/// file.
///
/// The timeout covers the whole sink lifetime, starting at spawn. Once it
/// passes, the compressor is killed: a write blocked on a full pipe then
/// fails with `BrokenPipe`, and [`ChunkSink::abort`] reports it as
/// [`WriteError::CompressorTimeout`].
pub struct ProcessSink {
    executable: String,
    path: PathBuf,
    output: File,
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    timeout: Duration,
    deadline: Option<Instant>,
    watchdog: Option<Watchdog>,
    reaped: bool,
}

impl ProcessSink {
    /// The destination is claimed before the child starts, so a collision
    /// never spawns a process.
    pub fn spawn(executable: &str, path: &Path, timeout: Duration) -> Result<Self, WriteError> {
        Self::spawn_command(Command::new(executable), path, timeout)
    }

    fn spawn_command(
        mut command: Command,
        path: &Path,
        timeout: Duration,
    ) -> Result<Self, WriteError> {
        let executable = command.get_program().to_string_lossy().into_owned();
        let output = create_exclusive(path, false)?;
        let stdout = output.try_clone()?;
        let deadline = deadline_after(timeout);
        let spawned = command
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                // Nothing was written; release the claimed name.
                let _ = std::fs::remove_file(path);
                return Err(WriteError::Spawn { executable, source });
            }
        };
        let stdin = child.stdin.take();
        let pid = child.id();
        let child = Arc::new(Mutex::new(child));

        let watchdog = match Watchdog::start(Arc::clone(&child), timeout) {
            Ok(watchdog) => watchdog,
            Err(err) => {
                drop(stdin);
                let mut child = lock(&child);
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_file(path);
                return Err(WriteError::Io(err));
            }
        };
        log::debug!("spawned {} (pid {}) for {}", executable, pid, path.display());

        Ok(Self {
            executable,
            path: path.to_path_buf(),
            output,
            child,
            stdin,
            timeout,
            deadline,
            watchdog: Some(watchdog),
            reaped: false,
        })
    }

    fn stdin(&mut self) -> io::Result<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "compressor stdin closed"))
    }

    /// Stops the watchdog; true if it already killed the child.
    fn stop_watchdog(&mut self) -> bool {
        self.watchdog.take().map(Watchdog::stop).unwrap_or(false)
    }

    fn timed_out(&self) -> WriteError {
        WriteError::CompressorTimeout {
            executable: self.executable.clone(),
            timeout_secs: self.timeout.as_secs(),
        }
    }
}

impl Write for ProcessSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdin()?.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stdin()?.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin()?.flush()
    }
}

impl ChunkSink for ProcessSink {
    fn finish(mut self: Box<Self>) -> Result<(), WriteError> {
        // EOF on stdin lets the compressor drain and exit.
        drop(self.stdin.take());
        let child = Arc::clone(&self.child);
        let waited = wait_until(self.deadline, || lock(&child).try_wait());
        let killed = self.stop_watchdog();

        let status = match waited? {
            Some(status) => status,
            None => {
                let mut child = lock(&self.child);
                let _ = child.kill();
                let _ = child.wait();
                drop(child);
                self.reaped = true;
                return Err(self.timed_out());
            }
        };
        self.reaped = true;
        if !status.success() {
            if killed {
                return Err(self.timed_out());
            }
            return Err(WriteError::CompressorFailed {
                executable: self.executable.clone(),
                status: status.to_string(),
            });
        }

        self.output.sync_all()?;
        Ok(())
    }

    fn abort(mut self: Box<Self>, err: io::Error) -> WriteError {
        drop(self.stdin.take());
        if self.stop_watchdog() {
            return self.timed_out();
        }
        WriteError::Io(err)
    }

    fn describe(&self) -> String {
        format!("{} into {}", self.executable, self.path.display())
    }
}

impl Drop for ProcessSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        self.stop_watchdog();
        if !self.reaped {
            // Abandoned mid-stream: do not leave the compressor behind.
            let mut child = lock(&self.child);
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("reaped abandoned {} for {}", self.executable, self.path.display());
        }
    }
}

/// Kills the compressor when its sink outlives the timeout.
struct Watchdog {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    fn start(child: Arc<Mutex<Child>>, timeout: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let handle = thread::Builder::new()
            .name("compressor-watchdog".to_string())
            .spawn(move || {
                if let Err(mpsc::RecvTimeoutError::Timeout) = stop_rx.recv_timeout(timeout) {
                    flag.store(true, Ordering::Release);
                    let _ = lock(&child).kill();
                }
            })?;

        Ok(Self {
            stop_tx,
            handle,
            fired,
        })
    }

    fn stop(self) -> bool {
        let _ = self.stop_tx.send(());
        let _ = self.handle.join();
        self.fired.load(Ordering::Acquire)
    }
}

fn lock(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `None` when the timeout is too large to represent.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Polls `try_wait` with backoff until the process exits or the deadline
/// passes (`Ok(None)`).
pub(crate) fn wait_until(
    deadline: Option<Instant>,
    mut try_wait: impl FnMut() -> io::Result<Option<ExitStatus>>,
) -> io::Result<Option<ExitStatus>> {
    let mut backoff = POLL_MIN;
    loop {
        if let Some(status) = try_wait()? {
            return Ok(Some(status));
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                backoff.min(deadline - now)
            }
            None => backoff,
        };
        thread::sleep(pause);
        backoff = (backoff * 2).min(POLL_MAX);
    }
}
