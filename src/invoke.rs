use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::types::{OptionSet, RawRunResult, RunStatus};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Extra time for pipes to reach EOF once the process has exited or was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runs the subject program once for a case.
///
/// Implementations never fail: every fault degrades to a `RawRunResult`
/// whose status says what went wrong.
pub trait Invoke {
    fn invoke(&mut self, option_set: &OptionSet, input: &Path) -> RawRunResult;
}

/// Spawns `<wrapper...> <subject> <flags...> <input>` as a child process.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    pub wrapper: Vec<String>,
    pub subject: PathBuf,
    pub timeout: Duration,
}

impl ProcessInvoker {
    pub fn new(wrapper: Vec<String>, subject: PathBuf, timeout: Duration) -> Self {
        ProcessInvoker {
            wrapper,
            subject,
            timeout,
        }
    }

    fn command(&self, option_set: &OptionSet, input: &Path) -> Command {
        let mut cmd = match self.wrapper.split_first() {
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(&self.subject);
                cmd
            }
            None => Command::new(&self.subject),
        };
        cmd.args(option_set.args())
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // The subject runs as a grandchild under the wrapper; a fresh process
        // group lets a timeout take both down.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl Invoke for ProcessInvoker {
    fn invoke(&mut self, option_set: &OptionSet, input: &Path) -> RawRunResult {
        let mut cmd = self.command(option_set, input);
        tracing::debug!("running {:?}", cmd);

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::error!("An exception occurred: failed to spawn {:?}: {}", cmd, err);
                return RawRunResult::invocation_error(err.to_string());
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) if start.elapsed() > self.timeout => break Err(None),
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(err) => break Err(Some(err)),
            }
        };

        match status {
            Ok(status) => {
                // Background descendants can keep the pipes open past the exit.
                let deadline = (start + self.timeout).max(Instant::now() + DRAIN_GRACE);
                let stdout = collect(stdout, deadline);
                let stderr = collect(stderr, deadline);
                if status.success() {
                    RawRunResult {
                        status: RunStatus::Success,
                        stdout,
                        stderr,
                    }
                } else {
                    tracing::warn!("Call failed with return code {:?}", status.code());
                    RawRunResult {
                        status: RunStatus::Failed {
                            code: status.code(),
                        },
                        stdout,
                        stderr,
                    }
                }
            }
            Err(None) => {
                tracing::warn!(
                    "Call timed out after {:?} for {}",
                    self.timeout,
                    input.display()
                );
                kill(&mut child);
                let deadline = Instant::now() + DRAIN_GRACE;
                let _ = collect(stdout, deadline);
                RawRunResult::timed_out(collect(stderr, deadline))
            }
            Err(Some(err)) => {
                tracing::error!("An exception occurred: failed to reap process: {}", err);
                kill(&mut child);
                RawRunResult::invocation_error(err.to_string())
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });
        rx
    })
}

/// Gather what a reader thread has produced, waiting no later than `deadline`.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(rx) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    loop {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("Output pipe still open at the deadline, keeping what was read");
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        // SAFETY: killpg only sends a signal; the group id is the child's pid
        // because the child was spawned with process_group(0).
        let rc = unsafe { libc::killpg(child.id() as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!("killpg failed, falling back to kill");
            let _ = child.kill();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }

    match child.wait() {
        Ok(status) => tracing::debug!("reaped timed out process: {:?}", status),
        Err(err) => tracing::debug!("reap failed: {}", err),
    }
}
