use std::process::ExitStatus;
use std::time::Duration;

use sandbox::SandboxError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Handle to a child's process group, detached from the `Child` itself so it
/// can be signalled while another task is awaiting the child.
///
/// Requires the child to have been spawned through [`isolate_group`] so that
/// its PGID equals its PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pid: u32,
}

impl ProcessGroup {
    /// `None` once the child has been reaped.
    pub fn of(child: &Child) -> Option<Self> {
        child.id().map(|pid| Self { pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(test)]
    pub(crate) fn for_pid(pid: u32) -> Self {
        Self { pid }
    }
}

#[cfg(unix)]
impl ProcessGroup {
    /// Ask the whole group to exit (`SIGTERM`).
    pub fn request_stop(&self) -> std::io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGTERM)
    }

    /// Kill the whole group (`SIGKILL`).
    pub fn force_kill(&self) -> std::io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGKILL)
    }

    fn signal(&self, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
        let pid = i32::try_from(self.pid).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("pid {} out of range", self.pid),
            )
        })?;
        let pgid = nix::unistd::Pid::from_raw(pid);
        nix::sys::signal::killpg(pgid, signal).map_err(std::io::Error::from)
    }
}

#[cfg(not(unix))]
impl ProcessGroup {
    /// Ask the process tree to exit (`taskkill /T`).
    pub fn request_stop(&self) -> std::io::Result<()> {
        self.taskkill(&[])
    }

    /// Kill the process tree (`taskkill /T /F`).
    pub fn force_kill(&self) -> std::io::Result<()> {
        self.taskkill(&["/F"])
    }

    fn taskkill(&self, extra: &[&str]) -> std::io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .arg("/PID")
            .arg(self.pid.to_string())
            .arg("/T")
            .args(extra)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "taskkill exited with {status}"
            )))
        }
    }
}

/// Place the child in its own process group so it can be signalled
/// independently of this process.
#[cfg(unix)]
pub(crate) fn isolate_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(windows)]
pub(crate) fn isolate_group(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn isolate_group(_cmd: &mut Command) {}

#[cfg(unix)]
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map(|sig| 128 + sig).unwrap_or(1))
}

#[cfg(not(unix))]
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Captured output of a child that exited on its own.
pub(crate) struct Output {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Wait for the child to exit while draining both pipes.
///
/// Both streams are read concurrently with the wait so a chatty child cannot
/// block on a full pipe. Dropping the future closes the pipes but leaves the
/// child running; pair with [`terminate`] on timeout.
pub(crate) async fn collect_output(child: &mut Child) -> sandbox::Result<Output> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SandboxError::Output("stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SandboxError::Output("stderr not captured".into()))?;

    let (status, stdout, stderr) =
        tokio::try_join!(child.wait(), read_all(stdout), read_all(stderr))?;
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Stop a child that outlived its deadline.
///
/// Sends a graceful stop to `group`, waits up to `grace` for the child, then
/// force-kills the group and reaps the child. The group is the one captured
/// at spawn: the child may already be reaped while other members of its group
/// still hold the output pipes open.
pub(crate) async fn terminate(child: &mut Child, group: Option<ProcessGroup>, grace: Duration) {
    if let Some(group) = group
        && let Err(e) = group.request_stop()
    {
        debug!(pid = group.pid(), error = %e, "graceful stop failed");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(code = ?status.code(), "process exited after graceful stop");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "wait after graceful stop failed");
        }
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "process ignored graceful stop, killing"
            );
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "direct kill failed");
            }
            if let Err(e) = child.wait().await {
                warn!(error = %e, "wait after kill failed");
            }
        }
    }

    // Sweep members that outlived the leader or ignored the graceful stop.
    if let Some(group) = group
        && let Err(e) = group.force_kill()
    {
        debug!(pid = group.pid(), error = %e, "group kill found no members");
    }
}
