//! One `cvs pserver` process per accepted connection.
//!
//! The worker gets the connection as stdin, stdout and stderr and shares
//! nothing else with the daemon. The daemon never waits on a running
//! worker: exit status is either absorbed by the kernel (`SIGCHLD` ignored)
//! or collected by a detached reaper thread, depending on [`ChildReaping`].
//!
//! Launch is a plain fork and exec. An exec failure in the child is sent
//! back as an errno over a close-on-exec pipe, so the parent learns about it
//! without waiting on the child; waiting is not possible while `SIGCHLD` is
//! ignored.

use std::ffi::{CStr, CString, OsStr, OsString};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;

use nix::libc;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use cvsd_core::{ChildReaping, ServiceConfig};

use crate::error::SpawnError;

/// Exit status of a child whose exec failed.
const EXEC_FAILED: i32 = 127;

/// Launches pserver workers for one repository.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    executable: PathBuf,
    scratch: PathBuf,
    repository: PathBuf,
}

impl WorkerLauncher {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            executable: config.executable().to_path_buf(),
            scratch: config.scratch().to_path_buf(),
            repository: config.repository().to_path_buf(),
        }
    }

    /// `-f -T <scratch> --allow-root=<repository> pserver`
    pub fn args(&self) -> Vec<OsString> {
        let mut allow_root = OsString::from("--allow-root=");
        allow_root.push(&self.repository);
        vec![
            OsString::from("-f"),
            OsString::from("-T"),
            self.scratch.clone().into_os_string(),
            allow_root,
            OsString::from("pserver"),
        ]
    }

    /// Start a worker bound to `connection` and return without waiting for
    /// it to finish.
    ///
    /// `connection` must be a connected stream in blocking mode; the worker
    /// inherits the file status flags. The daemon's copy of the descriptor
    /// is closed before this returns, whether or not the launch succeeded.
    /// A failed exec is reported as [`SpawnError::Launch`].
    pub fn spawn(&self, connection: impl Into<OwnedFd>) -> Result<WorkerHandle, SpawnError> {
        let connection: OwnedFd = connection.into();
        let launch_error = |source: io::Error| SpawnError::Launch {
            executable: self.executable.clone(),
            source,
        };

        // Everything the child touches is allocated before the fork.
        let program = to_cstring(self.executable.as_os_str()).map_err(launch_error)?;
        let argv = std::iter::once(OsString::from("cvs"))
            .chain(self.args())
            .map(|arg| to_cstring(&arg))
            .collect::<io::Result<Vec<_>>>()
            .map_err(launch_error)?;
        let argv_ptrs: Vec<*const libc::c_char> = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        let (status_rx, status_tx) = status_pipe().map_err(SpawnError::Setup)?;

        // SAFETY: between fork and exec the child only calls
        // async-signal-safe functions on memory prepared above.
        let pid = match unsafe { fork() } {
            Ok(ForkResult::Child) => unsafe {
                exec_worker(
                    connection.as_raw_fd(),
                    status_tx.as_raw_fd(),
                    &program,
                    &argv_ptrs,
                )
            },
            Ok(ForkResult::Parent { child }) => child,
            Err(errno) => return Err(SpawnError::Setup(errno.into())),
        };
        drop(connection);
        drop(status_tx);

        let mut report = Vec::with_capacity(4);
        let read = File::from(status_rx).read_to_end(&mut report);
        if read.is_ok() && report.is_empty() {
            return Ok(WorkerHandle { pid });
        }

        // The child is exiting; collect it if SIGCHLD is not ignored.
        let _ = waitpid(pid, None);
        let source = match read {
            Err(err) => err,
            Ok(_) => match <[u8; 4]>::try_from(&report[..]) {
                Ok(bytes) => io::Error::from_raw_os_error(i32::from_ne_bytes(bytes)),
                Err(_) => io::Error::new(io::ErrorKind::Other, "truncated exec status"),
            },
        };
        Err(launch_error(source))
    }
}

/// A worker whose exec succeeded.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Pid,
}

impl WorkerHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Stop tracking the worker and return its pid.
    pub fn detach(self, reaping: ChildReaping) -> Pid {
        match reaping {
            ChildReaping::IgnoreSignal => {}
            ChildReaping::Reaper => spawn_reaper(self.pid),
        }
        self.pid
    }

    /// Block until the worker exits. Fails with `ECHILD` while `SIGCHLD`
    /// is ignored.
    pub fn wait(self) -> nix::Result<WaitStatus> {
        waitpid(self.pid, None)
    }
}

fn spawn_reaper(pid: Pid) {
    let spawned = std::thread::Builder::new()
        .name(format!("cvsd-reap-{pid}"))
        .spawn(move || match waitpid(pid, None) {
            Ok(status) => tracing::debug!(pid = pid.as_raw(), ?status, "worker exited"),
            Err(err) => tracing::warn!(pid = pid.as_raw(), error = %err, "waiting on worker failed"),
        });
    if let Err(err) = spawned {
        tracing::warn!(pid = pid.as_raw(), error = %err, "failed to start reaper thread");
    }
}

fn to_cstring(value: &OsStr) -> io::Result<CString> {
    Ok(CString::new(value.as_bytes())?)
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn status_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;

    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn status_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (rx, tx) = nix::unistd::pipe()?;
    for fd in [&rx, &tx] {
        // SAFETY: plain fcntl(2) on a descriptor we own.
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((rx, tx))
}

/// Child side of [`WorkerLauncher::spawn`]. Never returns.
///
/// # Safety
///
/// Must only be called in a freshly forked child. Only async-signal-safe
/// functions are used; nothing allocates.
unsafe fn exec_worker(
    connection: RawFd,
    status: RawFd,
    program: &CStr,
    argv: &[*const libc::c_char],
) -> ! {
    // The accept loop may be ignoring SIGCHLD; the worker forks and waits
    // on its own children.
    libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if libc::dup2(connection, target) < 0 {
            report_exec_failure(status);
        }
    }
    libc::execv(program.as_ptr(), argv.as_ptr());
    report_exec_failure(status)
}

unsafe fn report_exec_failure(status: RawFd) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let bytes = errno.to_ne_bytes();
    libc::write(status, bytes.as_ptr().cast(), bytes.len());
    libc::_exit(EXEC_FAILED)
}
