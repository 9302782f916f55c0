//! Listener lifecycle: a dedicated accept thread and the start/stop
//! rendezvous with the thread that owns the controller.
//!
//! ```text
//! Stopped ──start()──▶ Starting ──ready──▶ Running ──stop()──▶ Stopping ──stopped──▶ Stopped
//! ```
//!
//! Three oneshot channels connect the two sides, each used exactly once per
//! cycle: `ready` (accept thread → owner, carries the bound address or the
//! bind error), `exit` (owner → accept thread) and `stopped` (accept thread →
//! owner, sent after the listener is closed). The listener is created, used
//! and dropped on the accept thread only.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::signal::{signal, SigHandler, Signal};
use serde::Serialize;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;

use cvsd_core::config::{ListenConfig, DEFAULT_PORT};
use cvsd_core::{ChildReaping, Repository};

use crate::error::{StartError, StopError};
use crate::worker::WorkerLauncher;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const LISTEN_BACKLOG: u32 = 5;
pub const ACCEPT_THREAD_NAME: &str = "cvsd-accept";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DaemonState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl DaemonState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DaemonState::Starting,
            2 => DaemonState::Running,
            3 => DaemonState::Stopping,
            _ => DaemonState::Stopped,
        }
    }
}

/// Listener settings for one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub bind_addr: SocketAddr,
    pub poll_interval: Duration,
    pub reaping: ChildReaping,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reaping: ChildReaping::default(),
        }
    }
}

impl From<&ListenConfig> for DaemonSettings {
    fn from(listen: &ListenConfig) -> Self {
        Self {
            bind_addr: SocketAddr::new(listen.address, listen.port),
            poll_interval: Duration::from_millis(listen.poll_interval_ms.max(1)),
            reaping: listen.reaping,
        }
    }
}

/// Read-only view of a controller's state that other threads can hold.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<AtomicU8>);

impl StatusHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(DaemonState::Stopped as u8)))
    }

    fn set(&self, state: DaemonState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == DaemonState::Running
    }
}

struct AcceptSession {
    local_addr: SocketAddr,
    exit_tx: oneshot::Sender<()>,
    stopped_rx: oneshot::Receiver<()>,
    thread: JoinHandle<()>,
}

/// Owns the accept thread for one repository.
///
/// `start` and `stop` take `&mut self`, so callers cannot overlap them.
pub struct DaemonController {
    repository: Repository,
    launcher: WorkerLauncher,
    settings: DaemonSettings,
    status: StatusHandle,
    session: Option<AcceptSession>,
}

impl DaemonController {
    pub fn new(repository: Repository, launcher: WorkerLauncher, settings: DaemonSettings) -> Self {
        Self {
            repository,
            launcher,
            settings,
            status: StatusHandle::new(),
            session: None,
        }
    }

    /// Spawn the accept thread and block until it is listening.
    ///
    /// Returns immediately if already running. On failure the thread has
    /// been joined and the state is `Stopped` again.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.thread.is_finished())
        {
            // The accept thread died on its own; collect it before restarting.
            let _ = self.stop();
        }
        if self.session.is_some() {
            return Ok(());
        }
        if !self.repository.is_initialized() {
            return Err(StartError::NotInitialized {
                path: self.repository.root().to_path_buf(),
            });
        }

        self.status.set(DaemonState::Starting);

        let (ready_tx, ready_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let task = AcceptTask {
            launcher: self.launcher.clone(),
            settings: self.settings.clone(),
            status: self.status.clone(),
        };

        let thread = match std::thread::Builder::new()
            .name(ACCEPT_THREAD_NAME.to_string())
            .spawn(move || task.run(ready_tx, exit_rx, stopped_tx))
        {
            Ok(thread) => thread,
            Err(err) => {
                self.status.set(DaemonState::Stopped);
                return Err(StartError::Thread(err));
            }
        };

        let failure = match ready_rx.blocking_recv() {
            Ok(Ok(local_addr)) => {
                self.session = Some(AcceptSession {
                    local_addr,
                    exit_tx,
                    stopped_rx,
                    thread,
                });
                self.status.set(DaemonState::Running);
                tracing::info!(
                    %local_addr,
                    repository = %self.repository.root().display(),
                    "daemon started",
                );
                return Ok(());
            }
            Ok(Err(err)) => err,
            Err(_) => StartError::AcceptThreadExited,
        };

        let _ = thread.join();
        self.status.set(DaemonState::Stopped);
        Err(failure)
    }

    /// Ask the accept thread to exit and block until the listener is closed.
    ///
    /// Returns immediately if already stopped.
    pub fn stop(&mut self) -> Result<(), StopError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        self.status.set(DaemonState::Stopping);
        let _ = session.exit_tx.send(());
        let stopped = session.stopped_rx.blocking_recv();
        let joined = session.thread.join();
        self.status.set(DaemonState::Stopped);

        if stopped.is_err() || joined.is_err() {
            tracing::error!(local_addr = %session.local_addr, "accept thread died before confirming shutdown");
            return Err(StopError::AcceptThreadPanicked);
        }
        tracing::info!(local_addr = %session.local_addr, "daemon stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn state(&self) -> DaemonState {
        self.status.state()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|session| session.local_addr)
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }
}

impl Drop for DaemonController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(error = %err, "daemon did not stop cleanly on drop");
        }
    }
}

// ---------------------------------------------------------------------------
// Accept thread
// ---------------------------------------------------------------------------

struct AcceptTask {
    launcher: WorkerLauncher,
    settings: DaemonSettings,
    status: StatusHandle,
}

/// Marks the controller `Stopped` if the accept thread unwinds, so a dead
/// loop never reads as `Running`.
struct UnwindWatch(StatusHandle);

impl Drop for UnwindWatch {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.set(DaemonState::Stopped);
            tracing::error!("accept thread panicked; listener closed");
        }
    }
}

impl AcceptTask {
    fn run(
        self,
        ready_tx: oneshot::Sender<Result<SocketAddr, StartError>>,
        exit_rx: oneshot::Receiver<()>,
        stopped_tx: oneshot::Sender<()>,
    ) {
        let _watch = UnwindWatch(self.status.clone());
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ready_tx.send(Err(StartError::Runtime(err)));
                return;
            }
        };

        if runtime.block_on(self.serve(ready_tx, exit_rx)) {
            drop(runtime);
            let _ = stopped_tx.send(());
        }
    }

    /// Returns `true` if the listener came up (and has now been closed).
    async fn serve(
        &self,
        ready_tx: oneshot::Sender<Result<SocketAddr, StartError>>,
        mut exit_rx: oneshot::Receiver<()>,
    ) -> bool {
        let addr = self.settings.bind_addr;
        let listener = match bind_listener(addr) {
            Ok(listener) => listener,
            Err(source) => {
                tracing::error!(%addr, error = %source, "failed to bind pserver listener");
                let _ = ready_tx.send(Err(StartError::Bind { addr, source }));
                return false;
            }
        };
        let local_addr = listener.local_addr().unwrap_or(addr);
        if ready_tx.send(Ok(local_addr)).is_err() {
            return false;
        }

        let _sigchld = match self.settings.reaping {
            ChildReaping::IgnoreSignal => SigchldIgnored::install(),
            ChildReaping::Reaper => None,
        };
        tracing::info!(%local_addr, reaping = %self.settings.reaping, "accepting pserver connections");

        loop {
            tokio::select! {
                // A pending stop request wins over a ready connection.
                biased;
                _ = &mut exit_rx => break,
                accepted = tokio::time::timeout(self.settings.poll_interval, listener.accept()) => {
                    match accepted {
                        Err(_idle) => continue,
                        Ok(Err(err)) => {
                            tracing::warn!(error = %err, "accept failed");
                            continue;
                        }
                        Ok(Ok((stream, peer))) => self.dispatch(stream, peer),
                    }
                }
            }
        }

        drop(listener);
        tracing::debug!(%local_addr, "pserver listener closed");
        true
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let connection = match stream.into_std().and_then(|stream| {
            stream.set_nonblocking(false)?;
            Ok(stream)
        }) {
            Ok(connection) => connection,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "failed to hand off connection");
                return;
            }
        };

        match self.launcher.spawn(connection) {
            Ok(worker) => {
                let pid = worker.detach(self.settings.reaping);
                tracing::info!(%peer, pid = pid.as_raw(), "pserver worker spawned");
            }
            Err(err) => tracing::warn!(%peer, error = %err, "failed to spawn pserver worker"),
        }
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// `SIGCHLD` set to `SIG_IGN` until dropped, then the previous disposition
/// is put back. Process-wide.
struct SigchldIgnored {
    previous: SigHandler,
}

impl SigchldIgnored {
    fn install() -> Option<Self> {
        // SAFETY: SIG_IGN runs no handler code.
        match unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) } {
            Ok(previous) => Some(Self { previous }),
            Err(err) => {
                tracing::warn!(error = %err, "could not ignore SIGCHLD; workers will linger as zombies");
                None
            }
        }
    }
}

impl Drop for SigchldIgnored {
    fn drop(&mut self) {
        // SAFETY: restores a disposition previously returned by signal(2).
        if let Err(err) = unsafe { signal(Signal::SIGCHLD, self.previous) } {
            tracing::warn!(error = %err, "could not restore SIGCHLD disposition");
        }
    }
}
