//! Foreground serving: start the service, wait for Ctrl-C or `SIGTERM`,
//! stop it.

use tokio::signal::unix::{signal, SignalKind};

use crate::error::ServiceError;
use crate::service::CvsService;

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber, writing to stderr. `RUST_LOG` overrides
/// the default `info` filter. Later calls are no-ops.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };
}

/// Start `service` and block the current thread until a shutdown signal
/// arrives, then stop it.
///
/// The service is stopped even if waiting for the signal fails.
pub fn serve_blocking(service: &mut CvsService) -> Result<(), ServiceError> {
    service.start()?;

    let waited = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .and_then(|runtime| runtime.block_on(wait_for_shutdown()));

    let stopped = service.stop();
    waited.map_err(ServiceError::Signal)?;
    stopped
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("received ctrl-c, shutting down daemon");
        }
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
        }
    }
    Ok(())
}
