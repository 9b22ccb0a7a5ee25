use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on SIGINT (Ctrl+C) or, on Unix, SIGTERM
pub fn spawn_signal_handlers(token: CancellationToken) {
    #[cfg(unix)]
    {
        let token_sigterm = token.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                Some(()) = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    token_sigterm.cancel();
                }
                _ = token_sigterm.cancelled() => {}
            }
        });
    }

    tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    token.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
            },
            _ = token.cancelled() => {}
        }
    });
}
