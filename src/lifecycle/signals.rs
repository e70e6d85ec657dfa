//! OS signal handling.
//!
//! SIGINT (and SIGTERM on unix) resolve `wait_for_signal`; the caller then
//! triggers the shared [`Shutdown`](super::Shutdown). SIGHUP asks a process
//! to reload its local state through [`ReloadSignal`].

/// Wait until the process is asked to stop.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Stream of reload requests (SIGHUP on unix, never elsewhere).
pub struct ReloadSignal {
    #[cfg(unix)]
    hangup: Option<tokio::signal::unix::Signal>,
}

impl ReloadSignal {
    pub fn new() -> Self {
        #[cfg(unix)]
        let hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGHUP");
                None
            }
        };

        Self {
            #[cfg(unix)]
            hangup,
        }
    }

    /// Wait for the next reload request.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(sig) = self.hangup.as_mut() {
                if sig.recv().await.is_some() {
                    tracing::info!("Received SIGHUP");
                    return;
                }
                self.hangup = None;
            }
        }
        std::future::pending::<()>().await
    }
}

impl Default for ReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}
