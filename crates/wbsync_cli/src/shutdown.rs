use console::Term;
use tokio_util::sync::CancellationToken;

/// Exit status used when the user forces termination.
const FORCE_QUIT_STATUS: i32 = 130;

/// Install the Ctrl+C handler.
///
/// The first signal cancels `root`, letting the running sync unwind and
/// report what it managed to upload. The second exits immediately.
pub(crate) fn setup_shutdown_handler(root: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing in-flight uploads...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing in-flight uploads");
        }

        root.cancel();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(FORCE_QUIT_STATUS);
    });
}
