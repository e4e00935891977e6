use std::future::Future;
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exit status after a forced abort, as for a process killed by SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Two-stage interrupt handling.
///
/// The first interrupt cancels `token`, so workers finish what they hold and take
/// nothing new. Returns `true` once a second interrupt arrives, at which point the
/// caller should abort. Returns `false` if the signal listener itself fails.
pub async fn escalate_interrupts<F, Fut>(mut next_interrupt: F, token: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        warn!("Cannot listen for interrupts: {}", e);
        return false;
    }
    warn!("Interrupted: finishing images in flight, skipping the rest (interrupt again to abort)");
    token.cancel();

    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupted again, aborting");
    true
}
