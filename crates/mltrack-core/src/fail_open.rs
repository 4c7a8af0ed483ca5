//! Fail-open helpers for best-effort telemetry
//!
//! Sink emission, plot rendering and old-checkpoint cleanup must never abort a
//! training run. These helpers run such operations, log failures via
//! `tracing::warn!` and hand back `None` instead of an error.
//!
//! DO NOT use fail-open for:
//! - Writing the report or checkpoint the caller asked for
//! - Tracker construction (configuration errors)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run a best-effort operation, logging and discarding its error
///
/// # Usage
///
/// ```no_run
/// use mltrack_core::fail_open::fail_open;
/// use mltrack_core::Result;
///
/// async fn render_plots() -> Result<usize> {
///     Ok(3)
/// }
///
/// async fn example() {
///     let rendered = fail_open("plots", || render_plots()).await;
///     // rendered is None if render_plots() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Run a best-effort operation once per target, independently
///
/// A failing target is logged and skipped; the remaining targets still run in
/// order. Returns how many targets failed.
pub async fn fail_open_each<'a, I, T, F, Fut>(operation_name: &str, targets: I, mut f: F) -> usize
where
    I: IntoIterator<Item = &'a T>,
    T: ?Sized + 'a,
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut failures = 0;
    for (idx, target) in targets.into_iter().enumerate() {
        if let Err(e) = f(target).await {
            warn!(
                "{} failed for target {} (fail-open): {}",
                operation_name, idx, e
            );
            failures += 1;
        }
    }
    failures
}
