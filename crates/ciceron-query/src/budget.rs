//! Per-call time budgets.

use std::future::Future;
use std::time::Duration;

use ciceron_core::{CiceronError, Result};

/// Run a capability call under a timeout, mapping expiry to
/// [`CiceronError::Timeout`].
pub(crate) async fn bounded<T, F>(stage: &'static str, budget_ms: u64, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(budget_ms), call).await {
        Ok(result) => result,
        Err(_) => Err(CiceronError::timeout(stage, budget_ms)),
    }
}
