//! Gate-bounded bulk execution.
//!
//! For work that fires many concurrent calls at the same rate-limited
//! dependency outside a job loop (bulk enrichment over a listing backlog,
//! for example): every call passes through an
//! [`AdaptiveGate`](autopub_core::gate::AdaptiveGate), rate-limit errors
//! tighten it, successes feed its recovery.

use std::future::Future;
use std::sync::Arc;

use autopub_core::gate::AdaptiveGate;
use autopub_core::plan::PlannerError;

/// Run `op` over every item, admission-bounded by `gate`.
///
/// All items are spawned at once; the gate decides how many run
/// concurrently. Results come back in item order. A panicking task yields
/// a `Transport` error for its item rather than poisoning the batch.
pub async fn run_gated<T, R, F, Fut>(
    gate: AdaptiveGate,
    items: Vec<T>,
    op: F,
) -> Vec<Result<R, PlannerError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<R, PlannerError>> + Send,
{
    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let gate = gate.clone();
            let op = op.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
                let result = op(item).await;
                match &result {
                    Ok(_) => gate.mark_success(),
                    Err(PlannerError::RateLimited) => gate.tighten(1),
                    Err(_) => {}
                }
                result
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(PlannerError::Transport(format!(
                "Bulk task failed: {join_error}"
            ))),
        });
    }
    results
}
