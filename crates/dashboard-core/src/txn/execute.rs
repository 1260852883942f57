use super::{Datastore, TransactionScope, TxnError};
use core::{fmt, future::Future};
use std::sync::Arc;

/// Runs `operation` inside a transaction.
///
/// With an `existing` handle (the request's scope) the operation simply runs
/// against it; commit and rollback stay with whoever owns that scope.
///
/// Without one, a fresh transaction is opened and owned here: it commits when
/// the operation succeeds and rolls back when it fails. A failed operation's
/// error is returned unchanged after the rollback; a failed rollback is
/// logged and otherwise ignored. A failed commit is returned as
/// [`TxnError::Terminal`].
pub async fn execute_in_transaction<D, T, E, F, Fut>(
    store: &Arc<D>,
    existing: Option<&Arc<D::Handle>>,
    operation: F,
) -> Result<T, E>
where
    D: Datastore,
    F: FnOnce(Arc<D::Handle>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TxnError> + fmt::Display,
{
    if let Some(handle) = existing {
        return operation(Arc::clone(handle)).await;
    }

    let scope = TransactionScope::begin(Arc::clone(store)).await?;
    match operation(Arc::clone(scope.handle())).await {
        Ok(value) => {
            if let Some(Err(err)) = scope.commit().await {
                return Err(err.into());
            }
            tracing::debug!("Transaction executed and committed");
            Ok(value)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Transaction rolled back after failed operation");
            // Failures are logged by the scope; the operation's error wins.
            let _ = scope.rollback().await;
            Err(err)
        }
    }
}
