use super::{Datastore, ResponseEvent, TransactionScope};
use std::sync::Arc;

/// Rolls back a still-active scope when the request future is dropped.
///
/// HTTP servers drop the in-flight handler future when the client
/// disconnects, so `Drop` is the only place a connection-closed trigger can
/// be observed. The rollback is spawned on the current Tokio runtime; outside
/// a runtime it is skipped with a warning and the datastore reclaims the
/// transaction when the handle is dropped.
pub struct CloseGuard<D: Datastore> {
    scope: Option<Arc<TransactionScope<D>>>,
}

impl<D: Datastore> CloseGuard<D> {
    pub fn new(scope: Arc<TransactionScope<D>>) -> Self {
        Self { scope: Some(scope) }
    }

    /// Releases the scope without firing the close trigger.
    pub fn disarm(mut self) {
        self.scope = None;
    }
}

impl<D: Datastore> Drop for CloseGuard<D> {
    fn drop(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        if scope.is_finished() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(Ok(_)) = scope.observe(ResponseEvent::Closed).await {
                        tracing::info!("Transaction rolled back due to connection close");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("no runtime to roll back transaction after connection close");
            }
        }
    }
}
