//! Per-request transaction middleware.

use super::{
    error::{AppError, ErrorReport},
    state::AppState,
    store::StoreTx,
    telemetry::{
        increment_transaction_errors, increment_transactions_committed,
        increment_transactions_rolled_back,
    },
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Method, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashboard_core::txn::{CloseGuard, Datastore, ResponseEvent, TerminalAction, TransactionScope};
use std::{convert::Infallible, sync::Arc};

/// The request's open transaction, as seen by handlers.
pub struct RequestTransaction<H>(pub Arc<H>);

impl<H> Clone for RequestTransaction<H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Extracts the request's transaction handle if the middleware opened one.
pub struct MaybeTransaction(pub Option<Arc<StoreTx>>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeTransaction {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<RequestTransaction<StoreTx>>()
                .map(|txn| Arc::clone(&txn.0)),
        ))
    }
}

pub fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Wraps every mutating request in one transaction.
///
/// ## Behavior
///
/// - `GET`, `HEAD`, `OPTIONS` pass through untouched
/// - A request that already carries a transaction reuses it
/// - Otherwise a transaction is opened (a failure short-circuits with 500)
///   and exposed to handlers as a [`RequestTransaction`] extension
/// - Once the handler yields a response: 2xx commits, anything else rolls
///   back. Responses built from an error count as a handler failure.
/// - If the request future is dropped first (client disconnect), the close
///   guard rolls back
///
/// A failed commit or rollback is logged and counted; the response the
/// client sees is not changed.
pub async fn transaction_manager(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    run_scoped(Arc::clone(&state.store), request, next).await
}

/// [`transaction_manager`] over any [`Datastore`].
pub async fn run_scoped<D: Datastore>(
    store: Arc<D>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_read_only(request.method())
        || request
            .extensions()
            .get::<RequestTransaction<D::Handle>>()
            .is_some()
    {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let scope = match TransactionScope::begin(store).await {
        Ok(scope) => Arc::new(scope),
        Err(err) => return AppError::from(err).into_response(),
    };
    request
        .extensions_mut()
        .insert(RequestTransaction(Arc::clone(scope.handle())));
    let guard = CloseGuard::new(Arc::clone(&scope));

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let event = if response.extensions().get::<ErrorReport>().is_some() {
        ResponseEvent::Failed
    } else {
        ResponseEvent::Responded(status)
    };

    match scope.observe(event).await {
        Some(Ok(TerminalAction::Commit)) => {
            increment_transactions_committed();
            tracing::info!(%method, %path, status, "Transaction committed");
        }
        Some(Ok(TerminalAction::Rollback)) => {
            increment_transactions_rolled_back();
            tracing::warn!(%method, %path, status, "Transaction rolled back");
        }
        Some(Err(_)) => increment_transaction_errors(),
        None => {}
    }
    guard.disarm();

    response
}
