use super::{Datastore, TerminalAction, TxnError};
use crate::BoxError;
use core::sync::atomic::{AtomicU8, AtomicU16, Ordering};
use std::sync::Arc;

const ACTIVE: u8 = 0;
const COMMITTED: u8 = 1;
const ROLLED_BACK: u8 = 2;

/// Observable lifecycle of a [`TransactionScope`].
///
/// A request that never began a transaction has no scope at all, so there is
/// no "not started" variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeState {
    Active,
    Committed,
    RolledBack,
}

/// Something that happened to the request owning a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseEvent {
    /// The response was fully produced with this status code.
    Responded(u16),
    /// The handler failed before a response was produced.
    Failed,
    /// The connection went away before the response finished.
    Closed,
}

impl ResponseEvent {
    /// 2xx commits. Everything else rolls back.
    pub fn terminal_action(self) -> TerminalAction {
        match self {
            Self::Responded(status) if (200..300).contains(&status) => TerminalAction::Commit,
            _ => TerminalAction::Rollback,
        }
    }
}

/// One transaction bound to one request.
///
/// ## Responsibilities
///
/// - Owns the datastore handle handed to the request's handlers
/// - Records the first response status it is told about
/// - Performs exactly one terminal action, no matter how many triggers race
///
/// The terminal action is claimed with a compare-and-swap before the
/// datastore is awaited, so a trigger arriving mid-commit sees the scope as
/// finished and does nothing. The datastore call itself runs on a spawned
/// task, so dropping the request future cannot strand a claimed action.
pub struct TransactionScope<D: Datastore> {
    store: Arc<D>,
    handle: Arc<D::Handle>,
    state: AtomicU8,
    // 0 means no status observed yet.
    status_code: AtomicU16,
}

impl<D: Datastore> TransactionScope<D> {
    /// Opens a transaction and returns a scope in [`ScopeState::Active`].
    pub async fn begin(store: Arc<D>) -> Result<Self, TxnError> {
        let handle = store.begin().await.map_err(TxnError::Start)?;
        Ok(Self {
            store,
            handle: Arc::new(handle),
            state: AtomicU8::new(ACTIVE),
            status_code: AtomicU16::new(0),
        })
    }

    pub fn handle(&self) -> &Arc<D::Handle> {
        &self.handle
    }

    pub fn state(&self) -> ScopeState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => ScopeState::Active,
            COMMITTED => ScopeState::Committed,
            _ => ScopeState::RolledBack,
        }
    }

    /// True once a terminal action has been claimed, even if the datastore
    /// call is still in flight or failed.
    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) != ACTIVE
    }

    /// The status of the response that finished this scope, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self.status_code.load(Ordering::Acquire) {
            0 => None,
            code => Some(code),
        }
    }

    /// Feeds a request event into the scope.
    ///
    /// Returns `None` when the scope was already finished and the event is
    /// ignored. Otherwise returns the outcome of the single terminal action
    /// this event triggered.
    pub async fn observe(&self, event: ResponseEvent) -> Option<Result<TerminalAction, TxnError>> {
        let action = event.terminal_action();
        if !self.claim(action) {
            tracing::trace!(?event, "transaction already finished, ignoring event");
            return None;
        }
        if let ResponseEvent::Responded(status) = event {
            self.status_code.store(status, Ordering::Release);
        }
        Some(self.perform(action).await)
    }

    /// Commits unless already finished.
    pub async fn commit(&self) -> Option<Result<TerminalAction, TxnError>> {
        if !self.claim(TerminalAction::Commit) {
            return None;
        }
        Some(self.perform(TerminalAction::Commit).await)
    }

    /// Rolls back unless already finished.
    pub async fn rollback(&self) -> Option<Result<TerminalAction, TxnError>> {
        if !self.claim(TerminalAction::Rollback) {
            return None;
        }
        Some(self.perform(TerminalAction::Rollback).await)
    }

    fn claim(&self, action: TerminalAction) -> bool {
        let next = match action {
            TerminalAction::Commit => COMMITTED,
            TerminalAction::Rollback => ROLLED_BACK,
        };
        self.state
            .compare_exchange(ACTIVE, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs the claimed action on its own task. Once claimed, the action
    /// completes even if the caller's future is dropped mid-await.
    async fn perform(&self, action: TerminalAction) -> Result<TerminalAction, TxnError> {
        let store = Arc::clone(&self.store);
        let handle = Arc::clone(&self.handle);
        let task = tokio::spawn(async move {
            let result = match action {
                TerminalAction::Commit => store.commit(&handle).await,
                TerminalAction::Rollback => store.rollback(&handle).await,
            };
            if let Err(err) = &result {
                tracing::error!(%action, error = %err, "transaction {action} failed");
            }
            result
        });
        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%action, error = %err, "transaction {action} task failed");
                Err(Box::new(err) as BoxError)
            }
        };
        result
            .map(|()| action)
            .map_err(|source| TxnError::Terminal { action, source })
    }
}

impl<D: Datastore> core::fmt::Debug for TransactionScope<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("state", &self.state())
            .field("status_code", &self.status_code())
            .finish_non_exhaustive()
    }
}
