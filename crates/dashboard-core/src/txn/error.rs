use crate::BoxError;
use core::fmt;

/// The action that finishes a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminalAction {
    Commit,
    Rollback,
}

impl fmt::Display for TerminalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    /// The datastore refused to open a transaction. No handler ran.
    #[error("failed to start transaction: {0}")]
    Start(#[source] BoxError),

    /// Commit or rollback failed after the outcome was already decided.
    ///
    /// The scope is finished regardless; the action is never retried.
    #[error("transaction {action} failed: {source}")]
    Terminal {
        action: TerminalAction,
        #[source]
        source: BoxError,
    },
}
