use crate::BoxError;
use core::future::Future;

/// The slice of a database the transaction layer needs.
///
/// `Handle` is opaque to this crate. Handlers run their queries through it;
/// the scope only ever begins, commits, or rolls it back. Implementations
/// must tolerate `commit` and `rollback` being called at most once per
/// handle, never both.
pub trait Datastore: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn begin(&self) -> impl Future<Output = Result<Self::Handle, BoxError>> + Send;

    fn commit(&self, handle: &Self::Handle) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn rollback(&self, handle: &Self::Handle)
    -> impl Future<Output = Result<(), BoxError>> + Send;
}
