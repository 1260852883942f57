//! Request-scoped transaction lifecycle.
//!
//! A mutating request owns at most one [`TransactionScope`]. Whichever of the
//! response-finished, handler-failed, or connection-closed triggers fires
//! first decides the terminal action; the rest are ignored.

mod error;
mod execute;
mod guard;
mod scope;
mod store;


pub use error::*;
pub use execute::*;
pub use guard::*;
pub use scope::*;
pub use store::*;
