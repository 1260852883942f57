//! Streaming XLSX export.
//!
//! ## Pipeline
//!
//! 1. A [`RecordSource`] yields records in batches of `batch_size`.
//! 2. Each record passes through the job's optional [`Transform`] and is
//!    projected onto the job's [`Column`]s as a row of [`Cell`]s.
//! 3. Rows travel over a bounded channel to a blocking encoder task that owns
//!    the [`SheetWriter`], so a slow encoder pushes back on the source.
//! 4. The finished document is written to a [`ByteSink`] in chunks, then the
//!    sink is closed. Any failure aborts the sink instead.

mod cell;
mod column;
mod encoder;
mod error;
mod exporter;
mod sheet;
mod sink;
mod source;
mod style;


pub use cell::*;
pub use column::*;
pub use error::*;
pub use exporter::*;
pub use sheet::*;
pub use sink::*;
pub use source::*;
pub use style::*;
