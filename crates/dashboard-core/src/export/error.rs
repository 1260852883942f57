use crate::BoxError;
use rust_xlsxwriter::XlsxError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The job's transform rejected a record. `index` counts records from
    /// the start of the export, before transformation.
    #[error("transform failed on record {index}: {source}")]
    Transform {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("unsupported data source: {found}")]
    UnsupportedDataSource { found: String },

    /// A page fetch or stream item failed.
    #[error("data source failed: {0}")]
    Source(#[source] BoxError),

    #[error("invalid export: {reason}")]
    InvalidConfig { reason: String },

    /// The consumer went away before the export completed.
    #[error("output sink closed before the export completed")]
    SinkClosed,

    #[error("spreadsheet encoding failed: {0}")]
    Encode(String),

    /// The encoder stopped before the document was finished.
    #[error("export aborted before the document was finished")]
    Aborted,
}

impl From<XlsxError> for ExportError {
    fn from(err: XlsxError) -> Self {
        Self::Encode(err.to_string())
    }
}
