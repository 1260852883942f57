/// One row of exportable data, keyed by column key.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Type-erased error used at the seams where callers plug in their own
/// datastores, fetchers, and transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
