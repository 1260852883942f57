use super::ExportError;
use crate::{BoxError, Record};
use core::future::Future;
use futures::{
    FutureExt, StreamExt, TryStreamExt,
    future::BoxFuture,
    stream::{self, BoxStream, Stream},
};
use serde_json::Value;

pub type RecordStream = BoxStream<'static, Result<Record, BoxError>>;
pub type PageFuture = BoxFuture<'static, Result<Vec<Record>, BoxError>>;

/// Fetches the page starting at `offset` holding at most `limit` records.
pub type FetchPage = Box<dyn FnMut(usize, usize) -> PageFuture + Send>;

/// Where export records come from.
pub enum RecordSource {
    /// Records already in memory. Consumed in `batch_size` chunks with a
    /// scheduler yield between chunks.
    Records(Vec<Record>),
    /// Called with `(offset, batch_size)`, `offset` advancing by
    /// `batch_size`, until a page comes back shorter than requested.
    Paged(FetchPage),
    /// Pulled one record at a time until exhausted.
    Stream(RecordStream),
}

impl RecordSource {
    pub fn paged<F, Fut>(mut fetch: F) -> Self
    where
        F: FnMut(usize, usize) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<Record>, BoxError>> + Send + 'static,
    {
        Self::Paged(Box::new(move |offset, limit| fetch(offset, limit).boxed()))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Record, BoxError>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Records(_) => "records",
            Self::Paged(_) => "paged",
            Self::Stream(_) => "stream",
        }
    }
}

impl core::fmt::Debug for RecordSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Records(records) => f.debug_tuple("Records").field(&records.len()).finish(),
            Self::Paged(_) => f.write_str("Paged(..)"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Accepts a JSON array of objects. Anything else, including an array
/// holding a non-object, is rejected.
impl TryFrom<Value> for RecordSource {
    type Error = ExportError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Array(items) = value else {
            return Err(ExportError::UnsupportedDataSource {
                found: json_kind(&value).to_owned(),
            });
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(ExportError::UnsupportedDataSource {
                    found: format!("{} at index {index}", json_kind(&other)),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Records)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A page shorter than the requested limit is the last one. A full page
/// always triggers one more fetch, which may come back empty.
pub(crate) fn is_last_page(len: usize, limit: usize) -> bool {
    len < limit
}

/// Turns an offset/limit fetcher into a lazy record stream.
///
/// Pages are fetched only as the stream is polled, with the same stop rule
/// as [`RecordSource::Paged`].
pub fn paginate<F, Fut>(fetch: F, batch_size: usize) -> RecordStream
where
    F: FnMut(usize, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<Record>, BoxError>> + Send + 'static,
{
    stream::try_unfold(
        (fetch, 0usize, false),
        move |(mut fetch, offset, done)| async move {
            if done || batch_size == 0 {
                return Ok::<_, BoxError>(None);
            }
            let page = fetch(offset, batch_size).await?;
            if page.is_empty() {
                return Ok(None);
            }
            let last = is_last_page(page.len(), batch_size);
            let records = stream::iter(page.into_iter().map(Ok::<_, BoxError>));
            Ok(Some((records, (fetch, offset + batch_size, last))))
        },
    )
    .try_flatten()
    .boxed()
}
