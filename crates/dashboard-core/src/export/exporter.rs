use super::{
    ByteSink, CellStyle, Column, ExportError, RecordSource, SheetSpec, SheetWriter, XlsxSheet,
    encoder::{SheetCommand, join_encoder, spawn_encoder},
    row_cells, sanitize_sheet_name,
    source::is_last_page,
};
use crate::{BoxError, Record};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-record rewrite applied before a record is projected onto columns.
pub type Transform = Arc<dyn Fn(Record) -> Result<Record, BoxError> + Send + Sync>;

/// Widest sheet a workbook can hold.
pub const MAX_COLUMNS: usize = 16_384;

const AUTO_FIT_PADDING: usize = 2;
const AUTO_FIT_MIN: usize = 10;
const AUTO_FIT_MAX: usize = 50;

/// Exporter-wide defaults. Jobs can override the sheet name and batch size.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportOptions {
    pub sheet_name: String,
    pub header_style: CellStyle,
    pub data_style: CellStyle,
    /// Width of columns that carry no explicit width.
    pub column_width: f64,
    /// Resize columns to their longest rendered value once all rows are in.
    pub auto_fit: bool,
    pub batch_size: usize,
    /// Rows buffered between the producer and the encoder.
    pub row_buffer: usize,
    /// Largest chunk handed to the sink in one write.
    pub write_chunk: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_owned(),
            header_style: CellStyle::header(),
            data_style: CellStyle::data(),
            column_width: 15.0,
            auto_fit: true,
            batch_size: 1000,
            row_buffer: 256,
            write_chunk: 64 * 1024,
        }
    }
}

/// One export request.
pub struct ExportJob {
    pub columns: Vec<Column>,
    pub source: RecordSource,
    pub transform: Option<Transform>,
    pub sheet_name: Option<String>,
    pub batch_size: Option<usize>,
}

impl ExportJob {
    pub fn new(columns: Vec<Column>, source: RecordSource) -> Self {
        Self {
            columns,
            source,
            transform: None,
            sheet_name: None,
            batch_size: None,
        }
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Record) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Data rows written, header excluded.
    pub rows: usize,
    /// Array chunks, page fetches (including a final empty one), or stream
    /// items pulled from the source.
    pub batches: usize,
    /// Size of the encoded document.
    pub bytes: usize,
}

/// Streams record sources into XLSX documents.
///
/// ## Responsibilities
///
/// - Pulls records from the job's source in batches
/// - Applies the job's transform and projects records onto columns
/// - Feeds rows to a blocking encoder over a bounded channel
/// - Tracks auto-fit widths without keeping rows around
/// - Writes the document to the sink in chunks, then closes or aborts it
///
/// Cheap to clone; holds only options.
#[derive(Clone, Debug, Default)]
pub struct Exporter {
    options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Exports to memory and returns the whole document.
    pub async fn export_to_buffer(
        &self,
        job: ExportJob,
    ) -> Result<(Bytes, ExportSummary), ExportError> {
        let mut sink = super::BufferSink::new();
        let summary = self.export_to_sink(job, &mut sink).await?;
        Ok((sink.into_bytes(), summary))
    }

    pub async fn export_to_sink<K: ByteSink>(
        &self,
        job: ExportJob,
        sink: &mut K,
    ) -> Result<ExportSummary, ExportError> {
        self.export_with(job, XlsxSheet::new, sink).await
    }

    /// Exports through a caller-supplied sheet writer.
    ///
    /// `make_sheet` runs on the blocking encoder thread.
    pub async fn export_with<S, F, K>(
        &self,
        job: ExportJob,
        make_sheet: F,
        sink: &mut K,
    ) -> Result<ExportSummary, ExportError>
    where
        S: SheetWriter,
        F: FnOnce(&SheetSpec) -> Result<S, ExportError> + Send + 'static,
        K: ByteSink,
    {
        let result = match self.run(job, make_sheet, sink).await {
            Ok(summary) => sink.close().await.map(|()| summary),
            Err(err) => Err(err),
        };
        match result {
            Ok(summary) => {
                tracing::debug!(
                    rows = summary.rows,
                    batches = summary.batches,
                    bytes = summary.bytes,
                    "export finished"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::warn!(error = %err, "export aborted");
                sink.abort(&err).await;
                Err(err)
            }
        }
    }

    async fn run<S, F, K>(
        &self,
        job: ExportJob,
        make_sheet: F,
        sink: &mut K,
    ) -> Result<ExportSummary, ExportError>
    where
        S: SheetWriter,
        F: FnOnce(&SheetSpec) -> Result<S, ExportError> + Send + 'static,
        K: ByteSink,
    {
        let ExportJob {
            columns,
            source,
            transform,
            sheet_name,
            batch_size,
        } = job;
        let batch_size = batch_size.unwrap_or(self.options.batch_size);
        validate(&columns, batch_size)?;
        if sink.is_closed() {
            return Err(ExportError::SinkClosed);
        }

        let spec = SheetSpec {
            name: sanitize_sheet_name(sheet_name.as_deref().unwrap_or(&self.options.sheet_name)),
            header_style: self.options.header_style.clone(),
            data_style: self.options.data_style.clone(),
        };
        let widths = columns
            .iter()
            .map(|c| c.width.unwrap_or(self.options.column_width))
            .collect();

        let (tx, rx) = mpsc::channel(self.options.row_buffer.max(1));
        let encoder = spawn_encoder(spec, columns.clone(), widths, make_sheet, rx);

        let mut producer = RowProducer {
            columns: &columns,
            transform: transform.as_deref(),
            tx,
            fit: WidthTracker::new(&columns),
            rows: 0,
            batches: 0,
        };
        if let Err(err) = producer.drain(source, batch_size, &*sink).await {
            drop(producer);
            let encoded = join_encoder(encoder).await;
            // A dead channel means the encoder failed first; report its error.
            return Err(match (err, encoded) {
                (ExportError::Aborted, Err(cause)) => cause,
                (err, _) => err,
            });
        }

        let RowProducer {
            tx,
            fit,
            rows,
            batches,
            ..
        } = producer;
        let widths = self.options.auto_fit.then(|| fit.widths());
        // A closed channel here means the encoder already failed.
        let _ = tx.send(SheetCommand::Finish { widths }).await;
        drop(tx);
        let document = join_encoder(encoder).await?;

        let bytes = document.len();
        let mut document = Bytes::from(document);
        let chunk = self.options.write_chunk.max(1);
        while !document.is_empty() {
            if sink.is_closed() {
                return Err(ExportError::SinkClosed);
            }
            let next = document.split_to(document.len().min(chunk));
            sink.write(next).await?;
        }

        Ok(ExportSummary {
            rows,
            batches,
            bytes,
        })
    }
}

fn validate(columns: &[Column], batch_size: usize) -> Result<(), ExportError> {
    if columns.is_empty() {
        return Err(ExportError::InvalidConfig {
            reason: "at least one column is required".to_owned(),
        });
    }
    if columns.len() > MAX_COLUMNS {
        return Err(ExportError::InvalidConfig {
            reason: format!("{} columns exceeds the limit of {MAX_COLUMNS}", columns.len()),
        });
    }
    if batch_size == 0 {
        return Err(ExportError::InvalidConfig {
            reason: "batch size must be positive".to_owned(),
        });
    }
    Ok(())
}

struct RowProducer<'a> {
    columns: &'a [Column],
    transform: Option<&'a (dyn Fn(Record) -> Result<Record, BoxError> + Send + Sync)>,
    tx: mpsc::Sender<SheetCommand>,
    fit: WidthTracker,
    rows: usize,
    batches: usize,
}

impl RowProducer<'_> {
    async fn drain<K: ByteSink>(
        &mut self,
        source: RecordSource,
        batch_size: usize,
        sink: &K,
    ) -> Result<(), ExportError> {
        match source {
            RecordSource::Records(records) => {
                let mut records = records.into_iter();
                loop {
                    ensure_open(sink)?;
                    let batch: Vec<Record> = records.by_ref().take(batch_size).collect();
                    if batch.is_empty() {
                        break;
                    }
                    self.batches += 1;
                    for record in batch {
                        self.push(record).await?;
                    }
                    tokio::task::yield_now().await;
                }
            }
            RecordSource::Paged(mut fetch) => {
                let mut offset = 0;
                loop {
                    ensure_open(sink)?;
                    let page = fetch(offset, batch_size)
                        .await
                        .map_err(ExportError::Source)?;
                    self.batches += 1;
                    let len = page.len();
                    for record in page {
                        self.push(record).await?;
                    }
                    if len == 0 || is_last_page(len, batch_size) {
                        break;
                    }
                    offset += batch_size;
                }
            }
            RecordSource::Stream(mut stream) => loop {
                ensure_open(sink)?;
                let Some(item) = stream.next().await else {
                    break;
                };
                self.batches += 1;
                self.push(item.map_err(ExportError::Source)?).await?;
            },
        }
        Ok(())
    }

    async fn push(&mut self, record: Record) -> Result<(), ExportError> {
        let index = self.rows;
        let record = match self.transform {
            Some(transform) => {
                transform(record).map_err(|source| ExportError::Transform { index, source })?
            }
            None => record,
        };
        let cells = row_cells(self.columns, &record);
        self.fit.observe(&cells);
        self.tx
            .send(SheetCommand::Row(cells))
            .await
            .map_err(|_| ExportError::Aborted)?;
        self.rows += 1;
        Ok(())
    }
}

fn ensure_open<K: ByteSink>(sink: &K) -> Result<(), ExportError> {
    if sink.is_closed() {
        return Err(ExportError::SinkClosed);
    }
    Ok(())
}

/// Longest rendered length per column, seeded with the header.
struct WidthTracker {
    longest: Vec<usize>,
}

impl WidthTracker {
    fn new(columns: &[Column]) -> Self {
        Self {
            longest: columns
                .iter()
                .map(|c| match c.header.chars().count() {
                    0 => AUTO_FIT_MIN,
                    len => len,
                })
                .collect(),
        }
    }

    fn observe(&mut self, cells: &[super::Cell]) {
        for (longest, cell) in self.longest.iter_mut().zip(cells) {
            *longest = (*longest).max(cell.rendered_len());
        }
    }

    fn widths(&self) -> Vec<f64> {
        self.longest
            .iter()
            .map(|&len| (len + AUTO_FIT_PADDING).clamp(AUTO_FIT_MIN, AUTO_FIT_MAX) as f64)
            .collect()
    }
}
