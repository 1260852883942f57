use crate::server::{
    error::AppError,
    state::AppState,
    telemetry::{
        decrement_exports_inflight, increment_export_errors, increment_export_rows,
        increment_exports_inflight, record_export_duration,
    },
};
use axum::{
    body::Body,
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::Response,
};
use dashboard_core::export::{ChannelSink, ExportError, ExportJob, ExportSummary};
use futures::{StreamExt, future, stream};
use std::{
    future::Future,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Holds one slot of the in-flight export count until dropped.
struct InflightGuard<'a> {
    count: &'a AtomicUsize,
}

impl<'a> InflightGuard<'a> {
    fn acquire(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        increment_exports_inflight();
        Self { count }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
        decrement_exports_inflight();
    }
}

/// Runs an export with metrics and a completion log line.
///
/// `inflight` counts the export until it finishes or its future is dropped.
pub async fn tracked<F>(inflight: &AtomicUsize, export: F) -> Result<ExportSummary, ExportError>
where
    F: Future<Output = Result<ExportSummary, ExportError>>,
{
    let started = Instant::now();
    let slot = InflightGuard::acquire(inflight);
    let result = export.await;
    drop(slot);
    record_export_duration(started.elapsed().as_secs_f64() * 1000.0);

    match &result {
        Ok(summary) => {
            increment_export_rows(summary.rows as u64);
            tracing::info!(
                rows = summary.rows,
                batches = summary.batches,
                bytes = summary.bytes,
                "Export completed"
            );
        }
        Err(err) => {
            increment_export_errors();
            tracing::warn!(error = %err, "Export failed");
        }
    }
    result
}

/// Streams `job` to the client as an `.xlsx` attachment.
///
/// The export runs on its own task feeding a bounded channel. The response
/// is held back until the first chunk arrives, so anything that fails before
/// a byte is produced becomes an ordinary error response. Later failures
/// end the body stream with an error, and a client that disconnects closes
/// the channel, which stops the export at its next batch.
pub async fn stream(
    state: &AppState,
    job: ExportJob,
    filename: String,
) -> Result<Response, AppError> {
    let (mut sink, mut rx) = ChannelSink::channel(state.config.export_stream_buffer);
    let exporter = state.exporter.clone();
    let inflight = Arc::clone(&state.exports_inflight);
    let span = tracing::info_span!("export", %filename);
    let task = tokio::spawn(
        async move { tracked(&inflight, exporter.export_to_sink(job, &mut sink)).await }
            .instrument(span),
    );

    let first = match rx.recv().await {
        Some(Ok(chunk)) => chunk,
        _ => {
            return Err(match task.await {
                Ok(Err(err)) => AppError::Export(err),
                Ok(Ok(_)) => AppError::Internal("export finished without output".to_owned()),
                Err(err) => AppError::Internal(format!("export task failed: {err}")),
            });
        }
    };

    let body =
        stream::once(future::ready(Ok::<_, io::Error>(first))).chain(ReceiverStream::new(rx));
    Response::builder()
        .header(CONTENT_TYPE, XLSX_CONTENT_TYPE)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(body))
        .map_err(|err| AppError::Internal(err.to_string()))
}

/// Picks a safe `.xlsx` attachment name.
///
/// Requested names are reduced to printable ASCII without quotes or path
/// separators. Without a usable name, `<stem>_<YYYY-MM-DD>.xlsx` is used.
pub fn attachment_name(requested: Option<&str>, stem: &str) -> String {
    let cleaned: String = requested
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' | ';' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        let today = chrono::Utc::now().format("%Y-%m-%d");
        return format!("{stem}_{today}.xlsx");
    }
    if cleaned.to_ascii_lowercase().ends_with(".xlsx") {
        cleaned.to_owned()
    } else {
        format!("{cleaned}.xlsx")
    }
}
