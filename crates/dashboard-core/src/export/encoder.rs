use super::{Cell, Column, ExportError, SheetSpec, SheetWriter};
use tokio::{sync::mpsc, task::JoinHandle};

pub(crate) enum SheetCommand {
    Row(Vec<Cell>),
    /// All rows are in. Apply final widths, if any, and serialize.
    Finish { widths: Option<Vec<f64>> },
}

/// Runs the sheet writer on the blocking pool.
///
/// The writer is built inside the task so it never has to cross threads. If
/// the command channel closes without a `Finish`, the producer has failed
/// and the partial sheet is thrown away.
pub(crate) fn spawn_encoder<S, F>(
    spec: SheetSpec,
    columns: Vec<Column>,
    widths: Vec<f64>,
    make_sheet: F,
    rx: mpsc::Receiver<SheetCommand>,
) -> JoinHandle<Result<Vec<u8>, ExportError>>
where
    S: SheetWriter,
    F: FnOnce(&SheetSpec) -> Result<S, ExportError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || encode(&spec, &columns, &widths, make_sheet, rx))
}

fn encode<S, F>(
    spec: &SheetSpec,
    columns: &[Column],
    widths: &[f64],
    make_sheet: F,
    mut rx: mpsc::Receiver<SheetCommand>,
) -> Result<Vec<u8>, ExportError>
where
    S: SheetWriter,
    F: FnOnce(&SheetSpec) -> Result<S, ExportError>,
{
    let mut sheet = make_sheet(spec)?;
    sheet.write_header(columns, widths)?;

    let mut row: u32 = 1;
    while let Some(command) = rx.blocking_recv() {
        match command {
            SheetCommand::Row(cells) => {
                sheet.write_row(row, &cells)?;
                row += 1;
            }
            SheetCommand::Finish { widths } => {
                for (col, width) in widths.into_iter().flatten().enumerate() {
                    sheet.set_column_width(col as u16, width)?;
                }
                return sheet.finish();
            }
        }
    }
    Err(ExportError::Aborted)
}

pub(crate) async fn join_encoder(
    handle: JoinHandle<Result<Vec<u8>, ExportError>>,
) -> Result<Vec<u8>, ExportError> {
    handle
        .await
        .map_err(|err| ExportError::Encode(format!("encoder task failed: {err}")))?
}
