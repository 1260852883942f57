use super::{Cell, CellStyle, Column, ExportError, HorizontalAlign};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook};

/// Longest worksheet name a workbook accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Everything needed to open a sheet, fixed for the whole export.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetSpec {
    pub name: String,
    pub header_style: CellStyle,
    pub data_style: CellStyle,
}

/// Synchronous cell sink driven by the blocking encoder task.
///
/// Row 0 is the header. Data rows are written in increasing order starting
/// at 1, each with the [`SheetSpec`] data style.
pub trait SheetWriter {
    /// Writes the header row and sets the initial column widths.
    fn write_header(&mut self, columns: &[Column], widths: &[f64]) -> Result<(), ExportError>;

    fn write_row(&mut self, row: u32, cells: &[Cell]) -> Result<(), ExportError>;

    fn set_column_width(&mut self, column: u16, width: f64) -> Result<(), ExportError>;

    /// Serializes the finished document.
    fn finish(self) -> Result<Vec<u8>, ExportError>
    where
        Self: Sized;
}

/// A single-sheet XLSX workbook.
pub struct XlsxSheet {
    workbook: Workbook,
    header: Format,
    data: Format,
}

impl XlsxSheet {
    pub fn new(spec: &SheetSpec) -> Result<Self, ExportError> {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name(spec.name.as_str())?;
        Ok(Self {
            workbook,
            header: to_format(&spec.header_style),
            data: to_format(&spec.data_style),
        })
    }
}

impl SheetWriter for XlsxSheet {
    fn write_header(&mut self, columns: &[Column], widths: &[f64]) -> Result<(), ExportError> {
        let Self {
            workbook, header, ..
        } = self;
        let sheet = workbook.worksheet_from_index(0)?;
        for (col, (column, width)) in columns.iter().zip(widths).enumerate() {
            let col = col as u16;
            sheet.write_string_with_format(0, col, column.header.as_str(), header)?;
            sheet.set_column_width(col, *width)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: &[Cell]) -> Result<(), ExportError> {
        let Self { workbook, data, .. } = self;
        let sheet = workbook.worksheet_from_index(0)?;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => sheet.write_blank(row, col, data)?,
                Cell::Text(text) => sheet.write_string_with_format(row, col, text.as_str(), data)?,
                Cell::Number(n) => sheet.write_number_with_format(row, col, *n, data)?,
                Cell::Bool(b) => sheet.write_boolean_with_format(row, col, *b, data)?,
            };
        }
        Ok(())
    }

    fn set_column_width(&mut self, column: u16, width: f64) -> Result<(), ExportError> {
        self.workbook
            .worksheet_from_index(0)?
            .set_column_width(column, width)?;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, ExportError> {
        Ok(self.workbook.save_to_buffer()?)
    }
}

fn to_format(style: &CellStyle) -> Format {
    let align = match style.align {
        HorizontalAlign::Left => FormatAlign::Left,
        HorizontalAlign::Center => FormatAlign::Center,
        HorizontalAlign::Right => FormatAlign::Right,
    };
    let mut format = Format::new()
        .set_align(align)
        .set_align(FormatAlign::VerticalCenter);
    if style.bold {
        format = format.set_bold();
    }
    if let Some(rgb) = style.font_color {
        format = format.set_font_color(Color::RGB(rgb));
    }
    if let Some(rgb) = style.fill_color {
        format = format
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(rgb));
    }
    if style.thin_border {
        format = format.set_border(FormatBorder::Thin);
    }
    format
}

/// Makes `name` acceptable as a worksheet name.
///
/// Characters a workbook forbids become `_`, surrounding apostrophes are
/// dropped, and the result is cut to [`MAX_SHEET_NAME_LEN`] characters. An
/// empty result falls back to `Sheet1`.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .trim_matches('\'')
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_owned()
    } else {
        cleaned
    }
}
