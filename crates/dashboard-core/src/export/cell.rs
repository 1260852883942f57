use super::Column;
use crate::Record;
use serde_json::Value;

/// A single rendered cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// A missing key or JSON `null`.
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Empty,
            Some(Value::String(s)) => Self::Text(s.clone()),
            Some(Value::Bool(b)) => Self::Bool(*b),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Text(n.to_string()),
            },
            Some(nested @ (Value::Array(_) | Value::Object(_))) => Self::Text(nested.to_string()),
        }
    }

    /// Length of the value as it would be displayed, in characters.
    pub fn rendered_len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Text(s) => s.chars().count(),
            Self::Number(n) => n.to_string().len(),
            Self::Bool(true) => 4,
            Self::Bool(false) => 5,
        }
    }
}

/// Projects `record` onto `columns`, in column order.
pub fn row_cells(columns: &[Column], record: &Record) -> Vec<Cell> {
    columns
        .iter()
        .map(|column| Cell::from_value(record.get(&column.key)))
        .collect()
}
