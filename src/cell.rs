use serde_json::Value;

/// One decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Blank,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    pub fn from_json(v: &Value) -> Cell {
        match v {
            Value::Null => Cell::Blank,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Blank),
            Value::String(s) if s.trim().is_empty() => Cell::Blank,
            Value::String(s) => Cell::Text(s.clone()),
            // Nested values never come out of a cell decoder; keep them as text
            // so they surface as unparseable rather than vanishing.
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Cell::Blank)
    }

    /// Trimmed textual form; numbers print without a trailing `.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Blank => None,
            Cell::Text(s) => Some(s.trim().to_string()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Numeric value of a number cell or a numeric string.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Whole-number value, used for roll numbers.
    pub fn as_integer(&self) -> Option<i64> {
        let n = self.as_number()?;
        if n.fract() != 0.0 {
            return None;
        }
        Some(n as i64)
    }

    /// Case-insensitive marker comparison (`workingdays`, `month`, ...).
    pub fn matches_marker(&self, marker: &str) -> bool {
        self.as_text()
            .map(|t| t.eq_ignore_ascii_case(marker))
            .unwrap_or(false)
    }
}

/// A rows x columns cell grid as handed over by the spreadsheet decoder.
/// Rows may be ragged; missing cells read as blank.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

static BLANK: Cell = Cell::Blank;

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn from_json(v: &Value) -> Option<Grid> {
        let rows = v.as_array()?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let cells = row.as_array()?;
            out.push(cells.iter().map(Cell::from_json).collect());
        }
        Some(Grid::new(out))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&BLANK)
    }

    /// Non-blank cells of `col` from `start_row` downwards.
    pub fn column_from(&self, col: usize, start_row: usize) -> Vec<&Cell> {
        (start_row..self.rows.len())
            .map(|r| self.cell(r, col))
            .filter(|c| !c.is_blank())
            .collect()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }
}
