//! In-memory result tables.
//!
//! A [`Table`] is a list of named [`Column`]s of equal length, stored
//! column-major the way VOTable fields arrive. Cells are [`Value`]s. Columns
//! keep the field metadata the service sent (description, UCD, unit,
//! datatype) so that column-role detection can run on results as well as on
//! `TAP_SCHEMA` listings.

use std::cmp::Ordering;
use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::{TapError, TapResult};

/// A single table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Float` cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view; floats are accepted only when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Total order used for sorting.
    ///
    /// Null < Bool < numbers < Text. Ints and floats compare numerically;
    /// NaN sorts after every other number.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            (a, b) if a.rank() == 2 && b.rank() == 2 => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                match (x.is_nan(), y.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                }
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A named column with optional field metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub description: Option<String>,
    pub ucd: Option<String>,
    pub unit: Option<String>,
    pub datatype: Option<String>,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            description: None,
            ucd: None,
            unit: None,
            datatype: None,
            values,
        }
    }

    /// Text column from optional strings; `None` becomes [`Value::Null`].
    pub fn from_text<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.into())))
            .collect();
        Self::new(name, values).with_datatype("char")
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_ucd(mut self, ucd: impl Into<String>) -> Self {
        self.ucd = Some(ucd.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column-major table of [`Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table.value(self.index, column)
    }

    pub fn get_str(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &'a Value> + 'a {
        let (table, index) = (self.table, self.index);
        table.columns.iter().map(move |c| &c.values[index])
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, rejecting duplicate names and ragged columns.
    pub fn from_columns(columns: Vec<Column>) -> TapResult<Self> {
        let mut table = Self::new();
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Append a column.
    ///
    /// # Errors
    /// [`TapError::Table`] if the name is taken or the length differs from
    /// the existing columns.
    pub fn add_column(&mut self, column: Column) -> TapResult<()> {
        if self.has_column(&column.name) {
            return Err(TapError::table(format!(
                "column '{}' already exists",
                column.name
            )));
        }
        self.check_length(&column)?;
        self.columns.push(column);
        Ok(())
    }

    /// Overwrite a column of the same name in place, or append it.
    pub fn replace_column(&mut self, column: Column) -> TapResult<()> {
        self.check_length(&column)?;
        match self.columns.iter().position(|c| c.name == column.name) {
            Some(pos) => self.columns[pos] = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let pos = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(pos))
    }

    fn check_length(&self, column: &Column) -> TapResult<()> {
        if let Some(other) = self.columns.iter().find(|c| c.name != column.name) {
            if other.len() != column.len() {
                return Err(TapError::table(format!(
                    "column '{}' has {} rows, table has {}",
                    column.name,
                    column.len(),
                    other.len()
                )));
            }
        }
        Ok(())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.len()).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len()).map(move |index| Row { table: self, index })
    }

    /// New table with the rows for which `predicate` holds.
    pub fn filter<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(&Row<'_>) -> bool,
    {
        let keep: Vec<usize> = self
            .rows()
            .filter(|row| predicate(row))
            .map(|row| row.index)
            .collect();
        self.take_rows(&keep)
    }

    fn take_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
                ..c.clone_metadata()
            })
            .collect();
        Table { columns }
    }

    /// Stable sort on one or more key columns, compared left to right.
    ///
    /// # Errors
    /// [`TapError::Table`] if a key column does not exist.
    pub fn sort_by(&mut self, keys: &[&str]) -> TapResult<()> {
        let mut key_columns = Vec::with_capacity(keys.len());
        for key in keys {
            let column = self
                .column(key)
                .ok_or_else(|| TapError::table(format!("cannot sort on missing column '{}'", key)))?;
            key_columns.push(&column.values);
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            key_columns
                .iter()
                .map(|values| values[a].total_cmp(&values[b]))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        *self = self.take_rows(&order);
        Ok(())
    }

    /// Text cells of a column; non-text and null cells map to `None`.
    pub fn text_values(&self, column: &str) -> Vec<Option<&str>> {
        self.column(column)
            .map(|c| c.values.iter().map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Sorted, de-duplicated text values of a column.
    pub fn unique_text(&self, column: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .text_values(column)
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        values.sort();
        values.dedup();
        values
    }

    /// Write the table as CSV with a header row.
    pub fn to_csv_writer<W: Write>(&self, writer: W) -> TapResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.column_names())?;
        for row in self.rows() {
            csv.write_record(row.values().map(|v| v.to_string()))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the table to a CSV file, overwriting it.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> TapResult<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)?;
        self.to_csv_writer(file)?;
        tracing::info!("Table saved to {}", path.display());
        Ok(())
    }
}

impl Column {
    fn clone_metadata(&self) -> Column {
        Column {
            name: self.name.clone(),
            description: self.description.clone(),
            ucd: self.ucd.clone(),
            unit: self.unit.clone(),
            datatype: self.datatype.clone(),
            values: Vec::new(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows()
            .map(|row| row.values().map(|v| v.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(c.name.chars().count())
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c.name, w = *w))
            .collect();
        writeln!(f, "{}", header.join(" ").trim_end())?;

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write!(f, "{}", rule.join(" "))?;

        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<w$}", v, w = *w))
                .collect();
            write!(f, "\n{}", line.join(" ").trim_end())?;
        }
        Ok(())
    }
}
