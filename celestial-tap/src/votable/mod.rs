//! VOTable decoding.
//!
//! TAP services answer with VOTable XML documents. Only the first `TABLE` in
//! the document is decoded; its `FIELD`s become [`Column`]s carrying name,
//! UCD, unit, datatype and description. Three data serializations are
//! understood:
//!
//! | Serialization | Encoding |
//! |---------------|----------|
//! | `TABLEDATA` | `TR`/`TD` text cells |
//! | `BINARY` | base64 `STREAM`, big-endian values, variable arrays length-prefixed |
//! | `BINARY2` | as `BINARY`, each row led by a null-flag bitmask |
//!
//! An `INFO name="QUERY_STATUS" value="ERROR"` element turns into
//! [`TapError::Service`] carrying the service's message.
//!
//! [`uws`] parses job phases for the async endpoint.

mod binary;
pub mod uws;

use base64::Engine;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::FromStr;

use crate::error::{TapError, TapResult};
use crate::table::{Column, Table, Value};

const CONTEXT: &str = "VOTable";

/// VOTable primitive datatypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    Bit,
    UnsignedByte,
    Short,
    Int,
    Long,
    Char,
    UnicodeChar,
    Float,
    Double,
    FloatComplex,
    DoubleComplex,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Bit => "bit",
            DataType::UnsignedByte => "unsignedByte",
            DataType::Short => "short",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Char => "char",
            DataType::UnicodeChar => "unicodeChar",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::FloatComplex => "floatComplex",
            DataType::DoubleComplex => "doubleComplex",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, DataType::Char | DataType::UnicodeChar)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::UnsignedByte | DataType::Short | DataType::Int | DataType::Long
        )
    }
}

impl FromStr for DataType {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "boolean" => DataType::Boolean,
            "bit" => DataType::Bit,
            "unsignedByte" => DataType::UnsignedByte,
            "short" => DataType::Short,
            "int" => DataType::Int,
            "long" => DataType::Long,
            "char" => DataType::Char,
            "unicodeChar" => DataType::UnicodeChar,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "floatComplex" => DataType::FloatComplex,
            "doubleComplex" => DataType::DoubleComplex,
            other => {
                return Err(TapError::format(
                    CONTEXT,
                    format!("unknown FIELD datatype '{}'", other),
                ))
            }
        })
    }
}

/// The `arraysize` attribute, flattened to an element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySize {
    Scalar,
    /// Fixed number of elements (product of all dimensions).
    Fixed(usize),
    /// Last dimension is `*` or `n*`; element count is stored per value.
    Variable,
}

impl ArraySize {
    fn parse(attr: Option<&str>) -> TapResult<Self> {
        let Some(attr) = attr.map(str::trim).filter(|a| !a.is_empty()) else {
            return Ok(ArraySize::Scalar);
        };
        if attr.ends_with('*') {
            return Ok(ArraySize::Variable);
        }
        let mut total = 1usize;
        for dim in attr.split('x') {
            let n: usize = dim.trim().parse().map_err(|_| {
                TapError::format(CONTEXT, format!("invalid arraysize '{}'", attr))
            })?;
            total = total.saturating_mul(n);
        }
        Ok(ArraySize::Fixed(total))
    }

    /// Whether values of this size are decoded as arrays rather than scalars.
    pub fn is_array(&self) -> bool {
        match self {
            ArraySize::Scalar => false,
            ArraySize::Fixed(n) => *n != 1,
            ArraySize::Variable => true,
        }
    }
}

/// One `FIELD` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
    pub arraysize: ArraySize,
    pub ucd: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    /// Sentinel from `<VALUES null="..">`.
    pub null: Option<String>,
}

impl Field {
    fn from_element(element: &BytesStart<'_>) -> TapResult<Self> {
        let mut name = None;
        let mut id = None;
        let mut datatype = None;
        let mut arraysize = None;
        let mut ucd = None;
        let mut unit = None;

        for attr in element.attributes() {
            let attr = attr.map_err(|e| TapError::format(CONTEXT, e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| TapError::format(CONTEXT, e.to_string()))?
                .into_owned();
            match attr.key.local_name().as_ref() {
                b"name" => name = Some(value),
                b"ID" => id = Some(value),
                b"datatype" => datatype = Some(value),
                b"arraysize" => arraysize = Some(value),
                b"ucd" => ucd = Some(value),
                b"unit" => unit = Some(value),
                _ => {}
            }
        }

        let name = name
            .or(id)
            .ok_or_else(|| TapError::format(CONTEXT, "FIELD without name"))?;
        let datatype = datatype
            .ok_or_else(|| TapError::format(CONTEXT, format!("FIELD '{}' has no datatype", name)))?
            .parse()?;

        Ok(Self {
            name,
            datatype,
            arraysize: ArraySize::parse(arraysize.as_deref())?,
            ucd,
            unit,
            description: None,
            null: None,
        })
    }

    /// Decode one `TABLEDATA` cell.
    fn parse_text(&self, cell: Option<&str>) -> Value {
        let Some(raw) = cell else {
            return Value::Null;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.null.as_deref() == Some(trimmed) {
            return Value::Null;
        }
        if self.datatype.is_text() {
            return Value::Text(raw.to_string());
        }
        if self.arraysize.is_array() {
            return Value::Text(trimmed.to_string());
        }
        match self.datatype {
            DataType::Boolean => match trimmed {
                "T" | "t" | "true" | "TRUE" | "True" | "1" => Value::Bool(true),
                "F" | "f" | "false" | "FALSE" | "False" | "0" => Value::Bool(false),
                _ => Value::Null,
            },
            DataType::UnsignedByte | DataType::Short | DataType::Int | DataType::Long => {
                parse_integer(trimmed)
            }
            DataType::Float | DataType::Double => match trimmed.parse::<f64>() {
                Ok(x) if !x.is_nan() => Value::Float(x),
                _ => Value::Null,
            },
            _ => Value::Text(trimmed.to_string()),
        }
    }

    fn into_column(self, values: Vec<Value>) -> Column {
        Column {
            name: self.name,
            description: self.description,
            ucd: self.ucd,
            unit: self.unit,
            datatype: Some(self.datatype.as_str().to_string()),
            values,
        }
    }
}

fn parse_integer(s: &str) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Value::Int(i);
        }
    }
    tracing::debug!("Unparsable integer cell '{}' read as null", s);
    Value::Null
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Serialization {
    TableData,
    Binary,
    Binary2,
}

#[derive(Default)]
struct ParseState {
    fields: Vec<Field>,
    tables_seen: usize,
    in_table: bool,
    in_field: bool,
    in_description: bool,
    in_td: bool,
    in_stream: bool,
    in_status: bool,
    serialization: Option<Serialization>,
    td_text: String,
    row: Vec<Option<String>>,
    rows: Vec<Vec<Option<String>>>,
    stream: String,
    description: String,
    status: Option<String>,
    status_message: String,
}

impl ParseState {
    fn start(&mut self, element: &BytesStart<'_>, empty: bool) -> TapResult<()> {
        match element.local_name().as_ref() {
            b"TABLE" => {
                self.tables_seen += 1;
                self.in_table = self.tables_seen == 1 && !empty;
            }
            b"FIELD" if self.in_table => {
                self.fields.push(Field::from_element(element)?);
                self.in_field = !empty;
            }
            b"DESCRIPTION" if self.in_field => {
                self.in_description = !empty;
                self.description.clear();
            }
            b"VALUES" if self.in_field => {
                if let Some(null) = attribute(element, b"null")? {
                    if let Some(field) = self.fields.last_mut() {
                        field.null = Some(null);
                    }
                }
            }
            b"TABLEDATA" if self.in_table => self.serialization = Some(Serialization::TableData),
            b"BINARY" if self.in_table => self.serialization = Some(Serialization::Binary),
            b"BINARY2" if self.in_table => self.serialization = Some(Serialization::Binary2),
            b"STREAM" if self.in_table => {
                if attribute(element, b"href")?.is_some() {
                    return Err(TapError::format(CONTEXT, "remote STREAM href is not supported"));
                }
                if let Some(encoding) = attribute(element, b"encoding")? {
                    if encoding != "base64" {
                        return Err(TapError::format(
                            CONTEXT,
                            format!("unsupported STREAM encoding '{}'", encoding),
                        ));
                    }
                }
                self.in_stream = !empty;
            }
            b"TR" if self.in_table => self.row.clear(),
            b"TD" if self.in_table => {
                if empty {
                    self.row.push(None);
                } else {
                    self.in_td = true;
                    self.td_text.clear();
                }
            }
            b"INFO" => {
                if attribute(element, b"name")?.as_deref() == Some("QUERY_STATUS") {
                    self.status = attribute(element, b"value")?;
                    self.in_status = !empty;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"TABLE" => self.in_table = false,
            b"FIELD" => self.in_field = false,
            b"DESCRIPTION" if self.in_description => {
                self.in_description = false;
                let text = self.description.trim().to_string();
                if let Some(field) = self.fields.last_mut().filter(|_| !text.is_empty()) {
                    field.description = Some(text);
                }
            }
            b"TD" if self.in_td => {
                self.in_td = false;
                self.row.push(Some(std::mem::take(&mut self.td_text)));
            }
            b"TR" if self.in_table => self.rows.push(std::mem::take(&mut self.row)),
            b"STREAM" => self.in_stream = false,
            b"INFO" => self.in_status = false,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_td {
            self.td_text.push_str(text);
        } else if self.in_stream {
            self.stream.push_str(text);
        } else if self.in_description {
            self.description.push_str(text);
        } else if self.in_status {
            self.status_message.push_str(text);
        }
    }

    fn finish(self) -> TapResult<Table> {
        match self.status.as_deref() {
            Some("ERROR") => {
                let message = self.status_message.trim();
                return Err(TapError::service(if message.is_empty() {
                    "query failed without a message"
                } else {
                    message
                }));
            }
            Some("OVERFLOW") => {
                tracing::debug!("Result truncated by the service row limit (OVERFLOW)")
            }
            _ => {}
        }

        let rows: Vec<Vec<Value>> = match self.serialization {
            None | Some(Serialization::TableData) => self
                .rows
                .iter()
                .map(|row| {
                    self.fields
                        .iter()
                        .enumerate()
                        .map(|(i, field)| field.parse_text(row.get(i).and_then(|c| c.as_deref())))
                        .collect()
                })
                .collect(),
            Some(kind) => {
                let compact: String = self.stream.split_whitespace().collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| TapError::format(CONTEXT, format!("invalid base64 STREAM: {}", e)))?;
                binary::decode_rows(&self.fields, &bytes, kind == Serialization::Binary2)?
            }
        };

        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); self.fields.len()];
        for row in rows {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }

        Table::from_columns(
            self.fields
                .into_iter()
                .zip(columns)
                .map(|(field, values)| field.into_column(values))
                .collect(),
        )
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> TapResult<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| TapError::format(CONTEXT, e.to_string()))?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| TapError::format(CONTEXT, e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Decode the first table of a VOTable document.
///
/// # Errors
/// [`TapError::Service`] when the document reports `QUERY_STATUS=ERROR`,
/// [`TapError::Format`] for malformed XML, unknown datatypes, or a
/// truncated binary stream.
pub fn parse_votable(xml: &str) -> TapResult<Table> {
    let mut reader = Reader::from_str(xml);
    let mut state = ParseState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => state.start(e, false)?,
            Ok(Event::Empty(ref e)) => state.start(e, true)?,
            Ok(Event::End(ref e)) => state.end(e.local_name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| TapError::format(CONTEXT, e.to_string()))?;
                state.text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                state.text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TapError::format(
                    CONTEXT,
                    format!("XML error at byte {}: {}", reader.buffer_position(), e),
                ))
            }
            _ => {}
        }
    }

    state.finish()
}
