//! `BINARY` / `BINARY2` stream decoding.
//!
//! Values are big-endian. Variable-size arrays carry a 4-byte element count.
//! `BINARY2` rows start with one null bit per field, most significant bit
//! first.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::{ArraySize, DataType, Field};
use crate::error::{TapError, TapResult};
use crate::table::Value;

const CONTEXT: &str = "VOTable BINARY stream";

pub(super) fn decode_rows(fields: &[Field], bytes: &[u8], binary2: bool) -> TapResult<Vec<Vec<Value>>> {
    let mut cursor = Cursor::new(bytes);
    let mut rows = Vec::new();
    let flag_bytes = (fields.len() + 7) / 8;

    while (cursor.position() as usize) < bytes.len() {
        let start = cursor.position();
        let mut nulls = vec![0u8; if binary2 { flag_bytes } else { 0 }];
        cursor.read_exact(&mut nulls).map_err(|_| truncated(rows.len()))?;

        let mut row = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let value = decode_value(&mut cursor, field).map_err(|_| truncated(rows.len()))?;
            let flagged = binary2 && nulls[i / 8] & (0x80 >> (i % 8)) != 0;
            row.push(if flagged { Value::Null } else { value });
        }
        if cursor.position() == start {
            return Err(TapError::format(
                CONTEXT,
                format!("row {} consumes no bytes", rows.len()),
            ));
        }
        rows.push(row);
    }

    Ok(rows)
}

fn truncated(row: usize) -> TapError {
    TapError::format(CONTEXT, format!("truncated in row {}", row))
}

fn decode_value(cursor: &mut Cursor<&[u8]>, field: &Field) -> std::io::Result<Value> {
    let count = match field.arraysize {
        ArraySize::Scalar => 1,
        ArraySize::Fixed(n) => n,
        ArraySize::Variable => cursor.read_u32::<BigEndian>()? as usize,
    };

    match field.datatype {
        DataType::Char => {
            let mut buf = vec![0u8; count];
            cursor.read_exact(&mut buf)?;
            Ok(text_value(String::from_utf8_lossy(&buf).into_owned()))
        }
        DataType::UnicodeChar => {
            let mut units = Vec::with_capacity(count);
            for _ in 0..count {
                units.push(cursor.read_u16::<BigEndian>()?);
            }
            Ok(text_value(String::from_utf16_lossy(&units)))
        }
        DataType::Bit => {
            let mut buf = vec![0u8; (count + 7) / 8];
            cursor.read_exact(&mut buf)?;
            let bits: String = (0..count)
                .map(|i| if buf[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
                .collect();
            Ok(Value::Text(bits))
        }
        _ => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_scalar(cursor, field)?);
            }
            if field.arraysize.is_array() {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                Ok(text_value(joined.join(" ")))
            } else {
                Ok(items.pop().unwrap_or(Value::Null))
            }
        }
    }
}

fn read_scalar(cursor: &mut Cursor<&[u8]>, field: &Field) -> std::io::Result<Value> {
    let value = match field.datatype {
        DataType::Boolean => match cursor.read_u8()? {
            b'T' | b't' | b'1' => Value::Bool(true),
            b'F' | b'f' | b'0' => Value::Bool(false),
            _ => Value::Null,
        },
        DataType::UnsignedByte => Value::Int(cursor.read_u8()? as i64),
        DataType::Short => Value::Int(cursor.read_i16::<BigEndian>()? as i64),
        DataType::Int => Value::Int(cursor.read_i32::<BigEndian>()? as i64),
        DataType::Long => Value::Int(cursor.read_i64::<BigEndian>()?),
        DataType::Float => float_value(cursor.read_f32::<BigEndian>()? as f64),
        DataType::Double => float_value(cursor.read_f64::<BigEndian>()?),
        DataType::FloatComplex => {
            let re = cursor.read_f32::<BigEndian>()?;
            let im = cursor.read_f32::<BigEndian>()?;
            Value::Text(format!("{} {}", re, im))
        }
        DataType::DoubleComplex => {
            let re = cursor.read_f64::<BigEndian>()?;
            let im = cursor.read_f64::<BigEndian>()?;
            Value::Text(format!("{} {}", re, im))
        }
        DataType::Char | DataType::UnicodeChar | DataType::Bit => Value::Null,
    };

    if field.datatype.is_integer() {
        if let (Value::Int(i), Some(null)) = (&value, field.null.as_deref()) {
            if null.trim().parse::<i64>().ok() == Some(*i) {
                return Ok(Value::Null);
            }
        }
    }
    Ok(value)
}

fn float_value(x: f64) -> Value {
    if x.is_nan() {
        Value::Null
    } else {
        Value::Float(x)
    }
}

fn text_value(s: String) -> Value {
    let s = s.trim_end_matches('\0');
    if s.is_empty() {
        Value::Null
    } else {
        Value::Text(s.to_string())
    }
}
