//! Fixed-width record codec.
//!
//! A [`Layout`] is an ordered list of [`FieldDescriptor`]s plus the record
//! shape. Numeric fields are little-endian; string fields are fixed-width,
//! NUL padded on encode and trimmed of trailing NUL/space bytes on decode.
//! Decoding is a pure function of the byte buffer and the layout.

use std::collections::HashSet;

use crate::{FieldDescriptor, FieldKind, GenobinError, Interval, Record, Result, Value};

/// How the leading fields of a record map to its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    /// Fields 0 and 1 are the integer `start` and `end`.
    Interval,
    /// Field 0 is the integer position; the interval is `[pos, pos + 1)`.
    Point,
}
impl Shape {
    fn coordinate_fields(self) -> usize {
        match self {
            Shape::Interval => 2,
            Shape::Point => 1,
        }
    }
}

/// Sum of the byte widths of `fields`.
pub fn record_byte_width(fields: &[FieldDescriptor]) -> usize {
    fields.iter().map(FieldDescriptor::byte_width).sum()
}

/// Binary layout of one fixed-size record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    fields: Vec<FieldDescriptor>,
    offsets: Vec<usize>,
    width: usize,
    shape: Shape,
}
impl Layout {
    pub fn new(fields: Vec<FieldDescriptor>, shape: Shape) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                return Err(GenobinError::InvalidField {
                    name: field.name.clone(),
                    reason: "duplicate field name".to_string(),
                });
            }
        }
        let needed = shape.coordinate_fields();
        if fields.len() < needed {
            return Err(GenobinError::FieldCountMismatch {
                expected: needed,
                actual: fields.len(),
            });
        }
        if let Some(field) = fields[..needed].iter().find(|f| !f.kind.is_integer()) {
            return Err(GenobinError::InvalidField {
                name: field.name.clone(),
                reason: "coordinate fields must be Int32 or Int64".to_string(),
            });
        }

        let mut offsets = Vec::with_capacity(fields.len());
        let mut width = 0;
        for field in &fields {
            offsets.push(width);
            width += field.byte_width();
        }
        Ok(Self {
            fields,
            offsets,
            width,
            shape,
        })
    }

    /// Interval layout with Int64 `start`/`end` followed by `payload` fields.
    pub fn interval(payload: Vec<FieldDescriptor>) -> Result<Self> {
        let mut fields = vec![
            FieldDescriptor::int64("start"),
            FieldDescriptor::int64("end"),
        ];
        fields.extend(payload);
        Self::new(fields, Shape::Interval)
    }

    /// Point layout with an Int64 `position` followed by `payload` fields.
    pub fn point(payload: Vec<FieldDescriptor>) -> Result<Self> {
        let mut fields = vec![FieldDescriptor::int64("position")];
        fields.extend(payload);
        Self::new(fields, Shape::Point)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn record_byte_width(&self) -> usize {
        self.width
    }

    /// Fields that make up a record's payload (after the coordinates).
    pub fn payload_fields(&self) -> &[FieldDescriptor] {
        &self.fields[self.shape.coordinate_fields()..]
    }

    fn check_len(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < self.width {
            return Err(GenobinError::TruncatedRecord {
                pos: 0,
                needed: self.width,
                found: bytes.len(),
            });
        }
        Ok(())
    }

    /// Decodes every field of the record at the start of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>> {
        self.check_len(bytes)?;
        self.fields
            .iter()
            .zip(&self.offsets)
            .map(|(field, &offset)| decode_field(field, &bytes[offset..offset + field.byte_width()]))
            .collect()
    }

    /// Decodes only the leading position (or start) field.
    pub fn decode_position(&self, bytes: &[u8]) -> Result<i64> {
        let field = &self.fields[0];
        if bytes.len() < field.byte_width() {
            return Err(GenobinError::TruncatedRecord {
                pos: 0,
                needed: field.byte_width(),
                found: bytes.len(),
            });
        }
        decode_integer(field, bytes)
    }

    /// Decodes only the coordinate fields.
    pub fn decode_interval(&self, bytes: &[u8]) -> Result<Interval> {
        self.check_len(bytes)?;
        let start = decode_integer(&self.fields[0], bytes)?;
        match self.shape {
            Shape::Point => Ok(Interval::point(start)),
            Shape::Interval => {
                let end = decode_integer(&self.fields[1], &bytes[self.offsets[1]..])?;
                Interval::new(start, end)
            }
        }
    }

    pub fn decode_record(&self, reference: &str, bytes: &[u8]) -> Result<Record> {
        let mut values = self.decode(bytes)?;
        let coords = self.shape.coordinate_fields();
        let payload = values.split_off(coords);
        let start = values[0].as_i64().unwrap_or_default();
        let interval = match self.shape {
            Shape::Point => Interval::point(start),
            Shape::Interval => Interval::new(start, values[1].as_i64().unwrap_or_default())?,
        };
        Ok(Record::new(reference, interval, payload))
    }

    /// Appends the encoding of `values` to `out`.
    pub fn encode(&self, values: &[Value], out: &mut Vec<u8>) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(GenobinError::FieldCountMismatch {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }
        let base = out.len();
        out.resize(base + self.width, 0);
        for ((field, &offset), value) in self.fields.iter().zip(&self.offsets).zip(values) {
            let slot = &mut out[base + offset..base + offset + field.byte_width()];
            if let Err(e) = encode_field(field, value, slot) {
                out.truncate(base);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn encode_record(&self, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        let mut values = Vec::with_capacity(self.fields.len());
        let coords = [record.start(), record.end()];
        let coords = &coords[..self.shape.coordinate_fields()];
        for (field, &coord) in self.fields.iter().zip(coords) {
            values.push(match field.kind {
                FieldKind::Int32 => Value::Int32(i32::try_from(coord).map_err(|_| {
                    GenobinError::FieldTypeMismatch {
                        field: field.name.clone(),
                        expected: "Int32",
                    }
                })?),
                _ => Value::Int64(coord),
            });
        }
        values.extend(record.payload.iter().cloned());
        self.encode(&values, out)
    }
}

fn decode_integer(field: &FieldDescriptor, bytes: &[u8]) -> Result<i64> {
    match decode_field(field, &bytes[..field.byte_width()])? {
        Value::Int32(v) => Ok(i64::from(v)),
        Value::Int64(v) => Ok(v),
        _ => Err(GenobinError::FieldTypeMismatch {
            field: field.name.clone(),
            expected: "integer",
        }),
    }
}

fn decode_field(field: &FieldDescriptor, bytes: &[u8]) -> Result<Value> {
    let value = match field.kind {
        FieldKind::Int32 => Value::Int32(i32::from_le_bytes(fixed(bytes))),
        FieldKind::Int64 => Value::Int64(i64::from_le_bytes(fixed(bytes))),
        FieldKind::Float64 => Value::Float64(f64::from_le_bytes(fixed(bytes))),
        FieldKind::FixedString => {
            let len = bytes
                .iter()
                .rposition(|&b| b != 0 && b != b' ')
                .map_or(0, |i| i + 1);
            let text = std::str::from_utf8(&bytes[..len]).map_err(|_| GenobinError::InvalidUtf8 {
                field: field.name.clone(),
            })?;
            Value::Text(text.to_string())
        }
    };
    Ok(value)
}

fn encode_field(field: &FieldDescriptor, value: &Value, slot: &mut [u8]) -> Result<()> {
    let mismatch = || GenobinError::FieldTypeMismatch {
        field: field.name.clone(),
        expected: field.kind.name(),
    };
    match (field.kind, value) {
        (FieldKind::Int32, Value::Int32(v)) => slot.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::Int64, Value::Int64(v)) => slot.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::Int64, Value::Int32(v)) => slot.copy_from_slice(&i64::from(*v).to_le_bytes()),
        (FieldKind::Float64, Value::Float64(v)) => slot.copy_from_slice(&v.to_le_bytes()),
        (FieldKind::FixedString, Value::Text(s)) => {
            if s.len() > slot.len() {
                return Err(GenobinError::StringTooLong {
                    field: field.name.clone(),
                    len: s.len(),
                    width: slot.len(),
                });
            }
            slot[..s.len()].copy_from_slice(s.as_bytes());
            slot[s.len()..].fill(0);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
