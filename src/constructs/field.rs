use crate::{GenobinError, Result};

/// Longest field name that fits a persisted descriptor.
pub const MAX_FIELD_NAME: usize = 24;

/// Primitive kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum FieldKind {
    Int32 = 1,
    Int64 = 2,
    Float64 = 3,
    FixedString = 4,
}
impl FieldKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::Float64),
            4 => Some(Self::FixedString),
            _ => None,
        }
    }

    /// Natural width for numeric kinds, `None` for strings.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Int32 => Some(4),
            Self::Int64 | Self::Float64 => Some(8),
            Self::FixedString => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float64 => "Float64",
            Self::FixedString => "FixedString",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }
}

/// Name, kind and byte width of one field of a fixed-size record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub width: u32,
}
impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, width: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            width,
        }
    }
    pub fn int32(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int32, 4)
    }
    pub fn int64(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int64, 8)
    }
    pub fn float64(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float64, 8)
    }
    pub fn fixed_string(name: impl Into<String>, width: u32) -> Self {
        Self::new(name, FieldKind::FixedString, width)
    }

    pub fn byte_width(&self) -> usize {
        self.width as usize
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| GenobinError::InvalidField {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("empty name".to_string()));
        }
        if self.name.len() > MAX_FIELD_NAME {
            return Err(invalid(format!("name longer than {MAX_FIELD_NAME} bytes")));
        }
        if self.name.as_bytes().contains(&0) {
            return Err(invalid("name contains a NUL byte".to_string()));
        }
        match self.kind.fixed_width() {
            Some(width) if width != self.byte_width() => Err(invalid(format!(
                "{} fields are {} bytes wide, found {}",
                self.kind.name(),
                width,
                self.width
            ))),
            None if self.width == 0 => Err(invalid("zero-width string".to_string())),
            _ => Ok(()),
        }
    }
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
}
impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Int32(_) => FieldKind::Int32,
            Self::Int64(_) => FieldKind::Int64,
            Self::Float64(_) => FieldKind::Float64,
            Self::Text(_) => FieldKind::FixedString,
        }
    }

    /// Integer view of numeric integer values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in [
            FieldKind::Int32,
            FieldKind::Int64,
            FieldKind::Float64,
            FieldKind::FixedString,
        ] {
            assert_eq!(FieldKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(FieldKind::from_tag(0), None);
        assert_eq!(FieldKind::from_tag(5), None);
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(FieldDescriptor::int32("score").validate().is_ok());
        assert!(FieldDescriptor::fixed_string("name", 16).validate().is_ok());

        let wrong_width = FieldDescriptor::new("start", FieldKind::Int64, 4);
        assert!(matches!(
            wrong_width.validate(),
            Err(GenobinError::InvalidField { .. })
        ));
        assert!(FieldDescriptor::fixed_string("name", 0).validate().is_err());
        assert!(FieldDescriptor::int32("").validate().is_err());
        assert!(FieldDescriptor::int32("x".repeat(25)).validate().is_err());
    }

    #[test]
    fn test_value_views() {
        assert_eq!(Value::Int32(-4).as_i64(), Some(-4));
        assert_eq!(Value::Int64(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(Value::Float64(1.5).as_i64(), None);
        assert_eq!(Value::Int32(3).as_f64(), Some(3.0));
        assert_eq!(Value::Text("gene".into()).as_str(), Some("gene"));
        assert_eq!(Value::Text("gene".into()).kind(), FieldKind::FixedString);
    }
}
