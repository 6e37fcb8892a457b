use bytemuck::{Pod, Zeroable};

use crate::{FieldDescriptor, FieldKind, GenobinError};

pub const MAGIC: u32 = 0x4E494247; // "GBIN"
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();
pub const FIELD_ENTRY_SIZE: usize = std::mem::size_of::<RawField>();
pub const REFERENCE_ENTRY_SIZE: usize = std::mem::size_of::<RawReference>();
pub const NODE_ENTRY_SIZE: usize = std::mem::size_of::<RawNode>();

/// Longest reference name that fits a reference table entry.
pub const MAX_REFERENCE_NAME: usize = 32;

const FLAG_INDEXED: u32 = 1;
const FLAG_POINT: u32 = 1 << 1;

/// 32-byte store header
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Header {
    pub magic: u32,           // "GBIN" - file type validation
    pub version: u32,         // Format version (1)
    pub flags: u32,           // bit 0: tree index present, bit 1: point layout
    pub field_count: u32,     // Number of field descriptors
    pub reference_count: u32, // Number of reference table entries
    pub record_width: u32,    // Bytes per record
    pub data_offset: u64,     // Byte offset of the payload area
}
impl Header {
    pub fn new(field_count: u32, reference_count: u32, record_width: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            field_count,
            reference_count,
            record_width,
            data_offset: 0,
        }
    }
    pub fn set_indexed(&mut self) {
        self.flags |= FLAG_INDEXED;
    }
    pub fn indexed(&self) -> bool {
        self.flags & FLAG_INDEXED != 0
    }
    pub fn set_point(&mut self) {
        self.flags |= FLAG_POINT;
    }
    pub fn point(&self) -> bool {
        self.flags & FLAG_POINT != 0
    }
    /// Byte offset of the first reference table entry.
    pub fn reference_table_offset(&self) -> u64 {
        (HEADER_SIZE + self.field_count as usize * FIELD_ENTRY_SIZE) as u64
    }
    /// Byte offset of the first index node entry.
    pub fn index_offset(&self) -> u64 {
        self.reference_table_offset() + (self.reference_count as usize * REFERENCE_ENTRY_SIZE) as u64
    }
    pub fn validate(&self) -> crate::Result<()> {
        if self.magic != MAGIC {
            return Err(GenobinError::InvalidMagicNumber {
                expected: MAGIC,
                actual: self.magic,
            });
        }
        if self.version != VERSION {
            return Err(GenobinError::InvalidVersion {
                expected: VERSION,
                actual: self.version,
            });
        }
        if self.field_count == 0 || self.record_width == 0 {
            return Err(GenobinError::InvalidField {
                name: String::new(),
                reason: "header declares an empty record layout".to_string(),
            });
        }
        if self.data_offset < self.index_offset() {
            return Err(GenobinError::InvalidMapSize);
        }
        Ok(())
    }
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE])
    }
}

/// Persisted field descriptor (32 bytes).
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct RawField {
    pub name: [u8; 24],
    pub kind: u32,
    pub width: u32,
}
impl RawField {
    pub fn from_descriptor(field: &FieldDescriptor) -> crate::Result<Self> {
        field.validate()?;
        Ok(Self {
            name: pack_name(&field.name)?,
            kind: field.kind.tag(),
            width: field.width,
        })
    }
    pub fn to_descriptor(&self) -> crate::Result<FieldDescriptor> {
        let name = unpack_name(&self.name)?;
        let kind = FieldKind::from_tag(self.kind).ok_or_else(|| GenobinError::InvalidField {
            name: name.clone(),
            reason: format!("unknown kind tag {}", self.kind),
        })?;
        let field = FieldDescriptor::new(name, kind, self.width);
        field.validate()?;
        Ok(field)
    }
}

/// Persisted reference table entry (64 bytes).
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct RawReference {
    pub name: [u8; 32],
    pub length: i64,
    pub data_start: u64,
    pub record_count: u64,
    pub node_count: u32,
    pub reserved: u32,
}

/// Persisted bin node (40 bytes), stored in pre-order per reference.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct RawNode {
    pub start: i64,
    pub end: i64,
    pub start_byte: i64, // -1: no records assigned
    pub index: i32,
    pub parent: i32, // -1: root
    pub direct_count: i32,
    pub subtree_size: i32,
}

/// Decoded reference table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceEntry {
    pub name: String,
    pub length: i64,
    /// Byte offset of the reference's first record.
    pub data_start: u64,
    pub record_count: u64,
    pub node_count: u32,
}
impl ReferenceEntry {
    pub fn to_raw(&self) -> crate::Result<RawReference> {
        Ok(RawReference {
            name: pack_name(&self.name)?,
            length: self.length,
            data_start: self.data_start,
            record_count: self.record_count,
            node_count: self.node_count,
            reserved: 0,
        })
    }
    pub fn from_raw(raw: &RawReference) -> crate::Result<Self> {
        Ok(Self {
            name: unpack_name(&raw.name)?,
            length: raw.length,
            data_start: raw.data_start,
            record_count: raw.record_count,
            node_count: raw.node_count,
        })
    }
}

/// NUL-pads `name` into a fixed array.
pub(crate) fn pack_name<const N: usize>(name: &str) -> crate::Result<[u8; N]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > N || bytes.contains(&0) {
        return Err(GenobinError::InvalidField {
            name: name.to_string(),
            reason: format!("names must be 1-{N} bytes without NUL"),
        });
    }
    let mut packed = [0u8; N];
    packed[..bytes.len()].copy_from_slice(bytes);
    Ok(packed)
}

pub(crate) fn unpack_name(bytes: &[u8]) -> crate::Result<String> {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..len].to_vec()).map_err(|_| GenobinError::InvalidUtf8 {
        field: String::from_utf8_lossy(&bytes[..len]).into_owned(),
    })
}
