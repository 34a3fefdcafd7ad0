//! Registry Value Types
//!
//! Registry values store data associated with registry keys.
//! Each value has a name, kind, and data.
//!
//! # Value Kinds
//! - REG_NONE: Untyped bytes
//! - REG_SZ: String
//! - REG_EXPAND_SZ: String with %VARIABLE% references
//! - REG_BINARY: Binary data
//! - REG_DWORD: 32-bit integer
//! - REG_MULTI_SZ: Sequence of strings
//! - REG_QWORD: 64-bit integer
//!
//! [`ValueKind::Unknown`] is not stored anywhere: it asks the store call to
//! infer the kind from the shape of the data being written.

use core::fmt;

use serde::Serialize;

/// Registry value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(i32)]
pub enum ValueKind {
    /// Infer from the data
    #[default]
    Unknown = -1,
    /// No type
    None = 0,
    /// String
    String = 1,
    /// Expandable string (with %VARIABLE% references)
    ExpandString = 2,
    /// Binary data
    Binary = 3,
    /// 32-bit little-endian integer
    DWord = 4,
    /// Array of strings
    MultiString = 7,
    /// 64-bit little-endian integer
    QWord = 11,
}

impl ValueKind {
    /// Create from raw value
    pub const fn from_raw(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::Unknown),
            0 => Some(Self::None),
            1 => Some(Self::String),
            2 => Some(Self::ExpandString),
            3 => Some(Self::Binary),
            4 => Some(Self::DWord),
            7 => Some(Self::MultiString),
            11 => Some(Self::QWord),
            _ => None,
        }
    }

    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Check if kind is a string kind
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String | Self::ExpandString)
    }

    /// Check if kind is an integer kind
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::DWord | Self::QWord)
    }

    /// Check if kind holds raw bytes
    pub const fn is_binary(self) -> bool {
        matches!(self, Self::Binary | Self::None)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::None => "None",
            Self::String => "String",
            Self::ExpandString => "ExpandString",
            Self::Binary => "Binary",
            Self::DWord => "DWord",
            Self::MultiString => "MultiString",
            Self::QWord => "QWord",
        };
        f.write_str(name)
    }
}

/// Data of a stored registry value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum PropertyValue {
    String(String),
    ExpandString(String),
    Bytes(Vec<u8>),
    Int32(i32),
    Int64(i64),
    StringList(Vec<String>),
    /// REG_NONE payload
    None(Vec<u8>),
}

impl PropertyValue {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::ExpandString(_) => ValueKind::ExpandString,
            Self::Bytes(_) => ValueKind::Binary,
            Self::Int32(_) => ValueKind::DWord,
            Self::Int64(_) => ValueKind::QWord,
            Self::StringList(_) => ValueKind::MultiString,
            Self::None(_) => ValueKind::None,
        }
    }

    /// Get string data (for REG_SZ / REG_EXPAND_SZ)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    /// Get as u32 (for REG_DWORD)
    pub const fn as_dword(&self) -> Option<u32> {
        match self {
            Self::Int32(v) => Some(*v as u32),
            _ => None,
        }
    }

    /// Get as u64 (for REG_QWORD)
    pub const fn as_qword(&self) -> Option<u64> {
        match self {
            Self::Int64(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) | Self::None(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::StringList(list) => Some(list),
            _ => None,
        }
    }

    /// Size of the value as the store would persist it
    pub fn data_size(&self) -> usize {
        match self {
            // UTF-16 code units plus terminator
            Self::String(s) | Self::ExpandString(s) => (s.encode_utf16().count() + 1) * 2,
            Self::Bytes(b) | Self::None(b) => b.len(),
            Self::Int32(_) => 4,
            Self::Int64(_) => 8,
            Self::StringList(list) => {
                let chars: usize = list.iter().map(|s| s.encode_utf16().count() + 1).sum();
                (chars + 1) * 2
            }
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::ExpandString(s) => f.write_str(s),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Bytes(bytes) | Self::None(bytes) => {
                let parts: Vec<String> = bytes.iter().map(u8::to_string).collect();
                f.write_str(&parts.join(" "))
            }
            Self::StringList(list) => f.write_str(&list.join(" ")),
        }
    }
}

/// A named value read from (or written to) a key
///
/// An empty name denotes the key's default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
    /// Kind as reported by the store; only populated when requested
    pub kind: Option<ValueKind>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }
}
