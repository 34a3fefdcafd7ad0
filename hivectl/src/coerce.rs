//! Value Coercion
//!
//! Callers hand in loosely typed data ([`InputValue`]): whatever a script
//! or command binding produced, possibly still wrapped in a scripting
//! object. Before anything is written, [`coerce`] normalizes that data into
//! the representation the store's set-value call expects for the requested
//! [`ValueKind`]:
//!
//! | Kind                  | Absent        | Conversion                                   |
//! |-----------------------|---------------|----------------------------------------------|
//! | String, ExpandString  | `""`          | display string                               |
//! | Binary, None          | `[]`          | UTF-16LE text, low byte of an integer, or one byte per element |
//! | DWord, QWord          | `0`           | passed through (narrowed by the store call)  |
//! | MultiString           | `[]`          | one string per element                       |
//! | Unknown               | `""`          | sequences led by an integer become bytes, others strings |
//!
//! Coercion is total and deterministic: it returns a value or a
//! [`CoercionError`], and coercing an already coerced value changes
//! nothing.
//!
//! [`to_property_value`] is the store-call step that follows: it narrows
//! the coerced data into a typed [`PropertyValue`].

use core::fmt;

use thiserror::Error;

use crate::status::{error_ids, ErrorRecord, RegError};
use crate::value::{PropertyValue, ValueKind};

/// Loosely typed caller data
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Bool(bool),
    Byte(u8),
    Int(i32),
    Long(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Strings(Vec<String>),
    List(Vec<InputValue>),
    /// Scripting-object wrapper around a base value
    Wrapped(Box<InputValue>),
}

/// Shape of an input after unwrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Absent,
    Flag,
    Integer,
    Real,
    Text,
    Bytes,
    Strings,
    Sequence,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "null",
            Self::Flag => "boolean",
            Self::Integer => "integer",
            Self::Real => "floating-point number",
            Self::Text => "string",
            Self::Bytes => "byte sequence",
            Self::Strings => "string sequence",
            Self::Sequence => "sequence",
        };
        f.write_str(name)
    }
}

impl InputValue {
    /// Wrap a value the way a scripting host does
    pub fn wrap(value: InputValue) -> Self {
        match value {
            wrapped @ Self::Wrapped(_) => wrapped,
            other => Self::Wrapped(Box::new(other)),
        }
    }

    /// Strip scripting-object wrapping
    ///
    /// Nested wrappers collapse to their innermost value.
    pub fn unwrap_base(self) -> Self {
        let mut value = self;
        while let Self::Wrapped(inner) = value {
            value = *inner;
        }
        value
    }

    fn base(&self) -> &Self {
        let mut value = self;
        while let Self::Wrapped(inner) = value {
            value = inner;
        }
        value
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::Null => Shape::Absent,
            Self::Bool(_) => Shape::Flag,
            Self::Byte(_) | Self::Int(_) | Self::Long(_) => Shape::Integer,
            Self::Float(_) => Shape::Real,
            Self::Str(_) => Shape::Text,
            Self::Bytes(_) => Shape::Bytes,
            Self::Strings(_) => Shape::Strings,
            Self::List(_) => Shape::Sequence,
            Self::Wrapped(inner) => inner.shape(),
        }
    }

    /// Canonical display-string form
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(bytes) => write_joined(f, bytes.iter()),
            Self::Strings(list) => write_joined(f, list.iter()),
            Self::List(items) => write_joined(f, items.iter()),
            Self::Wrapped(inner) => inner.fmt(f),
        }
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for InputValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i32> for InputValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<Vec<u8>> for InputValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<String>> for InputValue {
    fn from(list: Vec<String>) -> Self {
        Self::Strings(list)
    }
}

/// Data that cannot take the requested kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{shape} cannot be stored as {kind}: {reason}")]
pub struct CoercionError {
    pub shape: Shape,
    pub kind: ValueKind,
    pub reason: String,
}

impl CoercionError {
    fn new(shape: Shape, kind: ValueKind, reason: impl Into<String>) -> Self {
        Self {
            shape,
            kind,
            reason: reason.into(),
        }
    }

    /// Attach the property name
    pub fn for_property(self, name: &str) -> RegError {
        RegError::Coercion {
            name: name.to_string(),
            kind: self.kind,
            reason: self.to_string(),
        }
    }
}

// ============================================================================
// Coercion
// ============================================================================

/// Normalize `value` into the representation required by `kind`
pub fn coerce(value: InputValue, kind: ValueKind) -> Result<InputValue, CoercionError> {
    let value = value.unwrap_base();

    match kind {
        ValueKind::String | ValueKind::ExpandString => Ok(coerce_string(value)),
        ValueKind::Binary | ValueKind::None => coerce_binary(value, kind),
        ValueKind::DWord | ValueKind::QWord => Ok(match value {
            InputValue::Null => InputValue::Int(0),
            other => other,
        }),
        ValueKind::MultiString => Ok(coerce_multi_string(value)),
        ValueKind::Unknown => coerce_untyped(value),
    }
}

fn coerce_string(value: InputValue) -> InputValue {
    match value {
        InputValue::Null => InputValue::Str(String::new()),
        s @ InputValue::Str(_) => s,
        other => InputValue::Str(other.to_display_string()),
    }
}

fn coerce_binary(value: InputValue, kind: ValueKind) -> Result<InputValue, CoercionError> {
    let shape = value.shape();
    match value {
        bytes @ InputValue::Bytes(_) => Ok(bytes),
        InputValue::Null => Ok(InputValue::Bytes(Vec::new())),
        InputValue::Str(s) => Ok(InputValue::Bytes(utf16le_bytes(&s))),
        // Low byte only
        InputValue::Byte(b) => Ok(InputValue::Bytes(vec![b])),
        InputValue::Int(v) => Ok(InputValue::Bytes(vec![v as u8])),
        InputValue::Long(v) => Ok(InputValue::Bytes(vec![v as u8])),
        InputValue::List(items) => bytes_from_items(items, kind),
        InputValue::Strings(list) => {
            bytes_from_items(list.into_iter().map(InputValue::Str).collect(), kind)
        }
        InputValue::Bool(_) | InputValue::Float(_) => Err(CoercionError::new(
            shape,
            kind,
            "only strings, integers and sequences convert to binary data",
        )),
        InputValue::Wrapped(inner) => coerce_binary(inner.unwrap_base(), kind),
    }
}

fn coerce_multi_string(value: InputValue) -> InputValue {
    match value {
        list @ InputValue::Strings(_) => list,
        InputValue::Null => InputValue::Strings(Vec::new()),
        InputValue::Str(s) => InputValue::Strings(vec![s]),
        InputValue::List(items) => strings_from_items(items),
        InputValue::Bytes(bytes) => {
            InputValue::Strings(bytes.iter().map(u8::to_string).collect())
        }
        other => InputValue::Strings(vec![other.to_display_string()]),
    }
}

/// Untyped data keeps its shape, except sequences
///
/// A sequence led by any integer (byte, 32-bit or 64-bit) becomes binary
/// data, so every element must then fit in a byte. Any other sequence
/// becomes a string list.
fn coerce_untyped(value: InputValue) -> Result<InputValue, CoercionError> {
    match value {
        InputValue::Null => Ok(InputValue::Str(String::new())),
        InputValue::List(items) => {
            let binary = items
                .first()
                .is_some_and(|first| first.shape() == Shape::Integer);
            if binary {
                bytes_from_items(items, ValueKind::Unknown)
            } else {
                Ok(strings_from_items(items))
            }
        }
        other => Ok(other),
    }
}

fn bytes_from_items(
    items: Vec<InputValue>,
    kind: ValueKind,
) -> Result<InputValue, CoercionError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| to_byte(item.unwrap_base(), index, kind))
        .collect::<Result<Vec<u8>, _>>()
        .map(InputValue::Bytes)
}

fn strings_from_items(items: Vec<InputValue>) -> InputValue {
    InputValue::Strings(items.iter().map(InputValue::to_display_string).collect())
}

/// Numeric conversion of one sequence element
fn to_byte(item: InputValue, index: usize, kind: ValueKind) -> Result<u8, CoercionError> {
    let shape = item.shape();
    let out_of_range =
        |shown: String| CoercionError::new(shape, kind, format!("element {index} ({shown}) is outside 0..=255"));

    match item {
        InputValue::Null => Ok(0),
        InputValue::Bool(flag) => Ok(u8::from(flag)),
        InputValue::Byte(b) => Ok(b),
        InputValue::Int(v) => u8::try_from(v).map_err(|_| out_of_range(v.to_string())),
        InputValue::Long(v) => u8::try_from(v).map_err(|_| out_of_range(v.to_string())),
        InputValue::Float(v) => {
            let rounded = v.round();
            if (0.0..=255.0).contains(&rounded) {
                Ok(rounded as u8)
            } else {
                Err(out_of_range(v.to_string()))
            }
        }
        InputValue::Str(s) => s.trim().parse::<u8>().map_err(|_| {
            CoercionError::new(shape, kind, format!("element {index} (\"{s}\") is not a byte"))
        }),
        InputValue::Bytes(_) | InputValue::Strings(_) | InputValue::List(_) => Err(
            CoercionError::new(shape, kind, format!("element {index} is itself a sequence")),
        ),
        InputValue::Wrapped(inner) => to_byte(inner.unwrap_base(), index, kind),
    }
}

/// UTF-16LE encoding of a string
pub fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

// ============================================================================
// Store-call narrowing
// ============================================================================

/// Narrow coerced data into a typed value for the set-value call
///
/// `Unknown` infers the kind from the data's shape.
pub fn to_property_value(value: &InputValue, kind: ValueKind) -> Result<PropertyValue, CoercionError> {
    let value = value.base();
    let shape = value.shape();

    match kind {
        ValueKind::String => Ok(PropertyValue::String(value.to_display_string())),
        ValueKind::ExpandString => Ok(PropertyValue::ExpandString(value.to_display_string())),
        ValueKind::Binary | ValueKind::None => match value {
            InputValue::Bytes(bytes) if kind == ValueKind::Binary => {
                Ok(PropertyValue::Bytes(bytes.clone()))
            }
            InputValue::Bytes(bytes) => Ok(PropertyValue::None(bytes.clone())),
            _ => Err(CoercionError::new(shape, kind, "expected a byte sequence")),
        },
        ValueKind::DWord => to_i32(value).map(PropertyValue::Int32),
        ValueKind::QWord => to_i64(value, kind).map(PropertyValue::Int64),
        ValueKind::MultiString => match value {
            InputValue::Strings(list) => Ok(PropertyValue::StringList(list.clone())),
            _ => Err(CoercionError::new(shape, kind, "expected a string sequence")),
        },
        ValueKind::Unknown => Ok(match value {
            InputValue::Strings(list) => PropertyValue::StringList(list.clone()),
            InputValue::Bytes(bytes) => PropertyValue::Bytes(bytes.clone()),
            InputValue::Byte(b) => PropertyValue::Int32(i32::from(*b)),
            InputValue::Int(v) => PropertyValue::Int32(*v),
            InputValue::Long(v) => PropertyValue::Int64(*v),
            InputValue::List(items) => {
                PropertyValue::StringList(items.iter().map(InputValue::to_display_string).collect())
            }
            other => PropertyValue::String(other.to_display_string()),
        }),
    }
}

/// DWORDs accept the full unsigned range and store its bit pattern
fn to_i32(value: &InputValue) -> Result<i32, CoercionError> {
    let wide = to_i64(value, ValueKind::DWord)?;
    if let Ok(v) = i32::try_from(wide) {
        Ok(v)
    } else if let Ok(v) = u32::try_from(wide) {
        Ok(v as i32)
    } else {
        Err(CoercionError::new(
            value.shape(),
            ValueKind::DWord,
            format!("{wide} does not fit in 32 bits"),
        ))
    }
}

fn to_i64(value: &InputValue, kind: ValueKind) -> Result<i64, CoercionError> {
    let shape = value.shape();
    match value {
        InputValue::Null => Ok(0),
        InputValue::Bool(flag) => Ok(i64::from(*flag)),
        InputValue::Byte(b) => Ok(i64::from(*b)),
        InputValue::Int(v) => Ok(i64::from(*v)),
        InputValue::Long(v) => Ok(*v),
        InputValue::Float(v) if v.fract() == 0.0 && v.abs() < 9.2e18 => Ok(*v as i64),
        InputValue::Str(s) => parse_integer(s.trim())
            .ok_or_else(|| CoercionError::new(shape, kind, format!("\"{s}\" is not an integer"))),
        InputValue::Wrapped(inner) => to_i64(inner, kind),
        _ => Err(CoercionError::new(shape, kind, "expected an integer")),
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<u64>().ok().map(|v| v as i64))
}

// ============================================================================
// Property batches
// ============================================================================

/// A property a mutation command is asked to write
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub name: String,
    pub value: InputValue,
    pub kind: ValueKind,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, value: InputValue, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            value,
            kind,
        }
    }

    /// One property per name, all sharing the same value and kind
    pub fn from_names<I, S>(names: I, value: &InputValue, kind: ValueKind) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(|name| Self::new(name, value.clone(), kind))
            .collect()
    }

    /// Typed value for the set-value call
    pub fn to_property_value(&self) -> Result<PropertyValue, RegError> {
        to_property_value(&self.value, self.kind).map_err(|e| e.for_property(&self.name))
    }
}

/// Coerce every property of a batch before any store mutation
///
/// Properties that fail are reported and dropped; the others keep their
/// order.
pub fn prepare_properties(specs: Vec<PropertySpec>) -> (Vec<PropertySpec>, Vec<ErrorRecord>) {
    let mut prepared = Vec::with_capacity(specs.len());
    let mut errors = Vec::new();

    for spec in specs {
        let PropertySpec { name, value, kind } = spec;
        match coerce(value, kind) {
            Ok(value) => prepared.push(PropertySpec { name, value, kind }),
            Err(err) => {
                log::debug!("dropping property {name:?}: {err}");
                errors.push(ErrorRecord::new(
                    error_ids::UNABLE_TO_CONVERT_VALUE,
                    name.clone(),
                    err.for_property(&name),
                ));
            }
        }
    }

    (prepared, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ErrorCategory;
    use proptest::prelude::*;

    fn text(s: &str) -> InputValue {
        InputValue::Str(s.to_string())
    }

    fn strings(items: &[&str]) -> InputValue {
        InputValue::Strings(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_documented_conversions() {
        assert_eq!(coerce(InputValue::Null, ValueKind::Binary), Ok(InputValue::Bytes(vec![])));
        assert_eq!(
            coerce("ab".into(), ValueKind::Binary),
            Ok(InputValue::Bytes(vec![0x61, 0x00, 0x62, 0x00]))
        );
        assert_eq!(coerce(InputValue::Null, ValueKind::MultiString), Ok(strings(&[])));
        assert_eq!(
            coerce(
                InputValue::List(vec!["a".into(), "b".into()]),
                ValueKind::MultiString
            ),
            Ok(strings(&["a", "b"]))
        );
        assert_eq!(coerce(InputValue::Null, ValueKind::DWord), Ok(InputValue::Int(0)));
        assert_eq!(coerce(InputValue::Null, ValueKind::QWord), Ok(InputValue::Int(0)));
    }

    #[test]
    fn test_string_kinds() {
        assert_eq!(coerce(InputValue::Null, ValueKind::String), Ok(text("")));
        assert_eq!(coerce(InputValue::Int(42), ValueKind::ExpandString), Ok(text("42")));
        assert_eq!(coerce(InputValue::Bool(true), ValueKind::String), Ok(text("True")));
        assert_eq!(
            coerce(InputValue::wrap("x".into()), ValueKind::String),
            Ok(text("x"))
        );
    }

    #[test]
    fn test_binary_from_scalars_and_sequences() {
        assert_eq!(coerce(InputValue::Int(0x1FF), ValueKind::Binary), Ok(InputValue::Bytes(vec![0xFF])));
        assert_eq!(coerce(InputValue::Byte(7), ValueKind::None), Ok(InputValue::Bytes(vec![7])));

        let mixed = InputValue::List(vec![
            InputValue::Int(1),
            InputValue::wrap(InputValue::Byte(2)),
            InputValue::Str("3".into()),
        ]);
        assert_eq!(coerce(mixed, ValueKind::Binary), Ok(InputValue::Bytes(vec![1, 2, 3])));

        let err = coerce(InputValue::List(vec![InputValue::Int(256)]), ValueKind::Binary).unwrap_err();
        assert_eq!(err.kind, ValueKind::Binary);
        assert!(coerce(InputValue::Float(1.5), ValueKind::Binary).is_err());
    }

    #[test]
    fn test_integers_pass_through() {
        assert_eq!(coerce("12".into(), ValueKind::DWord), Ok(text("12")));
        assert_eq!(coerce(InputValue::Long(1 << 40), ValueKind::QWord), Ok(InputValue::Long(1 << 40)));
    }

    #[test]
    fn test_multi_string_from_single_values() {
        assert_eq!(coerce("one".into(), ValueKind::MultiString), Ok(strings(&["one"])));
        assert_eq!(coerce(InputValue::Int(5), ValueKind::MultiString), Ok(strings(&["5"])));
        assert_eq!(
            coerce(InputValue::Bytes(vec![1, 2]), ValueKind::MultiString),
            Ok(strings(&["1", "2"]))
        );
    }

    #[test]
    fn test_untyped_sequences_follow_first_element() {
        assert_eq!(coerce(InputValue::Null, ValueKind::Unknown), Ok(text("")));
        assert_eq!(
            coerce(
                InputValue::List(vec![InputValue::Byte(1), InputValue::Int(2)]),
                ValueKind::Unknown
            ),
            Ok(InputValue::Bytes(vec![1, 2]))
        );
        assert_eq!(
            coerce(
                InputValue::List(vec!["a".into(), InputValue::Int(2)]),
                ValueKind::Unknown
            ),
            Ok(strings(&["a", "2"]))
        );
        assert_eq!(coerce(InputValue::Int(9), ValueKind::Unknown), Ok(InputValue::Int(9)));
    }

    #[test]
    fn test_untyped_sequence_led_by_any_integer_is_binary() {
        let err = coerce(
            InputValue::List(vec![InputValue::Int(1000), InputValue::Byte(2)]),
            ValueKind::Unknown,
        )
        .unwrap_err();
        assert_eq!(err.kind, ValueKind::Unknown);
        assert!(err.reason.contains("element 0 (1000)"));
        assert_eq!(
            coerce(
                InputValue::List(vec![InputValue::Int(3), "4".into()]),
                ValueKind::Unknown
            ),
            Ok(InputValue::Bytes(vec![3, 4]))
        );
        assert_eq!(
            coerce(
                InputValue::List(vec![InputValue::wrap(InputValue::Byte(7)), InputValue::Long(8)]),
                ValueKind::Unknown
            ),
            Ok(InputValue::Bytes(vec![7, 8]))
        );
    }

    #[test]
    fn test_wrapped_values_reach_every_rule() {
        let nested = InputValue::Wrapped(Box::new(InputValue::Wrapped(Box::new("A".into()))));
        assert_eq!(nested.shape(), Shape::Text);
        assert_eq!(coerce_binary(nested, ValueKind::Binary), Ok(InputValue::Bytes(vec![b'A', 0])));
        assert_eq!(
            to_byte(InputValue::Wrapped(Box::new(InputValue::Int(300))), 0, ValueKind::Binary)
                .map_err(|e| e.shape),
            Err(Shape::Integer)
        );
        assert_eq!(to_byte(InputValue::wrap(InputValue::Byte(9)), 0, ValueKind::Binary), Ok(9));
    }

    #[test]
    fn test_store_call_narrowing() {
        assert_eq!(
            to_property_value(&"4294967295".into(), ValueKind::DWord),
            Ok(PropertyValue::Int32(-1))
        );
        assert_eq!(
            to_property_value(&"0x10".into(), ValueKind::QWord),
            Ok(PropertyValue::Int64(16))
        );
        assert!(to_property_value(&InputValue::Long(1 << 40), ValueKind::DWord).is_err());
        assert!(to_property_value(&"abc".into(), ValueKind::DWord).is_err());
        assert_eq!(
            to_property_value(&InputValue::Int(3), ValueKind::Unknown),
            Ok(PropertyValue::Int32(3))
        );
        assert_eq!(
            to_property_value(&strings(&["a"]), ValueKind::Unknown),
            Ok(PropertyValue::StringList(vec!["a".into()]))
        );
        assert_eq!(
            to_property_value(&InputValue::Bytes(vec![1]), ValueKind::None),
            Ok(PropertyValue::None(vec![1]))
        );
    }

    #[test]
    fn test_prepare_drops_only_failures() {
        let specs = vec![
            PropertySpec::new("good", "text".into(), ValueKind::String),
            PropertySpec::new("bad", InputValue::List(vec![InputValue::Int(-1)]), ValueKind::Binary),
            PropertySpec::new("", InputValue::Null, ValueKind::DWord),
        ];

        let (prepared, errors) = prepare_properties(specs);

        let names: Vec<_> = prepared.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["good", ""]);
        assert_eq!(prepared[1].value, InputValue::Int(0));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, error_ids::UNABLE_TO_CONVERT_VALUE);
        assert_eq!(errors[0].target, "bad");
        assert_eq!(errors[0].category(), ErrorCategory::InvalidType);
    }

    #[test]
    fn test_from_names_shares_value() {
        let specs = PropertySpec::from_names(["a", "b"], &InputValue::Int(1), ValueKind::DWord);
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.value == InputValue::Int(1)));
    }

    fn scalar() -> impl Strategy<Value = InputValue> {
        prop_oneof![
            Just(InputValue::Null),
            any::<bool>().prop_map(InputValue::Bool),
            any::<u8>().prop_map(InputValue::Byte),
            any::<i32>().prop_map(InputValue::Int),
            any::<i64>().prop_map(InputValue::Long),
            (-1.0e6f64..1.0e6).prop_map(InputValue::Float),
            "[a-z0-9 ]{0,6}".prop_map(InputValue::Str),
            proptest::collection::vec(any::<u8>(), 0..4).prop_map(InputValue::Bytes),
            proptest::collection::vec("[a-z]{0,3}", 0..4).prop_map(InputValue::Strings),
        ]
    }

    fn input() -> impl Strategy<Value = InputValue> {
        scalar().prop_recursive(2, 12, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(InputValue::List),
                inner.prop_map(InputValue::wrap),
            ]
        })
    }

    fn kind() -> impl Strategy<Value = ValueKind> {
        prop_oneof![
            Just(ValueKind::Unknown),
            Just(ValueKind::None),
            Just(ValueKind::String),
            Just(ValueKind::ExpandString),
            Just(ValueKind::Binary),
            Just(ValueKind::DWord),
            Just(ValueKind::MultiString),
            Just(ValueKind::QWord),
        ]
    }

    proptest! {
        #[test]
        fn prop_coercion_is_idempotent(value in input(), kind in kind()) {
            if let Ok(once) = coerce(value, kind) {
                let twice = coerce(once.clone(), kind);
                prop_assert_eq!(twice, Ok(once));
            }
        }

        #[test]
        fn prop_coercion_is_deterministic(value in input(), kind in kind()) {
            prop_assert_eq!(coerce(value.clone(), kind), coerce(value, kind));
        }
    }
}
