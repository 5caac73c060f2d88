// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core value types for pvbind.
//!
//! This module provides the protocol-agnostic value model used throughout
//! the binding tree: the [`Variant`] value enum covering the OPC UA scalar
//! set, its [`VariantKind`] type tag, and the [`UpdateEvent`] delivery
//! record for incoming data.
//!
//! Conversions are strict: a value that cannot be represented in the
//! requested target type is rejected with a [`ConversionError`], never
//! clamped, wrapped, or silently truncated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, ConversionResult};

// =============================================================================
// Variant
// =============================================================================

/// A decoded OPC UA value.
///
/// This enum can represent any scalar value delivered by the protocol
/// collaborator, plus the two structured shapes (`Array`, `Struct`) that
/// interior tree nodes fan out to their children.
///
/// # Examples
///
/// ```
/// use pvbind::types::Variant;
///
/// let temp = Variant::Double(25.5);
/// assert_eq!(temp.to_f64().unwrap(), 25.5);
/// assert_eq!(temp.type_name(), "double");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// Boolean value
    Bool(bool),

    /// Signed 8-bit integer (OPC UA SByte)
    SByte(i8),

    /// Unsigned 8-bit integer (OPC UA Byte)
    Byte(u8),

    /// Signed 16-bit integer
    Int16(i16),

    /// Unsigned 16-bit integer
    UInt16(u16),

    /// Signed 32-bit integer
    Int32(i32),

    /// Unsigned 32-bit integer
    UInt32(u32),

    /// Signed 64-bit integer
    Int64(i64),

    /// Unsigned 64-bit integer
    UInt64(u64),

    /// 32-bit floating point
    Float(f32),

    /// 64-bit floating point
    Double(f64),

    /// UTF-8 string
    String(String),

    /// Raw byte string
    ByteString(Vec<u8>),

    /// Array of values
    Array(Vec<Variant>),

    /// Named-field structure
    Struct(Vec<(String, Variant)>),
}

impl Variant {
    /// Returns the type name of this value.
    ///
    /// # Examples
    ///
    /// ```
    /// use pvbind::types::Variant;
    ///
    /// assert_eq!(Variant::Double(1.0).type_name(), "double");
    /// assert_eq!(Variant::Bool(true).type_name(), "bool");
    /// ```
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    /// Returns the type tag of this value.
    #[inline]
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Bool(_) => VariantKind::Bool,
            Variant::SByte(_) => VariantKind::SByte,
            Variant::Byte(_) => VariantKind::Byte,
            Variant::Int16(_) => VariantKind::Int16,
            Variant::UInt16(_) => VariantKind::UInt16,
            Variant::Int32(_) => VariantKind::Int32,
            Variant::UInt32(_) => VariantKind::UInt32,
            Variant::Int64(_) => VariantKind::Int64,
            Variant::UInt64(_) => VariantKind::UInt64,
            Variant::Float(_) => VariantKind::Float,
            Variant::Double(_) => VariantKind::Double,
            Variant::String(_) => VariantKind::String,
            Variant::ByteString(_) => VariantKind::ByteString,
            Variant::Array(_) => VariantKind::Array,
            Variant::Struct(_) => VariantKind::Struct,
        }
    }

    /// Returns `true` if this is a numeric value (integer or float).
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.kind().is_numeric()
    }

    /// Returns `true` if this is a structured value (array or struct).
    #[inline]
    pub fn is_structured(&self) -> bool {
        matches!(self, Variant::Array(_) | Variant::Struct(_))
    }

    /// Converts this value to an `i32`.
    ///
    /// Integer sources are range-checked; float sources are rounded half
    /// away from zero, then range-checked. Non-numeric sources fail with
    /// a type mismatch.
    pub fn to_i32(&self) -> ConversionResult<i32> {
        match self {
            Variant::Bool(v) => Ok(i32::from(*v)),
            Variant::SByte(v) => Ok(i32::from(*v)),
            Variant::Byte(v) => Ok(i32::from(*v)),
            Variant::Int16(v) => Ok(i32::from(*v)),
            Variant::UInt16(v) => Ok(i32::from(*v)),
            Variant::Int32(v) => Ok(*v),
            Variant::UInt32(v) => i32::try_from(*v).map_err(|_| overflow(v, "int32")),
            Variant::Int64(v) => i32::try_from(*v).map_err(|_| overflow(v, "int32")),
            Variant::UInt64(v) => i32::try_from(*v).map_err(|_| overflow(v, "int32")),
            Variant::Float(v) => float_to_int(f64::from(*v), "int32", f64::from(i32::MIN), 2_147_483_648.0).map(|r| r as i32),
            Variant::Double(v) => float_to_int(*v, "int32", f64::from(i32::MIN), 2_147_483_648.0).map(|r| r as i32),
            other => Err(mismatch("int32", other)),
        }
    }

    /// Converts this value to a `u32`.
    ///
    /// Same policy as [`Variant::to_i32`]; negative sources fail with an
    /// overflow error.
    pub fn to_u32(&self) -> ConversionResult<u32> {
        match self {
            Variant::Bool(v) => Ok(u32::from(*v)),
            Variant::SByte(v) => u32::try_from(*v).map_err(|_| overflow(v, "uint32")),
            Variant::Byte(v) => Ok(u32::from(*v)),
            Variant::Int16(v) => u32::try_from(*v).map_err(|_| overflow(v, "uint32")),
            Variant::UInt16(v) => Ok(u32::from(*v)),
            Variant::Int32(v) => u32::try_from(*v).map_err(|_| overflow(v, "uint32")),
            Variant::UInt32(v) => Ok(*v),
            Variant::Int64(v) => u32::try_from(*v).map_err(|_| overflow(v, "uint32")),
            Variant::UInt64(v) => u32::try_from(*v).map_err(|_| overflow(v, "uint32")),
            Variant::Float(v) => float_to_int(f64::from(*v), "uint32", 0.0, 4_294_967_296.0).map(|r| r as u32),
            Variant::Double(v) => float_to_int(*v, "uint32", 0.0, 4_294_967_296.0).map(|r| r as u32),
            other => Err(mismatch("uint32", other)),
        }
    }

    /// Converts this value to an `f64`.
    ///
    /// All numeric sources widen; 64-bit integers above 2^53 lose
    /// precision, which is accepted here (widening, not narrowing).
    pub fn to_f64(&self) -> ConversionResult<f64> {
        match self {
            Variant::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Variant::SByte(v) => Ok(f64::from(*v)),
            Variant::Byte(v) => Ok(f64::from(*v)),
            Variant::Int16(v) => Ok(f64::from(*v)),
            Variant::UInt16(v) => Ok(f64::from(*v)),
            Variant::Int32(v) => Ok(f64::from(*v)),
            Variant::UInt32(v) => Ok(f64::from(*v)),
            Variant::Int64(v) => Ok(*v as f64),
            Variant::UInt64(v) => Ok(*v as f64),
            Variant::Float(v) => Ok(f64::from(*v)),
            Variant::Double(v) => Ok(*v),
            other => Err(mismatch("double", other)),
        }
    }

    /// Renders this value as text.
    ///
    /// Scalar values use their display form; byte strings must be valid
    /// UTF-8. Structured values have no textual representation.
    pub fn to_text(&self) -> ConversionResult<String> {
        match self {
            Variant::String(v) => Ok(v.clone()),
            Variant::ByteString(v) => String::from_utf8(v.clone())
                .map_err(|_| ConversionError::type_mismatch("string", "byte_string")),
            Variant::Array(_) | Variant::Struct(_) => Err(mismatch("string", self)),
            scalar => Ok(scalar.to_string()),
        }
    }

    /// Converts an `i32` into a value of the given target kind.
    ///
    /// This is the staging conversion for outgoing writes: out-of-range
    /// values are rejected, not saturated.
    pub fn from_i32(kind: VariantKind, value: i32) -> ConversionResult<Variant> {
        match kind {
            VariantKind::Bool => Ok(Variant::Bool(value != 0)),
            VariantKind::SByte => i8::try_from(value).map(Variant::SByte).map_err(|_| overflow(&value, "sbyte")),
            VariantKind::Byte => u8::try_from(value).map(Variant::Byte).map_err(|_| overflow(&value, "byte")),
            VariantKind::Int16 => i16::try_from(value).map(Variant::Int16).map_err(|_| overflow(&value, "int16")),
            VariantKind::UInt16 => u16::try_from(value).map(Variant::UInt16).map_err(|_| overflow(&value, "uint16")),
            VariantKind::Int32 => Ok(Variant::Int32(value)),
            VariantKind::UInt32 => u32::try_from(value).map(Variant::UInt32).map_err(|_| overflow(&value, "uint32")),
            VariantKind::Int64 => Ok(Variant::Int64(i64::from(value))),
            VariantKind::UInt64 => u64::try_from(value).map(Variant::UInt64).map_err(|_| overflow(&value, "uint64")),
            VariantKind::Float => Ok(Variant::Float(value as f32)),
            VariantKind::Double => Ok(Variant::Double(f64::from(value))),
            VariantKind::String => Ok(Variant::String(value.to_string())),
            other => Err(ConversionError::type_mismatch(other.type_name(), "int32")),
        }
    }

    /// Converts a `u32` into a value of the given target kind.
    pub fn from_u32(kind: VariantKind, value: u32) -> ConversionResult<Variant> {
        match kind {
            VariantKind::Bool => Ok(Variant::Bool(value != 0)),
            VariantKind::SByte => i8::try_from(value).map(Variant::SByte).map_err(|_| overflow(&value, "sbyte")),
            VariantKind::Byte => u8::try_from(value).map(Variant::Byte).map_err(|_| overflow(&value, "byte")),
            VariantKind::Int16 => i16::try_from(value).map(Variant::Int16).map_err(|_| overflow(&value, "int16")),
            VariantKind::UInt16 => u16::try_from(value).map(Variant::UInt16).map_err(|_| overflow(&value, "uint16")),
            VariantKind::Int32 => i32::try_from(value).map(Variant::Int32).map_err(|_| overflow(&value, "int32")),
            VariantKind::UInt32 => Ok(Variant::UInt32(value)),
            VariantKind::Int64 => Ok(Variant::Int64(i64::from(value))),
            VariantKind::UInt64 => Ok(Variant::UInt64(u64::from(value))),
            VariantKind::Float => Ok(Variant::Float(value as f32)),
            VariantKind::Double => Ok(Variant::Double(f64::from(value))),
            VariantKind::String => Ok(Variant::String(value.to_string())),
            other => Err(ConversionError::type_mismatch(other.type_name(), "uint32")),
        }
    }

    /// Converts an `f64` into a value of the given target kind.
    ///
    /// Integer targets round half away from zero and range-check the
    /// result; NaN and infinities are rejected. A `Float` target rejects
    /// finite values beyond the f32 range instead of casting to infinity.
    pub fn from_f64(kind: VariantKind, value: f64) -> ConversionResult<Variant> {
        match kind {
            VariantKind::Bool => {
                if !value.is_finite() {
                    return Err(ConversionError::not_finite(value, "bool"));
                }
                Ok(Variant::Bool(value != 0.0))
            }
            VariantKind::SByte => {
                float_to_int(value, "sbyte", f64::from(i8::MIN), 128.0).map(|r| Variant::SByte(r as i8))
            }
            VariantKind::Byte => {
                float_to_int(value, "byte", 0.0, 256.0).map(|r| Variant::Byte(r as u8))
            }
            VariantKind::Int16 => {
                float_to_int(value, "int16", f64::from(i16::MIN), 32_768.0).map(|r| Variant::Int16(r as i16))
            }
            VariantKind::UInt16 => {
                float_to_int(value, "uint16", 0.0, 65_536.0).map(|r| Variant::UInt16(r as u16))
            }
            VariantKind::Int32 => {
                float_to_int(value, "int32", f64::from(i32::MIN), 2_147_483_648.0).map(|r| Variant::Int32(r as i32))
            }
            VariantKind::UInt32 => {
                float_to_int(value, "uint32", 0.0, 4_294_967_296.0).map(|r| Variant::UInt32(r as u32))
            }
            VariantKind::Int64 => {
                float_to_int(value, "int64", i64::MIN as f64, 9_223_372_036_854_775_808.0).map(|r| Variant::Int64(r as i64))
            }
            VariantKind::UInt64 => {
                float_to_int(value, "uint64", 0.0, 18_446_744_073_709_551_616.0).map(|r| Variant::UInt64(r as u64))
            }
            VariantKind::Float => {
                // f32 overflow from a finite f64 must fail, not become infinity
                if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                    return Err(overflow(&value, "float"));
                }
                Ok(Variant::Float(value as f32))
            }
            VariantKind::Double => Ok(Variant::Double(value)),
            VariantKind::String => Ok(Variant::String(value.to_string())),
            other => Err(ConversionError::type_mismatch(other.type_name(), "double")),
        }
    }

    /// Converts text into a value of the given target kind.
    ///
    /// Only text-capable kinds accept text; writing text into a numeric
    /// or structured leaf fails.
    pub fn from_text(kind: VariantKind, value: &str) -> ConversionResult<Variant> {
        match kind {
            VariantKind::String => Ok(Variant::String(value.to_string())),
            VariantKind::ByteString => Ok(Variant::ByteString(value.as_bytes().to_vec())),
            other => Err(ConversionError::not_text(other)),
        }
    }

    /// Converts this value to a JSON value, mainly for diagnostic output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Variant::Bool(v) => serde_json::Value::Bool(*v),
            Variant::SByte(v) => serde_json::json!(*v),
            Variant::Byte(v) => serde_json::json!(*v),
            Variant::Int16(v) => serde_json::json!(*v),
            Variant::UInt16(v) => serde_json::json!(*v),
            Variant::Int32(v) => serde_json::json!(*v),
            Variant::UInt32(v) => serde_json::json!(*v),
            Variant::Int64(v) => serde_json::json!(*v),
            Variant::UInt64(v) => serde_json::json!(*v),
            Variant::Float(v) => serde_json::json!(*v),
            Variant::Double(v) => serde_json::json!(*v),
            Variant::String(v) => serde_json::Value::String(v.clone()),
            Variant::ByteString(v) => serde_json::json!(v),
            Variant::Array(arr) => serde_json::Value::Array(arr.iter().map(|v| v.to_json()).collect()),
            Variant::Struct(fields) => {
                let map: serde_json::Map<String, serde_json::Value> =
                    fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Bool(v) => write!(f, "{}", v),
            Variant::SByte(v) => write!(f, "{}", v),
            Variant::Byte(v) => write!(f, "{}", v),
            Variant::Int16(v) => write!(f, "{}", v),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int64(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) => write!(f, "{}", v),
            Variant::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Variant::Array(v) => write!(f, "[{} elements]", v.len()),
            Variant::Struct(v) => write!(f, "{{{} fields}}", v.len()),
        }
    }
}

// Implement From for the scalar types
macro_rules! impl_from_for_variant {
    ($variant:ident, $type:ty) => {
        impl From<$type> for Variant {
            fn from(v: $type) -> Self {
                Variant::$variant(v)
            }
        }
    };
}

impl_from_for_variant!(Bool, bool);
impl_from_for_variant!(SByte, i8);
impl_from_for_variant!(Byte, u8);
impl_from_for_variant!(Int16, i16);
impl_from_for_variant!(UInt16, u16);
impl_from_for_variant!(Int32, i32);
impl_from_for_variant!(UInt32, u32);
impl_from_for_variant!(Int64, i64);
impl_from_for_variant!(UInt64, u64);
impl_from_for_variant!(Float, f32);
impl_from_for_variant!(Double, f64);
impl_from_for_variant!(String, String);

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

/// Rounds a float half away from zero and checks the integer range.
///
/// `sup` is exclusive: the 64-bit integer maxima are not exactly
/// representable in f64 and would round past an inclusive bound, so the
/// callers pass the next power of two (exact in f64) instead.
fn float_to_int(value: f64, target: &'static str, min: f64, sup: f64) -> ConversionResult<f64> {
    if !value.is_finite() {
        return Err(ConversionError::not_finite(value, target));
    }
    let rounded = value.round();
    if rounded < min || rounded >= sup {
        return Err(ConversionError::overflow(value, target));
    }
    Ok(rounded)
}

fn overflow(value: &dyn fmt::Display, target: &'static str) -> ConversionError {
    ConversionError::overflow(value, target)
}

fn mismatch(expected: &'static str, actual: &Variant) -> ConversionError {
    ConversionError::type_mismatch(expected, actual.type_name())
}

// =============================================================================
// VariantKind
// =============================================================================

/// The type tag of a [`Variant`].
///
/// A leaf element carries the kind of its server-side type, fixed when the
/// item's type definition is decoded; outgoing writes convert to this
/// kind before staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// Boolean
    Bool,
    /// Signed 8-bit integer
    SByte,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// UTF-8 string
    String,
    /// Raw byte string
    ByteString,
    /// Array of values
    Array,
    /// Named-field structure
    Struct,
}

impl VariantKind {
    /// Returns the kind name as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            VariantKind::Bool => "bool",
            VariantKind::SByte => "sbyte",
            VariantKind::Byte => "byte",
            VariantKind::Int16 => "int16",
            VariantKind::UInt16 => "uint16",
            VariantKind::Int32 => "int32",
            VariantKind::UInt32 => "uint32",
            VariantKind::Int64 => "int64",
            VariantKind::UInt64 => "uint64",
            VariantKind::Float => "float",
            VariantKind::Double => "double",
            VariantKind::String => "string",
            VariantKind::ByteString => "byte_string",
            VariantKind::Array => "array",
            VariantKind::Struct => "struct",
        }
    }

    /// Returns `true` if the kind is numeric (integer or float).
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            VariantKind::SByte
                | VariantKind::Byte
                | VariantKind::Int16
                | VariantKind::UInt16
                | VariantKind::Int32
                | VariantKind::UInt32
                | VariantKind::Int64
                | VariantKind::UInt64
                | VariantKind::Float
                | VariantKind::Double
        )
    }

    /// Returns `true` if the kind can hold text.
    #[inline]
    pub fn is_textual(&self) -> bool {
        matches!(self, VariantKind::String | VariantKind::ByteString)
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

// =============================================================================
// UpdateEvent
// =============================================================================

/// One incoming data delivery for a leaf element.
///
/// Carries the decoded value, the server and source timestamps of the
/// delivery, and the protocol-level status of the read service that
/// produced it. Events queue up FIFO in the leaf until the processing
/// side consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// The decoded value.
    pub value: Variant,

    /// Server timestamp of the delivery.
    pub server_time: DateTime<Utc>,

    /// Device/source timestamp of the delivery.
    pub source_time: DateTime<Utc>,

    /// Whether the protocol-level read service completed successfully.
    pub ok: bool,
}

impl UpdateEvent {
    /// Creates a successful update event.
    pub fn new(value: Variant, server_time: DateTime<Utc>, source_time: DateTime<Utc>) -> Self {
        Self {
            value,
            server_time,
            source_time,
            ok: true,
        }
    }

    /// Creates an update event with both timestamps set to now.
    pub fn now(value: Variant) -> Self {
        let t = Utc::now();
        Self::new(value, t, t)
    }

    /// Sets the read service status.
    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
