// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conversion-error taxonomy for the binding tree.
//!
//! Every typed read or write accessor on a leaf either succeeds or surfaces
//! a [`ConversionError`] to its immediate caller. Nothing is retried or
//! swallowed at this layer; retry policy belongs to the protocol
//! collaborator.
//!
//! "No data present" is deliberately a *variant* of the one conversion
//! error type rather than a separate error: callers that care about the
//! distinction match on [`ConversionError::NoData`], callers that do not
//! can treat it like any other conversion failure. This choice is applied
//! consistently across all read accessors.

use std::fmt;

use thiserror::Error;

use crate::types::VariantKind;

// =============================================================================
// ConversionError
// =============================================================================

/// Errors raised by the typed read/write accessors of a leaf element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// A read was attempted with no pending incoming value.
    #[error("No incoming data present")]
    NoData,

    /// The value is outside the representable range of the target type.
    #[error("Value {value} cannot be represented as {target}")]
    Overflow {
        /// Display form of the offending value.
        value: String,
        /// Target type name.
        target: &'static str,
    },

    /// A NaN or infinite float was converted to an integer target.
    #[error("Non-finite value {value} cannot be represented as {target}")]
    NotFinite {
        /// The offending value.
        value: String,
        /// Target type name.
        target: &'static str,
    },

    /// The source type has no conversion to the requested target type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected (target) type name.
        expected: &'static str,
        /// Actual (source) type name.
        actual: &'static str,
    },

    /// Text was written to a leaf whose declared type cannot hold text.
    #[error("Leaf type {kind} cannot hold text")]
    NotText {
        /// The leaf's declared type.
        kind: VariantKind,
    },

    /// A string read was given a zero-capacity buffer.
    #[error("Target buffer has no room for a NUL terminator")]
    EmptyBuffer,
}

impl ConversionError {
    /// Creates an overflow error.
    pub fn overflow(value: impl fmt::Display, target: &'static str) -> Self {
        Self::Overflow {
            value: value.to_string(),
            target,
        }
    }

    /// Creates a non-finite error.
    pub fn not_finite(value: f64, target: &'static str) -> Self {
        Self::NotFinite {
            value: value.to_string(),
            target,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Creates a not-text error.
    pub fn not_text(kind: VariantKind) -> Self {
        Self::NotText { kind }
    }

    /// Returns `true` if the error reports an empty incoming slot rather
    /// than a failed conversion.
    #[inline]
    pub fn is_no_data(&self) -> bool {
        matches!(self, ConversionError::NoData)
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConversionError::NoData => "no_data",
            ConversionError::Overflow { .. } => "overflow",
            ConversionError::NotFinite { .. } => "not_finite",
            ConversionError::TypeMismatch { .. } => "type_mismatch",
            ConversionError::NotText { .. } => "not_text",
            ConversionError::EmptyBuffer => "empty_buffer",
        }
    }
}

/// A Result type with ConversionError.
pub type ConversionResult<T> = Result<T, ConversionError>;

// =============================================================================
// Tests
// =============================================================================
