// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pvbind
//!
//! Structured data binding between OPC UA items and process-variable
//! records.
//!
//! A subscribed OPC UA item may carry a deeply structured value; a
//! process-variable record reads or writes exactly one scalar. This
//! crate provides the tree that bridges the two:
//!
//! - **Types**: The [`Variant`] value model, strict conversion rules,
//!   and the [`UpdateEvent`] carrying a value with its timestamps
//! - **Element**: The [`DataElement`] tree of leaves and interior
//!   nodes, with structural path lookup and top-down value fan-out
//! - **Leaf**: Per-leaf shared state behind one coarse lock, holding
//!   the incoming queue and the staged outgoing value
//! - **Endpoint**: The [`RecordEndpoint`] a leaf binds to, with its
//!   non-blocking processing intake
//! - **Error**: The [`ConversionError`] hierarchy for rejected reads
//!   and writes
//!
//! ## Example
//!
//! ```rust
//! use pvbind::{DataElement, RecordEndpoint, Variant, VariantKind};
//! use chrono::Utc;
//!
//! // Shape mirrors the item's type definition, built once at startup.
//! let item = DataElement::root().with_child(
//!     DataElement::node("motor")
//!         .with_child(DataElement::leaf("speed", VariantKind::Double)),
//! );
//!
//! // Attach a record to one leaf of the structure.
//! let (endpoint, _intake) = RecordEndpoint::channel("ai:motor-speed");
//! item.find("motor.speed").unwrap().set_endpoint_link(Some(&endpoint));
//!
//! // A decoded update fans out to the matching leaves.
//! let now = Utc::now();
//! item.set_incoming(
//!     Variant::Struct(vec![(
//!         "motor".into(),
//!         Variant::Struct(vec![("speed".into(), Variant::Double(1450.5))]),
//!     )]),
//!     now,
//!     now,
//!     true,
//! );
//!
//! let leaf = item.find_leaf("motor.speed").unwrap();
//! assert_eq!(leaf.lock().read_float64(), Ok(1450.5));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Binding Modules
// =============================================================================

pub mod element;
pub mod endpoint;
pub mod leaf;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::{ConversionError, ConversionResult};
pub use types::{UpdateEvent, Variant, VariantKind};

pub use element::{DataElement, ElementKind, SEPARATOR};
pub use endpoint::{ProcessReason, ProcessRequest, RecordEndpoint};
pub use leaf::{LeafGuard, LeafShared, DEFAULT_QUEUE_CAPACITY};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
