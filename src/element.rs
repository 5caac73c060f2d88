// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The data-binding tree.
//!
//! A [`DataElement`] is one element of a structured OPC UA item: either a
//! *leaf* carrying a single typed value bound to one process-variable
//! record, or an *interior node* owning an ordered list of child
//! elements. The top-level element of an item is an interior node with an
//! empty name; child names joined by [`SEPARATOR`] form the structural
//! path used to attach records to leaves.
//!
//! The tree is built once, when the protocol collaborator decodes the
//! item's type definition, not per value update. Value updates arrive
//! through [`DataElement::set_incoming`], which fans structured payloads
//! out to the matching children top-down; record attachment happens
//! independently through [`DataElement::set_endpoint_link`].
//!
//! The element itself performs no synchronization beyond the leaf's
//! coarse lock (see [`crate::leaf`]): an element is classified leaf or
//! node at construction and never reclassified, so the tree shape is
//! immutable once configuration is done.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::endpoint::{ProcessReason, RecordEndpoint};
use crate::leaf::{LeafShared, DEFAULT_QUEUE_CAPACITY};
use crate::types::{UpdateEvent, Variant, VariantKind};

/// Delimiter between element names in a structural path.
pub const SEPARATOR: char = '.';

// =============================================================================
// DataElement
// =============================================================================

/// One element of a structured item: a leaf or an interior node.
#[derive(Debug)]
pub struct DataElement {
    name: String,
    debug: u8,
    kind: ElementKind,
}

/// The closed set of element variants.
#[derive(Debug)]
pub enum ElementKind {
    /// A scalar element bound (or bindable) to one record endpoint.
    Leaf(Arc<LeafShared>),

    /// A structured element owning its children.
    Node(Vec<DataElement>),
}

impl DataElement {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Creates the top-level element of an item: an interior node with an
    /// empty name.
    pub fn root() -> Self {
        Self::node("")
    }

    /// Creates an interior node.
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug: 0,
            kind: ElementKind::Node(Vec::new()),
        }
    }

    /// Creates a leaf with the default single-slot incoming buffer.
    pub fn leaf(name: impl Into<String>, kind: VariantKind) -> Self {
        Self::leaf_with_capacity(name, kind, DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a leaf with an explicit incoming-queue capacity.
    pub fn leaf_with_capacity(name: impl Into<String>, kind: VariantKind, capacity: usize) -> Self {
        Self {
            name: name.into(),
            debug: 0,
            kind: ElementKind::Leaf(Arc::new(LeafShared::new(kind, capacity))),
        }
    }

    /// Appends a child to an interior node.
    ///
    /// Calling this on a leaf is a configuration bug; the child is
    /// dropped with a warning.
    pub fn push_child(&mut self, child: DataElement) {
        match &mut self.kind {
            ElementKind::Node(children) => children.push(child),
            ElementKind::Leaf(_) => {
                tracing::warn!(name = %self.name, child = %child.name, "cannot add child to leaf element, dropped");
            }
        }
    }

    /// Builder form of [`DataElement::push_child`].
    pub fn with_child(mut self, child: DataElement) -> Self {
        self.push_child(child);
        self
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Returns the element name (empty for the root of an item).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this element is a leaf.
    ///
    /// The classification is fixed at construction and never changes,
    /// regardless of linkage changes.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, ElementKind::Leaf(_))
    }

    /// Returns the per-element diagnostic verbosity.
    #[inline]
    pub fn debug(&self) -> u8 {
        self.debug
    }

    /// Sets the per-element diagnostic verbosity (this element only).
    pub fn set_debug(&mut self, level: u8) {
        self.debug = level;
    }

    /// Returns the children of an interior node (empty for a leaf).
    pub fn children(&self) -> &[DataElement] {
        match &self.kind {
            ElementKind::Node(children) => children,
            ElementKind::Leaf(_) => &[],
        }
    }

    /// Returns the shared leaf state, if this element is a leaf.
    pub fn as_leaf(&self) -> Option<&Arc<LeafShared>> {
        match &self.kind {
            ElementKind::Leaf(shared) => Some(shared),
            ElementKind::Node(_) => None,
        }
    }

    /// Resolves a [`SEPARATOR`]-delimited structural path.
    ///
    /// The empty path resolves to this element.
    pub fn find(&self, path: &str) -> Option<&DataElement> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split(SEPARATOR) {
            current = current.children().iter().find(|c| c.name == segment)?;
        }
        Some(current)
    }

    /// Resolves a structural path to a leaf's shared state.
    pub fn find_leaf(&self, path: &str) -> Option<&Arc<LeafShared>> {
        self.find(path).and_then(|e| e.as_leaf())
    }

    // =========================================================================
    // Linkage
    // =========================================================================

    /// Installs, replaces, or removes the bidirectional link between this
    /// leaf and a record endpoint.
    ///
    /// Any existing link, whether on this leaf or on the new endpoint
    /// (which is exclusive-use), is cleanly removed in both directions before
    /// the new pair of back-references is installed. Passing `None`
    /// removes the link without installing a new one.
    ///
    /// Callers serialize this against in-flight accessor calls by
    /// performing link changes only while no processing is active; the
    /// link slot is deliberately not guarded by the leaf's data lock.
    pub fn set_endpoint_link(&self, endpoint: Option<&Arc<RecordEndpoint>>) {
        let ElementKind::Leaf(shared) = &self.kind else {
            tracing::warn!(name = %self.name, "set_endpoint_link on interior node, ignored");
            return;
        };
        if let Some(old) = shared.take_endpoint().upgrade() {
            old.clear_element();
        }
        if let Some(ep) = endpoint {
            if let Some(prev) = ep.element() {
                if !Arc::ptr_eq(&prev, shared) {
                    prev.clear_endpoint_if(ep);
                }
            }
            shared.set_endpoint(Arc::downgrade(ep));
            ep.set_element(Arc::downgrade(shared));
        }
    }

    // =========================================================================
    // Incoming data
    // =========================================================================

    /// Delivers a decoded value to this element, top-down.
    ///
    /// A leaf enqueues the value as an [`UpdateEvent`]. An interior node
    /// fans a `Struct` out to children by field name and an `Array` by
    /// position; fields or positions with no matching child are dropped
    /// with a warning, as is a scalar delivered to an interior node.
    pub fn set_incoming(
        &self,
        value: Variant,
        server_time: DateTime<Utc>,
        source_time: DateTime<Utc>,
        ok: bool,
    ) {
        match &self.kind {
            ElementKind::Leaf(shared) => {
                if self.debug > 0 {
                    tracing::debug!(name = %self.name, value = %value, ok, "incoming update");
                }
                shared.lock().push_incoming(UpdateEvent {
                    value,
                    server_time,
                    source_time,
                    ok,
                });
            }
            ElementKind::Node(children) => match value {
                Variant::Struct(fields) => {
                    for (field, v) in fields {
                        match children.iter().find(|c| c.name == field) {
                            Some(child) => child.set_incoming(v, server_time, source_time, ok),
                            None => {
                                tracing::warn!(name = %self.name, field = %field, "no child element for structure field, value dropped");
                            }
                        }
                    }
                }
                Variant::Array(items) => {
                    if items.len() != children.len() {
                        tracing::warn!(
                            name = %self.name,
                            elements = items.len(),
                            children = children.len(),
                            "array length does not match child count"
                        );
                    }
                    for (child, v) in children.iter().zip(items) {
                        child.set_incoming(v, server_time, source_time, ok);
                    }
                }
                other => {
                    tracing::warn!(name = %self.name, actual = other.type_name(), "scalar update for structured element, dropped");
                }
            },
        }
    }

    // =========================================================================
    // Processing trigger
    // =========================================================================

    /// Requests record processing for this element.
    ///
    /// A leaf forwards the reason to its linked endpoint's intake; an
    /// interior node recurses so every descendant leaf's record is
    /// scheduled. Safe to call from the protocol delivery thread: the
    /// request is only enqueued, never waited on.
    pub fn request_record_processing(&self, reason: ProcessReason) {
        match &self.kind {
            ElementKind::Leaf(shared) => match shared.endpoint() {
                Some(endpoint) => endpoint.request_processing(reason),
                None => {
                    tracing::trace!(name = %self.name, reason = %reason, "no endpoint linked, processing request dropped");
                }
            },
            ElementKind::Node(children) => {
                for child in children {
                    child.request_record_processing(reason);
                }
            }
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Visits every leaf of the subtree with its fully qualified name.
    ///
    /// Used by the protocol collaborator to collect staged outgoing
    /// values before a write service.
    pub fn visit_leaves<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<LeafShared>),
    {
        self.visit_inner("", &mut f);
    }

    fn visit_inner(&self, prefix: &str, f: &mut dyn FnMut(&str, &Arc<LeafShared>)) {
        let qualified = qualify(prefix, &self.name);
        match &self.kind {
            ElementKind::Leaf(shared) => f(&qualified, shared),
            ElementKind::Node(children) => {
                for child in children {
                    child.visit_inner(&qualified, f);
                }
            }
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Prints a human-readable description of this element and its
    /// children to stdout.
    ///
    /// Verbosity: level 0 is one summary line per element; level 1 adds
    /// timestamps and service status; level 2 adds the current value as
    /// JSON. Leaf state is sampled with `try_lock`, so this is safe to
    /// call at any time without the endpoint lock; a contended leaf
    /// prints `<busy>` instead of blocking the protocol thread.
    pub fn show(&self, level: u8, indent: usize) {
        let mut out = String::new();
        if self.write_show(&mut out, level, indent).is_ok() {
            print!("{}", out);
        }
    }

    /// Writes the [`DataElement::show`] output into `out`.
    pub fn write_show(&self, out: &mut dyn fmt::Write, level: u8, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        let name = if self.name.is_empty() { "<root>" } else { &self.name };
        match &self.kind {
            ElementKind::Node(children) => {
                writeln!(out, "{}{} : node ({} children)", pad, name, children.len())?;
                for child in children {
                    child.write_show(out, level, indent + 1)?;
                }
            }
            ElementKind::Leaf(shared) => {
                let record = shared
                    .endpoint()
                    .map(|e| e.name().to_string())
                    .unwrap_or_else(|| "-".to_string());
                write!(out, "{}{} : leaf {} record={}", pad, name, shared.kind(), record)?;
                match shared.try_lock() {
                    Some(guard) => {
                        write!(
                            out,
                            " queued={}/{} dropped={}",
                            guard.pending(),
                            shared.capacity(),
                            guard.discarded()
                        )?;
                        if level >= 1 {
                            write!(
                                out,
                                " server_time={} read_ok={} write_ok={}",
                                guard.read_timestamp(true).to_rfc3339(),
                                guard.read_was_ok(),
                                guard.write_was_ok()
                            )?;
                        }
                        if level >= 2 {
                            match guard.current() {
                                Some(v) => write!(out, " value={}", v.to_json())?,
                                None => write!(out, " value=<none>")?,
                            }
                        }
                    }
                    None => write!(out, " <busy>")?,
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        prefix.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, name)
    }
}

// =============================================================================
// Tests
// =============================================================================
