// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Leaf binding state and the coarse endpoint lock.
//!
//! A leaf element is the only place where the protocol side and the
//! record-processing side touch the same data, so its mutable state lives
//! behind a single `parking_lot` mutex shared by both: [`LeafShared`].
//! The tree holds the one strong reference; a linked [`RecordEndpoint`]
//! holds a weak back-reference. Since an endpoint links to at most one
//! leaf, this is exactly one lock per endpoint↔element relationship,
//! never one lock per operation.
//!
//! All accessors live on [`LeafGuard`], the RAII guard returned by
//! [`LeafShared::lock`]. Holding the guard across a full
//! "read everything, then clear" sequence is what gives the processing
//! side a consistent snapshot for one processing cycle.
//!
//! # State model
//!
//! The incoming slot cycles `empty → pending → consumed → empty`; pending
//! updates queue FIFO up to the leaf's capacity, and
//! [`LeafGuard::clear_incoming_data`] pops exactly one entry per cycle.
//! The outgoing slot cycles `idle → staged → in-flight → idle`
//! independently: a write accessor stages a value, the protocol
//! collaborator takes it with [`LeafGuard::take_outgoing`]. None of the
//! accessors ever blocks on network I/O.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};

use crate::endpoint::RecordEndpoint;
use crate::error::{ConversionError, ConversionResult};
use crate::types::{UpdateEvent, Variant, VariantKind};

/// Default incoming-queue capacity: a single-slot "latest value" buffer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

// =============================================================================
// LeafShared
// =============================================================================

/// The shared half of a leaf binding.
///
/// Jointly referenced by the owning tree element (strongly) and the
/// linked endpoint (weakly). The contained mutex is the coarse lock that
/// guards every incoming/outgoing access on this leaf.
#[derive(Debug)]
pub struct LeafShared {
    /// Declared server-side type of this leaf, fixed at decode time.
    kind: VariantKind,

    /// Incoming queue capacity, fixed at construction.
    capacity: usize,

    /// Back-reference to the linked endpoint. Kept outside the state lock;
    /// rebinds are serialized by the caller (configuration phase), not by
    /// the data lock.
    endpoint: Mutex<Weak<RecordEndpoint>>,

    /// The coarse lock and the slots it protects.
    state: Mutex<LeafState>,
}

#[derive(Debug, Default)]
struct LeafState {
    incoming: VecDeque<UpdateEvent>,
    outgoing: Option<Variant>,
    read_ok: bool,
    write_ok: bool,
    discarded: u64,
}

impl LeafShared {
    pub(crate) fn new(kind: VariantKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            endpoint: Mutex::new(Weak::new()),
            state: Mutex::new(LeafState::default()),
        }
    }

    /// Returns the declared server-side type of this leaf.
    #[inline]
    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    /// Returns the incoming queue capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquires the coarse lock and returns the accessor guard.
    ///
    /// Hold the guard across the full gather-then-clear sequence of one
    /// processing cycle.
    pub fn lock(&self) -> LeafGuard<'_> {
        LeafGuard {
            kind: self.kind,
            capacity: self.capacity,
            state: self.state.lock(),
        }
    }

    /// Tries to acquire the coarse lock without blocking.
    ///
    /// Used by diagnostic output, which must be safe to call at any time.
    pub fn try_lock(&self) -> Option<LeafGuard<'_>> {
        self.state.try_lock().map(|state| LeafGuard {
            kind: self.kind,
            capacity: self.capacity,
            state,
        })
    }

    /// Returns the linked endpoint, if one is currently attached and alive.
    pub fn endpoint(&self) -> Option<Arc<RecordEndpoint>> {
        self.endpoint.lock().upgrade()
    }

    /// Returns `true` if an endpoint is currently linked.
    pub fn is_linked(&self) -> bool {
        self.endpoint().is_some()
    }

    pub(crate) fn take_endpoint(&self) -> Weak<RecordEndpoint> {
        std::mem::take(&mut *self.endpoint.lock())
    }

    pub(crate) fn set_endpoint(&self, endpoint: Weak<RecordEndpoint>) {
        *self.endpoint.lock() = endpoint;
    }

    /// Clears the endpoint slot only if it still points at `endpoint`.
    pub(crate) fn clear_endpoint_if(&self, endpoint: &Arc<RecordEndpoint>) {
        let mut slot = self.endpoint.lock();
        if slot.as_ptr() == Arc::as_ptr(endpoint) {
            *slot = Weak::new();
        }
    }
}

// =============================================================================
// LeafGuard
// =============================================================================

/// Accessor guard over a leaf's slots; holds the coarse endpoint lock.
///
/// Read accessors operate on the oldest pending incoming update; write
/// accessors convert to the leaf's declared type and stage the result in
/// the outgoing slot. Conversion failures are surfaced to the caller,
/// never swallowed.
pub struct LeafGuard<'a> {
    kind: VariantKind,
    capacity: usize,
    state: MutexGuard<'a, LeafState>,
}

impl LeafGuard<'_> {
    fn head(&self) -> ConversionResult<&UpdateEvent> {
        self.state.incoming.front().ok_or(ConversionError::NoData)
    }

    // =========================================================================
    // Read contract (processing side)
    // =========================================================================

    /// Reads the timestamp of the current incoming update.
    ///
    /// `server` selects the server timestamp; otherwise the device/source
    /// timestamp is returned. With no incoming data present this returns
    /// the Unix epoch (the documented "zero" result) rather than failing;
    /// timestamps are metadata, not converted data.
    pub fn read_timestamp(&self, server: bool) -> DateTime<Utc> {
        match self.state.incoming.front() {
            Some(e) if server => e.server_time,
            Some(e) => e.source_time,
            None => DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Reads the current incoming value as `i32`.
    pub fn read_int32(&self) -> ConversionResult<i32> {
        self.head()?.value.to_i32()
    }

    /// Reads the current incoming value as `u32`.
    pub fn read_uint32(&self) -> ConversionResult<u32> {
        self.head()?.value.to_u32()
    }

    /// Reads the current incoming value as `f64`.
    pub fn read_float64(&self) -> ConversionResult<f64> {
        self.head()?.value.to_f64()
    }

    /// Copies the textual form of the current incoming value into `buf`.
    ///
    /// At most `buf.len() - 1` bytes are written and the result is always
    /// NUL-terminated; longer text is truncated (at a byte, not character,
    /// boundary, classic C string semantics). Fails if `buf` is empty,
    /// if no data is present, or if the value has no textual form.
    pub fn read_cstring(&self, buf: &mut [u8]) -> ConversionResult<()> {
        if buf.is_empty() {
            return Err(ConversionError::EmptyBuffer);
        }
        let text = self.head()?.value.to_text()?;
        let n = text.len().min(buf.len() - 1);
        buf[..n].copy_from_slice(&text.as_bytes()[..n]);
        buf[n] = 0;
        Ok(())
    }

    /// Reports whether the most recent protocol-level read completed
    /// successfully.
    ///
    /// This reflects the current pending update if one exists, otherwise
    /// the most recently consumed one. It is independent of the outcome
    /// of any conversion call, and `false` before the first delivery.
    pub fn read_was_ok(&self) -> bool {
        self.state.incoming.front().map_or(self.state.read_ok, |e| e.ok)
    }

    /// Discards the current (oldest) incoming update.
    ///
    /// Called after all read accessors for the cycle have completed,
    /// still under this guard. If further updates are queued, the next
    /// one becomes visible to subsequent reads; otherwise the slot is
    /// empty again.
    pub fn clear_incoming_data(&mut self) {
        if let Some(consumed) = self.state.incoming.pop_front() {
            self.state.read_ok = consumed.ok;
        }
    }

    // =========================================================================
    // Write contract (processing side)
    // =========================================================================

    /// Stages an `i32` as the outgoing value, converting to the leaf's
    /// declared type. Out-of-range values are rejected, never saturated.
    pub fn write_int32(&mut self, value: i32) -> ConversionResult<()> {
        self.state.outgoing = Some(Variant::from_i32(self.kind, value)?);
        Ok(())
    }

    /// Stages a `u32` as the outgoing value.
    pub fn write_uint32(&mut self, value: u32) -> ConversionResult<()> {
        self.state.outgoing = Some(Variant::from_u32(self.kind, value)?);
        Ok(())
    }

    /// Stages an `f64` as the outgoing value.
    pub fn write_float64(&mut self, value: f64) -> ConversionResult<()> {
        self.state.outgoing = Some(Variant::from_f64(self.kind, value)?);
        Ok(())
    }

    /// Stages text as the outgoing value.
    ///
    /// Up to `num - 1` bytes of `value` are used, stopping at the first
    /// NUL byte; if that limit splits a multi-byte character, the text is
    /// trimmed back to the last complete character. Fails if the leaf's
    /// declared type cannot hold text or the bytes are not valid UTF-8.
    pub fn write_cstring(&mut self, value: &[u8], num: usize) -> ConversionResult<()> {
        let limit = num.saturating_sub(1).min(value.len());
        let end = value[..limit]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(limit);
        let text = match std::str::from_utf8(&value[..end]) {
            Ok(text) => text,
            // only a partial character at the cut point: trim it off
            Err(e) if e.error_len().is_none() => std::str::from_utf8(&value[..e.valid_up_to()])
                .map_err(|_| ConversionError::type_mismatch("string", "non-utf8 bytes"))?,
            Err(_) => return Err(ConversionError::type_mismatch("string", "non-utf8 bytes")),
        };
        self.state.outgoing = Some(Variant::from_text(self.kind, text)?);
        Ok(())
    }

    /// Reports whether the most recent outgoing transmission completed
    /// successfully.
    ///
    /// Distinct from the staging calls above, which only buffer the
    /// value; the protocol collaborator records the transmission outcome
    /// via [`LeafGuard::set_write_status`]. `false` before the first
    /// transmission.
    pub fn write_was_ok(&self) -> bool {
        self.state.write_ok
    }

    // =========================================================================
    // Protocol side
    // =========================================================================

    /// Enqueues an incoming update.
    ///
    /// When the queue is full the oldest pending update is discarded so
    /// the newest data is never lost; discards are counted and logged.
    pub fn push_incoming(&mut self, event: UpdateEvent) {
        if self.state.incoming.len() >= self.capacity {
            self.state.incoming.pop_front();
            self.state.discarded += 1;
            tracing::debug!(
                capacity = self.capacity,
                discarded = self.state.discarded,
                "incoming queue full, oldest update discarded"
            );
        }
        self.state.incoming.push_back(event);
    }

    /// Takes the staged outgoing value for transmission, leaving the
    /// outgoing slot idle.
    pub fn take_outgoing(&mut self) -> Option<Variant> {
        self.state.outgoing.take()
    }

    /// Records the outcome of the most recent outgoing transmission.
    pub fn set_write_status(&mut self, ok: bool) {
        self.state.write_ok = ok;
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the leaf's declared server-side type.
    #[inline]
    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    /// Number of pending incoming updates.
    #[inline]
    pub fn pending(&self) -> usize {
        self.state.incoming.len()
    }

    /// Number of updates discarded due to queue overflow.
    #[inline]
    pub fn discarded(&self) -> u64 {
        self.state.discarded
    }

    /// The currently staged outgoing value, if any.
    #[inline]
    pub fn staged(&self) -> Option<&Variant> {
        self.state.outgoing.as_ref()
    }

    /// The current incoming value, if any, without consuming it.
    #[inline]
    pub fn current(&self) -> Option<&Variant> {
        self.state.incoming.front().map(|e| &e.value)
    }
}

// =============================================================================
// Tests
// =============================================================================
