// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process-variable record endpoints.
//!
//! A [`RecordEndpoint`] is the control-system side of a leaf binding: it
//! stands for one process-variable record, holds the inverse link back to
//! the leaf element, and accepts processing requests from the protocol
//! side through a non-blocking intake channel.
//!
//! The intake is a tokio unbounded mpsc sender, so
//! [`RecordEndpoint::request_processing`] can be called from the protocol
//! delivery thread without ever waiting on record processing; the scan
//! side drains the matching receiver at its own pace. If the receiver is
//! gone the request is dropped and logged at debug level; retry policy
//! lives with the protocol collaborator, not here.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::leaf::LeafShared;

// =============================================================================
// ProcessReason
// =============================================================================

/// Why record processing is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessReason {
    /// New incoming data arrived for the linked leaf.
    IncomingData,

    /// A protocol-level read service completed.
    ReadComplete,

    /// A staged outgoing value was transmitted.
    WriteComplete,

    /// Connectivity or session status changed.
    ConnectionLoss,
}

impl ProcessReason {
    /// Returns the reason as a string for logging/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessReason::IncomingData => "incoming_data",
            ProcessReason::ReadComplete => "read_complete",
            ProcessReason::WriteComplete => "write_complete",
            ProcessReason::ConnectionLoss => "connection_loss",
        }
    }
}

impl fmt::Display for ProcessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ProcessRequest
// =============================================================================

/// One queued request to (re)process a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Name of the record to process.
    pub record: String,

    /// Why processing was requested.
    pub reason: ProcessReason,

    /// When the request was enqueued.
    pub requested_at: DateTime<Utc>,
}

// =============================================================================
// RecordEndpoint
// =============================================================================

/// The connector object for one process-variable record.
///
/// Exposes the three capabilities the binding tree consumes: the coarse
/// lock (reached through the linked leaf's [`LeafShared::lock`]), the
/// inverse back-reference to the linked element, and the processing
/// intake. The endpoint does not own the element's lifetime and the
/// element does not own the endpoint's; the link is a weak pair torn down
/// from either side.
pub struct RecordEndpoint {
    name: String,
    element: Mutex<Weak<LeafShared>>,
    intake: mpsc::UnboundedSender<ProcessRequest>,
}

impl RecordEndpoint {
    /// Creates an endpoint feeding processing requests into `intake`.
    pub fn new(name: impl Into<String>, intake: mpsc::UnboundedSender<ProcessRequest>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            element: Mutex::new(Weak::new()),
            intake,
        })
    }

    /// Creates an endpoint together with its processing-request receiver.
    pub fn channel(name: impl Into<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<ProcessRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(name, tx), rx)
    }

    /// Returns the record name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the linked leaf, if one is currently attached and alive.
    ///
    /// Record processing upgrades this reference, takes the leaf's coarse
    /// lock, and performs its gather-then-clear cycle under that guard.
    pub fn element(&self) -> Option<Arc<LeafShared>> {
        self.element.lock().upgrade()
    }

    /// Returns `true` if a leaf element is currently linked.
    pub fn is_linked(&self) -> bool {
        self.element().is_some()
    }

    /// Enqueues a processing request for this record.
    ///
    /// Never blocks. If the receiving side has shut down the request is
    /// dropped with a debug log entry.
    pub fn request_processing(&self, reason: ProcessReason) {
        let request = ProcessRequest {
            record: self.name.clone(),
            reason,
            requested_at: Utc::now(),
        };
        if self.intake.send(request).is_err() {
            tracing::debug!(record = %self.name, reason = %reason, "processing intake closed, request dropped");
        }
    }

    pub(crate) fn set_element(&self, element: Weak<LeafShared>) {
        *self.element.lock() = element;
    }

    pub(crate) fn clear_element(&self) {
        *self.element.lock() = Weak::new();
    }
}

impl fmt::Debug for RecordEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordEndpoint")
            .field("name", &self.name)
            .field("linked", &self.is_linked())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
