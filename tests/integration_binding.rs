// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Binding Integration Tests
//!
//! End-to-end tests for the binding tree, driving the full cycle a
//! subscribed item goes through in production:
//!
//! - `test_incoming_*`: protocol delivery, fan-out, record-side reads
//! - `test_outgoing_*`: record-side writes, protocol-side collection
//! - `test_link_*`: record attachment, relinking, teardown
//! - `test_processing_*`: processing intake behavior

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use pvbind::{
    ConversionError, DataElement, ProcessReason, RecordEndpoint, Variant, VariantKind,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Installs the test log subscriber once; honors `RUST_LOG`.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A plant item shaped like a small motor-control structure:
///
/// ```text
/// <root>
///   status   : uint16
///   motor
///     speed  : double
///     label  : string
/// ```
fn motor_item() -> DataElement {
    DataElement::root()
        .with_child(DataElement::leaf("status", VariantKind::UInt16))
        .with_child(
            DataElement::node("motor")
                .with_child(DataElement::leaf("speed", VariantKind::Double))
                .with_child(DataElement::leaf("label", VariantKind::String)),
        )
}

fn motor_update(speed: f64) -> Variant {
    Variant::Struct(vec![
        ("status".into(), Variant::UInt16(1)),
        (
            "motor".into(),
            Variant::Struct(vec![
                ("speed".into(), Variant::Double(speed)),
                ("label".into(), Variant::String("axis-1".into())),
            ]),
        ),
    ])
}

fn t1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

// =============================================================================
// Incoming Cycle
// =============================================================================

#[tokio::test]
async fn test_incoming_full_cycle() {
    init_tracing();
    let item = motor_item();
    let (endpoint, mut intake) = RecordEndpoint::channel("ai:motor-speed");
    item.find("motor.speed")
        .expect("leaf exists")
        .set_endpoint_link(Some(&endpoint));

    // Protocol side: a decoded update arrives and processing is requested.
    item.set_incoming(motor_update(1450.5), t1(), t1(), true);
    item.request_record_processing(ProcessReason::IncomingData);

    // Record side: the scheduled request names the record and reason.
    let request = intake.recv().await.expect("request queued");
    assert_eq!(request.record, "ai:motor-speed");
    assert_eq!(request.reason, ProcessReason::IncomingData);

    // Record processing: read under the leaf lock, then consume.
    let leaf = item.find_leaf("motor.speed").expect("leaf exists");
    {
        let mut guard = leaf.lock();
        assert_eq!(guard.read_float64(), Ok(1450.5));
        assert_eq!(guard.read_timestamp(true), t1());
        assert!(guard.read_was_ok());
        guard.clear_incoming_data();
    }

    // The consumed slot is gone; a second processing pass sees no data.
    assert_eq!(leaf.lock().read_float64(), Err(ConversionError::NoData));
}

#[tokio::test]
async fn test_incoming_repeated_reads_see_same_event() {
    let item = motor_item();
    item.set_incoming(motor_update(2.5), t1(), t1(), true);

    // Reads do not consume; only clear_incoming_data does.
    let leaf = item.find_leaf("motor.speed").expect("leaf exists");
    let guard = leaf.lock();
    assert_eq!(guard.read_float64(), Ok(2.5));
    assert_eq!(guard.read_float64(), Ok(2.5));
    assert_eq!(guard.read_timestamp(false), t1());
}

#[tokio::test]
async fn test_incoming_string_read_truncates_to_buffer() {
    let item = motor_item();
    item.set_incoming(motor_update(0.0), t1(), t1(), true);

    let leaf = item.find_leaf("motor.label").expect("leaf exists");
    let mut buf = [0xFFu8; 4];
    leaf.lock().read_cstring(&mut buf).expect("conversion ok");

    // "axis-1" truncated to 3 bytes plus terminator.
    assert_eq!(&buf, b"axi\0");
}

#[tokio::test]
async fn test_incoming_overflow_is_rejected_not_clamped() {
    let item = DataElement::root().with_child(DataElement::leaf("raw", VariantKind::UInt32));
    item.set_incoming(
        Variant::Struct(vec![("raw".into(), Variant::UInt32(4_000_000_000))]),
        t1(),
        t1(),
        true,
    );

    let leaf = item.find_leaf("raw").expect("leaf exists");
    let mut guard = leaf.lock();

    // The value does not fit an i32; the record conversion fails while
    // the wider conversions still succeed on the same queued event.
    assert!(matches!(guard.read_int32(), Err(ConversionError::Overflow { .. })));
    assert_eq!(guard.read_uint32(), Ok(4_000_000_000));
    assert_eq!(guard.read_float64(), Ok(4_000_000_000.0));
}

#[tokio::test]
async fn test_incoming_queue_drops_oldest() {
    // capacity 2: the third update evicts the first
    let tree = DataElement::root()
        .with_child(DataElement::leaf_with_capacity("x", VariantKind::Int32, 2));
    for n in [1, 2, 3] {
        tree.set_incoming(
            Variant::Struct(vec![("x".into(), Variant::Int32(n))]),
            t1(),
            t1(),
            true,
        );
    }

    let leaf = tree.find_leaf("x").expect("leaf exists");
    let mut guard = leaf.lock();
    assert_eq!(guard.pending(), 2);
    assert_eq!(guard.discarded(), 1);
    assert_eq!(guard.read_int32(), Ok(2));
    guard.clear_incoming_data();
    assert_eq!(guard.read_int32(), Ok(3));
}

#[tokio::test]
async fn test_incoming_connection_loss_marks_read_failed() {
    let item = motor_item();
    let (endpoint, mut intake) = RecordEndpoint::channel("ai:status");
    item.find("status")
        .expect("leaf exists")
        .set_endpoint_link(Some(&endpoint));

    // A failed read service still delivers an event so the record sees
    // the failure and its timestamp.
    item.set_incoming(motor_update(0.0), t1(), t1(), false);
    item.request_record_processing(ProcessReason::ConnectionLoss);

    let request = intake.recv().await.expect("request queued");
    assert_eq!(request.reason, ProcessReason::ConnectionLoss);

    let leaf = item.find_leaf("status").expect("leaf exists");
    assert!(!leaf.lock().read_was_ok());
}

// =============================================================================
// Outgoing Cycle
// =============================================================================

#[tokio::test]
async fn test_outgoing_full_cycle() {
    init_tracing();
    let item = motor_item();
    let (endpoint, mut intake) = RecordEndpoint::channel("ao:motor-speed");
    item.find("motor.speed")
        .expect("leaf exists")
        .set_endpoint_link(Some(&endpoint));

    // Record side: stage a setpoint.
    let leaf = item.find_leaf("motor.speed").expect("leaf exists");
    leaf.lock().write_float64(1800.0).expect("stage ok");

    // Protocol side: collect staged values across the item.
    let mut staged = Vec::new();
    item.visit_leaves(|path, shared| {
        if let Some(value) = shared.lock().take_outgoing() {
            staged.push((path.to_string(), value));
        }
    });
    assert_eq!(staged, vec![("motor.speed".to_string(), Variant::Double(1800.0))]);

    // Write service completes; the record is scheduled to observe it.
    leaf.lock().set_write_status(true);
    endpoint.request_processing(ProcessReason::WriteComplete);

    let request = intake.recv().await.expect("request queued");
    assert_eq!(request.reason, ProcessReason::WriteComplete);
    assert!(leaf.lock().write_was_ok());

    // The staged slot was consumed by the collection pass.
    assert_eq!(leaf.lock().take_outgoing(), None);
}

#[tokio::test]
async fn test_outgoing_write_converts_to_leaf_type() {
    let item = motor_item();
    let leaf = item.find_leaf("status").expect("leaf exists");

    // The record writes an i32; the staged value carries the wire type.
    leaf.lock().write_int32(7).expect("stage ok");
    assert_eq!(leaf.lock().take_outgoing(), Some(Variant::UInt16(7)));

    // Out-of-range stages nothing.
    assert!(matches!(
        leaf.lock().write_int32(-1),
        Err(ConversionError::Overflow { .. })
    ));
    assert_eq!(leaf.lock().take_outgoing(), None);
}

#[tokio::test]
async fn test_outgoing_cstring_respects_record_capacity() {
    let item = motor_item();
    let leaf = item.find_leaf("motor.label").expect("leaf exists");

    // A 6-byte record buffer holds 5 chars plus the terminator.
    leaf.lock().write_cstring(b"hello world", 6).expect("stage ok");
    assert_eq!(
        leaf.lock().take_outgoing(),
        Some(Variant::String("hello".into()))
    );
}

#[tokio::test]
async fn test_outgoing_restage_replaces_pending_value() {
    let item = motor_item();
    let leaf = item.find_leaf("motor.speed").expect("leaf exists");

    leaf.lock().write_float64(10.0).expect("stage ok");
    leaf.lock().write_float64(20.0).expect("stage ok");

    // Only the latest setpoint goes out.
    assert_eq!(leaf.lock().take_outgoing(), Some(Variant::Double(20.0)));
    assert_eq!(leaf.lock().take_outgoing(), None);
}

#[tokio::test]
async fn test_outgoing_echo_round_trip() {
    // The written value comes back as an update, as a readback
    // subscription would deliver it.
    let item = motor_item();
    let leaf = item.find_leaf("motor.speed").expect("leaf exists");

    leaf.lock().write_float64(333.25).expect("stage ok");
    let wire = leaf.lock().take_outgoing().expect("staged");
    item.set_incoming(
        Variant::Struct(vec![(
            "motor".into(),
            Variant::Struct(vec![("speed".into(), wire)]),
        )]),
        t1(),
        t1(),
        true,
    );

    assert_eq!(leaf.lock().read_float64(), Ok(333.25));
}

// =============================================================================
// Linkage
// =============================================================================

#[tokio::test]
async fn test_link_relink_moves_processing_target() {
    let item = motor_item();
    let leaf_elem = item.find("motor.speed").expect("leaf exists");
    let (e1, mut rx1) = RecordEndpoint::channel("ai:old");
    let (e2, mut rx2) = RecordEndpoint::channel("ai:new");

    leaf_elem.set_endpoint_link(Some(&e1));
    leaf_elem.set_endpoint_link(Some(&e2));

    item.request_record_processing(ProcessReason::IncomingData);

    // Only the current endpoint is scheduled; the old one is fully detached.
    assert!(rx1.try_recv().is_err());
    assert_eq!(rx2.try_recv().expect("queued").record, "ai:new");
    assert!(!e1.is_linked());
    assert!(Arc::ptr_eq(
        &e2.element().expect("back-ref"),
        leaf_elem.as_leaf().expect("leaf")
    ));
}

#[tokio::test]
async fn test_link_survives_endpoint_drop() {
    let item = motor_item();
    let leaf_elem = item.find("motor.speed").expect("leaf exists");
    {
        let (endpoint, _rx) = RecordEndpoint::channel("ai:transient");
        leaf_elem.set_endpoint_link(Some(&endpoint));
    }

    // The endpoint is gone; the weak link lapses and requests are dropped
    // without panicking.
    assert!(!leaf_elem.as_leaf().expect("leaf").is_linked());
    item.request_record_processing(ProcessReason::IncomingData);
}

// =============================================================================
// Processing Intake
// =============================================================================

#[tokio::test]
async fn test_processing_intake_closed_is_nonfatal() {
    let item = motor_item();
    let (endpoint, intake) = RecordEndpoint::channel("ai:gone");
    item.find("status")
        .expect("leaf exists")
        .set_endpoint_link(Some(&endpoint));
    drop(intake);

    // The record task went away; the protocol thread must not block or
    // panic when it keeps scheduling.
    item.request_record_processing(ProcessReason::IncomingData);
    item.request_record_processing(ProcessReason::ConnectionLoss);
}

#[tokio::test]
async fn test_processing_requests_preserve_order() {
    let (endpoint, mut intake) = RecordEndpoint::channel("ai:seq");

    endpoint.request_processing(ProcessReason::IncomingData);
    endpoint.request_processing(ProcessReason::WriteComplete);
    endpoint.request_processing(ProcessReason::ConnectionLoss);

    assert_eq!(intake.recv().await.expect("1st").reason, ProcessReason::IncomingData);
    assert_eq!(intake.recv().await.expect("2nd").reason, ProcessReason::WriteComplete);
    assert_eq!(intake.recv().await.expect("3rd").reason, ProcessReason::ConnectionLoss);
}
