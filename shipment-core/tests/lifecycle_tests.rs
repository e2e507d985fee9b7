//! End-to-end lifecycle tests over the in-memory store

mod common;

use common::{booking, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shipment_core::store::FailPoint;
use shipment_core::{
    DeliveryOutcome, Error, InitializePayment, PaymentStatus, ShipmentStatus, Store,
};
use uuid::Uuid;

fn checkout(shipment_id: Uuid, amount: Decimal) -> InitializePayment {
    InitializePayment {
        shipment_id,
        amount,
        currency: "ETB".to_string(),
        customer_email: "sara@example.com".to_string(),
        customer_name: "Sara".to_string(),
    }
}

#[tokio::test]
async fn test_capacity_is_reserved_per_booking() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;

    let first = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(7), None))
        .await
        .unwrap();
    assert_eq!(first.remaining_kg, dec!(3));
    assert_eq!(first.shipment.status, ShipmentStatus::Created);
    assert_eq!(first.shipment.carrier_id, h.carrier.id);
    assert_eq!(first.shipment.fee, Decimal::ZERO);
    assert!(!first.shipment.acceptor_verified);

    let err = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(5), None))
        .await
        .unwrap_err();
    match err {
        Error::CapacityExceeded {
            requested,
            available,
        } => {
            assert_eq!(requested, dec!(5));
            assert_eq!(available, dec!(3));
        }
        other => panic!("expected capacity rejection, got {:?}", other),
    }

    assert_eq!(h.available_kg(flight.id).await, dec!(3));
    assert_eq!(h.lifecycle.carrier_shipments(h.carrier.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_booking_unknown_flight() {
    let h = Harness::new().await;
    let missing = Uuid::new_v4();

    let err = h
        .lifecycle
        .create_shipment(h.sender.id, booking(missing, dec!(1), None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FlightNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_failed_booking_leaves_no_trace() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    h.store.fail_next(FailPoint::AttachTrackingCode);

    let err = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(4), None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(h.available_kg(flight.id).await, dec!(10));
    assert!(h.lifecycle.carrier_shipments(h.carrier.id).await.unwrap().is_empty());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn test_acceptor_is_notified_with_tracking_code() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;

    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(40))))
        .await
        .unwrap();
    assert!(created.warnings.is_empty());

    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    let (phone, message) = &sent[0];
    assert_eq!(phone, "+971500000000");
    assert!(message.contains(created.shipment.tracking_code.as_str()));
    assert!(message.contains("Sara Tesfaye"));
}

#[tokio::test]
async fn test_notification_failure_becomes_warning() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    *h.notifier.failing.lock() = true;

    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), None))
        .await
        .unwrap();
    assert_eq!(created.warnings.len(), 1);

    let view = h
        .lifecycle
        .track_by_code(created.shipment.tracking_code.as_str())
        .await
        .unwrap();
    assert_eq!(view.shipment.id, created.shipment.id);
}

#[tokio::test]
async fn test_track_by_code_is_case_insensitive() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(1), None))
        .await
        .unwrap();

    let lowered = created.shipment.tracking_code.as_str().to_lowercase();
    let view = h.lifecycle.track_by_code(&format!("  {}  ", lowered)).await.unwrap();
    assert_eq!(view.shipment.id, created.shipment.id);
    assert_eq!(view.flight_summary.from, "Addis Ababa");
    assert_eq!(
        view.counterparties.carrier.map(|c| c.full_name),
        Some("Dawit Alemu".to_string())
    );

    let missing = h.lifecycle.track_by_code("SHIP-ZZZZZZZZZZ").await.unwrap_err();
    assert!(matches!(missing, Error::ShipmentNotFound(_)));
    let garbage = h.lifecycle.track_by_code("not a code").await.unwrap_err();
    assert!(matches!(garbage, Error::ShipmentNotFound(_)));
}

#[tokio::test]
async fn test_delivery_settles_and_awards_points() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();

    let outcome = h
        .lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();
    let DeliveryOutcome::Confirmed(receipt) = outcome else {
        panic!("expected a confirmed delivery");
    };

    assert_eq!(receipt.shipment.status, ShipmentStatus::Delivered);
    assert_eq!(receipt.amount_released, dec!(90));
    assert_eq!(receipt.platform_fee, dec!(10));
    assert_eq!(receipt.points_awarded, 5);
    assert_eq!(receipt.payment.status, PaymentStatus::Released);
    assert_eq!(receipt.payment.amount, dec!(100));
    assert!(receipt.payment.released_at.is_some());

    let carrier = h.carrier_account().await;
    assert_eq!(carrier.balance, dec!(90));
    assert_eq!(carrier.points, 5);
    assert_eq!(h.lifecycle.carrier_points(h.carrier.id).await.unwrap(), 5);

    let payments = h.store.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].platform_fee, Some(dec!(10)));

    // Acceptor notice plus carrier release notice
    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].0, "+251922222222");
}

#[tokio::test]
async fn test_second_confirmation_changes_nothing() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let code = created.shipment.tracking_code.as_str().to_string();

    h.lifecycle.confirm_delivery(&code).await.unwrap();
    let again = h.lifecycle.confirm_delivery(&code).await.unwrap();
    assert!(matches!(
        again,
        DeliveryOutcome::AlreadyDelivered(ref s) if s.status == ShipmentStatus::Delivered
    ));

    let carrier = h.carrier_account().await;
    assert_eq!(carrier.balance, dec!(90));
    assert_eq!(carrier.points, 5);
    assert_eq!(h.store.payments().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_settle_once() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let code = created.shipment.tracking_code.as_str().to_string();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let lifecycle = h.lifecycle.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            lifecycle.confirm_delivery(&code).await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            DeliveryOutcome::Confirmed(_) => confirmed += 1,
            DeliveryOutcome::AlreadyDelivered(_) => {}
        }
    }
    assert_eq!(confirmed, 1);

    let carrier = h.carrier_account().await;
    assert_eq!(carrier.balance, dec!(90));
    assert_eq!(carrier.points, 5);
    let released: Vec<_> = h
        .store
        .payments()
        .await
        .into_iter()
        .filter(|p| p.status == PaymentStatus::Released)
        .collect();
    assert_eq!(released.len(), 1);
}

#[tokio::test]
async fn test_failed_settlement_rolls_back_and_can_retry() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let code = created.shipment.tracking_code.as_str().to_string();

    h.store.fail_next(FailPoint::CreditPoints);
    let err = h.lifecycle.confirm_delivery(&code).await.unwrap_err();
    assert!(err.is_retryable());

    let shipment = h.store.shipment(created.shipment.id).await.unwrap().unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Created);
    assert!(h.store.payments().await.is_empty());
    let carrier = h.carrier_account().await;
    assert_eq!(carrier.balance, Decimal::ZERO);
    assert_eq!(carrier.points, 0);

    let retried = h.lifecycle.confirm_delivery(&code).await.unwrap();
    assert!(matches!(retried, DeliveryOutcome::Confirmed(_)));
    let carrier = h.carrier_account().await;
    assert_eq!(carrier.balance, dec!(90));
    assert_eq!(carrier.points, 5);
}

#[tokio::test]
async fn test_zero_fee_delivery_still_awards_points() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), None))
        .await
        .unwrap();

    let outcome = h
        .lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();
    let DeliveryOutcome::Confirmed(receipt) = outcome else {
        panic!("expected a confirmed delivery");
    };
    assert_eq!(receipt.amount_released, Decimal::ZERO);
    assert_eq!(receipt.points_awarded, 5);

    let carrier = h.carrier_account().await;
    assert_eq!(carrier.balance, Decimal::ZERO);
    assert_eq!(carrier.points, 5);
}

#[tokio::test]
async fn test_checkout_then_verify_then_release() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let escrow = h.lifecycle.escrow();

    let opened = escrow
        .initialize(checkout(created.shipment.id, dec!(100)))
        .await
        .unwrap();
    assert_eq!(opened.payment.status, PaymentStatus::Pending);
    let reference = opened.payment.reference.clone();
    assert!(reference.starts_with(&format!("shipment_{}_", created.shipment.id)));
    assert!(opened.checkout_url.ends_with(&reference));

    // Failed verification leaves the payment pending
    let err = escrow.verify(&reference).await.unwrap_err();
    assert!(matches!(err, Error::VerificationFailed(_)));

    h.gateway.set_outcome(&reference, true);
    let paid = escrow.verify(&reference).await.unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);

    // Repeat verification does not call the gateway again
    let calls = h.gateway.verify_count();
    let again = escrow.verify(&reference).await.unwrap();
    assert_eq!(again.status, PaymentStatus::Paid);
    assert_eq!(h.gateway.verify_count(), calls);

    let outcome = h
        .lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();
    let DeliveryOutcome::Confirmed(receipt) = outcome else {
        panic!("expected a confirmed delivery");
    };
    assert_eq!(receipt.payment.reference, reference);
    assert_eq!(receipt.payment.status, PaymentStatus::Released);

    let payments = escrow.payments_for_shipment(created.shipment.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].platform_fee, Some(dec!(10)));
}

#[tokio::test]
async fn test_pending_payment_is_released_on_delivery() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(50))))
        .await
        .unwrap();

    let opened = h
        .lifecycle
        .escrow()
        .initialize(checkout(created.shipment.id, dec!(50)))
        .await
        .unwrap();

    h.lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();

    let payments = h.store.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].reference, opened.payment.reference);
    assert_eq!(payments[0].status, PaymentStatus::Released);
    assert_eq!(h.carrier_account().await.balance, dec!(45));
}

#[tokio::test]
async fn test_gateway_rejection_records_nothing() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(50))))
        .await
        .unwrap();
    *h.gateway.reject_initialize.lock() = true;

    let err = h
        .lifecycle
        .escrow()
        .initialize(checkout(created.shipment.id, dec!(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Gateway(_)));
    assert!(h.store.payments().await.is_empty());
}

#[tokio::test]
async fn test_gateway_assigned_reference_is_kept() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(50))))
        .await
        .unwrap();
    *h.gateway.assigned_reference.lock() = Some("chapa-tx-001".to_string());

    let opened = h
        .lifecycle
        .escrow()
        .initialize(checkout(created.shipment.id, dec!(50)))
        .await
        .unwrap();
    assert_eq!(opened.payment.reference, "chapa-tx-001");

    let unknown = h.lifecycle.escrow().verify("chapa-tx-404").await.unwrap_err();
    assert!(matches!(unknown, Error::PaymentNotFound(_)));
}

#[tokio::test]
async fn test_checkout_for_delivered_shipment_is_rejected() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(50))))
        .await
        .unwrap();
    h.lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();

    let err = h
        .lifecycle
        .escrow()
        .initialize(checkout(created.shipment.id, dec!(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.gateway.initialize_calls.lock().is_empty());
}

#[tokio::test]
async fn test_repeated_checkout_reuses_pending_payment() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let escrow = h.lifecycle.escrow();

    let first = escrow
        .initialize(checkout(created.shipment.id, dec!(100)))
        .await
        .unwrap();
    let second = escrow
        .initialize(checkout(created.shipment.id, dec!(100)))
        .await
        .unwrap();
    assert_eq!(second.payment.id, first.payment.id);
    assert_eq!(second.payment.reference, first.payment.reference);
    assert_eq!(h.store.payments().await.len(), 1);

    let calls = h.gateway.initialize_calls.lock().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].reference, first.payment.reference);

    h.lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();

    // A late gateway redirect finds the payment already released
    h.gateway.set_outcome(&first.payment.reference, true);
    let late = escrow.verify(&first.payment.reference).await.unwrap();
    assert_eq!(late.status, PaymentStatus::Released);

    let payments = h.store.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Released);
}

#[tokio::test]
async fn test_checkout_after_payment_is_refused() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let escrow = h.lifecycle.escrow();

    let opened = escrow
        .initialize(checkout(created.shipment.id, dec!(100)))
        .await
        .unwrap();
    h.gateway.set_outcome(&opened.payment.reference, true);
    escrow.verify(&opened.payment.reference).await.unwrap();

    let err = escrow
        .initialize(checkout(created.shipment.id, dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PaymentInProgress(ref r) if *r == opened.payment.reference));

    let err = escrow
        .initialize(checkout(created.shipment.id, dec!(80)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PaymentInProgress(_)));

    assert_eq!(h.gateway.initialize_calls.lock().len(), 1);
    assert_eq!(h.store.payments().await.len(), 1);
}

#[tokio::test]
async fn test_repeated_checkout_with_other_amount_is_rejected() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let escrow = h.lifecycle.escrow();

    escrow
        .initialize(checkout(created.shipment.id, dec!(100)))
        .await
        .unwrap();
    let err = escrow
        .initialize(checkout(created.shipment.id, dec!(120)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.store.payments().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delivery_during_checkout_leaves_no_pending_payment() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;
    let created = h
        .lifecycle
        .create_shipment(h.sender.id, booking(flight.id, dec!(2), Some(dec!(100))))
        .await
        .unwrap();
    let (entered, release) = h.gateway.hold_initialize();

    let escrow = h.lifecycle.escrow().clone();
    let shipment_id = created.shipment.id;
    let pending_checkout =
        tokio::spawn(async move { escrow.initialize(checkout(shipment_id, dec!(100))).await });

    // Deliver while the checkout is parked inside the gateway
    entered.notified().await;
    let outcome = h
        .lifecycle
        .confirm_delivery(created.shipment.tracking_code.as_str())
        .await
        .unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Confirmed(_)));
    release.notify_one();

    let err = pending_checkout.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let payments = h.store.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Released);
    assert!(payments[0].reference.starts_with("SETTLE-"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_oversell() {
    let h = Harness::new().await;
    let flight = h.flight(dec!(10)).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let lifecycle = h.lifecycle.clone();
        let sender_id = h.sender.id;
        let request = booking(flight.id, dec!(3), None);
        handles.push(tokio::spawn(async move {
            lifecycle.create_shipment(sender_id, request).await
        }));
    }

    let mut booked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(Error::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(booked, 3);
    assert_eq!(h.available_kg(flight.id).await, dec!(1));
}

#[tokio::test]
async fn test_available_flights_lists_carrier() {
    let h = Harness::new().await;
    let open = h.flight(dec!(10)).await;
    let full = h.flight(dec!(2)).await;
    h.lifecycle
        .create_shipment(h.sender.id, booking(full.id, dec!(2), None))
        .await
        .unwrap();

    let flights = h.lifecycle.available_flights().await.unwrap();
    assert_eq!(flights.len(), 1);
    assert_eq!(flights[0].flight.id, open.id);
    assert_eq!(
        flights[0].carrier.as_ref().map(|c| c.phone.as_str()),
        Some("+251922222222")
    );
}

#[tokio::test]
async fn test_points_for_unknown_user() {
    let h = Harness::new().await;
    let err = h.lifecycle.carrier_points(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::UserNotFound(_)));
}
