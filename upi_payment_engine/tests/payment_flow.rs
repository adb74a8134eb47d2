use chrono::{Duration, Utc};
use upg_common::Paisa;
use upi_payment_engine::{
    db_types::{NewPayment, PaymentKey, PaymentMethod, PaymentStatus, PaymentType, VerificationMethod},
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::{seed_merchant, test_merchant},
    },
    PaymentFlowApi,
    PaymentGatewayError,
    SqliteDatabase,
};

async fn new_api() -> PaymentFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    seed_merchant(&db, test_merchant("m1")).await;
    PaymentFlowApi::new(db, EventProducers::default())
}

fn upi_deposit(reference: &str, amount: i64) -> NewPayment {
    NewPayment::new(
        "m1",
        reference,
        PaymentType::Deposit,
        PaymentMethod::Upi,
        Paisa::from(amount),
        "https://m1.example.com/webhook",
    )
}

#[tokio::test]
async fn upi_deposit_gets_a_collection_uri() {
    let api = new_api().await;
    let created = api.create_payment(upi_deposit("order-1", 150_000)).await.unwrap();
    let payment = &created.payment;
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Paisa::from(150_000));
    assert_eq!(payment.fingerprint.len(), 24);
    let uri = created.upi_uri.as_deref().expect("UPI deposits must carry a collection URI");
    assert!(uri.starts_with("upi://pay?"));
    assert!(uri.contains("am=1500.00"));
    assert!(uri.contains(&format!("tn={}", payment.fingerprint)));
}

#[tokio::test]
async fn bank_transfer_deposit_has_no_uri() {
    let api = new_api().await;
    let payment = NewPayment::new(
        "m1",
        "order-bt",
        PaymentType::Deposit,
        PaymentMethod::BankTransfer,
        Paisa::from(100_000),
        "https://m1.example.com/webhook",
    )
    .with_account("Asha Rao", "00112233445566", "HDFC Bank", "HDFC0000123");
    let created = api.create_payment(payment).await.unwrap();
    assert!(created.upi_uri.is_none());
    assert_eq!(created.payment.account_number.as_deref(), Some("00112233445566"));
}

#[tokio::test]
async fn resubmitting_a_pending_reference_is_idempotent() {
    let api = new_api().await;
    let first = api.create_payment(upi_deposit("order-2", 100_000)).await.unwrap();
    let second = api.create_payment(upi_deposit("order-2", 100_000)).await.unwrap();
    assert_eq!(first.payment.id, second.payment.id);
    assert_eq!(first.payment.fingerprint, second.payment.fingerprint);
    // Once the payment settles, the reference is free again
    api.verify_payment(PaymentKey::Id(first.payment.id), "AXIS12345678901", "ops", VerificationMethod::Manual, None)
        .await
        .unwrap();
    let third = api.create_payment(upi_deposit("order-2", 100_000)).await.unwrap();
    assert_ne!(third.payment.fingerprint, first.payment.fingerprint);
}

#[tokio::test]
async fn amounts_outside_merchant_bounds_are_rejected() {
    let api = new_api().await;
    let err = api.create_payment(upi_deposit("order-small", 100)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::AmountOutOfRange { .. }));
    let err = api.create_payment(upi_deposit("order-big", 10_000_000)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::AmountOutOfRange { .. }));
    let err = api.create_payment(upi_deposit("order-zero", 0)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::ValidationError(_)));
}

#[tokio::test]
async fn unknown_merchant_is_rejected() {
    let api = new_api().await;
    let payment = NewPayment::new(
        "nobody",
        "order-1",
        PaymentType::Deposit,
        PaymentMethod::Upi,
        Paisa::from(100_000),
        "https://m1.example.com/webhook",
    );
    let err = api.create_payment(payment).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::MerchantNotFound(m) if m == "nobody"));
}

#[tokio::test]
async fn confirmed_payments_are_immutable() {
    let api = new_api().await;
    let created = api.create_payment(upi_deposit("order-3", 100_000)).await.unwrap();
    let key = PaymentKey::Fingerprint(created.payment.fingerprint.clone());
    let confirmed = api
        .verify_payment(key.clone(), "UTR112233445566", "ops@upg", VerificationMethod::Manual, Some("looks good"))
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Confirmed);
    assert_eq!(confirmed.utr.as_deref(), Some("UTR112233445566"));
    assert_eq!(confirmed.verified_by.as_deref(), Some("ops@upg"));
    assert_eq!(confirmed.verification_method, Some(VerificationMethod::Manual));
    // A second transition, either way, must fail and leave the record alone
    let err = api.verify_payment(key.clone(), "UTR999988887777", "ops@upg", VerificationMethod::Manual, None).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidStateTransition(_)));
    let err = api.decline_payment(key.clone(), "ops@upg", "changed my mind").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidStateTransition(_)));
    let unchanged = api.fetch_payment(key).await.unwrap().unwrap();
    assert_eq!(unchanged.utr.as_deref(), Some("UTR112233445566"));
    assert_eq!(unchanged.status, PaymentStatus::Confirmed);
}

#[tokio::test]
async fn a_utr_settles_exactly_one_payment() {
    let api = new_api().await;
    let p1 = api.create_payment(upi_deposit("order-4", 100_000)).await.unwrap().payment;
    let p2 = api.create_payment(upi_deposit("order-5", 100_000)).await.unwrap().payment;
    api.verify_payment(PaymentKey::Id(p1.id), "AXIS12345678901", "ops", VerificationMethod::Manual, None)
        .await
        .unwrap();
    let err = api
        .verify_payment(PaymentKey::Id(p2.id), "AXIS12345678901", "ops", VerificationMethod::Manual, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::DuplicateUtr(u) if u == "AXIS12345678901"));
    let p2 = api.fetch_payment(PaymentKey::Id(p2.id)).await.unwrap().unwrap();
    assert_eq!(p2.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn upi_deposits_need_a_merchant_upi_handle() {
    let api = new_api().await;
    let mut merchant = test_merchant("m-noupi");
    merchant.upi_id = None;
    seed_merchant(api.db(), merchant).await;
    let payment = NewPayment::new(
        "m-noupi",
        "order-nh",
        PaymentType::Deposit,
        PaymentMethod::Upi,
        Paisa::from(100_000),
        "https://noupi.example.com/webhook",
    );
    let err = api.create_payment(payment).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::ValidationError(_)));
    // The rejection happens before anything is persisted
    let since = Utc::now() - Duration::hours(1);
    assert!(api.pending_payments(Some("m-noupi"), since).await.unwrap().is_empty());
}

#[tokio::test]
async fn racing_verifications_of_one_utr_have_a_single_winner() {
    let api = new_api().await;
    let p1 = api.create_payment(upi_deposit("order-r1", 100_000)).await.unwrap().payment;
    let p2 = api.create_payment(upi_deposit("order-r2", 100_000)).await.unwrap().payment;
    let verify = |id| {
        let api = api.clone();
        async move { api.verify_payment(PaymentKey::Id(id), "UTR556677889900", "ops", VerificationMethod::Manual, None).await }
    };
    let (r1, r2) = tokio::join!(tokio::spawn(verify(p1.id)), tokio::spawn(verify(p2.id)));
    let results = [r1.unwrap(), r2.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, PaymentGatewayError::DuplicateUtr(u) if u == "UTR556677889900"));
    let mut confirmed = 0;
    for id in [p1.id, p2.id] {
        let p = api.fetch_payment(PaymentKey::Id(id)).await.unwrap().unwrap();
        if p.status == PaymentStatus::Confirmed {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 1);
}

#[tokio::test]
async fn an_empty_utr_is_no_evidence() {
    let api = new_api().await;
    let created = api.create_payment(upi_deposit("order-e1", 100_000)).await.unwrap();
    let key = PaymentKey::Id(created.payment.id);
    for utr in ["", "   "] {
        let err = api.verify_payment(key.clone(), utr, "ops", VerificationMethod::Manual, None).await.unwrap_err();
        assert!(matches!(err, PaymentGatewayError::ValidationError(_)));
    }
    let payment = api.fetch_payment(key).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn declining_records_who_and_why() {
    let api = new_api().await;
    let created = api.create_payment(upi_deposit("order-6", 100_000)).await.unwrap();
    let declined = api.decline_payment(PaymentKey::Id(created.payment.id), "ops@upg", "no funds received").await.unwrap();
    assert_eq!(declined.status, PaymentStatus::Declined);
    assert_eq!(declined.verified_by.as_deref(), Some("ops@upg"));
    assert_eq!(declined.remarks.as_deref(), Some("no funds received"));
}

#[tokio::test]
async fn customer_utr_is_stored_without_settling() {
    let api = new_api().await;
    let created = api.create_payment(upi_deposit("order-7", 100_000)).await.unwrap();
    let key = PaymentKey::Id(created.payment.id);
    let err = api.store_utr(key.clone(), "UTR1").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::ValidationError(_)));
    let payment = api.store_utr(key, "HDFC000123456789").await.unwrap();
    assert_eq!(payment.utr.as_deref(), Some("HDFC000123456789"));
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn pending_queue_filters_by_merchant_and_cutoff() {
    let api = new_api().await;
    seed_merchant(api.db(), test_merchant("m2")).await;
    api.create_payment(upi_deposit("order-8", 100_000)).await.unwrap();
    let other = NewPayment::new(
        "m2",
        "order-9",
        PaymentType::Deposit,
        PaymentMethod::Upi,
        Paisa::from(50_000),
        "https://m2.example.com/webhook",
    );
    api.create_payment(other).await.unwrap();
    let since = Utc::now() - Duration::hours(1);
    assert_eq!(api.pending_payments(None, since).await.unwrap().len(), 2);
    assert_eq!(api.pending_payments(Some("m1"), since).await.unwrap().len(), 1);
    assert!(api.pending_payments(None, Utc::now() + Duration::hours(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_payments_have_no_notification_to_resend() {
    let api = new_api().await;
    let created = api.create_payment(upi_deposit("order-10", 100_000)).await.unwrap();
    let err = api.resend_notification(&created.payment.fingerprint).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidStateTransition(_)));
    api.verify_payment(PaymentKey::Id(created.payment.id), "AXIS12345678901", "ops", VerificationMethod::Manual, None)
        .await
        .unwrap();
    let payment = api.resend_notification(&created.payment.fingerprint).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Confirmed);
}
