use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::{watch, Mutex},
};
use upg_common::Paisa;
use upi_payment_engine::{
    db_types::{NewPayment, Payment, PaymentKey, PaymentMethod, PaymentType, VerificationMethod},
    events::{EventHandlers, EventHooks, EventProducers},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::{seed_merchant, test_merchant},
    },
    webhook::{register_dispatcher_hooks, verify_signature, WebhookConfig, WebhookDispatcher, WebhookPayload},
    PaymentFlowApi,
    SqliteDatabase,
};

#[derive(Clone)]
struct MockEndpoint {
    url: String,
    hits: Arc<AtomicUsize>,
    /// (signature, body) of the last request that got a 200.
    accepted: Arc<Mutex<Option<(String, String)>>>,
}

/// A bare TCP HTTP endpoint that returns 500 for the first `fail_first` requests and 200
/// afterwards.
async fn mock_endpoint(fail_first: usize) -> MockEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Error binding mock endpoint");
    let addr = listener.local_addr().expect("No local address");
    let endpoint = MockEndpoint {
        url: format!("http://{addr}/webhook"),
        hits: Arc::new(AtomicUsize::new(0)),
        accepted: Arc::new(Mutex::new(None)),
    };
    let hits = endpoint.hits.clone();
    let accepted = endpoint.accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            let n = hits.fetch_add(1, Ordering::SeqCst);
            let request = read_request(&mut sock).await;
            let response = if n < fail_first {
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            } else {
                if let Some(parsed) = parse_request(&request) {
                    *accepted.lock().await = Some(parsed);
                }
                "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            };
            let _ = sock.write_all(response.as_bytes()).await;
        }
    });
    endpoint
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
    let mut buf = vec![0u8; 16384];
    let mut read = 0;
    loop {
        match sock.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => break,
            Ok(k) => read += k,
        }
        let text = String::from_utf8_lossy(&buf[..read]);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text
                .lines()
                .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>()))
                .and_then(Result::ok)
                .unwrap_or(0);
            if read >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf[..read]).to_string()
}

fn parse_request(request: &str) -> Option<(String, String)> {
    let (headers, body) = request.split_once("\r\n\r\n")?;
    let signature = headers
        .lines()
        .find(|l| l.to_lowercase().starts_with("x-webhook-signature:"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())?;
    Some((signature, body.to_string()))
}

async fn new_flow() -> PaymentFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    seed_merchant(&db, test_merchant("m1")).await;
    PaymentFlowApi::new(db, EventProducers::default())
}

fn fast_config(max_attempts: u32) -> WebhookConfig {
    WebhookConfig {
        max_attempts,
        retry_delay: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        danger_accept_invalid_certs: false,
    }
}

async fn confirmed_payment(flow: &PaymentFlowApi<SqliteDatabase>, callback_url: &str, utr: &str) -> Payment {
    let payment = NewPayment::new(
        "m1",
        format!("order-{utr}"),
        PaymentType::Deposit,
        PaymentMethod::Upi,
        Paisa::from(100_000),
        callback_url,
    );
    let created = flow.create_payment(payment).await.unwrap();
    flow.verify_payment(PaymentKey::Id(created.payment.id), utr, "ops@upg", VerificationMethod::Manual, Some("ok"))
        .await
        .unwrap()
}

#[tokio::test]
async fn delivery_retries_until_success_and_signs_the_payload() {
    let endpoint = mock_endpoint(1).await;
    let flow = new_flow().await;
    let payment = confirmed_payment(&flow, &endpoint.url, "AXIS12345678901").await;
    let (_tx, shutdown) = watch::channel(false);
    let dispatcher = WebhookDispatcher::new(flow.db().clone(), fast_config(3), shutdown).unwrap();
    dispatcher.deliver(payment.clone()).await;

    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 2);
    let stored = flow.fetch_payment(PaymentKey::Id(payment.id)).await.unwrap().unwrap();
    assert!(stored.delivered);
    assert_eq!(stored.delivery_attempts, 2);
    assert_eq!(stored.last_delivery_response.as_deref(), Some("HTTP 200 OK"));

    let (signature, body) = endpoint.accepted.lock().await.clone().expect("No request was accepted");
    assert!(verify_signature("secret-m1", &body, &signature));
    let payload: WebhookPayload = serde_json::from_str(&body).unwrap();
    assert_eq!(payload.reference_id, payment.fingerprint);
    assert_eq!(payload.status, 2);
    assert_eq!(payload.amount, "1000.00");
    assert_eq!(payload.remarks, "ok");
}

#[tokio::test]
async fn failed_deliveries_are_swept_up_later() {
    let endpoint = mock_endpoint(1).await;
    let flow = new_flow().await;
    let payment = confirmed_payment(&flow, &endpoint.url, "HDFC000123456789").await;
    let (_tx, shutdown) = watch::channel(false);
    // A single-attempt dispatcher gives up after the first 500
    let one_shot = WebhookDispatcher::new(flow.db().clone(), fast_config(1), shutdown.clone()).unwrap();
    one_shot.deliver(payment.clone()).await;
    let stored = flow.fetch_payment(PaymentKey::Id(payment.id)).await.unwrap().unwrap();
    assert!(!stored.delivered);
    assert_eq!(stored.delivery_attempts, 1);

    // The sweep finds it and gets it through
    let sweeper = WebhookDispatcher::new(flow.db().clone(), fast_config(3), shutdown).unwrap();
    let swept = sweeper.redeliver_unsent(10).await.unwrap();
    assert_eq!(swept, 1);
    let stored = flow.fetch_payment(PaymentKey::Id(payment.id)).await.unwrap().unwrap();
    assert!(stored.delivered);
    assert_eq!(stored.delivery_attempts, 2);
    // Nothing left to sweep
    assert_eq!(sweeper.redeliver_unsent(10).await.unwrap(), 0);
}

#[tokio::test]
async fn a_sweep_never_doubles_up_on_an_in_flight_delivery() {
    let endpoint = mock_endpoint(1).await;
    let flow = new_flow().await;
    let payment = confirmed_payment(&flow, &endpoint.url, "ICIC000987654321").await;
    let (_tx, shutdown) = watch::channel(false);
    let config = WebhookConfig {
        max_attempts: 2,
        retry_delay: Duration::from_millis(300),
        request_timeout: Duration::from_secs(2),
        danger_accept_invalid_certs: false,
    };
    let dispatcher = WebhookDispatcher::new(flow.db().clone(), config, shutdown).unwrap();
    let sweeper = dispatcher.clone();
    let handle = tokio::spawn({
        let payment = payment.clone();
        async move { dispatcher.deliver(payment).await }
    });
    // Let the first attempt fail and the delivery settle into its backoff
    tokio::time::sleep(Duration::from_millis(100)).await;
    // The sweep sees the undelivered payment, but the in-flight claim turns it away
    sweeper.redeliver_unsent(10).await.unwrap();
    handle.await.unwrap();
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 2);
    let stored = flow.fetch_payment(PaymentKey::Id(payment.id)).await.unwrap().unwrap();
    assert!(stored.delivered);
    assert_eq!(stored.delivery_attempts, 2);
}

#[tokio::test]
async fn declined_payments_notify_with_code_3() {
    let endpoint = mock_endpoint(0).await;
    let flow = new_flow().await;
    let payment = NewPayment::new(
        "m1",
        "order-declined",
        PaymentType::Deposit,
        PaymentMethod::Upi,
        Paisa::from(100_000),
        &endpoint.url,
    );
    let created = flow.create_payment(payment).await.unwrap();
    let declined = flow.decline_payment(PaymentKey::Id(created.payment.id), "ops@upg", "no funds").await.unwrap();
    let (_tx, shutdown) = watch::channel(false);
    let dispatcher = WebhookDispatcher::new(flow.db().clone(), fast_config(3), shutdown).unwrap();
    dispatcher.deliver(declined).await;
    let (_, body) = endpoint.accepted.lock().await.clone().expect("No request was accepted");
    let payload: WebhookPayload = serde_json::from_str(&body).unwrap();
    assert_eq!(payload.status, 3);
    assert_eq!(payload.remarks, "no funds");
}

#[tokio::test]
async fn shutdown_interrupts_the_backoff() {
    let endpoint = mock_endpoint(usize::MAX).await;
    let flow = new_flow().await;
    let payment = confirmed_payment(&flow, &endpoint.url, "UTR112233445566").await;
    let (tx, shutdown) = watch::channel(false);
    let config = WebhookConfig {
        max_attempts: 3,
        retry_delay: Duration::from_secs(60),
        request_timeout: Duration::from_secs(2),
        danger_accept_invalid_certs: false,
    };
    let dispatcher = WebhookDispatcher::new(flow.db().clone(), config, shutdown).unwrap();
    let handle = tokio::spawn(async move { dispatcher.deliver(payment).await });
    tokio::time::sleep(Duration::from_millis(250)).await;
    tx.send(true).unwrap();
    // Without the shutdown signal this would sit in a 60s backoff
    tokio::time::timeout(Duration::from_secs(5), handle).await.expect("Dispatcher ignored shutdown").unwrap();
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn terminal_transitions_fire_the_dispatcher_hooks() {
    let endpoint = mock_endpoint(0).await;
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    seed_merchant(&db, test_merchant("m1")).await;

    let (_tx, shutdown) = watch::channel(false);
    let dispatcher = WebhookDispatcher::new(db.clone(), fast_config(3), shutdown).unwrap();
    let mut hooks = EventHooks::default();
    register_dispatcher_hooks(dispatcher, &mut hooks);
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let flow = PaymentFlowApi::new(db, producers);
    let payment = confirmed_payment(&flow, &endpoint.url, "AXIS12345678901").await;

    // Delivery happens on a background task; wait for the journal to show it
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = flow.fetch_payment(PaymentKey::Id(payment.id)).await.unwrap().unwrap();
        if stored.delivered {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "Webhook was never delivered");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 1);
}
