//! End-to-end Relay Tests - Real Adapters on Loopback
//!
//! Wires the file store, the Upstox client against a local fake quote
//! server, and the WebSocket gateway, then drives ticks by hand and reads
//! snapshots with a tokio-tungstenite client.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use ltp_relay::adapters::gateway::SubscriberGateway;
use ltp_relay::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use ltp_relay::adapters::store::FileStore;
use ltp_relay::adapters::upstream::{UpstoxClient, UpstoxClientConfig};
use ltp_relay::config::{BroadcastConfig, GatewayConfig};
use ltp_relay::domain::errors::QuoteError;
use ltp_relay::ports::QuoteSource;
use ltp_relay::usecases::{PriceBroadcaster, SubscriberSet, SymbolResolver, TickOutcome};

const RELIANCE: &str = "NSE_EQ|INE002A01018";

// ---- Fake Upstox ----

#[derive(Clone)]
struct FakeUpstox {
    status: StatusCode,
    hits: Arc<AtomicUsize>,
}

async fn fake_ltp(
    State(fake): State<FakeUpstox>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer tok");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({
            "status": "error",
            "errors": [{ "errorCode": "UDAPI100050", "message": "Invalid token" }]
        })));
    }
    if fake.status != StatusCode::OK {
        return (fake.status, Json(json!({ "status": "error" })));
    }

    let requested: Vec<String> = params
        .into_iter()
        .filter(|(k, _)| k == "instrument_key")
        .flat_map(|(_, v)| v.split(',').map(str::to_string).collect::<Vec<_>>())
        .collect();

    let data: serde_json::Map<String, Value> = requested
        .iter()
        .filter(|key| key.as_str() == RELIANCE)
        .map(|key| {
            (
                "NSE_EQ:RELIANCE".to_string(),
                json!({ "last_price": 2950.5, "instrument_token": key }),
            )
        })
        .collect();

    (StatusCode::OK, Json(json!({ "status": "success", "data": data })))
}

async fn spawn_fake_upstox(status: StatusCode) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/v2/market-quote/ltp", get(fake_ltp))
        .with_state(FakeUpstox {
            status,
            hits: Arc::clone(&hits),
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

async fn spawn_stalled_upstox(stall: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/v2/market-quote/ltp",
        get(move || async move {
            tokio::time::sleep(stall).await;
            Json(json!({ "status": "success", "data": {} }))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> UpstoxClient {
    UpstoxClient::new(UpstoxClientConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(2),
        max_retries: 1,
        retry_base_delay: Duration::from_millis(10),
        ..UpstoxClientConfig::default()
    })
    .unwrap()
}

// ---- Helpers ----

async fn write_store_document(doc: &Value) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ltp-relay-{}.json", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, serde_json::to_vec(doc).unwrap())
        .await
        .unwrap();
    path
}

async fn wait_for_subscribers(set: &SubscriberSet, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while set.len() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

struct Relay {
    broadcaster: PriceBroadcaster<FileStore, UpstoxClient>,
    subscribers: Arc<SubscriberSet>,
    ws_url: String,
    shutdown_tx: broadcast::Sender<()>,
    store_path: PathBuf,
}

async fn spawn_relay(upstream: SocketAddr) -> Relay {
    let store_path = write_store_document(&json!({
        "config": { "upstox_access_token": "tok" },
        "stocks": {
            "nifty50": {
                "RELIANCE": RELIANCE,
                "TCS": { "instrument_key": "NSE_EQ|INE467B01029" }
            }
        }
    }))
    .await;

    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let health = Arc::new(HealthState::new(Duration::from_secs(60)));
    let subscribers = Arc::new(SubscriberSet::with_gauge(metrics.subscribers.clone()));

    let store = Arc::new(FileStore::new(
        &store_path,
        "stocks",
        "config/upstox_access_token",
    ));
    let broadcaster = PriceBroadcaster::new(
        SymbolResolver::new(store, vec!["nifty50".to_string()]),
        Arc::new(client_for(upstream)),
        Arc::clone(&subscribers),
        metrics,
        health,
        BroadcastConfig {
            tick_interval_ms: 50,
            credential_backoff_ms: 500,
        },
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let gateway = SubscriberGateway::new(
        Arc::clone(&subscribers),
        GatewayConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ws_path: "/ws".to_string(),
            outbound_queue: 4,
        },
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move { gateway.serve(listener, gateway_shutdown).await });

    Relay {
        broadcaster,
        subscribers,
        ws_url: format!("ws://{addr}/ws"),
        shutdown_tx,
        store_path,
    }
}

async fn next_snapshot<S>(stream: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let message = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("no snapshot received")
        .expect("stream ended")
        .expect("websocket error");

    match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected message: {other:?}"),
    }
}

// ---- Tests ----

#[tokio::test]
async fn test_subscriber_receives_snapshot_over_websocket() {
    let (upstream, hits) = spawn_fake_upstox(StatusCode::OK).await;
    let relay = spawn_relay(upstream).await;

    let (mut ws, _) = connect_async(relay.ws_url.as_str()).await.unwrap();
    wait_for_subscribers(&relay.subscribers, 1).await;

    let outcome = relay.broadcaster.run_tick().await;
    assert!(matches!(outcome, TickOutcome::Delivered(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let snapshot = next_snapshot(&mut ws).await;
    assert_eq!(
        snapshot,
        json!({ "nifty50": { "RELIANCE": 2950.5, "TCS": null } })
    );

    let _ = relay.shutdown_tx.send(());
    let _ = tokio::fs::remove_file(&relay.store_path).await;
}

#[tokio::test]
async fn test_keepalives_are_ignored() {
    let (upstream, _) = spawn_fake_upstox(StatusCode::OK).await;
    let relay = spawn_relay(upstream).await;

    let (mut ws, _) = connect_async(relay.ws_url.as_str()).await.unwrap();
    wait_for_subscribers(&relay.subscribers, 1).await;

    ws.send(Message::Text("ping".to_string())).await.unwrap();
    ws.send(Message::Text("{\"subscribe\":\"everything\"}".to_string()))
        .await
        .unwrap();

    relay.broadcaster.run_tick().await;
    let snapshot = next_snapshot(&mut ws).await;
    assert_eq!(snapshot["nifty50"]["RELIANCE"], json!(2950.5));
    assert_eq!(relay.subscribers.len(), 1);

    let _ = relay.shutdown_tx.send(());
    let _ = tokio::fs::remove_file(&relay.store_path).await;
}

#[tokio::test]
async fn test_upstream_error_delivers_null_snapshot() {
    let (upstream, hits) = spawn_fake_upstox(StatusCode::INTERNAL_SERVER_ERROR).await;
    let relay = spawn_relay(upstream).await;

    let (mut ws, _) = connect_async(relay.ws_url.as_str()).await.unwrap();
    wait_for_subscribers(&relay.subscribers, 1).await;

    let outcome = relay.broadcaster.run_tick().await;
    let TickOutcome::Delivered(report) = outcome else {
        panic!("expected a delivered tick, got {outcome:?}");
    };
    assert!(!report.upstream_ok);
    // client_for opts into one retry on 5xx.
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let snapshot = next_snapshot(&mut ws).await;
    assert_eq!(
        snapshot,
        json!({ "nifty50": { "RELIANCE": null, "TCS": null } })
    );

    let _ = relay.shutdown_tx.send(());
    let _ = tokio::fs::remove_file(&relay.store_path).await;
}

#[tokio::test]
async fn test_closed_client_leaves_subscriber_set() {
    let (upstream, _) = spawn_fake_upstox(StatusCode::OK).await;
    let relay = spawn_relay(upstream).await;

    let (mut first, _) = connect_async(relay.ws_url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(relay.ws_url.as_str()).await.unwrap();
    wait_for_subscribers(&relay.subscribers, 2).await;

    first.close(None).await.unwrap();
    wait_for_subscribers(&relay.subscribers, 1).await;

    relay.broadcaster.run_tick().await;
    let snapshot = next_snapshot(&mut second).await;
    assert_eq!(snapshot["nifty50"]["RELIANCE"], json!(2950.5));

    let _ = relay.shutdown_tx.send(());
    let _ = tokio::fs::remove_file(&relay.store_path).await;
}

#[tokio::test]
async fn test_upstox_client_rejects_bad_token() {
    let (upstream, hits) = spawn_fake_upstox(StatusCode::OK).await;
    let client = client_for(upstream);

    let err = client
        .last_prices("wrong", &[RELIANCE.to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, QuoteError::Status { status: 401, .. }));
    // 401 is not retried.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stalled_upstream_fails_within_timeout() {
    let upstream = spawn_stalled_upstox(Duration::from_secs(5)).await;
    let client = UpstoxClient::new(UpstoxClientConfig {
        base_url: format!("http://{upstream}"),
        timeout: Duration::from_millis(300),
        max_retries: 2,
        retry_base_delay: Duration::from_millis(10),
        ..UpstoxClientConfig::default()
    })
    .unwrap();

    let started = std::time::Instant::now();
    let err = client
        .last_prices("tok", &[RELIANCE.to_string()])
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(
        matches!(err, QuoteError::Timeout { timeout_ms: 300 }),
        "unexpected error: {err:?}"
    );
    assert!(elapsed < Duration::from_millis(550), "took {elapsed:?}");
}

#[tokio::test]
async fn test_default_client_sends_one_request_per_call() {
    let (upstream, hits) = spawn_fake_upstox(StatusCode::INTERNAL_SERVER_ERROR).await;
    let client = UpstoxClient::new(UpstoxClientConfig {
        base_url: format!("http://{upstream}"),
        ..UpstoxClientConfig::default()
    })
    .unwrap();

    let err = client
        .last_prices("tok", &[RELIANCE.to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, QuoteError::Status { status: 500, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstox_client_batches_all_keys() {
    let (upstream, hits) = spawn_fake_upstox(StatusCode::OK).await;
    let client = client_for(upstream);

    let prices = client
        .last_prices(
            "tok",
            &[RELIANCE.to_string(), "NSE_EQ|INE467B01029".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(prices.len(), 1);
    assert_eq!(prices.get(RELIANCE), Some(&2950.5));
}

#[tokio::test]
async fn test_ops_server_reports_readiness() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let health = Arc::new(HealthState::new(Duration::from_secs(60)));
    let ops = HealthServer::new(
        Arc::clone(&health),
        Arc::clone(&metrics),
        "127.0.0.1:0".to_string(),
    );
    let app = ops.router();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let http = reqwest::Client::new();
    let ready = |http: reqwest::Client| async move {
        http.get(format!("http://{addr}/ready"))
            .send()
            .await
            .unwrap()
            .status()
    };

    assert_eq!(ready(http.clone()).await, reqwest::StatusCode::SERVICE_UNAVAILABLE);

    health.set_loop_running(true);
    health.record_tick();
    assert_eq!(ready(http.clone()).await, reqwest::StatusCode::OK);

    let live = http
        .get(format!("http://{addr}/live"))
        .send()
        .await
        .unwrap();
    assert_eq!(live.status(), reqwest::StatusCode::OK);

    let body = http
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("ltp_relay_subscribers"));
}
