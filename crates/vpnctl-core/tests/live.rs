//! End-to-end runs of the HTTP-wired controller against axum mock services.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vpnctl_core::{
    Action, ActionError, ControllerConfig, LiveController, NoticeLevel, RouteKind, SecondaryConfig,
};

#[derive(Default)]
struct Service {
    running: AtomicBool,
    connect_ok: AtomicBool,
    country: Mutex<Option<String>>,
}

type Shared = Arc<Service>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

async fn status(State(svc): State<Shared>) -> Json<Value> {
    let country = svc.country.lock().unwrap().clone();
    Json(json!({
        "running": svc.running.load(Ordering::SeqCst),
        "fingerprint": {"mtu": 1400},
        "port": 51820,
        "routing_table": {"vpn_network": "10.8.0.0/24"},
        "current_node": country.map(|c| json!({"country": c})),
    }))
}

async fn connect(State(svc): State<Shared>, body: String) -> Json<bool> {
    if !svc.connect_ok.load(Ordering::SeqCst) {
        return Json(false);
    }
    let country = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["country"].as_str().map(str::to_string))
        .unwrap_or_else(|| "US".to_string());
    *svc.country.lock().unwrap() = Some(country);
    svc.running.store(true, Ordering::SeqCst);
    Json(true)
}

async fn disconnect(State(svc): State<Shared>) -> Json<bool> {
    svc.running.store(false, Ordering::SeqCst);
    Json(true)
}

async fn rpc(State(svc): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    match body["action"].as_str() {
        Some("status") => Json(json!({
            "success": true,
            "servers": [{"country": "US"}, {"country": "UK"}, {"country": "DE"}]
        })),
        Some("connect") => {
            let country = body["country"].as_str().unwrap_or("US").to_string();
            *svc.country.lock().unwrap() = Some(country);
            svc.running.store(true, Ordering::SeqCst);
            Json(json!({"success": true}))
        }
        Some("disconnect") => {
            svc.running.store(false, Ordering::SeqCst);
            Json(json!({"success": true}))
        }
        _ => Json(json!({"success": false, "error": "Unknown action"})),
    }
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

fn primary_routes(svc: &Shared) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .with_state(svc.clone())
}

fn config(base: &str) -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.primary.base_url = base.to_string();
    config.timing.status_interval_ms = 200;
    config.timing.catalog_interval_ms = 200;
    config.timing.request_timeout_ms = 1_000;
    config
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..50 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_status_scenario_is_displayed() {
    let svc = Shared::default();
    svc.running.store(true, Ordering::SeqCst);
    *svc.country.lock().unwrap() = Some("US".to_string());
    let base = serve(primary_routes(&svc)).await;

    let controller = LiveController::from_config(&config(&base)).unwrap();
    controller.start();
    wait_for(|| controller.store().revision() > 0).await;

    let model = controller.display();
    assert_eq!(model.status_text, "Connected");
    assert_eq!(model.mtu, "1400");
    assert_eq!(model.port, "51820");
    assert_eq!(model.network, "10.8.0.0/24");
    assert_eq!(model.selected_country.as_deref(), Some("US"));
    assert_eq!(controller.monitor().active_timers(), 2);

    controller.shutdown();
    assert_eq!(controller.monitor().active_timers(), 0);
}

#[tokio::test]
async fn test_connect_false_changes_nothing() {
    let svc = Shared::default();
    let base = serve(primary_routes(&svc)).await;

    let controller = LiveController::from_config(&config(&base)).unwrap();
    controller.refresh().await;

    let err = controller.connect(None).await.unwrap_err();
    assert!(matches!(err, ActionError::Rejected { action: Action::Connect, .. }));

    assert!(!controller.state().running);
    assert_eq!(controller.monitor().active_timers(), 0);
    let notices = controller.notifier().history();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_connect_disconnect_round_trip() {
    let svc = Shared::default();
    svc.connect_ok.store(true, Ordering::SeqCst);
    let base = serve(primary_routes(&svc)).await;

    let controller = LiveController::from_config(&config(&base)).unwrap();
    controller.refresh().await;

    controller.connect(Some("DE")).await.unwrap();
    assert!(controller.state().running);
    assert_eq!(controller.state().country(), Some("DE"));
    assert_eq!(controller.monitor().active_timers(), 2);

    controller.disconnect().await.unwrap();
    let model = controller.display();
    assert_eq!(model.status_text, "Disconnected");
    assert_eq!(model.elapsed, "00:00:00");
    assert_eq!(model.traffic, "0%");
    assert_eq!(controller.monitor().active_timers(), 0);
}

#[tokio::test]
async fn test_secondary_failure_does_not_block_primary() {
    let svc = Shared::default();
    svc.running.store(true, Ordering::SeqCst);
    *svc.country.lock().unwrap() = Some("DE".to_string());
    let base = serve(primary_routes(&svc)).await;
    let secondary = serve(Router::new().route("/vpn", post(broken))).await;

    let mut config = config(&base);
    config.secondary = Some(SecondaryConfig {
        url: format!("{secondary}vpn"),
    });

    let controller = LiveController::from_config(&config).unwrap();
    controller.start();
    wait_for(|| controller.store().revision() >= 2).await;

    assert!(controller.state().running);
    assert_eq!(controller.state().country(), Some("DE"));
    assert!(!controller.catalog().is_populated());
    controller.shutdown();
}

#[tokio::test]
async fn test_actions_routed_to_secondary() {
    let svc = Shared::default();
    let base = serve(primary_routes(&svc)).await;
    let secondary = serve(
        Router::new()
            .route("/vpn", post(rpc))
            .with_state(svc.clone()),
    )
    .await;

    let mut config = config(&base);
    config.secondary = Some(SecondaryConfig {
        url: format!("{secondary}vpn"),
    });
    config.actions.route = RouteKind::Secondary;

    let controller = LiveController::from_config(&config).unwrap();
    controller.start();
    wait_for(|| controller.catalog().is_populated()).await;
    assert_eq!(controller.display().countries, ["US", "UK", "DE"]);

    controller.select_country("UK").await.unwrap();
    controller.connect(None).await.unwrap();

    assert!(controller.state().running);
    assert_eq!(controller.state().country(), Some("UK"));
    controller.shutdown();
}
