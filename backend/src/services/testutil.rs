//! Shared test fixtures: an in-memory catalog and a loopback JSON-RPC
//! recording server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use actix_web::{web, App, HttpResponse, HttpServer};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use super::Engine;
use crate::models::{Action, Automation, Device};
use crate::repository::{Catalog, CatalogError};

// ============================================================================
// Mock catalog
// ============================================================================

pub(crate) struct MockCatalog {
    devices: Vec<Device>,
    actions: Vec<Action>,
    automations: Mutex<Vec<Automation>>,
    updates: Mutex<Vec<Automation>>,
    automations_fail: AtomicBool,
    updates_fail: AtomicBool,
}

impl MockCatalog {
    pub fn new(devices: Vec<Device>, actions: Vec<Action>, automations: Vec<Automation>) -> Self {
        Self {
            devices,
            actions,
            automations: Mutex::new(automations),
            updates: Mutex::new(Vec::new()),
            automations_fail: AtomicBool::new(false),
            updates_fail: AtomicBool::new(false),
        }
    }

    /// Makes every `automations()` call fail with a database error.
    pub fn fail_automations(&self) {
        self.automations_fail.store(true, Ordering::SeqCst);
    }

    /// Makes every `update_automation()` call fail with a database error.
    pub fn fail_updates(&self) {
        self.updates_fail.store(true, Ordering::SeqCst);
    }

    /// Number of update attempts, including failed ones.
    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn device(&self, id: i32) -> Result<Device, CatalogError> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("device {} not found", id)))
    }

    async fn action(&self, id: i32) -> Result<Action, CatalogError> {
        self.actions
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("action {} not found", id)))
    }

    async fn automations(&self) -> Result<Vec<Automation>, CatalogError> {
        if self.automations_fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Database("db error".to_string()));
        }
        Ok(self.automations.lock().unwrap().clone())
    }

    async fn update_automation(&self, automation: &Automation) -> Result<(), CatalogError> {
        self.updates.lock().unwrap().push(automation.clone());
        if self.updates_fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Database("db error".to_string()));
        }

        let mut automations = self.automations.lock().unwrap();
        if let Some(existing) = automations.iter_mut().find(|a| a.id == automation.id) {
            *existing = automation.clone();
        }
        Ok(())
    }

    async fn id_by_name(&self, table: &str, name: &str) -> Result<i32, CatalogError> {
        let id = match table {
            "devices" => self.devices.iter().find(|d| d.name == name).map(|d| d.id),
            "actions" => self.actions.iter().find(|a| a.name == name).map(|a| a.id),
            "automations" => self
                .automations
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.id),
            other => return Err(CatalogError::InvalidTable(other.to_string())),
        };

        id.ok_or_else(|| CatalogError::NotFound(format!("'{}' not found in {}", name, table)))
    }
}

pub(crate) fn mock_catalog(
    devices: Vec<Device>,
    actions: Vec<Action>,
    automations: Vec<Automation>,
) -> Arc<MockCatalog> {
    Arc::new(MockCatalog::new(devices, actions, automations))
}

pub(crate) fn mock_engine(
    devices: Vec<Device>,
    actions: Vec<Action>,
    automations: Vec<Automation>,
) -> Engine {
    Engine::new(mock_catalog(devices, actions, automations))
}

// ============================================================================
// Fixtures
// ============================================================================

pub(crate) fn test_device(id: i32, name: &str, ip: &str, actions: &str) -> Device {
    Device {
        id,
        name: name.to_string(),
        type_: "sensor".to_string(),
        chip: "esp32".to_string(),
        board: "devkit".to_string(),
        ip: ip.to_string(),
        actions: actions.to_string(),
        created_at: Some(Utc::now().naive_utc()),
        updated_at: None,
    }
}

pub(crate) fn test_action(id: i32, name: &str, path: &str, params: &str) -> Action {
    Action {
        id,
        name: name.to_string(),
        path: path.to_string(),
        params: params.to_string(),
    }
}

pub(crate) fn test_automation(
    id: i32,
    name: &str,
    enabled: bool,
    definition: &str,
    last_triggers_run: &str,
) -> Automation {
    Automation {
        id,
        name: name.to_string(),
        enabled,
        definition: definition.to_string(),
        last_check: String::new(),
        last_triggers_run: last_triggers_run.to_string(),
        last_action_run: String::new(),
        created_at: Some(Utc::now().naive_utc()),
        updated_at: None,
    }
}

/// RFC3339 timestamp `seconds` in the past.
pub(crate) fn past(seconds: i64) -> String {
    (Utc::now() - chrono::Duration::seconds(seconds))
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Recording server
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub body: Value,
    pub at: Instant,
}

struct ServerState {
    default_response: (u16, String),
    responses: Mutex<HashMap<String, (u16, String)>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A loopback device endpoint: records every decoded JSON-RPC request and
/// answers with a canned body, optionally after a delay.
pub(crate) struct RecordingServer {
    pub addr: String,
    state: web::Data<ServerState>,
}

impl RecordingServer {
    pub async fn start(status: u16, body: &str) -> Self {
        Self::start_with(status, body, None).await
    }

    pub async fn start_with(status: u16, body: &str, delay: Option<Duration>) -> Self {
        let state = web::Data::new(ServerState {
            default_response: (status, body.to_string()),
            responses: Mutex::new(HashMap::new()),
            delay,
            requests: Mutex::new(Vec::new()),
        });

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/rpc", web::post().to(rpc_handler))
        })
        .listen(listener)
        .unwrap()
        .workers(1)
        .run();

        actix_web::rt::spawn(server);

        Self { addr, state }
    }

    /// Overrides the response for a single RPC method.
    pub fn respond_to(&self, method: &str, status: u16, body: &str) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(method.to_string(), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

async fn rpc_handler(state: web::Data<ServerState>, body: web::Json<Value>) -> HttpResponse {
    let method = body
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        body: body.into_inner(),
        at: Instant::now(),
    });

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    let (status, body) = state
        .responses
        .lock()
        .unwrap()
        .get(&method)
        .cloned()
        .unwrap_or_else(|| state.default_response.clone());

    HttpResponse::build(actix_web::http::StatusCode::from_u16(status).unwrap())
        .content_type("application/json")
        .body(body)
}
