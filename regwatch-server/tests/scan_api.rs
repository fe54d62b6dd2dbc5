//! End-to-end exercises of the scan control surface against in-memory
//! collaborators: the HTTP layer, the orchestrator, and the run task, with
//! only the database and the external API stubbed out.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use regwatch_core::error::Result;
use regwatch_core::lookup::{InspectionLookup, InspectionRecord, LookupError, LookupResponse};
use regwatch_core::persistence::{CheckpointStore, OutcomeWriter, ScanRunRecord, WriteError};
use regwatch_core::registry::RegistrationSource;
use regwatch_core::scan::OrchestratorConfig;
use regwatch_core::ScanOrchestrator;
use regwatch_model::{BatchConfig, Registration, ScanState, VehicleId, VehicleRegistration};
use regwatch_server::{AppState, routes};

#[derive(Default)]
struct FakeInspectionApi {
    delay_ms: u64,
    fail: HashSet<String>,
    missing: HashSet<String>,
    credential_fails: bool,
}

#[async_trait]
impl InspectionLookup for FakeInspectionApi {
    async fn ensure_credential(&self) -> std::result::Result<(), LookupError> {
        if self.credential_fails {
            Err(LookupError::InvalidCredential)
        } else {
            Ok(())
        }
    }

    async fn lookup(
        &self,
        registration: &Registration,
    ) -> std::result::Result<LookupResponse, LookupError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let key = registration.as_str();
        if self.fail.contains(key) {
            return Err(LookupError::Api("boom".into()));
        }
        if self.missing.contains(key) {
            return Ok(LookupResponse::NotFound);
        }
        Ok(LookupResponse::Found(InspectionRecord {
            status: "approved".into(),
            expires_at: None,
        }))
    }
}

struct MemoryWriter;

#[async_trait]
impl OutcomeWriter for MemoryWriter {
    async fn apply(
        &self,
        _vehicle: VehicleId,
        _outcome: &regwatch_model::ScanOutcome,
    ) -> std::result::Result<(), WriteError> {
        Ok(())
    }
}

struct MemoryRegistry {
    items: Vec<VehicleRegistration>,
}

#[async_trait]
impl RegistrationSource for MemoryRegistry {
    async fn list_registrations(&self) -> Result<Vec<VehicleRegistration>> {
        Ok(self.items.clone())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.items.len() as u64)
    }
}

#[derive(Default)]
struct MemoryCheckpoints {
    runs: Mutex<Vec<ScanRunRecord>>,
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn upsert(&self, record: &ScanRunRecord) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        match runs.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => runs.push(record.clone()),
        }
        Ok(())
    }

    async fn latest_resumable(&self) -> Result<Option<ScanRunRecord>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .iter()
            .filter(|r| r.state == ScanState::Paused)
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn recover_interrupted(&self) -> Result<Vec<ScanRunRecord>> {
        Ok(Vec::new())
    }
}

fn registry(count: usize) -> MemoryRegistry {
    MemoryRegistry {
        items: (0..count)
            .map(|i| VehicleRegistration {
                id: VehicleId::new(),
                registration: Registration::new(format!("ZX9{i:04}")),
            })
            .collect(),
    }
}

fn server_with(lookup: FakeInspectionApi, registry: MemoryRegistry) -> TestServer {
    let tuning = OrchestratorConfig {
        defaults: BatchConfig {
            batch_size: 10,
            concurrency: 4,
            delay_between_batches_ms: 0,
            per_item_delay_ms: 0,
        },
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(registry),
        Arc::new(lookup),
        Arc::new(MemoryWriter),
        Arc::new(MemoryCheckpoints::default()),
        tuning,
    ));
    TestServer::new(routes::router(AppState::new(orchestrator))).expect("test server")
}

async fn wait_for_state(server: &TestServer, state: &str) -> Value {
    for _ in 0..500 {
        let body: Value = server.get("/api/scan/status").await.json();
        if body["state"] == state {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scan never reached state {state}");
}

#[tokio::test]
async fn status_reports_idle_before_any_run() {
    let server = server_with(FakeInspectionApi::default(), registry(5));

    let response = server.get("/api/scan/status").await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["state"], "idle");
    assert_eq!(body["processed"], 0);
    assert!(body.get("scan_id").is_none());
}

#[tokio::test]
async fn readiness_reflects_credential_and_registry() {
    let server = server_with(FakeInspectionApi::default(), registry(7));
    let body: Value = server.get("/api/scan/readiness").await.json();
    assert_eq!(body["credential_ok"], true);
    assert_eq!(body["registration_count"], 7);

    let broken = FakeInspectionApi {
        credential_fails: true,
        ..FakeInspectionApi::default()
    };
    let server = server_with(broken, registry(7));
    let body: Value = server.get("/api/scan/readiness").await.json();
    assert_eq!(body["credential_ok"], false);
}

#[tokio::test]
async fn full_scan_over_http_reports_final_counters() {
    let mut api = FakeInspectionApi::default();
    api.fail.insert("ZX90003".into());
    api.missing.insert("ZX90010".into());
    let server = server_with(api, registry(25));

    let response = server.post("/api/scan/start").json(&json!({})).await;
    response.assert_status(StatusCode::ACCEPTED);
    let accepted: Value = response.json();
    assert_eq!(accepted["accepted"], true);
    assert_eq!(accepted["total_items"], 25);

    let done = wait_for_state(&server, "completed").await;
    assert_eq!(done["processed"], 25);
    assert_eq!(done["succeeded"], 23);
    assert_eq!(done["not_found"], 1);
    assert_eq!(done["failed"], 1);
    assert!(done["eta_ms"].as_u64().is_some());
}

#[tokio::test]
async fn start_rejections_carry_machine_readable_reasons() {
    // no registrations
    let server = server_with(FakeInspectionApi::default(), registry(0));
    let response = server.post("/api/scan/start").json(&json!({})).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["reason"], "empty_registry");

    // credential acquisition fails
    let broken = FakeInspectionApi {
        credential_fails: true,
        ..FakeInspectionApi::default()
    };
    let server = server_with(broken, registry(5));
    let response = server.post("/api/scan/start").json(&json!({})).await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["reason"], "no_credential");
}

#[tokio::test]
async fn second_start_conflicts_while_running() {
    let api = FakeInspectionApi {
        delay_ms: 30,
        ..FakeInspectionApi::default()
    };
    let server = server_with(api, registry(40));

    server
        .post("/api/scan/start")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let response = server.post("/api/scan/start").json(&json!({})).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"]["reason"], "already_running");

    server
        .post("/api/scan/stop")
        .await
        .assert_status(StatusCode::OK);
}

#[tokio::test]
async fn pause_resume_stop_round_trip() {
    let api = FakeInspectionApi {
        delay_ms: 10,
        ..FakeInspectionApi::default()
    };
    let server = server_with(api, registry(60));

    server
        .post("/api/scan/start")
        .json(&json!({ "concurrency": 2 }))
        .await
        .assert_status(StatusCode::ACCEPTED);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let paused: Value = server.post("/api/scan/pause").await.json();
    assert_eq!(paused["state"], "paused");

    // pausing twice is a conflict
    server
        .post("/api/scan/pause")
        .await
        .assert_status(StatusCode::CONFLICT);

    let resumed: Value = server.post("/api/scan/resume").await.json();
    assert_eq!(resumed["state"], "running");

    let stopped_response = server.post("/api/scan/stop").await;
    stopped_response.assert_status(StatusCode::OK);
    let stopped: Value = stopped_response.json();
    assert_eq!(stopped["state"], "stopped");

    let final_status = wait_for_state(&server, "stopped").await;
    let processed = final_status["processed"].as_u64().unwrap();
    let accounted = final_status["succeeded"].as_u64().unwrap()
        + final_status["not_found"].as_u64().unwrap()
        + final_status["failed"].as_u64().unwrap();
    assert_eq!(processed, accounted);

    // terminal: no further control accepted
    server
        .post("/api/scan/resume")
        .await
        .assert_status(StatusCode::CONFLICT);
    server
        .post("/api/scan/stop")
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn control_without_a_run_is_a_conflict() {
    let server = server_with(FakeInspectionApi::default(), registry(5));
    server
        .post("/api/scan/pause")
        .await
        .assert_status(StatusCode::CONFLICT);
    server
        .post("/api/scan/stop")
        .await
        .assert_status(StatusCode::CONFLICT);
    server
        .post("/api/scan/resume")
        .await
        .assert_status(StatusCode::CONFLICT);
}
