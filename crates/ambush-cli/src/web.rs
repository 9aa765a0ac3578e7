use std::sync::{Arc, Mutex};

use ambush_contracts::credentials::{resolve_credential, Credential};
use ambush_contracts::events::EventWriter;
use ambush_contracts::pantry::{
    CompartmentSlot, EquipmentProtocol, OrganizationPlan, PlanPreferences,
};
use ambush_engine::codec::{decode_image, encode_png};
use ambush_engine::{
    Backends, CaptureSet, Pipeline, ProgressSink, RunNotice, RunOutcome, RunReport, RunStage,
};
use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde_json::json;
use uuid::Uuid;

use crate::page::{render_home, render_run, HomeView, NoticeLevel, RunSnapshot};

const RUN_HISTORY_LIMIT: usize = 16;
const UPLOAD_LIMIT_BYTES: usize = 32 * 1024 * 1024;

/// Builds fresh backends for every run.
pub type BackendFactory = Arc<dyn Fn() -> Backends + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    provisioned: Option<Credential>,
    backends: BackendFactory,
    runs: Arc<Mutex<IndexMap<String, Arc<Mutex<RunView>>>>>,
}

impl AppState {
    pub fn new(provisioned: Option<Credential>, backends: BackendFactory) -> Self {
        Self {
            provisioned,
            backends,
            runs: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    fn insert_run(&self, run_id: &str, view: Arc<Mutex<RunView>>) {
        let Ok(mut runs) = self.runs.lock() else {
            return;
        };
        runs.insert(run_id.to_string(), view);
        while runs.len() > RUN_HISTORY_LIMIT {
            runs.shift_remove_index(0);
        }
    }

    fn find_run(&self, run_id: &str) -> Option<Arc<Mutex<RunView>>> {
        self.runs.lock().ok()?.get(run_id).cloned()
    }
}

struct RunView {
    stage: RunStage,
    scanned: usize,
    compartments: Vec<CompartmentSlot>,
    plan: Option<String>,
    visuals: Vec<(CompartmentSlot, Option<Vec<u8>>)>,
    events: EventWriter,
}

impl RunView {
    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.events.run_id().to_string(),
            stage: self.stage,
            scanned: self.scanned,
            compartments: self.compartments.clone(),
            plan: self.plan.clone(),
            visuals: self
                .visuals
                .iter()
                .map(|(slot, png)| (*slot, png.is_some()))
                .collect(),
        }
    }

    fn finish(&mut self, report: RunReport) {
        self.plan = Some(report.plan.display_text().to_string());
        self.visuals = report
            .visualizations
            .iter()
            .map(|visual| {
                let png = visual
                    .image
                    .as_ref()
                    .and_then(|image| match encode_png(image) {
                        Ok(bytes) => Some(bytes),
                        Err(err) => {
                            tracing::warn!(
                                compartment = %visual.slot,
                                "dropping visualization: {err:#}"
                            );
                            None
                        }
                    });
                (visual.slot, png)
            })
            .collect();
        self.stage = RunStage::Done;
    }
}

struct SharedProgress(Arc<Mutex<RunView>>);

impl ProgressSink for SharedProgress {
    fn stage(&mut self, stage: RunStage) {
        if let Ok(mut view) = self.0.lock() {
            // Done is published by `finish` together with the results.
            if stage != RunStage::Done {
                view.stage = stage;
            }
        }
    }

    fn scanned(&mut self, done: usize, _total: usize) {
        if let Ok(mut view) = self.0.lock() {
            view.scanned = done;
        }
    }

    fn planned(&mut self, plan: &OrganizationPlan) {
        if let Ok(mut view) = self.0.lock() {
            view.plan = Some(plan.display_text().to_string());
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ambush", post(initiate))
        .route("/runs/:id", get(run_status))
        .route("/runs/:id/visuals/:file", get(run_visual))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("Kitchen Ambush listening on http://{bind}");
    axum::serve(listener, router(state))
        .await
        .context("server terminated")?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_home(&HomeView {
        credential_provisioned: state.provisioned.is_some(),
        preferences: PlanPreferences::default(),
        notice: None,
    }))
}

/// Form fields of one trigger press.
#[derive(Default)]
struct Submission {
    token: Option<String>,
    allow_rearrange: bool,
    equipment: EquipmentProtocol,
    photos: Vec<(CompartmentSlot, Vec<u8>)>,
}

impl Submission {
    fn preferences(&self) -> PlanPreferences {
        PlanPreferences {
            allow_rearrange: self.allow_rearrange,
            equipment: self.equipment,
        }
    }
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission> {
    let mut submission = Submission::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "token" => submission.token = Some(field.text().await?),
            "rearrange" => submission.allow_rearrange = true,
            "equipment" => {
                let value = field.text().await?;
                submission.equipment = EquipmentProtocol::from_key(&value).unwrap_or_default();
            }
            other => {
                if let Some(slot) = CompartmentSlot::from_key(other) {
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        submission.photos.push((slot, bytes.to_vec()));
                    }
                }
            }
        }
    }
    submission.photos.sort_by_key(|(slot, _)| *slot);
    Ok(submission)
}

fn home_with_notice(
    state: &AppState,
    preferences: PlanPreferences,
    level: NoticeLevel,
    message: String,
) -> Html<String> {
    Html(render_home(&HomeView {
        credential_provisioned: state.provisioned.is_some(),
        preferences,
        notice: Some((level, message)),
    }))
}

fn blocked_notice(state: &AppState, preferences: PlanPreferences, notice: RunNotice) -> Response {
    let level = match notice {
        RunNotice::CredentialMissing => NoticeLevel::Warning,
        RunNotice::NoTargetsSelected => NoticeLevel::Error,
    };
    home_with_notice(state, preferences, level, notice.message().to_string()).into_response()
}

/// Decodes uploads in slot order; the first unreadable photo aborts.
fn decode_captures(
    photos: Vec<(CompartmentSlot, Vec<u8>)>,
) -> Result<CaptureSet, (CompartmentSlot, anyhow::Error)> {
    let mut captures = CaptureSet::new();
    for (slot, bytes) in photos {
        let image = decode_image(&bytes).map_err(|err| (slot, err))?;
        captures.insert(slot, image);
    }
    Ok(captures)
}

async fn initiate(State(state): State<AppState>, multipart: Multipart) -> Response {
    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(err) => {
            tracing::warn!("rejected submission: {err:#}");
            return (StatusCode::BAD_REQUEST, "malformed submission").into_response();
        }
    };
    let preferences = submission.preferences();

    let typed = submission.token.as_deref();
    let Some(resolved) = resolve_credential(state.provisioned.as_ref(), typed) else {
        return blocked_notice(&state, preferences, RunNotice::CredentialMissing);
    };
    tracing::debug!(source = resolved.source.key(), "credential resolved");
    let credential = resolved.credential;

    let decoded = tokio::task::spawn_blocking(move || decode_captures(submission.photos)).await;
    let captures = match decoded {
        Ok(Ok(captures)) => captures,
        Ok(Err((slot, err))) => {
            tracing::warn!(compartment = %slot, "unreadable photo: {err:#}");
            let message = format!(
                "Could not read the photo for {}. Please scan it again.",
                slot.name()
            );
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                home_with_notice(&state, preferences, NoticeLevel::Error, message),
            )
                .into_response();
        }
        Err(err) => {
            tracing::error!("photo decoding worker failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if let Err(notice) = Pipeline::check(Some(&credential), &captures) {
        return blocked_notice(&state, preferences, notice);
    }

    let run_id = Uuid::new_v4().simple().to_string();
    let events = EventWriter::in_memory(run_id.clone());
    let view = Arc::new(Mutex::new(RunView {
        stage: RunStage::Idle,
        scanned: 0,
        compartments: captures.slots(),
        plan: None,
        visuals: Vec::new(),
        events: events.clone(),
    }));
    state.insert_run(&run_id, view.clone());
    tracing::info!(run_id = %run_id, compartments = captures.len(), "mission started");

    let backends = Arc::clone(&state.backends);
    tokio::task::spawn_blocking(move || {
        let pipeline = Pipeline::new(backends()).with_events(events);
        let mut progress = SharedProgress(view.clone());
        let outcome = pipeline.run(Some(&credential), &captures, preferences, &mut progress);
        let Ok(mut view) = view.lock() else {
            return;
        };
        match outcome {
            RunOutcome::Completed(report) => view.finish(report),
            RunOutcome::Blocked(notice) => {
                view.plan = Some(notice.message().to_string());
                view.stage = RunStage::Done;
            }
        }
    });

    Redirect::to(&format!("/runs/{run_id}")).into_response()
}

async fn run_status(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    let Some(view) = state.find_run(&run_id) else {
        return (StatusCode::NOT_FOUND, "unknown run").into_response();
    };
    let snapshot = match view.lock() {
        Ok(view) => view.snapshot(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    Html(render_run(&snapshot)).into_response()
}

async fn run_visual(
    State(state): State<AppState>,
    Path((run_id, file)): Path<(String, String)>,
) -> Response {
    let Some(slot) = file.strip_suffix(".png").and_then(CompartmentSlot::from_key) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(view) = state.find_run(&run_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let png = view.lock().ok().and_then(|view| {
        view.visuals
            .iter()
            .find(|(held, _)| *held == slot)
            .and_then(|(_, png)| png.clone())
    });
    match png {
        Some(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
