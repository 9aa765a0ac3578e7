use std::fmt;

use ambush_contracts::credentials::Credential;
use ambush_contracts::endpoints::{EndpointConfig, EndpointKind};
use ambush_contracts::events::{now_utc_iso, EventPayload, EventWriter};
use ambush_contracts::pantry::{
    CompartmentSlot, Inventory, InventoryReport, OrganizationPlan, PlanPreferences, ReportSource,
    VISUAL_WARNING,
};
use ambush_contracts::runs::summary::RunSummary;
use image::DynamicImage;
use serde_json::{json, Map, Value};

use crate::failure::CallFailure;
use crate::planner::{build_plan_prompt, DryrunText, HuggingFaceText, PlanBackend};
use crate::scanner::{
    fallback_items, scan_compartment, scan_failure_reason, DryrunVision, HuggingFaceVision,
    VisionBackend,
};
use crate::visualizer::{scene_prompt, DryrunImage, HuggingFaceImage, ImageBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Scanning,
    Planning,
    Visualizing,
    Done,
}

impl RunStage {
    pub fn headline(self) -> &'static str {
        match self {
            Self::Idle => "Standing by.",
            Self::Scanning => "Scanning Inventory...",
            Self::Planning => "Formulating Organization Strategy...",
            Self::Visualizing => "Generating Target Visuals...",
            Self::Done => "Mission complete.",
        }
    }
}

/// Why a run was refused before any remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunNotice {
    CredentialMissing,
    NoTargetsSelected,
}

impl RunNotice {
    pub fn message(self) -> &'static str {
        match self {
            Self::CredentialMissing => "Please enter your Access Token to begin.",
            Self::NoTargetsSelected => "Target missing. Please scan at least one cabinet.",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::CredentialMissing => "credential_missing",
            Self::NoTargetsSelected => "no_targets_selected",
        }
    }
}

impl fmt::Display for RunNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

pub trait ProgressSink {
    fn stage(&mut self, stage: RunStage);
    /// `done` of `total` compartments scanned.
    fn scanned(&mut self, done: usize, total: usize);
    /// The plan (or its failure text) is known before visualization starts.
    fn planned(&mut self, _plan: &OrganizationPlan) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&mut self, _stage: RunStage) {}
    fn scanned(&mut self, _done: usize, _total: usize) {}
}

/// Captured photos in capture order, at most one per slot.
#[derive(Debug, Clone, Default)]
pub struct CaptureSet {
    captures: Vec<(CompartmentSlot, DynamicImage)>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second capture for the same slot replaces the first in place.
    pub fn insert(&mut self, slot: CompartmentSlot, image: DynamicImage) {
        if let Some(existing) = self.captures.iter_mut().find(|(held, _)| *held == slot) {
            existing.1 = image;
            return;
        }
        self.captures.push((slot, image));
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn slots(&self) -> Vec<CompartmentSlot> {
        self.captures.iter().map(|(slot, _)| *slot).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CompartmentSlot, &DynamicImage)> {
        self.captures.iter().map(|(slot, image)| (*slot, image))
    }
}

#[derive(Debug, Clone)]
pub struct Visualization {
    pub slot: CompartmentSlot,
    pub image: Option<DynamicImage>,
    pub failure: Option<CallFailure>,
}

impl Visualization {
    pub fn warning(&self) -> Option<&'static str> {
        self.image.is_none().then_some(VISUAL_WARNING)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub inventory: Inventory,
    pub plan: OrganizationPlan,
    pub visualizations: Vec<Visualization>,
    pub started_at: String,
    pub finished_at: String,
}

impl RunReport {
    pub fn summary(&self, run_id: &str) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
            compartments: self.inventory.len() as u64,
            scan_fallbacks: self.inventory.fallback_count() as u64,
            plan_generated: self.plan.is_generated(),
            visuals_rendered: self
                .visualizations
                .iter()
                .filter(|visual| visual.image.is_some())
                .count() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Blocked(RunNotice),
    Completed(RunReport),
}

pub struct Backends {
    pub vision: Box<dyn VisionBackend>,
    pub text: Box<dyn PlanBackend>,
    pub image: Box<dyn ImageBackend>,
}

impl Backends {
    pub fn huggingface(config: &EndpointConfig) -> Self {
        Self {
            vision: Box::new(HuggingFaceVision::new(config.url(EndpointKind::Vision))),
            text: Box::new(HuggingFaceText::new(config.url(EndpointKind::TextGeneration))),
            image: Box::new(HuggingFaceImage::new(config.url(EndpointKind::ImageGeneration))),
        }
    }

    pub fn dryrun() -> Self {
        Self {
            vision: Box::new(DryrunVision),
            text: Box::new(DryrunText),
            image: Box::new(DryrunImage),
        }
    }

    pub fn names(&self) -> [&str; 3] {
        [self.vision.name(), self.text.name(), self.image.name()]
    }
}

/// Scan → plan → visualize, one remote call at a time.
pub struct Pipeline {
    backends: Backends,
    events: Option<EventWriter>,
}

impl Pipeline {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// Credential first, then at least one capture.
    pub fn check(credential: Option<&Credential>, captures: &CaptureSet) -> Result<(), RunNotice> {
        if credential.is_none() {
            return Err(RunNotice::CredentialMissing);
        }
        if captures.is_empty() {
            return Err(RunNotice::NoTargetsSelected);
        }
        Ok(())
    }

    pub fn run(
        &self,
        credential: Option<&Credential>,
        captures: &CaptureSet,
        preferences: PlanPreferences,
        progress: &mut dyn ProgressSink,
    ) -> RunOutcome {
        let checked = Self::check(credential, captures)
            .and(credential.ok_or(RunNotice::CredentialMissing));
        let credential = match checked {
            Ok(credential) => credential,
            Err(notice) => {
                tracing::info!(notice = notice.key(), "run blocked");
                self.emit("run_blocked", json!({ "notice": notice.key() }));
                progress.stage(RunStage::Idle);
                return RunOutcome::Blocked(notice);
            }
        };

        let started_at = now_utc_iso();
        let total = captures.len();
        self.emit(
            "run_started",
            json!({
                "compartments": captures.slots().iter().map(|slot| slot.name()).collect::<Vec<_>>(),
                "allow_rearrange": preferences.allow_rearrange,
                "equipment": preferences.equipment.key(),
                "backends": self.backends.names(),
            }),
        );

        progress.stage(RunStage::Scanning);
        tracing::info!(compartments = total, "scanning inventory");
        let mut inventory = Inventory::new();
        for (idx, (slot, image)) in captures.iter().enumerate() {
            let report = self.scan_one(credential, slot, image);
            inventory.push(report);
            progress.scanned(idx + 1, total);
        }

        progress.stage(RunStage::Planning);
        tracing::info!("formulating organization strategy");
        let prompt = build_plan_prompt(&inventory.aggregate_text(), inventory.len(), &preferences);
        let plan = match self.backends.text.complete(credential, &prompt) {
            Ok(text) => {
                self.emit(
                    "plan_completed",
                    json!({ "generated": true, "chars": text.chars().count() }),
                );
                OrganizationPlan::Generated { text }
            }
            Err(failure) => {
                tracing::warn!(kind = failure.kind(), "plan generation failed: {failure}");
                self.emit(
                    "plan_completed",
                    json!({
                        "generated": false,
                        "failure": failure.kind(),
                        "reason": failure.to_string(),
                    }),
                );
                OrganizationPlan::Unavailable {
                    reason: failure.to_string(),
                }
            }
        };

        progress.planned(&plan);
        progress.stage(RunStage::Visualizing);
        tracing::info!("generating target visuals");
        let visualizations = captures
            .iter()
            .map(|(slot, _)| self.visualize_one(credential, slot))
            .collect::<Vec<_>>();

        let report = RunReport {
            inventory,
            plan,
            visualizations,
            started_at,
            finished_at: now_utc_iso(),
        };
        let summary = report.summary(self.run_id());
        self.emit(
            "run_finished",
            json!({
                "scan_fallbacks": summary.scan_fallbacks,
                "plan_generated": summary.plan_generated,
                "visuals_rendered": summary.visuals_rendered,
            }),
        );
        progress.stage(RunStage::Done);
        RunOutcome::Completed(report)
    }

    fn scan_one(
        &self,
        credential: &Credential,
        slot: CompartmentSlot,
        image: &DynamicImage,
    ) -> InventoryReport {
        match scan_compartment(self.backends.vision.as_ref(), credential, slot, image) {
            Ok(items) => {
                self.emit(
                    "scan_completed",
                    json!({ "compartment": slot.name(), "source": "vision" }),
                );
                InventoryReport {
                    slot,
                    items,
                    source: ReportSource::Vision,
                }
            }
            Err(failure) => {
                let reason = scan_failure_reason(slot, &failure);
                tracing::warn!(
                    compartment = %slot,
                    kind = failure.kind(),
                    "scan failed: {failure}"
                );
                self.emit(
                    "scan_completed",
                    json!({
                        "compartment": slot.name(),
                        "source": "fallback",
                        "failure": failure.kind(),
                        "reason": reason,
                    }),
                );
                InventoryReport {
                    slot,
                    items: fallback_items(slot),
                    source: ReportSource::Fallback { reason },
                }
            }
        }
    }

    fn visualize_one(&self, credential: &Credential, slot: CompartmentSlot) -> Visualization {
        let prompt = scene_prompt(&slot.name());
        match self.backends.image.render(credential, &prompt) {
            Ok(image) => {
                self.emit(
                    "visualization_completed",
                    json!({ "compartment": slot.name(), "rendered": true }),
                );
                Visualization {
                    slot,
                    image: Some(image),
                    failure: None,
                }
            }
            Err(failure) => {
                tracing::warn!(
                    compartment = %slot,
                    kind = failure.kind(),
                    "visualization failed: {failure}"
                );
                self.emit(
                    "visualization_completed",
                    json!({
                        "compartment": slot.name(),
                        "rendered": false,
                        "failure": failure.kind(),
                    }),
                );
                Visualization {
                    slot,
                    image: None,
                    failure: Some(failure),
                }
            }
        }
    }

    fn run_id(&self) -> &str {
        self.events
            .as_ref()
            .map(EventWriter::run_id)
            .unwrap_or("run-local")
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Err(err) = events.emit(event_type, payload) {
            tracing::warn!("failed to record {event_type} event: {err:#}");
        }
    }
}
