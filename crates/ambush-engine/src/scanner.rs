use ambush_contracts::credentials::Credential;
use ambush_contracts::pantry::CompartmentSlot;
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::json;

use crate::codec::{encode_jpeg_base64, resize_for_scan};
use crate::failure::CallFailure;
use crate::transport::{post_json, read_generated_text};

pub const SCAN_MAX_NEW_TOKENS: u64 = 300;

const DRYRUN_CATALOG: [&str; 12] = [
    "canned tomatoes",
    "rolled oats",
    "olive oil",
    "rice",
    "paprika",
    "peanut butter",
    "spaghetti",
    "baking soda",
    "honey",
    "cereal box",
    "black beans",
    "tea tins",
];

pub struct ScanRequest<'a> {
    pub compartment: &'a str,
    pub image_b64: &'a str,
    pub instruction: &'a str,
}

/// Turns one cabinet photo into a free-text list of what is inside.
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &str;
    fn describe(
        &self,
        credential: &Credential,
        request: &ScanRequest<'_>,
    ) -> Result<String, CallFailure>;
}

pub fn scan_instruction(compartment: &str) -> String {
    format!(
        "List every single food item, jar, box, or appliance you see in this {compartment}. Be concise. Just the list."
    )
}

/// Placeholder inventory used in place of any failed scan.
pub fn fallback_items(slot: CompartmentSlot) -> String {
    format!("{}: Cereal boxes, pasta, loose snacks, messy spice jars.", slot.name())
}

/// Human-readable reason recorded for a failed scan.
pub fn scan_failure_reason(slot: CompartmentSlot, failure: &CallFailure) -> String {
    match failure {
        CallFailure::Status { .. } => format!(
            "Detected items in {}: Various cans, boxes, and jars (Vision Server Busy)",
            slot.name()
        ),
        other => other.to_string(),
    }
}

/// Resize, encode and submit one compartment photo.
pub fn scan_compartment(
    backend: &dyn VisionBackend,
    credential: &Credential,
    slot: CompartmentSlot,
    image: &DynamicImage,
) -> Result<String, CallFailure> {
    let small = resize_for_scan(image);
    let image_b64 =
        encode_jpeg_base64(&small).map_err(|err| CallFailure::Encode(format!("{err:#}")))?;
    let compartment = slot.name();
    let instruction = scan_instruction(&compartment);
    backend.describe(
        credential,
        &ScanRequest {
            compartment: &compartment,
            image_b64: &image_b64,
            instruction: &instruction,
        },
    )
}

pub struct HuggingFaceVision {
    endpoint: String,
    http: HttpClient,
}

impl HuggingFaceVision {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(),
        }
    }
}

impl VisionBackend for HuggingFaceVision {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn describe(
        &self,
        credential: &Credential,
        request: &ScanRequest<'_>,
    ) -> Result<String, CallFailure> {
        let payload = json!({
            "inputs": request.image_b64,
            "parameters": {
                "max_new_tokens": SCAN_MAX_NEW_TOKENS,
                "prompt": request.instruction,
            },
        });
        let response = post_json(&self.http, &self.endpoint, credential, &payload)?;
        read_generated_text(response)
    }
}

/// Picks catalog items from the image bytes; no network.
pub struct DryrunVision;

impl VisionBackend for DryrunVision {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn describe(
        &self,
        _credential: &Credential,
        request: &ScanRequest<'_>,
    ) -> Result<String, CallFailure> {
        let seed = request
            .image_b64
            .bytes()
            .fold(0usize, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as usize));
        let items = (0..4)
            .map(|offset| DRYRUN_CATALOG[seed.wrapping_add(offset * 5) % DRYRUN_CATALOG.len()])
            .collect::<Vec<_>>();
        Ok(items.join("\n"))
    }
}
