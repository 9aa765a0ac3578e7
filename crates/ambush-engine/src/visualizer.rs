use ambush_contracts::credentials::Credential;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::json;

use crate::codec::decode_image;
use crate::failure::CallFailure;
use crate::transport::post_json;

const SCENE_BASE: &str = "kitchen cabinet interior, perfectly organized, clear plastic bins, labeled, neat, cinematic lighting, photorealistic, 4k";
const SCENE_SUMMARY: &str = "organized pantry shelves with bins";
const DRYRUN_DIMENSION: u32 = 256;

/// Text-to-image synthesis of the organized target state.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, credential: &Credential, prompt: &str) -> Result<DynamicImage, CallFailure>;
}

/// Fixed scene text plus the compartment name; the plan body is not used.
pub fn scene_prompt(compartment: &str) -> String {
    format!("{SCENE_BASE}, {SCENE_SUMMARY}, {compartment} layout")
}

pub struct HuggingFaceImage {
    endpoint: String,
    http: HttpClient,
}

impl HuggingFaceImage {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(),
        }
    }
}

impl ImageBackend for HuggingFaceImage {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn render(&self, credential: &Credential, prompt: &str) -> Result<DynamicImage, CallFailure> {
        let response = post_json(
            &self.http,
            &self.endpoint,
            credential,
            &json!({ "inputs": prompt }),
        )?;
        let bytes = response
            .bytes()
            .map_err(|err| CallFailure::transport(&err))?;
        decode_image(&bytes).map_err(|err| CallFailure::Shape(format!("{err:#}")))
    }
}

/// Flat tile tinted from the prompt text.
pub struct DryrunImage;

impl ImageBackend for DryrunImage {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn render(&self, _credential: &Credential, prompt: &str) -> Result<DynamicImage, CallFailure> {
        let (r, g, b) = color_from_prompt(prompt);
        let mut tile = RgbImage::from_pixel(DRYRUN_DIMENSION, DRYRUN_DIMENSION, Rgb([r, g, b]));
        for (x, y, pixel) in tile.enumerate_pixels_mut() {
            if x % 64 < 4 || y % 64 < 4 {
                *pixel = Rgb([0x76, 0xff, 0x03]);
            }
        }
        Ok(DynamicImage::ImageRgb8(tile))
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let hash = prompt
        .bytes()
        .fold(0u32, |acc, byte| acc.wrapping_mul(16_777_619) ^ u32::from(byte));
    (
        (hash & 0x7f) as u8,
        ((hash >> 8) & 0x7f) as u8,
        ((hash >> 16) & 0x7f) as u8,
    )
}
