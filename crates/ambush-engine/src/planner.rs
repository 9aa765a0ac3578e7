use ambush_contracts::credentials::Credential;
use ambush_contracts::pantry::PlanPreferences;
use reqwest::blocking::Client as HttpClient;
use serde_json::json;

use crate::failure::CallFailure;
use crate::transport::{post_json, read_generated_text};

/// Free-form text completion for the organization plan.
pub trait PlanBackend: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, credential: &Credential, prompt: &str) -> Result<String, CallFailure>;
}

pub fn buying_directive(preferences: &PlanPreferences) -> &'static str {
    if preferences.allows_purchases() {
        "Recommend specific bins, lazy susans, or risers to buy."
    } else {
        "Do NOT suggest buying anything. Use existing space only."
    }
}

pub fn move_directive(preferences: &PlanPreferences) -> &'static str {
    if preferences.allow_rearrange {
        "You may move items between cabinets to group them logically (e.g. all baking together)."
    } else {
        "Keep items in their original cabinets, just organize them better."
    }
}

pub fn build_plan_prompt(
    inventory: &str,
    compartments: usize,
    preferences: &PlanPreferences,
) -> String {
    format!(
        "[INST] You are a professional home organizer.\n\
         Here is the inventory of {compartments} cabinets:\n\
         {inventory}\n\
         \n\
         User Preferences:\n\
         1. {buying}\n\
         2. {moving}\n\
         \n\
         Output a structured plan:\n\
         - **Step 1: The Purge** (What to throw away/check dates on)\n\
         - **Step 2: The Zoning** (What goes in Cab 1, Cab 2, Cab 3)\n\
         - **Step 3: The Shopping List** (If applicable)\n\
         [/INST]",
        buying = buying_directive(preferences),
        moving = move_directive(preferences),
    )
}

pub struct HuggingFaceText {
    endpoint: String,
    http: HttpClient,
}

impl HuggingFaceText {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(),
        }
    }
}

impl PlanBackend for HuggingFaceText {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn complete(&self, credential: &Credential, prompt: &str) -> Result<String, CallFailure> {
        let response = post_json(
            &self.http,
            &self.endpoint,
            credential,
            &json!({ "inputs": prompt }),
        )?;
        read_generated_text(response)
    }
}

/// Canned plan built from the prompt's own inventory lines.
pub struct DryrunText;

impl PlanBackend for DryrunText {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, _credential: &Credential, prompt: &str) -> Result<String, CallFailure> {
        let zoning = prompt
            .lines()
            .filter_map(|line| line.split_once(" contains: "))
            .map(|(name, items)| format!("  - {name}: {items}"))
            .collect::<Vec<_>>()
            .join("\n");
        let shopping = if prompt.contains("Recommend specific bins") {
            "Two clear stackable bins and one lazy susan."
        } else {
            "Nothing to buy."
        };
        Ok(format!(
            "**Step 1: The Purge**\n  - Check expiry dates on everything opened.\n\
             **Step 2: The Zoning**\n{zoning}\n\
             **Step 3: The Shopping List**\n  - {shopping}"
        ))
    }
}
