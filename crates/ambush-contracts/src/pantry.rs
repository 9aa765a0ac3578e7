use std::fmt;

use serde::{Deserialize, Serialize};

pub const PLAN_FAILURE_MESSAGE: &str = "Error generating plan. Please try again.";
pub const VISUAL_WARNING: &str = "Visual link unstable.";

/// One of the three photographed cabinets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompartmentSlot {
    First,
    Second,
    Third,
}

impl CompartmentSlot {
    pub const ALL: [CompartmentSlot; 3] = [Self::First, Self::Second, Self::Third];

    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.number() == number)
    }

    /// Name used in prompts, inventory lines and plan zoning.
    pub fn name(self) -> String {
        format!("Cab {}", self.number())
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::First => "Cabinet Alpha",
            Self::Second => "Cabinet Bravo",
            Self::Third => "Cabinet Charlie",
        }
    }

    pub fn capture_label(self) -> String {
        format!("Scan {}", self.name())
    }

    /// Form field / file stem: `cab1`, `cab2`, `cab3`.
    pub fn key(self) -> String {
        format!("cab{}", self.number())
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let digits = key.trim().strip_prefix("cab")?;
        Self::from_number(digits.parse().ok()?)
    }
}

impl fmt::Display for CompartmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentProtocol {
    #[default]
    WorkWithWhatIHave,
    SuggestBins,
}

impl EquipmentProtocol {
    pub fn label(self) -> &'static str {
        match self {
            Self::WorkWithWhatIHave => "Work with what I have",
            Self::SuggestBins => "Suggest Bins to Buy",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::WorkWithWhatIHave => "work_with_what_i_have",
            Self::SuggestBins => "suggest_bins",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [Self::WorkWithWhatIHave, Self::SuggestBins]
            .into_iter()
            .find(|protocol| protocol.key() == key.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPreferences {
    pub allow_rearrange: bool,
    pub equipment: EquipmentProtocol,
}

impl Default for PlanPreferences {
    fn default() -> Self {
        Self {
            allow_rearrange: true,
            equipment: EquipmentProtocol::default(),
        }
    }
}

impl PlanPreferences {
    pub fn allows_purchases(&self) -> bool {
        self.equipment == EquipmentProtocol::SuggestBins
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportSource {
    Vision,
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub slot: CompartmentSlot,
    pub items: String,
    pub source: ReportSource,
}

impl InventoryReport {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ReportSource::Fallback { .. })
    }

    pub fn line(&self) -> String {
        format!("{} contains: {}", self.slot.name(), single_line(&self.items))
    }
}

/// Per-compartment reports in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    reports: Vec<InventoryReport>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: InventoryReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[InventoryReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn fallback_count(&self) -> usize {
        self.reports.iter().filter(|report| report.is_fallback()).count()
    }

    /// Text handed to the planner: one `"{name} contains: {items}"` line per
    /// compartment.
    pub fn aggregate_text(&self) -> String {
        self.reports
            .iter()
            .map(InventoryReport::line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrganizationPlan {
    Generated { text: String },
    Unavailable { reason: String },
}

impl OrganizationPlan {
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }

    pub fn display_text(&self) -> &str {
        match self {
            Self::Generated { text } => text,
            Self::Unavailable { .. } => PLAN_FAILURE_MESSAGE,
        }
    }
}

fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(slot: CompartmentSlot, items: &str) -> InventoryReport {
        InventoryReport {
            slot,
            items: items.to_string(),
            source: ReportSource::Vision,
        }
    }

    #[test]
    fn slot_names_and_keys() {
        assert_eq!(CompartmentSlot::Second.name(), "Cab 2");
        assert_eq!(CompartmentSlot::Third.title(), "Cabinet Charlie");
        assert_eq!(CompartmentSlot::First.capture_label(), "Scan Cab 1");
        assert_eq!(CompartmentSlot::from_key("cab3"), Some(CompartmentSlot::Third));
        assert_eq!(CompartmentSlot::from_key("cab4"), None);
        assert_eq!(CompartmentSlot::from_key("shelf1"), None);
    }

    #[test]
    fn aggregate_has_one_line_per_compartment_in_capture_order() {
        let mut inventory = Inventory::new();
        inventory.push(report(CompartmentSlot::Third, "rice\nflour\n\n  sugar "));
        inventory.push(report(CompartmentSlot::First, "tea"));

        let text = inventory.aggregate_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["Cab 3 contains: rice, flour, sugar", "Cab 1 contains: tea"]
        );
    }

    #[test]
    fn fallback_reports_are_counted() {
        let mut inventory = Inventory::new();
        inventory.push(report(CompartmentSlot::First, "tea"));
        inventory.push(InventoryReport {
            slot: CompartmentSlot::Second,
            items: "placeholder".to_string(),
            source: ReportSource::Fallback {
                reason: "status 503".to_string(),
            },
        });
        assert_eq!(inventory.fallback_count(), 1);
        assert_eq!(inventory.len(), 2);
    }

    #[test]
    fn unavailable_plan_renders_fixed_message() {
        let plan = OrganizationPlan::Unavailable {
            reason: "timeout".to_string(),
        };
        assert_eq!(plan.display_text(), "Error generating plan. Please try again.");
        assert!(!plan.is_generated());
    }

    #[test]
    fn preferences_default_to_rearrange_without_purchases() {
        let prefs = PlanPreferences::default();
        assert!(prefs.allow_rearrange);
        assert!(!prefs.allows_purchases());
        assert_eq!(
            EquipmentProtocol::from_key("suggest_bins"),
            Some(EquipmentProtocol::SuggestBins)
        );
    }
}
