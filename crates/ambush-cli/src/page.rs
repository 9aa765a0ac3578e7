use ambush_contracts::pantry::{CompartmentSlot, EquipmentProtocol, PlanPreferences, VISUAL_WARNING};
use ambush_engine::RunStage;

const STYLE: &str = r#"
@import url('https://fonts.googleapis.com/css2?family=Black+Ops+One&family=Roboto&display=swap');
body { background-color: #1a1a1a; color: #e0e0e0; font-family: 'Roboto', sans-serif; margin: 0; display: flex; min-height: 100vh; }
aside { width: 280px; background: #262626; padding: 20px; box-sizing: border-box; }
main { flex: 1; padding: 20px 32px; }
h1 { font-family: 'Black Ops One', cursive; color: #76ff03; text-align: center; font-size: 60px; text-transform: uppercase; letter-spacing: 3px; margin: 10px 0; }
h2, h3 { color: #76ff03; }
.subtitle { text-align: center; }
.columns { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 20px; }
.column { background: #222; border-radius: 10px; padding: 12px; }
button { background-color: #76ff03; color: black; font-family: 'Black Ops One', cursive; font-size: 20px; border: none; width: 100%; padding: 12px; margin-top: 20px; transition: 0.3s; cursor: pointer; }
button:hover { background-color: white; box-shadow: 0 0 15px #76ff03; }
button:disabled { background-color: #555; box-shadow: none; cursor: not-allowed; }
.report-box { background-color: #333; padding: 20px; border-radius: 10px; border-left: 5px solid #76ff03; margin-bottom: 20px; white-space: pre-wrap; }
.notice { padding: 12px 16px; border-radius: 6px; margin: 12px 0; }
.notice.info { background: #1e3a5f; }
.notice.warning { background: #5f4b1e; }
.notice.error { background: #5f1e1e; }
progress { width: 100%; height: 18px; accent-color: #76ff03; }
img.target { width: 100%; border-radius: 8px; }
label { display: block; margin: 8px 0; }
input[type=password] { width: 100%; box-sizing: border-box; padding: 6px; }
"#;

const TRIGGER_GATE: &str = r#"
<script>
const token = document.getElementById('token');
const trigger = document.getElementById('trigger');
if (token && trigger) {
  const sync = () => { trigger.disabled = token.value.trim() === ''; };
  token.addEventListener('input', sync);
  sync();
}
</script>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    fn class(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HomeView {
    pub credential_provisioned: bool,
    pub preferences: PlanPreferences,
    pub notice: Option<(NoticeLevel, String)>,
}

#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run_id: String,
    pub stage: RunStage,
    pub scanned: usize,
    pub compartments: Vec<CompartmentSlot>,
    pub plan: Option<String>,
    /// Per compartment, whether a rendered image is available.
    pub visuals: Vec<(CompartmentSlot, bool)>,
}

pub fn render_home(view: &HomeView) -> String {
    let mut sidebar = String::new();
    sidebar.push_str("<h2>MISSION PARAMETERS</h2>");
    if !view.credential_provisioned {
        sidebar.push_str(
            "<label for='token'>Enter Hugging Face Token</label>\
             <input type='password' id='token' name='token' form='ambush' autocomplete='off'>",
        );
    }
    sidebar.push_str(&format!(
        "<label><input type='checkbox' name='rearrange' form='ambush'{checked}> Rearrange Across All Cabinets?</label>",
        checked = if view.preferences.allow_rearrange { " checked" } else { "" },
    ));
    sidebar.push_str("<fieldset><legend>Equipment Protocol:</legend>");
    for protocol in [EquipmentProtocol::WorkWithWhatIHave, EquipmentProtocol::SuggestBins] {
        sidebar.push_str(&format!(
            "<label><input type='radio' name='equipment' form='ambush' value='{key}'{checked}> {label}</label>",
            key = protocol.key(),
            label = escape_html(protocol.label()),
            checked = if view.preferences.equipment == protocol { " checked" } else { "" },
        ));
    }
    sidebar.push_str("</fieldset>");

    let mut body = String::new();
    if let Some((level, message)) = &view.notice {
        body.push_str(&notice(*level, message));
    } else if !view.credential_provisioned {
        body.push_str(&notice(
            NoticeLevel::Warning,
            "Please enter your Access Token to begin.",
        ));
    }
    body.push_str(
        "<form id='ambush' method='post' action='/ambush' enctype='multipart/form-data'>\
         <div class='columns'>",
    );
    for slot in CompartmentSlot::ALL {
        body.push_str(&format!(
            "<div class='column'><h3>{title}</h3><label>{label}<input type='file' name='{key}' accept='image/*' capture='environment'></label></div>",
            title = escape_html(slot.title()),
            label = escape_html(&slot.capture_label()),
            key = slot.key(),
        ));
    }
    body.push_str("</div><button type='submit' id='trigger'>INITIATE AMBUSH</button></form>");
    body.push_str(TRIGGER_GATE);

    layout(&sidebar, &body, false)
}

pub fn render_run(snapshot: &RunSnapshot) -> String {
    let total = snapshot.compartments.len();
    let mut body = String::new();

    if snapshot.stage == RunStage::Idle {
        body.push_str(&notice(NoticeLevel::Info, RunStage::Idle.headline()));
    }
    if reached(snapshot.stage, RunStage::Scanning) {
        body.push_str(&notice(NoticeLevel::Info, RunStage::Scanning.headline()));
        body.push_str(&format!(
            "<progress value='{done}' max='{total}'></progress>",
            done = snapshot.scanned.min(total),
        ));
    }
    if reached(snapshot.stage, RunStage::Planning) {
        body.push_str(&notice(NoticeLevel::Info, RunStage::Planning.headline()));
    }
    if let Some(plan) = &snapshot.plan {
        body.push_str(&format!("<div class='report-box'>{}</div>", escape_html(plan)));
    }
    if reached(snapshot.stage, RunStage::Visualizing) {
        body.push_str(&notice(NoticeLevel::Info, RunStage::Visualizing.headline()));
    }
    if snapshot.stage == RunStage::Done {
        body.push_str("<div class='columns'>");
        for (slot, rendered) in &snapshot.visuals {
            let content = if *rendered {
                format!(
                    "<img class='target' src='/runs/{run_id}/visuals/{key}.png' alt='{name} target state'>",
                    run_id = escape_html(&snapshot.run_id),
                    key = slot.key(),
                    name = escape_html(&slot.name()),
                )
            } else {
                notice(NoticeLevel::Warning, VISUAL_WARNING)
            };
            body.push_str(&format!(
                "<div class='column'><p><strong>Target State: {name}</strong></p>{content}</div>",
                name = escape_html(&slot.name()),
            ));
        }
        body.push_str("</div><p><a href='/'>New mission</a></p>");
    }

    let sidebar = "<h2>MISSION PARAMETERS</h2><p><a href='/'>Back to capture</a></p>";
    layout(sidebar, &body, snapshot.stage != RunStage::Done)
}

fn reached(current: RunStage, stage: RunStage) -> bool {
    stage_rank(current) >= stage_rank(stage)
}

fn stage_rank(stage: RunStage) -> u8 {
    match stage {
        RunStage::Idle => 0,
        RunStage::Scanning => 1,
        RunStage::Planning => 2,
        RunStage::Visualizing => 3,
        RunStage::Done => 4,
    }
}

fn notice(level: NoticeLevel, message: &str) -> String {
    format!(
        "<div class='notice {class}'>{message}</div>",
        class = level.class(),
        message = escape_html(message),
    )
}

fn layout(sidebar: &str, body: &str, refresh: bool) -> String {
    let refresh = if refresh {
        "\n  <meta http-equiv='refresh' content='2'>"
    } else {
        ""
    };
    format!(
        "<!doctype html>\n<html>\n<head>\n  <meta charset='utf-8'>{refresh}\n  <title>Kitchen Ambush</title>\n  <style>{STYLE}</style>\n</head>\n<body>\n<aside>{sidebar}</aside>\n<main>\n  <h1>KITCHEN AMBUSH</h1>\n  <h3 class='subtitle'>AI Organization Operations</h3>\n  {body}\n</main>\n</body>\n</html>\n"
    )
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home(credential_provisioned: bool) -> HomeView {
        HomeView {
            credential_provisioned,
            preferences: PlanPreferences::default(),
            notice: None,
        }
    }

    fn snapshot(stage: RunStage) -> RunSnapshot {
        RunSnapshot {
            run_id: "abc".to_string(),
            stage,
            scanned: 1,
            compartments: vec![CompartmentSlot::First, CompartmentSlot::Second],
            plan: None,
            visuals: Vec::new(),
        }
    }

    #[test]
    fn home_without_secret_shows_token_field_and_standing_warning() {
        let html = render_home(&home(false));
        assert!(html.contains("type='password' id='token'"));
        assert!(html.contains("Please enter your Access Token to begin."));
        assert!(html.contains("INITIATE AMBUSH"));
        assert!(html.contains("name='cab3'"));
        assert!(html.contains("Cabinet Bravo"));
    }

    #[test]
    fn home_with_secret_hides_token_field() {
        let html = render_home(&home(true));
        assert!(!html.contains("id='token'"));
        assert!(!html.contains("Please enter your Access Token"));
    }

    #[test]
    fn home_renders_explicit_notice() {
        let mut view = home(true);
        view.notice = Some((
            NoticeLevel::Error,
            "Target missing. Please scan at least one cabinet.".to_string(),
        ));
        let html = render_home(&view);
        assert!(html.contains(
            "<div class='notice error'>Target missing. Please scan at least one cabinet.</div>"
        ));
    }

    #[test]
    fn queued_run_shows_standing_by() {
        let html = render_run(&snapshot(RunStage::Idle));
        assert!(html.contains("<div class='notice info'>Standing by.</div>"));
        assert!(!html.contains("<progress"));
    }

    #[test]
    fn plan_shows_while_visuals_are_still_generating() {
        let mut view = snapshot(RunStage::Visualizing);
        view.plan = Some("Step 1: The Purge".to_string());
        let html = render_run(&view);
        assert!(html.contains("<div class='report-box'>Step 1: The Purge</div>"));
        assert!(html.contains("Generating Target Visuals..."));
        assert!(html.contains("http-equiv='refresh'"));
    }

    #[test]
    fn running_page_refreshes_and_shows_progress() {
        let html = render_run(&snapshot(RunStage::Scanning));
        assert!(html.contains("http-equiv='refresh'"));
        assert!(html.contains("<progress value='1' max='2'></progress>"));
        assert!(html.contains("Scanning Inventory..."));
        assert!(!html.contains("Formulating Organization Strategy..."));
    }

    #[test]
    fn finished_page_shows_plan_images_and_warnings() {
        let mut view = snapshot(RunStage::Done);
        view.scanned = 2;
        view.plan = Some("<b>Step 1</b>".to_string());
        view.visuals = vec![(CompartmentSlot::First, true), (CompartmentSlot::Second, false)];
        let html = render_run(&view);
        assert!(!html.contains("http-equiv='refresh'"));
        assert!(html.contains("<div class='report-box'>&lt;b&gt;Step 1&lt;/b&gt;</div>"));
        assert!(html.contains("src='/runs/abc/visuals/cab1.png'"));
        assert!(html.contains("Target State: Cab 2"));
        assert!(html.contains("Visual link unstable."));
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html("<a href=\"x\">'&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
    }
}
