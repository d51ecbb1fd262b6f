//! Device command handlers.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use simfleet_core::{DeviceEntry, DeviceState, Family};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

/// Serializable view of a directory entry. Never carries the credential.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub family: Option<String>,
    pub group: Option<String>,
    pub external_id: Option<String>,
    pub has_token: bool,
    pub state: DeviceState,
}

impl From<&DeviceEntry> for DeviceView {
    fn from(entry: &DeviceEntry) -> Self {
        let identity = &entry.identity;
        Self {
            id: identity.id.0,
            name: identity.name.clone(),
            device_type: identity.type_name.clone(),
            family: Family::from_tag(&identity.type_tag).map(|f| f.to_string()),
            group: identity.group.clone(),
            external_id: identity.external_id.clone(),
            has_token: identity.has_credential(),
            state: entry.state.clone(),
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Token")]
    token: String,
    #[tabled(rename = "State")]
    state: String,
}

fn to_row(view: &DeviceView, color: bool) -> DeviceRow {
    DeviceRow {
        id: view.id,
        name: view.name.clone(),
        device_type: view.device_type.clone(),
        family: view.family.clone().unwrap_or_else(|| "-".into()),
        group: view.group.clone().unwrap_or_default(),
        token: output::yes_no(view.has_token, color),
        state: Value::Object(view.state.clone()).to_string(),
    }
}

/// Render device entries in the format selected by `--output`.
pub fn render(entries: &[DeviceEntry], global: &GlobalOpts) -> Result<String, CliError> {
    let views: Vec<DeviceView> = entries.iter().map(DeviceView::from).collect();
    let color = output::should_color(&global.color);
    output::render_list(
        &global.output,
        &views,
        |v| to_row(v, color),
        |v| v.id.to_string(),
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List(select) => {
            let cfg = config::load(global)?;
            let directory = config::directory(&cfg).await?;
            let mut entries = directory.list(&config::selector(&select)).await?;
            entries.sort_by_key(|e| e.identity.id);

            let out = render(&entries, global)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
