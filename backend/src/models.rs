use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A physical device reachable over JSON-RPC. `actions` holds a JSON-encoded
/// array of action ids linked to this device.
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
pub struct Device {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub chip: String,
    pub board: String,
    pub ip: String,
    pub actions: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
pub struct NewDevice {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub chip: String,
    #[serde(default)]
    pub board: String,
    pub ip: String,
    #[serde(default = "empty_actions")]
    pub actions: String,
}

fn empty_actions() -> String {
    "[]".to_string()
}

#[derive(AsChangeset, Deserialize, Debug, Default)]
#[diesel(table_name = crate::schema::devices)]
pub struct UpdateDevice {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub chip: Option<String>,
    pub board: Option<String>,
    pub ip: Option<String>,
    pub actions: Option<String>,
}

/// A named JSON-RPC method. `path` is the RPC method name; `params` is empty
/// or a JSON value that becomes the request `params`.
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::actions)]
pub struct Action {
    pub id: i32,
    pub name: String,
    pub path: String,
    pub params: String,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::actions)]
pub struct NewAction {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub params: String,
}

#[derive(AsChangeset, Deserialize, Debug, Default)]
#[diesel(table_name = crate::schema::actions)]
pub struct UpdateAction {
    pub name: Option<String>,
    pub path: Option<String>,
    pub params: Option<String>,
}

/// A persisted YAML-defined periodic workflow. The three `last_*` timestamps
/// are RFC3339 strings; the empty string means "never".
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::automations)]
pub struct Automation {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
    pub definition: String,
    pub last_check: String,
    pub last_triggers_run: String,
    pub last_action_run: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Automation {
    pub fn parse_definition(&self) -> Result<AutomationDefinition, serde_yaml::Error> {
        AutomationDefinition::parse(&self.definition)
    }
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::automations)]
pub struct NewAutomation {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub definition: String,
}

#[derive(AsChangeset, Deserialize, Debug, Default)]
#[diesel(table_name = crate::schema::automations)]
pub struct UpdateAutomation {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub definition: Option<String>,
}

// ============================================================================
// Automation definition (YAML)
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutomationDefinition {
    pub interval: String,
    #[serde(default)]
    pub triggers: Vec<AutomationTrigger>,
    #[serde(default)]
    pub condition_logic: String,
    #[serde(default)]
    pub actions: Vec<AutomationAction>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutomationTrigger {
    pub device: String,
    pub action: String,
    #[serde(default)]
    pub conditions: Vec<AutomationCondition>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutomationCondition {
    pub field: String,
    pub operator: String,
    pub threshold: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutomationAction {
    pub device: String,
    pub action: String,
}

impl AutomationDefinition {
    /// Unknown keys are ignored so older servers keep accepting newer
    /// definitions.
    pub fn parse(definition: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(definition)
    }
}

// ============================================================================
// Write-time validation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

const VALID_OPERATORS: [&str; 6] = [">", "<", ">=", "<=", "==", "!="];

/// Validates a device's `actions` field: a JSON array of action ids, each of
/// which must exist in the catalog.
pub fn validate_device_actions(
    conn: &mut SqliteConnection,
    actions_json: &str,
) -> Result<(), ValidationError> {
    use crate::schema::actions;

    if actions_json.is_empty() {
        return Ok(());
    }

    let ids: Vec<i32> = serde_json::from_str(actions_json)
        .map_err(|_| ValidationError("actions must be a list of action IDs".to_string()))?;

    for id in ids {
        let exists: Result<i32, _> = actions::table
            .find(id)
            .select(actions::id)
            .first(conn);
        if exists.is_err() {
            return Err(ValidationError(format!("action {} does not exist", id)));
        }
    }

    Ok(())
}

/// Validates an action's `params` field: empty or a valid JSON value.
pub fn validate_action_params(params: &str) -> Result<(), ValidationError> {
    if params.is_empty() {
        return Ok(());
    }

    serde_json::from_str::<serde_json::Value>(params)
        .map(|_| ())
        .map_err(|_| ValidationError("params must be valid JSON".to_string()))
}

/// Validates a full automation definition: YAML schema, interval, operators
/// and the device/action linkage of every trigger and action.
pub fn validate_automation_definition(
    conn: &mut SqliteConnection,
    definition: &str,
) -> Result<(), ValidationError> {
    let def = AutomationDefinition::parse(definition)
        .map_err(|e| ValidationError(format!("invalid YAML definition: {}", e)))?;

    if !def.condition_logic.is_empty()
        && def.condition_logic != "and"
        && def.condition_logic != "or"
    {
        return Err(ValidationError(
            "condition_logic must be 'and' or 'or'".to_string(),
        ));
    }

    let interval = humantime::parse_duration(&def.interval).map_err(|e| {
        ValidationError(format!(
            "interval must be a valid duration (e.g. '5m', '1h'): {}",
            e
        ))
    })?;

    if interval < Duration::from_secs(1) {
        return Err(ValidationError("interval must be at least 1s".to_string()));
    }

    for trigger in &def.triggers {
        if trigger.device.is_empty() || trigger.action.is_empty() {
            return Err(ValidationError(
                "trigger must have both device and action".to_string(),
            ));
        }

        if trigger.conditions.is_empty() {
            return Err(ValidationError(
                "conditions are required when a trigger reads from a device".to_string(),
            ));
        }

        for condition in &trigger.conditions {
            if condition.field.is_empty() {
                return Err(ValidationError("condition must have a field".to_string()));
            }
            if !VALID_OPERATORS.contains(&condition.operator.as_str()) {
                return Err(ValidationError(format!(
                    "invalid operator '{}': must be one of >, <, >=, <=, ==, !=",
                    condition.operator
                )));
            }
        }

        validate_linkage(conn, &trigger.device, &trigger.action)?;
    }

    if def.actions.is_empty() {
        return Err(ValidationError("actions are required".to_string()));
    }

    for action in &def.actions {
        if action.device.is_empty() || action.action.is_empty() {
            return Err(ValidationError(
                "action must have both device and action".to_string(),
            ));
        }
        validate_linkage(conn, &action.device, &action.action)?;
    }

    Ok(())
}

/// Checks that a named device and action both exist and that the action id is
/// in the device's `actions` list.
fn validate_linkage(
    conn: &mut SqliteConnection,
    device_name: &str,
    action_name: &str,
) -> Result<(), ValidationError> {
    use crate::schema::{actions, devices};

    let device_actions: String = devices::table
        .filter(devices::name.eq(device_name))
        .select(devices::actions)
        .first(conn)
        .map_err(|_| ValidationError(format!("device '{}' not found", device_name)))?;

    let action_id: i32 = actions::table
        .filter(actions::name.eq(action_name))
        .select(actions::id)
        .first(conn)
        .map_err(|_| ValidationError(format!("action '{}' not found", action_name)))?;

    let mut linked: Vec<i32> = Vec::new();
    if !device_actions.is_empty() {
        linked = serde_json::from_str(&device_actions).map_err(|_| {
            ValidationError(format!("failed to parse device '{}' actions", device_name))
        })?;
    }

    if !linked.contains(&action_id) {
        return Err(ValidationError(format!(
            "action '{}' is not assigned to device '{}'",
            action_name, device_name
        )));
    }

    Ok(())
}
