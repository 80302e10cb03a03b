//! Periodic automation processing.
//!
//! The runner ticks over all automations; each enabled one gets a heartbeat
//! write, an interval gate, a serial trigger phase whose JSON results feed
//! the condition evaluator, and, when the combined predicate holds, a serial
//! action phase. Bookkeeping timestamps are persisted as the pass advances
//! so a crash or error never silently re-opens the interval gate.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use log::{error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::conditions::{self, ConditionError};
use super::execute::ExecuteError;
use super::rpc::JsonRpcResponse;
use super::Engine;
use crate::models::{Automation, AutomationDefinition};
use crate::repository::{Catalog, CatalogError};

/// Failure while resolving names or running the RPC for one trigger/action.
#[derive(Debug)]
pub enum DispatchError {
    DeviceLookup(CatalogError),
    ActionLookup(CatalogError),
    Execute(ExecuteError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::DeviceLookup(e) => write!(f, "looking up device: {}", e),
            DispatchError::ActionLookup(e) => write!(f, "looking up action: {}", e),
            DispatchError::Execute(e) => write!(f, "executing action: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug)]
pub enum AutomationError {
    List(CatalogError),
    Definition(serde_yaml::Error),
    LastTriggersRun(chrono::ParseError),
    Interval(String),
    Trigger {
        device: String,
        action: String,
        source: DispatchError,
    },
    TriggerResponse {
        device: String,
        action: String,
        detail: String,
    },
    Conditions {
        device: String,
        action: String,
        field: String,
        source: ConditionError,
    },
    PersistTriggersRun(CatalogError),
    Action {
        device: String,
        action: String,
        source: DispatchError,
    },
    PersistActionRun(CatalogError),
}

impl std::fmt::Display for AutomationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutomationError::List(e) => write!(f, "getting automations: {}", e),
            AutomationError::Definition(e) => write!(f, "parsing definition: {}", e),
            AutomationError::LastTriggersRun(e) => {
                write!(f, "parsing last triggers run time: {}", e)
            }
            AutomationError::Interval(e) => write!(f, "parsing interval: {}", e),
            AutomationError::Trigger {
                device,
                action,
                source,
            } => write!(
                f,
                "executing trigger, device [{}], action [{}]: {}",
                device, action, source
            ),
            AutomationError::TriggerResponse {
                device,
                action,
                detail,
            } => write!(
                f,
                "parsing trigger response, device [{}], action [{}]: {}",
                device, action, detail
            ),
            AutomationError::Conditions {
                device,
                action,
                field,
                source,
            } => write!(
                f,
                "evaluating conditions for trigger [{}/{}]: getting field [{}] value: {}",
                device, action, field, source
            ),
            AutomationError::PersistTriggersRun(e) => {
                write!(f, "updating triggers last run time: {}", e)
            }
            AutomationError::Action {
                device,
                action,
                source,
            } => write!(
                f,
                "executing action [{}] on device [{}]: {}",
                action, device, source
            ),
            AutomationError::PersistActionRun(e) => {
                write!(f, "updating action last run time: {}", e)
            }
        }
    }
}

impl std::error::Error for AutomationError {}

fn format_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Engine {
    /// Ticks every `every` until the token is cancelled. Tick failures go to
    /// `errs` with a non-blocking send; a full channel drops the message
    /// rather than stalling the loop.
    pub async fn run_automations(
        &self,
        token: CancellationToken,
        every: Duration,
        errs: mpsc::Sender<AutomationError>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            // Racing the tick body against the token aborts in-flight device
            // calls on shutdown.
            tokio::select! {
                _ = token.cancelled() => return,
                _ = self.process_automations(&errs) => {}
            }
        }
    }

    pub(crate) async fn process_automations(&self, errs: &mpsc::Sender<AutomationError>) {
        let now = Utc::now();

        let automations = match self.catalog.automations().await {
            Ok(list) => list,
            Err(e) => {
                let err = AutomationError::List(e);
                error!("failed to load automations: {}", err);
                let _ = errs.try_send(err);
                return;
            }
        };

        for mut automation in automations {
            if !automation.enabled {
                continue;
            }

            info!("processing automation {}", automation.name);

            if let Err(e) = self.process_one(&mut automation, now).await {
                error!("automation {} failed: {}", automation.name, e);
                let _ = errs.try_send(e);
            }
        }
    }

    /// One pass over one automation. The `last_check` heartbeat is written
    /// first, even when the gate stays closed; a failure there is logged but
    /// the pass continues. Failures persisting the other two timestamps are
    /// fatal for the pass.
    pub(crate) async fn process_one(
        &self,
        automation: &mut Automation,
        now: DateTime<Utc>,
    ) -> Result<(), AutomationError> {
        automation.last_check = format_rfc3339(now);
        if let Err(e) = self.catalog.update_automation(automation).await {
            warn!(
                "failed to update last check for automation {}: {}",
                automation.name, e
            );
        }

        let definition = automation
            .parse_definition()
            .map_err(AutomationError::Definition)?;

        // Gate reference: the last trigger run, falling back to the creation
        // time. A bare row without either fires on its first eligible tick.
        let reference = if automation.last_triggers_run.is_empty() {
            automation
                .created_at
                .map(|t| Utc.from_utc_datetime(&t))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        } else {
            DateTime::parse_from_rfc3339(&automation.last_triggers_run)
                .map_err(AutomationError::LastTriggersRun)?
                .with_timezone(&Utc)
        };

        let interval = humantime::parse_duration(&definition.interval)
            .map_err(|e| AutomationError::Interval(e.to_string()))?;
        let interval = chrono::Duration::from_std(interval)
            .map_err(|e| AutomationError::Interval(e.to_string()))?;

        if reference + interval > now {
            return Ok(());
        }

        let results = self.process_triggers(&definition).await?;

        automation.last_triggers_run = format_rfc3339(now);
        self.catalog
            .update_automation(automation)
            .await
            .map_err(AutomationError::PersistTriggersRun)?;

        if !conditions::combine(&results, &definition.condition_logic) {
            return Ok(());
        }

        for action in &definition.actions {
            self.dispatch(&action.device, &action.action)
                .await
                .map_err(|source| AutomationError::Action {
                    device: action.device.clone(),
                    action: action.action.clone(),
                    source,
                })?;

            automation.last_action_run = format_rfc3339(now);
            self.catalog
                .update_automation(automation)
                .await
                .map_err(AutomationError::PersistActionRun)?;

            info!(
                "successfully executed automation action, automation {}, device {}, action {}",
                automation.name, action.device, action.action
            );
        }

        info!("automation {} processed", automation.name);
        Ok(())
    }

    /// Runs every trigger in declaration order and returns one boolean per
    /// trigger: whether all of its conditions held. Any failure aborts the
    /// whole automation pass.
    async fn process_triggers(
        &self,
        definition: &AutomationDefinition,
    ) -> Result<Vec<bool>, AutomationError> {
        let mut results = Vec::with_capacity(definition.triggers.len());

        for trigger in &definition.triggers {
            let response = self
                .dispatch(&trigger.device, &trigger.action)
                .await
                .map_err(|source| AutomationError::Trigger {
                    device: trigger.device.clone(),
                    action: trigger.action.clone(),
                    source,
                })?;

            info!(
                "successfully executed trigger, device {}, action {}",
                trigger.device, trigger.action
            );

            let payload = match response.result {
                Some(Value::Object(map)) => map,
                _ => {
                    return Err(AutomationError::TriggerResponse {
                        device: trigger.device.clone(),
                        action: trigger.action.clone(),
                        detail: "result is not a JSON object".to_string(),
                    })
                }
            };

            let mut met = true;
            for condition in &trigger.conditions {
                let value = conditions::get_field(&payload, &condition.field).map_err(
                    |source| AutomationError::Conditions {
                        device: trigger.device.clone(),
                        action: trigger.action.clone(),
                        field: condition.field.clone(),
                        source,
                    },
                )?;

                if !conditions::apply_operator(value, &condition.operator, condition.threshold) {
                    met = false;
                    break;
                }
            }

            results.push(met);
        }

        Ok(results)
    }

    /// Resolves the textual device/action names through the cache and runs
    /// the executor.
    async fn dispatch(
        &self,
        device_name: &str,
        action_name: &str,
    ) -> Result<JsonRpcResponse, DispatchError> {
        let device_id = self
            .names
            .id_by_name(self.catalog.as_ref(), "devices", device_name)
            .await
            .map_err(DispatchError::DeviceLookup)?;

        let action_id = self
            .names
            .id_by_name(self.catalog.as_ref(), "actions", action_name)
            .await
            .map_err(DispatchError::ActionLookup)?;

        self.execute(device_id, action_id)
            .await
            .map_err(DispatchError::Execute)
    }
}
