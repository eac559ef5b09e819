//! Trigger intake: turns trigger requests into run creation calls.
//!
//! Nothing here polls. Schedulers, drift monitors and data watchers live
//! outside the engine and call in when their own condition fires; the
//! `*TriggerConfig` evaluators let them share the threshold rules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    EngineError,
    caller::{Caller, Role},
    lifecycle::RunLifecycle,
    models::{RunSnapshot, TriggerType},
    store::PipelineStore,
};

/// Body of a trigger call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub trigger_type: TriggerType,
    /// Runtime overrides stored on the run and passed to every task.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl TriggerRequest {
    pub fn manual(parameters: Map<String, Value>) -> Self {
        Self { trigger_type: TriggerType::Manual, parameters }
    }
}

// ---------------------------------------------------------------------------
// Trigger configurations
// ---------------------------------------------------------------------------

fn default_drift_threshold() -> f64 {
    0.3
}

fn default_drift_interval() -> u32 {
    60
}

fn default_min_records() -> u64 {
    1000
}

fn default_arrival_interval() -> u32 {
    15
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn check_interval(minutes: u32) -> Result<(), EngineError> {
    if minutes == 0 {
        return Err(EngineError::Validation(
            "check_interval_minutes must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Fire when a deployment's drift score exceeds a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftTriggerConfig {
    pub deployment_id: Uuid,
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    #[serde(default = "default_drift_interval")]
    pub check_interval_minutes: u32,
}

impl DriftTriggerConfig {
    pub fn new(deployment_id: Uuid) -> Self {
        Self {
            deployment_id,
            drift_threshold: default_drift_threshold(),
            check_interval_minutes: default_drift_interval(),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            return Err(EngineError::Validation(
                "drift_threshold must be between 0 and 1".into(),
            ));
        }
        check_interval(self.check_interval_minutes)
    }

    /// Strictly greater than the threshold.
    pub fn is_breached(&self, drift_score: f64) -> bool {
        drift_score > self.drift_threshold
    }
}

/// Fire once enough new records have landed at a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataArrivalTriggerConfig {
    pub source_path: String,
    #[serde(default = "default_min_records")]
    pub min_records: u64,
    #[serde(default = "default_arrival_interval")]
    pub check_interval_minutes: u32,
}

impl DataArrivalTriggerConfig {
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            min_records: default_min_records(),
            check_interval_minutes: default_arrival_interval(),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source_path.trim().is_empty() {
            return Err(EngineError::Validation("source_path must not be empty".into()));
        }
        if self.min_records == 0 {
            return Err(EngineError::Validation("min_records must be at least 1".into()));
        }
        check_interval(self.check_interval_minutes)
    }

    pub fn is_satisfied(&self, record_count: u64) -> bool {
        record_count >= self.min_records
    }
}

/// Cron schedule evaluated by an external scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTriggerConfig {
    pub cron_expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl ScheduleTriggerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_cron(&self.cron_expression)?;
        if self.timezone.trim().is_empty() {
            return Err(EngineError::Validation("timezone must not be empty".into()));
        }
        Ok(())
    }
}

/// Shallow syntax check of a five-field cron expression
/// (`minute hour day-of-month month day-of-week`).
///
/// Field ranges are left to the scheduler that evaluates the expression.
pub fn validate_cron(expr: &str) -> Result<(), EngineError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(EngineError::Validation(format!(
            "cron expression must have 5 fields, found {}",
            fields.len()
        )));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-' | '?');
    if let Some(bad) = fields.iter().find(|f| !f.chars().all(allowed)) {
        return Err(EngineError::Validation(format!(
            "invalid cron field '{bad}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TriggerIntake
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TriggerIntake {
    store: Arc<dyn PipelineStore>,
    lifecycle: RunLifecycle,
}

impl TriggerIntake {
    pub fn new(lifecycle: RunLifecycle) -> Self {
        Self { store: Arc::clone(lifecycle.store()), lifecycle }
    }

    /// Create a run for `pipeline_id`.
    ///
    /// # Errors
    /// `NotFound` if the pipeline does not exist for the caller's tenant,
    /// `PipelineDisabled` if it is disabled.
    #[instrument(
        skip(self, caller, request),
        fields(tenant_id = %caller.tenant_id, trigger_type = %request.trigger_type)
    )]
    pub async fn trigger(
        &self,
        caller: &Caller,
        pipeline_id: Uuid,
        request: TriggerRequest,
    ) -> Result<RunSnapshot, EngineError> {
        caller.require(Role::MlEngineer)?;
        let pipeline = self
            .store
            .get_pipeline(caller.tenant_id, pipeline_id)
            .await?
            .ok_or_else(|| EngineError::not_found("pipeline", pipeline_id))?;

        let snapshot = self
            .lifecycle
            .create_run(caller, &pipeline, request.trigger_type, request.parameters)
            .await?;
        info!(run_id = %snapshot.run.id, "pipeline triggered");
        Ok(snapshot)
    }

    /// Trigger a `drift` run if `drift_score` breaches the configured
    /// threshold. The score is stored in the run parameters as `drift_score`.
    #[instrument(skip(self, caller, config, parameters), fields(tenant_id = %caller.tenant_id))]
    pub async fn on_drift(
        &self,
        caller: &Caller,
        pipeline_id: Uuid,
        config: &DriftTriggerConfig,
        drift_score: f64,
        mut parameters: Map<String, Value>,
    ) -> Result<Option<RunSnapshot>, EngineError> {
        config.validate()?;
        if !config.is_breached(drift_score) {
            debug!(drift_score, threshold = config.drift_threshold, "drift below threshold");
            return Ok(None);
        }

        parameters.insert("drift_score".into(), json!(drift_score));
        parameters.insert("deployment_id".into(), json!(config.deployment_id));
        let request = TriggerRequest { trigger_type: TriggerType::Drift, parameters };
        self.trigger(caller, pipeline_id, request).await.map(Some)
    }

    /// Trigger a `data_arrival` run once `record_count` reaches the
    /// configured minimum. The count is stored as `record_count`.
    #[instrument(skip(self, caller, config, parameters), fields(tenant_id = %caller.tenant_id))]
    pub async fn on_data_arrival(
        &self,
        caller: &Caller,
        pipeline_id: Uuid,
        config: &DataArrivalTriggerConfig,
        record_count: u64,
        mut parameters: Map<String, Value>,
    ) -> Result<Option<RunSnapshot>, EngineError> {
        config.validate()?;
        if !config.is_satisfied(record_count) {
            debug!(record_count, min_records = config.min_records, "not enough data yet");
            return Ok(None);
        }

        parameters.insert("record_count".into(), json!(record_count));
        parameters.insert("source_path".into(), json!(config.source_path));
        let request = TriggerRequest { trigger_type: TriggerType::DataArrival, parameters };
        self.trigger(caller, pipeline_id, request).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_breach_is_strictly_above_threshold() {
        let config = DriftTriggerConfig::new(Uuid::new_v4());
        assert!(!config.is_breached(0.3));
        assert!(config.is_breached(0.31));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn drift_threshold_outside_unit_interval_is_invalid() {
        let mut config = DriftTriggerConfig::new(Uuid::new_v4());
        config.drift_threshold = 1.5;
        assert!(matches!(config.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn data_arrival_defaults_apply_when_omitted() {
        let config: DataArrivalTriggerConfig =
            serde_json::from_value(json!({ "source_path": "s3://bucket/events" })).unwrap();
        assert_eq!(config.min_records, 1000);
        assert_eq!(config.check_interval_minutes, 15);
        assert!(config.is_satisfied(1000));
        assert!(!config.is_satisfied(999));
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let mut config = DataArrivalTriggerConfig::new("/data/in");
        config.check_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cron_needs_five_fields() {
        assert!(validate_cron("0 3 * * *").is_ok());
        assert!(validate_cron("*/15 9-17 * * MON-FRI").is_ok());
        assert!(validate_cron("0 3 * *").is_err());
        assert!(validate_cron("0 3 * * * *").is_err());
        assert!(validate_cron("0 3 * * ;").is_err());
    }

    #[test]
    fn schedule_timezone_defaults_to_utc() {
        let config: ScheduleTriggerConfig =
            serde_json::from_value(json!({ "cron_expression": "0 0 * * 0" })).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn trigger_request_defaults_to_manual() {
        let request: TriggerRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.trigger_type, TriggerType::Manual);
        assert!(request.parameters.is_empty());
    }
}
