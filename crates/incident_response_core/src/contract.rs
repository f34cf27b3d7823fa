use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trigger::{FindingContext, TriggerEvent, TriggerSource};

pub const ACTION_STOPPED: &str = "stopped";
pub const DEFAULT_LOG_BUCKET: &str = "incident-response-logs-345483430467";
pub const DEFAULT_TABLE_NAME: &str = "IncidentMetadata";
pub const DEFAULT_ALERT_TOPIC_ARN: &str = "arn:aws:sns:us-east-1:345483430467:IR-Alerts";

/// Durable audit entry for one remediation.
///
/// Serialized field names match the attribute names persisted to the
/// structured store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct IncidentRecord {
    pub incident_id: Uuid,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_instance_ids: Vec<String>,
    pub action: String,
    pub timestamp: String,
    pub source: TriggerSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_type: Option<String>,
}

impl IncidentRecord {
    /// Opens a record for a freshly stopped batch with a new identifier and
    /// the current UTC time.
    pub fn open(trigger: &TriggerEvent) -> Self {
        Self::open_at(trigger, Uuid::new_v4(), Utc::now())
    }

    pub fn open_at(trigger: &TriggerEvent, incident_id: Uuid, now: DateTime<Utc>) -> Self {
        let FindingContext {
            finding_id,
            finding_type,
        } = trigger.finding().cloned().unwrap_or_default();

        Self {
            incident_id,
            instance_id: trigger.primary_instance_id().to_string(),
            additional_instance_ids: trigger.additional_instance_ids().to_vec(),
            action: ACTION_STOPPED.to_string(),
            timestamp: format_timestamp(now),
            source: trigger.source(),
            finding_id,
            finding_type,
        }
    }

    /// Every instance covered by this record, primary first.
    pub fn instance_ids(&self) -> Vec<String> {
        std::iter::once(self.instance_id.clone())
            .chain(self.additional_instance_ids.iter().cloned())
            .collect()
    }
}

pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Flat invocation result returned to the caller. Callers distinguish
/// outcomes by the `status` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status")]
pub enum DispatchResponse {
    #[serde(rename = "no instances found")]
    NoInstancesFound,
    #[serde(rename = "success")]
    Success {
        incident_id: String,
        stopped_instances: Vec<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl DispatchResponse {
    pub fn status(&self) -> &'static str {
        match self {
            Self::NoInstancesFound => "no instances found",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }
}
