use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MANUAL_INSTANCE_IDS_FIELD: &str = "instance_ids";

/// Where an invocation's targets came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Manual,
    GuardDuty,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::GuardDuty => "guardduty",
        }
    }
}

/// Identity of the detection-service finding that triggered remediation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingContext {
    pub finding_id: Option<String>,
    pub finding_type: Option<String>,
}

/// A normalized trigger naming at least one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    source: TriggerSource,
    primary_instance_id: String,
    additional_instance_ids: Vec<String>,
    finding: Option<FindingContext>,
}

impl TriggerEvent {
    /// Returns `None` for an empty batch.
    pub fn new(
        source: TriggerSource,
        instance_ids: Vec<String>,
        finding: Option<FindingContext>,
    ) -> Option<Self> {
        let mut ids = instance_ids.into_iter();
        let primary_instance_id = ids.next()?;
        Some(Self {
            source,
            primary_instance_id,
            additional_instance_ids: ids.collect(),
            finding,
        })
    }

    pub fn source(&self) -> TriggerSource {
        self.source
    }

    pub fn primary_instance_id(&self) -> &str {
        &self.primary_instance_id
    }

    pub fn additional_instance_ids(&self) -> &[String] {
        &self.additional_instance_ids
    }

    /// The whole batch in request order, primary first.
    pub fn instance_ids(&self) -> Vec<String> {
        std::iter::once(self.primary_instance_id.clone())
            .chain(self.additional_instance_ids.iter().cloned())
            .collect()
    }

    pub fn finding(&self) -> Option<&FindingContext> {
        self.finding.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("event payload must be a JSON object")]
    NotAnObject,
    #[error("instance_ids must be an array of strings")]
    InvalidInstanceIds,
    #[error("finding is missing detail.resource.{0}")]
    MissingField(&'static str),
    #[error("finding field detail.resource.{0} must be a string")]
    InvalidField(&'static str),
    #[error("finding instanceId is empty")]
    EmptyInstanceId,
}

/// Extracts remediation targets from a raw invocation event.
///
/// `Ok(None)` means the event names no instance. Errors describe malformed
/// events; callers treat them as "no target" after logging.
pub fn normalize_event(event: &Value) -> Result<Option<TriggerEvent>, ExtractionError> {
    let Some(object) = event.as_object() else {
        return Err(ExtractionError::NotAnObject);
    };

    if let Some(raw_ids) = object.get(MANUAL_INSTANCE_IDS_FIELD) {
        let instance_ids = parse_instance_ids(raw_ids)?;
        return Ok(TriggerEvent::new(TriggerSource::Manual, instance_ids, None));
    }

    let Some(detail) = object.get("detail").and_then(Value::as_object) else {
        return Ok(None);
    };
    let Some(resource) = detail.get("resource") else {
        return Ok(None);
    };

    let instance_id = finding_instance_id(resource)?;
    let finding = FindingContext {
        finding_id: detail.get("id").and_then(Value::as_str).map(str::to_string),
        finding_type: detail
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    Ok(TriggerEvent::new(
        TriggerSource::GuardDuty,
        vec![instance_id],
        Some(finding),
    ))
}

fn parse_instance_ids(raw: &Value) -> Result<Vec<String>, ExtractionError> {
    let Some(values) = raw.as_array() else {
        return Err(ExtractionError::InvalidInstanceIds);
    };

    values
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or(ExtractionError::InvalidInstanceIds)
        })
        .collect()
}

fn finding_instance_id(resource: &Value) -> Result<String, ExtractionError> {
    let instance_details = match resource.get("instanceDetails") {
        None | Some(Value::Null) => return Err(ExtractionError::MissingField("instanceDetails")),
        Some(value) => value,
    };

    match instance_details.get("instanceId") {
        None | Some(Value::Null) => Err(ExtractionError::MissingField(
            "instanceDetails.instanceId",
        )),
        Some(Value::String(id)) if id.is_empty() => Err(ExtractionError::EmptyInstanceId),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(_) => Err(ExtractionError::InvalidField("instanceDetails.instanceId")),
    }
}
