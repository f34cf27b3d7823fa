use crate::contract::IncidentRecord;

pub const INCIDENT_LOG_KEY_PREFIX: &str = "incident-log-";
pub const INCIDENT_LOG_KEY_SUFFIX: &str = ".txt";

/// Object key of the plain-text log for an incident, keyed by its primary
/// instance. A later incident on the same instance overwrites the object.
pub fn incident_log_object_key(instance_id: &str) -> String {
    format!("{INCIDENT_LOG_KEY_PREFIX}{instance_id}{INCIDENT_LOG_KEY_SUFFIX}")
}

/// Single-line log body listing every instance in the batch.
pub fn incident_log_line(record: &IncidentRecord) -> String {
    format!(
        "IncidentId: {}, InstanceId: [{}], Action: {}, Time: {}",
        record.incident_id,
        record.instance_ids().join(", "),
        record.action,
        record.timestamp,
    )
}
