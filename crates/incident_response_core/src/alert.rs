use crate::contract::IncidentRecord;

pub const ALERT_SUBJECT: &str = "Incident Response Alert";

/// Human-readable alert body for responders.
pub fn alert_message(record: &IncidentRecord) -> String {
    let mut message = format!(
        "⚠️ Incident {}: EC2 instance {} was stopped at {}.",
        record.incident_id, record.instance_id, record.timestamp
    );
    if !record.additional_instance_ids.is_empty() {
        message.push_str(&format!(
            " Additional instances stopped: {}.",
            record.additional_instance_ids.join(", ")
        ));
    }
    if let Some(finding_type) = &record.finding_type {
        message.push_str(&format!(" GuardDuty finding: {finding_type}."));
    }
    message
}
