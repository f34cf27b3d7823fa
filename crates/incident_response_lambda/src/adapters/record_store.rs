use incident_response_core::contract::IncidentRecord;

/// Structured store receiving one row per incident, keyed by `IncidentId`.
pub trait IncidentRecordStore {
    fn put_record(&self, table_name: &str, record: &IncidentRecord) -> Result<(), String>;
}
