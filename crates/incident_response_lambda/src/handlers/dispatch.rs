use incident_response_core::alert::{alert_message, ALERT_SUBJECT};
use incident_response_core::contract::{
    DispatchResponse, IncidentRecord, DEFAULT_ALERT_TOPIC_ARN, DEFAULT_LOG_BUCKET,
    DEFAULT_TABLE_NAME,
};
use incident_response_core::storage_keys::{incident_log_line, incident_log_object_key};
use incident_response_core::trigger::{normalize_event, ExtractionError, TriggerEvent};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::adapters::compute::InstanceController;
use crate::adapters::notifier::AlertNotifier;
use crate::adapters::object_store::IncidentLogStore;
use crate::adapters::record_store::IncidentRecordStore;
use crate::observability::COMPONENT;

/// Fixed destinations for the audit trail and the alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub log_bucket: String,
    pub table_name: String,
    pub topic_arn: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            log_bucket: DEFAULT_LOG_BUCKET.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            topic_arn: DEFAULT_ALERT_TOPIC_ARN.to_string(),
        }
    }
}

/// Failure of one workflow stage. Stages that already completed are not
/// rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("failed to stop instances: {0}")]
    Remediation(String),
    #[error("failed to write incident log object: {0}")]
    ObjectWrite(String),
    #[error("failed to write incident record: {0}")]
    RecordWrite(String),
    #[error("failed to publish incident alert: {0}")]
    Notify(String),
}

impl DispatchError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Remediation(_) => "remediation",
            Self::ObjectWrite(_) => "object_write",
            Self::RecordWrite(_) => "record_write",
            Self::Notify(_) => "notify",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was stopped. `reason` is set when the event was malformed.
    NoTarget { reason: Option<ExtractionError> },
    Remediated {
        record: IncidentRecord,
        stopped_instances: Vec<String>,
    },
}

pub struct IncidentDispatcher<'a> {
    config: DispatcherConfig,
    compute: &'a dyn InstanceController,
    log_store: &'a dyn IncidentLogStore,
    record_store: &'a dyn IncidentRecordStore,
    notifier: &'a dyn AlertNotifier,
}

impl<'a> IncidentDispatcher<'a> {
    pub fn new(
        config: DispatcherConfig,
        compute: &'a dyn InstanceController,
        log_store: &'a dyn IncidentLogStore,
        record_store: &'a dyn IncidentRecordStore,
        notifier: &'a dyn AlertNotifier,
    ) -> Self {
        Self {
            config,
            compute,
            log_store,
            record_store,
            notifier,
        }
    }

    /// Runs the workflow and flattens the result into the invocation
    /// response.
    pub fn handle(&self, event: &Value) -> DispatchResponse {
        match self.dispatch(event) {
            Ok(DispatchOutcome::NoTarget { .. }) => DispatchResponse::NoInstancesFound,
            Ok(DispatchOutcome::Remediated {
                record,
                stopped_instances,
            }) => DispatchResponse::Success {
                incident_id: record.incident_id.to_string(),
                stopped_instances,
            },
            Err(error) => DispatchResponse::Error {
                message: error.to_string(),
            },
        }
    }

    /// Stops the targeted instances, then records and announces the
    /// incident. Each step runs only after the previous one succeeded.
    pub fn dispatch(&self, event: &Value) -> Result<DispatchOutcome, DispatchError> {
        let span = info_span!("incident_dispatch", component = COMPONENT);
        let _guard = span.enter();

        let trigger = match normalize_event(event) {
            Ok(Some(trigger)) => trigger,
            Ok(None) => {
                info!(event = "no_target", "no instances to stop");
                return Ok(DispatchOutcome::NoTarget { reason: None });
            }
            Err(reason) => {
                warn!(
                    event = "extraction_failed",
                    error = %reason,
                    "could not extract instance id from event"
                );
                return Ok(DispatchOutcome::NoTarget {
                    reason: Some(reason),
                });
            }
        };

        let instance_ids = trigger.instance_ids();
        match self.remediate_and_record(&trigger, &instance_ids) {
            Ok(record) => Ok(DispatchOutcome::Remediated {
                record,
                stopped_instances: instance_ids,
            }),
            Err(dispatch_error) => {
                error!(
                    event = "dispatch_failed",
                    stage = dispatch_error.stage(),
                    instance_ids = ?instance_ids,
                    error = %dispatch_error,
                    "incident dispatch aborted"
                );
                Err(dispatch_error)
            }
        }
    }

    fn remediate_and_record(
        &self,
        trigger: &TriggerEvent,
        instance_ids: &[String],
    ) -> Result<IncidentRecord, DispatchError> {
        self.compute
            .stop_instances(instance_ids)
            .map_err(DispatchError::Remediation)?;
        info!(
            event = "instances_stopped",
            instance_ids = ?instance_ids,
            "stop requested"
        );

        let record = IncidentRecord::open(trigger);
        let log_key = incident_log_object_key(&record.instance_id);
        self.log_store
            .write_object(
                &self.config.log_bucket,
                &log_key,
                incident_log_line(&record).as_bytes(),
            )
            .map_err(DispatchError::ObjectWrite)?;
        info!(
            event = "incident_log_written",
            incident_id = %record.incident_id,
            bucket = %self.config.log_bucket,
            key = %log_key,
            "incident log object written"
        );

        self.record_store
            .put_record(&self.config.table_name, &record)
            .map_err(DispatchError::RecordWrite)?;
        debug!(
            event = "incident_record_written",
            incident_id = %record.incident_id,
            table = %self.config.table_name,
            "incident record written"
        );

        let message_id = self
            .notifier
            .publish(&self.config.topic_arn, ALERT_SUBJECT, &alert_message(&record))
            .map_err(DispatchError::Notify)?;
        info!(
            event = "alert_published",
            incident_id = %record.incident_id,
            message_id = message_id.as_deref().unwrap_or("unknown"),
            "incident alert published"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingController {
        batches: Mutex<Vec<Vec<String>>>,
        fail_with: Option<&'static str>,
    }

    impl RecordingController {
        fn failing(message: &'static str) -> Self {
            Self {
                fail_with: Some(message),
                ..Self::default()
            }
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().expect("poisoned mutex").clone()
        }
    }

    impl InstanceController for RecordingController {
        fn stop_instances(&self, instance_ids: &[String]) -> Result<(), String> {
            if let Some(message) = self.fail_with {
                return Err(message.to_string());
            }
            self.batches
                .lock()
                .expect("poisoned mutex")
                .push(instance_ids.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLogStore {
        writes: Mutex<Vec<(String, String, Vec<u8>)>>,
        fail_with: Option<&'static str>,
    }

    impl RecordingLogStore {
        fn failing(message: &'static str) -> Self {
            Self {
                fail_with: Some(message),
                ..Self::default()
            }
        }

        fn writes(&self) -> Vec<(String, String, Vec<u8>)> {
            self.writes.lock().expect("poisoned mutex").clone()
        }
    }

    impl IncidentLogStore for RecordingLogStore {
        fn write_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String> {
            if let Some(message) = self.fail_with {
                return Err(message.to_string());
            }
            self.writes.lock().expect("poisoned mutex").push((
                bucket.to_string(),
                key.to_string(),
                body.to_vec(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRecordStore {
        rows: Mutex<Vec<(String, IncidentRecord)>>,
        fail_with: Option<&'static str>,
    }

    impl RecordingRecordStore {
        fn failing(message: &'static str) -> Self {
            Self {
                fail_with: Some(message),
                ..Self::default()
            }
        }

        fn rows(&self) -> Vec<(String, IncidentRecord)> {
            self.rows.lock().expect("poisoned mutex").clone()
        }
    }

    impl IncidentRecordStore for RecordingRecordStore {
        fn put_record(&self, table_name: &str, record: &IncidentRecord) -> Result<(), String> {
            if let Some(message) = self.fail_with {
                return Err(message.to_string());
            }
            self.rows
                .lock()
                .expect("poisoned mutex")
                .push((table_name.to_string(), record.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        published: Mutex<Vec<(String, String, String)>>,
        fail_with: Option<&'static str>,
    }

    impl RecordingNotifier {
        fn failing(message: &'static str) -> Self {
            Self {
                fail_with: Some(message),
                ..Self::default()
            }
        }

        fn published(&self) -> Vec<(String, String, String)> {
            self.published.lock().expect("poisoned mutex").clone()
        }
    }

    impl AlertNotifier for RecordingNotifier {
        fn publish(
            &self,
            topic_arn: &str,
            subject: &str,
            message: &str,
        ) -> Result<Option<String>, String> {
            if let Some(failure) = self.fail_with {
                return Err(failure.to_string());
            }
            self.published.lock().expect("poisoned mutex").push((
                topic_arn.to_string(),
                subject.to_string(),
                message.to_string(),
            ));
            Ok(Some("msg-1".to_string()))
        }
    }

    struct Harness {
        compute: RecordingController,
        log_store: RecordingLogStore,
        record_store: RecordingRecordStore,
        notifier: RecordingNotifier,
    }

    impl Harness {
        fn passing() -> Self {
            Self {
                compute: RecordingController::default(),
                log_store: RecordingLogStore::default(),
                record_store: RecordingRecordStore::default(),
                notifier: RecordingNotifier::default(),
            }
        }

        fn dispatcher(&self) -> IncidentDispatcher<'_> {
            IncidentDispatcher::new(
                DispatcherConfig::default(),
                &self.compute,
                &self.log_store,
                &self.record_store,
                &self.notifier,
            )
        }

        fn assert_untouched(&self) {
            assert!(self.compute.batches().is_empty());
            assert!(self.log_store.writes().is_empty());
            assert!(self.record_store.rows().is_empty());
            assert!(self.notifier.published().is_empty());
        }
    }

    fn finding_event(instance_id: Value) -> Value {
        json!({
            "detail-type": "GuardDuty Finding",
            "source": "aws.guardduty",
            "detail": {
                "id": "finding-7",
                "type": "UnauthorizedAccess:EC2/SSHBruteForce",
                "resource": {
                    "instanceDetails": {"instanceId": instance_id}
                }
            }
        })
    }

    #[test]
    fn manual_batch_is_stopped_verbatim_and_echoed() {
        let harness = Harness::passing();
        let ids = vec!["i-0a".to_string(), "i-0b".to_string(), "i-0c".to_string()];

        let response = harness
            .dispatcher()
            .handle(&json!({"instance_ids": ids.clone()}));

        let DispatchResponse::Success {
            stopped_instances, ..
        } = response
        else {
            panic!("manual dispatch should succeed");
        };
        assert_eq!(stopped_instances, ids);
        assert_eq!(harness.compute.batches(), vec![ids]);
    }

    #[test]
    fn multi_instance_batch_records_primary_and_additional_ids() {
        let harness = Harness::passing();
        harness
            .dispatcher()
            .dispatch(&json!({"instance_ids": ["i-1", "i-2"]}))
            .expect("dispatch should succeed");

        let writes = harness.log_store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, "incident-log-i-1.txt");
        let body = String::from_utf8(writes[0].2.clone()).expect("log body should be utf-8");
        assert!(body.contains("InstanceId: [i-1, i-2]"));

        let rows = harness.record_store.rows();
        assert_eq!(rows[0].1.instance_id, "i-1");
        assert_eq!(rows[0].1.additional_instance_ids, vec!["i-2"]);

        let published = harness.notifier.published();
        assert!(published[0].2.contains("Additional instances stopped: i-2."));
    }

    #[test]
    fn finding_behaves_like_single_manual_instance() {
        let finding_harness = Harness::passing();
        let manual_harness = Harness::passing();

        let finding_response = finding_harness
            .dispatcher()
            .handle(&finding_event(json!("i-0f00")));
        let manual_response = manual_harness
            .dispatcher()
            .handle(&json!({"instance_ids": ["i-0f00"]}));

        assert_eq!(finding_response.status(), manual_response.status());
        assert_eq!(
            finding_harness.compute.batches(),
            manual_harness.compute.batches()
        );
        assert_eq!(
            finding_harness.log_store.writes()[0].1,
            manual_harness.log_store.writes()[0].1
        );

        let DispatchResponse::Success {
            stopped_instances, ..
        } = finding_response
        else {
            panic!("finding dispatch should succeed");
        };
        assert_eq!(stopped_instances, vec!["i-0f00"]);

        let row = &finding_harness.record_store.rows()[0].1;
        assert_eq!(row.finding_id.as_deref(), Some("finding-7"));
    }

    #[test]
    fn missing_or_null_targets_return_no_instances_without_side_effects() {
        let events = [
            json!({}),
            json!({"instance_ids": []}),
            json!({"detail": {}}),
            json!({"detail": {"resource": {}}}),
            json!({"detail": {"resource": null}}),
            json!({"detail": {"resource": {"instanceDetails": null}}}),
            json!({"detail": {"resource": {"instanceDetails": {}}}}),
            finding_event(Value::Null),
            finding_event(json!("")),
        ];

        for event in events {
            let harness = Harness::passing();
            let response = harness.dispatcher().handle(&event);

            assert_eq!(
                serde_json::to_value(&response).expect("response should serialize"),
                json!({"status": "no instances found"}),
                "event: {event}"
            );
            harness.assert_untouched();
        }
    }

    #[test]
    fn malformed_finding_reports_extraction_reason() {
        let harness = Harness::passing();
        let outcome = harness
            .dispatcher()
            .dispatch(&finding_event(json!(42)))
            .expect("malformed finding should not fail dispatch");

        assert!(matches!(
            outcome,
            DispatchOutcome::NoTarget {
                reason: Some(ExtractionError::InvalidField(_))
            }
        ));
        harness.assert_untouched();
    }

    #[test]
    fn incident_ids_are_unique_across_invocations() {
        let harness = Harness::passing();
        let dispatcher = harness.dispatcher();
        let event = json!({"instance_ids": ["i-0123"]});

        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            let DispatchResponse::Success { incident_id, .. } = dispatcher.handle(&event) else {
                panic!("dispatch should succeed");
            };
            uuid::Uuid::parse_str(&incident_id).expect("incident id should be a uuid");
            seen.insert(incident_id);
        }

        assert_eq!(seen.len(), 1_000);
        assert_eq!(harness.record_store.rows().len(), 1_000);
    }

    #[test]
    fn remediation_failure_skips_every_downstream_step() {
        let harness = Harness {
            compute: RecordingController::failing("UnauthorizedOperation"),
            ..Harness::passing()
        };

        let error = harness
            .dispatcher()
            .dispatch(&json!({"instance_ids": ["i-0123"]}))
            .expect_err("remediation failure should abort");
        assert_eq!(
            error,
            DispatchError::Remediation("UnauthorizedOperation".to_string())
        );

        let response = harness
            .dispatcher()
            .handle(&json!({"instance_ids": ["i-0123"]}));
        let DispatchResponse::Error { message } = response else {
            panic!("expected error response");
        };
        assert!(message.contains("UnauthorizedOperation"));

        assert!(harness.log_store.writes().is_empty());
        assert!(harness.record_store.rows().is_empty());
        assert!(harness.notifier.published().is_empty());
    }

    #[test]
    fn object_write_failure_stops_before_record_and_alert() {
        let harness = Harness {
            log_store: RecordingLogStore::failing("AccessDenied"),
            ..Harness::passing()
        };

        let error = harness
            .dispatcher()
            .dispatch(&json!({"instance_ids": ["i-0123"]}))
            .expect_err("object write failure should abort");

        assert_eq!(error.stage(), "object_write");
        assert_eq!(harness.compute.batches().len(), 1);
        assert!(harness.record_store.rows().is_empty());
        assert!(harness.notifier.published().is_empty());
    }

    #[test]
    fn record_write_failure_keeps_object_log_and_skips_alert() {
        let harness = Harness {
            record_store: RecordingRecordStore::failing("ResourceNotFoundException"),
            ..Harness::passing()
        };

        let response = harness
            .dispatcher()
            .handle(&json!({"instance_ids": ["i-0123"]}));

        assert_eq!(response.status(), "error");
        assert_eq!(harness.log_store.writes().len(), 1);
        assert!(harness.notifier.published().is_empty());
    }

    #[test]
    fn notify_failure_is_reported_after_both_writes() {
        let harness = Harness {
            notifier: RecordingNotifier::failing("topic does not exist"),
            ..Harness::passing()
        };

        let error = harness
            .dispatcher()
            .dispatch(&json!({"instance_ids": ["i-0123"]}))
            .expect_err("notify failure should surface");

        assert_eq!(error.stage(), "notify");
        assert_eq!(
            error.to_string(),
            "failed to publish incident alert: topic does not exist"
        );
        assert_eq!(harness.log_store.writes().len(), 1);
        assert_eq!(harness.record_store.rows().len(), 1);
    }

    #[test]
    fn writes_go_to_configured_destinations() {
        let harness = Harness::passing();
        let config = DispatcherConfig {
            log_bucket: "test-bucket".to_string(),
            table_name: "TestIncidents".to_string(),
            topic_arn: "arn:aws:sns:eu-west-1:000000000000:test".to_string(),
        };
        let dispatcher = IncidentDispatcher::new(
            config,
            &harness.compute,
            &harness.log_store,
            &harness.record_store,
            &harness.notifier,
        );

        dispatcher
            .dispatch(&json!({"instance_ids": ["i-9"]}))
            .expect("dispatch should succeed");

        assert_eq!(harness.log_store.writes()[0].0, "test-bucket");
        assert_eq!(harness.record_store.rows()[0].0, "TestIncidents");
        let published = harness.notifier.published();
        assert_eq!(published[0].0, "arn:aws:sns:eu-west-1:000000000000:test");
        assert_eq!(published[0].1, ALERT_SUBJECT);
    }
}
