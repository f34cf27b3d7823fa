use std::collections::HashMap;
use std::future::Future;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::primitives::ByteStream;
use incident_response_core::contract::{DispatchResponse, IncidentRecord};
use incident_response_lambda::adapters::compute::InstanceController;
use incident_response_lambda::adapters::notifier::AlertNotifier;
use incident_response_lambda::adapters::object_store::IncidentLogStore;
use incident_response_lambda::adapters::record_store::IncidentRecordStore;
use incident_response_lambda::handlers::dispatch::{DispatcherConfig, IncidentDispatcher};
use incident_response_lambda::observability::{init_logging, LogFormat};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::debug;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

struct Ec2InstanceController {
    client: aws_sdk_ec2::Client,
}

impl InstanceController for Ec2InstanceController {
    fn stop_instances(&self, instance_ids: &[String]) -> Result<(), String> {
        let client = self.client.clone();
        let ids = instance_ids.to_vec();

        block_on(async move {
            let output = client
                .stop_instances()
                .set_instance_ids(Some(ids))
                .send()
                .await
                .map_err(|error| aws_sdk_ec2::error::DisplayErrorContext(error).to_string())?;
            for change in output.stopping_instances() {
                debug!(
                    instance_id = change.instance_id().unwrap_or_default(),
                    current_state = ?change.current_state().and_then(|state| state.name()),
                    "instance state change"
                );
            }
            Ok::<(), String>(())
        })
    }
}

struct S3IncidentLogStore {
    client: aws_sdk_s3::Client,
}

impl IncidentLogStore for S3IncidentLogStore {
    fn write_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String> {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();

        block_on(async move {
            client
                .put_object()
                .bucket(bucket)
                .key(object_key)
                .body(ByteStream::from(body_bytes))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| aws_sdk_s3::error::DisplayErrorContext(error).to_string())
        })
    }
}

struct DynamoIncidentRecordStore {
    client: aws_sdk_dynamodb::Client,
}

impl IncidentRecordStore for DynamoIncidentRecordStore {
    fn put_record(&self, table_name: &str, record: &IncidentRecord) -> Result<(), String> {
        let client = self.client.clone();
        let table_name = table_name.to_string();
        let item = record_item(record);

        block_on(async move {
            let output = client
                .put_item()
                .table_name(table_name)
                .set_item(Some(item))
                .send()
                .await
                .map_err(|error| {
                    aws_sdk_dynamodb::error::DisplayErrorContext(error).to_string()
                })?;
            debug!(response = ?output, "dynamodb put_item response");
            Ok::<(), String>(())
        })
    }
}

struct SnsAlertNotifier {
    client: aws_sdk_sns::Client,
}

impl AlertNotifier for SnsAlertNotifier {
    fn publish(
        &self,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> Result<Option<String>, String> {
        let client = self.client.clone();
        let topic_arn = topic_arn.to_string();
        let subject = subject.to_string();
        let message = message.to_string();

        block_on(async move {
            client
                .publish()
                .topic_arn(topic_arn)
                .subject(subject)
                .message(message)
                .send()
                .await
                .map(|output| output.message_id().map(str::to_string))
                .map_err(|error| aws_sdk_sns::error::DisplayErrorContext(error).to_string())
        })
    }
}

/// DynamoDB item for an incident row. `AdditionalInstanceIds` is a list so
/// request order and repeated ids survive; it is only written for batches.
fn record_item(record: &IncidentRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        (
            "IncidentId".to_string(),
            AttributeValue::S(record.incident_id.to_string()),
        ),
        (
            "InstanceId".to_string(),
            AttributeValue::S(record.instance_id.clone()),
        ),
        (
            "Action".to_string(),
            AttributeValue::S(record.action.clone()),
        ),
        (
            "Timestamp".to_string(),
            AttributeValue::S(record.timestamp.clone()),
        ),
        (
            "Source".to_string(),
            AttributeValue::S(record.source.as_str().to_string()),
        ),
    ]);

    if !record.additional_instance_ids.is_empty() {
        item.insert(
            "AdditionalInstanceIds".to_string(),
            AttributeValue::L(
                record
                    .additional_instance_ids
                    .iter()
                    .map(|id| AttributeValue::S(id.clone()))
                    .collect(),
            ),
        );
    }
    if let Some(finding_id) = &record.finding_id {
        item.insert(
            "FindingId".to_string(),
            AttributeValue::S(finding_id.clone()),
        );
    }
    if let Some(finding_type) = &record.finding_type {
        item.insert(
            "FindingType".to_string(),
            AttributeValue::S(finding_type.clone()),
        );
    }

    item
}

struct RuntimeDependencies {
    compute: Ec2InstanceController,
    log_store: S3IncidentLogStore,
    record_store: DynamoIncidentRecordStore,
    notifier: SnsAlertNotifier,
}

impl RuntimeDependencies {
    fn new(aws_config: &aws_config::SdkConfig) -> Self {
        Self {
            compute: Ec2InstanceController {
                client: aws_sdk_ec2::Client::new(aws_config),
            },
            log_store: S3IncidentLogStore {
                client: aws_sdk_s3::Client::new(aws_config),
            },
            record_store: DynamoIncidentRecordStore {
                client: aws_sdk_dynamodb::Client::new(aws_config),
            },
            notifier: SnsAlertNotifier {
                client: aws_sdk_sns::Client::new(aws_config),
            },
        }
    }
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<DispatchResponse, Error> {
    let dispatcher = IncidentDispatcher::new(
        DispatcherConfig::default(),
        &deps.compute,
        &deps.log_store,
        &deps.record_store,
        &deps.notifier,
    );

    let span = tracing::info_span!("invocation", request_id = %event.context.request_id);
    Ok(span.in_scope(|| dispatcher.handle(&event.payload)))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging(LogFormat::from_env());

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies::new(&aws_config);
    let deps = &deps;

    lambda_runtime::run(service_fn(move |event| handle_request(event, deps))).await
}
