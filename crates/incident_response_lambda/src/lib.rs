//! AWS-oriented adapters and handlers for automated incident response.
//!
//! This crate owns runtime integration details (the Lambda handler, the
//! collaborator seams for EC2, S3, DynamoDB and SNS, and logging setup) on
//! top of the domain primitives in `incident_response_core`.

pub mod adapters;
pub mod handlers;
pub mod observability;
