pub mod compute;
pub mod notifier;
pub mod object_store;
pub mod record_store;
