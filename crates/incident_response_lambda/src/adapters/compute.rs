/// Compute control plane used to contain an instance.
pub trait InstanceController {
    /// Requests a stop for the whole batch in one call.
    fn stop_instances(&self, instance_ids: &[String]) -> Result<(), String>;
}
