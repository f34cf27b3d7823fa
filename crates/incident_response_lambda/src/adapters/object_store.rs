pub trait IncidentLogStore {
    fn write_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String>;
}
