pub trait AlertNotifier {
    /// Publishes one alert and returns the channel's message id, if any.
    fn publish(&self, topic_arn: &str, subject: &str, message: &str)
        -> Result<Option<String>, String>;
}
