use std::time::Duration;

/// Delay ladder for stream reconnects. After the last rung the delay holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delays: Vec<Duration>,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_millis(30),
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(50),
            ],
            max_attempts: 5000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retrying after `attempt` consecutive failures (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or_default()
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
