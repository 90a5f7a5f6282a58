use std::time::Duration;

/// Default upper bound on a single payment gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default prefix of locally generated payment references.
pub const DEFAULT_REFERENCE_PREFIX: &str = "SUB";

/// Tunables of the settlement engine.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Gateway calls that take longer are abandoned. A timed-out status query
    /// leaves the attempt pending.
    pub gateway_timeout: Duration,
    pub reference_prefix: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
        }
    }
}

impl SettlementConfig {
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_reference_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reference_prefix = prefix.into();
        self
    }
}
