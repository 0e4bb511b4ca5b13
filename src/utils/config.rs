/// Timing and policy knobs for a scenario run.
///
/// The defaults trade run time for stability on mid-range devices; deployments
/// with faster hardware can shorten the settle delays.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Pause before dispatching each action (ms)
    pub pre_action_delay_ms: u64,

    /// Pause before capturing post-action state, absorbing animation and
    /// network latency (ms)
    pub settle_delay_ms: u64,

    /// Existence-check timeout for conditional blocks (ms)
    pub condition_timeout_ms: u64,

    /// Timeout for explicit wait actions (ms)
    pub wait_timeout_ms: u64,

    /// Poll interval for visibility checks (ms)
    pub poll_interval_ms: u64,

    /// Total lookup attempts in the scroll-and-retry chain
    pub search_attempts: u32,

    /// Pause after a scroll gesture (ms)
    pub scroll_settle_ms: u64,

    /// Pause around focus taps and shell typing (ms)
    pub type_settle_ms: u64,

    /// Fail on malformed lines and missing includes instead of skipping
    pub strict: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pre_action_delay_ms: 500,
            settle_delay_ms: 1500,
            condition_timeout_ms: 2000,
            wait_timeout_ms: 30000,
            poll_interval_ms: 300,
            search_attempts: 4,
            scroll_settle_ms: 1000,
            type_settle_ms: 500,
            strict: false,
        }
    }
}
