pub const DEFAULT_MAX_STALE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerServiceConfig {
    /// Recompute-and-retry attempts after a stale snapshot before giving up.
    pub max_stale_retries: u32,
}

impl Default for LedgerServiceConfig {
    fn default() -> Self {
        Self {
            max_stale_retries: DEFAULT_MAX_STALE_RETRIES,
        }
    }
}
