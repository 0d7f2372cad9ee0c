#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Include raw source values in warnings and log events.
    pub log_data: bool,
    /// Emit a trace event for every produced row.
    pub debug: bool,
}

impl EngineOptions {
    pub fn with_log_data(mut self, log_data: bool) -> Self {
        self.log_data = log_data;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
