//! Simulation settings and results.

/// Settings for one simulation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationOptions {
    /// Compare each non-Source input against its threshold and report
    /// violations to the observer.
    pub max_flow_check: bool,
}

impl SimulationOptions {
    /// Options with threshold checking enabled.
    pub fn checked() -> Self {
        Self {
            max_flow_check: true,
        }
    }

    pub fn with_max_flow_check(mut self, enabled: bool) -> Self {
        self.max_flow_check = enabled;
        self
    }
}

/// Counts of what a simulation reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationSummary {
    /// Number of `notify_flow` calls.
    pub reported: usize,
    /// Number of `notify_flow_error` calls.
    pub violations: usize,
}
