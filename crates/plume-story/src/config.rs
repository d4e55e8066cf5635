//! Configuration for a running story.

/// Configuration for a story instance.
#[derive(Debug, Clone)]
pub struct StoryConfig {
    /// RNG seed for shuffles and `RANDOM`.
    pub seed: u64,
    /// Maximum execution steps a single call may take.
    pub step_limit: usize,
    /// Path to start at. `None` starts at the first non-function knot.
    pub entry_point: Option<String>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            step_limit: 100_000,
            entry_point: None,
        }
    }
}

impl StoryConfig {
    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the step limit (at least 1).
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit.max(1);
        self
    }

    /// Start at `path` instead of the first knot.
    pub fn with_entry_point(mut self, path: impl Into<String>) -> Self {
        self.entry_point = Some(path.into());
        self
    }
}
