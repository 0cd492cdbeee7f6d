use tokio_util::sync::CancellationToken;

/// How the reduce phase is driven once the map phase barrier has passed
/// Both strategies produce the same result for side-effect-free reduce functions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReduceStrategy {
    /// One key after another on a single thread
    #[default]
    Sequential,
    /// Keys are spread across the rayon thread pool
    Parallel,
}

/// Knobs for a single `Coordinator` run
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub reduce_strategy: ReduceStrategy,
    /// If set, cancelling the token aborts the map phase and fails the run
    pub cancellation: Option<CancellationToken>,
}

impl CoordinatorConfig {
    pub fn with_reduce_strategy(mut self, reduce_strategy: ReduceStrategy) -> Self {
        self.reduce_strategy = reduce_strategy;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}
