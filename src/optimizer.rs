use crate::config::PlannerConfig;
use crate::error::OptResult;
use crate::plan::{RelCluster, RelId};

/// State shared by every optimizer working on one planning session.
#[derive(Debug, Clone, Default)]
pub struct OptimizerContext {
    config: PlannerConfig,
}

impl OptimizerContext {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }
}

/// An optimizer searches for a better plan equivalent to the one it is given.
pub trait Optimizer {
    fn context(&self) -> &OptimizerContext {
        self.cluster().context()
    }

    fn cluster(&self) -> &RelCluster;

    fn cluster_mut(&mut self) -> &mut RelCluster;

    /// Registers `id` and returns the node that represents it in this optimizer, which is an
    /// equivalent node registered earlier if one exists.
    fn ensure_registered(&mut self, id: RelId) -> OptResult<RelId>;

    fn set_root(&mut self, id: RelId) -> OptResult<()>;

    fn find_best_plan(&mut self) -> OptResult<RelId>;
}
