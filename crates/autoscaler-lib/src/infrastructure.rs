//! Collaborators shared by every evaluation

use crate::models::Zone;
use crate::repository::NodeRepository;
use crate::resources::{CapacityPolicies, NodeResourceLimits, ResourcesCalculator};
use crate::tunables::Tunables;
use std::sync::Arc;

#[derive(Clone)]
pub struct Infrastructure {
    pub zone: Zone,
    pub node_repository: Arc<dyn NodeRepository>,
    pub calculator: Arc<dyn ResourcesCalculator>,
    pub limits: NodeResourceLimits,
    pub policies: CapacityPolicies,
    pub tunables: Tunables,
}

impl Infrastructure {
    pub fn new(
        zone: Zone,
        node_repository: Arc<dyn NodeRepository>,
        calculator: Arc<dyn ResourcesCalculator>,
    ) -> Self {
        Self {
            zone,
            node_repository,
            calculator,
            limits: NodeResourceLimits::default(),
            policies: CapacityPolicies,
            tunables: Tunables::default(),
        }
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    pub fn with_limits(mut self, limits: NodeResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}
