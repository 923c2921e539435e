//! The autoscaling policy
//!
//! Each evaluation is stateless: the status is recomputed from the current
//! allocation and measurements every time.

use super::autoscaling::{Autoscaling, Status};
use super::cluster_model::ClusterModel;
use super::optimizer::AllocationOptimizer;
use crate::error::ModelError;
use crate::infrastructure::Infrastructure;
use crate::metrics::MetricsDb;
use crate::models::{Application, Cluster, Node};
use crate::resources::{ClusterResources, Limits};
use crate::tunables::Tunables;
use tracing::debug;

/// Fulfilment below this means the limits keep the cluster from its ideal
const FULL_FULFILMENT: f64 = 0.999_999_9;

pub struct Autoscaler {
    infrastructure: Infrastructure,
}

impl Autoscaler {
    pub fn new(infrastructure: Infrastructure) -> Self {
        Self { infrastructure }
    }

    pub fn infrastructure(&self) -> &Infrastructure {
        &self.infrastructure
    }

    /// Decides the allocation of `cluster` within its configured limits
    pub fn autoscale(
        &self,
        application: &Application,
        cluster: &Cluster,
        nodes: &[Node],
        db: &dyn MetricsDb,
    ) -> Result<Autoscaling, ModelError> {
        self.evaluate(application, cluster, nodes, db, cluster.limits.as_ref())
    }

    /// Decides the ideal allocation of `cluster` disregarding its limits
    pub fn suggest(
        &self,
        application: &Application,
        cluster: &Cluster,
        nodes: &[Node],
        db: &dyn MetricsDb,
    ) -> Result<Autoscaling, ModelError> {
        self.evaluate(application, cluster, nodes, db, None)
    }

    fn evaluate(
        &self,
        application: &Application,
        cluster: &Cluster,
        nodes: &[Node],
        db: &dyn MetricsDb,
        limits: Option<&Limits>,
    ) -> Result<Autoscaling, ModelError> {
        let model = ClusterModel::new(&self.infrastructure, application, cluster, nodes, db)?;
        if model.is_empty() {
            return Ok(Autoscaling::empty());
        }

        if limits.is_some_and(Limits::is_fixed) {
            return Ok(Autoscaling::dont_scale(
                Status::Unavailable,
                "Autoscaling is not enabled",
                &model,
            ));
        }

        if !self
            .infrastructure
            .node_repository
            .is_stable(&application.id, cluster.id())
        {
            return Ok(Autoscaling::dont_scale(
                Status::Waiting,
                "Cluster change in progress",
                &model,
            ));
        }

        let load_adjustment = model.load_adjustment();
        debug!(
            application = %application.id,
            cluster = %cluster.id(),
            peak = %model.peak_load(),
            ideal = %model.ideal_load(),
            "Searching for best allocation"
        );
        let Some(target) = AllocationOptimizer::new(&self.infrastructure)
            .find_best_allocation(load_adjustment, &model, limits)
        else {
            return Ok(Autoscaling::dont_scale(
                Status::Insufficient,
                "No allocations are possible within configured limits",
                &model,
            ));
        };

        let current = model.current().real_resources();
        if !self.worth_rescaling(&current, &target.real_resources()) {
            let description = if target.fulfilment() < FULL_FULFILMENT {
                "Configured limits prevent ideal scaling of this cluster"
            } else if !model.safe_to_scale_down()
                && model.peak_load().divide(&model.ideal_load()).any(|v| v < 1.0)
            {
                "Cooling off before considering to scale down"
            } else {
                "Cluster is ideally scaled (within configured limits)"
            };
            return Ok(Autoscaling::dont_scale(Status::Ideal, description, &model));
        }

        Ok(Autoscaling::scale_to(target.advertised_resources(), &model))
    }

    /// Whether moving from `from` to `to` is worth it: always for a
    /// meaningful increase in any resource, otherwise only for a meaningful
    /// change in cost
    pub fn worth_rescaling(&self, from: &ClusterResources, to: &ClusterResources) -> bool {
        worth_rescaling(from, to, &self.infrastructure.tunables)
    }
}

pub fn worth_rescaling(from: &ClusterResources, to: &ClusterResources, tunables: &Tunables) -> bool {
    let from_total = from.total_resources();
    let to_total = to.total_resources();
    let increase_threshold = tunables.resource_increase_threshold;
    if meaningful_increase(from_total.vcpu, to_total.vcpu, increase_threshold)
        || meaningful_increase(from_total.memory_gb, to_total.memory_gb, increase_threshold)
        || meaningful_increase(from_total.disk_gb, to_total.disk_gb, increase_threshold)
    {
        return true;
    }
    !similar(from.cost(), to.cost(), tunables.cost_difference_threshold)
}

fn meaningful_increase(from: f64, to: f64, threshold: f64) -> bool {
    from < to && !similar(from, to, threshold)
}

fn similar(a: f64, b: f64, threshold: f64) -> bool {
    let mean = (a + b) / 2.0;
    if mean == 0.0 {
        return true;
    }
    (a - b).abs() / mean < threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::NodeResources;

    fn cluster(nodes: u32, vcpu: f64, memory_gb: f64) -> ClusterResources {
        ClusterResources::new(nodes, 1, NodeResources::new(vcpu, memory_gb, 0.0, 0.0))
    }

    #[test]
    fn test_meaningful_increase_is_worth_rescaling() {
        let tunables = Tunables::default();
        let from = ClusterResources::new(2, 1, NodeResources::unspecified().with_vcpu(2.0));
        let to = ClusterResources::new(2, 1, NodeResources::unspecified().with_vcpu(2.5));
        assert!(worth_rescaling(&from, &to, &tunables));
    }

    #[test]
    fn test_small_increase_is_not_worth_rescaling() {
        let tunables = Tunables::default();
        assert!(!worth_rescaling(&cluster(2, 2.0, 8.0), &cluster(2, 2.04, 8.0), &tunables));
    }

    #[test]
    fn test_decrease_needs_meaningful_cost_reduction() {
        let tunables = Tunables::default();
        // costs are 0.11 per vcpu-hour
        let from = cluster(1, 10.0 / 0.11, 0.0);
        let slightly_cheaper = cluster(1, 9.6 / 0.11, 0.0);
        let much_cheaper = cluster(1, 8.9 / 0.11, 0.0);
        assert!((from.cost() - 10.0).abs() < 1e-9);
        assert!(!worth_rescaling(&from, &slightly_cheaper, &tunables));
        assert!(worth_rescaling(&from, &much_cheaper, &tunables));
    }

    #[test]
    fn test_unchanged_is_not_worth_rescaling() {
        let tunables = Tunables::default();
        assert!(!worth_rescaling(&cluster(3, 2.0, 8.0), &cluster(3, 2.0, 8.0), &tunables));
    }
}
