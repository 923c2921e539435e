//! Scenario tests for the autoscaling policy
//!
//! Clusters are driven through a manual clock and an in-memory metrics db,
//! with real and advertised resources equal unless a test says otherwise.

#[cfg(test)]
pub(super) mod fixture {
    use crate::autoscale::{Autoscaler, Autoscaling, ClusterModel};
    use crate::clock::{Clock, ManualClock};
    use crate::infrastructure::Infrastructure;
    use crate::load::Load;
    use crate::metrics::{ClusterMetricSnapshot, MemoryMetricsDb, MetricsDb, NodeMetricSnapshot};
    use crate::models::{
        Application, ApplicationId, Cluster, ClusterId, ClusterSpec, ClusterType, Environment,
        Flavor, Membership, Node, Zone,
    };
    use crate::repository::{InMemoryNodeRepository, Inventory};
    use crate::resources::{NodeResources, OverheadResourcesCalculator};
    use chrono::{DateTime, Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;

    pub fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    pub fn node_resources() -> NodeResources {
        NodeResources::new(4.0, 16.0, 100.0, 1.0)
    }

    pub fn spec(cluster_type: ClusterType) -> ClusterSpec {
        ClusterSpec::new(ClusterId::new("cluster1"), cluster_type)
    }

    pub fn production() -> Zone {
        Zone::default()
    }

    pub fn dev() -> Zone {
        Zone {
            environment: Environment::Dev,
            ..Zone::default()
        }
    }

    pub struct Fixture {
        pub clock: Arc<ManualClock>,
        pub db: MemoryMetricsDb,
        pub autoscaler: Autoscaler,
        pub application: Application,
        pub nodes: Vec<Node>,
    }

    pub struct FixtureBuilder {
        cluster: Cluster,
        zone: Zone,
        node_count: u32,
        groups: u32,
        pending: bool,
        flavors: Vec<Flavor>,
    }

    impl FixtureBuilder {
        pub fn new(cluster: Cluster) -> Self {
            Self {
                cluster,
                zone: production(),
                node_count: 4,
                groups: 1,
                pending: false,
                flavors: Vec::new(),
            }
        }

        pub fn zone(mut self, zone: Zone) -> Self {
            self.zone = zone;
            self
        }

        pub fn nodes(mut self, node_count: u32, groups: u32) -> Self {
            self.node_count = node_count;
            self.groups = groups;
            self
        }

        pub fn pending(mut self) -> Self {
            self.pending = true;
            self
        }

        pub fn flavor(mut self, name: &str, resources: NodeResources) -> Self {
            self.flavors.push(Flavor {
                name: name.to_string(),
                resources,
            });
            self
        }

        pub fn build(self) -> Fixture {
            let application_id = ApplicationId::new("tenant1", "app1", "default");
            let application = Application::new(application_id.clone()).with_cluster(self.cluster.clone());
            let group_size = self.node_count / self.groups;
            let nodes: Vec<Node> = (0..self.node_count)
                .map(|i| Node {
                    hostname: format!("host{i}"),
                    owner: application_id.clone(),
                    membership: Membership {
                        cluster: self.cluster.id().clone(),
                        cluster_type: self.cluster.spec.cluster_type,
                        group: Some(i / group_size),
                        retired: false,
                    },
                    resources: node_resources(),
                    want_to_retire: false,
                })
                .collect();
            let inventory = Inventory {
                zone: self.zone,
                applications: vec![application.clone()],
                nodes: nodes.clone(),
                flavors: self.flavors,
                hosts: vec![NodeResources::new(64.0, 256.0, 2000.0, 10.0); 10],
                pending: if self.pending {
                    vec![application_id]
                } else {
                    Vec::new()
                },
            };
            let infrastructure = Infrastructure::new(
                self.zone,
                Arc::new(InMemoryNodeRepository::new(inventory)),
                Arc::new(OverheadResourcesCalculator::identity()),
            );
            let clock = Arc::new(ManualClock::new(start()));
            Fixture {
                db: MemoryMetricsDb::new(clock.clone()),
                clock,
                autoscaler: Autoscaler::new(infrastructure),
                application,
                nodes,
            }
        }
    }

    impl Fixture {
        pub fn cluster(&self) -> &Cluster {
            &self.application.clusters[0]
        }

        /// Reports the same load from every node once a minute
        pub fn apply_load(&self, load: Load, minutes: i64, query_rate: f64) {
            self.apply_load_to(&self.nodes, load, minutes, query_rate, 1);
        }

        pub fn apply_load_to(&self, nodes: &[Node], load: Load, minutes: i64, query_rate: f64, generation: i64) {
            for _ in 0..minutes {
                let at = self.clock.now();
                let snapshots = nodes
                    .iter()
                    .map(|node| {
                        (
                            node.hostname.clone(),
                            NodeMetricSnapshot::new(at, load, generation, true, true, query_rate),
                        )
                    })
                    .collect();
                self.db.add_node_metrics(snapshots).unwrap();
                let mut cluster_metrics = HashMap::new();
                cluster_metrics.insert(
                    self.cluster().id().clone(),
                    ClusterMetricSnapshot::new(at, query_rate, 0.0),
                );
                self.db
                    .add_cluster_metrics(&self.application.id, cluster_metrics)
                    .unwrap();
                self.clock.advance(Duration::minutes(1));
            }
        }

        pub fn model(&self) -> ClusterModel {
            ClusterModel::new(
                self.autoscaler.infrastructure(),
                &self.application,
                self.cluster(),
                &self.nodes,
                &self.db,
            )
            .unwrap()
        }

        pub fn autoscale(&self) -> Autoscaling {
            self.autoscaler
                .autoscale(&self.application, self.cluster(), &self.nodes, &self.db)
                .unwrap()
        }

        pub fn suggest(&self) -> Autoscaling {
            self.autoscaler
                .suggest(&self.application, self.cluster(), &self.nodes, &self.db)
                .unwrap()
        }
    }
}

#[cfg(test)]
mod model_tests {
    use super::fixture::*;
    use crate::load::Load;
    use crate::models::{Cluster, ClusterType, ScalingEvent};
    use crate::resources::ClusterResources;
    use chrono::Duration;

    #[test]
    fn test_ideal_load_reserves_one_node() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content)))
            .zone(dev())
            .build();
        fixture.apply_load(Load::new(0.5, 0.5, 0.5).unwrap(), 30, 0.0);
        let model = fixture.model();

        // without traffic measurements queries and writes are equally frequent
        let query_cpu_fraction = 0.9;
        assert!((model.query_cpu_fraction() - query_cpu_fraction).abs() < 1e-9);

        let ideal_cpu = query_cpu_fraction * 0.8 + (1.0 - query_cpu_fraction) * 0.95;
        let redundancy_cpu = query_cpu_fraction * (0.1 + 0.9 * 4.0 / 3.0)
            + (1.0 - query_cpu_fraction) * 4.0 / 3.0;
        let ideal = model.ideal_load();
        assert!((ideal.cpu() - ideal_cpu / redundancy_cpu).abs() < 1e-9);
        assert!((ideal.memory() - 0.65 * 0.75).abs() < 1e-9);
        assert!((ideal.disk() - 0.6 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_derived_values_fixed_for_the_model_lifetime() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content))).build();
        fixture.apply_load(Load::new(0.6, 0.5, 0.4).unwrap(), 30, 120.0);
        let model = fixture.model();
        let query_cpu_fraction = model.query_cpu_fraction();
        let redundancy = model.redundancy_adjustment();
        let ideal = model.ideal_load();
        let adjustment = model.load_adjustment();

        // later traffic does not change a model already built
        fixture.apply_load(Load::new(0.9, 0.9, 0.9).unwrap(), 10, 500.0);
        assert_eq!(model.query_cpu_fraction(), query_cpu_fraction);
        assert_eq!(model.redundancy_adjustment(), redundancy);
        assert_eq!(model.ideal_load(), ideal);
        assert_eq!(model.load_adjustment(), adjustment);

        // the current topology needs no translation
        let same_topology = model.load_adjustment_with(model.node_count(), model.group_count(), adjustment);
        assert!((same_topology.cpu() - adjustment.cpu()).abs() < 1e-9);
        assert!((same_topology.memory() - adjustment.memory()).abs() < 1e-9);
    }

    #[test]
    fn test_container_load_scales_with_node_count() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container)))
            .zone(dev())
            .build();
        fixture.apply_load(Load::new(0.5, 0.5, 0.5).unwrap(), 5, 0.0);
        let model = fixture.model();

        let load = model.load_with(8, 1);
        assert!((load.cpu() - 4.0 / 7.0).abs() < 1e-9);
        assert_eq!(load.memory(), 1.0);
        assert!((model.redundancy_adjustment().cpu() - 4.0 / 3.0).abs() < 1e-9);
        assert!((model.ideal_load().memory() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_content_load_with_groups() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content)))
            .zone(dev())
            .nodes(6, 2)
            .build();
        fixture.apply_load(Load::new(0.5, 0.5, 0.5).unwrap(), 5, 0.0);
        let model = fixture.model();
        assert_eq!(model.group_count(), 2);
        assert_eq!(model.group_size(), 3);

        // losing one of two groups leaves one group of 3 serving
        let load = model.redundancy_adjustment();
        assert!((load.memory() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_adjustment_needs_measurements() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        let model = fixture.model();
        assert!(model.is_empty());
        assert_eq!(model.load_adjustment(), Load::one());
    }

    #[test]
    fn test_not_safe_to_scale_down_with_unmeasured_nodes() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        fixture.apply_load_to(&fixture.nodes[..3], Load::new(0.1, 0.1, 0.1).unwrap(), 20, 0.0, 1);
        let model = fixture.model();
        assert_eq!(model.node_timeseries().nodes_measured(), 3);
        assert!(!model.safe_to_scale_down());
        assert!(model.load_adjustment().cpu() >= 1.0);
    }

    #[test]
    fn test_not_safe_to_scale_down_after_recent_scaling() {
        let resources = ClusterResources::new(4, 1, node_resources());
        let cluster = Cluster::new(spec(ClusterType::Container)).with_scaling_event(ScalingEvent {
            from: resources,
            to: resources,
            generation: 1,
            at: start() + Duration::minutes(40),
            completion: None,
        });
        let fixture = FixtureBuilder::new(cluster).build();
        fixture.apply_load(Load::new(0.1, 0.1, 0.1).unwrap(), 60, 0.0);
        let model = fixture.model();
        assert!(model.node_timeseries().measurements_per_node() >= 4.0);
        assert!(!model.safe_to_scale_down());
    }

    #[test]
    fn test_safe_to_scale_down() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        fixture.apply_load(Load::new(0.1, 0.1, 0.1).unwrap(), 20, 0.0);
        let model = fixture.model();
        assert_eq!(model.node_timeseries().measurements_per_node(), 10.0);
        assert!(model.safe_to_scale_down());
        assert!(model.load_adjustment().cpu() < 1.0);
    }

    #[test]
    fn test_headroom_is_one_without_traffic() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        fixture.apply_load(Load::new(0.5, 0.5, 0.5).unwrap(), 20, 0.0);
        let model = fixture.model();
        assert_eq!(model.growth_rate_headroom(), 1.0);
        assert_eq!(model.traffic_shift_headroom(), 1.0);
        assert_eq!(model.cpu_cost_per_query(), None);
    }

    #[test]
    fn test_headroom_with_confident_traffic() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        fixture.apply_load(Load::new(0.5, 0.5, 0.5).unwrap(), 20, 200.0);
        let model = fixture.model();
        // flat traffic under a day old: default growth capped 10% above peak
        assert!((model.growth_rate_headroom() - 1.1).abs() < 1e-9);
        // no read share known: assume half of what could arrive
        assert!((model.traffic_shift_headroom() - 2.0).abs() < 1e-9);
        assert!(model.cpu_cost_per_query().is_some());
    }
}

#[cfg(test)]
mod allocation_tests {
    use super::fixture::*;
    use crate::autoscale::AllocatableResources;
    use crate::models::{Cluster, ClusterType, Zone};
    use crate::resources::{ClusterResources, IntRange, Limits, NodeResources};

    fn unconstrained() -> Limits {
        Limits::new(
            ClusterResources::new(2, 1, NodeResources::unspecified()),
            ClusterResources::new(150, 150, NodeResources::unspecified()),
            IntRange::empty(),
        )
    }

    #[test]
    fn test_shared_candidate_must_fit_half_a_host() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        let infrastructure = fixture.autoscaler.infrastructure();
        let hosts = [NodeResources::new(4.0, 16.0, 100.0, 1.0).multiply(0.5)];

        let too_large = ClusterResources::new(4, 1, NodeResources::new(3.0, 6.0, 40.0, 0.5));
        assert!(AllocatableResources::from_wanted(
            &too_large,
            &spec(ClusterType::Container),
            &unconstrained(),
            &hosts,
            infrastructure
        )
        .is_none());

        let fitting = ClusterResources::new(4, 1, NodeResources::new(1.5, 6.0, 40.0, 0.5));
        let candidate = AllocatableResources::from_wanted(
            &fitting,
            &spec(ClusterType::Container),
            &unconstrained(),
            &hosts,
            infrastructure,
        )
        .unwrap();
        assert_eq!(candidate.fulfilment(), 1.0);
        assert_eq!(candidate.nodes(), 4);
    }

    #[test]
    fn test_full_fulfilment_preferred_over_cheaper_partial() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content))).build();
        let model = fixture.model();
        let infrastructure = fixture.autoscaler.infrastructure();
        let hosts = [NodeResources::new(64.0, 256.0, 2000.0, 10.0)];
        let wanted = ClusterResources::new(4, 1, NodeResources::new(8.0, 32.0, 200.0, 1.0));

        let full = AllocatableResources::from_wanted(
            &wanted,
            &spec(ClusterType::Content),
            &unconstrained(),
            &hosts,
            infrastructure,
        )
        .unwrap();
        let capped = Limits::new(
            ClusterResources::new(2, 1, NodeResources::unspecified()),
            ClusterResources::new(150, 150, NodeResources::new(2.0, 8.0, 50.0, 1.0)),
            IntRange::empty(),
        );
        let partial = AllocatableResources::from_wanted(
            &wanted,
            &spec(ClusterType::Content),
            &capped,
            &hosts,
            infrastructure,
        )
        .unwrap();

        assert_eq!(full.fulfilment(), 1.0);
        assert!(partial.fulfilment() < 1.0);
        assert!(partial.cost() < full.cost());
        assert!(full.preferable_to(&partial, &model));
        assert!(!partial.preferable_to(&full, &model));
    }

    #[test]
    fn test_cheaper_full_candidate_preferred_when_both_fulfil() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content))).build();
        let model = fixture.model();
        let infrastructure = fixture.autoscaler.infrastructure();
        let hosts = [NodeResources::new(64.0, 256.0, 2000.0, 10.0)];
        let candidate = |vcpu: f64| {
            AllocatableResources::from_wanted(
                &ClusterResources::new(4, 1, NodeResources::new(vcpu, 16.0, 100.0, 1.0)),
                &spec(ClusterType::Content),
                &unconstrained(),
                &hosts,
                infrastructure,
            )
            .unwrap()
        };

        // same shape as the current nodes apart from vcpu, so resizing in place
        let current_size = candidate(4.0);
        let larger = candidate(8.0);
        assert!(current_size.preferable_to(&larger, &model));
        assert!(!larger.preferable_to(&current_size, &model));
    }

    #[test]
    fn test_shared_candidate_is_enlarged_to_legal() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        let tiny = ClusterResources::new(2, 1, NodeResources::new(0.1, 1.0, 1.0, 0.1));
        let candidate = AllocatableResources::from_wanted(
            &tiny,
            &spec(ClusterType::Container),
            &unconstrained(),
            &[NodeResources::new(64.0, 256.0, 2000.0, 10.0)],
            fixture.autoscaler.infrastructure(),
        )
        .unwrap();
        let advertised = candidate.advertised_resources().node_resources;
        assert_eq!(advertised.vcpu, 0.5);
        assert_eq!(advertised.memory_gb, 4.0);
        assert_eq!(advertised.disk_gb, 10.0);
    }

    #[test]
    fn test_shared_candidate_outside_system_limits() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        // application limits cap memory below the real minimum
        let limits = Limits::new(
            ClusterResources::new(2, 1, NodeResources::new(0.5, 1.0, 10.0, 0.1)),
            ClusterResources::new(4, 1, NodeResources::new(8.0, 2.0, 100.0, 1.0)),
            IntRange::empty(),
        );
        let wanted = ClusterResources::new(2, 1, NodeResources::new(2.0, 8.0, 50.0, 1.0));
        assert!(AllocatableResources::from_wanted(
            &wanted,
            &spec(ClusterType::Container),
            &limits,
            &[NodeResources::new(64.0, 256.0, 2000.0, 10.0)],
            fixture.autoscaler.infrastructure(),
        )
        .is_none());
    }

    #[test]
    fn test_exclusive_picks_flavor_within_disk_limit() {
        let exclusive = Zone {
            allow_host_sharing: false,
            ..Zone::default()
        };
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content)))
            .zone(exclusive)
            .flavor("small", NodeResources::new(2.0, 8.0, 20.0, 1.0))
            .flavor("large", NodeResources::new(4.0, 16.0, 100.0, 1.0))
            .build();
        let wanted = ClusterResources::new(4, 1, NodeResources::new(2.0, 8.0, 50.0, 1.0));
        let candidate = AllocatableResources::from_wanted(
            &wanted,
            &spec(ClusterType::Content),
            &unconstrained(),
            &[],
            fixture.autoscaler.infrastructure(),
        )
        .unwrap();
        assert_eq!(candidate.advertised_resources().node_resources.vcpu, 4.0);
    }

    #[test]
    fn test_exclusive_falls_back_to_flavor_violating_disk_limit() {
        let exclusive = Zone {
            allow_host_sharing: false,
            ..Zone::default()
        };
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content)))
            .zone(exclusive)
            .flavor("small", NodeResources::new(2.0, 8.0, 20.0, 1.0))
            .build();
        let wanted = ClusterResources::new(4, 1, NodeResources::new(2.0, 8.0, 50.0, 1.0));
        let candidate = AllocatableResources::from_wanted(
            &wanted,
            &spec(ClusterType::Content),
            &unconstrained(),
            &[],
            fixture.autoscaler.infrastructure(),
        )
        .unwrap();
        assert_eq!(candidate.advertised_resources().node_resources.disk_gb, 20.0);
        assert!(candidate.fulfilment() < 1.0);
    }
}

#[cfg(test)]
mod autoscaler_tests {
    use super::fixture::*;
    use crate::autoscale::{AllocationOptimizer, Status};
    use crate::load::Load;
    use crate::models::{Cluster, ClusterType, ScalingEvent};
    use crate::resources::{ClusterResources, IntRange, Limits, NodeResources};
    use chrono::Duration;

    #[test]
    fn test_high_load_content_cluster_rescales() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content))).build();
        fixture.apply_load(Load::new(0.9, 0.5, 0.3).unwrap(), 60, 0.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Rescaling, "{autoscaling}");
        let target = autoscaling.resources.unwrap();
        assert!(target.total_resources().vcpu > 16.0);
        assert!((autoscaling.peak.cpu() - 0.9).abs() < 1e-9);
        assert!(autoscaling.ideal.cpu() < 0.9);
    }

    #[test]
    fn test_no_history_suggests_nothing() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content))).build();
        let suggestion = fixture.suggest();
        assert!(suggestion.is_empty());
        assert_eq!(suggestion.peak, Load::zero());
    }

    #[test]
    fn test_low_load_scales_down_when_safe() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        fixture.apply_load(Load::new(0.1, 0.2, 0.1).unwrap(), 20, 50.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Rescaling, "{autoscaling}");
        let target = autoscaling.resources.unwrap();
        let current = ClusterResources::new(4, 1, node_resources());
        assert!(target.cost() < current.cost());
        assert!(target.nodes >= 2);
        assert!((autoscaling.metrics.query_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_cooling_off_after_recent_scaling() {
        let resources = ClusterResources::new(4, 1, node_resources());
        let cluster = Cluster::new(spec(ClusterType::Container)).with_scaling_event(ScalingEvent {
            from: resources,
            to: resources,
            generation: 1,
            at: start() + Duration::minutes(40),
            completion: None,
        });
        let fixture = FixtureBuilder::new(cluster).build();
        fixture.apply_load(Load::new(0.1, 0.2, 0.1).unwrap(), 60, 0.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Ideal, "{autoscaling}");
        assert_eq!(autoscaling.description, "Cooling off before considering to scale down");
    }

    #[test]
    fn test_fixed_limits_disable_autoscaling() {
        let limits = Limits::of(ClusterResources::new(4, 1, node_resources()));
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container)).with_limits(limits)).build();
        fixture.apply_load(Load::new(0.9, 0.5, 0.3).unwrap(), 20, 0.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Unavailable);
        assert_eq!(autoscaling.description, "Autoscaling is not enabled");

        // suggestions disregard the limits
        assert_eq!(fixture.suggest().status, Status::Rescaling);
    }

    #[test]
    fn test_waiting_while_change_in_progress() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container)))
            .pending()
            .build();
        fixture.apply_load(Load::new(0.9, 0.5, 0.3).unwrap(), 20, 0.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Waiting);
        assert!(autoscaling.resources.is_none());
    }

    #[test]
    fn test_insufficient_when_no_allocation_is_legal() {
        let limits = Limits::new(
            ClusterResources::new(2, 1, NodeResources::new(1.0, 1.0, 10.0, 1.0)),
            ClusterResources::new(4, 1, NodeResources::new(8.0, 2.0, 200.0, 1.0)),
            IntRange::empty(),
        );
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container)).with_limits(limits)).build();
        fixture.apply_load(Load::new(0.9, 0.5, 0.3).unwrap(), 20, 0.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Insufficient);
        assert_eq!(autoscaling.description, "No allocations are possible within configured limits");
    }

    #[test]
    fn test_limits_preventing_ideal_scaling() {
        let limits = Limits::new(
            ClusterResources::new(2, 1, NodeResources::new(1.0, 4.0, 10.0, 1.0)),
            ClusterResources::new(4, 1, node_resources()),
            IntRange::empty(),
        );
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content)).with_limits(limits)).build();
        fixture.apply_load(Load::new(0.9, 0.5, 0.3).unwrap(), 60, 0.0);

        let autoscaling = fixture.autoscale();
        assert_eq!(autoscaling.status, Status::Ideal, "{autoscaling}");
        assert_eq!(
            autoscaling.description,
            "Configured limits prevent ideal scaling of this cluster"
        );
    }

    #[test]
    fn test_optimizer_keeps_redundancy_floor() {
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Container))).build();
        fixture.apply_load(Load::new(0.01, 0.01, 0.01).unwrap(), 20, 0.0);
        let model = fixture.model();

        let best = AllocationOptimizer::new(fixture.autoscaler.infrastructure())
            .find_best_allocation(model.load_adjustment(), &model, None)
            .unwrap();
        assert!(best.nodes() >= 2);
    }

    #[test]
    fn test_optimizer_respects_group_size_limits() {
        let limits = Limits::new(
            ClusterResources::new(2, 1, NodeResources::new(1.0, 4.0, 10.0, 1.0)),
            ClusterResources::new(12, 4, NodeResources::new(16.0, 64.0, 400.0, 1.0)),
            IntRange::of(3, 3),
        );
        let fixture = FixtureBuilder::new(Cluster::new(spec(ClusterType::Content)).with_limits(limits)).build();
        fixture.apply_load(Load::new(0.9, 0.5, 0.3).unwrap(), 60, 0.0);
        let model = fixture.model();

        let best = AllocationOptimizer::new(fixture.autoscaler.infrastructure())
            .find_best_allocation(model.load_adjustment(), &model, Some(&limits))
            .unwrap();
        assert_eq!(best.nodes() % best.groups(), 0);
        assert_eq!(best.group_size(), 3);
    }
}
