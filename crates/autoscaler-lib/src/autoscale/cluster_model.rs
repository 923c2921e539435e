//! The derived quantities of one cluster used in one evaluation
//!
//! A model is built fresh per evaluation from the current allocation, the
//! retained measurements and the application's traffic status, and dropped
//! afterwards.

use super::allocatable::AllocatableResources;
use super::autoscaling::DecisionMetrics;
use crate::error::ModelError;
use crate::infrastructure::Infrastructure;
use crate::load::{divide, Dimension, Load};
use crate::metrics::{ClusterNodesTimeseries, ClusterTimeseries, MetricsDb};
use crate::models::{Application, ApplicationStatus, Cluster, ClusterSpec, Node, Zone};
use crate::tunables::Tunables;
use chrono::{DateTime, Duration, Utc};
use std::cell::OnceCell;
use std::collections::BTreeSet;

/// Scaling events taking longer than this are assumed to have missed their
/// completion and are capped
const MAX_SCALING_EVENT_DURATION_DAYS: i64 = 4;
const MIN_SCALING_DURATION_MINUTES: i64 = 5;
const DEFAULT_STATEFUL_SCALING_DURATION_HOURS: i64 = 12;
const DEFAULT_STATELESS_SCALING_DURATION_MINUTES: i64 = 10;
const DEFAULT_ALLOCATION_DURATION_HOURS: i64 = 12;
const NODE_REPLACEMENT_DURATION_MINUTES: i64 = 5;

/// Query rate at which headroom estimates are fully trusted
const CONFIDENT_QUERY_RATE: f64 = 100.0;

/// Fewer measurements per node than this leaves the load unadjusted
const MIN_MEASUREMENTS_PER_NODE_TO_ADJUST: f64 = 0.5;
const MIN_MEASUREMENTS_PER_NODE_TO_SCALE_DOWN: f64 = 4.0;

pub struct ClusterModel {
    spec: ClusterSpec,
    cluster: Cluster,
    status: ApplicationStatus,
    zone: Zone,
    tunables: Tunables,
    exclusive: bool,
    nodes: Vec<Node>,
    current: AllocatableResources,
    now: DateTime<Utc>,
    scaling_duration: Duration,
    node_timeseries: ClusterNodesTimeseries,
    cluster_timeseries: ClusterTimeseries,
    // derived values, each computed on first use
    peak_load: OnceCell<Load>,
    average_query_rate: OnceCell<Option<f64>>,
    query_cpu_fraction: OnceCell<f64>,
    query_fraction_of_max: OnceCell<f64>,
    max_query_growth_rate: OnceCell<f64>,
    redundancy_adjustment: OnceCell<Load>,
    ideal_load: OnceCell<Load>,
}

impl ClusterModel {
    /// Builds the model of `cluster` from its nodes and the stored metrics.
    /// Retired nodes are ignored.
    pub fn new(
        infrastructure: &Infrastructure,
        application: &Application,
        cluster: &Cluster,
        nodes: &[Node],
        db: &dyn MetricsDb,
    ) -> Result<Self, ModelError> {
        let nodes: Vec<Node> = nodes
            .iter()
            .filter(|node| &node.membership.cluster == cluster.id() && !node.membership.retired)
            .cloned()
            .collect();
        if nodes.is_empty() {
            return Err(ModelError::NoNodes(cluster.id().clone()));
        }

        let now = db.clock().now();
        let tunables = infrastructure.tunables.clone();
        let exclusive = infrastructure.zone.exclusive_allocation(&cluster.spec);
        let scaling_duration = compute_scaling_duration(cluster);
        let node_timeseries = ClusterNodesTimeseries::new(
            scaling_duration,
            cluster,
            &nodes,
            db,
            now,
            tunables.warmup(),
        )?;
        let cluster_timeseries = db.cluster_timeseries(&application.id, cluster.id())?;
        let current = AllocatableResources::from_nodes(
            &nodes,
            &cluster.spec,
            exclusive,
            infrastructure.calculator.as_ref(),
        );

        Ok(Self {
            spec: cluster.spec.clone(),
            cluster: cluster.clone(),
            status: application.status,
            zone: infrastructure.zone,
            tunables,
            exclusive,
            nodes,
            current,
            now,
            scaling_duration,
            node_timeseries,
            cluster_timeseries,
            peak_load: OnceCell::new(),
            average_query_rate: OnceCell::new(),
            query_cpu_fraction: OnceCell::new(),
            query_fraction_of_max: OnceCell::new(),
            max_query_growth_rate: OnceCell::new(),
            redundancy_adjustment: OnceCell::new(),
            ideal_load: OnceCell::new(),
        })
    }

    pub fn cluster_spec(&self) -> &ClusterSpec {
        &self.spec
    }

    pub fn is_content(&self) -> bool {
        self.spec.cluster_type.is_content()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The allocation the cluster has now
    pub fn current(&self) -> &AllocatableResources {
        &self.current
    }

    pub fn node_timeseries(&self) -> &ClusterNodesTimeseries {
        &self.node_timeseries
    }

    pub fn cluster_timeseries(&self) -> &ClusterTimeseries {
        &self.cluster_timeseries
    }

    /// Whether there are no usable measurements at all
    pub fn is_empty(&self) -> bool {
        self.node_timeseries.is_empty()
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn group_count(&self) -> u32 {
        count_groups(&self.nodes)
    }

    pub fn group_size(&self) -> u32 {
        self.node_count().div_ceil(self.group_count())
    }

    /// The expected time from deciding to rescale until the new allocation
    /// is in effect
    pub fn scaling_duration(&self) -> Duration {
        self.scaling_duration
    }

    /// The expected lifetime of an allocation, from the spacing of past
    /// scaling events
    pub fn allocation_duration(&self) -> Duration {
        let mut times: Vec<DateTime<Utc>> =
            self.cluster.scaling_events.iter().map(|event| event.at).collect();
        if times.len() < 2 {
            return Duration::hours(DEFAULT_ALLOCATION_DURATION_HOURS);
        }
        times.sort();
        let total = times[times.len() - 1] - times[0];
        Duration::milliseconds(total.num_milliseconds() / (times.len() as i64 - 1))
    }

    /// The expected time content takes to move after a change of topology
    pub fn redistribution_duration(&self) -> Duration {
        if !self.is_content() {
            return Duration::zero();
        }
        self.scaling_duration
    }

    pub fn node_replacement_duration(&self) -> Duration {
        Duration::minutes(NODE_REPLACEMENT_DURATION_MINUTES)
    }

    /// Mean across nodes of each node's peak load
    pub fn peak_load(&self) -> Load {
        *self.peak_load.get_or_init(|| self.node_timeseries.peak_load())
    }

    pub fn average_query_rate(&self) -> Option<f64> {
        *self.average_query_rate.get_or_init(|| {
            self.cluster_timeseries
                .query_rate(self.scaling_duration, self.now)
        })
    }

    pub fn average_write_rate(&self) -> Option<f64> {
        self.cluster_timeseries.write_rate(self.scaling_duration, self.now)
    }

    /// The fastest observed query growth per minute, as a fraction of the
    /// average query rate
    pub fn max_query_growth_rate(&self) -> f64 {
        *self.max_query_growth_rate.get_or_init(|| {
            self.cluster_timeseries
                .max_query_growth_rate(self.scaling_duration, self.now)
        })
    }

    /// The average query rate as a fraction of the highest ever observed
    pub fn query_fraction_of_max(&self) -> f64 {
        *self.query_fraction_of_max.get_or_init(|| {
            self.cluster_timeseries
                .query_fraction_of_max(self.scaling_duration, self.now)
        })
    }

    /// The fraction of cpu spent on queries rather than writes
    pub fn query_cpu_fraction(&self) -> f64 {
        *self.query_cpu_fraction.get_or_init(|| {
            let query_rate = self.average_query_rate().unwrap_or(0.0);
            let write_rate = self.average_write_rate().unwrap_or(0.0);
            if query_rate == 0.0 && write_rate == 0.0 {
                return self.query_cpu_fraction_of(0.5);
            }
            self.query_cpu_fraction_of(query_rate / (query_rate + write_rate))
        })
    }

    fn query_cpu_fraction_of(&self, query_rate_fraction: f64) -> f64 {
        let relative_query_cost = self.tunables.relative_query_cost;
        let write_rate_fraction = 1.0 - query_rate_fraction;
        query_rate_fraction * relative_query_cost
            / (query_rate_fraction * relative_query_cost + write_rate_fraction)
    }

    /// Headroom for organic traffic growth while a rescale is in progress,
    /// as a multiple of current resources
    pub fn growth_rate_headroom(&self) -> f64 {
        if !self.zone.environment.is_production() {
            return 1.0;
        }
        let mut headroom =
            1.0 + self.max_query_growth_rate() * self.scaling_duration.num_minutes() as f64;
        let fraction_of_max = self.query_fraction_of_max();
        // at most 10% above the historical peak
        if fraction_of_max != 0.0 {
            headroom = headroom.min(1.0 / fraction_of_max + 0.1);
        }
        self.adjust_by_confidence(headroom)
    }

    /// Headroom for traffic shifted here when another deployment fails, as a
    /// multiple of current resources
    pub fn traffic_shift_headroom(&self) -> f64 {
        if !self.zone.environment.is_production() {
            return 1.0;
        }
        if self.can_rescale_within_bcp_deadline() {
            return 1.0;
        }
        let status = self.status;
        let headroom = if status.max_read_share == 0.0 {
            // assume we get half of what we could
            2.0
        } else if status.current_read_share == 0.0 {
            1.0 / status.max_read_share
        } else {
            status.max_read_share / status.current_read_share
        };
        self.adjust_by_confidence(headroom.min(1.0 / status.max_read_share))
    }

    fn can_rescale_within_bcp_deadline(&self) -> bool {
        self.scaling_duration < self.cluster.bcp_deadline()
    }

    /// Pulls a headroom multiplier towards 1 when traffic is too low to
    /// trust it
    fn adjust_by_confidence(&self, headroom: f64) -> f64 {
        let confidence = (self.average_query_rate().unwrap_or(0.0) / CONFIDENT_QUERY_RATE).min(1.0);
        (headroom - 1.0) * confidence + 1.0
    }

    fn ideal_cpu_load(&self) -> f64 {
        let query_cpu_fraction = self.query_cpu_fraction();
        query_cpu_fraction * (1.0 / self.growth_rate_headroom())
            * (1.0 / self.traffic_shift_headroom())
            * self.tunables.ideal_query_cpu_load
            + (1.0 - query_cpu_fraction) * self.tunables.ideal_write_cpu_load
    }

    fn ideal_memory_load(&self) -> f64 {
        if self.is_content() {
            self.tunables.ideal_content_memory_load
        } else {
            self.tunables.ideal_container_memory_load
        }
    }

    fn ideal_disk_load(&self) -> f64 {
        if self.is_content() {
            self.tunables.ideal_content_disk_load
        } else {
            self.tunables.ideal_container_disk_load
        }
    }

    /// The load each node should have now so that every node is at ideal
    /// load if one node or group is lost
    pub fn ideal_load(&self) -> Load {
        *self.ideal_load.get_or_init(|| {
            Load::of(self.ideal_cpu_load(), self.ideal_memory_load(), self.ideal_disk_load())
                .divide(&self.redundancy_adjustment())
        })
    }

    /// How load per node changes when moving from the current topology to
    /// `nodes` nodes in `groups` groups, one of which is held in reserve
    pub fn load_with(&self, nodes: u32, groups: u32) -> Load {
        let adjusted_nodes = nodes_adjusted_for_redundancy(nodes, groups) as f64;
        let current_nodes = self.node_count() as f64;
        if self.is_content() {
            let adjusted_groups = groups_adjusted_for_redundancy(nodes, groups) as f64;
            let group_size = divide(adjusted_nodes, adjusted_groups);
            let current_group_size = self.group_size() as f64;
            let fixed = self.tunables.fixed_cpu_cost_fraction;

            // query cpu scales with the number of nodes, write cpu and
            // storage with the group size
            let query_cpu_per_group = fixed + (1.0 - fixed) * divide(current_group_size, group_size);
            let query_cpu = query_cpu_per_group * divide(self.group_count() as f64, adjusted_groups);
            let write_cpu = divide(current_group_size, group_size);
            let query_cpu_fraction = self.query_cpu_fraction();
            Load::of(
                query_cpu_fraction * query_cpu + (1.0 - query_cpu_fraction) * write_cpu,
                divide(current_group_size, group_size),
                divide(current_group_size, group_size),
            )
        } else {
            Load::of(divide(current_nodes, adjusted_nodes), 1.0, 1.0)
        }
    }

    pub fn redundancy_adjustment(&self) -> Load {
        *self
            .redundancy_adjustment
            .get_or_init(|| self.load_with(self.node_count(), self.group_count()))
    }

    /// Translates a load adjustment relative to the current topology into
    /// one relative to `nodes` nodes in `groups` groups
    pub fn load_adjustment_with(&self, nodes: u32, groups: u32, load_adjustment: Load) -> Load {
        load_adjustment
            .multiply(&self.load_with(nodes, groups))
            .divide(&self.redundancy_adjustment())
    }

    /// Peak load relative to ideal load. Dimensions below 1 are raised to 1
    /// unless it is safe to scale down.
    pub fn load_adjustment(&self) -> Load {
        if self.node_timeseries.measurements_per_node() < MIN_MEASUREMENTS_PER_NODE_TO_ADJUST {
            return Load::one();
        }
        let adjustment = self.peak_load().divide(&self.ideal_load());
        if self.safe_to_scale_down() {
            return adjustment;
        }
        adjustment.map(|value| value.max(1.0))
    }

    pub fn safe_to_scale_down(&self) -> bool {
        if self.has_scaled_in(self.scaling_duration * 3) {
            return false;
        }
        if self.node_timeseries.measurements_per_node() < MIN_MEASUREMENTS_PER_NODE_TO_SCALE_DOWN {
            return false;
        }
        self.node_timeseries.nodes_measured() == self.nodes.len()
    }

    fn has_scaled_in(&self, period: Duration) -> bool {
        self.cluster
            .last_scaling_event()
            .is_some_and(|event| event.at > self.now - period)
    }

    /// Average cpu spent per query, if there is query traffic
    pub fn cpu_cost_per_query(&self) -> Option<f64> {
        let query_rate = self.average_query_rate().filter(|rate| *rate > 0.0)?;
        let fan_out = if self.spec.cluster_type.is_container() {
            1.0
        } else {
            self.group_size() as f64
        };
        let vcpu = self.nodes.first().map_or(0.0, |node| node.resources.vcpu);
        Some(
            self.peak_load().get(Dimension::Cpu) * self.query_cpu_fraction() * fan_out * vcpu
                / query_rate
                / self.group_count() as f64,
        )
    }

    /// The figures explaining a decision on this cluster
    pub fn metrics(&self) -> DecisionMetrics {
        DecisionMetrics {
            query_rate: self.average_query_rate().unwrap_or(0.0),
            growth_rate_headroom: self.growth_rate_headroom(),
            cpu_cost_per_query: self.cpu_cost_per_query().unwrap_or(0.0),
        }
    }
}

/// Number of distinct groups among `nodes`, at least 1
pub(crate) fn count_groups(nodes: &[Node]) -> u32 {
    let groups: BTreeSet<u32> = nodes.iter().filter_map(|node| node.membership.group).collect();
    groups.len().max(1) as u32
}

/// Nodes left serving when one node, or one group, is lost
pub fn nodes_adjusted_for_redundancy(nodes: u32, groups: u32) -> u32 {
    if nodes <= 1 {
        return nodes;
    }
    if groups <= 1 {
        return nodes - 1;
    }
    nodes - nodes.div_ceil(groups)
}

/// Groups left serving when one group is lost
pub fn groups_adjusted_for_redundancy(nodes: u32, groups: u32) -> u32 {
    if nodes <= 1 {
        return groups;
    }
    if groups <= 1 {
        return 1;
    }
    groups - 1
}

/// Mean duration of completed scaling events, defaulting per statefulness
pub(crate) fn compute_scaling_duration(cluster: &Cluster) -> Duration {
    let stateful = cluster.spec.is_stateful();
    let completed: Vec<Duration> = cluster
        .scaling_events
        .iter()
        .filter_map(|event| event.duration())
        .map(|duration| duration.min(Duration::days(MAX_SCALING_EVENT_DURATION_DAYS)))
        .collect();
    if completed.is_empty() {
        return if stateful {
            Duration::hours(DEFAULT_STATEFUL_SCALING_DURATION_HOURS)
        } else {
            Duration::minutes(DEFAULT_STATELESS_SCALING_DURATION_MINUTES)
        };
    }

    let total_ms: i64 = completed.iter().map(Duration::num_milliseconds).sum();
    let mut predicted = Duration::milliseconds(total_ms / completed.len() as i64);
    if stateful {
        predicted = predicted.min(Duration::hours(DEFAULT_STATEFUL_SCALING_DURATION_HOURS));
    }
    predicted.max(Duration::minutes(MIN_SCALING_DURATION_MINUTES))
}
