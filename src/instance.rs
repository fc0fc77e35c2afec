//! Module for representing Clustered Team Orienteering instances.
//!
//! An instance is a set of service nodes on the plane, a fleet of vehicles with
//! skill sets, and a partition of (some of) the nodes into clusters. A cluster
//! yields its profit only when all of its nodes are served in their listed order.
//! Everything here is immutable once built; derived data such as per-vehicle
//! streaks are computed at construction or cached on first access.

use crate::error::InstanceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

const EPS: f64 = 1e-9;

/// Represents a node of the instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier (dense, 0-indexed)
    pub id: usize,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Service (skill) required at this node, `None` if any vehicle may serve it
    #[serde(default)]
    pub service: Option<usize>,
    /// Service duration, 0 for pure waypoints
    #[serde(default)]
    pub duration: f64,
}

impl Node {
    pub fn new(id: usize, x: f64, y: f64, service: Option<usize>, duration: f64) -> Self {
        Node { id, x, y, service, duration }
    }

    /// Plain waypoint without service requirement (depot, return node)
    pub fn waypoint(id: usize, x: f64, y: f64) -> Self {
        Node::new(id, x, y, None, 0.0)
    }
}

/// A vehicle and the set of services it is skilled to perform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: usize,
    pub skills: BTreeSet<usize>,
}

impl Vehicle {
    pub fn new<I: IntoIterator<Item = usize>>(id: usize, skills: I) -> Self {
        Vehicle { id, skills: skills.into_iter().collect() }
    }

    #[inline]
    pub fn can_serve(&self, node: &Node) -> bool {
        node.service.map_or(true, |s| self.skills.contains(&s))
    }
}

/// A maximal run of consecutive cluster positions one vehicle can serve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Streak {
    pub vehicle: usize,
    /// First position (inclusive) inside the cluster's node sequence
    pub start: usize,
    /// Last position (exclusive)
    pub end: usize,
    /// Sum of the service durations along the streak
    pub service_time: f64,
}

impl Streak {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Cluster definition as given in the input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterData {
    pub nodes: Vec<usize>,
    pub profit: f64,
}

/// A cluster of nodes served together, in order, for a profit
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: usize,
    /// Node ids; the order is the required visiting precedence
    pub nodes: Vec<usize>,
    pub profit: f64,
    /// Service durations plus representative travel
    pub cost: f64,
    /// Sum of the service durations of the cluster's nodes
    pub service_time: f64,
    /// Vehicles able to serve at least one node of the cluster
    pub vehicles: Vec<usize>,
    /// Fewest vehicles whose streaks cover the whole cluster, `None` if some node is unservable
    pub max_vehicles_required: Option<usize>,
    pub centroid: (f64, f64),
    /// Distance from the centroid to the depot over distance to the return node
    pub depot_return_ratio: f64,
    #[serde(skip)]
    durations: Vec<f64>,
    /// coverage[vehicle][position]
    #[serde(skip)]
    coverage: Vec<Vec<bool>>,
    #[serde(skip)]
    streaks: OnceLock<Vec<Vec<Streak>>>,
}

impl Cluster {
    fn build(
        id: usize,
        data: ClusterData,
        nodes: &[Node],
        vehicles: &[Vehicle],
        distance: &[Vec<f64>],
        depot: usize,
        return_node: usize,
    ) -> Self {
        let members: Vec<&Node> = data.nodes.iter().map(|&n| &nodes[n]).collect();
        let durations: Vec<f64> = members.iter().map(|n| n.duration).collect();
        let service_time: f64 = durations.iter().sum();

        let coverage: Vec<Vec<bool>> = vehicles
            .iter()
            .map(|v| members.iter().map(|n| v.can_serve(n)).collect())
            .collect();
        let serving: Vec<usize> = coverage
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|&c| c))
            .map(|(v, _)| vehicles[v].id)
            .collect();

        let first = data.nodes[0];
        let last = data.nodes[data.nodes.len() - 1];
        let path: f64 = data.nodes.windows(2).map(|w| distance[w[0]][w[1]]).sum();
        let access = 0.5 * (distance[depot][first] + distance[last][return_node]);
        let cost = service_time + path + access;

        let k = members.len() as f64;
        let centroid = (
            members.iter().map(|n| n.x).sum::<f64>() / k,
            members.iter().map(|n| n.y).sum::<f64>() / k,
        );
        let to_depot = euclid(centroid, (nodes[depot].x, nodes[depot].y));
        let to_return = euclid(centroid, (nodes[return_node].x, nodes[return_node].y));
        let depot_return_ratio = to_depot / to_return.max(EPS);

        let max_vehicles_required = minimum_cover(&coverage);

        Cluster {
            id,
            nodes: data.nodes,
            profit: data.profit,
            cost,
            service_time,
            vehicles: serving,
            max_vehicles_required,
            centroid,
            depot_return_ratio,
            durations,
            coverage,
            streaks: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Profit per unit of cost
    pub fn ratio(&self) -> f64 {
        self.profit / self.cost.max(EPS)
    }

    /// Whether every node can be served by at least one vehicle
    pub fn is_servable(&self) -> bool {
        self.max_vehicles_required.is_some()
    }

    /// Whether `vehicle` can serve the node at `position`
    pub fn covers(&self, vehicle: usize, position: usize) -> bool {
        self.coverage
            .get(vehicle)
            .and_then(|row| row.get(position))
            .copied()
            .unwrap_or(false)
    }

    /// Streaks of every vehicle, indexed by vehicle id
    pub fn all_streaks(&self) -> &[Vec<Streak>] {
        self.streaks.get_or_init(|| {
            self.coverage
                .iter()
                .enumerate()
                .map(|(v, row)| decompose(v, row, &self.durations))
                .collect()
        })
    }

    pub fn streaks_for(&self, vehicle: usize) -> &[Streak] {
        self.all_streaks().get(vehicle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The streak with the largest service time (longest on ties) across all vehicles
    pub fn longest_streak(&self) -> Option<&Streak> {
        let mut best: Option<&Streak> = None;
        for streak in self.all_streaks().iter().flatten() {
            let better = match best {
                None => true,
                Some(b) => {
                    streak.service_time > b.service_time + EPS
                        || ((streak.service_time - b.service_time).abs() <= EPS && streak.len() > b.len())
                }
            };
            if better {
                best = Some(streak);
            }
        }
        best
    }

    /// Share of the cluster's service time `vehicle` is able to perform
    pub fn service_share(&self, vehicle: usize) -> f64 {
        let Some(row) = self.coverage.get(vehicle) else {
            return 0.0;
        };
        if self.service_time <= EPS {
            let covered = row.iter().filter(|&&c| c).count();
            return covered as f64 / row.len().max(1) as f64;
        }
        let covered: f64 = row
            .iter()
            .zip(&self.durations)
            .filter(|(&c, _)| c)
            .map(|(_, d)| d)
            .sum();
        covered / self.service_time
    }
}

fn euclid(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

fn decompose(vehicle: usize, row: &[bool], durations: &[f64]) -> Vec<Streak> {
    let mut streaks = Vec::new();
    let mut pos = 0;
    while pos < row.len() {
        if !row[pos] {
            pos += 1;
            continue;
        }
        let start = pos;
        while pos < row.len() && row[pos] {
            pos += 1;
        }
        streaks.push(Streak {
            vehicle,
            start,
            end: pos,
            service_time: durations[start..pos].iter().sum(),
        });
    }
    streaks
}

/// Greedy interval cover: from each uncovered position take the vehicle reaching furthest.
fn minimum_cover(coverage: &[Vec<bool>]) -> Option<usize> {
    let len = coverage.first().map_or(0, Vec::len);
    let mut pos = 0;
    let mut used = 0;
    while pos < len {
        let reach = coverage
            .iter()
            .filter(|row| row[pos])
            .map(|row| pos + row[pos..].iter().take_while(|&&c| c).count())
            .max()?;
        used += 1;
        pos = reach;
    }
    Some(used)
}

/// Serde input form of an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceData {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    pub vehicles: Vec<Vehicle>,
    pub clusters: Vec<ClusterData>,
    pub depot: usize,
    pub return_node: usize,
    pub time_budget: f64,
}

/// Represents a complete CTOP instance
#[derive(Debug, Clone, Serialize)]
pub struct CTOPInstance {
    pub name: String,
    pub nodes: Vec<Node>,
    pub vehicles: Vec<Vehicle>,
    pub clusters: Vec<Cluster>,
    /// Start node of every route
    pub depot: usize,
    /// End node of every route
    pub return_node: usize,
    /// Maximal route duration per vehicle
    pub time_budget: f64,
    #[serde(skip)]
    distance_matrix: Vec<Vec<f64>>,
}

impl CTOPInstance {
    pub fn new(
        name: &str,
        nodes: Vec<Node>,
        vehicles: Vec<Vehicle>,
        clusters: Vec<ClusterData>,
        depot: usize,
        return_node: usize,
        time_budget: f64,
    ) -> Result<Self, InstanceError> {
        for (position, node) in nodes.iter().enumerate() {
            if node.id != position {
                return Err(InstanceError::NonDenseNodeIds { position, id: node.id });
            }
            if node.duration < 0.0 || !node.duration.is_finite() {
                return Err(InstanceError::NegativeDuration { node: node.id, duration: node.duration });
            }
        }
        for (position, vehicle) in vehicles.iter().enumerate() {
            if vehicle.id != position {
                return Err(InstanceError::NonDenseVehicleIds { position, id: vehicle.id });
            }
        }
        if vehicles.is_empty() {
            return Err(InstanceError::NoVehicles);
        }
        if depot >= nodes.len() {
            return Err(InstanceError::InvalidTerminal { role: "depot", node: depot });
        }
        if return_node >= nodes.len() {
            return Err(InstanceError::InvalidTerminal { role: "return", node: return_node });
        }
        if time_budget <= 0.0 || !time_budget.is_finite() {
            return Err(InstanceError::InvalidTimeBudget(time_budget));
        }
        for (id, data) in clusters.iter().enumerate() {
            if data.nodes.is_empty() {
                return Err(InstanceError::EmptyCluster(id));
            }
            if data.profit < 0.0 || !data.profit.is_finite() {
                return Err(InstanceError::NegativeProfit { cluster: id, profit: data.profit });
            }
            if let Some(&node) = data.nodes.iter().find(|&&n| n >= nodes.len()) {
                return Err(InstanceError::UnknownNode { cluster: id, node });
            }
        }

        let distance_matrix = Self::compute_distance_matrix(&nodes);
        let clusters: Vec<Cluster> = clusters
            .into_iter()
            .enumerate()
            .map(|(id, data)| {
                Cluster::build(id, data, &nodes, &vehicles, &distance_matrix, depot, return_node)
            })
            .collect();

        for cluster in clusters.iter().filter(|c| !c.is_servable()) {
            log::warn!(
                "cluster {} contains a node no vehicle is skilled for; it can never be served",
                cluster.id
            );
        }

        Ok(CTOPInstance {
            name: name.to_string(),
            nodes,
            vehicles,
            clusters,
            depot,
            return_node,
            time_budget,
            distance_matrix,
        })
    }

    pub fn from_data(data: InstanceData) -> Result<Self, InstanceError> {
        Self::new(
            &data.name,
            data.nodes,
            data.vehicles,
            data.clusters,
            data.depot,
            data.return_node,
            data.time_budget,
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, InstanceError> {
        let data: InstanceData =
            serde_json::from_str(json).map_err(|e| InstanceError::Decode(e.to_string()))?;
        Self::from_data(data)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, InstanceError> {
        let json = fs::read_to_string(path).map_err(|e| InstanceError::Io(e.to_string()))?;
        Self::from_json_str(&json)
    }

    /// Compute Euclidean distance matrix
    fn compute_distance_matrix(nodes: &[Node]) -> Vec<Vec<f64>> {
        let n = nodes.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    matrix[i][j] = euclid((nodes[i].x, nodes[i].y), (nodes[j].x, nodes[j].y));
                }
            }
        }

        matrix
    }

    /// Travel time between two nodes
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance_matrix[i][j]
    }

    #[inline]
    pub fn cluster(&self, id: usize) -> &Cluster {
        &self.clusters[id]
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Sum of the profits of the given clusters
    pub fn profit_of(&self, clusters: &[usize]) -> f64 {
        clusters.iter().map(|&c| self.clusters[c].profit).sum()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let skills: BTreeSet<usize> = self.vehicles.iter().flat_map(|v| v.skills.iter().copied()).collect();
        let k = self.clusters.len().max(1) as f64;

        InstanceStatistics {
            name: self.name.clone(),
            num_nodes: self.nodes.len(),
            num_vehicles: self.vehicles.len(),
            num_clusters: self.clusters.len(),
            num_skills: skills.len(),
            total_profit: self.clusters.iter().map(|c| c.profit).sum(),
            avg_cluster_cost: self.clusters.iter().map(|c| c.cost).sum::<f64>() / k,
            avg_cluster_size: self.clusters.iter().map(|c| c.len()).sum::<usize>() as f64 / k,
            unservable_clusters: self.clusters.iter().filter(|c| !c.is_servable()).count(),
            time_budget: self.time_budget,
        }
    }
}

/// Statistics about a CTOP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_nodes: usize,
    pub num_vehicles: usize,
    pub num_clusters: usize,
    pub num_skills: usize,
    pub total_profit: f64,
    pub avg_cluster_cost: f64,
    pub avg_cluster_size: f64,
    pub unservable_clusters: usize,
    pub time_budget: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Nodes: {}", self.num_nodes)?;
        writeln!(f, "  Vehicles: {} ({} distinct skills)", self.num_vehicles, self.num_skills)?;
        writeln!(f, "  Clusters: {} (avg size {:.2})", self.num_clusters, self.avg_cluster_size)?;
        writeln!(f, "  Unservable clusters: {}", self.unservable_clusters)?;
        writeln!(f, "  Total profit: {:.2}", self.total_profit)?;
        writeln!(f, "  Avg cluster cost: {:.2}", self.avg_cluster_cost)?;
        writeln!(f, "  Time budget: {:.2}", self.time_budget)
    }
}
