//! Hierarchical navigable small world graph backend.
//!
//! Works over any encoded vector, so every space type is supported. Level
//! assignment uses a fixed seed, which makes builds over the same input
//! reproducible.
//!
//! Defaults:
//! - M = 16 (links per node, 2*M on the bottom layer)
//! - efConstruction = 200
//! - efSearch = 100

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Backend, KnnQuery, MetricSpace, NativeIndex, StandardSpace};
use crate::dataset::Dataset;
use crate::encoding::EncodedVector;
use crate::error::KnnError;
use crate::manifest::IndexManifest;
use crate::params::{AnyParams, EF_CONSTRUCTION, EF_SEARCH, INDEX_THREAD_QTY, M};
use crate::queue::TopKQueue;
use crate::space::SpaceType;

pub const BACKEND_NAME: &str = "hnsw";

pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_EF_SEARCH: usize = 100;

const MAX_LEVEL: usize = 16;
const LEVEL_SEED: u64 = 100;

/// Factory for [`HnswGraph`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HnswBackend;

impl Backend for HnswBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn create_space(&self, space_type: SpaceType) -> Result<Box<dyn MetricSpace>, KnnError> {
        Ok(Box::new(StandardSpace::new(space_type)))
    }

    fn create_index(&self, space: &dyn MetricSpace) -> Result<Box<dyn NativeIndex>, KnnError> {
        Ok(Box::new(HnswGraph::new(space.desc())))
    }
}

/// Graph tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub m: usize,
    pub m_max0: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            m: DEFAULT_M,
            m_max0: DEFAULT_M * 2,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphNode {
    id: i64,
    vector: EncodedVector,
    /// Neighbor lists, one per level the node lives on
    links: Vec<Vec<u32>>,
}

#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    space: String,
    config: GraphConfig,
    entry_point: Option<u32>,
    max_level: usize,
    nodes: Vec<GraphNode>,
}

/// Generation-stamped visited marks, reused across layer searches.
#[derive(Default)]
struct Visited {
    marks: Vec<u32>,
    generation: u32,
}

impl Visited {
    fn reset(&mut self, len: usize) {
        if self.marks.len() < len {
            self.marks.resize(len, 0);
        }
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.marks.fill(0);
            self.generation = 1;
        }
    }

    /// Returns false if `node` was already visited.
    fn insert(&mut self, node: u32) -> bool {
        let slot = &mut self.marks[node as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }
}

type Scored = (OrderedFloat<f32>, u32);

/// Multi-layer proximity graph over encoded vectors.
pub struct HnswGraph {
    space: &'static str,
    config: GraphConfig,
    nodes: Vec<GraphNode>,
    entry_point: Option<u32>,
    max_level: usize,
}

impl HnswGraph {
    fn new(space: &'static str) -> Self {
        Self {
            space,
            config: GraphConfig::default(),
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn max_links(&self, level: usize) -> usize {
        if level == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    fn distance_to(&self, space: &dyn MetricSpace, query: &EncodedVector, node: u32) -> f32 {
        space.distance(query, &self.nodes[node as usize].vector)
    }

    /// Best `ef` nodes on `level` reachable from `entry_points`, nearest first.
    fn search_layer(
        &self,
        space: &dyn MetricSpace,
        query: &EncodedVector,
        entry_points: &[u32],
        ef: usize,
        level: usize,
        visited: &mut Visited,
    ) -> Vec<(f32, u32)> {
        visited.reset(self.nodes.len());
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        let ef = ef.min(self.nodes.len()).max(1);
        let mut results: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);

        for &ep in entry_points {
            if visited.insert(ep) {
                let d = OrderedFloat(self.distance_to(space, query, ep));
                candidates.push(Reverse((d, ep)));
                results.push((d, ep));
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(Reverse((dist, node))) = candidates.pop() {
            let worst = results.peek().map_or(OrderedFloat(f32::INFINITY), |r| r.0);
            if results.len() >= ef && dist > worst {
                break;
            }
            let Some(links) = self.nodes[node as usize].links.get(level) else {
                continue;
            };
            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = OrderedFloat(self.distance_to(space, query, neighbor));
                let worst = results.peek().map_or(OrderedFloat(f32::INFINITY), |r| r.0);
                if results.len() < ef || d < worst {
                    candidates.push(Reverse((d, neighbor)));
                    results.push((d, neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results
            .into_sorted_vec()
            .into_iter()
            .map(|(d, n)| (d.0, n))
            .collect()
    }

    fn insert(
        &mut self,
        space: &dyn MetricSpace,
        id: i64,
        vector: EncodedVector,
        level: usize,
        visited: &mut Visited,
    ) {
        let new_node = self.nodes.len() as u32;
        let Some(entry_point) = self.entry_point else {
            self.nodes.push(GraphNode {
                id,
                vector,
                links: vec![Vec::new(); level + 1],
            });
            self.entry_point = Some(new_node);
            self.max_level = level;
            return;
        };

        // Greedy descent through the levels above the new node's top level
        let mut current = entry_point;
        for layer in (level + 1..=self.max_level).rev() {
            let found = self.search_layer(space, &vector, &[current], 1, layer, visited);
            if let Some(&(_, nearest)) = found.first() {
                current = nearest;
            }
        }

        let top = level.min(self.max_level);
        let mut links = vec![Vec::new(); level + 1];
        let mut entry_points = vec![current];
        for layer in (0..=top).rev() {
            let candidates = self.search_layer(
                space,
                &vector,
                &entry_points,
                self.config.ef_construction,
                layer,
                visited,
            );
            links[layer] =
                select_neighbors(space, &self.nodes, &candidates, self.max_links(layer));
            entry_points = candidates.iter().map(|&(_, n)| n).collect();
            if entry_points.is_empty() {
                entry_points.push(entry_point);
            }
        }

        self.nodes.push(GraphNode { id, vector, links });

        // Back-links, pruning neighbors that overflow
        for layer in 0..=top {
            let m_max = self.max_links(layer);
            let mine = self.nodes[new_node as usize].links[layer].clone();
            for neighbor in mine {
                let n = neighbor as usize;
                if self.nodes[n].links.len() <= layer {
                    continue;
                }
                self.nodes[n].links[layer].push(new_node);
                if self.nodes[n].links[layer].len() > m_max {
                    let base = &self.nodes[n].vector;
                    let scored: Vec<(f32, u32)> = self.nodes[n].links[layer]
                        .iter()
                        .map(|&c| (space.distance(base, &self.nodes[c as usize].vector), c))
                        .collect();
                    let pruned = select_neighbors(space, &self.nodes, &scored, m_max);
                    self.nodes[n].links[layer] = pruned;
                }
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(new_node);
        }
    }

    fn check_integrity(&self) -> Result<(), KnnError> {
        let len = self.nodes.len();
        if let Some(ep) = self.entry_point {
            if ep as usize >= len {
                return Err(KnnError::Backend(format!(
                    "corrupt graph: entry point {} out of {} nodes",
                    ep, len
                )));
            }
        } else if len > 0 {
            return Err(KnnError::Backend(
                "corrupt graph: nodes without an entry point".to_string(),
            ));
        }
        for node in &self.nodes {
            if node.links.iter().flatten().any(|&l| l as usize >= len) {
                return Err(KnnError::Backend(format!(
                    "corrupt graph: node {} links past {} nodes",
                    node.id, len
                )));
            }
        }
        Ok(())
    }
}

/// Neighbor selection heuristic: keep a candidate only if it is closer to the
/// base than to every neighbor already kept, then top up with the closest
/// leftovers.
fn select_neighbors(
    space: &dyn MetricSpace,
    nodes: &[GraphNode],
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<u32> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut selected: Vec<u32> = Vec::with_capacity(m);
    for &(dist_to_base, candidate) in &sorted {
        if selected.len() >= m {
            break;
        }
        let diverse = selected.iter().all(|&kept| {
            let between = space.distance(
                &nodes[candidate as usize].vector,
                &nodes[kept as usize].vector,
            );
            dist_to_base <= between
        });
        if diverse {
            selected.push(candidate);
        }
    }

    if selected.len() < m {
        let kept: HashSet<u32> = selected.iter().copied().collect();
        for &(_, candidate) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !kept.contains(&candidate) {
                selected.push(candidate);
            }
        }
    }
    selected
}

fn random_level(rng: &mut StdRng, level_mult: f64) -> usize {
    let r: f64 = rng.random();
    let level = (-(1.0 - r).ln() * level_mult).floor();
    (level as usize).min(MAX_LEVEL)
}

impl NativeIndex for HnswGraph {
    fn create_index(
        &mut self,
        space: &dyn MetricSpace,
        dataset: &Dataset,
        params: &AnyParams,
    ) -> Result<(), KnnError> {
        params.check_known(&[EF_CONSTRUCTION, M, INDEX_THREAD_QTY])?;
        let m = params.get_usize(M)?.unwrap_or(DEFAULT_M);
        if m < 2 {
            return Err(KnnError::Backend(format!("M must be at least 2, got {}", m)));
        }
        self.config.m = m;
        self.config.m_max0 = m * 2;
        self.config.ef_construction = params
            .get_usize(EF_CONSTRUCTION)?
            .unwrap_or(DEFAULT_EF_CONSTRUCTION);
        if let Some(threads) = params.get_usize(INDEX_THREAD_QTY)? {
            debug!(threads = threads, "indexThreadQty accepted, nodes are inserted sequentially");
        }

        let level_mult = 1.0 / (m as f64).ln();
        let mut rng = StdRng::seed_from_u64(LEVEL_SEED);
        let mut visited = Visited::default();
        self.nodes = Vec::with_capacity(dataset.len());
        self.entry_point = None;
        self.max_level = 0;
        for object in dataset.entries() {
            let level = random_level(&mut rng, level_mult);
            self.insert(space, object.id, object.vector.clone(), level, &mut visited);
        }

        info!(
            space = self.space,
            vectors = self.nodes.len(),
            m = self.config.m,
            ef_construction = self.config.ef_construction,
            max_level = self.max_level,
            "Built graph index"
        );
        Ok(())
    }

    fn save_index(&self, path: &Path) -> Result<(), KnnError> {
        let writer = BufWriter::new(File::create(path)?);
        let snapshot = GraphSnapshot {
            space: self.space.to_string(),
            config: self.config,
            entry_point: self.entry_point,
            max_level: self.max_level,
            nodes: self.nodes.clone(),
        };
        serde_json::to_writer(writer, &snapshot)?;
        Ok(())
    }

    fn load_index(
        &mut self,
        space: &dyn MetricSpace,
        path: &Path,
        _manifest: &IndexManifest,
    ) -> Result<(), KnnError> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: GraphSnapshot = serde_json::from_reader(reader)?;
        if snapshot.space != space.desc() {
            return Err(KnnError::Backend(format!(
                "index file holds space {:?}, expected {:?}",
                snapshot.space,
                space.desc()
            )));
        }
        self.config = snapshot.config;
        self.entry_point = snapshot.entry_point;
        self.max_level = snapshot.max_level;
        self.nodes = snapshot.nodes;
        self.check_integrity()
    }

    fn set_query_time_params(&mut self, params: &AnyParams) -> Result<(), KnnError> {
        params.check_known(&[EF_SEARCH])?;
        if let Some(ef) = params.get_usize(EF_SEARCH)? {
            self.config.ef_search = ef;
        }
        Ok(())
    }

    fn search(
        &self,
        space: &dyn MetricSpace,
        query: &KnnQuery<'_>,
    ) -> Result<TopKQueue, KnnError> {
        let mut queue = TopKQueue::new(query.k);
        let Some(entry_point) = self.entry_point else {
            return Ok(queue);
        };
        if query.k == 0 {
            return Ok(queue);
        }

        let mut visited = Visited::default();
        let mut current = entry_point;
        for layer in (1..=self.max_level).rev() {
            let found = self.search_layer(space, query.vector, &[current], 1, layer, &mut visited);
            if let Some(&(_, nearest)) = found.first() {
                current = nearest;
            }
        }

        // Never look for more candidates than the graph holds.
        let ef = self.config.ef_search.max(query.k).min(self.nodes.len());
        for (d, node) in self.search_layer(space, query.vector, &[current], ef, 0, &mut visited) {
            queue.push(self.nodes[node as usize].id, d);
        }
        Ok(queue)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}
