//! Hierarchical navigable small-world graph.
//!
//! Nodes are dense `u32` ids in insertion order. Every node lives on layer 0
//! and on each layer up to a level drawn from an exponential distribution,
//! so upper layers are sparse express lanes. Search descends greedily from
//! the top entry point and runs a beam of width `ef` on layer 0.
//!
//! Layer assignment uses a seeded LCG, so the same inputs in the same order
//! produce the same graph.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use super::distance::{magnitude, similarity};
use crate::domain::Metric;

const MAX_LEVEL: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max neighbors per node on layers above 0.
    pub m: usize,
    /// Max neighbors per node on layer 0.
    pub m_max0: usize,
    pub ef_construction: usize,
    pub metric: Metric,
    pub seed: u64,
}

impl HnswParams {
    pub fn new(m: usize, ef_construction: usize, metric: Metric) -> Self {
        Self {
            m,
            m_max0: m * 2,
            ef_construction,
            metric,
            seed: 42,
        }
    }

    fn level_mult(&self) -> f64 {
        1.0 / (self.m.max(2) as f64).ln()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    level: u8,
    neighbors: Vec<Vec<u32>>,
}

/// Candidate ordered by score, ties broken toward the lower id.
#[derive(Debug, Clone, Copy)]
struct Scored {
    score: f32,
    id: u32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    params: HnswParams,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    nodes: Vec<Node>,
    entry_point: Option<u32>,
    max_level: u8,
    rng_state: u64,
}

impl HnswGraph {
    pub fn new(params: HnswParams) -> Self {
        Self {
            params,
            vectors: Vec::new(),
            norms: Vec::new(),
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
            rng_state: params.seed,
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Structural check for graphs that did not come from `insert`, such as
    /// a deserialized snapshot. Returns a description of the first problem.
    pub fn validate(&self, dimension: usize) -> Result<(), String> {
        let len = self.nodes.len();
        if self.vectors.len() != len || self.norms.len() != len {
            return Err(format!(
                "graph has {len} nodes, {} vectors and {} norms",
                self.vectors.len(),
                self.norms.len()
            ));
        }
        if let Some(id) = self.vectors.iter().position(|v| v.len() != dimension) {
            return Err(format!(
                "vector {id} has dimension {}, expected {dimension}",
                self.vectors[id].len()
            ));
        }
        if self.max_level > MAX_LEVEL {
            return Err(format!("max level {} exceeds {MAX_LEVEL}", self.max_level));
        }

        match self.entry_point {
            None if len > 0 => return Err("non-empty graph has no entry point".to_string()),
            Some(ep) if ep as usize >= len => {
                return Err(format!("entry point {ep} is out of range for {len} nodes"));
            }
            _ => {}
        }

        for (id, node) in self.nodes.iter().enumerate() {
            if node.neighbors.len() != node.level as usize + 1 {
                return Err(format!(
                    "node {id} has level {} but {} neighbor layers",
                    node.level,
                    node.neighbors.len()
                ));
            }
            if let Some(&bad) = node.neighbors.iter().flatten().find(|&&n| n as usize >= len) {
                return Err(format!("node {id} links to {bad}, graph has {len} nodes"));
            }
        }
        Ok(())
    }

    pub fn neighbors(&self, id: u32, layer: usize) -> &[u32] {
        self.nodes
            .get(id as usize)
            .and_then(|n| n.neighbors.get(layer))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Inserts `vector` and returns its id. Callers validate dimension.
    pub fn insert(&mut self, vector: Vec<f32>) -> u32 {
        let id = self.nodes.len() as u32;
        let level = self.select_level();

        self.norms.push(magnitude(&vector));
        self.vectors.push(vector);
        self.nodes.push(Node {
            level,
            neighbors: vec![Vec::new(); level as usize + 1],
        });

        let Some(mut ep) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return id;
        };

        let query = self.vectors[id as usize].clone();
        let query_norm = self.norms[id as usize];

        let mut layer = self.max_level;
        while layer > level {
            ep = self.greedy_closest(ep, &query, query_norm, layer as usize);
            layer -= 1;
        }

        for lc in (0..=level.min(self.max_level) as usize).rev() {
            let candidates =
                self.search_layer(ep, &query, query_norm, self.params.ef_construction, lc);
            let m_limit = self.max_neighbors(lc);

            let selected: Vec<u32> = candidates
                .iter()
                .filter(|c| c.id != id)
                .take(self.params.m)
                .map(|c| c.id)
                .collect();

            self.nodes[id as usize].neighbors[lc] = selected.clone();
            for &neighbor in &selected {
                self.link(neighbor, id, lc, m_limit);
            }

            if let Some(best) = candidates.first() {
                ep = best.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }

        id
    }

    /// Up to `k` `(id, score)` pairs in descending score order. The beam
    /// width on layer 0 is `max(ef, k)`.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(u32, f32)> {
        let Some(mut ep) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let query_norm = magnitude(query);
        let mut layer = self.max_level as usize;
        while layer > 0 {
            ep = self.greedy_closest(ep, query, query_norm, layer);
            layer -= 1;
        }

        let mut found = self.search_layer(ep, query, query_norm, ef.max(k), 0);
        found.truncate(k);
        found.into_iter().map(|c| (c.id, c.score)).collect()
    }

    fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m_max0
        } else {
            self.params.m
        }
    }

    fn score(&self, id: u32, query: &[f32], query_norm: f32) -> f32 {
        let i = id as usize;
        similarity(
            self.params.metric,
            &self.vectors[i],
            self.norms[i],
            query,
            query_norm,
        )
    }

    fn select_level(&mut self) -> u8 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = ((self.rng_state >> 11) as f64 / (1u64 << 53) as f64).max(1e-12);
        let level = (-r.ln() * self.params.level_mult()).floor();
        (level as u8).min(MAX_LEVEL)
    }

    fn greedy_closest(&self, entry: u32, query: &[f32], query_norm: f32, layer: usize) -> u32 {
        let mut current = Scored {
            score: self.score(entry, query, query_norm),
            id: entry,
        };

        loop {
            let mut improved = false;
            for &neighbor in self.neighbors(current.id, layer) {
                let candidate = Scored {
                    score: self.score(neighbor, query, query_norm),
                    id: neighbor,
                };
                if candidate > current {
                    current = candidate;
                    improved = true;
                }
            }
            if !improved {
                return current.id;
            }
        }
    }

    /// Beam search on one layer, sorted best first.
    fn search_layer(
        &self,
        entry: u32,
        query: &[f32],
        query_norm: f32,
        ef: usize,
        layer: usize,
    ) -> Vec<Scored> {
        let ef = ef.max(1);
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<Scored> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();

        let start = Scored {
            score: self.score(entry, query, query_norm),
            id: entry,
        };
        visited.insert(entry);
        candidates.push(start);
        results.push(Reverse(start));

        while let Some(current) = candidates.pop() {
            if let Some(Reverse(worst)) = results.peek() {
                if results.len() >= ef && current < *worst {
                    break;
                }
            }

            for &neighbor in self.neighbors(current.id, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let scored = Scored {
                    score: self.score(neighbor, query, query_norm),
                    id: neighbor,
                };
                let admit = results.len() < ef
                    || results.peek().is_some_and(|Reverse(worst)| scored > *worst);
                if admit {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|Reverse(s)| s).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    /// Adds `to` to `from`'s list on `layer`, keeping the `limit` closest.
    fn link(&mut self, from: u32, to: u32, layer: usize, limit: usize) {
        let f = from as usize;
        if layer >= self.nodes[f].neighbors.len() {
            return;
        }
        if self.nodes[f].neighbors[layer].contains(&to) {
            return;
        }
        self.nodes[f].neighbors[layer].push(to);

        if self.nodes[f].neighbors[layer].len() <= limit {
            return;
        }

        let base = &self.vectors[f];
        let base_norm = self.norms[f];
        let mut scored: Vec<Scored> = self.nodes[f].neighbors[layer]
            .iter()
            .map(|&n| Scored {
                score: similarity(
                    self.params.metric,
                    &self.vectors[n as usize],
                    self.norms[n as usize],
                    base,
                    base_norm,
                ),
                id: n,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(limit);
        self.nodes[f].neighbors[layer] = scored.into_iter().map(|s| s.id).collect();
    }
}
