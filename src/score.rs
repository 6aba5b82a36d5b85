//! Fixed-layout score vectors and their per-producer bookkeeping.

use std::collections::BTreeMap;

/// Handle of a score producer (feature function or phrase table) inside a
/// [`ScoreLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub usize);

/// Dense scores of one producer. The length is fixed by the producer.
pub type ScoreVector = Vec<f32>;

/// Contiguous slice `[offset, offset + len)` occupied by a producer inside a
/// combined vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: usize,
    pub len: usize,
}

impl Slot {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Debug, Clone)]
struct Producer {
    name: String,
    slot: Slot,
}

/// Concatenation layout of several producers.
///
/// The decoder registers every feature function here to obtain its
/// [`FeatureId`]; the phrase-table group builds a private layout over its
/// members to place each member's scores.
#[derive(Debug, Clone, Default)]
pub struct ScoreLayout {
    producers: Vec<Producer>,
    total: usize,
}

impl ScoreLayout {
    pub fn register(&mut self, name: &str, len: usize) -> FeatureId {
        let id = FeatureId(self.producers.len());
        self.producers.push(Producer {
            name: name.to_string(),
            slot: Slot {
                offset: self.total,
                len,
            },
        });
        self.total += len;
        id
    }

    pub fn slot(&self, id: FeatureId) -> Slot {
        self.producers[id.0].slot
    }

    pub fn name(&self, id: FeatureId) -> &str {
        &self.producers[id.0].name
    }

    pub fn find(&self, name: &str) -> Option<FeatureId> {
        self.producers
            .iter()
            .position(|p| p.name == name)
            .map(FeatureId)
    }

    /// Sum of all slice lengths.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &str, Slot)> {
        self.producers
            .iter()
            .enumerate()
            .map(|(i, p)| (FeatureId(i), p.name.as_str(), p.slot))
    }
}

/// Per-producer weights. Producers without explicit weights use 1.0 for
/// every component.
#[derive(Debug, Clone, Default)]
pub struct Weights {
    values: BTreeMap<FeatureId, Vec<f32>>,
}

impl Weights {
    pub fn set(&mut self, id: FeatureId, weights: Vec<f32>) {
        self.values.insert(id, weights);
    }

    pub fn get(&self, id: FeatureId) -> Option<&[f32]> {
        self.values.get(&id).map(Vec::as_slice)
    }

    pub fn inner_product(&self, id: FeatureId, scores: &[f32]) -> f32 {
        match self.values.get(&id) {
            Some(w) => w.iter().zip(scores).map(|(w, s)| w * s).sum(),
            None => scores.iter().sum(),
        }
    }
}

/// Sparse collection of score vectors keyed by producer; this is the
/// accumulator a hypothesis (or a target phrase) carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    scores: BTreeMap<FeatureId, ScoreVector>,
}

impl ScoreBreakdown {
    pub fn get(&self, id: FeatureId) -> Option<&[f32]> {
        self.scores.get(&id).map(Vec::as_slice)
    }

    /// Replaces the producer's vector.
    pub fn assign(&mut self, id: FeatureId, scores: ScoreVector) {
        self.scores.insert(id, scores);
    }

    /// Element-wise addition into the producer's vector.
    pub fn plus_equals(&mut self, id: FeatureId, scores: &[f32]) {
        let v = self.scores.entry(id).or_default();
        if v.len() < scores.len() {
            v.resize(scores.len(), 0.0);
        }
        for (acc, s) in v.iter_mut().zip(scores) {
            *acc += s;
        }
    }

    /// Adds every vector of `other`.
    pub fn plus_equals_all(&mut self, other: &ScoreBreakdown) {
        for (&id, v) in &other.scores {
            self.plus_equals(id, v);
        }
    }

    /// Drops the producer's dense scores.
    pub fn remove(&mut self, id: FeatureId) -> Option<ScoreVector> {
        self.scores.remove(&id)
    }

    pub fn weighted_sum(&self, weights: &Weights) -> f32 {
        self.scores
            .iter()
            .map(|(&id, v)| weights.inner_product(id, v))
            .sum()
    }

    pub fn producers(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.scores.keys().copied()
    }
}
