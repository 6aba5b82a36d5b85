use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{Error, Result};

/// Source and target positions (phrase-relative) that are aligned together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cept {
    pub source: BTreeSet<usize>,
    pub target: BTreeSet<usize>,
}

impl Cept {
    fn first_target(&self) -> usize {
        self.target.iter().next().copied().unwrap_or(usize::MAX)
    }
}

/// Cepts of one phrase pair plus the unaligned words on either side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentIndex {
    /// Ordered by the smallest target position each cept covers.
    pub cepts: Vec<Cept>,
    pub null_source: BTreeSet<usize>,
    pub null_target: BTreeSet<usize>,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut x = x;
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

impl AlignmentIndex {
    /// Groups `links` into cepts. Links sharing a source or a target position
    /// end up in the same cept, transitively.
    pub fn new<'a>(
        links: impl IntoIterator<Item = &'a (usize, usize)>,
        src_len: usize,
        tgt_len: usize,
    ) -> Result<Self> {
        // source position i is node i, target position j is node src_len + j
        let mut set = DisjointSet::new(src_len + tgt_len);
        let mut src_aligned = vec![false; src_len];
        let mut tgt_aligned = vec![false; tgt_len];
        for &(s, t) in links {
            if s >= src_len || t >= tgt_len {
                return Err(Error::InvalidAlignment {
                    src: s,
                    tgt: t,
                    src_len,
                    tgt_len,
                });
            }
            src_aligned[s] = true;
            tgt_aligned[t] = true;
            set.union(s, src_len + t);
        }

        let mut groups: BTreeMap<usize, Cept> = BTreeMap::new();
        let mut index = AlignmentIndex::default();
        for (s, &aligned) in src_aligned.iter().enumerate() {
            if aligned {
                groups
                    .entry(set.find(s))
                    .or_insert_with(Cept::empty)
                    .source
                    .insert(s);
            } else {
                index.null_source.insert(s);
            }
        }
        for (t, &aligned) in tgt_aligned.iter().enumerate() {
            if aligned {
                groups
                    .entry(set.find(src_len + t))
                    .or_insert_with(Cept::empty)
                    .target
                    .insert(t);
            } else {
                index.null_target.insert(t);
            }
        }
        index.cepts = groups.into_values().collect();
        index.cepts.sort_by_key(Cept::first_target);
        Ok(index)
    }

    /// Cept whose first target word sits at `t`, if any.
    pub fn cept_starting_at(&self, t: usize) -> Option<&Cept> {
        self.cepts.iter().find(|c| c.first_target() == t)
    }
}

impl Cept {
    fn empty() -> Self {
        Self {
            source: BTreeSet::new(),
            target: BTreeSet::new(),
        }
    }
}
