use std::fmt::Display;

use crate::phrase::WordsRange;

/// Which source positions of the sentence are already translated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoverageSet {
    bits: Vec<bool>,
}

impl CoverageSet {
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_covered(&self, pos: usize) -> bool {
        self.bits.get(pos).copied().unwrap_or(false)
    }

    pub fn set(&mut self, pos: usize, value: bool) {
        self.bits[pos] = value;
    }

    pub fn set_range(&mut self, range: WordsRange, value: bool) {
        for pos in range.start..=range.end {
            self.bits[pos] = value;
        }
    }

    pub fn first_gap(&self) -> Option<usize> {
        self.bits.iter().position(|b| !b)
    }

    pub fn is_complete(&self) -> bool {
        self.bits.iter().all(|&b| b)
    }

    /// Number of untranslated positions in `[from, to)`.
    pub fn uncovered_between(&self, from: usize, to: usize) -> usize {
        (from..to.min(self.len()))
            .filter(|&p| !self.bits[p])
            .count()
    }

    /// Number of maximal untranslated runs in `[from, to)`.
    pub fn gaps_between(&self, from: usize, to: usize) -> usize {
        let mut gaps = 0;
        let mut in_gap = false;
        for p in from..to.min(self.len()) {
            if !self.bits[p] {
                if !in_gap {
                    gaps += 1;
                }
                in_gap = true;
            } else {
                in_gap = false;
            }
        }
        gaps
    }
}

impl Display for CoverageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.bits {
            write!(f, "{}", if b { '1' } else { '0' })?;
        }
        Ok(())
    }
}
