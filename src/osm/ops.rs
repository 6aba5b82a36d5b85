//! Conversion of an aligned phrase pair into edit operations.

use std::fmt::Display;

use crate::coverage::CoverageSet;

use super::{cept::AlignmentIndex, lm::LmState};

/// Reserved token for generating an out-of-vocabulary word.
pub const UNKNOWN_OP: &str = "_TRANS_SLF_";
pub const INSERT_GAP: &str = "_INS_GAP_";
pub const JUMP_FORWARD: &str = "_JMP_FWD_";
pub const CONTINUE_CEPT: &str = "_CONT_CEPT_";
const WORD_SEP: &str = "^_^";

/// Scorer state carried by a hypothesis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OsmState {
    pub(crate) lm: LmState,
    /// Position right after the last generated source word.
    pub(crate) j: usize,
    /// One past the rightmost translated source position.
    pub(crate) e: usize,
}

impl OsmState {
    pub fn new(lm: LmState) -> Self {
        Self { lm, j: 0, e: 0 }
    }

    pub fn lm_state(&self) -> &LmState {
        &self.lm
    }

    pub fn source_pointer(&self) -> usize {
        self.j
    }
}

/// Operations of one extension plus the reordering counts gathered on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSequence {
    pub ops: Vec<String>,
    pub gap_width: usize,
    pub gap_count: usize,
    pub open_gaps: usize,
    pub deletions: usize,
    j: usize,
    e: usize,
}

impl Display for OperationSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ops.join(" "))
    }
}

/// Inputs of one derivation. `source` holds the words of the covered span,
/// `target` the target words with OOVs already replaced by [`UNKNOWN_OP`].
pub struct Extension<'a> {
    pub source: &'a [String],
    pub target: &'a [String],
    /// Sentence position of `source[0]`.
    pub start: usize,
    pub index: &'a AlignmentIndex,
}

impl OperationSequence {
    pub fn source_pointer(&self) -> usize {
        self.j
    }

    pub fn rightmost(&self) -> usize {
        self.e
    }

    /// Walks the target side left to right and emits the operations.
    ///
    /// `coverage` must hold the coverage before this extension; it is updated
    /// in place as source words get generated.
    pub fn derive(ext: &Extension, coverage: &mut CoverageSet, j: usize, e: usize) -> Self {
        let mut seq = OperationSequence {
            j,
            e,
            ..Default::default()
        };
        for t in 0..ext.target.len() {
            if ext.index.null_target.contains(&t) {
                if ext.target[t] == UNKNOWN_OP {
                    seq.ops.push(UNKNOWN_OP.to_string());
                } else {
                    seq.ops.push(format!("_INS_{}", ext.target[t]));
                }
                continue;
            }
            // non-initial target words of a cept were emitted with it
            let Some(cept) = ext.index.cept_starting_at(t) else {
                continue;
            };
            seq.delete_reached(ext, coverage);
            let positions: Vec<usize> = cept.source.iter().map(|s| ext.start + s).collect();
            seq.move_to(positions[0], coverage);

            if cept.target.iter().any(|&t| ext.target[t] == UNKNOWN_OP) {
                seq.ops.push(UNKNOWN_OP.to_string());
            } else {
                let src: Vec<&str> = cept.source.iter().map(|&s| ext.source[s].as_str()).collect();
                let tgt: Vec<&str> = cept.target.iter().map(|&t| ext.target[t].as_str()).collect();
                seq.ops.push(format!(
                    "_TRANS_{}_TO_{}",
                    src.join(WORD_SEP),
                    tgt.join(WORD_SEP)
                ));
            }
            for w in positions.windows(2) {
                if w[1] != w[0] + 1 {
                    seq.ops.push(CONTINUE_CEPT.to_string());
                }
            }
            for &p in &positions {
                coverage.set(p, true);
            }
            let last = positions[positions.len() - 1];
            seq.j = last + 1;
            seq.e = seq.e.max(last + 1);
            seq.delete_reached(ext, coverage);
        }

        // unaligned source words nobody walked over
        for &s in &ext.index.null_source {
            let p = ext.start + s;
            if !coverage.is_covered(p) {
                seq.move_to(p, coverage);
                seq.delete_reached(ext, coverage);
            }
        }
        seq.open_gaps = coverage.gaps_between(0, seq.e);
        seq
    }

    fn move_to(&mut self, p: usize, coverage: &CoverageSet) {
        if p > self.j {
            let skipped = coverage.uncovered_between(self.j, p);
            if skipped > 0 {
                self.ops.push(INSERT_GAP.to_string());
                self.gap_count += 1;
                self.gap_width += skipped;
            } else {
                self.ops.push(JUMP_FORWARD.to_string());
            }
        } else if p < self.j {
            let gaps = coverage.gaps_between(p, self.j).max(1);
            self.ops.push(format!("_JMP_BCK_{gaps}"));
        }
        self.j = p;
    }

    /// Generates source-only operations while the pointer rests on
    /// unaligned, untranslated words of this extension.
    fn delete_reached(&mut self, ext: &Extension, coverage: &mut CoverageSet) {
        while self.j >= ext.start
            && self.j < ext.start + ext.source.len()
            && ext.index.null_source.contains(&(self.j - ext.start))
            && !coverage.is_covered(self.j)
        {
            self.ops
                .push(format!("_DEL_{}", ext.source[self.j - ext.start]));
            coverage.set(self.j, true);
            self.deletions += 1;
            self.j += 1;
            self.e = self.e.max(self.j);
        }
    }

    /// `[log-prob, gap width, gap count, open gaps, deletions]` and the
    /// model state after the last operation.
    pub fn score(&self, model: &dyn super::lm::SequenceModel, state: &LmState) -> (Vec<f32>, LmState) {
        let mut state = state.clone();
        let mut prob = 0.0;
        for op in &self.ops {
            let (p, next) = model.score(&state, model.index(op));
            prob += p;
            state = next;
        }
        (
            vec![
                prob,
                self.gap_width as f32,
                self.gap_count as f32,
                self.open_gaps as f32,
                self.deletions as f32,
            ],
            state,
        )
    }
}
