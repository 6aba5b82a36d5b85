//! Operation sequence model.
//!
//! Each extension of a hypothesis is turned into a sequence of edit
//! operations (generate, insert, delete, gap, jump) derived from the word
//! alignment of the applied phrase pair; an n-gram model over operations
//! scores the sequence and carries its history in [`OsmState`].

pub mod cept;
pub mod feature;
pub mod lm;
pub mod ops;

pub use cept::{AlignmentIndex, Cept};
pub use feature::{OpSequenceModel, OsmOptions};
pub use lm::{BackoffModel, LmState, SequenceModel};
pub use ops::{OperationSequence, OsmState};
