use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
    hash::{Hash, Hasher},
};

use crate::{
    errors::{Error, Result},
    score::{FeatureId, ScoreBreakdown, Weights},
};

/// A token. Equality only looks at the surface string.
#[derive(Debug, Clone, Eq)]
pub struct Word {
    pub text: String,
    pub oov: bool,
}

impl Word {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            oov: false,
        }
    }

    pub fn oov(text: &str) -> Self {
        Self {
            text: text.to_string(),
            oov: true,
        }
    }
}

impl PartialEq for Word {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Hash for Word {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl From<&str> for Word {
    fn from(value: &str) -> Self {
        Word::new(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Phrase {
    pub words: Vec<Word>,
}

impl Phrase {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word(&self, pos: usize) -> &Word {
        &self.words[pos]
    }

    pub fn sub_phrase(&self, range: WordsRange) -> Phrase {
        Phrase {
            words: self.words[range.start..=range.end].to_vec(),
        }
    }
}

impl From<&str> for Phrase {
    fn from(value: &str) -> Self {
        Phrase {
            words: value.split_whitespace().map(Word::new).collect(),
        }
    }
}

impl Display for Phrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, w) in self.words.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", w.text)?;
        }
        Ok(())
    }
}

/// Input sentence of one translation task.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    pub id: usize,
    pub phrase: Phrase,
}

impl Sentence {
    pub fn new(id: usize, text: &str) -> Self {
        Self {
            id,
            phrase: Phrase::from(text),
        }
    }

    pub fn len(&self) -> usize {
        self.phrase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrase.is_empty()
    }

    pub fn word(&self, pos: usize) -> &Word {
        self.phrase.word(pos)
    }
}

impl Display for Sentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.phrase.fmt(f)
    }
}

/// Inclusive source span `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordsRange {
    pub start: usize,
    pub end: usize,
}

impl WordsRange {
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "empty range [{start}, {end}]");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Word alignment of one phrase pair as `(source, target)` points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AlignmentInfo {
    points: BTreeSet<(usize, usize)>,
}

impl AlignmentInfo {
    pub fn new(points: impl IntoIterator<Item = (usize, usize)>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }

    /// Parses the `0-0 1-0 2-1` notation.
    pub fn parse(s: &str) -> Result<Self> {
        let mut points = BTreeSet::new();
        for tok in s.split_whitespace() {
            let (a, b) = tok
                .split_once('-')
                .ok_or_else(|| Error::InvalidModel(format!("bad alignment point '{tok}'")))?;
            let a = a
                .parse()
                .map_err(|_| Error::InvalidModel(format!("bad alignment point '{tok}'")))?;
            let b = b
                .parse()
                .map_err(|_| Error::InvalidModel(format!("bad alignment point '{tok}'")))?;
            points.insert((a, b));
        }
        Ok(Self { points })
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, usize)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Source positions aligned to each target position.
    pub fn aligned_source_words(&self) -> HashMap<usize, Vec<usize>> {
        let mut out: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(s, t) in &self.points {
            out.entry(t).or_default().push(s);
        }
        out
    }
}

/// A translation candidate for some source phrase.
///
/// Identity (equality, hashing) is the target word sequence only; scores and
/// alignment ride along.
#[derive(Debug, Clone, Default)]
pub struct TargetPhrase {
    pub phrase: Phrase,
    pub alignment: AlignmentInfo,
    pub scores: ScoreBreakdown,
    /// Context-dependent annotations that are not part of any dense vector.
    pub extra_scores: HashMap<String, Vec<f32>>,
    /// Weighted isolation score used for pruning.
    pub future_score: f32,
}

impl TargetPhrase {
    pub fn new(phrase: Phrase, alignment: AlignmentInfo) -> Self {
        Self {
            phrase,
            alignment,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.phrase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrase.is_empty()
    }

    pub fn word(&self, pos: usize) -> &Word {
        self.phrase.word(pos)
    }

    pub fn set_extra_scores(&mut self, key: &str, scores: Vec<f32>) {
        self.extra_scores.insert(key.to_string(), scores);
    }

    /// Recomputes the pruning score from every dense vector attached.
    pub fn evaluate_in_isolation(&mut self, weights: &Weights) {
        self.future_score = self.scores.weighted_sum(weights);
    }

    pub fn scores_for(&self, id: FeatureId) -> Option<&[f32]> {
        self.scores.get(id)
    }
}

impl PartialEq for TargetPhrase {
    fn eq(&self, other: &Self) -> bool {
        self.phrase == other.phrase
    }
}

impl Eq for TargetPhrase {}

impl Hash for TargetPhrase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.phrase.hash(state);
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetPhraseCollection {
    pub phrases: Vec<TargetPhrase>,
}

impl TargetPhraseCollection {
    pub fn add(&mut self, phrase: TargetPhrase) {
        self.phrases.push(phrase);
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetPhrase> {
        self.phrases.iter()
    }

    /// Sorts best-first by future score and keeps the first `limit`
    /// phrases; a limit of 0 keeps everything.
    pub fn sort_and_prune(&mut self, limit: usize) {
        self.phrases
            .sort_by(|a, b| b.future_score.total_cmp(&a.future_score));
        if limit > 0 && self.phrases.len() > limit {
            self.phrases.truncate(limit);
        }
    }
}

/// A source span of the input together with the candidate collections the
/// phrase tables attached to it.
#[derive(Debug, Clone)]
pub struct InputPath {
    pub phrase: Phrase,
    pub range: WordsRange,
    targets: Vec<(FeatureId, crate::table::CollectionHandle)>,
}

impl InputPath {
    pub fn new(phrase: Phrase, range: WordsRange) -> Self {
        Self {
            phrase,
            range,
            targets: Vec::new(),
        }
    }

    /// All spans of `sentence` up to `max_len` words.
    pub fn all(sentence: &Sentence, max_len: usize) -> Vec<InputPath> {
        let mut out = Vec::new();
        for start in 0..sentence.len() {
            for end in start..sentence.len().min(start + max_len) {
                let range = WordsRange::new(start, end);
                out.push(InputPath::new(sentence.phrase.sub_phrase(range), range));
            }
        }
        out
    }

    pub fn set_target_phrases(&mut self, table: FeatureId, handle: crate::table::CollectionHandle) {
        self.targets.retain(|(id, _)| *id != table);
        self.targets.push((table, handle));
    }

    pub fn target_phrases(&self, table: FeatureId) -> Option<crate::table::CollectionHandle> {
        self.targets
            .iter()
            .find(|(id, _)| *id == table)
            .map(|(_, h)| *h)
    }
}

/// A target phrase applied to a concrete source span.
#[derive(Debug, Clone)]
pub struct TranslationOption {
    pub range: WordsRange,
    pub target: TargetPhrase,
}

impl TranslationOption {
    pub fn new(range: WordsRange, target: TargetPhrase) -> Self {
        Self { range, target }
    }

    pub fn start(&self) -> usize {
        self.range.start
    }

    /// Options created for unknown source words carry a single OOV target.
    pub fn is_oov(&self) -> bool {
        self.target.phrase.words.iter().any(|w| w.oov)
    }
}
