//! The n-gram oracle the operation sequence is scored with.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{
    errors::{Error, Result},
    quark::{Quark, StringTable, WordIndex},
};

pub const BOS: &str = "<s>";
pub const EOS: &str = "</s>";
pub const UNK: &str = "<unk>";

/// Score assigned to tokens the model has never seen when it carries no
/// `<unk>` entry.
const UNKNOWN_LOGPROB: f32 = -100.0;

/// History of an n-gram model: the most recent tokens, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LmState {
    words: Vec<WordIndex>,
}

impl LmState {
    pub fn words(&self) -> &[WordIndex] {
        &self.words
    }
}

/// Sequence scoring oracle, shared read-only between sentence tasks.
pub trait SequenceModel: Send + Sync {
    fn order(&self) -> usize;
    fn index(&self, token: &str) -> WordIndex;
    fn null_context_state(&self) -> LmState;
    fn begin_sentence_state(&self) -> LmState;
    /// log10 probability of `word` after `state`, and the state after it.
    fn score(&self, state: &LmState, word: WordIndex) -> (f32, LmState);
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    prob: f32,
    backoff: f32,
}

/// Back-off n-gram model in ARPA format.
#[derive(Debug, Clone)]
pub struct BackoffModel {
    order: usize,
    vocab: Quark,
    unk: WordIndex,
    ngrams: HashMap<Vec<WordIndex>, Entry>,
}

impl BackoffModel {
    pub fn new(order: usize) -> Self {
        let mut vocab = Quark::default();
        let unk = vocab.find_or_insert(UNK);
        vocab.find_or_insert(BOS);
        vocab.find_or_insert(EOS);
        Self {
            order: order.max(1),
            vocab,
            unk,
            ngrams: HashMap::new(),
        }
    }

    /// Adds an n-gram; the model order grows to fit it.
    pub fn insert(&mut self, words: &[&str], prob: f32, backoff: f32) {
        let key: Vec<WordIndex> = words.iter().map(|w| self.vocab.find_or_insert(w)).collect();
        self.order = self.order.max(key.len());
        self.ngrams.insert(key, Entry { prob, backoff });
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut model = BackoffModel::new(1);
        let mut section: Option<usize> = None;
        let mut declared: Vec<usize> = Vec::new();
        let mut seen = false;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "\\data\\" {
                seen = true;
                section = Some(0);
                continue;
            }
            if line == "\\end\\" {
                break;
            }
            if let Some(n) = line
                .strip_prefix('\\')
                .and_then(|s| s.strip_suffix("-grams:"))
            {
                let n: usize = n
                    .parse()
                    .map_err(|_| Error::InvalidModel(format!("bad section header: {line}")))?;
                section = Some(n);
                continue;
            }
            match section {
                Some(0) => {
                    if let Some((_, count)) = line
                        .strip_prefix("ngram ")
                        .and_then(|s| s.split_once('='))
                    {
                        let count = count.trim().parse().map_err(|_| {
                            Error::InvalidModel(format!("bad ngram count: {line}"))
                        })?;
                        declared.push(count);
                    }
                }
                Some(n) => {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() != n + 1 && fields.len() != n + 2 {
                        return Err(Error::InvalidModel(format!(
                            "expected {n}-gram entry, got: {line}"
                        )));
                    }
                    let prob: f32 = fields[0]
                        .parse()
                        .map_err(|_| Error::InvalidModel(format!("bad probability: {line}")))?;
                    let backoff: f32 = match fields.get(n + 1) {
                        Some(b) => b
                            .parse()
                            .map_err(|_| Error::InvalidModel(format!("bad backoff: {line}")))?,
                        None => 0.0,
                    };
                    model.insert(&fields[1..=n], prob, backoff);
                }
                None => log::warn!("ignoring line outside of ARPA sections: {line}"),
            }
        }
        if !seen {
            return Err(Error::InvalidModel("missing \\data\\ header".to_string()));
        }
        log::info!(
            "loaded ARPA model (order: {}, vocab: {}, ngrams: {}, declared: {:?})",
            model.order,
            model.vocab.len(),
            model.ngrams.len(),
            declared
        );
        Ok(model)
    }

    fn backoff(&self, context: &[WordIndex]) -> f32 {
        self.ngrams.get(context).map(|e| e.backoff).unwrap_or(0.0)
    }
}

impl SequenceModel for BackoffModel {
    fn order(&self) -> usize {
        self.order
    }

    fn index(&self, token: &str) -> WordIndex {
        self.vocab.index_or(token, self.unk)
    }

    fn null_context_state(&self) -> LmState {
        LmState::default()
    }

    fn begin_sentence_state(&self) -> LmState {
        LmState {
            words: vec![self.index(BOS)],
        }
    }

    fn score(&self, state: &LmState, word: WordIndex) -> (f32, LmState) {
        let context = &state.words;
        let max_ctx = context.len().min(self.order - 1);
        let mut key: Vec<WordIndex> = Vec::with_capacity(max_ctx + 1);
        let mut backoff = 0.0;
        let mut prob = None;
        // longest history first; every history that fails adds its backoff
        for n in (0..=max_ctx).rev() {
            let history = &context[context.len() - n..];
            key.clear();
            key.extend_from_slice(history);
            key.push(word);
            if let Some(e) = self.ngrams.get(&key) {
                prob = Some(e.prob);
                break;
            }
            if n > 0 {
                backoff += self.backoff(history);
            }
        }
        let prob = prob.unwrap_or_else(|| {
            self.ngrams
                .get(&vec![self.unk])
                .map(|e| e.prob)
                .unwrap_or(UNKNOWN_LOGPROB)
        });

        let mut next = context[context.len() - max_ctx..].to_vec();
        next.push(word);
        if next.len() > self.order - 1 {
            next.drain(..next.len() - (self.order - 1));
        }
        (prob + backoff, LmState { words: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARPA: &str = "
\\data\\
ngram 1=4
ngram 2=2

\\1-grams:
-1.0 <unk>
-0.5 <s> -0.3
-0.7 a -0.2
-0.9 b

\\2-grams:
-0.1 <s> a
-0.2 a b

\\end\\
";

    #[test]
    fn read_arpa() {
        let lm = BackoffModel::from_reader(ARPA.as_bytes()).unwrap();
        assert_eq!(lm.order(), 2);
        let a = lm.index("a");
        let b = lm.index("b");
        assert_ne!(a, lm.index("zzz"));
        assert_eq!(lm.index("zzz"), lm.index(UNK));

        let (p, s) = lm.score(&lm.begin_sentence_state(), a);
        assert!((p - -0.1).abs() < 1e-6);
        let (p, _) = lm.score(&s, b);
        assert!((p - -0.2).abs() < 1e-6);

        // a b unseen as "b a": backoff(b)=0 + p(a)
        let (p, s) = lm.score(&lm.null_context_state(), b);
        assert!((p - -0.9).abs() < 1e-6);
        let (p, _) = lm.score(&s, a);
        assert!((p - -0.7).abs() < 1e-6);

        // history "a" has backoff -0.2, unknown word falls to <unk>
        let (_, s) = lm.score(&lm.null_context_state(), a);
        let (p, _) = lm.score(&s, lm.index("zzz"));
        assert!((p - (-1.0 - 0.2)).abs() < 1e-6);
    }

    #[test]
    fn state_keeps_order_minus_one() {
        let mut lm = BackoffModel::new(3);
        lm.insert(&["x"], -1.0, 0.0);
        let x = lm.index("x");
        let mut s = lm.begin_sentence_state();
        for _ in 0..5 {
            s = lm.score(&s, x).1;
        }
        assert_eq!(s.words().len(), 2);
    }

    #[test]
    fn invalid_arpa() {
        assert!(matches!(
            BackoffModel::from_reader("garbage".as_bytes()),
            Err(Error::InvalidModel(..))
        ));
        let broken = "\\data\\\nngram 1=1\n\\1-grams:\n-1.0 a b c d\n\\end\\\n";
        assert!(matches!(
            BackoffModel::from_reader(broken.as_bytes()),
            Err(Error::InvalidModel(..))
        ));
    }
}
