use std::collections::HashMap;

/// Token index inside a [`Quark`].
pub type WordIndex = u32;

/// Bidirectional string <-> id mapping.
pub trait StringTable {
    fn to_str(&self, id: WordIndex) -> Option<&str>;
    fn to_id(&self, s: &str) -> Option<WordIndex>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interning table used by the sequence model vocabulary and the cept table's
/// target index. Ids are dense and assigned in insertion order.
#[derive(Debug, Default, Clone)]
pub struct Quark {
    v: Vec<String>,
    m: HashMap<String, WordIndex>,
}

impl From<Vec<String>> for Quark {
    fn from(value: Vec<String>) -> Self {
        let mut quark = Quark::default();
        for s in &value {
            quark.find_or_insert(s);
        }
        quark
    }
}

impl StringTable for Quark {
    fn to_str(&self, id: WordIndex) -> Option<&str> {
        self.v.get(id as usize).map(|x| x.as_str())
    }

    fn to_id(&self, s: &str) -> Option<WordIndex> {
        self.m.get(s).copied()
    }

    fn len(&self) -> usize {
        self.v.len()
    }
}

impl Quark {
    pub fn find_or_insert(&mut self, key: &str) -> WordIndex {
        if let Some(&id) = self.m.get(key) {
            return id;
        }
        let id = self.v.len() as WordIndex;
        self.m.insert(key.to_string(), id);
        self.v.push(key.to_string());
        id
    }

    /// Looks `key` up, falling back to `unknown` for out-of-vocabulary strings.
    pub fn index_or(&self, key: &str, unknown: WordIndex) -> WordIndex {
        self.to_id(key).unwrap_or(unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_str() {
        let mut quark = Quark::default();
        for (s, id) in [("<s>", 0), ("_INS_GAP_", 1), ("_TRANS_SLF_", 2), ("_INS_GAP_", 1), ("<s>", 0), ("</s>", 3)] {
            assert_eq!(id, quark.find_or_insert(s), "{} != {}", s, id);
        }
        assert_eq!(quark.len(), 4);
    }

    #[test]
    fn find_by_id() {
        let quark = Quark::from(vec!["haus".to_string(), "house".to_string()]);
        assert_eq!(quark.to_str(0), Some("haus"));
        assert_eq!(quark.to_str(1), Some("house"));
        assert_eq!(quark.to_str(2), None);
        assert_eq!(quark.index_or("garten", 99), 99);
    }
}
