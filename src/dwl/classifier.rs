use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{errors::Result, phrase::Sentence};

use super::cept_table::CeptTranslation;

/// Everything a classifier sees for one source cept.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub sentence: &'a Sentence,
    /// Half-open sentence spans covered by the cept.
    pub spans: &'a [(usize, usize)],
    pub source_cept: &'a str,
    pub translations: &'a [CeptTranslation],
}

/// External classifier: one raw loss per candidate translation, lower is
/// better.
///
/// Instances may keep scratch state, so each is used by one task at a time
/// through [`PredictorPool`].
pub trait Classifier: Send {
    fn predict(&mut self, query: &Query<'_>) -> Result<Vec<f32>>;
}

/// Context-free classifier that turns extraction frequencies into squared
/// losses.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrequencyClassifier;

impl Classifier for FrequencyClassifier {
    fn predict(&mut self, query: &Query<'_>) -> Result<Vec<f32>> {
        Ok(query.translations.iter().map(|t| 1.0 - t.score).collect())
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Classifier> + Send + Sync>;

/// Classifier instances shared by all tasks; a new instance is created
/// whenever every existing one is busy.
pub struct PredictorPool {
    factory: Factory,
    idle: Mutex<Vec<Box<dyn Classifier>>>,
    created: AtomicUsize,
}

impl std::fmt::Debug for PredictorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorPool")
            .field("created", &self.created())
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

impl PredictorPool {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Classifier> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            idle: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    pub fn acquire(&self) -> PooledClassifier<'_> {
        let idle = self.idle.lock().pop();
        let inner = idle.unwrap_or_else(|| {
            let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("creating classifier instance #{}", n);
            (self.factory)()
        });
        PooledClassifier {
            pool: self,
            inner: Some(inner),
        }
    }

    /// Instances created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn release(&self, classifier: Box<dyn Classifier>) {
        self.idle.lock().push(classifier);
    }
}

/// A classifier borrowed from a [`PredictorPool`]; returned on drop.
pub struct PooledClassifier<'a> {
    pool: &'a PredictorPool,
    inner: Option<Box<dyn Classifier>>,
}

impl Deref for PooledClassifier<'_> {
    type Target = dyn Classifier;

    fn deref(&self) -> &Self::Target {
        self.inner.as_deref().expect("classifier taken before drop")
    }
}

impl DerefMut for PooledClassifier<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_deref_mut().expect("classifier taken before drop")
    }
}

impl Drop for PooledClassifier<'_> {
    fn drop(&mut self) {
        if let Some(classifier) = self.inner.take() {
            self.pool.release(classifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_instances() {
        let pool = PredictorPool::new(|| Box::new(FrequencyClassifier) as Box<dyn Classifier>);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            assert_eq!(pool.created(), 2);
        }
        let _c = pool.acquire();
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn frequency_losses() {
        let pool = PredictorPool::new(|| Box::new(FrequencyClassifier) as Box<dyn Classifier>);
        let sentence = Sentence::new(0, "das haus");
        let translations = [
            CeptTranslation { index: 0, score: 0.75 },
            CeptTranslation { index: 1, score: 0.25 },
        ];
        let query = Query {
            sentence: &sentence,
            spans: &[(1, 2)],
            source_cept: "haus",
            translations: &translations,
        };
        let losses = pool.acquire().predict(&query).unwrap();
        assert_eq!(losses, vec![0.25, 0.75]);
    }
}
