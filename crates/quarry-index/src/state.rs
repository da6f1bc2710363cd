use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::index::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Uninitialized,
    Building,
    Ready,
    Failed,
}

enum State {
    Uninitialized,
    /// The previously published index, if any, keeps serving until the swap.
    Building { serving: Option<Arc<VectorIndex>> },
    Ready(Arc<VectorIndex>),
    Failed { reason: String },
}

struct Inner {
    state: State,
    /// Incremented on every build start; only the newest build may publish.
    generation: u64,
}

/// Lifecycle of the published index: `Uninitialized -> Building -> Ready | Failed`.
///
/// Readers take an `Arc` snapshot under a short read lock and never see a
/// half-built index. Concurrent builds are allowed; the last one started wins.
pub struct KnowledgeBase {
    inner: RwLock<Inner>,
}

impl KnowledgeBase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: State::Uninitialized,
                generation: 0,
            }),
        }
    }

    /// Enter `Building` and return the generation token the build must publish with.
    pub fn begin_build(&self) -> u64 {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.generation += 1;
        let serving = match &inner.state {
            State::Ready(index) => Some(Arc::clone(index)),
            State::Building { serving } => serving.clone(),
            State::Uninitialized | State::Failed { .. } => None,
        };
        inner.state = State::Building { serving };
        inner.generation
    }

    /// Swap in a finished index. Returns `false` if a newer build has started since.
    pub fn publish(&self, generation: u64, index: VectorIndex) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.generation != generation {
            tracing::debug!(generation, latest = inner.generation, "stale build discarded");
            return false;
        }
        inner.state = State::Ready(Arc::new(index));
        true
    }

    /// Record a failed build. Returns `false` if a newer build has started since.
    pub fn fail(&self, generation: u64, reason: impl Into<String>) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.generation != generation {
            return false;
        }
        inner.state = State::Failed {
            reason: reason.into(),
        };
        true
    }

    /// The index queries should run against, if one is being served.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match &inner.state {
            State::Ready(index) => Some(Arc::clone(index)),
            State::Building { serving } => serving.clone(),
            State::Uninitialized | State::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> IndexPhase {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.state {
            State::Uninitialized => IndexPhase::Uninitialized,
            State::Building { .. } => IndexPhase::Building,
            State::Ready(_) => IndexPhase::Ready,
            State::Failed { .. } => IndexPhase::Failed,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match &inner.state {
            State::Failed { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
