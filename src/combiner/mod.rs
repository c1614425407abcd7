//! Thread-local agents folded into one logical value.
//!
//! Every writer thread owns one [`Agent`] per combiner and only ever writes to
//! it, so the write path touches no shared lock. Readers fold all live agents
//! together with the values already committed by retired agents.
//!
//! Lifetimes:
//! - an agent is created lazily on the first write of a thread;
//! - when the thread exits, its agents commit their pending value into the
//!   combiner baseline and detach;
//! - when the combiner is dropped first, its agents are reset and detached,
//!   and the stale thread-local entries are pruned later.

pub mod element;
pub mod ops;

pub use element::{AtomicElement, Atomical, ElementCell, LockedElement};
pub use ops::{AddTo, InverseOp, MaxTo, MinTo, MinusFrom, ReduceOp, SeriesFold, VoidOp};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Describes how per-thread elements fold into a combined result.
///
/// `fold` must be associative and commutative over elements, and
/// `identity()` must leave any result unchanged.
pub trait Fold: Send + Sync + 'static {
    /// Combined value
    type Result: Clone + Send + Sync + 'static;
    /// Per-thread storage
    type Element: Send + Sync + 'static;

    /// Identity of the fold
    fn identity(&self) -> Self::Result;

    /// Fresh element holding the identity
    fn new_element(&self) -> Self::Element;

    /// `acc = acc op element`, leaving the element untouched
    fn fold(&self, acc: &mut Self::Result, element: &Self::Element);

    /// `acc = acc op element` and reset the element to the identity
    fn take(&self, acc: &mut Self::Result, element: &Self::Element);
}

static NEXT_COMBINER_ID: AtomicU64 = AtomicU64::new(1);

/// One thread's contribution slot.
pub struct Agent<F: Fold> {
    element: CachePadded<F::Element>,
    combiner: Weak<Shared<F>>,
}

struct Shared<F: Fold> {
    id: u64,
    fold: F,
    state: Mutex<State<F>>,
}

struct State<F: Fold> {
    /// Values committed by agents that are gone
    global: F::Result,
    agents: Vec<Arc<Agent<F>>>,
}

impl<F: Fold> Agent<F> {
    /// The thread-owned element.
    #[inline]
    pub fn element(&self) -> &F::Element {
        &self.element
    }

    /// Move this agent's pending value into the combiner baseline.
    ///
    /// A no-op once the combiner is gone.
    pub fn commit_and_clear(&self) {
        if let Some(shared) = self.combiner.upgrade() {
            let mut state = shared.state.lock();
            shared.fold.take(&mut state.global, &self.element);
        }
    }
}

impl<F: Fold> Shared<F> {
    fn retire(&self, agent: &Agent<F>) {
        let mut state = self.state.lock();
        let state = &mut *state;
        self.fold.take(&mut state.global, &agent.element);
        state.agents.retain(|a| !std::ptr::eq(Arc::as_ptr(a), agent));
    }
}

/// Type-erased view of an agent kept in the thread-local table.
trait LocalAgent: Send + Sync {
    fn retire(&self);
    fn is_detached(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<F: Fold> LocalAgent for Agent<F> {
    fn retire(&self) {
        if let Some(shared) = self.combiner.upgrade() {
            shared.retire(self);
        }
    }

    fn is_detached(&self) -> bool {
        self.combiner.strong_count() == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

struct LocalAgents {
    agents: FxHashMap<u64, Arc<dyn LocalAgent>>,
    prune_at: usize,
}

const MIN_PRUNE_AT: usize = 16;

impl LocalAgents {
    fn get<F: Fold>(&self, id: u64) -> Option<&Agent<F>> {
        self.agents.get(&id)?.as_any().downcast_ref::<Agent<F>>()
    }

    fn insert(&mut self, id: u64, agent: Arc<dyn LocalAgent>) {
        if self.agents.len() >= self.prune_at {
            self.agents.retain(|_, a| !a.is_detached());
            self.prune_at = (self.agents.len() * 2).max(MIN_PRUNE_AT);
        }
        self.agents.insert(id, agent);
    }
}

impl Drop for LocalAgents {
    fn drop(&mut self) {
        for (_, agent) in self.agents.drain() {
            agent.retire();
        }
    }
}

thread_local! {
    static LOCAL_AGENTS: RefCell<LocalAgents> = RefCell::new(LocalAgents {
        agents: FxHashMap::default(),
        prune_at: MIN_PRUNE_AT,
    });
}

/// Reduces the agents of every thread into one value.
pub struct AgentCombiner<F: Fold> {
    shared: Arc<Shared<F>>,
}

impl<F: Fold> AgentCombiner<F> {
    /// Create a combiner driven by `fold`.
    pub fn new(fold: F) -> Self {
        let global = fold.identity();
        Self {
            shared: Arc::new(Shared {
                id: NEXT_COMBINER_ID.fetch_add(1, Ordering::Relaxed),
                fold,
                state: Mutex::new(State {
                    global,
                    agents: Vec::new(),
                }),
            }),
        }
    }

    /// The fold driving this combiner.
    #[inline]
    pub fn fold(&self) -> &F {
        &self.shared.fold
    }

    /// Run `f` against the calling thread's agent, creating it on first use.
    ///
    /// This is the write path. When thread-local storage is being torn down
    /// the write goes through a temporary agent that commits immediately.
    #[inline]
    pub fn with_tls_agent<R>(&self, f: impl FnOnce(&Agent<F>) -> R) -> R {
        let mut f = Some(f);
        let done = LOCAL_AGENTS.try_with(|cell| {
            if let Ok(local) = cell.try_borrow() {
                if let Some(agent) = local.get::<F>(self.shared.id) {
                    return f.take().map(|f| f(agent));
                }
            }
            let mut local = cell.try_borrow_mut().ok()?;
            let agent = self.register_agent();
            local.insert(self.shared.id, Arc::clone(&agent) as Arc<dyn LocalAgent>);
            drop(local);
            f.take().map(|f| f(&agent))
        });

        match (done, f) {
            (Ok(Some(result)), _) => result,
            (_, Some(f)) => self.with_detached_agent(f),
            (_, None) => unreachable!("agent callback ran without producing a result"),
        }
    }

    /// The calling thread's agent, or `None` while thread-local storage is
    /// being torn down.
    pub fn get_or_create_tls_agent(&self) -> Option<Arc<Agent<F>>> {
        LOCAL_AGENTS
            .try_with(|cell| {
                let existing = cell
                    .try_borrow()
                    .ok()
                    .and_then(|local| local.agents.get(&self.shared.id).map(Arc::clone));
                if let Some(agent) = existing {
                    return agent.into_any().downcast::<Agent<F>>().ok();
                }
                let mut local = cell.try_borrow_mut().ok()?;
                let agent = self.register_agent();
                local.insert(self.shared.id, Arc::clone(&agent) as Arc<dyn LocalAgent>);
                Some(agent)
            })
            .ok()
            .flatten()
    }

    /// Fold the baseline and every live agent.
    ///
    /// Not free: takes the combiner lock and walks one agent per writer thread.
    /// Avoid calling it on a hot path.
    pub fn combine_agents(&self) -> F::Result {
        let state = self.shared.state.lock();
        let mut acc = state.global.clone();
        for agent in &state.agents {
            self.shared.fold.fold(&mut acc, &agent.element);
        }
        acc
    }

    /// Capture the combined value and reset the baseline and every agent.
    pub fn reset_all_agents(&self) -> F::Result {
        let mut state = self.shared.state.lock();
        let state = &mut *state;
        let mut acc = std::mem::replace(&mut state.global, self.shared.fold.identity());
        for agent in &state.agents {
            self.shared.fold.take(&mut acc, &agent.element);
        }
        acc
    }

    /// Number of threads currently holding an agent.
    pub fn agent_count(&self) -> usize {
        self.shared.state.lock().agents.len()
    }

    fn register_agent(&self) -> Arc<Agent<F>> {
        let agent = Arc::new(Agent {
            element: CachePadded::new(self.shared.fold.new_element()),
            combiner: Arc::downgrade(&self.shared),
        });
        self.shared.state.lock().agents.push(Arc::clone(&agent));
        agent
    }

    #[cold]
    fn with_detached_agent<R>(&self, f: impl FnOnce(&Agent<F>) -> R) -> R {
        let agent = Agent {
            element: CachePadded::new(self.shared.fold.new_element()),
            combiner: Arc::downgrade(&self.shared),
        };
        let result = f(&agent);
        agent.commit_and_clear();
        result
    }
}

impl<F: Fold> Drop for AgentCombiner<F> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        let mut discarded = self.shared.fold.identity();
        for agent in state.agents.drain(..) {
            self.shared.fold.take(&mut discarded, &agent.element);
        }
    }
}

impl<F: Fold> std::fmt::Debug for AgentCombiner<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCombiner")
            .field("id", &self.shared.id)
            .field("agents", &self.agent_count())
            .finish()
    }
}
