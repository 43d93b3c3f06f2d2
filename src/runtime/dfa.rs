//! Lazily built DFAs over ATN configuration sets
//!
//! Every lexer mode and every parser decision owns one [`Dfa`]. States are
//! interned by the structural equality of their configuration set, so two
//! closures that produce equal sets share one [`DfaState`]. Edges are
//! stored in a small dense table per state and point at states by
//! [`DfaStateId`].

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use super::atn::Atn;
use super::config_set::AtnConfigSet;
use super::error::{AtnError, AtnResult};
use super::lexer_action::LexerActionExecutor;
use super::semantic_context::SemanticContext;

/// Smallest symbol with a cached lexer edge
pub const MIN_DFA_EDGE: i32 = 0;

/// Largest symbol with a cached lexer edge
pub const MAX_DFA_EDGE: i32 = 127;

/// Index of a state inside its [`Dfa`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DfaStateId(usize);

impl DfaStateId {
    /// Target of a cached dead edge
    pub const ERROR: DfaStateId = DfaStateId(usize::MAX);

    /// Wrap a raw index
    #[inline]
    pub fn new(index: usize) -> Self {
        DfaStateId(index)
    }

    /// The raw index
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// Whether this is [`DfaStateId::ERROR`]
    #[inline]
    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }
}

impl fmt::Display for DfaStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error() {
            write!(f, "ERROR")
        } else {
            write!(f, "s{}", self.0)
        }
    }
}

/// A predicate guarding one predicted alternative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredPrediction {
    /// The guard
    pub pred: SemanticContext,
    /// Alternative predicted when the guard holds
    pub alt: u32,
}

impl fmt::Display for PredPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.pred, self.alt)
    }
}

/// A DFA state: a frozen configuration set plus cached outcome and edges
#[derive(Debug, Clone)]
pub struct DfaState {
    /// Position in the owning DFA
    pub state_number: usize,
    /// The configurations this state stands for
    pub configs: Arc<AtnConfigSet>,
    edges: Vec<Option<DfaStateId>>,
    /// Whether a token or decision can be finalized here
    pub is_accept_state: bool,
    /// Token type (lexer) or alternative (parser) of an accept state
    pub prediction: i32,
    /// Actions to run when a lexer accepts here
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
    /// Whether SLL prediction conflicted and full context is needed
    pub requires_full_context: bool,
    /// Predicate guards of a predicated accept state
    pub predicates: Option<Vec<PredPrediction>>,
}

impl DfaState {
    /// A non-accepting state over `configs`
    pub fn new(configs: AtnConfigSet) -> Self {
        Self {
            state_number: 0,
            configs: Arc::new(configs),
            edges: Vec::new(),
            is_accept_state: false,
            prediction: 0,
            lexer_action_executor: None,
            requires_full_context: false,
            predicates: None,
        }
    }

    /// Cached target for edge `index`
    #[inline]
    pub fn edge(&self, index: usize) -> Option<DfaStateId> {
        self.edges.get(index).copied().flatten()
    }

    /// Cache `target` for edge `index`, growing the table as needed
    pub fn set_edge(&mut self, index: usize, target: DfaStateId) {
        if index >= self.edges.len() {
            self.edges.resize(index + 1, None);
        }
        self.edges[index] = Some(target);
    }

    /// Every cached edge as `(index, target)`
    pub fn edges(&self) -> impl Iterator<Item = (usize, DfaStateId)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|target| (i, target)))
    }

    /// Number of cached edges
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_some()).count()
    }
}

impl fmt::Display for DfaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.state_number, self.configs)?;
        if self.is_accept_state {
            match &self.predicates {
                Some(preds) => {
                    let parts: Vec<String> = preds.iter().map(|p| p.to_string()).collect();
                    write!(f, "=>[{}]", parts.join(", "))?;
                }
                None => write!(f, "=>{}", self.prediction)?,
            }
        }
        Ok(())
    }
}

/// The DFA of one lexer mode or parser decision
#[derive(Debug)]
pub struct Dfa {
    /// ATN state the DFA starts from
    pub atn_start_state: usize,
    /// Decision (parser) or mode (lexer) number
    pub decision: usize,
    states: Vec<DfaState>,
    index: HashMap<Arc<AtnConfigSet>, DfaStateId>,
    s0: Option<DfaStateId>,
    precedence_dfa: bool,
    precedence_starts: Vec<Option<DfaStateId>>,
    generation: u64,
}

impl Dfa {
    /// Create an empty DFA
    pub fn new(atn_start_state: usize, decision: usize, precedence_dfa: bool) -> Self {
        Self {
            atn_start_state,
            decision,
            states: Vec::new(),
            index: HashMap::new(),
            s0: None,
            precedence_dfa,
            precedence_starts: Vec::new(),
            generation: 0,
        }
    }

    /// The DFA of `decision`, a precedence DFA when the decision state is a
    /// precedence decision
    pub fn for_decision(atn: &Atn, decision: usize) -> AtnResult<Self> {
        let state = atn.decision_state(decision).ok_or_else(|| {
            AtnError::invalid_atn(format!("unknown decision {}", decision))
        })?;
        Ok(Self::new(
            state.state_number,
            decision,
            state.is_precedence_decision(),
        ))
    }

    /// Number of times this DFA was cleared
    ///
    /// State ids are only meaningful within one generation: after a clear
    /// the same id may name a different state.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached start state
    #[inline]
    pub fn s0(&self) -> Option<DfaStateId> {
        self.s0
    }

    /// Cache the start state
    pub fn set_s0(&mut self, s0: DfaStateId) {
        log_debug!("dfa {}: start state {}", self.decision, s0);
        self.s0 = Some(s0);
    }

    /// Look up a state
    #[inline]
    pub fn state(&self, id: DfaStateId) -> Option<&DfaState> {
        self.states.get(id.0)
    }

    /// Look up a state for update
    #[inline]
    pub fn state_mut(&mut self, id: DfaStateId) -> Option<&mut DfaState> {
        self.states.get_mut(id.0)
    }

    /// Look up a state, failing on unknown ids
    pub fn get(&self, id: DfaStateId) -> AtnResult<&DfaState> {
        self.state(id)
            .ok_or_else(|| AtnError::illegal_state(format!("unknown DFA state {}", id)))
    }

    /// All states in creation order
    #[inline]
    pub fn states(&self) -> &[DfaState] {
        &self.states
    }

    /// Number of states
    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no state was built yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Total number of cached edges
    pub fn edge_count(&self) -> usize {
        self.states.iter().map(DfaState::edge_count).sum()
    }

    /// Intern `proposed`, returning the existing state with an equal
    /// configuration set if there is one
    ///
    /// A newly inserted state gets the next state number and its
    /// configuration set is frozen.
    pub fn add_state(&mut self, mut proposed: DfaState) -> DfaStateId {
        if let Some(&existing) = self.index.get(&proposed.configs) {
            return existing;
        }
        let id = DfaStateId(self.states.len());
        proposed.state_number = id.0;
        Arc::make_mut(&mut proposed.configs).set_readonly(true);
        log_debug!(
            "dfa {}: new state s{} accept={}",
            self.decision,
            id.0,
            proposed.is_accept_state
        );
        self.index.insert(proposed.configs.clone(), id);
        self.states.push(proposed);
        id
    }

    /// Cached edge `index` out of `from`
    #[inline]
    pub fn edge(&self, from: DfaStateId, index: usize) -> Option<DfaStateId> {
        self.state(from).and_then(|s| s.edge(index))
    }

    /// Cache edge `index` out of `from`
    pub fn set_edge(&mut self, from: DfaStateId, index: usize, to: DfaStateId) -> AtnResult<()> {
        let state = self
            .state_mut(from)
            .ok_or_else(|| AtnError::illegal_state(format!("unknown DFA state {}", from)))?;
        state.set_edge(index, to);
        Ok(())
    }

    // ========================================================================
    // Precedence DFAs
    // ========================================================================

    /// Whether start states are selected by precedence
    #[inline]
    pub fn is_precedence_dfa(&self) -> bool {
        self.precedence_dfa
    }

    /// Start state for `precedence`, if cached
    pub fn precedence_start_state(&self, precedence: i32) -> AtnResult<Option<DfaStateId>> {
        if !self.precedence_dfa {
            return Err(AtnError::illegal_state(
                "Only precedence DFAs may contain a precedence start state.",
            ));
        }
        if precedence < 0 {
            return Ok(None);
        }
        Ok(self
            .precedence_starts
            .get(precedence as usize)
            .copied()
            .flatten())
    }

    /// Cache the start state for `precedence`; negative precedences are
    /// ignored
    pub fn set_precedence_start_state(
        &mut self,
        precedence: i32,
        start: DfaStateId,
    ) -> AtnResult<()> {
        if !self.precedence_dfa {
            return Err(AtnError::illegal_state(
                "Only precedence DFAs may contain a precedence start state.",
            ));
        }
        if precedence < 0 {
            return Ok(());
        }
        let index = precedence as usize;
        if index >= self.precedence_starts.len() {
            self.precedence_starts.resize(index + 1, None);
        }
        log_debug!(
            "dfa {}: precedence {} starts at {}",
            self.decision,
            precedence,
            start
        );
        self.precedence_starts[index] = Some(start);
        Ok(())
    }

    /// Precedence start edges as `(precedence, state)`
    pub fn precedence_starts(&self) -> impl Iterator<Item = (usize, DfaStateId)> + '_ {
        self.precedence_starts
            .iter()
            .enumerate()
            .filter_map(|(p, s)| s.map(|s| (p, s)))
    }

    /// Switch between a regular and a precedence DFA
    ///
    /// Changing the mode discards every cached state.
    pub fn set_precedence_dfa(&mut self, precedence_dfa: bool) {
        if self.precedence_dfa != precedence_dfa {
            self.clear();
            self.precedence_dfa = precedence_dfa;
        }
    }

    /// Drop every state and edge and start a new generation
    pub fn clear(&mut self) {
        log_debug!("dfa {}: cleared", self.decision);
        self.generation = self.generation.wrapping_add(1);
        self.states.clear();
        self.index.clear();
        self.s0 = None;
        self.precedence_starts.clear();
    }
}
