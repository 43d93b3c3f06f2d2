//! Lexer actions and their deferred execution
//!
//! Actions such as `-> skip` or `-> pushMode(X)` are collected while the
//! simulator walks the ATN and only run once a token is accepted. A
//! [`LexerActionExecutor`] is the ordered, shared list of actions bound to
//! an accept state.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::char_stream::CharStream;
use super::error::AtnResult;

/// Operations a lexer action can perform on the lexer
pub trait LexerControl {
    /// Drop the current token
    fn skip(&mut self);
    /// Keep matching and extend the current token
    fn more(&mut self);
    /// Switch to `mode`
    fn set_mode(&mut self, mode: usize);
    /// Push the current mode and switch to `mode`
    fn push_mode(&mut self, mode: usize);
    /// Return to the previously pushed mode
    fn pop_mode(&mut self) -> AtnResult<usize>;
    /// Override the token type
    fn set_type(&mut self, token_type: i32);
    /// Override the token channel
    fn set_channel(&mut self, channel: i32);
    /// Run embedded action code; `input` is positioned where the action
    /// appeared in the rule
    fn custom_action(
        &mut self,
        input: &dyn CharStream,
        rule_index: usize,
        action_index: usize,
    ) -> AtnResult<()>;
}

/// A single lexer command
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LexerAction {
    /// `-> channel(n)`
    Channel(i32),
    /// An embedded `{...}` action
    Custom {
        /// Rule containing the action
        rule_index: usize,
        /// Action index within the rule
        action_index: usize,
    },
    /// `-> mode(n)`
    Mode(usize),
    /// `-> more`
    More,
    /// `-> popMode`
    PopMode,
    /// `-> pushMode(n)`
    PushMode(usize),
    /// `-> skip`
    Skip,
    /// `-> type(n)`
    Type(i32),
    /// A position-dependent action pinned to `offset` code points after
    /// the token start
    Indexed {
        /// Offset from the token start
        offset: usize,
        /// The wrapped action
        action: Box<LexerAction>,
    },
}

impl LexerAction {
    /// Whether the action reads the input position when it runs
    pub fn is_position_dependent(&self) -> bool {
        match self {
            LexerAction::Custom { .. } => true,
            LexerAction::Indexed { action, .. } => action.is_position_dependent(),
            _ => false,
        }
    }

    /// Apply the action to `control`
    pub fn execute(&self, control: &mut dyn LexerControl, input: &dyn CharStream) -> AtnResult<()> {
        match self {
            LexerAction::Channel(channel) => control.set_channel(*channel),
            LexerAction::Custom {
                rule_index,
                action_index,
            } => control.custom_action(input, *rule_index, *action_index)?,
            LexerAction::Mode(mode) => control.set_mode(*mode),
            LexerAction::More => control.more(),
            LexerAction::PopMode => {
                control.pop_mode()?;
            }
            LexerAction::PushMode(mode) => control.push_mode(*mode),
            LexerAction::Skip => control.skip(),
            LexerAction::Type(token_type) => control.set_type(*token_type),
            LexerAction::Indexed { action, .. } => action.execute(control, input)?,
        }
        Ok(())
    }
}

impl fmt::Display for LexerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerAction::Channel(c) => write!(f, "channel({})", c),
            LexerAction::Custom {
                rule_index,
                action_index,
            } => write!(f, "custom({}:{})", rule_index, action_index),
            LexerAction::Mode(m) => write!(f, "mode({})", m),
            LexerAction::More => write!(f, "more"),
            LexerAction::PopMode => write!(f, "popMode"),
            LexerAction::PushMode(m) => write!(f, "pushMode({})", m),
            LexerAction::Skip => write!(f, "skip"),
            LexerAction::Type(t) => write!(f, "type({})", t),
            LexerAction::Indexed { offset, action } => write!(f, "{}@{}", action, offset),
        }
    }
}

/// An immutable, shared sequence of lexer actions
#[derive(Debug, Clone)]
pub struct LexerActionExecutor {
    actions: Arc<[LexerAction]>,
    cached_hash: u64,
}

impl LexerActionExecutor {
    /// Create an executor over `actions`
    pub fn new(actions: Vec<LexerAction>) -> Self {
        let mut hasher = ahash::AHasher::default();
        actions.hash(&mut hasher);
        Self {
            actions: actions.into(),
            cached_hash: hasher.finish(),
        }
    }

    /// The actions in execution order
    #[inline]
    pub fn actions(&self) -> &[LexerAction] {
        &self.actions
    }

    /// An executor running `executor`'s actions followed by `action`
    pub fn append(executor: Option<&Arc<Self>>, action: LexerAction) -> Arc<Self> {
        let mut actions = executor.map(|e| e.actions.to_vec()).unwrap_or_default();
        actions.push(action);
        Arc::new(Self::new(actions))
    }

    /// Pin position-dependent actions to `offset` from the token start
    ///
    /// Returns `self` unchanged when every such action is already pinned.
    pub fn fix_offset_before_match(self: &Arc<Self>, offset: usize) -> Arc<Self> {
        let mut updated: Option<Vec<LexerAction>> = None;
        for (i, action) in self.actions.iter().enumerate() {
            if action.is_position_dependent() && !matches!(action, LexerAction::Indexed { .. }) {
                let list = updated.get_or_insert_with(|| self.actions.to_vec());
                list[i] = LexerAction::Indexed {
                    offset,
                    action: Box::new(action.clone()),
                };
            }
        }
        match updated {
            Some(actions) => Arc::new(Self::new(actions)),
            None => self.clone(),
        }
    }

    /// Run every action for the token that started at `start_index`
    ///
    /// `input` is positioned at the token stop on entry and is left there on
    /// return, even when an action fails.
    pub fn execute(
        &self,
        control: &mut dyn LexerControl,
        input: &mut dyn CharStream,
        start_index: usize,
    ) -> AtnResult<()> {
        let stop_index = input.index();
        let mut requires_seek = false;
        let mut result = Ok(());
        for action in self.actions.iter() {
            if let LexerAction::Indexed { offset, .. } = action {
                let index = start_index + offset;
                input.seek(index);
                requires_seek = index != stop_index;
            } else if action.is_position_dependent() {
                input.seek(stop_index);
                requires_seek = false;
            }
            result = action.execute(control, &*input);
            if result.is_err() {
                break;
            }
        }
        if requires_seek || result.is_err() {
            input.seek(stop_index);
        }
        result
    }
}

impl PartialEq for LexerActionExecutor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.actions, &other.actions)
            || (self.cached_hash == other.cached_hash && self.actions == other.actions)
    }
}

impl Eq for LexerActionExecutor {}

impl Hash for LexerActionExecutor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.cached_hash);
    }
}

impl fmt::Display for LexerActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.actions.iter().map(|a| a.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
