//! Deferred lexer commands.
//!
//! Lexer simulation explores many candidate matches speculatively, so rule
//! actions are queued in a [`LexerActionExecutor`] attached to each
//! configuration and only the executor of the winning accept state runs.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::token::TokenType;

/// Callbacks a lexer exposes to its action executor.
pub trait LexerActionTarget {
    fn skip(&mut self);
    fn more(&mut self);
    fn set_mode(&mut self, mode: usize);
    fn push_mode(&mut self, mode: usize);
    fn pop_mode(&mut self);
    fn set_type(&mut self, token_type: TokenType);
    fn set_channel(&mut self, channel: i32);
    /// A user action. `input_index` is the input position the action is
    /// anchored at: where it appeared in the rule, not where the match ended.
    fn custom_action(&mut self, rule_index: usize, action_index: usize, input_index: usize);

    /// Lexer semantic predicate. Evaluated during simulation, so it must not
    /// have side effects.
    fn sempred(&self, _rule_index: usize, _pred_index: usize) -> bool {
        true
    }
}

/// An immutable lexer command. Parameterless commands are unit variants, so
/// two `Skip`s are simply equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LexerAction {
    Skip,
    More,
    PopMode,
    Mode(usize),
    PushMode(usize),
    Type(TokenType),
    Channel(i32),
    Custom {
        rule_index: usize,
        action_index: usize,
    },
    /// `action` re-anchored at `offset` chars past the token start.
    Indexed {
        offset: usize,
        action: Box<LexerAction>,
    },
}

impl LexerAction {
    /// Whether the action observes the input position when it runs.
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, LexerAction::Custom { .. } | LexerAction::Indexed { .. })
    }

    fn execute(&self, target: &mut dyn LexerActionTarget, input_index: usize) {
        match self {
            LexerAction::Skip => target.skip(),
            LexerAction::More => target.more(),
            LexerAction::PopMode => target.pop_mode(),
            LexerAction::Mode(m) => target.set_mode(*m),
            LexerAction::PushMode(m) => target.push_mode(*m),
            LexerAction::Type(t) => target.set_type(*t),
            LexerAction::Channel(c) => target.set_channel(*c),
            LexerAction::Custom { rule_index, action_index } => {
                target.custom_action(*rule_index, *action_index, input_index)
            },
            LexerAction::Indexed { action, .. } => action.execute(target, input_index),
        }
    }
}

/// The ordered actions queued along one lexer simulation thread.
#[derive(Debug, Clone)]
pub struct LexerActionExecutor {
    actions: Vec<LexerAction>,
    hash: u64,
}

impl LexerActionExecutor {
    pub fn new(actions: Vec<LexerAction>) -> Self {
        let mut h = FxHasher::default();
        actions.hash(&mut h);
        LexerActionExecutor { actions, hash: h.finish() }
    }

    /// `executor` followed by `action`.
    pub fn append(executor: Option<&Arc<LexerActionExecutor>>, action: LexerAction) -> Arc<LexerActionExecutor> {
        let mut actions = executor.map(|e| e.actions.clone()).unwrap_or_default();
        actions.push(action);
        Arc::new(LexerActionExecutor::new(actions))
    }

    /// Anchor every position-dependent action at `offset`, the distance from
    /// the token start at which it was reached. Already-anchored actions keep
    /// their original offset.
    pub fn fix_offset_before_match(this: &Arc<LexerActionExecutor>, offset: usize) -> Arc<LexerActionExecutor> {
        let needs_fix = this
            .actions
            .iter()
            .any(|a| a.is_position_dependent() && !matches!(a, LexerAction::Indexed { .. }));
        if !needs_fix {
            return this.clone();
        }
        let actions = this
            .actions
            .iter()
            .map(|a| match a {
                LexerAction::Indexed { .. } => a.clone(),
                a if a.is_position_dependent() => LexerAction::Indexed { offset, action: Box::new(a.clone()) },
                a => a.clone(),
            })
            .collect();
        Arc::new(LexerActionExecutor::new(actions))
    }

    pub fn actions(&self) -> &[LexerAction] {
        &self.actions
    }

    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    /// Run every action in order. Anchored actions see
    /// `start_index + offset`; the rest see `stop_index`, the input position
    /// after the match.
    pub fn execute(&self, target: &mut dyn LexerActionTarget, start_index: usize, stop_index: usize) {
        for action in &self.actions {
            let position = match action {
                LexerAction::Indexed { offset, .. } => start_index + offset,
                _ => stop_index,
            };
            action.execute(target, position);
        }
    }
}

impl PartialEq for LexerActionExecutor {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.actions == other.actions
    }
}

impl Eq for LexerActionExecutor {}

impl Hash for LexerActionExecutor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
