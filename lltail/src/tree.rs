//! # Rule context tree
//!
//! Parse trees live in an arena owned by one parse. Rule contexts refer to
//! their parent by [`RuleContextId`], so upward walks (recovery sets,
//! full-context prediction) need no reference counting and the tree has no
//! ownership cycles.
//!
//! ```text
//!   (a [ (b c ^ <missing INT>) ])
//!    │ │  └─ Rule(b) ─ children: Rule(c), Terminal(^), Error(<missing INT>)
//!    │ └─ Terminal([)
//!    └─ Rule(a)
//! ```

use std::fmt::Write as _;

use crate::atn::StateId;
use crate::error::{escape_ws, RecognitionError};
use crate::interval_set::Interval;
use crate::token::{Token, TokenType, INVALID_TYPE};

/// Index of a rule context in its [`ParseTreeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleContextId(usize);

impl RuleContextId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A child of a rule context.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTreeNode {
    Terminal(Token),
    /// A token consumed (or conjured) during error recovery.
    Error(Token),
    Rule(RuleContextId),
}

impl ParseTreeNode {
    /// The token of a leaf.
    pub fn token(&self) -> Option<&Token> {
        match self {
            ParseTreeNode::Terminal(t) | ParseTreeNode::Error(t) => Some(t),
            ParseTreeNode::Rule(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ParseTreeNode::Error(_))
    }
}

/// A node reached by a tree walk: a rule context or a leaf under one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Rule(RuleContextId),
    Leaf(&'a ParseTreeNode),
}

/// One rule invocation.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub rule_index: usize,
    pub parent: Option<RuleContextId>,
    /// ATN state that invoked this rule; `None` for the root.
    pub invoking_state: Option<StateId>,
    pub start: Option<Token>,
    pub stop: Option<Token>,
    /// The error that forced this rule to return early, if any.
    pub exception: Option<RecognitionError>,
    /// Outer alternative that matched, when the parser records it.
    pub alt_number: usize,
    children: Vec<ParseTreeNode>,
}

impl RuleContext {
    pub fn children(&self) -> &[ParseTreeNode] {
        &self.children
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseTreeArena {
    contexts: Vec<RuleContext>,
}

impl ParseTreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Allocate a detached context. Linking it into the parent's children is
    /// the parser's job (see [`ParseTreeArena::add_child`]).
    pub fn new_context(
        &mut self,
        parent: Option<RuleContextId>,
        invoking_state: Option<StateId>,
        rule_index: usize,
    ) -> RuleContextId {
        let id = RuleContextId(self.contexts.len());
        self.contexts.push(RuleContext {
            rule_index,
            parent,
            invoking_state,
            start: None,
            stop: None,
            exception: None,
            alt_number: 0,
            children: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: RuleContextId) -> &RuleContext {
        &self.contexts[id.0]
    }

    pub fn get_mut(&mut self, id: RuleContextId) -> &mut RuleContext {
        &mut self.contexts[id.0]
    }

    pub fn parent(&self, id: RuleContextId) -> Option<RuleContextId> {
        self.get(id).parent
    }

    /// Number of rule invocations from the root to `id` (root is 1).
    pub fn depth(&self, id: RuleContextId) -> usize {
        let mut depth = 1;
        let mut cur = id;
        while let Some(p) = self.parent(cur) {
            depth += 1;
            cur = p;
        }
        depth
    }

    /// Invoking states from `id` outward, innermost first, stopping at the
    /// root.
    pub fn invoking_states(&self, id: RuleContextId) -> Vec<StateId> {
        let mut states = Vec::new();
        let mut cur = Some(id);
        while let Some(ctx) = cur.map(|c| self.get(c)) {
            let Some(s) = ctx.invoking_state else {
                break;
            };
            states.push(s);
            cur = ctx.parent;
        }
        states
    }

    // ── building ────────────────────────────────────────────────────────────

    pub fn add_child(&mut self, parent: RuleContextId, child: ParseTreeNode) {
        self.get_mut(parent).children.push(child);
    }

    pub fn add_terminal(&mut self, parent: RuleContextId, token: Token) {
        self.add_child(parent, ParseTreeNode::Terminal(token));
    }

    pub fn add_error_node(&mut self, parent: RuleContextId, token: Token) {
        self.add_child(parent, ParseTreeNode::Error(token));
    }

    /// Swap the last child of `parent` for `child`: how a labeled
    /// alternative's context takes the place of the generic one.
    pub fn replace_last_child(&mut self, parent: RuleContextId, child: ParseTreeNode) {
        let children = &mut self.get_mut(parent).children;
        children.pop();
        children.push(child);
    }

    /// Make `dst` stand in for `src`: same parent, invoking state, and
    /// start/stop tokens. Of `src`'s children only error leaves carry over.
    pub fn copy_from(&mut self, dst: RuleContextId, src: RuleContextId) {
        let from = self.get(src).clone();
        let to = self.get_mut(dst);
        to.parent = from.parent;
        to.invoking_state = from.invoking_state;
        to.start = from.start;
        to.stop = from.stop;
        to.children.extend(from.children.into_iter().filter(ParseTreeNode::is_error));
    }

    // ── introspection ───────────────────────────────────────────────────────

    pub fn child(&self, id: RuleContextId, i: usize) -> Option<&ParseTreeNode> {
        self.get(id).children.get(i)
    }

    pub fn child_count(&self, id: RuleContextId) -> usize {
        self.get(id).children.len()
    }

    /// The `i`-th leaf child of type `token_type` (error leaves included).
    pub fn token(&self, id: RuleContextId, token_type: TokenType, i: usize) -> Option<&Token> {
        self.leaves(id).filter(|t| t.token_type == token_type).nth(i)
    }

    pub fn tokens(&self, id: RuleContextId, token_type: TokenType) -> Vec<&Token> {
        self.leaves(id).filter(|t| t.token_type == token_type).collect()
    }

    fn leaves(&self, id: RuleContextId) -> impl Iterator<Item = &Token> {
        self.get(id).children.iter().filter_map(ParseTreeNode::token)
    }

    /// Child contexts invoking rule `rule_index`, in order.
    pub fn rule_contexts(&self, id: RuleContextId, rule_index: usize) -> Vec<RuleContextId> {
        self.get(id)
            .children
            .iter()
            .filter_map(|c| match c {
                ParseTreeNode::Rule(r) if self.get(*r).rule_index == rule_index => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn rule_context(&self, id: RuleContextId, rule_index: usize, i: usize) -> Option<RuleContextId> {
        self.rule_contexts(id, rule_index).get(i).copied()
    }

    /// Token-index range covered by `id`; empty (`b < a`) when the rule
    /// matched nothing.
    pub fn source_interval(&self, id: RuleContextId) -> Interval {
        let ctx = self.get(id);
        let Some(start) = ctx.start.as_ref().and_then(|t| t.token_index) else {
            return Interval::new(-1, -2);
        };
        let start = start as TokenType;
        match ctx.stop.as_ref().and_then(|t| t.token_index) {
            Some(stop) if stop as TokenType >= start => Interval::new(start, stop as TokenType),
            _ => Interval::new(start, start - 1),
        }
    }

    /// Concatenated text of every leaf under `id`.
    pub fn text(&self, id: RuleContextId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: RuleContextId, out: &mut String) {
        for child in &self.get(id).children {
            match child {
                ParseTreeNode::Terminal(t) | ParseTreeNode::Error(t) => out.push_str(t.text()),
                ParseTreeNode::Rule(r) => self.collect_text(*r, out),
            }
        }
    }

    /// Whether any error leaf or recorded exception exists under `id`.
    pub fn has_errors(&self, id: RuleContextId) -> bool {
        let ctx = self.get(id);
        ctx.exception.is_some()
            || ctx.children.iter().any(|c| match c {
                ParseTreeNode::Error(_) => true,
                ParseTreeNode::Terminal(_) => false,
                ParseTreeNode::Rule(r) => self.has_errors(*r),
            })
    }

    // ── traversal ───────────────────────────────────────────────────────────

    /// Enclosing contexts of `id`, root first, parent last.
    pub fn ancestors(&self, id: RuleContextId) -> Vec<RuleContextId> {
        let mut ancestors = Vec::with_capacity(self.depth(id) - 1);
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            ancestors.push(p);
            cur = self.parent(p);
        }
        ancestors.reverse();
        ancestors
    }

    /// Whether `ancestor` lies on the parent chain of `id` (a context is
    /// not its own ancestor).
    pub fn is_ancestor_of(&self, ancestor: RuleContextId, id: RuleContextId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Every leaf of type `token_type` under `id`, at any depth, in
    /// document order.
    pub fn find_all_tokens(&self, id: RuleContextId, token_type: TokenType) -> Vec<&Token> {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Leaf(leaf) => leaf.token().filter(|t| t.token_type == token_type),
                NodeRef::Rule(_) => None,
            })
            .collect()
    }

    /// Every context invoking `rule_index` in the subtree of `id`, `id`
    /// itself included, in pre-order.
    pub fn find_all_rules(&self, id: RuleContextId, rule_index: usize) -> Vec<RuleContextId> {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Rule(r) if self.get(r).rule_index == rule_index => Some(r),
                _ => None,
            })
            .collect()
    }

    /// `id` followed by every node below it, in pre-order.
    pub fn descendants(&self, id: RuleContextId) -> Vec<NodeRef<'_>> {
        let mut nodes = Vec::new();
        self.collect_descendants(id, &mut nodes);
        nodes
    }

    fn collect_descendants<'a>(&'a self, id: RuleContextId, nodes: &mut Vec<NodeRef<'a>>) {
        nodes.push(NodeRef::Rule(id));
        for child in &self.get(id).children {
            match child {
                ParseTreeNode::Rule(r) => self.collect_descendants(*r, nodes),
                leaf => nodes.push(NodeRef::Leaf(leaf)),
            }
        }
    }

    /// The smallest context under `id` whose tokens enclose the token-index
    /// range `start..=stop`. Children are searched before their parent. A
    /// context without a stop token is taken to extend to the end.
    pub fn root_of_subtree_enclosing(&self, id: RuleContextId, start: usize, stop: usize) -> Option<RuleContextId> {
        for child in &self.get(id).children {
            if let ParseTreeNode::Rule(r) = child {
                if let Some(found) = self.root_of_subtree_enclosing(*r, start, stop) {
                    return Some(found);
                }
            }
        }
        let ctx = self.get(id);
        let first = ctx.start.as_ref().and_then(|t| t.token_index)?;
        let last = ctx.stop.as_ref().and_then(|t| t.token_index);
        (start >= first && last.map_or(true, |last| stop <= last)).then_some(id)
    }

    /// Replace each child context of `id` lying wholly outside the token
    /// range `start..=stop` with a `...` leaf, unless it contains `keep`.
    /// Source intervals are left as they were.
    pub fn strip_children_out_of_range(&mut self, id: RuleContextId, keep: RuleContextId, start: usize, stop: usize) {
        let (start, stop) = (start as TokenType, stop as TokenType);
        let outside: Vec<usize> = self
            .get(id)
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| match child {
                ParseTreeNode::Rule(r) => {
                    let range = self.source_interval(*r);
                    let out_of_range = range.b < start || range.a > stop;
                    let holds_keep = *r == keep || self.is_ancestor_of(*r, keep);
                    (out_of_range && !holds_keep).then_some(i)
                },
                _ => None,
            })
            .collect();
        let children = &mut self.get_mut(id).children;
        for i in outside {
            children[i] = ParseTreeNode::Terminal(Token::new(INVALID_TYPE, "..."));
        }
    }

    /// `ParserRuleContext[outer, ..., rule]{start=..., stop=...}`: the rule
    /// invocation path from the root down to `id`, plus its boundary tokens.
    pub fn to_info_string(&self, id: RuleContextId, rule_names: &[&str]) -> String {
        let rule_name = |c: RuleContextId| {
            let index = self.get(c).rule_index;
            rule_names.get(index).map(|n| n.to_string()).unwrap_or_else(|| index.to_string())
        };
        let path: Vec<String> = self.ancestors(id).into_iter().chain([id]).map(rule_name).collect();
        let token = |t: &Option<Token>| t.as_ref().map_or_else(|| "null".to_string(), Token::to_string);
        let ctx = self.get(id);
        format!("ParserRuleContext[{}]{{start={}, stop={}}}", path.join(", "), token(&ctx.start), token(&ctx.stop))
    }

    /// LISP-style rendering: `(rule child child ...)`.
    pub fn to_string_tree(&self, id: RuleContextId, rule_names: &[&str]) -> String {
        let mut out = String::new();
        self.write_tree(id, rule_names, &mut out);
        out
    }

    fn write_tree(&self, id: RuleContextId, rule_names: &[&str], out: &mut String) {
        let ctx = self.get(id);
        let name = rule_names
            .get(ctx.rule_index)
            .map(|n| n.to_string())
            .unwrap_or_else(|| ctx.rule_index.to_string());
        if ctx.children.is_empty() {
            out.push_str(&name);
            return;
        }
        let _ = write!(out, "({}", name);
        for child in &ctx.children {
            out.push(' ');
            match child {
                ParseTreeNode::Terminal(t) | ParseTreeNode::Error(t) => out.push_str(&escape_ws(t.text())),
                ParseTreeNode::Rule(r) => self.write_tree(*r, rule_names, out),
            }
        }
        out.push(')');
    }
}
