//! Semantic contexts: the predicates a configuration has collected on its
//! way through the ATN, combined with `&&` / `||`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Evaluates grammar predicates on behalf of the prediction engine.
///
/// Predicates are evaluated against the parser's current (outer) rule
/// context, so implementations typically capture parser state.
pub trait PredicateEvaluator {
    /// `{...}?` predicate `pred_index` of rule `rule_index`.
    fn sempred(&self, rule_index: usize, pred_index: usize) -> bool;

    /// `{precpred(_ctx, precedence)}?` in a rewritten left-recursive rule.
    fn precpred(&self, precedence: i32) -> bool;
}

/// Evaluator for recognizers without predicates: everything passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPredicates;

impl PredicateEvaluator for NoPredicates {
    fn sempred(&self, _rule_index: usize, _pred_index: usize) -> bool {
        true
    }

    fn precpred(&self, _precedence: i32) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SemanticContext {
    /// Always true.
    None,
    Predicate {
        rule_index: usize,
        pred_index: usize,
        is_ctx_dependent: bool,
    },
    Precedence {
        precedence: i32,
    },
    /// Conjunction; operands are deduplicated and sorted.
    And(Vec<Arc<SemanticContext>>),
    /// Disjunction; operands are deduplicated and sorted.
    Or(Vec<Arc<SemanticContext>>),
}

impl SemanticContext {
    pub fn none() -> Arc<SemanticContext> {
        static NONE: std::sync::OnceLock<Arc<SemanticContext>> = std::sync::OnceLock::new();
        NONE.get_or_init(|| Arc::new(SemanticContext::None)).clone()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SemanticContext::None)
    }

    /// `a && b`. Of several precedence predicates only the lowest is kept,
    /// since it implies the others.
    pub fn and(a: &Arc<SemanticContext>, b: &Arc<SemanticContext>) -> Arc<SemanticContext> {
        if a.is_none() {
            return b.clone();
        }
        if b.is_none() {
            return a.clone();
        }
        let mut operands = BTreeSet::new();
        collect_operands(a, &mut operands, true);
        collect_operands(b, &mut operands, true);
        let operands = reduce_precedence(operands, true);
        build(operands, SemanticContext::And)
    }

    /// `a || b`. Of several precedence predicates only the highest is kept.
    pub fn or(a: &Arc<SemanticContext>, b: &Arc<SemanticContext>) -> Arc<SemanticContext> {
        if a.is_none() || b.is_none() {
            return SemanticContext::none();
        }
        let mut operands = BTreeSet::new();
        collect_operands(a, &mut operands, false);
        collect_operands(b, &mut operands, false);
        let operands = reduce_precedence(operands, false);
        build(operands, SemanticContext::Or)
    }

    pub fn eval(&self, evaluator: &dyn PredicateEvaluator) -> bool {
        match self {
            SemanticContext::None => true,
            SemanticContext::Predicate { rule_index, pred_index, .. } => {
                evaluator.sempred(*rule_index, *pred_index)
            },
            SemanticContext::Precedence { precedence } => evaluator.precpred(*precedence),
            SemanticContext::And(ops) => ops.iter().all(|op| op.eval(evaluator)),
            SemanticContext::Or(ops) => ops.iter().any(|op| op.eval(evaluator)),
        }
    }

    /// Evaluate only the precedence predicates, simplifying the rest.
    ///
    /// Returns `None` when the context is now known to be false, the
    /// [`SemanticContext::None`] context when it is known to be true, and a
    /// (possibly reduced) context otherwise.
    pub fn eval_precedence(
        this: &Arc<SemanticContext>,
        evaluator: &dyn PredicateEvaluator,
    ) -> Option<Arc<SemanticContext>> {
        match this.as_ref() {
            SemanticContext::Precedence { precedence } => {
                if evaluator.precpred(*precedence) {
                    Some(SemanticContext::none())
                } else {
                    None
                }
            },
            SemanticContext::None | SemanticContext::Predicate { .. } => Some(this.clone()),
            SemanticContext::And(ops) => {
                let mut differs = false;
                let mut operands = Vec::new();
                for op in ops {
                    let evaluated = SemanticContext::eval_precedence(op, evaluator)?;
                    differs |= !Arc::ptr_eq(&evaluated, op) && evaluated != *op;
                    if !evaluated.is_none() {
                        operands.push(evaluated);
                    }
                }
                if !differs {
                    return Some(this.clone());
                }
                Some(
                    operands
                        .iter()
                        .fold(SemanticContext::none(), |acc, op| SemanticContext::and(&acc, op)),
                )
            },
            SemanticContext::Or(ops) => {
                let mut differs = false;
                let mut operands = Vec::new();
                for op in ops {
                    let evaluated = SemanticContext::eval_precedence(op, evaluator);
                    match evaluated {
                        Some(e) if e.is_none() => return Some(SemanticContext::none()),
                        Some(e) => {
                            differs |= e != *op;
                            operands.push(e);
                        },
                        None => differs = true,
                    }
                }
                if !differs {
                    return Some(this.clone());
                }
                let mut iter = operands.into_iter();
                let first = iter.next()?;
                Some(iter.fold(first, |acc, op| SemanticContext::or(&acc, &op)))
            },
        }
    }
}

fn collect_operands(ctx: &Arc<SemanticContext>, into: &mut BTreeSet<Arc<SemanticContext>>, conjunction: bool) {
    match (ctx.as_ref(), conjunction) {
        (SemanticContext::And(ops), true) | (SemanticContext::Or(ops), false) => {
            into.extend(ops.iter().cloned());
        },
        _ => {
            into.insert(ctx.clone());
        },
    }
}

/// Collapse precedence predicates: `&&` keeps the minimum, `||` the maximum.
fn reduce_precedence(operands: BTreeSet<Arc<SemanticContext>>, conjunction: bool) -> Vec<Arc<SemanticContext>> {
    let mut kept = None::<Arc<SemanticContext>>;
    let mut others = Vec::with_capacity(operands.len());
    for op in operands {
        if let SemanticContext::Precedence { precedence } = op.as_ref() {
            let replace = match kept.as_deref() {
                Some(SemanticContext::Precedence { precedence: current }) => {
                    if conjunction {
                        precedence < current
                    } else {
                        precedence > current
                    }
                },
                _ => true,
            };
            if replace {
                kept = Some(op.clone());
            }
        } else {
            others.push(op);
        }
    }
    if let Some(p) = kept {
        others.push(p);
        others.sort();
    }
    others
}

fn build(
    mut operands: Vec<Arc<SemanticContext>>,
    wrap: fn(Vec<Arc<SemanticContext>>) -> SemanticContext,
) -> Arc<SemanticContext> {
    if operands.len() == 1 {
        return operands.remove(0);
    }
    Arc::new(wrap(operands))
}

impl fmt::Display for SemanticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticContext::None => write!(f, "true"),
            SemanticContext::Predicate { rule_index, pred_index, .. } => {
                write!(f, "{{{}:{}}}?", rule_index, pred_index)
            },
            SemanticContext::Precedence { precedence } => write!(f, "{{{}>=prec}}?", precedence),
            SemanticContext::And(ops) => {
                let parts: Vec<String> = ops.iter().map(|o| o.to_string()).collect();
                write!(f, "{}", parts.join("&&"))
            },
            SemanticContext::Or(ops) => {
                let parts: Vec<String> = ops.iter().map(|o| o.to_string()).collect();
                write!(f, "{}", parts.join("||"))
            },
        }
    }
}
