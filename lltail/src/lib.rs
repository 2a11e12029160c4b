//! # lltail: adaptive LL(*) recognition runtime
//!
//! The runtime under generated recursive-descent lexers and parsers:
//!
//! - an **ATN** (augmented transition network) per grammar, built with
//!   [`AtnBuilder`] and shared immutably;
//! - **adaptive prediction** over that ATN, memoized in per-decision DFAs
//!   that fill in lazily and concurrently, with SLL prediction escalating
//!   to full-context LL only when SLL cannot decide;
//! - a **lexer simulator** that defers rule actions until the longest match
//!   is known;
//! - a **default error strategy** that reports one error per failure and
//!   resynchronizes by single-token deletion or insertion, loop-back
//!   resync, or follow-set recovery;
//! - an arena-allocated **rule-context tree**.
//!
//! ## Architecture
//!
//! ```text
//!   chars ──▶ Lexer ──▶ LexerAtnSimulator ──▶ lexer DFA (per mode)
//!                │
//!                ▼ tokens
//!   CommonTokenStream ──▶ Parser ──▶ ParserAtnSimulator ──▶ DFA (per decision)
//!                          │  │                 │
//!                          │  │                 └─ SLL ──conflict──▶ LL
//!                          │  └─▶ ErrorStrategy (report / recover / sync)
//!                          ▼
//!                    ParseTreeArena
//! ```
//!
//! Simulators are `Send + Sync`: wrap one in an `Arc` and give a clone to
//! every lexer or parser, on any thread.

pub mod atn;
pub mod config;
pub mod dfa;
pub mod error;
pub mod interval_set;
pub mod lexer;
pub mod listener;
pub mod parser;
pub mod profiling;
pub mod strategy;
pub mod stream;
pub mod token;
pub mod tree;
pub mod vocabulary;

#[cfg(test)]
mod tests;

pub use atn::{
    Atn, AtnBuilder, AtnStateType, AtnType, Fragment, LexerAtnSimulator, NoPredicates, ParserAtnSimulator,
    PredicateEvaluator, PredictionMode, PredictionScope, StateId,
};
pub use config::RuntimeOptions;
pub use dfa::Dfa;
pub use error::{DfaError, LexerNoViableAlt, OptionsError, ParseCancelled, ParseError, RecognitionError};
pub use interval_set::{Interval, IntervalSet};
pub use lexer::{Lexer, LexerAction, LexerActionExecutor, LexerActionTarget};
pub use listener::{CollectingErrorListener, ErrorListener, PredictionDiagnostic, SyntaxError, TracingErrorListener};
pub use parser::{Parser, ParserCore, RecursionFrame, SemanticPredicate};
pub use profiling::{DecisionInfo, DecisionStats};
pub use strategy::{BailErrorStrategy, DefaultErrorStrategy, ErrorStrategy, Recognizer};
pub use stream::{CharStream, CodePointCharStream, CommonTokenStream, IntStream, ListTokenSource, TokenSource, TokenStream};
pub use token::{CommonTokenFactory, Token, TokenFactory, TokenType, EOF, EPSILON};
pub use tree::{NodeRef, ParseTreeArena, ParseTreeNode, RuleContext, RuleContextId};
pub use vocabulary::Vocabulary;
