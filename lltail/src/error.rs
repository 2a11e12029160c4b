//! Failure types.
//!
//! Recognition failures are ordinary, recoverable outcomes routed through an
//! [`crate::ErrorStrategy`]. The remaining types cover the non-recoverable
//! cases: structural misuse of a DFA, a parse abandoned by a bail-out
//! strategy, and bad runtime options.

use std::fmt;

use crate::atn::StateId;
use crate::interval_set::IntervalSet;
use crate::token::Token;

// ══════════════════════════════════════════════════════════════════════════════
// RecognitionError
// ══════════════════════════════════════════════════════════════════════════════

/// A recognition failure raised by a parser decision or match.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// No alternative survived lookahead at a decision.
    NoViableAlt {
        /// First token of the lookahead examined by prediction.
        start_token: Token,
        /// Token at which the last alternative died.
        offending_token: Token,
        state: StateId,
    },

    /// The current token is not in the expected set and inline recovery
    /// failed.
    InputMismatch {
        offending_token: Token,
        state: StateId,
        expected: IntervalSet,
    },

    /// A semantic predicate guarding the current path evaluated false.
    FailedPredicate {
        offending_token: Token,
        state: StateId,
        rule_index: usize,
        predicate_index: usize,
        message: String,
    },
}

impl RecognitionError {
    pub fn offending_token(&self) -> &Token {
        match self {
            RecognitionError::NoViableAlt { offending_token, .. }
            | RecognitionError::InputMismatch { offending_token, .. }
            | RecognitionError::FailedPredicate { offending_token, .. } => offending_token,
        }
    }

    /// ATN state the recognizer was in when the failure was raised.
    pub fn offending_state(&self) -> StateId {
        match self {
            RecognitionError::NoViableAlt { state, .. }
            | RecognitionError::InputMismatch { state, .. }
            | RecognitionError::FailedPredicate { state, .. } => *state,
        }
    }

    /// Tokens that would have been accepted, when known.
    pub fn expected_tokens(&self) -> Option<&IntervalSet> {
        match self {
            RecognitionError::InputMismatch { expected, .. } => Some(expected),
            _ => None,
        }
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionError::NoViableAlt { offending_token, .. } => {
                write!(f, "no viable alternative at {}", offending_token)
            },
            RecognitionError::InputMismatch { offending_token, expected, .. } => {
                write!(f, "mismatched input {} expecting {}", offending_token, expected)
            },
            RecognitionError::FailedPredicate { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RecognitionError {}

// ══════════════════════════════════════════════════════════════════════════════
// Non-recoverable outcomes
// ══════════════════════════════════════════════════════════════════════════════

/// The lexer found no rule matching the input at `start_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerNoViableAlt {
    pub start_index: usize,
    /// Input text examined before the simulation died.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for LexerNoViableAlt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token recognition error at: '{}'", escape_ws(&self.text))
    }
}

impl std::error::Error for LexerNoViableAlt {}

/// Structural misuse of a DFA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DfaError {
    /// Precedence start states requested from a DFA whose decision is not a
    /// precedence decision.
    NotPrecedenceDfa { decision: usize },
}

impl fmt::Display for DfaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfaError::NotPrecedenceDfa { decision } => write!(
                f,
                "decision {} is not a precedence DFA; only precedence DFAs carry precedence start states",
                decision
            ),
        }
    }
}

impl std::error::Error for DfaError {}

/// A parse abandoned on its first syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseCancelled {
    pub cause: RecognitionError,
}

impl fmt::Display for ParseCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse cancelled: {}", self.cause)
    }
}

impl std::error::Error for ParseCancelled {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// What escapes a rule function.
///
/// `Recognition` is caught at the rule boundary and handed to the error
/// strategy; `Cancelled` unwinds the whole parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Recognition(RecognitionError),
    Cancelled(ParseCancelled),
}

impl From<RecognitionError> for ParseError {
    fn from(e: RecognitionError) -> Self {
        ParseError::Recognition(e)
    }
}

impl From<ParseCancelled> for ParseError {
    fn from(e: ParseCancelled) -> Self {
        ParseError::Cancelled(e)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Recognition(e) => write!(f, "{}", e),
            ParseError::Cancelled(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ParseError {}

/// Failure loading or saving [`crate::RuntimeOptions`].
#[derive(Debug)]
pub enum OptionsError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsError::Io(e) => write!(f, "failed to access runtime options: {}", e),
            OptionsError::Json(e) => write!(f, "invalid runtime options: {}", e),
        }
    }
}

impl std::error::Error for OptionsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OptionsError::Io(e) => Some(e),
            OptionsError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for OptionsError {
    fn from(e: std::io::Error) -> Self {
        OptionsError::Io(e)
    }
}

impl From<serde_json::Error> for OptionsError {
    fn from(e: serde_json::Error) -> Self {
        OptionsError::Json(e)
    }
}

/// Escape newline, carriage return and tab so a diagnostic stays on one line.
pub(crate) fn escape_ws(s: &str) -> String {
    s.replace('\n', "\\n").replace('\r', "\\r").replace('\t', "\\t")
}
