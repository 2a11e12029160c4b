//! Error listeners: where syntax errors and prediction diagnostics go.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::RecognitionError;
use crate::token::Token;

/// A prediction event that is not an error but may interest grammar authors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionDiagnostic {
    /// Full-context prediction found input matched by several alternatives.
    Ambiguity {
        decision: usize,
        start_index: usize,
        stop_index: usize,
        /// Whether the ambiguity was proven exactly rather than assumed.
        exact: bool,
        alts: Vec<usize>,
    },
    /// SLL prediction hit a conflict and is retrying with full context.
    AttemptingFullContext {
        decision: usize,
        start_index: usize,
        stop_index: usize,
        conflicting_alts: Vec<usize>,
    },
    /// Full-context prediction resolved a conflict that SLL could not.
    ContextSensitivity {
        decision: usize,
        start_index: usize,
        stop_index: usize,
        prediction: usize,
    },
}

/// Receives syntax errors, once per non-suppressed error.
pub trait ErrorListener: Send + Sync {
    /// `offending` is `None` when the error has no token (e.g. lexer errors).
    #[allow(clippy::too_many_arguments)]
    fn syntax_error(
        &self,
        recognizer: &str,
        offending: Option<&Token>,
        line: usize,
        column: usize,
        message: &str,
        error: Option<&RecognitionError>,
    );

    fn report_diagnostic(&self, _recognizer: &str, _diagnostic: &PredictionDiagnostic) {}
}

/// Default listener: one `warn!` event per syntax error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorListener;

impl ErrorListener for TracingErrorListener {
    fn syntax_error(
        &self,
        recognizer: &str,
        offending: Option<&Token>,
        line: usize,
        column: usize,
        message: &str,
        _error: Option<&RecognitionError>,
    ) {
        let offending = offending.map(|t| t.to_string()).unwrap_or_default();
        warn!(recognizer, line, column, %offending, "line {}:{} {}", line, column, message);
    }

    fn report_diagnostic(&self, recognizer: &str, diagnostic: &PredictionDiagnostic) {
        debug!(recognizer, ?diagnostic, "prediction diagnostic");
    }
}

/// One recorded syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub offending: Option<Token>,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub error: Option<RecognitionError>,
}

/// Listener that records everything it hears. Clones share storage, so keep
/// one clone and hand another to the recognizer.
#[derive(Debug, Clone, Default)]
pub struct CollectingErrorListener {
    errors: Arc<Mutex<Vec<SyntaxError>>>,
    diagnostics: Arc<Mutex<Vec<PredictionDiagnostic>>>,
}

impl CollectingErrorListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<SyntaxError> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors().into_iter().map(|e| e.message).collect()
    }

    pub fn diagnostics(&self) -> Vec<PredictionDiagnostic> {
        self.diagnostics.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl ErrorListener for CollectingErrorListener {
    fn syntax_error(
        &self,
        _recognizer: &str,
        offending: Option<&Token>,
        line: usize,
        column: usize,
        message: &str,
        error: Option<&RecognitionError>,
    ) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(SyntaxError {
                offending: offending.cloned(),
                line,
                column,
                message: message.to_string(),
                error: error.cloned(),
            });
        }
    }

    fn report_diagnostic(&self, _recognizer: &str, diagnostic: &PredictionDiagnostic) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_clones_share_storage() {
        let collector = CollectingErrorListener::new();
        let handle: Arc<dyn ErrorListener> = Arc::new(collector.clone());
        handle.syntax_error("P", None, 2, 4, "boom", None);
        assert_eq!(collector.messages(), vec!["boom".to_string()]);
        assert_eq!(collector.errors()[0].line, 2);
    }

    #[test]
    fn test_tracing_listener_does_not_panic() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        TracingErrorListener.syntax_error("P", Some(&Token::new(3, "x")), 1, 0, "oops", None);
    }
}
