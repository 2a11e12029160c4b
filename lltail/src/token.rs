//! Tokens and the factory used to synthesize them.
//!
//! Token types are plain `i32` values so that the reserved negative sentinels
//! (`EOF`, `EPSILON`) and the lexer's pseudo types share one number line with
//! the user vocabulary.

use std::fmt;

/// Numeric token type.
pub type TokenType = i32;

/// End-of-input sentinel returned by `la` past the end of a stream.
pub const EOF: TokenType = -1;

/// Marker used in follow-set computation for "rule end reachable".
pub const EPSILON: TokenType = -2;

/// No token type has been assigned yet.
pub const INVALID_TYPE: TokenType = 0;

/// Smallest token type a grammar may assign.
pub const MIN_USER_TOKEN_TYPE: TokenType = 1;

/// Channel the parser reads from.
pub const DEFAULT_CHANNEL: i32 = 0;

/// Conventional channel for whitespace and comments.
pub const HIDDEN_CHANNEL: i32 = 1;

/// A lexed (or synthesized) token.
///
/// `token_index` is `None` for tokens that never existed in the input stream,
/// namely the placeholders conjured during single-token insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub token_type: TokenType,
    pub text: Option<String>,
    pub channel: i32,
    /// Char index of the first character (inclusive), if known.
    pub start: Option<usize>,
    /// Char index of the last character (inclusive), if known.
    pub stop: Option<usize>,
    pub token_index: Option<usize>,
    /// 1-based line.
    pub line: usize,
    /// 0-based column within `line`.
    pub column: usize,
}

impl Token {
    /// Shorthand used by token sources that only know type and text.
    pub fn new(token_type: TokenType, text: impl Into<String>) -> Self {
        Token {
            token_type,
            text: Some(text.into()),
            channel: DEFAULT_CHANNEL,
            start: None,
            stop: None,
            token_index: None,
            line: 1,
            column: 0,
        }
    }

    /// An end-of-input token positioned at `line:column`.
    pub fn eof(line: usize, column: usize) -> Self {
        Token {
            token_type: EOF,
            text: Some("<EOF>".to_string()),
            channel: DEFAULT_CHANNEL,
            start: None,
            stop: None,
            token_index: None,
            line,
            column,
        }
    }

    pub fn with_position(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_channel(mut self, channel: i32) -> Self {
        self.channel = channel;
        self
    }

    pub fn is_eof(&self) -> bool {
        self.token_type == EOF
    }

    /// Whether this token was synthesized by error recovery.
    pub fn is_synthetic(&self) -> bool {
        self.token_index.is_none()
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.token_index.map(|i| i as i64).unwrap_or(-1);
        let text = match &self.text {
            Some(t) => t.replace('\n', "\\n").replace('\r', "\\r").replace('\t', "\\t"),
            None => "<no text>".to_string(),
        };
        write!(
            f,
            "[@{},'{}',<{}>,{}:{}]",
            index, text, self.token_type, self.line, self.column
        )
    }
}

/// Creates tokens for lexers and for error recovery.
pub trait TokenFactory: Send + Sync {
    /// Build a token. `start`/`stop` are char indices; `None` marks a token
    /// with no extent in the input (e.g. a missing-token placeholder).
    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        token_type: TokenType,
        text: Option<String>,
        channel: i32,
        start: Option<usize>,
        stop: Option<usize>,
        line: usize,
        column: usize,
    ) -> Token;
}

/// The stock factory: tokens carry their text eagerly.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonTokenFactory;

impl TokenFactory for CommonTokenFactory {
    fn create(
        &self,
        token_type: TokenType,
        text: Option<String>,
        channel: i32,
        start: Option<usize>,
        stop: Option<usize>,
        line: usize,
        column: usize,
    ) -> Token {
        Token { token_type, text, channel, start, stop, token_index: None, line, column }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_escapes_whitespace() {
        let mut tok = Token::new(5, "a\tb\n").with_position(3, 7);
        tok.token_index = Some(2);
        assert_eq!(tok.to_string(), "[@2,'a\\tb\\n',<5>,3:7]");
    }

    #[test]
    fn test_factory_tokens_are_synthetic() {
        let tok = CommonTokenFactory.create(4, Some("<missing ')'>".into()), 0, None, None, 2, 9);
        assert!(tok.is_synthetic());
        assert_eq!((tok.line, tok.column), (2, 9));
    }
}
