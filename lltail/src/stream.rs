//! Input stream boundary: symbol streams consumed by the simulators.
//!
//! The runtime only needs a small surface from its inputs: one-symbol
//! lookahead/lookbehind, consumption, and rewinding for speculative
//! simulation. The two concrete streams here are deliberately minimal: a
//! code-point buffer for lexers and a fully buffered, channel-filtering token
//! stream for parsers.

use crate::token::{Token, TokenType, DEFAULT_CHANNEL, EOF, INVALID_TYPE};

/// A stream of integer symbols (characters or token types).
pub trait IntStream {
    /// Advance by one symbol.
    ///
    /// # Panics
    ///
    /// Panics when the stream is already at end of input; consuming EOF is an
    /// API misuse, not a recognition failure.
    fn consume(&mut self);

    /// Symbol at relative offset `i` (1-based; negative looks back).
    /// Returns `EOF` past the end.
    fn la(&self, i: isize) -> i32;

    /// Pin the buffer for a speculative excursion. Returns a marker for
    /// [`IntStream::release`].
    fn mark(&mut self) -> isize;

    fn release(&mut self, marker: isize);

    /// Index of the current symbol.
    fn index(&self) -> usize;

    /// Rewind (or fast-forward) to `index`.
    fn seek(&mut self, index: usize);

    fn size(&self) -> usize;

    fn source_name(&self) -> &str {
        "<unknown>"
    }
}

/// A character stream read by lexers.
pub trait CharStream: IntStream {
    /// Text of the chars in `[start, stop]` (inclusive).
    fn text(&self, start: usize, stop: usize) -> String;
}

/// A token stream read by parsers.
pub trait TokenStream: IntStream {
    /// Token at relative offset `k` (1-based; negative looks back).
    /// `None` before the start of input.
    fn lt(&self, k: isize) -> Option<&Token>;

    /// Token at absolute index `index`.
    fn get(&self, index: usize) -> Option<&Token>;

    /// Concatenated text of the tokens between `start` and `stop`, inclusive.
    fn text_between(&self, start: &Token, stop: &Token) -> String;
}

/// Producer of tokens, typically a [`crate::Lexer`].
pub trait TokenSource {
    /// Next token; once input is exhausted, returns EOF tokens forever.
    fn next_token(&mut self) -> Token;

    fn source_name(&self) -> &str {
        "<unknown>"
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CodePointCharStream
// ══════════════════════════════════════════════════════════════════════════════

/// In-memory character stream over Unicode scalar values.
#[derive(Debug, Clone)]
pub struct CodePointCharStream {
    data: Vec<char>,
    p: usize,
    name: String,
}

impl CodePointCharStream {
    pub fn new(input: &str) -> Self {
        CodePointCharStream {
            data: input.chars().collect(),
            p: 0,
            name: "<string>".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl IntStream for CodePointCharStream {
    fn consume(&mut self) {
        assert!(self.p < self.data.len(), "cannot consume EOF");
        self.p += 1;
    }

    fn la(&self, i: isize) -> i32 {
        let target = if i > 0 {
            self.p as isize + i - 1
        } else if i < 0 {
            self.p as isize + i
        } else {
            return INVALID_TYPE;
        };
        if target < 0 {
            return INVALID_TYPE;
        }
        match self.data.get(target as usize) {
            Some(&c) => c as i32,
            None => EOF,
        }
    }

    fn mark(&mut self) -> isize {
        -1
    }

    fn release(&mut self, _marker: isize) {}

    fn index(&self) -> usize {
        self.p
    }

    fn seek(&mut self, index: usize) {
        self.p = index.min(self.data.len());
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

impl CharStream for CodePointCharStream {
    fn text(&self, start: usize, stop: usize) -> String {
        if start >= self.data.len() || stop < start {
            return String::new();
        }
        let stop = stop.min(self.data.len() - 1);
        self.data[start..=stop].iter().collect()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CommonTokenStream
// ══════════════════════════════════════════════════════════════════════════════

/// Fully buffered token stream that only exposes tokens on one channel.
///
/// Off-channel tokens stay in the buffer (they keep their indices and appear
/// in `text_between`) but `la`/`lt`/`consume` step over them.
#[derive(Debug, Clone)]
pub struct CommonTokenStream {
    tokens: Vec<Token>,
    p: usize,
    channel: i32,
    name: String,
}

impl CommonTokenStream {
    /// Drain `source` until EOF.
    pub fn new(source: &mut dyn TokenSource) -> Self {
        let name = source.source_name().to_string();
        let mut tokens = Vec::new();
        loop {
            let tok = source.next_token();
            let done = tok.token_type == EOF;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Self::from_buffer(tokens, name)
    }

    /// Wrap an existing token list, appending EOF if it is missing.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self::from_buffer(tokens, "<tokens>".to_string())
    }

    fn from_buffer(mut tokens: Vec<Token>, name: String) -> Self {
        if tokens.last().map(|t| t.token_type != EOF).unwrap_or(true) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column + t.text().chars().count()))
                .unwrap_or((1, 0));
            tokens.push(Token::eof(line, column));
        }
        for (i, tok) in tokens.iter_mut().enumerate() {
            tok.token_index = Some(i);
        }
        let mut stream = CommonTokenStream { tokens, p: 0, channel: DEFAULT_CHANNEL, name };
        stream.p = stream.next_on_channel(0);
        stream
    }

    /// Every buffered token, including off-channel ones.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    fn next_on_channel(&self, mut i: usize) -> usize {
        let last = self.tokens.len() - 1;
        while i < last && self.tokens[i].channel != self.channel {
            i += 1;
        }
        i.min(last)
    }

    fn previous_on_channel(&self, i: usize) -> Option<usize> {
        let mut i = i as isize;
        while i >= 0 {
            let tok = &self.tokens[i as usize];
            if tok.channel == self.channel || tok.token_type == EOF {
                return Some(i as usize);
            }
            i -= 1;
        }
        None
    }

    fn lt_index(&self, k: isize) -> Option<usize> {
        if k == 0 {
            return None;
        }
        if k < 0 {
            let mut i = self.p;
            let mut n = 0;
            while n < -k {
                if i == 0 {
                    return None;
                }
                i = self.previous_on_channel(i - 1)?;
                n += 1;
            }
            return Some(i);
        }
        let mut i = self.p;
        let mut n = 1;
        while n < k {
            i = self.next_on_channel(i + 1);
            n += 1;
        }
        Some(i)
    }
}

impl IntStream for CommonTokenStream {
    fn consume(&mut self) {
        assert!(self.tokens[self.p].token_type != EOF, "cannot consume EOF");
        self.p = self.next_on_channel(self.p + 1);
    }

    fn la(&self, i: isize) -> i32 {
        self.lt(i).map(|t| t.token_type).unwrap_or(INVALID_TYPE)
    }

    fn mark(&mut self) -> isize {
        0
    }

    fn release(&mut self, _marker: isize) {}

    fn index(&self) -> usize {
        self.p
    }

    fn seek(&mut self, index: usize) {
        self.p = self.next_on_channel(index);
    }

    fn size(&self) -> usize {
        self.tokens.len()
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

impl TokenStream for CommonTokenStream {
    fn lt(&self, k: isize) -> Option<&Token> {
        self.lt_index(k).map(|i| &self.tokens[i])
    }

    fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    fn text_between(&self, start: &Token, stop: &Token) -> String {
        let (Some(a), Some(b)) = (start.token_index, stop.token_index) else {
            return String::new();
        };
        let mut text = String::new();
        for tok in self.tokens.iter().take(b + 1).skip(a) {
            if tok.token_type == EOF {
                break;
            }
            text.push_str(tok.text());
        }
        text
    }
}

/// A token source replaying a fixed list; handy for driving a parser from
/// pre-lexed input.
#[derive(Debug, Clone)]
pub struct ListTokenSource {
    tokens: std::vec::IntoIter<Token>,
    eof: Token,
}

impl ListTokenSource {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = tokens
            .last()
            .map(|t| Token::eof(t.line, t.column + t.text().chars().count()))
            .unwrap_or_else(|| Token::eof(1, 0));
        ListTokenSource { tokens: tokens.into_iter(), eof }
    }
}

impl TokenSource for ListTokenSource {
    fn next_token(&mut self) -> Token {
        self.tokens.next().unwrap_or_else(|| self.eof.clone())
    }
}

/// Token type at `lt(1)`, or `EOF` if the stream is exhausted.
pub(crate) fn current_type(stream: &dyn TokenStream) -> TokenType {
    stream.lt(1).map(|t| t.token_type).unwrap_or(EOF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::HIDDEN_CHANNEL;

    #[test]
    fn test_char_stream_lookahead() {
        let mut input = CodePointCharStream::new("ab");
        assert_eq!(input.la(1), 'a' as i32);
        assert_eq!(input.la(2), 'b' as i32);
        assert_eq!(input.la(3), EOF);
        input.consume();
        assert_eq!(input.la(-1), 'a' as i32);
        assert_eq!(input.text(0, 1), "ab");
    }

    #[test]
    #[should_panic(expected = "cannot consume EOF")]
    fn test_char_stream_consume_past_end_panics() {
        let mut input = CodePointCharStream::new("");
        input.consume();
    }

    #[test]
    fn test_token_stream_skips_hidden_channel() {
        let tokens = vec![
            Token::new(3, "x"),
            Token::new(9, " ").with_channel(HIDDEN_CHANNEL),
            Token::new(4, "="),
        ];
        let mut stream = CommonTokenStream::from_tokens(tokens);
        assert_eq!(stream.la(1), 3);
        assert_eq!(stream.la(2), 4);
        assert_eq!(stream.la(3), EOF);
        stream.consume();
        assert_eq!(stream.index(), 2);
        assert_eq!(stream.la(-1), 3);
        let start = stream.get(0).cloned().expect("first token");
        let stop = stream.get(2).cloned().expect("third token");
        assert_eq!(stream.text_between(&start, &stop), "x =");
    }

    #[test]
    fn test_token_stream_appends_eof() {
        let stream = CommonTokenStream::from_tokens(vec![Token::new(3, "abc").with_position(2, 4)]);
        let eof = stream.get(1).expect("eof token");
        assert_eq!(eof.token_type, EOF);
        assert_eq!((eof.line, eof.column), (2, 7));
        assert_eq!(eof.token_index, Some(1));
    }

    #[test]
    fn test_list_token_source_repeats_eof() {
        let mut source = ListTokenSource::new(vec![Token::new(5, "a")]);
        assert_eq!(source.next_token().token_type, 5);
        assert_eq!(source.next_token().token_type, EOF);
        assert_eq!(source.next_token().token_type, EOF);
    }
}
