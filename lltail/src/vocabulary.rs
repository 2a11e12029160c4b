//! Token vocabulary: mapping between token types and their printable names.
//!
//! A grammar assigns each token type an optional *literal* name (`'('`,
//! `'while'`) and an optional *symbolic* name (`LPAREN`, `ID`). Error messages
//! prefer the literal form and fall back to the symbolic one, then to the
//! raw number.

use std::collections::BTreeMap;

use crate::token::{TokenType, EOF};

/// Bidirectional mapping between token types and their names.
///
/// Index `t` of each name table describes token type `t`; index 0 is the
/// invalid type and is normally `None`.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    literal_names: Vec<Option<String>>,
    symbolic_names: Vec<Option<String>>,
    display_names: Vec<Option<String>>,
    /// Symbolic or literal name → token type.
    name_to_type: BTreeMap<String, TokenType>,
}

impl Vocabulary {
    pub fn new(literal_names: Vec<Option<String>>, symbolic_names: Vec<Option<String>>) -> Self {
        let mut name_to_type = BTreeMap::new();
        for (i, name) in literal_names.iter().enumerate() {
            if let Some(name) = name {
                name_to_type.insert(name.clone(), i as TokenType);
            }
        }
        for (i, name) in symbolic_names.iter().enumerate() {
            if let Some(name) = name {
                name_to_type.entry(name.clone()).or_insert(i as TokenType);
            }
        }
        Vocabulary {
            literal_names,
            symbolic_names,
            display_names: Vec::new(),
            name_to_type,
        }
    }

    /// Build a vocabulary from `(literal, symbolic)` pairs for types `1..`.
    ///
    /// ```
    /// use lltail::Vocabulary;
    /// let vocab = Vocabulary::from_pairs(&[(Some("'('"), Some("LPAREN")), (None, Some("ID"))]);
    /// assert_eq!(vocab.display_name(1), "'('");
    /// assert_eq!(vocab.display_name(2), "ID");
    /// ```
    pub fn from_pairs(pairs: &[(Option<&str>, Option<&str>)]) -> Self {
        let mut literal = vec![None];
        let mut symbolic = vec![None];
        for (lit, sym) in pairs {
            literal.push(lit.map(str::to_string));
            symbolic.push(sym.map(str::to_string));
        }
        Vocabulary::new(literal, symbolic)
    }

    /// Override the display name of individual token types.
    pub fn with_display_names(mut self, display_names: Vec<Option<String>>) -> Self {
        self.display_names = display_names;
        self
    }

    /// Largest token type described by this vocabulary.
    pub fn max_token_type(&self) -> TokenType {
        self.literal_names.len().max(self.symbolic_names.len()) as TokenType - 1
    }

    pub fn literal_name(&self, token_type: TokenType) -> Option<&str> {
        lookup(&self.literal_names, token_type)
    }

    pub fn symbolic_name(&self, token_type: TokenType) -> Option<&str> {
        if token_type == EOF {
            return Some("EOF");
        }
        lookup(&self.symbolic_names, token_type)
    }

    /// Name used in diagnostics.
    pub fn display_name(&self, token_type: TokenType) -> String {
        if let Some(name) = lookup(&self.display_names, token_type) {
            return name.to_string();
        }
        if let Some(name) = self.literal_name(token_type) {
            return name.to_string();
        }
        if let Some(name) = self.symbolic_name(token_type) {
            return name.to_string();
        }
        token_type.to_string()
    }

    /// Look up a token type by symbolic or literal name.
    pub fn token_type(&self, name: &str) -> Option<TokenType> {
        self.name_to_type.get(name).copied()
    }
}

fn lookup(names: &[Option<String>], token_type: TokenType) -> Option<&str> {
    if token_type < 0 {
        return None;
    }
    names.get(token_type as usize).and_then(|n| n.as_deref())
}
