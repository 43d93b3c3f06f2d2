//! Token constants and the token record produced by the lexer

use std::fmt;

/// Placeholder type for "no token type assigned yet"
pub const INVALID_TYPE: i32 = 0;

/// Marks the empty path in follow-set computations
pub const EPSILON: i32 = -2;

/// Smallest token type a grammar may define
pub const MIN_USER_TOKEN_TYPE: i32 = 1;

/// End of input
pub const EOF: i32 = -1;

/// Channel for ordinary tokens
pub const DEFAULT_CHANNEL: i32 = 0;

/// Channel conventionally used for whitespace and comments
pub const HIDDEN_CHANNEL: i32 = 1;

/// Alternative number meaning "none"
pub const INVALID_ALT_NUMBER: u32 = 0;

/// A token emitted by the lexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token type (`EOF` for the end marker)
    pub token_type: i32,
    /// Channel the token is routed to
    pub channel: i32,
    /// First code point index
    pub start: usize,
    /// Last code point index (inclusive); `start - 1` for empty tokens
    pub stop: isize,
    /// Line of the first character (1-based)
    pub line: u32,
    /// Column of the first character (0-based)
    pub column: u32,
    /// Matched text or the text override
    pub text: String,
    /// Position in the token stream, set by the lexer
    pub token_index: usize,
}

impl Token {
    /// Whether this is the end-of-input token
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.token_type == EOF
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = if self.is_eof() {
            "<EOF>".to_string()
        } else {
            self.text
                .replace('\n', "\\n")
                .replace('\r', "\\r")
                .replace('\t', "\\t")
        };
        let channel = if self.channel > 0 {
            format!(",channel={}", self.channel)
        } else {
            String::new()
        };
        write!(
            f,
            "[@{},{}:{}='{}',<{}>{},{}:{}]",
            self.token_index,
            self.start,
            self.stop,
            text,
            self.token_type,
            channel,
            self.line,
            self.column
        )
    }
}

/// Literal and symbolic names of a grammar's token types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    literal_names: Vec<Option<String>>,
    symbolic_names: Vec<Option<String>>,
}

impl Vocabulary {
    /// Create a vocabulary from names indexed by token type
    pub fn new(literal_names: Vec<Option<String>>, symbolic_names: Vec<Option<String>>) -> Self {
        Self {
            literal_names,
            symbolic_names,
        }
    }

    /// Literal name such as `'+'`
    pub fn literal_name(&self, token_type: i32) -> Option<&str> {
        usize::try_from(token_type)
            .ok()
            .and_then(|i| self.literal_names.get(i))
            .and_then(|n| n.as_deref())
    }

    /// Symbolic name such as `PLUS`
    pub fn symbolic_name(&self, token_type: i32) -> Option<&str> {
        if token_type == EOF {
            return Some("EOF");
        }
        usize::try_from(token_type)
            .ok()
            .and_then(|i| self.symbolic_names.get(i))
            .and_then(|n| n.as_deref())
    }

    /// Best name for display: literal, then symbolic, then the number
    pub fn display_name(&self, token_type: i32) -> String {
        self.literal_name(token_type)
            .or_else(|| self.symbolic_name(token_type))
            .map(str::to_string)
            .unwrap_or_else(|| token_type.to_string())
    }
}
