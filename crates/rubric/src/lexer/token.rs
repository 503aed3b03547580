use compact_str::CompactString;

/// A half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A span covering `len` bytes starting at `start`.
    #[must_use]
    pub const fn at(start: u32, len: u32) -> Self {
        Self::new(start, start + len)
    }

    #[must_use]
    pub const fn len(self) -> u32 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// The fixed terminal alphabet of the formula language.
///
/// The lexer defines this alphabet; grammars reference it and the parsing
/// table is laid out densely over it, so the discriminants double as column
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TokenKind {
    Number,
    Boolean,
    Identifier,
    /// A `{name}` variable reference.
    Variable,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    Comma,
    /// End of input, always the last token of a stream.
    Eof,
}

impl TokenKind {
    /// Number of terminals; the width of an action-table row.
    pub const COUNT: usize = 23;

    /// All terminals in discriminant order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Number,
        Self::Boolean,
        Self::Identifier,
        Self::Variable,
        Self::Plus,
        Self::Minus,
        Self::Star,
        Self::Slash,
        Self::Percent,
        Self::Caret,
        Self::Less,
        Self::LessEq,
        Self::Greater,
        Self::GreaterEq,
        Self::EqEq,
        Self::NotEq,
        Self::AndAnd,
        Self::OrOr,
        Self::Bang,
        Self::LParen,
        Self::RParen,
        Self::Comma,
        Self::Eof,
    ];

    /// Column index into a dense action-table row.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name for diagnostics.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Identifier => "identifier",
            Self::Variable => "variable",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Percent => "'%'",
            Self::Caret => "'^'",
            Self::Less => "'<'",
            Self::LessEq => "'<='",
            Self::Greater => "'>'",
            Self::GreaterEq => "'>='",
            Self::EqEq => "'=='",
            Self::NotEq => "'!='",
            Self::AndAnd => "'&&'",
            Self::OrOr => "'||'",
            Self::Bang => "'!'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Comma => "','",
            Self::Eof => "end of input",
        }
    }

    /// Whether tokens of this kind can begin an operand.
    #[must_use]
    pub const fn starts_operand(self) -> bool {
        matches!(
            self,
            Self::Number
                | Self::Boolean
                | Self::Identifier
                | Self::Variable
                | Self::LParen
                | Self::Minus
                | Self::Bang
        )
    }
}

/// The parsed value of a token, if it carries one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TokenValue {
    /// No value (operators, delimiters, end of input).
    #[default]
    None,
    /// Parsed numeric literal.
    Number(f64),
    /// Parsed boolean literal.
    Boolean(bool),
    /// Identifier text, or the inner name of a `{name}` variable.
    Name(CompactString),
}

/// A token produced by the lexer: kind, source text, position, and the
/// parsed value when one applies. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The source text this token covers, braces included for variables.
    pub text: CompactString,
    pub span: Span,
    pub value: TokenValue,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<CompactString>, span: Span, value: TokenValue) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            value,
        }
    }

    /// A token with no parsed value.
    #[must_use]
    pub fn plain(kind: TokenKind, text: impl Into<CompactString>, span: Span) -> Self {
        Self::new(kind, text, span, TokenValue::None)
    }

    /// The numeric value of a `Number` token.
    #[must_use]
    pub const fn number(&self) -> Option<f64> {
        match self.value {
            TokenValue::Number(v) => Some(v),
            _ => None,
        }
    }

    /// The boolean value of a `Boolean` token.
    #[must_use]
    pub const fn boolean(&self) -> Option<bool> {
        match self.value {
            TokenValue::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// Identifier or variable name, without braces.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == TokenKind::Eof {
            f.write_str("end of input")
        } else {
            write!(f, "'{}'", self.text)
        }
    }
}
