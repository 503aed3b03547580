use compact_str::CompactString;

use crate::error::LexicalError;
use crate::lexer::{Span, Token, TokenKind, TokenValue};

/// Character-recognition policy for the formula language.
///
/// Kept separate from the scanning loop so the classification rules read as
/// one table.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharPolicy;

impl CharPolicy {
    #[must_use]
    pub fn is_digit(self, ch: char) -> bool {
        ch.is_ascii_digit()
    }

    #[must_use]
    pub fn is_identifier_start(self, ch: char) -> bool {
        ch.is_ascii_alphabetic() || ch == '_'
    }

    #[must_use]
    pub fn is_identifier_body(self, ch: char) -> bool {
        ch.is_ascii_alphanumeric() || ch == '_'
    }

    #[must_use]
    pub fn is_operator_start(self, ch: char) -> bool {
        matches!(
            ch,
            '+' | '-' | '*' | '/' | '%' | '^' | '<' | '>' | '=' | '!' | '&' | '|'
        )
    }

    #[must_use]
    pub fn is_delimiter(self, ch: char) -> bool {
        matches!(ch, '(' | ')' | ',')
    }

    /// Opening delimiter of a `{name}` variable reference.
    #[must_use]
    pub fn is_variable_open(self, ch: char) -> bool {
        ch == '{'
    }
}

/// The lexer: source text in, token stream out.
///
/// Skips whitespace, `//` line comments, and `/* */` block comments.
/// Operators are matched greedily: a two-character form is attempted before
/// falling back to one character. The stream always ends with an `Eof`
/// token.
#[derive(Debug, Clone, Default)]
pub struct Lexer {
    policy: CharPolicy,
}

impl Lexer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            policy: CharPolicy,
        }
    }

    /// Tokenize `input` completely.
    ///
    /// # Errors
    ///
    /// Returns the first [`LexicalError`] encountered; the token stream is
    /// all-or-nothing.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexicalError> {
        let mut tokens = Vec::with_capacity(input.len() / 2 + 1);
        let mut cursor = Cursor::new(input);

        loop {
            self.skip_trivia(&mut cursor)?;
            let Some(ch) = cursor.peek() else {
                break;
            };
            let start = cursor.offset;

            let token = if self.policy.is_digit(ch) {
                self.scan_number(&mut cursor)?
            } else if self.policy.is_identifier_start(ch) {
                Self::scan_identifier(&mut cursor, self.policy)
            } else if self.policy.is_variable_open(ch) {
                self.scan_variable(&mut cursor)?
            } else if self.policy.is_operator_start(ch) {
                self.scan_operator(&mut cursor)?
            } else if self.policy.is_delimiter(ch) {
                cursor.bump();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    _ => TokenKind::Comma,
                };
                Token::plain(kind, cursor.slice(start), cursor.span_from(start))
            } else {
                return Err(LexicalError::UnexpectedCharacter {
                    ch,
                    position: start,
                });
            };
            tokens.push(token);
        }

        let end = cursor.offset_u32();
        tokens.push(Token::plain(TokenKind::Eof, "", Span::new(end, end)));
        Ok(tokens)
    }

    /// Skip whitespace and comments; errors on an unterminated block comment.
    fn skip_trivia(&self, cursor: &mut Cursor<'_>) -> Result<(), LexicalError> {
        loop {
            match cursor.peek() {
                Some(ch) if ch.is_whitespace() => {
                    cursor.bump();
                }
                Some('/') if cursor.peek_second() == Some('/') => {
                    while let Some(ch) = cursor.peek() {
                        if ch == '\n' {
                            break;
                        }
                        cursor.bump();
                    }
                }
                Some('/') if cursor.peek_second() == Some('*') => {
                    let start = cursor.offset;
                    cursor.bump();
                    cursor.bump();
                    let mut closed = false;
                    while let Some(ch) = cursor.peek() {
                        if ch == '*' && cursor.peek_second() == Some('/') {
                            cursor.bump();
                            cursor.bump();
                            closed = true;
                            break;
                        }
                        cursor.bump();
                    }
                    if !closed {
                        return Err(LexicalError::UnterminatedComment { position: start });
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_number(&self, cursor: &mut Cursor<'_>) -> Result<Token, LexicalError> {
        let start = cursor.offset;
        while cursor.peek().is_some_and(|c| self.policy.is_digit(c)) {
            cursor.bump();
        }
        if cursor.peek() == Some('.') {
            // A fraction needs at least one digit after the point.
            if cursor.peek_second().is_some_and(|c| self.policy.is_digit(c)) {
                cursor.bump();
                while cursor.peek().is_some_and(|c| self.policy.is_digit(c)) {
                    cursor.bump();
                }
            } else {
                cursor.bump();
                return Err(LexicalError::MalformedNumber {
                    text: cursor.slice(start).to_string(),
                    position: start,
                });
            }
        }
        let text = cursor.slice(start);
        let value = text.parse::<f64>().map_err(|_| LexicalError::MalformedNumber {
            text: text.to_string(),
            position: start,
        })?;
        Ok(Token::new(
            TokenKind::Number,
            text,
            cursor.span_from(start),
            TokenValue::Number(value),
        ))
    }

    fn scan_identifier(cursor: &mut Cursor<'_>, policy: CharPolicy) -> Token {
        let start = cursor.offset;
        while cursor.peek().is_some_and(|c| policy.is_identifier_body(c)) {
            cursor.bump();
        }
        let text = cursor.slice(start);
        let span = cursor.span_from(start);
        match text {
            "true" => Token::new(TokenKind::Boolean, text, span, TokenValue::Boolean(true)),
            "false" => Token::new(TokenKind::Boolean, text, span, TokenValue::Boolean(false)),
            _ => Token::new(
                TokenKind::Identifier,
                text,
                span,
                TokenValue::Name(CompactString::from(text)),
            ),
        }
    }

    fn scan_variable(&self, cursor: &mut Cursor<'_>) -> Result<Token, LexicalError> {
        let start = cursor.offset;
        cursor.bump(); // '{'
        let name_start = cursor.offset;
        loop {
            match cursor.peek() {
                Some('}') => break,
                Some(_) => cursor.bump(),
                None => return Err(LexicalError::UnterminatedVariable { position: start }),
            }
        }
        let name = cursor.slice(name_start).trim();
        if name.is_empty() {
            return Err(LexicalError::EmptyVariableName { position: start });
        }
        let name = CompactString::from(name);
        cursor.bump(); // '}'
        Ok(Token::new(
            TokenKind::Variable,
            cursor.slice(start),
            cursor.span_from(start),
            TokenValue::Name(name),
        ))
    }

    fn scan_operator(&self, cursor: &mut Cursor<'_>) -> Result<Token, LexicalError> {
        let start = cursor.offset;
        let first = cursor.peek().unwrap_or('\0');
        let second = cursor.peek_second();

        // Greedy two-character match first.
        let two = second.and_then(|s| match (first, s) {
            ('<', '=') => Some(TokenKind::LessEq),
            ('>', '=') => Some(TokenKind::GreaterEq),
            ('=', '=') => Some(TokenKind::EqEq),
            ('!', '=') => Some(TokenKind::NotEq),
            ('&', '&') => Some(TokenKind::AndAnd),
            ('|', '|') => Some(TokenKind::OrOr),
            _ => None,
        });
        if let Some(kind) = two {
            cursor.bump();
            cursor.bump();
            return Ok(Token::plain(kind, cursor.slice(start), cursor.span_from(start)));
        }

        let kind = match first {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '!' => TokenKind::Bang,
            // '=', lone '&' and '|' have no one-character form.
            _ => {
                return Err(LexicalError::UnexpectedCharacter {
                    ch: first,
                    position: start,
                })
            }
        };
        cursor.bump();
        Ok(Token::plain(kind, cursor.slice(start), cursor.span_from(start)))
    }
}

/// Byte-offset cursor over the source text.
struct Cursor<'a> {
    input: &'a str,
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, offset: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.offset += ch.len_utf8();
        }
    }

    fn slice(&self, start: usize) -> &'a str {
        &self.input[start..self.offset]
    }

    fn offset_u32(&self) -> u32 {
        u32::try_from(self.offset).unwrap_or(u32::MAX)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(u32::try_from(start).unwrap_or(u32::MAX), self.offset_u32())
    }
}
