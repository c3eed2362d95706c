//! Lexer (tokenizer) for C source code
//!
//! Converts raw source text into a flat [`Token`] stream. Every token keeps
//! the byte span it was cut from, so any contiguous run of original tokens
//! can be turned back into the exact source text it came from (see
//! [`reconstruct`]). Preprocessor lines survive as single
//! [`TokenKind::Preproc`] tokens; the macro pass decides what to do with them.

use super::ast::{SourceLocation, Span};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Coarse token classes. Keywords are plain identifiers: the grammars match
/// them by text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Char,
    Punct,
    Preproc,
}

/// A lexed token.
///
/// Tokens produced by a rewrite are `synthetic`: their `span` is the span of
/// the construct they replaced and their location borrows the nearest
/// original line, so diagnostics still point into the user's file.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Rc<str>,
    pub location: SourceLocation,
    pub span: Span,
    pub synthetic: bool,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        text: impl Into<Rc<str>>,
        location: SourceLocation,
        span: Span,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            location,
            span,
            synthetic: false,
        }
    }

    /// Copy of `self` re-homed at `location`/`span` and marked synthetic
    pub fn synthesized(&self, location: SourceLocation, span: Span) -> Self {
        Self {
            kind: self.kind,
            text: self.text.clone(),
            location,
            span,
            synthetic: true,
        }
    }

    pub fn is(&self, text: &str) -> bool {
        &*self.text == text
    }

    pub fn line(&self) -> usize {
        self.location.line
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Lexer error type
#[derive(Debug, Clone, Error)]
#[error("Lexer error at {location}: {message}")]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl LexError {
    pub fn location(&self) -> SourceLocation {
        self.location
    }
}

/// Punctuators, longest first so that maximal munch falls out of a linear scan
const PUNCTUATORS: &[&str] = &[
    "...", "<<=", ">>=", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=",
    "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "##", "+",
    "-", "*", "/", "%", "<", ">", "=", "!", "&", "|", "^", "~", "?", ":", ";",
    ",", ".", "(", ")", "{", "}", "[", "]", "#",
];

/// Tokenize `source` completely
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

/// Join token texts with single spaces
pub fn join_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&token.text);
    }
    out
}

/// Recover the source text for `tokens`.
///
/// A run of original tokens maps back to the byte-exact slice of `source`
/// between its first and last token, comments and whitespace included. Runs
/// containing synthetic tokens have no such slice and fall back to
/// [`join_text`].
pub fn reconstruct(tokens: &[Token], source: &str) -> String {
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return String::new();
    };
    let original = tokens.iter().all(|t| !t.synthetic)
        && tokens.windows(2).all(|w| w[0].span.end <= w[1].span.start)
        && last.span.end <= source.len();
    if original {
        if let Some(slice) = source.get(first.span.start..last.span.end) {
            return slice.to_string();
        }
    }
    join_text(tokens)
}

/// Decode the escape sequences of a string or character literal body
pub fn unescape(body: &str) -> String {
    let mut out = String::new();
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('x') => {
                let mut value = 0u32;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(16)) {
                    value = value.wrapping_mul(16).wrapping_add(d);
                    chars.next();
                }
                out.push(char::from_u32(value & 0xff).unwrap_or('\0'));
            }
            Some(d @ '0'..='7') => {
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(next) => {
                            value = value * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value & 0xff).unwrap_or('\0'));
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Integer value of a numeric literal, `None` for floating-point literals
pub fn parse_integer(text: &str) -> Option<i64> {
    let lower = text.to_ascii_lowercase();
    let digits = lower.trim_end_matches(['u', 'l']);
    let (body, radix) = if let Some(hex) = digits.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        (bin, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };
    u64::from_str_radix(body, radix).ok().map(|v| v as i64)
}

/// Lexer for C source code
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    offset: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
}

impl Lexer {
    /// Create a new lexer for the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            offset: 0,
            line: 1,
            column: 1,
            at_line_start: true,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                break;
            }

            let token = if self.peek() == Some('#') && self.at_line_start {
                self.preprocessor_directive()
            } else {
                self.next_token()?
            };
            self.at_line_start = false;
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get next token
    fn next_token(&mut self) -> Result<Token, LexError> {
        let loc = self.current_location();
        let start = (self.position, self.offset);
        let ch = self.peek().ok_or_else(|| LexError {
            message: "Unexpected end of file".to_string(),
            location: loc,
        })?;

        let kind = match ch {
            '"' => {
                self.quoted('"', "string")?;
                TokenKind::Str
            }
            '\'' => {
                self.quoted('\'', "character")?;
                TokenKind::Char
            }
            '0'..='9' => {
                self.number();
                TokenKind::Number
            }
            '.' if self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.number();
                TokenKind::Number
            }
            'a'..='z' | 'A'..='Z' | '_' | '$' => {
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                {
                    self.advance();
                }
                TokenKind::Ident
            }
            _ => {
                let punct = PUNCTUATORS
                    .iter()
                    .find(|p| self.lookahead_is(p))
                    .ok_or_else(|| LexError {
                        message: format!("Unexpected character: '{}'", ch),
                        location: loc,
                    })?;
                for _ in 0..punct.chars().count() {
                    self.advance();
                }
                TokenKind::Punct
            }
        };

        Ok(self.token_from(kind, start, loc))
    }

    /// Quoted literal; escapes are kept verbatim in the token text
    fn quoted(&mut self, quote: char, what: &str) -> Result<(), LexError> {
        let loc = self.current_location();
        self.advance();
        while let Some(ch) = self.peek() {
            match ch {
                '\\' => {
                    self.advance();
                    self.advance();
                }
                '\n' => break,
                c if c == quote => {
                    self.advance();
                    return Ok(());
                }
                _ => {
                    self.advance();
                }
            }
        }
        Err(LexError {
            message: format!("Unterminated {} literal", what),
            location: loc,
        })
    }

    /// Numeric literal of any base, with suffixes and exponents
    fn number(&mut self) {
        let start = self.position;
        let hex = self.lookahead_is("0x") || self.lookahead_is("0X");
        while let Some(ch) = self.peek() {
            let prev = self.input[self.position.max(1) - 1];
            let signed_exponent = self.position > start
                && (ch == '+' || ch == '-')
                && (matches!(prev, 'p' | 'P') || (!hex && matches!(prev, 'e' | 'E')));
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || signed_exponent {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// A whole `#...` line, backslash continuations included
    fn preprocessor_directive(&mut self) -> Token {
        let loc = self.current_location();
        let start = (self.position, self.offset);
        while let Some(ch) = self.peek() {
            if ch == '\\' && self.peek_ahead(1) == Some('\n') {
                self.advance();
                self.advance();
                continue;
            }
            if ch == '\\'
                && self.peek_ahead(1) == Some('\r')
                && self.peek_ahead(2) == Some('\n')
            {
                self.advance();
                self.advance();
                self.advance();
                continue;
            }
            if ch == '\n' {
                break;
            }
            self.advance();
        }
        let mut token = self.token_from(TokenKind::Preproc, start, loc);
        let trimmed = token.text.trim_end().to_string();
        token.text = trimmed.into();
        token
    }

    fn token_from(&self, kind: TokenKind, start: (usize, usize), loc: SourceLocation) -> Token {
        let text: String = self.input[start.0..self.position].iter().collect();
        Token::new(kind, text, loc, Span::new(start.1, self.offset))
    }

    /// Skip whitespace and comments
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some('\n') => {
                    self.advance();
                    self.at_line_start = true;
                }
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('\\') if self.peek_ahead(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('/') => {
                    if self.peek_ahead(1) == Some('/') {
                        self.skip_line_comment();
                    } else if self.peek_ahead(1) == Some('*') {
                        self.skip_block_comment()?;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Skip single-line comment (// ...)
    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Skip multi-line comment (/* ... */)
    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start_loc = self.current_location();
        self.advance(); // skip '/'
        self.advance(); // skip '*'

        while !self.is_at_end() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(LexError {
            message: "Unterminated block comment".to_string(),
            location: start_loc,
        })
    }

    fn lookahead_is(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    /// Peek at current character without consuming
    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    /// Peek ahead n characters
    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    /// Advance to next character
    fn advance(&mut self) -> Option<char> {
        let ch = *self.input.get(self.position)?;
        self.position += 1;
        self.offset += ch.len_utf8();

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    /// Check if at end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get current source location
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| &*t.text).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = tokenize("int main() { return 0; }").unwrap();

        assert_eq!(
            texts(&tokens),
            ["int", "main", "(", ")", "{", "return", "0", ";", "}"]
        );
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[2].kind, TokenKind::Punct);
        assert_eq!(tokens[6].kind, TokenKind::Number);
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("++ -- += -= == != && || -> <<= ...").unwrap();

        assert_eq!(
            texts(&tokens),
            ["++", "--", "+=", "-=", "==", "!=", "&&", "||", "->", "<<=", "..."]
        );
    }

    #[test]
    fn test_comments() {
        let tokens =
            tokenize("int x; // comment\nint y; /* block\ncomment */ int z;")
                .unwrap();

        assert_eq!(
            texts(&tokens),
            ["int", "x", ";", "int", "y", ";", "int", "z", ";"]
        );
        assert_eq!(tokens[3].location.line, 2);
        assert_eq!(tokens[6].location.line, 3);
    }

    #[test]
    fn test_string_and_char_literals() {
        let tokens = tokenize(r#"s = "hello\n\"world\""; c = '\'';"#).unwrap();

        assert_eq!(tokens[2].kind, TokenKind::Str);
        assert_eq!(&*tokens[2].text, r#""hello\n\"world\"""#);
        assert_eq!(tokens[6].kind, TokenKind::Char);
        assert_eq!(unescape(r"a\x41\101\n"), "aAA\n");
    }

    #[test]
    fn test_preprocessor_lines() {
        let tokens =
            tokenize("#define MAX(a, b) \\\n  ((a) > (b) ? (a) : (b))\nint x;")
                .unwrap();

        assert_eq!(tokens[0].kind, TokenKind::Preproc);
        assert!(tokens[0].text.ends_with("(b))"));
        assert_eq!(texts(&tokens[1..]), ["int", "x", ";"]);
        assert_eq!(tokens[1].location.line, 3);
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("0x1fUL 017 42u 1.5e-3 .5").unwrap();

        assert_eq!(texts(&tokens), ["0x1fUL", "017", "42u", "1.5e-3", ".5"]);
        assert_eq!(parse_integer("0x1fUL"), Some(31));
        assert_eq!(parse_integer("017"), Some(15));
        assert_eq!(parse_integer("42u"), Some(42));
        assert_eq!(parse_integer("1.5e-3"), None);
    }

    #[test]
    fn test_unknown_character_is_an_error() {
        let err = tokenize("int x = 1 @ 2;").unwrap_err();
        assert_eq!(err.location(), SourceLocation::new(1, 11));
    }

    #[test]
    fn test_reconstruct_is_byte_exact() {
        let source = "a = f( x,\n   /* keep */ y ) ;";
        let tokens = tokenize(source).unwrap();

        assert_eq!(reconstruct(&tokens[2..8], source), "f( x,\n   /* keep */ y )");
        let mut edited = tokens[2..8].to_vec();
        edited[0] = edited[0].synthesized(edited[0].location, edited[0].span);
        assert_eq!(reconstruct(&edited, source), "f ( x , y )");
    }
}
