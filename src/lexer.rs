//! Script lexer.
//!
//! Byte-oriented scanner producing [`Token`]s on demand. The evaluator drives
//! it directly: it supports one token of push-back, and its complete input
//! position can be snapshotted with [`Lexer::state`] and rewound with
//! [`Lexer::restore`] so loop bodies can be re-executed without re-parsing
//! the whole script.

use crate::error::{ScriptError, ScriptResult};
use crate::token::{OpKind, Token, TokenKind};

/// Snapshot of the lexer's input position.
#[derive(Debug, Clone)]
pub struct LexState {
    pos: usize,
    line: usize,
    column: usize,
    pending: Option<Token>,
}

/// Script lexer over a borrowed source string.
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    /// Single push-back slot. Pushing a second token before the first is
    /// consumed is a caller bug.
    pending: Option<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `src`.
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            pending: None,
        }
    }

    /// Current line number (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Byte offset of the next token to be produced.
    pub fn offset(&self) -> usize {
        match &self.pending {
            Some(tok) => tok.start,
            None => self.pos,
        }
    }

    /// Source text between two byte offsets.
    pub fn text_between(&self, start: usize, end: usize) -> &'a str {
        &self.src[start..end]
    }

    /// Text of the line the lexer is currently on, for diagnostics.
    pub fn line_text(&self) -> String {
        // The byte position can sit inside a multi-byte character; back up
        // to the boundary before slicing.
        let mut at = self.pos.min(self.src.len());
        while at > 0 && !self.src.is_char_boundary(at) {
            at -= 1;
        }
        let start = self.src[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let end = self.src[at..]
            .find('\n')
            .map(|i| at + i)
            .unwrap_or(self.src.len());
        self.src[start..end].trim_end().to_string()
    }

    /// Snapshot the complete input position, including any pushed-back token.
    pub fn state(&self) -> LexState {
        LexState {
            pos: self.pos,
            line: self.line,
            column: self.column,
            pending: self.pending.clone(),
        }
    }

    /// Rewind to a previously captured snapshot.
    pub fn restore(&mut self, state: LexState) {
        self.pos = state.pos;
        self.line = state.line;
        self.column = state.column;
        self.pending = state.pending;
    }

    /// Push one token back. The next [`Lexer::next_token`] returns it with
    /// its original text and position.
    pub fn put_back(&mut self, tok: Token) {
        debug_assert!(self.pending.is_none(), "double token push-back");
        self.pending = Some(tok);
    }

    /// Build a lexical error at the current position.
    pub fn error<S: Into<String>>(&self, message: S) -> ScriptError {
        ScriptError::Lex {
            message: message.into(),
            line: self.line,
            source_line: self.line_text(),
        }
    }

    fn get_char(&mut self) -> Option<u8> {
        let c = *self.bytes.get(self.pos)?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Put the last-read character back. Valid for exactly one non-newline
    /// character.
    fn put_back_char(&mut self) {
        debug_assert!(self.pos > 0 && self.bytes[self.pos - 1] != b'\n');
        self.pos -= 1;
        self.column -= 1;
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Skip whitespace and comments, returning the first significant
    /// character, or `None` at end of input.
    fn skip_to_token(&mut self) -> ScriptResult<Option<u8>> {
        loop {
            let Some(c) = self.get_char() else {
                return Ok(None);
            };
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => continue,
                b'/' => match self.peek_char() {
                    Some(b'/') => {
                        while let Some(c) = self.get_char() {
                            if c == b'\n' {
                                break;
                            }
                        }
                    }
                    Some(b'*') => {
                        self.get_char();
                        let mut star = false;
                        loop {
                            match self.get_char() {
                                Some(b'/') if star => break,
                                Some(c) => star = c == b'*',
                                None => return Err(self.error("unterminated comment")),
                            }
                        }
                    }
                    _ => return Ok(Some(c)),
                },
                _ => return Ok(Some(c)),
            }
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> ScriptResult<Token> {
        if let Some(tok) = self.pending.take() {
            return Ok(tok);
        }
        let Some(c) = self.skip_to_token()? else {
            return Ok(Token::new(TokenKind::Eof, self.pos, self.line, self.column));
        };
        let start = self.pos - 1;
        let line = self.line;
        let column = self.column - 1;
        let kind = match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.scan_ident(start),
            b'0'..=b'9' => self.scan_number(c, start)?,
            b'\'' | b'"' => self.scan_string(c)?,
            _ => self.scan_operator(c)?,
        };
        Ok(Token::new(kind, start, line, column))
    }

    fn scan_ident(&mut self, start: usize) -> TokenKind {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' {
                self.get_char();
            } else {
                break;
            }
        }
        TokenKind::Ident(self.src[start..self.pos].to_string())
    }

    fn scan_number(&mut self, first: u8, start: usize) -> ScriptResult<TokenKind> {
        if first == b'0' && matches!(self.peek_char(), Some(b'x') | Some(b'X')) {
            self.get_char();
            let digits = self.pos;
            while matches!(self.peek_char(), Some(c) if c.is_ascii_hexdigit()) {
                self.get_char();
            }
            if self.pos == digits {
                return Err(self.error("missing hex digits"));
            }
            return match i64::from_str_radix(&self.src[digits..self.pos], 16) {
                Ok(n) => Ok(TokenKind::Int(n)),
                Err(_) => Err(self.error("hex literal too large")),
            };
        }
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.get_char();
        }
        #[cfg(feature = "float")]
        {
            let mut is_float = false;
            if self.peek_char() == Some(b'.') {
                // Only a digit after the point makes this a float; `a[1].x`
                // style member access keeps the period.
                self.get_char();
                if matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    is_float = true;
                    while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                        self.get_char();
                    }
                } else {
                    self.put_back_char();
                }
            }
            if matches!(self.peek_char(), Some(b'e') | Some(b'E')) {
                self.get_char();
                if matches!(self.peek_char(), Some(b'+') | Some(b'-')) {
                    self.get_char();
                }
                if !matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    return Err(self.error("missing exponent digits"));
                }
                is_float = true;
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.get_char();
                }
            }
            if is_float {
                return match self.src[start..self.pos].parse::<f64>() {
                    Ok(n) => Ok(TokenKind::Float(n)),
                    Err(_) => Err(self.error("malformed number")),
                };
            }
        }
        match self.src[start..self.pos].parse::<i64>() {
            Ok(n) => Ok(TokenKind::Int(n)),
            Err(_) => Err(self.error("number too large")),
        }
    }

    fn hex_pair(&mut self) -> ScriptResult<u8> {
        let mut value = 0u8;
        for _ in 0..2 {
            let c = self
                .get_char()
                .ok_or_else(|| self.error("unterminated string"))?;
            let digit = (c as char)
                .to_digit(16)
                .ok_or_else(|| self.error("invalid hex escape"))?;
            value = value << 4 | digit as u8;
        }
        Ok(value)
    }

    fn scan_string(&mut self, quote: u8) -> ScriptResult<TokenKind> {
        let mut text = String::new();
        loop {
            let c = match self.get_char() {
                Some(b'\n') | None => return Err(self.error("unmatched quote")),
                Some(c) => c,
            };
            if c == quote {
                return Ok(TokenKind::Str(text));
            }
            if c != b'\\' {
                if c.is_ascii() {
                    text.push(c as char);
                } else {
                    // Leading byte of a multi-byte character: copy the whole
                    // UTF-8 sequence through intact.
                    let seq = self.pos - 1;
                    while matches!(self.peek_char(), Some(b) if b & 0xc0 == 0x80) {
                        self.get_char();
                    }
                    text.push_str(&self.src[seq..self.pos]);
                }
                continue;
            }
            let esc = self
                .get_char()
                .ok_or_else(|| self.error("unmatched quote"))?;
            match esc {
                b'n' => text.push('\n'),
                b't' => text.push('\t'),
                b'b' => text.push('\u{8}'),
                b'f' => text.push('\u{c}'),
                b'r' => text.push('\r'),
                b'\\' => text.push('\\'),
                b'\'' => text.push('\''),
                b'"' => text.push('"'),
                b'0'..=b'7' => {
                    let mut value = (esc - b'0') as u32;
                    for _ in 0..2 {
                        match self.peek_char() {
                            Some(c @ b'0'..=b'7') => {
                                self.get_char();
                                value = value * 8 + (c - b'0') as u32;
                            }
                            _ => break,
                        }
                    }
                    if value > 0xff {
                        return Err(self.error("octal escape out of range"));
                    }
                    text.push(value as u8 as char);
                }
                b'x' => text.push(self.hex_pair()? as char),
                // \uNNNN is consumed as two consecutive hex escapes.
                b'u' => {
                    text.push(self.hex_pair()? as char);
                    text.push(self.hex_pair()? as char);
                }
                _ => return Err(self.error("invalid escape")),
            }
        }
    }

    fn scan_operator(&mut self, c: u8) -> ScriptResult<TokenKind> {
        let kind = match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b';' => TokenKind::Semi,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Period,
            b'*' => TokenKind::Op(OpKind::Mul),
            b'/' => TokenKind::Op(OpKind::Div),
            b'%' => TokenKind::Op(OpKind::Mod),
            b'=' => self.op_or(b'=', OpKind::Eq, OpKind::Assign),
            b'!' => self.op_or(b'=', OpKind::Ne, OpKind::Not),
            b'+' => self.op_or(b'+', OpKind::Inc, OpKind::Plus),
            b'-' => self.op_or(b'-', OpKind::Dec, OpKind::Minus),
            b'<' => match self.peek_char() {
                Some(b'=') => {
                    self.get_char();
                    TokenKind::Op(OpKind::Le)
                }
                Some(b'<') => {
                    self.get_char();
                    TokenKind::Op(OpKind::Shl)
                }
                _ => TokenKind::Op(OpKind::Lt),
            },
            b'>' => match self.peek_char() {
                Some(b'=') => {
                    self.get_char();
                    TokenKind::Op(OpKind::Ge)
                }
                Some(b'>') => {
                    self.get_char();
                    TokenKind::Op(OpKind::Shr)
                }
                _ => TokenKind::Op(OpKind::Gt),
            },
            b'&' => match self.get_char() {
                Some(b'&') => TokenKind::Op(OpKind::And),
                _ => return Err(self.error("invalid token '&'")),
            },
            b'|' => match self.get_char() {
                Some(b'|') => TokenKind::Op(OpKind::Or),
                _ => return Err(self.error("invalid token '|'")),
            },
            _ => return Err(self.error(format!("unrecognized character '{}'", c as char))),
        };
        Ok(kind)
    }

    /// Two-character operator: `joined` when the lookahead matches `next`,
    /// otherwise `single`.
    fn op_or(&mut self, next: u8, joined: OpKind, single: OpKind) -> TokenKind {
        if self.peek_char() == Some(next) {
            self.get_char();
            TokenKind::Op(joined)
        } else {
            TokenKind::Op(single)
        }
    }
}
