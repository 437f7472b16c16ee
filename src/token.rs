//! Script token definitions.
//!
//! Reserved words are not distinguished here: the lexer hands every word out
//! as [`TokenKind::Ident`] and the parser decides from its grammar position
//! whether a spelling like `if` or `new` acts as a keyword. `is_statement_keyword`
//! and `is_expression_keyword` are the two classification tables.

use core::fmt;

/// Operator kinds carried by [`TokenKind::Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `!`
    Not,
    /// `++`
    Inc,
    /// `--`
    Dec,
}

impl OpKind {
    /// True for operators that combine two operands left-to-right
    /// (arithmetic, shift, relational). Logical `&&`/`||` are handled one
    /// level up so the right operand can be skipped.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpKind::Plus
                | OpKind::Minus
                | OpKind::Mul
                | OpKind::Div
                | OpKind::Mod
                | OpKind::Shl
                | OpKind::Shr
                | OpKind::Eq
                | OpKind::Ne
                | OpKind::Lt
                | OpKind::Le
                | OpKind::Gt
                | OpKind::Ge
        )
    }

    /// True for `==`/`!=`.
    pub fn is_equality(self) -> bool {
        matches!(self, OpKind::Eq | OpKind::Ne)
    }

    /// Operator spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            OpKind::Assign => "=",
            OpKind::Plus => "+",
            OpKind::Minus => "-",
            OpKind::Mul => "*",
            OpKind::Div => "/",
            OpKind::Mod => "%",
            OpKind::Shl => "<<",
            OpKind::Shr => ">>",
            OpKind::Eq => "==",
            OpKind::Ne => "!=",
            OpKind::Lt => "<",
            OpKind::Le => "<=",
            OpKind::Gt => ">",
            OpKind::Ge => ">=",
            OpKind::And => "&&",
            OpKind::Or => "||",
            OpKind::Not => "!",
            OpKind::Inc => "++",
            OpKind::Dec => "--",
        }
    }
}

/// Script token types.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// End of input.
    Eof,
    /// Identifier or reserved word.
    Ident(String),
    /// Integer literal (decimal or 0x hex).
    Int(i64),
    /// Floating-point literal.
    #[cfg(feature = "float")]
    Float(f64),
    /// String literal, escapes decoded.
    Str(String),
    /// Operator.
    Op(OpKind),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `;`
    Semi,
    /// `,`
    Comma,
    /// `.`
    Period,
}

/// Words that act as keywords when they open a statement.
pub fn is_statement_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "else" | "var" | "for" | "delete" | "function" | "return"
    )
}

/// Words that act as keywords inside an expression.
pub fn is_expression_keyword(word: &str) -> bool {
    matches!(word, "new" | "in" | "function")
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => write!(f, "end of script"),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::Int(n) => write!(f, "{}", n),
            #[cfg(feature = "float")]
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Op(op) => write!(f, "{}", op.symbol()),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Semi => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Period => write!(f, "."),
        }
    }
}

/// A token with its source position.
#[derive(Debug, Clone)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub start: usize,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, start: usize, line: usize, column: usize) -> Self {
        Token {
            kind,
            start,
            line,
            column,
        }
    }

    /// Check if this is EOF.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
