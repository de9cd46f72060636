// Lexers for index expressions and computation bodies.
//
// Two token sets share this module. `Token` covers the index-expression
// syntax used by subsets and map ranges (`i - 1`, `0:N-1`, `2*j + 1`).
// `BodyToken` is a lossless tokenization of a computation body, used to
// rename connector references without touching strings or attributes.
// Both use the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Index-expression token types.
///
/// Identifiers carry no value; use the span to retrieve the text from the
/// source. Integer literals are unsigned; a leading `-` is a separate token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // ── Operators ──
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // ── Delimiters ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,

    // ── Literals ──
    /// Non-negative integer literal. Values outside `i64` are lex errors.
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

/// Computation-body token types.
///
/// Every byte of a body belongs to exactly one token, so concatenating the
/// token slices reproduces the input.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyToken {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    Number,

    /// Single- or double-quoted string with backslash escapes.
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    StringLit,

    /// Attribute access; the identifier after it is never a connector.
    #[token(".")]
    Dot,

    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// `#` to end of line.
    #[regex(r"#[^\n]*")]
    Comment,

    /// Any other single character (operators, brackets, stray quotes).
    #[regex(r".", priority = 0)]
    Other,
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex an index expression into tokens.
///
/// Returns all successfully parsed tokens together with any errors for
/// unrecognised characters. Lexing is non-fatal: errors are collected and
/// the lexer continues past bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

/// Lex a computation body losslessly.
///
/// Slices the lexer cannot classify are reported as `BodyToken::Other`, so
/// the returned spans always tile the whole input.
pub fn lex_body(source: &str) -> Vec<(BodyToken, Span)> {
    BodyToken::lexer(source)
        .spanned()
        .map(|(result, range)| {
            let span = Span {
                start: range.start,
                end: range.end,
            };
            (result.unwrap_or(BodyToken::Other), span)
        })
        .collect()
}

// ── Tests ──
