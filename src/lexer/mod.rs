//! Tokenizer for quiver source text.
//!
//! Built on [`logos`]. The token set is deliberately small: numbers,
//! strings, identifiers, labels, the arithmetic/comparison verbs that
//! are spelled as operators, and the handful of punctuation characters
//! the phrase grammar uses. Comments (`//` line and nestable `/* */`
//! block) are skipped here and never reach the parser.

use logos::{FilterResult, Lexer, Logos};

use crate::ast::Span;

// ---- Errors ----

/// What went wrong inside the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, thiserror::Error)]
pub enum LexErrorKind {
    #[default]
    #[error("unrecognized character")]
    Unrecognized,
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid escape sequence in string literal")]
    BadEscape,
    #[error("integer literal out of range")]
    IntOverflow,
    #[error("malformed number literal")]
    BadNumber,
}

/// A lexical error with enough context to point back at the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lex error at byte {position}: {kind} near '{snippet}'")]
pub struct LexError {
    pub kind: LexErrorKind,
    /// Byte offset where the offending lexeme starts.
    pub position: usize,
    /// The offending text, clipped for display.
    pub snippet: String,
    pub span: Span,
}

// ---- Tokens ----

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(error = LexErrorKind)]
pub enum Token {
    // Never emitted: the callback either skips the comment or errors.
    #[token("/*", block_comment)]
    BlockComment,

    #[regex(r"-?[0-9][0-9_]*", parse_decimal)]
    #[regex(r"-?0[xX][0-9a-fA-F][0-9a-fA-F_]*", |lex| parse_radix(lex, 16))]
    #[regex(r"-?0[oO][0-7][0-7_]*", |lex| parse_radix(lex, 8))]
    #[regex(r"-?0[bB][01][01_]*", |lex| parse_radix(lex, 2))]
    Int(i64),

    #[regex(r"-?[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"-?[0-9][0-9_]*[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, cook_string)]
    #[regex(r#""([^"\\]|\\.)*"#, |_| Err(LexErrorKind::UnterminatedString))]
    Str(String),

    #[regex(r"\p{XID_Start}\p{XID_Continue}*", |lex| lex.slice().to_owned())]
    Ident(String),

    // An identifier immediately followed by a colon. The colon is
    // stripped; the payload is the bare name.
    #[regex(r"\p{XID_Start}\p{XID_Continue}*[ \t]*:", cook_label)]
    Label(String),

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
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("$")]
    Dollar,
    #[token("->")]
    Arrow,
    #[token("?")]
    Question,
}

// ---- Callbacks ----

fn parse_decimal(lex: &mut Lexer<Token>) -> Result<i64, LexErrorKind> {
    let digits: String = lex.slice().chars().filter(|&c| c != '_').collect();
    digits.parse().map_err(|_| LexErrorKind::IntOverflow)
}

fn parse_radix(lex: &mut Lexer<Token>, radix: u32) -> Result<i64, LexErrorKind> {
    let slice = lex.slice();
    let (negative, rest) = match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, slice),
    };
    // Skip the 0x/0o/0b prefix, then drop separators.
    let digits: String = rest[2..].chars().filter(|&c| c != '_').collect();
    let magnitude = i64::from_str_radix(&digits, radix).map_err(|_| LexErrorKind::IntOverflow)?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_float(lex: &mut Lexer<Token>) -> Result<f64, LexErrorKind> {
    let digits: String = lex.slice().chars().filter(|&c| c != '_').collect();
    digits.parse().map_err(|_| LexErrorKind::BadNumber)
}

fn cook_label(lex: &mut Lexer<Token>) -> String {
    let slice = lex.slice();
    slice[..slice.len() - 1].trim_end().to_owned()
}

/// Resolve escape sequences inside a terminated string literal.
fn cook_string(lex: &mut Lexer<Token>) -> Result<String, LexErrorKind> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('x') => {
                let hi = chars.next().and_then(|c| c.to_digit(16));
                let lo = chars.next().and_then(|c| c.to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) if hi * 16 + lo <= 0x7f => {
                        out.push((hi * 16 + lo) as u8 as char);
                    }
                    _ => return Err(LexErrorKind::BadEscape),
                }
            }
            Some('u') => {
                if chars.next() != Some('{') {
                    return Err(LexErrorKind::BadEscape);
                }
                let mut value: u32 = 0;
                let mut digits = 0;
                loop {
                    match chars.next() {
                        Some('}') if digits > 0 => break,
                        Some(c) => match c.to_digit(16) {
                            Some(d) if digits < 6 => {
                                value = value * 16 + d;
                                digits += 1;
                            }
                            _ => return Err(LexErrorKind::BadEscape),
                        },
                        None => return Err(LexErrorKind::BadEscape),
                    }
                }
                match char::from_u32(value) {
                    Some(c) => out.push(c),
                    None => return Err(LexErrorKind::BadEscape),
                }
            }
            _ => return Err(LexErrorKind::BadEscape),
        }
    }
    Ok(out)
}

/// Skip a block comment, honoring nesting. `/* a /* b */ c */` is one
/// comment.
fn block_comment(lex: &mut Lexer<Token>) -> FilterResult<(), LexErrorKind> {
    let mut depth = 1usize;
    let rest = lex.remainder();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return FilterResult::Skip;
            }
        } else {
            i += 1;
        }
    }
    lex.bump(rest.len());
    FilterResult::Error(LexErrorKind::UnterminatedComment)
}

// ---- Entry point ----

const SNIPPET_LIMIT: usize = 40;

fn clip(text: &str) -> String {
    if text.len() <= SNIPPET_LIMIT {
        return text.to_owned();
    }
    let mut end = SNIPPET_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Tokenize `source`, pairing every token with its byte span.
///
/// Stops at the first lexical error.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(outcome) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start, range.end);
        match outcome {
            Ok(token) => tokens.push((token, span)),
            Err(kind) => {
                return Err(LexError {
                    kind,
                    position: range.start,
                    snippet: clip(&source[range]),
                    span,
                });
            }
        }
    }
    Ok(tokens)
}

// ---- Tests ----
