//! Recursive-descent parser: token stream to phrase tree.
//!
//! The grammar is flat and regular. A source unit is a sequence of
//! definitions, `name: { phrase* }`. Phrases are literals, verb words
//! with an optional parenthesized argument, quoted `[...]` and
//! unquoted `{...}` vector literals, `$` bindings and reads, `->$`
//! stores, `? (...) (...)` conditionals, and jump labels. The parser
//! stops at the first error; there is no recovery.

use crate::ast::{Definition, Phrase, PhraseKind, SourceUnit, Span, VerbArg};
use crate::lexer::Token;

type Result<T> = std::result::Result<T, ParseError>;

// ---- Errors ----

/// A syntax error, pointing at the token where parsing stopped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    /// Stable code, e.g. `QVR-P004`.
    pub code: &'static str,
    /// Index of the offending token.
    pub position: usize,
    /// Byte span of the offending token, or of the end of input.
    pub span: Span,
    pub message: String,
}

// ---- Parser ----

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0 }
    }

    // ---- Cursor helpers ----

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => *span,
            None => self
                .tokens
                .last()
                .map(|(_, span)| Span::new(span.end, span.end))
                .unwrap_or(Span::UNKNOWN),
        }
    }

    fn bump(&mut self) -> Span {
        let span = self.peek_span();
        self.pos += 1;
        span
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of input".to_owned(),
        }
    }

    fn error(&self, code: &'static str, message: impl Into<String>) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Token, code: &'static str, what: &str) -> Result<Span> {
        if self.peek() == Some(expected) {
            Ok(self.bump())
        } else {
            Err(self.error(code, format!("{what}, found {}", self.describe_next())))
        }
    }

    // ---- Grammar ----

    /// Parse a whole source unit: zero or more definitions.
    pub fn parse_unit(&mut self) -> Result<SourceUnit> {
        let mut defs = Vec::new();
        while !self.at_end() {
            defs.push(self.parse_definition()?);
        }
        Ok(SourceUnit { defs })
    }

    fn parse_definition(&mut self) -> Result<Definition> {
        let start = self.peek_span();
        let name = match self.peek().cloned() {
            Some(Token::Label(name)) => {
                self.bump();
                name
            }
            _ => {
                return Err(self.error(
                    "QVR-P001",
                    format!("expected a definition label, found {}", self.describe_next()),
                ));
            }
        };
        self.expect(
            &Token::LBrace,
            "QVR-P002",
            &format!("expected '{{' to open the body of '{name}'"),
        )?;
        let (body, end) = self.phrases_until(&Token::RBrace, "'}'")?;
        Ok(Definition {
            name,
            body,
            span: start.merge(end),
        })
    }

    /// Parse phrases up to (and through) `closer`. Returns the body and
    /// the span of the closing delimiter.
    fn phrases_until(&mut self, closer: &Token, closer_text: &str) -> Result<(Vec<Phrase>, Span)> {
        let mut phrases = Vec::new();
        loop {
            match self.peek() {
                Some(token) if token == closer => return Ok((phrases, self.bump())),
                Some(_) => phrases.push(self.parse_phrase()?),
                None => {
                    return Err(self.error(
                        "QVR-P003",
                        format!("expected {closer_text} before end of input"),
                    ));
                }
            }
        }
    }

    fn parse_phrase(&mut self) -> Result<Phrase> {
        let span = self.peek_span();
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("QVR-P003", "expected a phrase, found end of input"));
        };
        match token {
            Token::Int(value) => {
                self.bump();
                Ok(Phrase::new(PhraseKind::Int(value), span))
            }
            Token::Float(value) => {
                self.bump();
                Ok(Phrase::new(PhraseKind::Float(value), span))
            }
            Token::Str(text) => {
                self.bump();
                Ok(Phrase::new(PhraseKind::Str(text), span))
            }
            Token::Ident(name) => {
                self.bump();
                self.finish_word(name, span)
            }
            Token::Plus => self.operator_word("+"),
            Token::Minus => self.operator_word("-"),
            Token::Star => self.operator_word("*"),
            Token::Slash => self.operator_word("/"),
            Token::Percent => self.operator_word("%"),
            Token::EqEq => self.operator_word("=="),
            Token::BangEq => self.operator_word("!="),
            Token::Label(name) => {
                self.bump();
                Ok(Phrase::new(PhraseKind::Label(name), span))
            }
            Token::LBrace => {
                self.bump();
                let (body, end) = self.phrases_until(&Token::RBrace, "'}'")?;
                Ok(Phrase::new(PhraseKind::Unquoted(body), span.merge(end)))
            }
            Token::LBracket => {
                self.bump();
                let (body, end) = self.phrases_until(&Token::RBracket, "']'")?;
                Ok(Phrase::new(PhraseKind::Quoted(body), span.merge(end)))
            }
            Token::Dollar => {
                self.bump();
                self.finish_dollar(span)
            }
            Token::Arrow => {
                self.bump();
                self.finish_store(span)
            }
            Token::Question => {
                self.bump();
                self.finish_cond(span)
            }
            other => Err(self.error(
                "QVR-P004",
                format!("unexpected {other:?} in phrase position"),
            )),
        }
    }

    fn operator_word(&mut self, name: &str) -> Result<Phrase> {
        let span = self.bump();
        Ok(Phrase::new(
            PhraseKind::Word {
                name: name.to_owned(),
                arg: None,
            },
            span,
        ))
    }

    /// An identifier has been consumed; attach a `(arg)` if one follows.
    fn finish_word(&mut self, name: String, start: Span) -> Result<Phrase> {
        if self.peek() != Some(&Token::LParen) {
            return Ok(Phrase::new(PhraseKind::Word { name, arg: None }, start));
        }
        self.bump();
        let arg = match self.peek().cloned() {
            Some(Token::Int(value)) => {
                self.bump();
                VerbArg::Int(value)
            }
            Some(Token::Ident(label)) => {
                self.bump();
                VerbArg::Label(label)
            }
            _ => {
                return Err(self.error(
                    "QVR-P005",
                    format!(
                        "argument to '{name}' must be an integer or a label, found {}",
                        self.describe_next()
                    ),
                ));
            }
        };
        let end = self.expect(
            &Token::RParen,
            "QVR-P005",
            &format!("expected ')' after the argument to '{name}'"),
        )?;
        Ok(Phrase::new(
            PhraseKind::Word {
                name,
                arg: Some(arg),
            },
            start.merge(end),
        ))
    }

    /// A `$` has been consumed: either `$name` (read) or `$(a b c)`
    /// (binding list).
    fn finish_dollar(&mut self, start: Span) -> Result<Phrase> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let end = self.bump();
                Ok(Phrase::new(PhraseKind::Var(name), start.merge(end)))
            }
            Some(Token::LParen) => {
                self.bump();
                let mut names = Vec::new();
                loop {
                    match self.peek().cloned() {
                        Some(Token::Ident(name)) => {
                            self.bump();
                            names.push(name);
                        }
                        Some(Token::RParen) => {
                            let end = self.bump();
                            if names.is_empty() {
                                return Err(ParseError {
                                    code: "QVR-P006",
                                    position: self.pos.saturating_sub(1),
                                    span: start.merge(end),
                                    message: "a binding list needs at least one name".to_owned(),
                                });
                            }
                            return Ok(Phrase::new(PhraseKind::Bind(names), start.merge(end)));
                        }
                        _ => {
                            return Err(self.error(
                                "QVR-P007",
                                format!(
                                    "expected a name or ')' in the binding list, found {}",
                                    self.describe_next()
                                ),
                            ));
                        }
                    }
                }
            }
            _ => Err(self.error(
                "QVR-P007",
                format!("expected a name or '(' after '$', found {}", self.describe_next()),
            )),
        }
    }

    fn finish_store(&mut self, start: Span) -> Result<Phrase> {
        self.expect(&Token::Dollar, "QVR-P007", "expected '$' after '->'")?;
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let end = self.bump();
                Ok(Phrase::new(PhraseKind::Store(name), start.merge(end)))
            }
            _ => Err(self.error(
                "QVR-P007",
                format!(
                    "expected a variable name after '->$', found {}",
                    self.describe_next()
                ),
            )),
        }
    }

    /// A `?` has been consumed. One parenthesized arm is required, a
    /// second is optional.
    fn finish_cond(&mut self, start: Span) -> Result<Phrase> {
        self.expect(&Token::LParen, "QVR-P008", "expected '(' after '?'")?;
        let (then, mut end) = self.phrases_until(&Token::RParen, "')'")?;
        let otherwise = if self.peek() == Some(&Token::LParen) {
            self.bump();
            let (body, close) = self.phrases_until(&Token::RParen, "')'")?;
            end = close;
            Some(body)
        } else {
            None
        };
        Ok(Phrase::new(
            PhraseKind::Cond { then, otherwise },
            start.merge(end),
        ))
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn unit(source: &str) -> SourceUnit {
        Parser::new(lex(source).unwrap()).parse_unit().unwrap()
    }

    fn failure(source: &str) -> ParseError {
        Parser::new(lex(source).unwrap()).parse_unit().unwrap_err()
    }

    fn kinds(phrases: &[Phrase]) -> Vec<&PhraseKind> {
        phrases.iter().map(|phrase| &phrase.kind).collect()
    }

    #[test]
    fn parses_a_simple_definition() {
        let unit = unit("main: { 1 2 + }");
        assert_eq!(unit.defs.len(), 1);
        assert_eq!(unit.defs[0].name, "main");
        assert_eq!(
            kinds(&unit.defs[0].body),
            vec![
                &PhraseKind::Int(1),
                &PhraseKind::Int(2),
                &PhraseKind::Word {
                    name: "+".to_owned(),
                    arg: None
                },
            ]
        );
    }

    #[test]
    fn parses_multiple_definitions() {
        let unit = unit("a: { 1 } b: { 2 }");
        assert_eq!(unit.defs.len(), 2);
        assert_eq!(unit.defs[0].name, "a");
        assert_eq!(unit.defs[1].name, "b");
    }

    #[test]
    fn word_arguments_are_ints_or_labels() {
        let unit = unit("main: { dup(2) go(top) }");
        assert_eq!(
            kinds(&unit.defs[0].body),
            vec![
                &PhraseKind::Word {
                    name: "dup".to_owned(),
                    arg: Some(VerbArg::Int(2))
                },
                &PhraseKind::Word {
                    name: "go".to_owned(),
                    arg: Some(VerbArg::Label("top".to_owned()))
                },
            ]
        );
    }

    #[test]
    fn quoted_and_unquoted_vectors_nest() {
        let unit = unit("main: { [ 1 { 2 } ] }");
        let PhraseKind::Quoted(outer) = &unit.defs[0].body[0].kind else {
            panic!("expected a quoted vector");
        };
        assert_eq!(outer.len(), 2);
        assert!(matches!(outer[0].kind, PhraseKind::Int(1)));
        let PhraseKind::Unquoted(inner) = &outer[1].kind else {
            panic!("expected an unquoted vector");
        };
        assert!(matches!(inner[0].kind, PhraseKind::Int(2)));
    }

    #[test]
    fn bindings_reads_and_stores() {
        let unit = unit("main: { $( a b ) $a ->$b }");
        assert_eq!(
            kinds(&unit.defs[0].body),
            vec![
                &PhraseKind::Bind(vec!["a".to_owned(), "b".to_owned()]),
                &PhraseKind::Var("a".to_owned()),
                &PhraseKind::Store("b".to_owned()),
            ]
        );
    }

    #[test]
    fn conditional_with_both_arms() {
        let unit = unit("main: { ? ( 1 ) ( 2 ) }");
        let PhraseKind::Cond { then, otherwise } = &unit.defs[0].body[0].kind else {
            panic!("expected a conditional");
        };
        assert_eq!(then.len(), 1);
        assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn conditional_with_one_arm() {
        let unit = unit("main: { ? ( 1 2 ) }");
        let PhraseKind::Cond { then, otherwise } = &unit.defs[0].body[0].kind else {
            panic!("expected a conditional");
        };
        assert_eq!(then.len(), 2);
        assert!(otherwise.is_none());
    }

    #[test]
    fn labels_inside_a_body_are_phrases() {
        let unit = unit("main: { top: go(top) }");
        assert!(matches!(
            &unit.defs[0].body[0].kind,
            PhraseKind::Label(name) if name == "top"
        ));
    }

    #[test]
    fn definition_spans_cover_label_through_close() {
        let source = "main: { 1 }";
        let unit = unit(source);
        assert_eq!(unit.defs[0].span, Span::new(0, source.len()));
    }

    #[test]
    fn top_level_requires_a_label() {
        assert_eq!(failure("{ 1 }").code, "QVR-P001");
    }

    #[test]
    fn definition_requires_a_brace() {
        assert_eq!(failure("main: 1").code, "QVR-P002");
    }

    #[test]
    fn unterminated_body_is_reported() {
        assert_eq!(failure("main: { 1 2").code, "QVR-P003");
    }

    #[test]
    fn mismatched_closer_is_reported() {
        assert_eq!(failure("main: { [ 1 } ] }").code, "QVR-P004");
    }

    #[test]
    fn string_argument_is_rejected() {
        assert_eq!(failure(r#"main: { go("x") }"#).code, "QVR-P005");
    }

    #[test]
    fn empty_binding_list_is_rejected() {
        assert_eq!(failure("main: { $( ) }").code, "QVR-P006");
    }

    #[test]
    fn store_requires_a_dollar() {
        assert_eq!(failure("main: { -> x }").code, "QVR-P007");
    }

    #[test]
    fn conditional_requires_an_arm() {
        assert_eq!(failure("main: { ? 1 }").code, "QVR-P008");
    }
}
