use serde::{Deserialize, Serialize};

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ---- Source tree ----

/// A parsed source unit: the top-level `name: { phrase* }` definitions in
/// order. Nothing is resolved yet — names, labels and offsets are still
/// symbolic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub defs: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub body: Vec<Phrase>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    pub kind: PhraseKind,
    #[serde(skip)]
    pub span: Span,
}

impl Phrase {
    pub fn new(kind: PhraseKind, span: Span) -> Phrase {
        Phrase { kind, span }
    }
}

/// One phrase of a vector body, still sugared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhraseKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// Verb call or named-vector call, with an optional parenthesized
    /// integer or label argument.
    Word {
        name: String,
        arg: Option<VerbArg>,
    },
    /// `{ phrase* }` — executed immediately where it appears.
    Unquoted(Vec<Phrase>),
    /// `[ phrase* ]` — pushed as a value without executing.
    Quoted(Vec<Phrase>),
    /// `$( name* )` — attach names to the most recent frame slots.
    Bind(Vec<String>),
    /// `$name` — frame-relative duplicate.
    Var(String),
    /// `-> $name` — frame-relative store.
    Store(String),
    /// `? ( then ) ( else )`, else-arm optional.
    Cond {
        then: Vec<Phrase>,
        otherwise: Option<Vec<Phrase>>,
    },
    /// `name:` — jump target.
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VerbArg {
    Int(i64),
    Label(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_unknown_is_zero() {
        assert_eq!(Span::UNKNOWN, Span { start: 0, end: 0 });
    }

    #[test]
    fn span_merge_takes_extremes() {
        let a = Span { start: 5, end: 10 };
        let b = Span { start: 2, end: 15 };
        assert_eq!(a.merge(b), Span { start: 2, end: 15 });
    }

    #[test]
    fn span_merge_non_overlapping() {
        let a = Span { start: 0, end: 5 };
        let b = Span { start: 10, end: 20 };
        assert_eq!(a.merge(b), Span { start: 0, end: 20 });
    }

    #[test]
    fn spans_are_skipped_in_serialized_form() {
        let phrase = Phrase::new(PhraseKind::Int(3), Span::new(4, 5));
        let json = serde_json::to_string(&phrase).unwrap();
        assert!(!json.contains("span"));
    }
}
