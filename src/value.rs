//! Runtime values: the closed variant every stack cell, vector element and
//! fault payload is built from.

use std::fmt;
use std::rc::Rc;

use crate::program::VectorRef;

/// Numbers are either 64-bit signed integers or doubles. Integer arithmetic
/// stays integral; any float operand promotes the whole operation to floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    /// Numeric equality across the Int/Float divide (`5 == 5.0` holds).
    pub fn loose_eq(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            // Keep a trailing .0 so integral floats stay visibly floats.
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

/// The call context recovered by the `caller` verb: a read-only snapshot of
/// the innermost frame marker. `vindex` reads the caller's code through it,
/// `fp` commits a frame boundary against it.
#[derive(Debug, Clone)]
pub struct CallCtx {
    /// The vector the caller was executing.
    pub vector: VectorRef,
    /// Instruction index at which the caller resumes.
    pub resume: usize,
    /// The caller's own frame pointer, in value-cell coordinates.
    pub fp: usize,
}

impl PartialEq for CallCtx {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.vector, &other.vector)
            && self.resume == other.resume
            && self.fp == other.fp
    }
}

impl fmt::Display for CallCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}@{}>", self.vector.name(), self.resume)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Number(Number),
    Str(Rc<str>),
    Symbol(Rc<str>),
    Vector(VectorRef),
    Ctx(CallCtx),
}

impl Value {
    pub fn int(n: i64) -> Value {
        Value::Number(Number::Int(n))
    }

    pub fn float(f: f64) -> Value {
        Value::Number(Number::Float(f))
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    /// Tag name used in type-mismatch faults and diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Vector(_) => "vector",
            Value::Ctx(_) => "context",
        }
    }

    /// Falsy values are integer 0, float 0.0 and the empty string; everything
    /// else (symbols, vectors, contexts, NaN) counts as truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => !n.is_zero(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Equality as the `==`/`!=` verbs see it: numbers compare after
    /// promotion, strings and symbols by content, vectors by identity,
    /// contexts by (identity, position, frame). Different tags never match.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.loose_eq(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::Ctx(a), Value::Ctx(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::Ctx(a), Value::Ctx(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Vector(v) => write!(f, "{}", v.name()),
            Value::Ctx(c) => write!(f, "{c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Vector;

    #[test]
    fn integral_floats_display_with_fraction() {
        assert_eq!(Value::int(5).to_string(), "5");
        assert_eq!(Value::float(5.0).to_string(), "5.0");
        assert_eq!(Value::float(2.5).to_string(), "2.5");
    }

    #[test]
    fn truthiness_rule() {
        assert!(!Value::int(0).is_truthy());
        assert!(!Value::float(0.0).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::int(-1).is_truthy());
        assert!(Value::float(f64::NAN).is_truthy());
        assert!(Value::str("0").is_truthy());
        assert!(Value::Symbol(Rc::from("x")).is_truthy());
    }

    #[test]
    fn loose_eq_promotes_numbers() {
        assert!(Value::int(5).loose_eq(&Value::float(5.0)));
        assert!(!Value::int(5).loose_eq(&Value::str("5")));
    }

    #[test]
    fn vectors_compare_by_identity() {
        let a = Vector::reserve("a");
        let b = Vector::reserve("a");
        assert!(Value::Vector(a.clone()).loose_eq(&Value::Vector(a.clone())));
        assert!(!Value::Vector(a).loose_eq(&Value::Vector(b)));
    }
}
