//! Resolved programs: canonical instructions, shared immutable vectors and
//! the top-level name table.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::value::Value;

/// Shared handle to an assembled vector. Cloning copies the reference, never
/// the contents; recursive definitions depend on that shared identity.
pub type VectorRef = Rc<Vector>;

/// An ordered, immutable-after-assembly sequence of instructions.
///
/// Vectors are handed out empty ("reserved") before their bodies assemble, so
/// a definition can reference itself or a later definition by name; the
/// assembler fills each one exactly once afterwards.
#[derive(Debug)]
pub struct Vector {
    name: Rc<str>,
    code: OnceCell<Box<[Op]>>,
}

impl Vector {
    pub fn reserve(name: &str) -> VectorRef {
        Rc::new(Vector {
            name: Rc::from(name),
            code: OnceCell::new(),
        })
    }

    pub(crate) fn fill(&self, ops: Vec<Op>) {
        let fresh = self.code.set(ops.into_boxed_slice()).is_ok();
        debug_assert!(fresh, "vector {} filled twice", self.name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instruction stream. A reserved-but-unfilled vector reads as empty,
    /// which executes as an immediate return.
    pub fn code(&self) -> &[Op] {
        self.code.get().map(|c| &c[..]).unwrap_or(&[])
    }
}

/// Vectors compare by name; within one assembled program names are unique,
/// and comparing code structurally would recurse through self-references.
impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// One resolved instruction. Everything symbolic — variable names, labels,
/// sugar forms — is gone by the time these exist; operands are plain signed
/// integers fixed at assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Push a literal value.
    Push(Value),
    /// Invoke a vector resolved by name at assembly (same protocol as `exec`).
    Invoke(VectorRef),
    /// Push the value view of the cell at `pc+k` and resume past it.
    Load(i64),
    Exec,
    Dupv(i64),
    Swapv(i64),
    Popv(i64),
    Dup(i64),
    Swap(i64),
    Pop(i64),
    Dupi(i64),
    Swapi(i64),
    Popi(i64),
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Go(i64),
    Branch(i64),
    Return(i64),
    Args(i64),
    Fp,
    Caller,
    Seek(i64),
    Vindex,
    Error,
}

impl Op {
    /// Surface name of the verb, as written in source and as `vindex` reports
    /// it when code is inspected as data.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Push(_) => "push",
            Op::Invoke(_) => "invoke",
            Op::Load(_) => "load",
            Op::Exec => "exec",
            Op::Dupv(_) => "dupv",
            Op::Swapv(_) => "swapv",
            Op::Popv(_) => "popv",
            Op::Dup(_) => "dup",
            Op::Swap(_) => "swap",
            Op::Pop(_) => "pop",
            Op::Dupi(_) => "dupi",
            Op::Swapi(_) => "swapi",
            Op::Popi(_) => "popi",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Rem => "%",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Go(_) => "go",
            Op::Branch(_) => "branch",
            Op::Return(_) => "return",
            Op::Args(_) => "args",
            Op::Fp => "fp",
            Op::Caller => "caller",
            Op::Seek(_) => "seek",
            Op::Vindex => "vindex",
            Op::Error => "error",
        }
    }

    /// The value a cell presents when a vector is read as data (`load`,
    /// `vindex`): push cells yield their value, invoke cells the target
    /// vector, every other verb its name as a symbol.
    pub fn view(&self) -> Value {
        match self {
            Op::Push(v) => v.clone(),
            Op::Invoke(v) => Value::Vector(Rc::clone(v)),
            other => Value::Symbol(Rc::from(other.name())),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Push(Value::Str(s)) => write!(f, "push {s:?}"),
            Op::Push(v) => write!(f, "push {v}"),
            Op::Invoke(v) => write!(f, "invoke {}", v.name()),
            Op::Load(k) => write!(f, "load {k}"),
            Op::Dupv(k) => write!(f, "dupv {k}"),
            Op::Swapv(k) => write!(f, "swapv {k}"),
            Op::Popv(k) => write!(f, "popv {k}"),
            Op::Dup(k) => write!(f, "dup {k}"),
            Op::Swap(k) => write!(f, "swap {k}"),
            Op::Pop(k) => write!(f, "pop {k}"),
            Op::Dupi(k) => write!(f, "dupi {k}"),
            Op::Swapi(k) => write!(f, "swapi {k}"),
            Op::Popi(k) => write!(f, "popi {k}"),
            Op::Go(k) => write!(f, "go {k}"),
            Op::Branch(k) => write!(f, "branch {k}"),
            Op::Return(k) => write!(f, "return {k}"),
            Op::Args(k) => write!(f, "args {k}"),
            Op::Seek(k) => write!(f, "seek {k}"),
            bare => f.write_str(bare.name()),
        }
    }
}

/// A fully assembled program: top-level name → vector, definition order
/// preserved. Read-only once built; there is no redefinition.
#[derive(Debug, Default)]
pub struct Program {
    names: Vec<Rc<str>>,
    table: HashMap<Rc<str>, VectorRef>,
}

impl Program {
    pub(crate) fn define(&mut self, vector: VectorRef) {
        let name: Rc<str> = Rc::from(vector.name());
        self.names.push(Rc::clone(&name));
        self.table.insert(name, vector);
    }

    pub fn get(&self, name: &str) -> Option<&VectorRef> {
        self.table.get(name)
    }

    /// Top-level definition names in source order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| &**n)
    }

    /// Deterministic disassembly of every definition, nested literals
    /// included. Identical source assembles to an identical listing.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let mut seen: HashSet<String> = HashSet::new();
        for name in &self.names {
            if let Some(v) = self.table.get(name) {
                list_vector(v, &mut out, &mut seen);
            }
        }
        out
    }
}

fn list_vector(vector: &VectorRef, out: &mut String, seen: &mut HashSet<String>) {
    if !seen.insert(vector.name().to_owned()) {
        return;
    }
    let _ = writeln!(out, "{}:", vector.name());
    let mut nested: Vec<VectorRef> = Vec::new();
    for (i, op) in vector.code().iter().enumerate() {
        let _ = writeln!(out, "{i:>4}  {op}");
        match op {
            Op::Invoke(v) | Op::Push(Value::Vector(v)) => nested.push(Rc::clone(v)),
            _ => {}
        }
    }
    let _ = writeln!(out);
    for v in nested {
        list_vector(&v, out, seen);
    }
}
