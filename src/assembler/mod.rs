//! Two-pass assembler: phrase trees to resolved programs.
//!
//! Pass 1 walks each vector body accumulating emitted-instruction
//! lengths so every jump label gets an absolute index before anything
//! is emitted. Pass 2 re-walks the body with a static depth counter,
//! assigning frame offsets to `$(...)` bindings, lowering the sugar
//! forms (`$x`, `->$x`, `[...]`, `{...}`, `?`) and back-patching the
//! branch/go pair that encodes a conditional. All names, labels and
//! variables are gone from the output; what remains is the closed
//! instruction set of [`crate::program::Op`].
//!
//! Top-level definitions are reserved before any body assembles, so a
//! vector can call itself or a definition that appears later in the
//! unit.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Phrase, PhraseKind, SourceUnit, Span, VerbArg};
use crate::program::{Op, Program, Vector, VectorRef};
use crate::value::Value;

// ---- Errors ----

/// A resolution failure. Assembly is exhaustive: the first failure
/// aborts the whole unit and nothing partially assembled escapes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Assembly error in '{vector}': {kind}")]
pub struct AssemblyError {
    /// Name of the definition being assembled.
    pub vector: String,
    pub kind: AsmErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AsmErrorKind {
    #[error("'{name}' is defined twice")]
    DuplicateDefinition { name: String },
    #[error("'{name}' is a primitive verb and cannot be redefined")]
    ReservedName { name: String },
    #[error("nothing named '{name}' to call")]
    UndefinedName { name: String },
    #[error("variable '{name}' is not bound here")]
    UndefinedVariable { name: String },
    #[error("label '{name}' is not defined in this vector")]
    UndefinedLabel { name: String },
    #[error("label '{name}' is defined twice in this vector")]
    DuplicateLabel { name: String },
    #[error("binding {requested} names where the frame holds {available}")]
    OverBinding { requested: usize, available: i64 },
    #[error("conditional arms leave different depths ({then_net} vs {else_net})")]
    UnbalancedArms { then_net: i64, else_net: i64 },
    #[error("'{verb}' needs an argument")]
    MissingArgument { verb: String },
    #[error("'{name}' does not take an argument")]
    UnexpectedArgument { name: String },
    #[error("'{verb}' cannot take a label argument")]
    LabelArgument { verb: String },
    #[error("bad operand for '{verb}': {reason}")]
    BadOperand { verb: String, reason: &'static str },
}

impl AsmErrorKind {
    /// Stable code, mirroring the parser's `QVR-P` scheme.
    pub fn code(&self) -> &'static str {
        match self {
            AsmErrorKind::DuplicateDefinition { .. } => "QVR-A001",
            AsmErrorKind::ReservedName { .. } => "QVR-A002",
            AsmErrorKind::UndefinedName { .. } => "QVR-A003",
            AsmErrorKind::UndefinedVariable { .. } => "QVR-A004",
            AsmErrorKind::UndefinedLabel { .. } => "QVR-A005",
            AsmErrorKind::DuplicateLabel { .. } => "QVR-A006",
            AsmErrorKind::OverBinding { .. } => "QVR-A007",
            AsmErrorKind::UnbalancedArms { .. } => "QVR-A008",
            AsmErrorKind::MissingArgument { .. } => "QVR-A009",
            AsmErrorKind::UnexpectedArgument { .. } => "QVR-A010",
            AsmErrorKind::LabelArgument { .. } => "QVR-A011",
            AsmErrorKind::BadOperand { .. } => "QVR-A012",
        }
    }
}

fn err(vector: &str, kind: AsmErrorKind, span: Span) -> AssemblyError {
    AssemblyError {
        vector: vector.to_owned(),
        kind,
        span,
    }
}

// ---- Verb table ----

/// Names claimed by the instruction set. Definitions may not shadow
/// them; word resolution tries them before the definition table.
const VERBS: &[&str] = &[
    "load", "exec", "dupv", "swapv", "popv", "dup", "swap", "pop", "dupi", "swapi", "popi", "+",
    "-", "*", "/", "%", "==", "!=", "go", "branch", "return", "args", "fp", "caller", "seek",
    "vindex", "error",
];

pub fn is_verb(name: &str) -> bool {
    VERBS.contains(&name)
}

// ---- Entry point ----

/// Assemble a parsed source unit into a program. Every definition is
/// reserved up front, then filled in source order.
pub fn assemble_unit(unit: &SourceUnit) -> Result<Program, AssemblyError> {
    let mut globals: HashMap<String, VectorRef> = HashMap::new();
    for def in &unit.defs {
        if is_verb(&def.name) {
            return Err(err(
                &def.name,
                AsmErrorKind::ReservedName {
                    name: def.name.clone(),
                },
                def.span,
            ));
        }
        if globals.contains_key(&def.name) {
            return Err(err(
                &def.name,
                AsmErrorKind::DuplicateDefinition {
                    name: def.name.clone(),
                },
                def.span,
            ));
        }
        globals.insert(def.name.clone(), Vector::reserve(&def.name));
    }
    let mut program = Program::default();
    for def in &unit.defs {
        let vector = Rc::clone(&globals[&def.name]);
        let mut asm = Asm {
            globals: &globals,
            base: &def.name,
            scope: Vec::new(),
            anon: 0,
        };
        asm.fill_vector(&vector, &def.body, 0)?;
        program.define(vector);
    }
    Ok(program)
}

// ---- Per-definition assembler ----

struct Asm<'a> {
    globals: &'a HashMap<String, VectorRef>,
    /// Top-level definition name; anonymous literals are named off it.
    base: &'a str,
    /// Live variable bindings, innermost last. Offsets are fp-relative
    /// and fixed here; nothing symbolic survives into the program.
    scope: Vec<(String, i64)>,
    anon: usize,
}

impl Asm<'_> {
    /// Assemble `body` into `vector`, starting the depth counter at
    /// `start_depth`. Nested literals recurse here with the parent's
    /// current depth, so bindings written inside them line up with the
    /// frame they will actually execute against.
    fn fill_vector(
        &mut self,
        vector: &VectorRef,
        body: &[Phrase],
        start_depth: i64,
    ) -> Result<(), AssemblyError> {
        let mut labels = HashMap::new();
        let mut index = 0usize;
        scan_labels(vector.name(), body, &mut index, &mut labels)?;

        let mut ops = Vec::with_capacity(index);
        // Verb operands are unbounded i64, so all depth accounting
        // saturates instead of overflowing.
        let mut depth = start_depth;
        let mark = self.scope.len();
        self.emit_body(vector.name(), body, &labels, &mut ops, &mut depth)?;
        self.scope.truncate(mark);
        vector.fill(ops);
        Ok(())
    }

    fn reserve_anon(&mut self) -> VectorRef {
        self.anon += 1;
        Vector::reserve(&format!("{}.{}", self.base, self.anon))
    }

    fn lookup(&self, name: &str) -> Option<i64> {
        self.scope
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, slot)| *slot)
    }

    fn emit_body(
        &mut self,
        vector: &str,
        body: &[Phrase],
        labels: &HashMap<String, usize>,
        ops: &mut Vec<Op>,
        depth: &mut i64,
    ) -> Result<(), AssemblyError> {
        for phrase in body {
            self.emit_phrase(vector, phrase, labels, ops, depth)?;
        }
        Ok(())
    }

    fn emit_phrase(
        &mut self,
        vector: &str,
        phrase: &Phrase,
        labels: &HashMap<String, usize>,
        ops: &mut Vec<Op>,
        depth: &mut i64,
    ) -> Result<(), AssemblyError> {
        match &phrase.kind {
            PhraseKind::Int(n) => {
                ops.push(Op::Push(Value::int(*n)));
                *depth = depth.saturating_add(1);
            }
            PhraseKind::Float(x) => {
                ops.push(Op::Push(Value::float(*x)));
                *depth = depth.saturating_add(1);
            }
            PhraseKind::Str(s) => {
                ops.push(Op::Push(Value::str(s)));
                *depth = depth.saturating_add(1);
            }
            PhraseKind::Word { name, arg } => {
                self.emit_word(vector, name, arg.as_ref(), phrase.span, labels, ops, depth)?;
            }
            PhraseKind::Unquoted(body) => {
                // Executes inline on the same stack; its own net effect
                // is not tracked, so bind before the call, not after.
                let inner = self.reserve_anon();
                self.fill_vector(&inner, body, *depth)?;
                ops.push(Op::Invoke(inner));
            }
            PhraseKind::Quoted(body) => {
                let inner = self.reserve_anon();
                self.fill_vector(&inner, body, *depth)?;
                ops.push(Op::Load(1));
                ops.push(Op::Push(Value::Vector(inner)));
                *depth = depth.saturating_add(1);
            }
            PhraseKind::Bind(names) => {
                let requested = names.len();
                if *depth < requested as i64 {
                    return Err(err(
                        vector,
                        AsmErrorKind::OverBinding {
                            requested,
                            available: *depth,
                        },
                        phrase.span,
                    ));
                }
                // First name written takes the newest slot.
                for (i, name) in names.iter().enumerate() {
                    let slot = *depth - 1 - i as i64;
                    self.scope.push((name.clone(), slot));
                }
            }
            PhraseKind::Var(name) => match self.lookup(name) {
                Some(slot) => {
                    ops.push(Op::Dupv(slot));
                    *depth = depth.saturating_add(1);
                }
                None => {
                    return Err(err(
                        vector,
                        AsmErrorKind::UndefinedVariable { name: name.clone() },
                        phrase.span,
                    ));
                }
            },
            PhraseKind::Store(name) => match self.lookup(name) {
                Some(slot) => {
                    ops.push(Op::Swapv(slot));
                    ops.push(Op::Pop(0));
                    *depth = depth.saturating_sub(1);
                }
                None => {
                    return Err(err(
                        vector,
                        AsmErrorKind::UndefinedVariable { name: name.clone() },
                        phrase.span,
                    ));
                }
            },
            PhraseKind::Cond { then, otherwise } => {
                let branch_at = ops.len();
                ops.push(Op::Branch(0));
                *depth = depth.saturating_sub(1);
                let base = *depth;

                let mark = self.scope.len();
                self.emit_body(vector, then, labels, ops, depth)?;
                self.scope.truncate(mark);
                let then_net = depth.saturating_sub(base);

                match otherwise {
                    Some(else_body) => {
                        let go_at = ops.len();
                        ops.push(Op::Go(0));
                        *depth = base;
                        let mark = self.scope.len();
                        self.emit_body(vector, else_body, labels, ops, depth)?;
                        self.scope.truncate(mark);
                        let else_net = depth.saturating_sub(base);
                        if then_net != else_net {
                            return Err(err(
                                vector,
                                AsmErrorKind::UnbalancedArms { then_net, else_net },
                                phrase.span,
                            ));
                        }
                        ops[branch_at] = Op::Branch((go_at + 1 - branch_at) as i64);
                        ops[go_at] = Op::Go((ops.len() - go_at) as i64);
                    }
                    None => {
                        if then_net != 0 {
                            return Err(err(
                                vector,
                                AsmErrorKind::UnbalancedArms {
                                    then_net,
                                    else_net: 0,
                                },
                                phrase.span,
                            ));
                        }
                        ops[branch_at] = Op::Branch((ops.len() - branch_at) as i64);
                    }
                }
            }
            // Index already recorded by the label scan.
            PhraseKind::Label(_) => {}
        }
        Ok(())
    }

    fn emit_word(
        &mut self,
        vector: &str,
        name: &str,
        arg: Option<&VerbArg>,
        span: Span,
        labels: &HashMap<String, usize>,
        ops: &mut Vec<Op>,
        depth: &mut i64,
    ) -> Result<(), AssemblyError> {
        match name {
            // Jump verbs: argument required, labels resolve to offsets
            // relative to the jump's own index.
            "go" | "branch" => {
                let at = ops.len();
                let rel = match arg {
                    Some(VerbArg::Int(n)) => *n,
                    Some(VerbArg::Label(label)) => match labels.get(label) {
                        Some(&target) => target as i64 - at as i64,
                        None => {
                            return Err(err(
                                vector,
                                AsmErrorKind::UndefinedLabel {
                                    name: label.clone(),
                                },
                                span,
                            ));
                        }
                    },
                    None => {
                        return Err(err(
                            vector,
                            AsmErrorKind::MissingArgument {
                                verb: name.to_owned(),
                            },
                            span,
                        ));
                    }
                };
                if name == "go" {
                    ops.push(Op::Go(rel));
                } else {
                    ops.push(Op::Branch(rel));
                    *depth = depth.saturating_sub(1);
                }
            }
            "load" => {
                let k = int_arg(vector, name, arg, 1, span)?;
                if k < 1 {
                    return Err(bad_operand(vector, name, "must be at least 1", span));
                }
                ops.push(Op::Load(k));
                *depth = depth.saturating_add(1);
            }
            "exec" => {
                no_arg(vector, name, arg, span)?;
                ops.push(Op::Exec);
                *depth = depth.saturating_sub(1);
            }
            "dupv" => {
                let k = int_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Dupv(k));
                *depth = depth.saturating_add(1);
            }
            "swapv" => {
                let k = int_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Swapv(k));
            }
            "popv" => {
                let k = int_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Popv(k));
                *depth = k;
            }
            "dup" => {
                let k = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Dup(k));
                *depth = depth.saturating_add(1);
            }
            "swap" => {
                let k = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Swap(k));
            }
            "pop" => {
                let k = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Pop(k));
                *depth = depth.saturating_sub(k.saturating_add(1));
            }
            "dupi" => {
                let k = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Dupi(k));
            }
            "swapi" => {
                let k = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Swapi(k));
                *depth = depth.saturating_sub(1);
            }
            // The popped index is accounted; the dynamically-sized
            // removal is not, and invalidates later bindings.
            "popi" => {
                let k = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Popi(k));
                *depth = depth.saturating_sub(1);
            }
            "+" | "-" | "*" | "/" | "%" | "==" | "!=" => {
                ops.push(match name {
                    "+" => Op::Add,
                    "-" => Op::Sub,
                    "*" => Op::Mul,
                    "/" => Op::Div,
                    "%" => Op::Rem,
                    "==" => Op::Eq,
                    _ => Op::Ne,
                });
                *depth = depth.saturating_sub(1);
            }
            "return" => {
                let n = positive_arg(vector, name, arg, 0, span)?;
                ops.push(Op::Return(n));
            }
            "args" => {
                let k = positive_arg(vector, name, arg, 1, span)?;
                ops.push(Op::Args(k));
                *depth = depth.saturating_add(k);
            }
            "fp" => {
                no_arg(vector, name, arg, span)?;
                ops.push(Op::Fp);
                *depth = depth.saturating_sub(1);
            }
            "caller" => {
                no_arg(vector, name, arg, span)?;
                ops.push(Op::Caller);
                *depth = depth.saturating_add(1);
            }
            "seek" => {
                let k = int_arg(vector, name, arg, 1, span)?;
                ops.push(Op::Seek(k));
            }
            "vindex" => {
                no_arg(vector, name, arg, span)?;
                ops.push(Op::Vindex);
                *depth = depth.saturating_sub(1);
            }
            "error" => {
                no_arg(vector, name, arg, span)?;
                ops.push(Op::Error);
                *depth = depth.saturating_sub(1);
            }
            // Not a verb: a named call, same protocol as exec.
            _ => match self.globals.get(name) {
                Some(target) => {
                    no_arg(vector, name, arg, span)?;
                    ops.push(Op::Invoke(Rc::clone(target)));
                }
                None => {
                    return Err(err(
                        vector,
                        AsmErrorKind::UndefinedName {
                            name: name.to_owned(),
                        },
                        span,
                    ));
                }
            },
        }
        Ok(())
    }
}

// ---- Argument helpers ----

fn int_arg(
    vector: &str,
    verb: &str,
    arg: Option<&VerbArg>,
    default: i64,
    span: Span,
) -> Result<i64, AssemblyError> {
    match arg {
        None => Ok(default),
        Some(VerbArg::Int(n)) => Ok(*n),
        Some(VerbArg::Label(_)) => Err(err(
            vector,
            AsmErrorKind::LabelArgument {
                verb: verb.to_owned(),
            },
            span,
        )),
    }
}

fn positive_arg(
    vector: &str,
    verb: &str,
    arg: Option<&VerbArg>,
    default: i64,
    span: Span,
) -> Result<i64, AssemblyError> {
    let k = int_arg(vector, verb, arg, default, span)?;
    if k < 0 {
        return Err(bad_operand(vector, verb, "must not be negative", span));
    }
    Ok(k)
}

fn bad_operand(vector: &str, verb: &str, reason: &'static str, span: Span) -> AssemblyError {
    err(
        vector,
        AsmErrorKind::BadOperand {
            verb: verb.to_owned(),
            reason,
        },
        span,
    )
}

fn no_arg(vector: &str, name: &str, arg: Option<&VerbArg>, span: Span) -> Result<(), AssemblyError> {
    if arg.is_some() {
        return Err(err(
            vector,
            AsmErrorKind::UnexpectedArgument {
                name: name.to_owned(),
            },
            span,
        ));
    }
    Ok(())
}

// ---- Label scan (pass 1) ----

/// Instructions a phrase will emit. Conditional arms are counted in
/// place; nested literals emit into their own vectors and count only
/// for the invoke/load cells left behind.
fn emit_len(kind: &PhraseKind) -> usize {
    match kind {
        PhraseKind::Int(_)
        | PhraseKind::Float(_)
        | PhraseKind::Str(_)
        | PhraseKind::Word { .. }
        | PhraseKind::Unquoted(_)
        | PhraseKind::Var(_) => 1,
        PhraseKind::Quoted(_) | PhraseKind::Store(_) => 2,
        PhraseKind::Bind(_) | PhraseKind::Label(_) => 0,
        PhraseKind::Cond { then, otherwise } => {
            let then_len: usize = then.iter().map(|p| emit_len(&p.kind)).sum();
            match otherwise {
                Some(body) => 2 + then_len + body.iter().map(|p| emit_len(&p.kind)).sum::<usize>(),
                None => 1 + then_len,
            }
        }
    }
}

/// Record the absolute instruction index of every label in this
/// vector, conditional arms included. Does not descend into nested
/// literals; those get their own tables.
fn scan_labels(
    vector: &str,
    body: &[Phrase],
    index: &mut usize,
    labels: &mut HashMap<String, usize>,
) -> Result<(), AssemblyError> {
    for phrase in body {
        match &phrase.kind {
            PhraseKind::Label(name) => {
                if labels.insert(name.clone(), *index).is_some() {
                    return Err(err(
                        vector,
                        AsmErrorKind::DuplicateLabel { name: name.clone() },
                        phrase.span,
                    ));
                }
            }
            PhraseKind::Cond { then, otherwise } => {
                *index += 1;
                scan_labels(vector, then, index, labels)?;
                if let Some(else_body) = otherwise {
                    *index += 1;
                    scan_labels(vector, else_body, index, labels)?;
                }
            }
            other => *index += emit_len(other),
        }
    }
    Ok(())
}

// ---- Tests ----
