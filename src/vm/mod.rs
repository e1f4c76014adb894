//! The execution engine: one operand stack, an `fp`/`pc` register pair
//! and the closed verb set of [`crate::program::Op`].
//!
//! Control transfer is the interesting part. `exec` (and named
//! invocation) pushes an opaque frame marker onto the operand stack
//! itself — the saved vector, resume position and `fp` — and every
//! value operation skips markers transparently. A callee therefore
//! works directly on its caller's operands, which is what makes a
//! quoted-then-`exec`'d vector behave exactly like the same phrases
//! written inline, and what lets library vectors implement control
//! flow by introspecting their caller (`caller`, `vindex`, `seek`).
//!
//! `fp` counts *value* cells from the stack bottom, so markers never
//! disturb a frame offset. It only changes when a vector explicitly
//! commits a boundary with the `fp` verb; `return` restores the
//! caller's.

use std::rc::Rc;

use crate::fault::{Fault, FaultKind};
use crate::program::{Op, Program, VectorRef};
use crate::value::{CallCtx, Number, Value};

/// Run `entry` from `program` with the stack seeded from `args`
/// (first argument deepest). Returns the final stack, bottom first,
/// or the fault that stopped execution.
pub fn run(program: &Program, entry: &str, args: Vec<Value>) -> Result<Vec<Value>, Fault> {
    let Some(vector) = program.get(entry) else {
        return Err(Fault {
            kind: FaultKind::UnknownVector {
                name: entry.to_owned(),
            },
            vector: Rc::from(entry),
            pc: 0,
        });
    };
    Vm::new(Rc::clone(vector), args).run()
}

// ---- Stack cells ----

/// One stack cell. Markers are structural: they are created by
/// `exec`/invoke, consumed by `return`, and invisible to everything
/// else.
#[derive(Debug, Clone)]
enum Cell {
    Value(Value),
    Marker(Marker),
}

#[derive(Debug, Clone)]
struct Marker {
    vector: VectorRef,
    resume: usize,
    fp: usize,
}

enum Flow {
    Continue,
    Halted,
}

// ---- The machine ----

/// An isolated executor: stack plus registers. Vectors are shared
/// read-only, so any number of these can run the same program.
pub struct Vm {
    stack: Vec<Cell>,
    /// Count of value cells currently on the stack.
    values: usize,
    fp: usize,
    vector: VectorRef,
    pc: usize,
}

impl Vm {
    pub fn new(entry: VectorRef, args: Vec<Value>) -> Vm {
        let values = args.len();
        Vm {
            stack: args.into_iter().map(Cell::Value).collect(),
            values,
            fp: 0,
            vector: entry,
            pc: 0,
        }
    }

    /// Drive to Halted or Faulted.
    pub fn run(&mut self) -> Result<Vec<Value>, Fault> {
        loop {
            let op = match self.vector.code().get(self.pc) {
                Some(op) => op.clone(),
                None => match self.implicit_return() {
                    Flow::Continue => continue,
                    Flow::Halted => return Ok(self.finish()),
                },
            };
            match self.step(&op) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halted) => return Ok(self.finish()),
                Err(kind) => return Err(self.fault(kind)),
            }
        }
    }

    fn fault(&self, kind: FaultKind) -> Fault {
        Fault {
            kind,
            vector: Rc::from(self.vector.name()),
            pc: self.pc,
        }
    }

    fn finish(&mut self) -> Vec<Value> {
        self.values = 0;
        self.stack
            .drain(..)
            .filter_map(|cell| match cell {
                Cell::Value(value) => Some(value),
                Cell::Marker(_) => None,
            })
            .collect()
    }

    // ---- Stack access (marker-transparent) ----

    /// Absolute stack index of the `k`-th value cell from the top.
    fn top_value_index(&self, k: usize) -> Option<usize> {
        let mut remaining = k;
        for i in (0..self.stack.len()).rev() {
            if let Cell::Value(_) = self.stack[i] {
                if remaining == 0 {
                    return Some(i);
                }
                remaining -= 1;
            }
        }
        None
    }

    /// Absolute stack index of the value cell at frame slot
    /// `fp + offset`. Slots count value cells from the stack bottom.
    fn slot_value_index(&self, offset: i64) -> Option<usize> {
        let target = (self.fp as i64).checked_add(offset)?;
        if target < 0 || target >= self.values as i64 {
            return None;
        }
        let target = target as usize;
        let mut seen = 0;
        for (i, cell) in self.stack.iter().enumerate() {
            if let Cell::Value(_) = cell {
                if seen == target {
                    return Some(i);
                }
                seen += 1;
            }
        }
        None
    }

    fn push_value(&mut self, value: Value) {
        self.stack.push(Cell::Value(value));
        self.values += 1;
    }

    fn pop_value(&mut self) -> Result<Value, FaultKind> {
        let index = self.top_value_index(0).ok_or(FaultKind::StackUnderflow)?;
        match self.stack.remove(index) {
            Cell::Value(value) => {
                self.values -= 1;
                Ok(value)
            }
            Cell::Marker(_) => unreachable!(),
        }
    }

    fn pop_number(&mut self) -> Result<Number, FaultKind> {
        let value = self.pop_value()?;
        match value {
            Value::Number(n) => Ok(n),
            other => Err(FaultKind::mismatch("number", &other)),
        }
    }

    fn value_at(&self, index: usize) -> &Value {
        match &self.stack[index] {
            Cell::Value(value) => value,
            Cell::Marker(_) => unreachable!(),
        }
    }

    /// Remove `count` value cells from the top, leaving markers in
    /// place. Callers check `count <= self.values` first.
    fn drop_values(&mut self, count: usize) {
        let mut remaining = count;
        let mut i = self.stack.len();
        while remaining > 0 && i > 0 {
            i -= 1;
            if matches!(self.stack[i], Cell::Value(_)) {
                self.stack.remove(i);
                remaining -= 1;
            }
        }
        self.values -= count;
    }

    fn innermost_marker_index(&self) -> Option<usize> {
        self.stack
            .iter()
            .rposition(|cell| matches!(cell, Cell::Marker(_)))
    }

    /// The natural frame base of the current call: the value-cell
    /// coordinate just above the innermost marker (0 at the outermost
    /// frame).
    fn frame_base(&self) -> usize {
        match self.innermost_marker_index() {
            Some(marker_at) => self.stack[..marker_at]
                .iter()
                .filter(|cell| matches!(cell, Cell::Value(_)))
                .count(),
            None => 0,
        }
    }

    /// Remove the value cell at depth `src` and require it to be an
    /// integer: the dynamic index for the indirect verbs.
    fn take_index(&mut self, src: i64) -> Result<i64, FaultKind> {
        let at = self
            .top_value_index(src as usize)
            .ok_or(FaultKind::StackUnderflow)?;
        match self.stack.remove(at) {
            Cell::Value(Value::Number(Number::Int(n))) => {
                self.values -= 1;
                Ok(n)
            }
            Cell::Value(Value::Number(Number::Float(_))) => {
                self.values -= 1;
                Err(FaultKind::TypeMismatch {
                    expected: "integer",
                    found: "float",
                })
            }
            Cell::Value(other) => {
                self.values -= 1;
                Err(FaultKind::mismatch("integer", &other))
            }
            Cell::Marker(_) => unreachable!(),
        }
    }

    /// Top-relative depth checked against the value count; the
    /// indirect verbs fault with IndexOutOfRange, not underflow.
    fn checked_depth(&self, n: i64) -> Result<usize, FaultKind> {
        if n < 0 {
            return Err(FaultKind::IndexOutOfRange {
                index: n,
                len: self.values,
            });
        }
        self.top_value_index(n as usize)
            .ok_or(FaultKind::IndexOutOfRange {
                index: n,
                len: self.values,
            })
    }

    // ---- Frames ----

    /// Enter `target` at 0, leaving a marker holding the resume state.
    /// `fp` carries over untouched.
    fn enter(&mut self, target: VectorRef) {
        let vector = std::mem::replace(&mut self.vector, target);
        self.stack.push(Cell::Marker(Marker {
            vector,
            resume: self.pc + 1,
            fp: self.fp,
        }));
        self.pc = 0;
    }

    fn restore(&mut self, marker: Marker) {
        self.vector = marker.vector;
        self.pc = marker.resume;
        self.fp = marker.fp;
    }

    fn implicit_return(&mut self) -> Flow {
        let Some(marker_at) = self.innermost_marker_index() else {
            return Flow::Halted;
        };
        match self.stack.remove(marker_at) {
            Cell::Marker(marker) => self.restore(marker),
            Cell::Value(_) => unreachable!(),
        }
        Flow::Continue
    }

    /// Explicit return: drop the `count` value cells directly below
    /// the innermost marker (the arguments this call consumed), then
    /// pop the marker and restore. In the outermost frame, halt.
    fn do_return(&mut self, count: i64) -> Result<Flow, FaultKind> {
        let Some(mut marker_at) = self.innermost_marker_index() else {
            return Ok(Flow::Halted);
        };
        let mut remaining = count as usize;
        let mut i = marker_at;
        while remaining > 0 {
            if i == 0 {
                return Err(FaultKind::StackUnderflow);
            }
            i -= 1;
            if matches!(self.stack[i], Cell::Value(_)) {
                self.stack.remove(i);
                self.values -= 1;
                marker_at -= 1;
                remaining -= 1;
            }
        }
        match self.stack.remove(marker_at) {
            Cell::Marker(marker) => self.restore(marker),
            Cell::Value(_) => unreachable!(),
        }
        Ok(Flow::Continue)
    }

    // ---- Dispatch ----

    fn step(&mut self, op: &Op) -> Result<Flow, FaultKind> {
        match op {
            Op::Push(value) => {
                self.push_value(value.clone());
                self.pc += 1;
            }
            Op::Invoke(target) => self.enter(Rc::clone(target)),
            Op::Exec => {
                let value = self.pop_value()?;
                let Value::Vector(target) = value else {
                    return Err(FaultKind::mismatch("vector", &value));
                };
                self.enter(target);
            }
            Op::Load(k) => {
                let code = self.vector.code();
                let target = self.pc + *k as usize;
                let Some(cell) = code.get(target) else {
                    return Err(FaultKind::IndexOutOfRange {
                        index: target as i64,
                        len: code.len(),
                    });
                };
                let view = cell.view();
                self.push_value(view);
                self.pc = target + 1;
            }

            Op::Dup(k) => {
                let index = self
                    .top_value_index(*k as usize)
                    .ok_or(FaultKind::StackUnderflow)?;
                let value = self.value_at(index).clone();
                self.push_value(value);
                self.pc += 1;
            }
            Op::Swap(k) => {
                let top = self.top_value_index(0).ok_or(FaultKind::StackUnderflow)?;
                let other = self
                    .top_value_index(*k as usize)
                    .ok_or(FaultKind::StackUnderflow)?;
                self.stack.swap(top, other);
                self.pc += 1;
            }
            Op::Pop(k) => {
                let count = *k as usize + 1;
                if count > self.values {
                    return Err(FaultKind::StackUnderflow);
                }
                self.drop_values(count);
                self.pc += 1;
            }

            Op::Dupv(offset) => {
                let index = self
                    .slot_value_index(*offset)
                    .ok_or(FaultKind::StackUnderflow)?;
                let value = self.value_at(index).clone();
                self.push_value(value);
                self.pc += 1;
            }
            Op::Swapv(offset) => {
                let slot = self
                    .slot_value_index(*offset)
                    .ok_or(FaultKind::StackUnderflow)?;
                let top = self.top_value_index(0).ok_or(FaultKind::StackUnderflow)?;
                self.stack.swap(slot, top);
                self.pc += 1;
            }
            Op::Popv(offset) => {
                let target = (self.fp as i64)
                    .checked_add(*offset)
                    .ok_or(FaultKind::StackUnderflow)?;
                if target < 0 || target > self.values as i64 {
                    return Err(FaultKind::StackUnderflow);
                }
                let keep = target as usize;
                let mut seen = 0;
                self.stack.retain(|cell| match cell {
                    Cell::Value(_) => {
                        seen += 1;
                        seen <= keep
                    }
                    Cell::Marker(_) => true,
                });
                self.values = keep;
                self.pc += 1;
            }

            Op::Dupi(src) => {
                let n = self.take_index(*src)?;
                let index = self.checked_depth(n)?;
                let value = self.value_at(index).clone();
                self.push_value(value);
                self.pc += 1;
            }
            Op::Swapi(src) => {
                let n = self.take_index(*src)?;
                let top = self.top_value_index(0).ok_or(FaultKind::StackUnderflow)?;
                let target = self.checked_depth(n)?;
                self.stack.swap(top, target);
                self.pc += 1;
            }
            Op::Popi(src) => {
                let n = self.take_index(*src)?;
                if n < 0 || n as usize + 1 > self.values {
                    return Err(FaultKind::IndexOutOfRange {
                        index: n,
                        len: self.values,
                    });
                }
                self.drop_values(n as usize + 1);
                self.pc += 1;
            }

            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Rem => {
                let b = self.pop_number()?;
                let a = self.pop_number()?;
                let result = arith(op, a, b)?;
                self.push_value(Value::Number(result));
                self.pc += 1;
            }
            Op::Eq | Op::Ne => {
                let b = self.pop_value()?;
                let a = self.pop_value()?;
                let equal = a.loose_eq(&b);
                let truth = if matches!(op, Op::Eq) { equal } else { !equal };
                self.push_value(Value::int(truth as i64));
                self.pc += 1;
            }

            Op::Go(rel) => self.jump(*rel)?,
            Op::Branch(rel) => {
                if self.pop_value()?.is_truthy() {
                    self.pc += 1;
                } else {
                    self.jump(*rel)?;
                }
            }
            Op::Return(count) => return self.do_return(*count),

            Op::Args(k) => {
                let marker_at = self
                    .innermost_marker_index()
                    .ok_or(FaultKind::StackUnderflow)?;
                // The count is unbounded; allocate for what the frame
                // can actually hold and let the walk underflow.
                let count = *k as usize;
                let mut picked = Vec::with_capacity(count.min(marker_at));
                let mut i = marker_at;
                while picked.len() < count {
                    if i == 0 {
                        return Err(FaultKind::StackUnderflow);
                    }
                    i -= 1;
                    if let Cell::Value(value) = &self.stack[i] {
                        picked.push(value.clone());
                    }
                }
                for value in picked.into_iter().rev() {
                    self.push_value(value);
                }
                self.pc += 1;
            }
            Op::Fp => {
                let value = self.pop_value()?;
                match value {
                    Value::Number(Number::Int(n)) => {
                        if n < 0 || n > self.values as i64 {
                            return Err(FaultKind::IndexOutOfRange {
                                index: n,
                                len: self.values,
                            });
                        }
                        self.fp = n as usize;
                    }
                    Value::Ctx(_) => self.fp = self.frame_base(),
                    Value::Number(Number::Float(_)) => {
                        return Err(FaultKind::TypeMismatch {
                            expected: "integer or context",
                            found: "float",
                        });
                    }
                    other => return Err(FaultKind::mismatch("integer or context", &other)),
                }
                self.pc += 1;
            }
            Op::Caller => {
                let marker_at = self
                    .innermost_marker_index()
                    .ok_or(FaultKind::StackUnderflow)?;
                let Cell::Marker(marker) = &self.stack[marker_at] else {
                    unreachable!()
                };
                let ctx = CallCtx {
                    vector: Rc::clone(&marker.vector),
                    resume: marker.resume,
                    fp: marker.fp,
                };
                self.push_value(Value::Ctx(ctx));
                self.pc += 1;
            }
            Op::Seek(offset) => {
                let marker_at = self
                    .innermost_marker_index()
                    .ok_or(FaultKind::StackUnderflow)?;
                let Cell::Marker(marker) = &mut self.stack[marker_at] else {
                    unreachable!()
                };
                // Saturates high: a resume past the end is an implicit
                // return at the next fetch, however far past.
                let resume = (marker.resume as i64).saturating_add(*offset);
                if resume < 0 {
                    return Err(FaultKind::IndexOutOfRange {
                        index: resume,
                        len: marker.vector.code().len(),
                    });
                }
                marker.resume = resume as usize;
                self.pc += 1;
            }
            Op::Vindex => {
                let index = self.pop_value()?;
                let n = match index {
                    Value::Number(Number::Int(n)) => n,
                    Value::Number(Number::Float(_)) => {
                        return Err(FaultKind::TypeMismatch {
                            expected: "integer",
                            found: "float",
                        });
                    }
                    other => return Err(FaultKind::mismatch("integer", &other)),
                };
                let target = self.pop_value()?;
                let view = match target {
                    Value::Vector(vector) => indexed_view(&vector, n)?,
                    // Caller introspection: 0 is the next instruction
                    // the caller will run.
                    Value::Ctx(ctx) => {
                        indexed_view(&ctx.vector, (ctx.resume as i64).saturating_add(n))?
                    }
                    other => return Err(FaultKind::mismatch("vector or context", &other)),
                };
                self.push_value(view);
                self.pc += 1;
            }
            Op::Error => {
                let value = self.pop_value()?;
                return Err(FaultKind::User(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn jump(&mut self, rel: i64) -> Result<(), FaultKind> {
        let target = (self.pc as i64).saturating_add(rel);
        if target < 0 {
            return Err(FaultKind::IndexOutOfRange {
                index: target,
                len: self.vector.code().len(),
            });
        }
        // Past the end is fine: the next fetch performs an implicit
        // return.
        self.pc = target as usize;
        Ok(())
    }
}

fn indexed_view(vector: &VectorRef, index: i64) -> Result<Value, FaultKind> {
    let code = vector.code();
    if index < 0 || index >= code.len() as i64 {
        return Err(FaultKind::IndexOutOfRange {
            index,
            len: code.len(),
        });
    }
    Ok(code[index as usize].view())
}

// ---- Arithmetic ----

fn arith(op: &Op, a: Number, b: Number) -> Result<Number, FaultKind> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int_arith(op, x, y),
        (a, b) => float_arith(op, a.as_f64(), b.as_f64()),
    }
}

fn int_arith(op: &Op, x: i64, y: i64) -> Result<Number, FaultKind> {
    let result = match op {
        Op::Add => x.checked_add(y),
        Op::Sub => x.checked_sub(y),
        Op::Mul => x.checked_mul(y),
        Op::Div => {
            if y == 0 {
                return Err(FaultKind::Arithmetic {
                    reason: "division by zero",
                });
            }
            x.checked_div(y)
        }
        Op::Rem => {
            if y == 0 {
                return Err(FaultKind::Arithmetic {
                    reason: "modulo by zero",
                });
            }
            x.checked_rem(y)
        }
        _ => unreachable!(),
    };
    result.map(Number::Int).ok_or(FaultKind::Arithmetic {
        reason: "integer overflow",
    })
}

fn float_arith(op: &Op, x: f64, y: f64) -> Result<Number, FaultKind> {
    if y == 0.0 && matches!(op, Op::Div | Op::Rem) {
        return Err(FaultKind::Arithmetic {
            reason: if matches!(op, Op::Div) {
                "division by zero"
            } else {
                "modulo by zero"
            },
        });
    }
    let value = match op {
        Op::Add => x + y,
        Op::Sub => x - y,
        Op::Mul => x * y,
        Op::Div => x / y,
        Op::Rem => x % y,
        _ => unreachable!(),
    };
    Ok(Number::Float(value))
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble_unit;
    use crate::lexer::lex;
    use crate::parser::Parser;

    fn program(source: &str) -> Program {
        let unit = Parser::new(lex(source).unwrap()).parse_unit().unwrap();
        assemble_unit(&unit).unwrap()
    }

    fn eval(source: &str) -> Vec<Value> {
        run(&program(source), "main", Vec::new()).unwrap()
    }

    fn eval_fault(source: &str) -> Fault {
        run(&program(source), "main", Vec::new()).unwrap_err()
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::int).collect()
    }

    #[test]
    fn arithmetic_chains_left_to_right() {
        assert_eq!(eval("main: { 3 4 + 2 * 14 == }"), ints(&[1]));
        assert_eq!(eval("main: { 10 4 - }"), ints(&[6]));
        assert_eq!(eval("main: { 7 2 / 7 2 % }"), ints(&[3, 1]));
    }

    #[test]
    fn any_float_operand_promotes() {
        assert_eq!(eval("main: { 1 2.5 + }"), vec![Value::float(3.5)]);
        assert_eq!(eval("main: { 7.0 2 / }"), vec![Value::float(3.5)]);
    }

    #[test]
    fn comparison_is_loose_across_numbers() {
        assert_eq!(eval("main: { 5 5.0 == }"), ints(&[1]));
        assert_eq!(eval("main: { \"a\" \"a\" == \"a\" 1 != }"), ints(&[1, 1]));
    }

    #[test]
    fn zero_divisors_fault() {
        for source in ["main: { 1 0 / }", "main: { 1 0 % }", "main: { 1.0 0.0 / }"] {
            let fault = eval_fault(source);
            assert!(
                matches!(fault.kind, FaultKind::Arithmetic { .. }),
                "{source} gave {fault:?}"
            );
        }
    }

    #[test]
    fn integer_overflow_faults() {
        let fault = eval_fault("main: { 9223372036854775807 1 + }");
        assert_eq!(
            fault.kind,
            FaultKind::Arithmetic {
                reason: "integer overflow"
            }
        );
    }

    #[test]
    fn branch_jumps_on_falsy_only() {
        assert_eq!(eval("main: { \"\" branch(skip) 1 skip: 2 }"), ints(&[2]));
        assert_eq!(eval("main: { \"x\" branch(skip) 1 skip: 2 }"), ints(&[1, 2]));
    }

    #[test]
    fn loop_counts_to_five() {
        let source = "main: { 0 $(x) start: $x 1 + swapv(0) pop $x 5 == branch(start) }";
        assert_eq!(eval(source), ints(&[5]));
    }

    #[test]
    fn conditional_selects_an_arm() {
        assert_eq!(eval("main: { 1 ? ( 10 ) ( 20 ) }"), ints(&[10]));
        assert_eq!(eval("main: { 0 ? ( 10 ) ( 20 ) }"), ints(&[20]));
    }

    #[test]
    fn quoted_exec_equals_inline() {
        assert_eq!(eval("main: { 3 4 { + } }"), ints(&[7]));
        assert_eq!(eval("main: { 3 4 [ + ] exec }"), ints(&[7]));
    }

    #[test]
    fn callee_reaches_caller_operands_through_the_marker() {
        // dup and + act on main's values across the frame marker.
        assert_eq!(eval("double: { dup + } main: { 21 double }"), ints(&[42]));
    }

    #[test]
    fn recursion_terminates() {
        let source = "fact: { dup 0 == ? ( pop 1 ) ( dup 1 - fact * ) } \
                      main: { 5 fact }";
        assert_eq!(eval(source), ints(&[120]));
    }

    #[test]
    fn args_copies_parent_operands_in_order() {
        let source = "pair: { args(2) } main: { 1 2 pair }";
        assert_eq!(eval(source), ints(&[1, 2, 1, 2]));
    }

    #[test]
    fn args_beyond_the_parent_frame_underflows() {
        let fault = eval_fault("grab: { args(4000000000000000000) } main: { grab }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
        assert_eq!(&*fault.vector, "grab");

        let fault = eval_fault("pair: { args(3) } main: { 1 2 pair }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
    }

    #[test]
    fn return_drops_consumed_arguments() {
        let source = "add2: { caller fp args(2) + return(2) } main: { 3 4 add2 }";
        assert_eq!(eval(source), ints(&[7]));
    }

    #[test]
    fn return_keeps_results_above_the_marker() {
        let source = "keep: { args return(1) } main: { 10 20 keep }";
        assert_eq!(eval(source), ints(&[10, 20]));
    }

    #[test]
    fn explicit_return_in_outermost_frame_halts() {
        assert_eq!(eval("main: { 1 return 2 }"), ints(&[1]));
    }

    #[test]
    fn fp_commits_a_numeric_frame_base() {
        assert_eq!(eval("main: { 1 2 3 2 fp dupv }"), ints(&[1, 2, 3, 3]));
    }

    #[test]
    fn fp_bounds_are_checked() {
        let fault = eval_fault("main: { 5 fp }");
        assert!(matches!(fault.kind, FaultKind::IndexOutOfRange { .. }));
    }

    #[test]
    fn fp_accepts_a_context_as_the_natural_base() {
        let source = "sub: { caller fp 5 dupv } main: { 8 9 sub }";
        assert_eq!(eval(source), ints(&[8, 9, 5, 5]));
    }

    #[test]
    fn caller_snapshots_the_innermost_marker() {
        let result = eval("probe: { caller } main: { probe }");
        assert_eq!(result.len(), 1);
        let Value::Ctx(ctx) = &result[0] else {
            panic!("expected a context, got {:?}", result[0]);
        };
        assert_eq!(ctx.vector.name(), "main");
        assert_eq!(ctx.resume, 1);
        assert_eq!(ctx.fp, 0);
    }

    #[test]
    fn caller_in_the_outermost_frame_underflows() {
        let fault = eval_fault("main: { caller }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
    }

    #[test]
    fn seek_skips_the_callers_next_instruction() {
        assert_eq!(eval("skipper: { seek } main: { skipper 99 }"), ints(&[]));
        assert_eq!(
            eval("skipper: { seek } main: { skipper 99 7 }"),
            ints(&[7])
        );
    }

    #[test]
    fn seek_far_past_the_end_is_an_implicit_return() {
        let source = "skipper: { seek(9223372036854775807) } main: { skipper 1 2 }";
        assert_eq!(eval(source), ints(&[]));
    }

    #[test]
    fn vindex_reads_caller_code_relative_to_resume() {
        let source = "peek: { caller 0 vindex } main: { peek 7 }";
        assert_eq!(eval(source), ints(&[7, 7]));
    }

    #[test]
    fn vindex_reads_a_vector_absolutely() {
        assert_eq!(eval("main: { [ 5 ] 0 vindex }"), ints(&[5]));
    }

    #[test]
    fn vindex_views_verb_cells_as_symbols() {
        let result = eval("main: { [ dup ] 0 vindex }");
        assert_eq!(result, vec![Value::Symbol(Rc::from("dup"))]);
    }

    #[test]
    fn vindex_out_of_range_faults() {
        let fault = eval_fault("main: { [ 5 ] 3 vindex }");
        assert_eq!(
            fault.kind,
            FaultKind::IndexOutOfRange { index: 3, len: 1 }
        );
        let source = "peek: { caller 9223372036854775807 vindex } main: { peek 7 }";
        let fault = eval_fault(source);
        assert!(matches!(fault.kind, FaultKind::IndexOutOfRange { .. }));
    }

    #[test]
    fn load_pushes_without_executing() {
        // load(1) views the next cell and resumes past it.
        assert_eq!(eval("main: { load(2) 8 9 }"), ints(&[9]));
    }

    #[test]
    fn popv_truncates_the_frame_markers_survive() {
        let source = "trunc: { popv(1) } main: { 1 2 3 trunc 9 }";
        assert_eq!(eval(source), ints(&[1, 9]));
    }

    #[test]
    fn popv_past_the_frame_underflows() {
        let fault = eval_fault("main: { popv(5) }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
    }

    #[test]
    fn extreme_frame_offsets_underflow() {
        let fault = eval_fault("main: { 1 1 fp dupv(9223372036854775807) }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
        let fault = eval_fault("main: { 1 1 fp popv(9223372036854775807) }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
    }

    #[test]
    fn indirect_verbs_pop_their_index() {
        assert_eq!(eval("main: { 10 20 1 dupi }"), ints(&[10, 20, 10]));
        assert_eq!(eval("main: { 10 20 1 swapi }"), ints(&[20, 10]));
        assert_eq!(eval("main: { 10 20 30 1 popi }"), ints(&[10]));
    }

    #[test]
    fn indirect_index_must_be_an_integer() {
        let fault = eval_fault("main: { 10 [ 1 ] popi }");
        assert!(matches!(fault.kind, FaultKind::TypeMismatch { .. }));
    }

    #[test]
    fn indirect_index_out_of_range() {
        let fault = eval_fault("main: { 10 -1 dupi }");
        assert!(matches!(fault.kind, FaultKind::IndexOutOfRange { .. }));
        let fault = eval_fault("main: { 10 9 dupi }");
        assert!(matches!(fault.kind, FaultKind::IndexOutOfRange { .. }));
    }

    #[test]
    fn swap_exchanges_at_depth() {
        assert_eq!(eval("main: { 1 2 3 swap(2) }"), ints(&[3, 2, 1]));
    }

    #[test]
    fn pop_removes_through_the_index() {
        assert_eq!(eval("main: { 1 2 3 pop(1) }"), ints(&[1]));
    }

    #[test]
    fn underflow_faults_carry_position() {
        let fault = eval_fault("main: { 1 pop pop }");
        assert_eq!(fault.kind, FaultKind::StackUnderflow);
        assert_eq!(&*fault.vector, "main");
        assert_eq!(fault.pc, 2);
    }

    #[test]
    fn exec_requires_a_vector() {
        let fault = eval_fault("main: { 1 exec }");
        assert_eq!(
            fault.kind,
            FaultKind::TypeMismatch {
                expected: "vector",
                found: "number"
            }
        );
    }

    #[test]
    fn exec_rejects_a_context() {
        let fault = eval_fault("t: { caller exec } main: { t }");
        assert_eq!(
            fault.kind,
            FaultKind::TypeMismatch {
                expected: "vector",
                found: "context"
            }
        );
    }

    #[test]
    fn user_error_carries_the_value() {
        let fault = eval_fault("main: { \"boom\" error }");
        assert_eq!(fault.kind, FaultKind::User(Value::str("boom")));
        assert_eq!(fault.pc, 1);
    }

    #[test]
    fn negative_jump_target_faults() {
        let fault = eval_fault("main: { 0 branch(-5) }");
        assert!(matches!(fault.kind, FaultKind::IndexOutOfRange { .. }));
    }

    #[test]
    fn jump_past_the_end_halts() {
        assert_eq!(eval("main: { 1 go(10) 2 }"), ints(&[1]));
        assert_eq!(eval("main: { 1 go(9223372036854775807) 2 }"), ints(&[1]));
    }

    #[test]
    fn unknown_entry_faults() {
        let fault = run(&program("main: { 1 }"), "nope", Vec::new()).unwrap_err();
        assert_eq!(
            fault.kind,
            FaultKind::UnknownVector {
                name: "nope".to_owned()
            }
        );
    }

    #[test]
    fn seeded_arguments_are_on_the_stack() {
        let result = run(
            &program("main: { + }"),
            "main",
            vec![Value::int(2), Value::int(3)],
        )
        .unwrap();
        assert_eq!(result, ints(&[5]));
    }

    #[test]
    fn empty_entry_halts_empty() {
        assert_eq!(eval("main: { }"), ints(&[]));
    }
}
