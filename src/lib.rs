//! quiver — a homoiconic stack machine whose control flow is library code.
//!
//! A program is a set of named **vectors**, instruction sequences that
//! all run against one shared operand stack. Calling a vector pushes a
//! frame marker onto that same stack, and a handful of introspection
//! verbs (`caller`, `vindex`, `seek`, `exec`) let a callee read its
//! caller's code and steer where the caller resumes. There is no
//! conditional or loop primitive: `if`, `ifelse` and `while` are
//! ordinary definitions built from those verbs, shipped as source in
//! [`prelude`].
//!
//! ```text
//! double: { 2 * }
//! main:   { 0 $( acc ) 3 $( n )
//!           while [ $n 0 != ] [ $acc $n double + ->$acc $n 1 - ->$n ]
//!           $acc }
//! ```
//!
//! The pipeline is [`lexer`] → [`parser`] → [`assembler`] → [`vm`]:
//! source text lexes to tokens, parses to phrases, assembles to a
//! [`Program`] of resolved instruction vectors, and runs on the stack
//! machine. [`assemble`] and [`vm::run`] wrap the two ends:
//!
//! ```
//! let program = quiver::assemble("main: { 3 4 + }").unwrap();
//! let stack = quiver::run(&program, "main", Vec::new()).unwrap();
//! assert_eq!(stack, vec![quiver::Value::int(7)]);
//! ```

pub mod assembler;
pub mod ast;
pub mod diagnostic;
pub mod fault;
pub mod lexer;
pub mod parser;
pub mod prelude;
pub mod program;
pub mod value;
pub mod vm;

pub use fault::{Fault, FaultKind};
pub use program::{Op, Program, Vector, VectorRef};
pub use value::Value;
pub use vm::run;

use ast::SourceUnit;

/// Any error on the source-to-program path.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Assembly(#[from] assembler::AssemblyError),
}

/// Lexes and parses source text without assembling it.
pub fn parse(source: &str) -> Result<SourceUnit, CompileError> {
    let tokens = lexer::lex(source)?;
    let mut parser = parser::Parser::new(tokens);
    Ok(parser.parse_unit()?)
}

/// Compiles source text to an executable [`Program`].
pub fn assemble(source: &str) -> Result<Program, CompileError> {
    let unit = parse(source)?;
    Ok(assembler::assemble_unit(&unit)?)
}

/// Compiles source text with the control-flow prelude assembled in
/// front of it, so `if`, `ifelse` and `while` resolve as calls.
pub fn assemble_with_prelude(source: &str) -> Result<Program, CompileError> {
    let mut unit = parse(prelude::SOURCE)?;
    let user = parse(source)?;
    unit.defs.extend(user.defs);
    Ok(assembler::assemble_unit(&unit)?)
}
