//! The single reporting path for runtime failures: the `error` verb and
//! every verb-contract violation surface here as one structured value.

use std::rc::Rc;

use crate::value::Value;

/// Why an execution faulted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FaultKind {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("arithmetic fault: {reason}")]
    Arithmetic { reason: &'static str },
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("error raised: {0}")]
    User(Value),
    #[error("no vector named '{name}'")]
    UnknownVector { name: String },
}

impl FaultKind {
    pub fn mismatch(expected: &'static str, found: &Value) -> FaultKind {
        FaultKind::TypeMismatch {
            expected,
            found: found.tag(),
        }
    }
}

/// A faulted execution: the cause plus where the machine stopped. Execution
/// never resumes from a fault; recovery means re-invoking the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} in {vector} at instruction {pc}")]
pub struct Fault {
    pub kind: FaultKind,
    /// Name of the vector that was executing.
    pub vector: Rc<str>,
    /// Instruction index at which the fault was raised.
    pub pc: usize,
}
