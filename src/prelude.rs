//! Control flow as library code.
//!
//! None of these are primitives. Each one recovers its caller's
//! context, fetches the quoted phrase written immediately after its
//! own call site with `vindex`, executes it with plain `exec`, and
//! finally `seek`s the caller's resume position past the phrases it
//! consumed. The executed phrase runs against the caller's `fp`, so
//! `$`-bindings in the surrounding vector stay visible and mutable
//! inside it — a conditional or loop body behaves as if it were
//! written inline.
//!
//! A quoted phrase compiles to two cells (a load and a push), which is
//! where the seek distances come from: one operand is 2 cells, two
//! operands are 4.

/// Library source, assembled ahead of user definitions by
/// [`crate::assemble_with_prelude`].
pub const SOURCE: &str = r#"
/* cond if [then]            — run [then] when cond is truthy */
if: { ? ( caller 1 vindex exec ) seek(2) }

/* cond ifelse [then] [else] — run exactly one arm */
ifelse: { ? ( caller 1 vindex exec ) ( caller 3 vindex exec ) seek(4) }

/* while [cond] [body]       — re-evaluate [cond], run [body] while truthy */
while: { again: caller 1 vindex exec ? ( caller 3 vindex exec go(again) ) seek(4) }
"#;
