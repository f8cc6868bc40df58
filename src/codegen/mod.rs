//! Tree-walking x86-64 System V code generator. `state.rs` holds the
//! `CodeGen` struct and its low-level emit helpers; `expr.rs`/`control_flow.rs`
//! cover expression/statement codegen; `calls.rs` the calling convention;
//! `data.rs` global-variable `.data`/`.bss` emission; `program.rs` the
//! per-function prologue/epilogue and the translation-unit walk.

mod calls;
mod control_flow;
mod data;
mod expr;
mod program;
mod state;

use crate::ast::Node;
use crate::diagnostics::CResult;

pub use state::CodeGen;

/// Generates x86-64 AT&T-syntax assembly for a whole translation unit.
pub fn generate(translation_unit: &[Node]) -> CResult<String> {
    let mut gen = CodeGen::new();
    for decl in translation_unit {
        gen.emit_toplevel(decl)?;
    }
    Ok(gen.finish())
}
