//! Top-level driver: function prologue/epilogue and the translation-unit
//! walk over `FuncDef`/`GlobalDecl`. Ported from 8cc's `emit_toplevel`,
//! `emit_func_prologue`, and `emit_regsave_area`, adapted to this crate's
//! parser-assigned (not codegen-assigned) `LocalVar.loff` values: the
//! parser hands out frame offsets as if no register-save area existed, and
//! `CodeGen::frame_shift` (set here, once per function) corrects for that
//! at every access via `local_offset`.

use crate::ast::{Node, NodeKind};
use crate::diagnostics::{CResult, Diagnostic};
use crate::types::Ctype;

use super::state::{CodeGen, REGAREA_SIZE, REGS};

impl CodeGen {
    /// Emits one top-level declaration: a function definition or a (possibly
    /// comma-grouped, hence the `Compound` wrapper) set of global variables.
    pub fn emit_toplevel(&mut self, node: &Node) -> CResult<()> {
        match &node.kind {
            NodeKind::FuncDef { .. } => self.emit_funcdef(node),
            NodeKind::GlobalDecl { label, init, is_static, .. } => {
                self.emit_global_decl(&node.ctype, label, init, *is_static)
            }
            NodeKind::Compound(decls) => {
                for d in decls {
                    self.emit_toplevel(d)?;
                }
                Ok(())
            }
            other => Err(Diagnostic::internal(format!(
                "not a top-level declaration: {other:?}"
            ))),
        }
    }

    fn emit_funcdef(&mut self, node: &Node) -> CResult<()> {
        let (name, params, locals, body, is_static) = match &node.kind {
            NodeKind::FuncDef { name, params, locals, body, is_static } => {
                (name, params, locals, body, *is_static)
            }
            _ => return Err(Diagnostic::internal("emit_funcdef called on a non-function node")),
        };
        let has_varargs = matches!(&node.ctype, Ctype::Func { has_varargs: true, .. });

        self.stackpos = 0;
        self.lbreak = None;
        self.lcontinue = None;
        self.frame_shift = 0;
        self.numgp = 0;
        self.numfp = 0;

        self.emit_noindent(".text")?;
        if !is_static {
            self.emit_noindent(format!(".global {name}"))?;
        }
        self.emit_noindent(format!("{name}:"))?;
        self.emit("nop")?;
        self.emit("push %rbp")?;
        self.emit("mov %rsp, %rbp")?;

        if has_varargs {
            self.numgp = params.iter().filter(|p| !p.ctype.is_flotype()).count();
            self.numfp = params.iter().filter(|p| p.ctype.is_flotype()).count();
            self.emit_regsave_area()?;
            self.frame_shift = REGAREA_SIZE;
        }

        self.spill_params(params)?;

        let min_loff = params
            .iter()
            .chain(locals.iter())
            .filter_map(|n| match &n.kind {
                NodeKind::LocalVar { loff, .. } => Some(*loff),
                _ => None,
            })
            .min()
            .unwrap_or(0);
        if min_loff < 0 {
            self.emit(format!("sub ${}, %rsp", -min_loff))?;
        }

        self.emit_stmt(body)?;
        self.emit("leave")?;
        self.emit("ret")
    }

    /// Stores each incoming argument register into the parameter's stack
    /// home. Always stores the full register width (the same convention
    /// 8cc's own `push(REGS[i])`/`push_xmm` use) — a narrower declared type
    /// is read back correctly later via `emit_lload`'s sign-extending load.
    fn spill_params(&mut self, params: &[Node]) -> CResult<()> {
        let mut ireg = 0usize;
        let mut freg = 0u32;
        for p in params {
            let loff = match &p.kind {
                NodeKind::LocalVar { loff, .. } => *loff,
                _ => return Err(Diagnostic::internal("function parameter is not a local variable")),
            };
            let off = self.local_offset(loff);
            if p.ctype.is_flotype() {
                self.emit(format!("movsd %xmm{freg}, {off}(%rbp)"))?;
                freg += 1;
            } else {
                if ireg >= REGS.len() {
                    return Err(Diagnostic::internal("too many integer/pointer parameters (max 6 supported)"));
                }
                self.emit(format!("mov %{}, {off}(%rbp)", REGS[ireg]))?;
                ireg += 1;
            }
        }
        Ok(())
    }

    /// Spills all six integer argument registers and (conditionally, per
    /// `%al`'s SysV vector-register count) up to sixteen `xmm` registers
    /// into the fixed `-REGAREA_SIZE(%rbp)` area `va_start`/`va_arg` read
    /// through. Over-allocates xmm slots exactly as 8cc does; real callers
    /// never pass more than 8 floating-point arguments.
    fn emit_regsave_area(&mut self) -> CResult<()> {
        self.emit(format!("sub ${REGAREA_SIZE}, %rsp"))?;
        let mut pos = -REGAREA_SIZE;
        for reg in REGS {
            self.emit(format!("mov %{reg}, {pos}(%rbp)"))?;
            pos += 8;
        }
        let end = self.make_label();
        for i in 0..16u32 {
            self.emit("test %al, %al")?;
            self.emit(format!("jz {end}"))?;
            self.emit(format!("movsd %xmm{i}, {pos}(%rbp)"))?;
            pos += 16;
        }
        self.emit_label(&end)
    }
}
