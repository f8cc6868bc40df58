//! Function-call codegen: argument classification into the System V AMD64
//! integer/SSE registers, the varargs `%eax` = float-argument-count
//! convention, 16-byte call-site stack alignment, and direct vs. indirect
//! dispatch. Ported from 8cc's `emit_func_call`, split here into direct
//! (`FuncCall`, a named callee) and indirect (`FuncPtrCall`, a
//! pointer-valued callee) paths that share the argument-passing core.

use crate::ast::Node;
use crate::diagnostics::{CResult, Diagnostic};
use crate::types::Ctype;

use super::state::{CodeGen, REGS};

impl CodeGen {
    /// Evaluates every argument left-to-right and pushes it (xmm values via
    /// `push_xmm`, everything else via `push`), so evaluation order matches
    /// C's unspecified-but-conventional left-to-right and any side effects
    /// in earlier arguments run before later ones are computed.
    fn push_call_args(&mut self, args: &[Node]) -> CResult<()> {
        for arg in args {
            self.emit_expr(arg)?;
            if arg.ctype.is_flotype() {
                self.push_xmm(0)?;
            } else {
                self.push("rax")?;
            }
        }
        Ok(())
    }

    /// Pops the pushed arguments into their ABI registers, in reverse (the
    /// last-pushed argument is on top of the stack), returning the number
    /// of floating-point arguments for the variadic `%eax` convention.
    fn pop_call_args(&mut self, args: &[Node]) -> CResult<usize> {
        let is_float: Vec<bool> = args.iter().map(|a| a.ctype.is_flotype()).collect();
        let nint = is_float.iter().filter(|f| !**f).count();
        let nfloat = is_float.iter().filter(|f| **f).count();
        if nint > REGS.len() {
            return Err(Diagnostic::internal(
                "too many integer/pointer arguments for a single call (max 6 supported)",
            ));
        }
        if nfloat > 8 {
            return Err(Diagnostic::internal(
                "too many floating-point arguments for a single call (max 8 supported)",
            ));
        }
        let mut ireg = nint;
        let mut freg = nfloat;
        for float in is_float.iter().rev() {
            if *float {
                freg -= 1;
                self.pop_xmm(freg as u32)?;
            } else {
                ireg -= 1;
                self.pop(REGS[ireg])?;
            }
        }
        Ok(nfloat)
    }

    /// Pads `%rsp` by 8 bytes when the call site isn't 16-byte aligned,
    /// returning whether padding was emitted so the caller can undo it.
    fn align_call_stack(&mut self) -> CResult<bool> {
        if self.stackpos % 16 != 0 {
            self.emit("sub $8, %rsp")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn restore_call_stack(&mut self, padded: bool) -> CResult<()> {
        if padded {
            self.emit("add $8, %rsp")
        } else {
            Ok(())
        }
    }

    /// The ABI returns a `float` in `%xmm0` at its native 32-bit width;
    /// widen it to the double-in-`%xmm0` convention every other float-typed
    /// value in this codegen uses. `double`/`long double` need nothing.
    fn convert_call_result(&mut self, return_type: &Ctype) -> CResult<()> {
        if matches!(return_type, Ctype::Float) {
            self.emit("cvtps2pd %xmm0, %xmm0")?;
        }
        Ok(())
    }

    pub(super) fn emit_direct_call(&mut self, name: &str, func_ctype: &Ctype, args: &[Node]) -> CResult<()> {
        let (return_type, variadic) = match func_ctype {
            Ctype::Func { return_type, has_varargs, .. } => (return_type.as_ref(), *has_varargs),
            _ => return Err(Diagnostic::internal("call target is not a function type")),
        };
        self.push_call_args(args)?;
        let nfloat = self.pop_call_args(args)?;
        let padded = self.align_call_stack()?;
        if variadic {
            self.emit(format!("mov ${nfloat}, %eax"))?;
        }
        self.emit(format!("call {name}"))?;
        self.restore_call_stack(padded)?;
        self.convert_call_result(return_type)
    }

    fn callee_func_parts<'a>(&self, ctype: &'a Ctype) -> CResult<(&'a Ctype, bool)> {
        let func = match ctype {
            Ctype::Func { .. } => ctype,
            Ctype::Ptr(inner) => inner.as_ref(),
            _ => return Err(Diagnostic::internal("indirect call target is not a function pointer")),
        };
        match func {
            Ctype::Func { return_type, has_varargs, .. } => Ok((return_type.as_ref(), *has_varargs)),
            _ => Err(Diagnostic::internal("indirect call target is not a function pointer")),
        }
    }

    pub(super) fn emit_indirect_call(&mut self, callee: &Node, args: &[Node]) -> CResult<()> {
        let (return_type, variadic) = self.callee_func_parts(&callee.ctype)?;
        self.push_call_args(args)?;
        let nfloat = self.pop_call_args(args)?;
        // Evaluate the callee pointer last, after argument registers are
        // already final, and stash it in the callee-saved %rbx so it
        // survives the stack-alignment padding below. %rbx is the caller's
        // to preserve across our own return, so save/restore it around the
        // borrow rather than clobbering it outright.
        self.emit_expr(callee)?;
        self.push("rbx")?;
        self.emit("mov %rax, %rbx")?;
        let padded = self.align_call_stack()?;
        if variadic {
            self.emit(format!("mov ${nfloat}, %eax"))?;
        }
        self.emit("call *%rbx")?;
        self.restore_call_stack(padded)?;
        self.pop("rbx")?;
        self.convert_call_result(return_type)
    }
}
