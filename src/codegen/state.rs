//! CodeGen state and the low-level instruction-emission helpers every other
//! codegen module is built on.

use std::fmt::Write as _;

use crate::diagnostics::{CResult, Diagnostic};
use crate::types::Ctype;
use crate::util::LabelGen;

/// Integer argument registers in System V AMD64 calling-convention order.
pub(super) const REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// Bytes reserved below `%rbp` for a variadic function's register-save area:
/// six 8-byte GP slots plus sixteen 16-byte xmm slots (`va_arg` only ever reads
/// through this area — see DESIGN.md for the overflow-area limitation).
pub(super) const REGAREA_SIZE: i32 = 304;

pub struct CodeGen {
    pub(super) output: String,
    /// Float/double and string-literal `.data` blocks, collected as they're
    /// first referenced and appended after `.text` in `finish()` — keeps
    /// instruction emission from having to switch sections mid-stream.
    pub(super) rodata: String,
    pub(super) labels: LabelGen,
    pub(super) lbreak: Option<String>,
    pub(super) lcontinue: Option<String>,
    /// Running count of bytes pushed onto the real stack since function
    /// entry, used only to decide whether a call site needs an extra 8-byte
    /// pad to keep `%rsp` 16-byte aligned at the `call` instruction.
    pub(super) stackpos: i32,
    pub(super) numgp: usize,
    pub(super) numfp: usize,
    /// Extra distance below `%rbp` every local/parameter offset must be
    /// shifted by, because the parser hands out `loff` values starting at
    /// `-8` without knowing whether the enclosing function reserves a
    /// register-save area. Zero for non-variadic functions.
    pub(super) frame_shift: i32,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            output: String::new(),
            rodata: String::new(),
            labels: LabelGen::new(),
            lbreak: None,
            lcontinue: None,
            stackpos: 0,
            numgp: 0,
            numfp: 0,
            frame_shift: 0,
        }
    }

    pub fn finish(mut self) -> String {
        if !self.rodata.is_empty() {
            self.output.push_str("\t.data\n");
            self.output.push_str(&self.rodata);
            self.output.push_str("\t.text\n");
        }
        self.output
    }

    pub(super) fn make_label(&mut self) -> String {
        self.labels.make_label()
    }

    pub(super) fn local_offset(&self, loff: i32) -> i32 {
        loff - self.frame_shift
    }

    pub(super) fn emit(&mut self, line: impl AsRef<str>) -> CResult<()> {
        writeln!(self.output, "\t{}", line.as_ref())?;
        Ok(())
    }

    pub(super) fn emit_noindent(&mut self, line: impl AsRef<str>) -> CResult<()> {
        writeln!(self.output, "{}", line.as_ref())?;
        Ok(())
    }

    pub(super) fn emit_label(&mut self, label: &str) -> CResult<()> {
        writeln!(self.output, "{label}:")?;
        Ok(())
    }

    pub(super) fn emit_jmp(&mut self, label: &str) -> CResult<()> {
        self.emit(format!("jmp {label}"))
    }

    /// Test `%rax` against zero and jump to `label` when it's zero — the
    /// shared "pop a boolean, branch if false" pattern for if/ternary/loops.
    pub(super) fn emit_je(&mut self, label: &str) -> CResult<()> {
        self.emit("test %rax, %rax")?;
        self.emit(format!("je {label}"))
    }

    pub(super) fn push(&mut self, reg: &str) -> CResult<()> {
        self.emit(format!("push %{reg}"))?;
        self.stackpos += 8;
        Ok(())
    }

    pub(super) fn pop(&mut self, reg: &str) -> CResult<()> {
        self.emit(format!("pop %{reg}"))?;
        self.stackpos -= 8;
        if self.stackpos < 0 {
            return Err(Diagnostic::internal("stack position went negative"));
        }
        Ok(())
    }

    pub(super) fn push_xmm(&mut self, reg: u32) -> CResult<()> {
        self.emit("sub $8, %rsp")?;
        self.emit(format!("movsd %xmm{reg}, (%rsp)"))?;
        self.stackpos += 8;
        Ok(())
    }

    pub(super) fn pop_xmm(&mut self, reg: u32) -> CResult<()> {
        self.emit(format!("movsd (%rsp), %xmm{reg}"))?;
        self.emit("add $8, %rsp")?;
        self.stackpos -= 8;
        if self.stackpos < 0 {
            return Err(Diagnostic::internal("stack position went negative"));
        }
        Ok(())
    }

    /// `%rax`/`%rcx` sized to `ctype`'s width, for instructions that must
    /// name the register at the operand's own size (stores, comparisons).
    pub(super) fn int_reg(&self, ctype: &Ctype, which: char) -> CResult<&'static str> {
        debug_assert!(which == 'a' || which == 'c');
        Ok(match (ctype.size(), which) {
            (1, 'a') => "al",
            (1, _) => "cl",
            (2, 'a') => "ax",
            (2, _) => "cx",
            (4, 'a') => "eax",
            (4, _) => "ecx",
            (8, 'a') => "rax",
            (8, _) => "rcx",
            (n, _) => {
                return Err(Diagnostic::internal(format!("unknown data size {n}")));
            }
        })
    }

    /// Sign-extending load instruction for a value of `ctype`'s width into a
    /// 64-bit register (8cc's `get_load_inst`).
    pub(super) fn load_inst(&self, ctype: &Ctype) -> CResult<&'static str> {
        Ok(match ctype.size() {
            1 => "movsbq",
            2 => "movswq",
            4 => "movslq",
            8 => "mov",
            n => return Err(Diagnostic::internal(format!("unknown data size {n}"))),
        })
    }
}
