//! Expression codegen: literals, variable loads/stores, unary and binary
//! operators, assignment (including struct-copy and compound assignment),
//! conversions, the ternary/comma operators, struct-member access, and the
//! varargs builtins. Ported concept-for-concept from 8cc's `gen.c`
//! (`emit_gload`/`emit_lload`/`emit_gsave`/`emit_lsave`, `emit_binop`,
//! `emit_func_call`'s sibling `emit_assign`/`emit_copy_struct`, and the
//! `va_start`/`va_arg` register-save-area readers), generalized to this
//! crate's flattened `StructRef.offset` and eagerly-assigned `LocalVar.loff`.

use std::cell::RefCell;
use std::fmt::Write as _;

use crate::ast::{BinOp, Node, NodeKind, UnOp};
use crate::diagnostics::{CResult, Diagnostic};
use crate::token::Encoding;
use crate::types::Ctype;

use super::state::{CodeGen, REGAREA_SIZE};

fn pointee_size(ctype: &Ctype) -> CResult<u32> {
    match ctype {
        Ctype::Ptr(inner) => Ok(inner.size().max(1)),
        _ => Err(Diagnostic::internal(
            "pointer-arithmetic scale requested on a non-pointer type",
        )),
    }
}

impl CodeGen {
    pub(super) fn emit_expr(&mut self, node: &Node) -> CResult<()> {
        match &node.kind {
            NodeKind::IntLit(v) => self.emit_int_lit(*v),
            NodeKind::FloatLit { value, label } => self.emit_float_lit(*value, label),
            NodeKind::StrLit { value, encoding, label } => self.emit_str_lit(value, *encoding, label),
            NodeKind::LocalVar { loff, .. } => self.emit_lvar(&node.ctype, *loff),
            NodeKind::GlobalVar { label, .. } => self.emit_gvar(&node.ctype, label),
            NodeKind::Unary { op, operand } => self.emit_unary(node, *op, operand),
            NodeKind::Binary { op, left, right } => self.emit_binop(node, *op, left, right),
            NodeKind::Assign { target, value } => self.emit_assign(target, value),
            NodeKind::CompoundAssign { op, target, value } => {
                self.emit_compound_assign(*op, target, value)
            }
            NodeKind::Cast(inner) | NodeKind::Conv(inner) => {
                self.emit_expr(inner)?;
                self.emit_load_convert(&node.ctype, &inner.ctype)
            }
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.emit_ternary_expr(cond, then_expr, Some(else_expr))
            }
            NodeKind::Comma(a, b) => {
                self.emit_expr(a)?;
                self.emit_expr(b)
            }
            NodeKind::FuncCall { name, func_ctype, args } => {
                self.emit_direct_call(name, func_ctype, args)
            }
            NodeKind::FuncPtrCall { callee, args } => self.emit_indirect_call(callee, args),
            NodeKind::StructRef { .. } => self.emit_load_struct_ref(node),
            NodeKind::VaStart(ap) => self.emit_va_start(ap),
            NodeKind::VaArg(ap) => self.emit_va_arg(node, ap),
            NodeKind::VaEnd(_) => Ok(()),
            other => Err(Diagnostic::internal(format!(
                "node kind is not an expression: {other:?}"
            ))),
        }
    }

    // ---- literals -----------------------------------------------------

    fn emit_int_lit(&mut self, value: i64) -> CResult<()> {
        if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.emit(format!("mov ${value}, %rax"))
        } else {
            self.emit(format!("movabs ${value}, %rax"))
        }
    }

    fn float_label(&mut self, value: f64, cell: &RefCell<Option<String>>) -> CResult<String> {
        if let Some(l) = cell.borrow().clone() {
            return Ok(l);
        }
        let label = self.make_label();
        writeln!(self.rodata, "\t.align 8")?;
        writeln!(self.rodata, "{label}:")?;
        writeln!(self.rodata, "\t.quad {}", value.to_bits())?;
        *cell.borrow_mut() = Some(label.clone());
        Ok(label)
    }

    fn emit_float_lit(&mut self, value: f64, cell: &RefCell<Option<String>>) -> CResult<()> {
        let label = self.float_label(value, cell)?;
        self.emit(format!("movsd {label}(%rip), %xmm0"))
    }

    pub(super) fn string_label(
        &mut self,
        value: &str,
        encoding: Encoding,
        cell: &RefCell<Option<String>>,
    ) -> CResult<String> {
        if let Some(l) = cell.borrow().clone() {
            return Ok(l);
        }
        let label = self.make_label();
        writeln!(self.rodata, "{label}:")?;
        match encoding {
            Encoding::None | Encoding::Utf8 => {
                for b in value.bytes() {
                    writeln!(self.rodata, "\t.byte {b}")?;
                }
                writeln!(self.rodata, "\t.byte 0")?;
            }
            Encoding::Char16 | Encoding::WChar => {
                for c in value.chars() {
                    writeln!(self.rodata, "\t.short {}", c as u32)?;
                }
                writeln!(self.rodata, "\t.short 0")?;
            }
            Encoding::Char32 => {
                for c in value.chars() {
                    writeln!(self.rodata, "\t.long {}", c as u32)?;
                }
                writeln!(self.rodata, "\t.long 0")?;
            }
        }
        *cell.borrow_mut() = Some(label.clone());
        Ok(label)
    }

    fn emit_str_lit(
        &mut self,
        value: &str,
        encoding: Encoding,
        cell: &RefCell<Option<String>>,
    ) -> CResult<()> {
        let label = self.string_label(value, encoding, cell)?;
        self.emit(format!("lea {label}(%rip), %rax"))
    }

    // ---- loads/stores ---------------------------------------------------

    /// Sign-extending (or `lea`-for-arrays) load from `off(%base)`.
    pub(super) fn emit_lload(&mut self, ctype: &Ctype, base: &str, off: i32) -> CResult<()> {
        match ctype {
            Ctype::Array { .. } => self.emit(format!("lea {off}(%{base}), %rax")),
            Ctype::Float => self.emit(format!("cvtps2pd {off}(%{base}), %xmm0")),
            Ctype::Double | Ctype::LDouble => self.emit(format!("movsd {off}(%{base}), %xmm0")),
            _ => {
                let inst = self.load_inst(ctype)?;
                self.emit(format!("{inst} {off}(%{base}), %rax"))
            }
        }
    }

    /// Same as `emit_lload` but `%rip`-relative, for globals.
    pub(super) fn emit_gload(&mut self, ctype: &Ctype, label: &str, off: i32) -> CResult<()> {
        if matches!(ctype, Ctype::Array { .. }) {
            return if off != 0 {
                self.emit(format!("lea {label}+{off}(%rip), %rax"))
            } else {
                self.emit(format!("lea {label}(%rip), %rax"))
            };
        }
        let addr = |off: i32| {
            if off != 0 {
                format!("{label}+{off}(%rip)")
            } else {
                format!("{label}(%rip)")
            }
        };
        match ctype {
            Ctype::Float => self.emit(format!("cvtps2pd {}, %xmm0", addr(off))),
            Ctype::Double | Ctype::LDouble => self.emit(format!("movsd {}, %xmm0", addr(off))),
            _ => {
                let inst = self.load_inst(ctype)?;
                self.emit(format!("{inst} {}, %rax", addr(off)))
            }
        }
    }

    fn emit_lvar(&mut self, ctype: &Ctype, loff: i32) -> CResult<()> {
        let off = self.local_offset(loff);
        self.emit_lload(ctype, "rbp", off)
    }

    fn emit_gvar(&mut self, ctype: &Ctype, label: &str) -> CResult<()> {
        self.emit_gload(ctype, label, 0)
    }

    pub(super) fn maybe_convert_bool(&mut self, ctype: &Ctype) -> CResult<()> {
        if matches!(ctype, Ctype::Bool) {
            self.emit("test %rax, %rax")?;
            self.emit("setne %al")?;
        }
        Ok(())
    }

    /// Store `%rax`/`%xmm0` into `off(%rbp)`.
    pub(super) fn emit_lsave(&mut self, ctype: &Ctype, off: i32) -> CResult<()> {
        match ctype {
            Ctype::Float => {
                self.push_xmm(0)?;
                self.emit("unpcklpd %xmm0, %xmm0")?;
                self.emit("cvtpd2ps %xmm0, %xmm0")?;
                self.emit(format!("movss %xmm0, {off}(%rbp)"))?;
                self.pop_xmm(0)
            }
            Ctype::Double | Ctype::LDouble => self.emit(format!("movsd %xmm0, {off}(%rbp)")),
            _ => {
                self.maybe_convert_bool(ctype)?;
                let reg = self.int_reg(ctype, 'a')?;
                self.emit(format!("mov %{reg}, {off}(%rbp)"))
            }
        }
    }

    /// Store `%rax`/`%xmm0` into `label+off(%rip)`.
    pub(super) fn emit_gsave(&mut self, label: &str, ctype: &Ctype, off: i32) -> CResult<()> {
        let addr = |off: i32| {
            if off != 0 {
                format!("{label}+{off}(%rip)")
            } else {
                format!("{label}(%rip)")
            }
        };
        match ctype {
            Ctype::Float => {
                self.push_xmm(0)?;
                self.emit("unpcklpd %xmm0, %xmm0")?;
                self.emit("cvtpd2ps %xmm0, %xmm0")?;
                self.emit(format!("movss %xmm0, {}", addr(off)))?;
                self.pop_xmm(0)
            }
            Ctype::Double | Ctype::LDouble => self.emit(format!("movsd %xmm0, {}", addr(off))),
            _ => {
                self.maybe_convert_bool(ctype)?;
                let reg = self.int_reg(ctype, 'a')?;
                self.emit(format!("mov %{reg}, {}", addr(off)))
            }
        }
    }

    /// Dispatches a store of `%rax`/`%xmm0` to whichever lvalue kind `target` is.
    pub(super) fn emit_store(&mut self, target: &Node) -> CResult<()> {
        match &target.kind {
            NodeKind::LocalVar { loff, .. } => {
                let off = self.local_offset(*loff);
                self.emit_lsave(&target.ctype, off)
            }
            NodeKind::GlobalVar { label, .. } => self.emit_gsave(label, &target.ctype, 0),
            NodeKind::Unary { op: UnOp::Deref, operand } => {
                self.emit_store_through_pointer(&target.ctype, operand, 0)
            }
            NodeKind::StructRef { .. } => self.emit_store_struct_ref(target),
            _ => Err(Diagnostic::internal("expression is not assignable")),
        }
    }

    /// Stores the value currently in `%rax`/`%xmm0` through the pointer
    /// produced by `ptr_expr`, at byte offset `off` from that pointer.
    fn emit_store_through_pointer(&mut self, field_ty: &Ctype, ptr_expr: &Node, off: i32) -> CResult<()> {
        if field_ty.is_flotype() {
            self.push_xmm(0)?;
            self.emit_expr(ptr_expr)?;
            self.pop_xmm(1)?;
            match field_ty {
                Ctype::Float => {
                    self.emit("unpcklpd %xmm1, %xmm1")?;
                    self.emit("cvtpd2ps %xmm1, %xmm1")?;
                    self.emit(format!("movss %xmm1, {off}(%rax)"))
                }
                _ => self.emit(format!("movsd %xmm1, {off}(%rax)")),
            }
        } else {
            self.push("rax")?;
            self.emit_expr(ptr_expr)?;
            self.emit("mov %rax, %rcx")?;
            self.pop("rax")?;
            self.maybe_convert_bool(field_ty)?;
            let reg = self.int_reg(field_ty, 'a')?;
            self.emit(format!("mov %{reg}, {off}(%rcx)"))
        }
    }

    // ---- lvalue addresses ------------------------------------------------

    pub(super) fn emit_addr(&mut self, node: &Node) -> CResult<()> {
        match &node.kind {
            NodeKind::LocalVar { loff, .. } => {
                let off = self.local_offset(*loff);
                self.emit(format!("lea {off}(%rbp), %rax"))
            }
            NodeKind::GlobalVar { label, .. } => self.emit(format!("lea {label}(%rip), %rax")),
            NodeKind::Unary { op: UnOp::Deref, operand } => self.emit_expr(operand),
            NodeKind::StructRef { base, offset, .. } => {
                self.emit_addr(base)?;
                if *offset != 0 {
                    self.emit(format!("add ${offset}, %rax"))?;
                }
                Ok(())
            }
            _ => Err(Diagnostic::internal(
                "expression is not an lvalue for address-of",
            )),
        }
    }

    // ---- struct member access --------------------------------------------

    /// Walks a (possibly nested) `StructRef` chain down to its root
    /// (`LocalVar`/`GlobalVar`/`*ptr`), accumulating the byte offset each
    /// level already carries, the same way 8cc accumulates `ctype->offset`.
    fn struct_ref_root<'a>(&mut self, node: &'a Node, extra: u32) -> (&'a Node, u32) {
        match &node.kind {
            NodeKind::StructRef { base, offset, .. } => self.struct_ref_root(base, extra + offset),
            _ => (node, extra),
        }
    }

    fn member_load(&mut self, field_ty: &Ctype, root: &Node, off: u32) -> CResult<()> {
        match &root.kind {
            NodeKind::LocalVar { loff, .. } => {
                let base = self.local_offset(*loff);
                self.emit_lload(field_ty, "rbp", base + off as i32)
            }
            NodeKind::GlobalVar { label, .. } => self.emit_gload(field_ty, label, off as i32),
            NodeKind::Unary { op: UnOp::Deref, operand } => {
                self.emit_expr(operand)?;
                self.emit_lload(field_ty, "rax", off as i32)
            }
            _ => Err(Diagnostic::internal("struct member base is not an lvalue")),
        }
    }

    fn member_store(&mut self, field_ty: &Ctype, root: &Node, off: u32) -> CResult<()> {
        match &root.kind {
            NodeKind::LocalVar { loff, .. } => {
                let base = self.local_offset(*loff);
                self.emit_lsave(field_ty, base + off as i32)
            }
            NodeKind::GlobalVar { label, .. } => self.emit_gsave(label, field_ty, off as i32),
            NodeKind::Unary { op: UnOp::Deref, operand } => {
                self.emit_store_through_pointer(field_ty, operand, off as i32)
            }
            _ => Err(Diagnostic::internal("struct member base is not an lvalue")),
        }
    }

    fn emit_load_struct_ref(&mut self, node: &Node) -> CResult<()> {
        if let NodeKind::StructRef { base, offset, .. } = &node.kind {
            let (root, off) = self.struct_ref_root(base, *offset);
            self.member_load(&node.ctype, root, off)
        } else {
            Err(Diagnostic::internal(
                "emit_load_struct_ref called on a non-struct-ref node",
            ))
        }
    }

    fn emit_store_struct_ref(&mut self, node: &Node) -> CResult<()> {
        if let NodeKind::StructRef { base, offset, .. } = &node.kind {
            let (root, off) = self.struct_ref_root(base, *offset);
            self.member_store(&node.ctype, root, off)
        } else {
            Err(Diagnostic::internal(
                "emit_store_struct_ref called on a non-struct-ref node",
            ))
        }
    }

    // ---- conversions ------------------------------------------------------

    fn emit_toint(&mut self, from: &Ctype) -> CResult<()> {
        if from.is_flotype() {
            self.emit("cvttsd2si %xmm0, %rax")
        } else {
            Ok(())
        }
    }

    pub(super) fn emit_todouble(&mut self, from: &Ctype) -> CResult<()> {
        if !from.is_flotype() {
            self.emit("cvtsi2sd %rax, %xmm0")
        } else {
            Ok(())
        }
    }

    /// Normalizes a just-evaluated value (in `%rax` or `%xmm0`) from `from`'s
    /// representation to `to`'s — used after casts/conversions, and again
    /// right before every store, since our xmm0-always-holds-a-double
    /// convention means this single function covers what 8cc splits into
    /// `emit_load_convert`/`emit_save_convert`.
    pub(super) fn emit_load_convert(&mut self, to: &Ctype, from: &Ctype) -> CResult<()> {
        if to.is_flotype() {
            self.emit_todouble(from)
        } else {
            self.emit_toint(from)?;
            self.maybe_convert_bool(to)
        }
    }

    // ---- unary --------------------------------------------------------

    fn emit_unary(&mut self, node: &Node, op: UnOp, operand: &Node) -> CResult<()> {
        match op {
            UnOp::Neg => {
                self.emit_expr(operand)?;
                if node.ctype.is_flotype() {
                    self.emit("xorpd %xmm1, %xmm1")?;
                    self.emit("subsd %xmm0, %xmm1")?;
                    self.emit("movsd %xmm1, %xmm0")
                } else {
                    self.emit("neg %rax")
                }
            }
            UnOp::BitNot => {
                self.emit_expr(operand)?;
                self.emit("not %rax")
            }
            UnOp::LogNot => self.emit_lognot(operand),
            UnOp::AddrOf => self.emit_addr(operand),
            UnOp::Deref => self.emit_deref(node, operand),
            UnOp::PreInc => self.emit_pre_incdec(node, operand, 1),
            UnOp::PreDec => self.emit_pre_incdec(node, operand, -1),
            UnOp::PostInc => self.emit_post_incdec(node, operand, 1),
            UnOp::PostDec => self.emit_post_incdec(node, operand, -1),
        }
    }

    fn emit_lognot(&mut self, operand: &Node) -> CResult<()> {
        self.emit_expr(operand)?;
        if operand.ctype.is_flotype() {
            self.emit("xorpd %xmm1, %xmm1")?;
            self.emit("ucomisd %xmm1, %xmm0")?;
            self.emit("sete %al")?;
        } else {
            self.emit("test %rax, %rax")?;
            self.emit("sete %al")?;
        }
        self.emit("movzbl %al, %eax")
    }

    /// `*p` as a value. A dereferenced function pointer (`node.ctype` is
    /// itself a function type) decays right back to the same pointer value
    /// — `(*fp)()` and `fp()` must produce identical code — so no memory
    /// load happens in that case.
    fn emit_deref(&mut self, node: &Node, operand: &Node) -> CResult<()> {
        if node.ctype.is_func() {
            return self.emit_expr(operand);
        }
        self.emit_expr(operand)?;
        self.emit_lload(&node.ctype, "rax", 0)
    }

    fn step_amount(ctype: &Ctype) -> i64 {
        match ctype {
            Ctype::Ptr(inner) => inner.size().max(1) as i64,
            _ => 1,
        }
    }

    fn step_value(&mut self, ctype: &Ctype, dir: i64) -> CResult<()> {
        if ctype.is_flotype() {
            self.emit("mov $1, %rax")?;
            self.emit("cvtsi2sd %rax, %xmm1")?;
            if dir > 0 {
                self.emit("addsd %xmm1, %xmm0")
            } else {
                self.emit("subsd %xmm1, %xmm0")
            }
        } else {
            let step = dir * Self::step_amount(ctype);
            if step >= 0 {
                self.emit(format!("add ${step}, %rax"))
            } else {
                self.emit(format!("sub ${}, %rax", -step))
            }
        }
    }

    fn emit_pre_incdec(&mut self, node: &Node, operand: &Node, dir: i64) -> CResult<()> {
        self.emit_expr(operand)?;
        self.step_value(&node.ctype, dir)?;
        self.emit_store(operand)
    }

    fn emit_post_incdec(&mut self, node: &Node, operand: &Node, dir: i64) -> CResult<()> {
        self.emit_expr(operand)?;
        if node.ctype.is_flotype() {
            self.push_xmm(0)?;
            self.step_value(&node.ctype, dir)?;
            self.emit_store(operand)?;
            self.pop_xmm(0)
        } else {
            self.push("rax")?;
            self.step_value(&node.ctype, dir)?;
            self.emit_store(operand)?;
            self.pop("rax")
        }
    }

    // ---- binary ---------------------------------------------------------

    fn apply_int_op(&mut self, op: BinOp) -> CResult<()> {
        match op {
            BinOp::Add => self.emit("add %rcx, %rax"),
            BinOp::Sub => self.emit("sub %rcx, %rax"),
            BinOp::Mul => self.emit("imul %rcx, %rax"),
            BinOp::Div => {
                self.emit("cqo")?;
                self.emit("idiv %rcx")
            }
            BinOp::Mod => {
                self.emit("cqo")?;
                self.emit("idiv %rcx")?;
                self.emit("mov %rdx, %rax")
            }
            BinOp::BitAnd => self.emit("and %rcx, %rax"),
            BinOp::BitOr => self.emit("or %rcx, %rax"),
            BinOp::BitXor => self.emit("xor %rcx, %rax"),
            BinOp::Shl => self.emit("sal %cl, %rax"),
            BinOp::Shr => self.emit("sar %cl, %rax"),
            _ => Err(Diagnostic::internal("not an integer arithmetic operator")),
        }
    }

    fn apply_float_op(&mut self, op: BinOp) -> CResult<()> {
        match op {
            BinOp::Add => self.emit("addsd %xmm1, %xmm0"),
            BinOp::Sub => self.emit("subsd %xmm1, %xmm0"),
            BinOp::Mul => self.emit("mulsd %xmm1, %xmm0"),
            BinOp::Div => self.emit("divsd %xmm1, %xmm0"),
            _ => Err(Diagnostic::internal("not a float arithmetic operator")),
        }
    }

    fn emit_binop_int(&mut self, op: BinOp, left: &Node, right: &Node) -> CResult<()> {
        self.emit_expr(left)?;
        self.push("rax")?;
        self.emit_expr(right)?;
        self.emit("mov %rax, %rcx")?;
        self.pop("rax")?;
        self.apply_int_op(op)
    }

    fn emit_binop_float(&mut self, op: BinOp, left: &Node, right: &Node) -> CResult<()> {
        self.emit_expr(left)?;
        self.push_xmm(0)?;
        self.emit_expr(right)?;
        self.emit("movsd %xmm0, %xmm1")?;
        self.pop_xmm(0)?;
        self.apply_float_op(op)
    }

    fn emit_comparison(&mut self, op: BinOp, left: &Node, right: &Node) -> CResult<()> {
        if left.ctype.is_flotype() || right.ctype.is_flotype() {
            self.emit_expr(left)?;
            self.push_xmm(0)?;
            self.emit_expr(right)?;
            self.emit("movsd %xmm0, %xmm1")?;
            self.pop_xmm(0)?;
            self.emit("ucomisd %xmm1, %xmm0")?;
        } else {
            self.emit_expr(left)?;
            self.push("rax")?;
            self.emit_expr(right)?;
            self.emit("mov %rax, %rcx")?;
            self.pop("rax")?;
            self.emit("cmp %rcx, %rax")?;
        }
        let setcc = match op {
            BinOp::Lt => "setl",
            BinOp::Le => "setle",
            BinOp::Gt => "setg",
            BinOp::Ge => "setge",
            BinOp::Eq => "sete",
            BinOp::Ne => "setne",
            _ => return Err(Diagnostic::internal("not a comparison operator")),
        };
        self.emit(format!("{setcc} %al"))?;
        self.emit("movzbl %al, %eax")
    }

    fn emit_pointer_diff(&mut self, left: &Node, right: &Node) -> CResult<()> {
        self.emit_expr(left)?;
        self.push("rax")?;
        self.emit_expr(right)?;
        self.emit("mov %rax, %rcx")?;
        self.pop("rax")?;
        self.emit("sub %rcx, %rax")?;
        let size = pointee_size(&left.ctype)?;
        if size > 1 {
            self.emit(format!("mov ${size}, %rcx"))?;
            self.emit("cqo")?;
            self.emit("idiv %rcx")?;
        }
        Ok(())
    }

    fn emit_pointer_arith(&mut self, op: BinOp, left: &Node, right: &Node) -> CResult<()> {
        let (ptr_node, int_node) = if left.ctype.is_ptr() {
            (left, right)
        } else {
            (right, left)
        };
        self.emit_expr(ptr_node)?;
        self.push("rax")?;
        self.emit_expr(int_node)?;
        let scale = pointee_size(&ptr_node.ctype)?;
        if scale > 1 {
            self.emit(format!("imul ${scale}, %rax"))?;
        }
        self.emit("mov %rax, %rcx")?;
        self.pop("rax")?;
        match op {
            BinOp::Add => self.emit("add %rcx, %rax"),
            BinOp::Sub => self.emit("sub %rcx, %rax"),
            _ => Err(Diagnostic::internal("unsupported pointer arithmetic operator")),
        }
    }

    fn emit_logand(&mut self, left: &Node, right: &Node) -> CResult<()> {
        let lfalse = self.make_label();
        let end = self.make_label();
        self.emit_expr(left)?;
        self.emit_je(&lfalse)?;
        self.emit_expr(right)?;
        self.emit_je(&lfalse)?;
        self.emit("mov $1, %rax")?;
        self.emit_jmp(&end)?;
        self.emit_label(&lfalse)?;
        self.emit("mov $0, %rax")?;
        self.emit_label(&end)
    }

    fn emit_logor(&mut self, left: &Node, right: &Node) -> CResult<()> {
        let ltrue = self.make_label();
        let end = self.make_label();
        self.emit_expr(left)?;
        self.emit("test %rax, %rax")?;
        self.emit(format!("jne {ltrue}"))?;
        self.emit_expr(right)?;
        self.emit("test %rax, %rax")?;
        self.emit(format!("jne {ltrue}"))?;
        self.emit("mov $0, %rax")?;
        self.emit_jmp(&end)?;
        self.emit_label(&ltrue)?;
        self.emit("mov $1, %rax")?;
        self.emit_label(&end)
    }

    fn emit_binop(&mut self, node: &Node, op: BinOp, left: &Node, right: &Node) -> CResult<()> {
        match op {
            BinOp::LogAnd => return self.emit_logand(left, right),
            BinOp::LogOr => return self.emit_logor(left, right),
            _ => {}
        }
        if left.ctype.is_ptr() && right.ctype.is_ptr() && matches!(op, BinOp::Sub) {
            return self.emit_pointer_diff(left, right);
        }
        if node.ctype.is_ptr() {
            return self.emit_pointer_arith(op, left, right);
        }
        match op {
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                self.emit_comparison(op, left, right)
            }
            _ if left.ctype.is_flotype() || right.ctype.is_flotype() => {
                self.emit_binop_float(op, left, right)
            }
            _ => self.emit_binop_int(op, left, right),
        }
    }

    // ---- assignment -----------------------------------------------------

    fn blit_struct(&mut self, ctype: &Ctype, dest: &str, src: &str) -> CResult<()> {
        let size = ctype.size();
        let mut off = 0u32;
        while off + 8 <= size {
            self.emit(format!("mov {off}(%{src}), %r11"))?;
            self.emit(format!("mov %r11, {off}(%{dest})"))?;
            off += 8;
        }
        while off + 4 <= size {
            self.emit(format!("mov {off}(%{src}), %r11d"))?;
            self.emit(format!("mov %r11d, {off}(%{dest})"))?;
            off += 4;
        }
        while off < size {
            self.emit(format!("movb {off}(%{src}), %r11b"))?;
            self.emit(format!("movb %r11b, {off}(%{dest})"))?;
            off += 1;
        }
        Ok(())
    }

    fn emit_copy_struct(&mut self, target: &Node, value: &Node) -> CResult<()> {
        self.emit_addr(value)?;
        self.push("rax")?;
        self.emit_addr(target)?;
        self.push("rax")?;
        self.pop("rax")?; // dest
        self.pop("rcx")?; // src
        self.blit_struct(&target.ctype, "rax", "rcx")
    }

    fn emit_assign(&mut self, target: &Node, value: &Node) -> CResult<()> {
        if target.ctype.is_struct_or_union() {
            return self.emit_copy_struct(target, value);
        }
        self.emit_expr(value)?;
        self.emit_load_convert(&target.ctype, &value.ctype)?;
        self.emit_store(target)
    }

    fn emit_compound_assign(&mut self, op: BinOp, target: &Node, value: &Node) -> CResult<()> {
        self.emit_expr(target)?;
        if target.ctype.is_ptr() && matches!(op, BinOp::Add | BinOp::Sub) {
            self.push("rax")?;
            self.emit_expr(value)?;
            let scale = pointee_size(&target.ctype)?;
            if scale > 1 {
                self.emit(format!("imul ${scale}, %rax"))?;
            }
            self.emit("mov %rax, %rcx")?;
            self.pop("rax")?;
            self.apply_int_op(op)?;
        } else if target.ctype.is_flotype() {
            self.push_xmm(0)?;
            self.emit_expr(value)?;
            self.emit_todouble(&value.ctype)?;
            self.emit("movsd %xmm0, %xmm1")?;
            self.pop_xmm(0)?;
            self.apply_float_op(op)?;
        } else {
            self.push("rax")?;
            self.emit_expr(value)?;
            self.emit("mov %rax, %rcx")?;
            self.pop("rax")?;
            self.apply_int_op(op)?;
        }
        self.emit_store(target)
    }

    // ---- ternary ----------------------------------------------------------

    /// Shared by the `?:` expression and (via `control_flow.rs`) the `if`
    /// statement: evaluate `cond`, jump over `then` to `else` when false.
    pub(super) fn emit_ternary_core(
        &mut self,
        cond: &Node,
        mut then_branch: impl FnMut(&mut Self) -> CResult<()>,
        mut else_branch: impl FnMut(&mut Self) -> CResult<()>,
        has_else: bool,
    ) -> CResult<()> {
        let lelse = self.make_label();
        let lend = self.make_label();
        self.emit_expr(cond)?;
        self.emit_je(&lelse)?;
        then_branch(self)?;
        self.emit_jmp(&lend)?;
        self.emit_label(&lelse)?;
        if has_else {
            else_branch(self)?;
        }
        self.emit_label(&lend)
    }

    fn emit_ternary_expr(&mut self, cond: &Node, then_expr: &Node, else_expr: Option<&Node>) -> CResult<()> {
        self.emit_ternary_core(
            cond,
            |g| g.emit_expr(then_expr),
            |g| {
                if let Some(e) = else_expr {
                    g.emit_expr(e)
                } else {
                    Ok(())
                }
            },
            true,
        )
    }

    // ---- varargs ----------------------------------------------------------

    fn emit_va_start(&mut self, ap: &Node) -> CResult<()> {
        self.emit_expr(ap)?;
        self.emit("mov %rax, %r11")?;
        self.emit(format!("movl ${}, (%r11)", self.numgp * 8))?;
        self.emit(format!("movl ${}, 4(%r11)", 48 + self.numfp * 16))?;
        self.emit(format!("lea {}(%rbp), %rax", -REGAREA_SIZE))?;
        self.emit("mov %rax, 8(%r11)")
    }

    fn emit_va_arg(&mut self, node: &Node, ap: &Node) -> CResult<()> {
        self.emit_expr(ap)?;
        self.emit("mov %rax, %r11")?;
        if node.ctype.is_flotype() {
            self.emit("movslq 4(%r11), %rax")?;
            self.emit("mov 8(%r11), %rcx")?;
            self.emit("add %rax, %rcx")?;
            if matches!(node.ctype, Ctype::Float) {
                self.emit("cvtps2pd (%rcx), %xmm0")?;
            } else {
                self.emit("movsd (%rcx), %xmm0")?;
            }
            self.emit("addl $16, 4(%r11)")
        } else {
            self.emit("movslq (%r11), %rax")?;
            self.emit("mov 8(%r11), %rcx")?;
            self.emit("add %rax, %rcx")?;
            let inst = self.load_inst(&node.ctype)?;
            self.emit(format!("{inst} (%rcx), %rax"))?;
            self.emit("addl $8, (%r11)")
        }
    }
}
