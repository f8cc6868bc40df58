//! Global-variable codegen: `.data`/`.bss` emission for `GlobalDecl`, ported
//! from 8cc's `emit_data`/`emit_data_int`/`emit_bss`/`emit_global_var`. A
//! zero-initializer global (no `init` entries) becomes a `.lcomm`; anything
//! else walks its flattened `InitElem` list emitting one directive per
//! scalar, padding gaps with `emit_zero`.

use crate::ast::{InitElem, Node, NodeKind, UnOp};
use crate::diagnostics::{CResult, Diagnostic};
use crate::parser::constexpr::eval_intexpr;
use crate::types::Ctype;

use super::state::CodeGen;

/// Peels the implicit/explicit conversion wrappers the parser inserts
/// around an initializer value; a global initializer's actual payload
/// (a literal or an address constant) is always underneath these.
fn strip_conv(mut node: &Node) -> &Node {
    loop {
        match &node.kind {
            NodeKind::Cast(inner) | NodeKind::Conv(inner) => node = inner,
            _ => return node,
        }
    }
}

impl CodeGen {
    pub(super) fn emit_global_decl(
        &mut self,
        ctype: &Ctype,
        label: &str,
        init: &[InitElem],
        is_static: bool,
    ) -> CResult<()> {
        if init.is_empty() {
            self.emit_bss(label, ctype)
        } else {
            self.emit_data(label, ctype, init, is_static)
        }
    }

    fn emit_bss(&mut self, label: &str, ctype: &Ctype) -> CResult<()> {
        self.emit(".data")?;
        self.emit(format!(".lcomm {label}, {}", ctype.size()))
    }

    fn emit_data(&mut self, label: &str, ctype: &Ctype, init: &[InitElem], is_static: bool) -> CResult<()> {
        self.emit(".data")?;
        if !is_static {
            self.emit_noindent(format!(".global {label}"))?;
        }
        self.emit_noindent(format!("{label}:"))?;
        let mut cursor = 0u32;
        for elem in init {
            if elem.offset > cursor {
                self.emit_zero(elem.offset - cursor)?;
            }
            self.emit_scalar_init(&elem.ctype, &elem.value)?;
            cursor = elem.offset + elem.ctype.size();
        }
        let size = ctype.size();
        if cursor < size {
            self.emit_zero(size - cursor)?;
        }
        Ok(())
    }

    fn emit_zero(&mut self, mut size: u32) -> CResult<()> {
        while size >= 8 {
            self.emit(".quad 0")?;
            size -= 8;
        }
        while size >= 4 {
            self.emit(".long 0")?;
            size -= 4;
        }
        while size > 0 {
            self.emit(".byte 0")?;
            size -= 1;
        }
        Ok(())
    }

    fn emit_scalar_init(&mut self, ctype: &Ctype, value: &Node) -> CResult<()> {
        let value = strip_conv(value);

        if ctype.is_flotype() {
            let v = match &value.kind {
                NodeKind::FloatLit { value, .. } => *value,
                NodeKind::IntLit(v) => *v as f64,
                _ => {
                    return Err(Diagnostic::internal(
                        "global floating-point initializer is not a compile-time constant",
                    ))
                }
            };
            return match ctype {
                Ctype::Float => self.emit(format!(".long {}", (v as f32).to_bits())),
                _ => self.emit(format!(".quad {}", v.to_bits())),
            };
        }

        if let NodeKind::StrLit { value: s, encoding, label } = &value.kind {
            let lbl = self.string_label(s, *encoding, label)?;
            return self.emit(format!(".quad {lbl}"));
        }

        if let Some((label, extra)) = self.try_const_addr(value)? {
            return if extra != 0 {
                self.emit(format!(".quad {label}+{extra}"))
            } else {
                self.emit(format!(".quad {label}"))
            };
        }

        let v = eval_intexpr(value)?;
        match ctype.size() {
            1 => self.emit(format!(".byte {v}")),
            2 => self.emit(format!(".short {v}")),
            4 => self.emit(format!(".long {v}")),
            _ => self.emit(format!(".quad {v}")),
        }
    }

    /// Recognizes the two shapes of address constant a global initializer
    /// may use: an explicit `&expr`, or an array decaying to its own base
    /// address with no `&` written at all (`int *p = arr;`).
    fn try_const_addr(&mut self, node: &Node) -> CResult<Option<(String, i64)>> {
        match &node.kind {
            NodeKind::Unary { op: UnOp::AddrOf, operand } => Ok(Some(self.const_addr_of(operand)?)),
            NodeKind::GlobalVar { label, .. } if node.ctype.is_array() => Ok(Some((label.clone(), 0))),
            _ => Ok(None),
        }
    }

    /// Resolves the operand of a constant `&expr` to a `label+offset` pair.
    /// Only globals and (possibly nested) struct member access on a global
    /// are supported, matching 8cc's own narrow support for address
    /// constants in static initializers.
    fn const_addr_of(&mut self, node: &Node) -> CResult<(String, i64)> {
        match &node.kind {
            NodeKind::GlobalVar { label, .. } => Ok((label.clone(), 0)),
            NodeKind::StructRef { base, offset, .. } => {
                let (label, extra) = self.const_addr_of(base)?;
                Ok((label, extra + *offset as i64))
            }
            NodeKind::Unary { op: UnOp::Deref, operand } => self.const_addr_of(operand),
            _ => Err(Diagnostic::internal(
                "unsupported address constant in global initializer",
            )),
        }
    }
}
