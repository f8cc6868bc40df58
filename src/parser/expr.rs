//! Expression grammar: comma down through primary expressions, precedence
//! climbing for binary operators, `_Generic`, `sizeof`, and the
//! special-cased `va_start`/`va_arg`/`va_end` recognition that stands in for
//! the real `<stdarg.h>` macros (no preprocessor front end here).

use std::cell::RefCell;

use crate::ast::{BinOp, Node, NodeKind, UnOp};
use crate::diagnostics::{CResult, Diagnostic, SourcePosition};
use crate::token::{Encoding, Keyword, TokenKind};
use crate::types::{result_type, ArithOp, Ctype};

impl super::Parser {
    pub(super) fn parse_expr(&mut self) -> CResult<Node> {
        let mut e = self.parse_assignment_expr()?;
        while self.accept_punct(',')? {
            let pos = e.pos.clone();
            let rhs = self.parse_assignment_expr()?;
            let ty = rhs.ctype.clone();
            e = Node::new(NodeKind::Comma(Box::new(e), Box::new(rhs)), ty, pos);
        }
        Ok(e)
    }

    pub(super) fn parse_assignment_expr(&mut self) -> CResult<Node> {
        let lhs = self.parse_conditional_expr()?;
        let t = self.peek_token()?;
        if let TokenKind::Keyword(k) = &t.kind {
            if let Some(op) = compound_assign_op(k) {
                self.next_token()?;
                let rhs = self.parse_assignment_expr()?;
                // Pointer += / -= scales the integer operand by the
                // pointee size at codegen time (see `make_binary`'s pointer
                // case); converting it to the pointer type here would make
                // it a bit-reinterpretation instead of an offset.
                let rhs = if lhs.ctype.is_ptr() && matches!(op, BinOp::Add | BinOp::Sub) {
                    rhs
                } else {
                    self.convert_to(rhs, &lhs.ctype)
                };
                let pos = lhs.pos.clone();
                let ty = lhs.ctype.clone();
                return Ok(Node::new(
                    NodeKind::CompoundAssign {
                        op,
                        target: Box::new(lhs),
                        value: Box::new(rhs),
                    },
                    ty,
                    pos,
                ));
            }
            if matches!(k, Keyword::Punct('=')) {
                self.next_token()?;
                let rhs = self.parse_assignment_expr()?;
                let rhs = self.convert_to(rhs, &lhs.ctype);
                let pos = lhs.pos.clone();
                let ty = lhs.ctype.clone();
                return Ok(Node::new(
                    NodeKind::Assign {
                        target: Box::new(lhs),
                        value: Box::new(rhs),
                    },
                    ty,
                    pos,
                ));
            }
        }
        Ok(lhs)
    }

    pub(super) fn parse_conditional_expr(&mut self) -> CResult<Node> {
        let cond = self.parse_binary_expr(1)?;
        if self.accept_punct('?')? {
            let pos = cond.pos.clone();
            let cond = self.to_bool_context(cond);
            let then_e = self.parse_expr()?;
            self.expect_punct(':')?;
            let else_e = self.parse_conditional_expr()?;
            let ty = if then_e.ctype.is_arithtype() && else_e.ctype.is_arithtype() {
                result_type(ArithOp::Other, &then_e.ctype, &else_e.ctype)
            } else {
                then_e.ctype.clone()
            };
            let then_e = self.convert_to(then_e, &ty);
            let else_e = self.convert_to(else_e, &ty);
            return Ok(Node::new(
                NodeKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_e),
                    else_expr: Box::new(else_e),
                },
                ty,
                pos,
            ));
        }
        Ok(cond)
    }

    /// Precedence-climbing binary-operator parse; `min_prec` is the lowest
    /// precedence this call is allowed to consume.
    fn parse_binary_expr(&mut self, min_prec: u8) -> CResult<Node> {
        let mut lhs = self.parse_cast_expr()?;
        loop {
            let t = self.peek_token()?;
            match binop_info(&t.kind) {
                Some((op, prec)) if prec >= min_prec => {
                    self.next_token()?;
                    let rhs = self.parse_binary_expr(prec + 1)?;
                    lhs = self.make_binary(op, lhs, rhs)?;
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn make_binary(&mut self, op: BinOp, l: Node, r: Node) -> CResult<Node> {
        let pos = l.pos.clone();
        if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
            let l = self.to_bool_context(l);
            let r = self.to_bool_context(r);
            return Ok(Node::new(
                NodeKind::Binary {
                    op,
                    left: Box::new(l),
                    right: Box::new(r),
                },
                Ctype::Int { signed: true },
                pos,
            ));
        }
        if matches!(
            op,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        ) {
            let common = result_type(ArithOp::Other, &l.ctype, &r.ctype);
            let l = self.convert_to(l, &common);
            let r = self.convert_to(r, &common);
            return Ok(Node::new(
                NodeKind::Binary {
                    op,
                    left: Box::new(l),
                    right: Box::new(r),
                },
                Ctype::Int { signed: true },
                pos,
            ));
        }
        let arith_op = match op {
            BinOp::Add => ArithOp::Add,
            BinOp::Sub => ArithOp::Sub,
            _ => ArithOp::Other,
        };
        let rty = result_type(arith_op, &l.ctype, &r.ctype);
        if l.ctype.is_ptr() || r.ctype.is_ptr() {
            // Pointer-arithmetic scaling by the pointee size happens in
            // codegen, which has direct access to the pointee type; the
            // parser only records the result type here.
            return Ok(Node::new(
                NodeKind::Binary {
                    op,
                    left: Box::new(l),
                    right: Box::new(r),
                },
                rty,
                pos,
            ));
        }
        let l = self.convert_to(l, &rty);
        let r = self.convert_to(r, &rty);
        Ok(Node::new(
            NodeKind::Binary {
                op,
                left: Box::new(l),
                right: Box::new(r),
            },
            rty,
            pos,
        ))
    }

    fn parse_cast_expr(&mut self) -> CResult<Node> {
        if self.peek_is_punct('(')? {
            let open = self.next_token()?;
            if self.peek_is_type_name()? {
                let ty = self.parse_type_name()?;
                self.expect_punct(')')?;
                if self.peek_is_punct('{')? {
                    return Err(Diagnostic::parse(
                        open.pos,
                        "compound literals are not supported",
                    ));
                }
                let inner = self.parse_cast_expr()?;
                return Ok(Node::new(NodeKind::Cast(Box::new(inner)), ty, open.pos));
            }
            self.unget_token(open);
        }
        self.parse_unary_expr()
    }

    fn peek_is_type_name(&mut self) -> CResult<bool> {
        let t = self.peek_token()?;
        Ok(super::decl::is_decl_specifier_token(self, &t))
    }

    fn parse_unary_expr(&mut self) -> CResult<Node> {
        let pos = self.current_pos()?;
        if self.accept(Keyword::Sizeof)? {
            return self.parse_sizeof(pos);
        }
        if self.peek_token()?.is_keyword(Keyword::Inc) {
            self.next_token()?;
            let operand = self.parse_unary_expr()?;
            let ty = operand.ctype.clone();
            return Ok(Node::new(
                NodeKind::Unary {
                    op: UnOp::PreInc,
                    operand: Box::new(operand),
                },
                ty,
                pos,
            ));
        }
        if self.peek_token()?.is_keyword(Keyword::Dec) {
            self.next_token()?;
            let operand = self.parse_unary_expr()?;
            let ty = operand.ctype.clone();
            return Ok(Node::new(
                NodeKind::Unary {
                    op: UnOp::PreDec,
                    operand: Box::new(operand),
                },
                ty,
                pos,
            ));
        }
        if self.accept_punct('+')? {
            return self.parse_cast_expr();
        }
        if let Some(op) = self.peek_unary_op()? {
            self.next_token()?;
            let operand = self.parse_cast_expr()?;
            return self.make_unary(op, operand, pos);
        }
        self.parse_postfix_expr()
    }

    fn peek_unary_op(&mut self) -> CResult<Option<UnOp>> {
        let t = self.peek_token()?;
        Ok(match &t.kind {
            TokenKind::Keyword(Keyword::Punct('&')) => Some(UnOp::AddrOf),
            TokenKind::Keyword(Keyword::Punct('*')) => Some(UnOp::Deref),
            TokenKind::Keyword(Keyword::Punct('-')) => Some(UnOp::Neg),
            TokenKind::Keyword(Keyword::Punct('~')) => Some(UnOp::BitNot),
            TokenKind::Keyword(Keyword::Punct('!')) => Some(UnOp::LogNot),
            _ => None,
        })
    }

    fn make_unary(&mut self, op: UnOp, operand: Node, pos: SourcePosition) -> CResult<Node> {
        match op {
            UnOp::AddrOf => {
                let ty = Ctype::ptr(operand.ctype.clone());
                Ok(Node::new(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                    pos,
                ))
            }
            UnOp::Deref => {
                let pointee = match &operand.ctype {
                    Ctype::Ptr(p) => (**p).clone(),
                    Ctype::Array { elem, .. } => (**elem).clone(),
                    _ => return Err(Diagnostic::ty(pos, "cannot dereference a non-pointer type")),
                };
                Ok(Node::new(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    pointee,
                    pos,
                ))
            }
            UnOp::Neg | UnOp::BitNot => {
                let ty = operand.ctype.clone();
                Ok(Node::new(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                    pos,
                ))
            }
            UnOp::LogNot => {
                let operand = self.to_bool_context(operand);
                Ok(Node::new(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    Ctype::Int { signed: true },
                    pos,
                ))
            }
            _ => unreachable!("postfix-only variant reached make_unary"),
        }
    }

    fn parse_sizeof(&mut self, pos: SourcePosition) -> CResult<Node> {
        if self.peek_is_punct('(')? {
            let open = self.next_token()?;
            if self.peek_is_type_name()? {
                let ty = self.parse_type_name()?;
                self.expect_punct(')')?;
                return Ok(Node::int_lit(ty.size() as i64, Ctype::Long { signed: false }, pos));
            }
            self.unget_token(open);
        }
        let operand = self.parse_unary_expr()?;
        Ok(Node::int_lit(
            operand.ctype.size() as i64,
            Ctype::Long { signed: false },
            pos,
        ))
    }

    fn parse_postfix_expr(&mut self) -> CResult<Node> {
        let mut e = self.parse_primary_expr()?;
        loop {
            let pos = e.pos.clone();
            if self.accept_punct('[')? {
                let idx = self.parse_expr()?;
                self.expect_punct(']')?;
                let ptr_ty = e.ctype.decay();
                let elem_ty = match &ptr_ty {
                    Ctype::Ptr(p) => (**p).clone(),
                    _ => {
                        return Err(Diagnostic::ty(
                            pos,
                            "subscripted value is not an array or pointer",
                        ))
                    }
                };
                let base = Node::new(NodeKind::Conv(Box::new(e)), ptr_ty.clone(), pos.clone());
                let sum = Node::new(
                    NodeKind::Binary {
                        op: BinOp::Add,
                        left: Box::new(base),
                        right: Box::new(idx),
                    },
                    ptr_ty,
                    pos.clone(),
                );
                e = Node::new(
                    NodeKind::Unary {
                        op: UnOp::Deref,
                        operand: Box::new(sum),
                    },
                    elem_ty,
                    pos,
                );
                continue;
            }
            if self.accept_punct('(')? {
                e = self.parse_call(e, pos)?;
                continue;
            }
            if self.accept_punct('.')? {
                let field = self.expect_ident()?;
                e = self.make_struct_ref(e, field, pos, false)?;
                continue;
            }
            if self.peek_token()?.is_keyword(Keyword::Arrow) {
                self.next_token()?;
                let field = self.expect_ident()?;
                e = self.make_struct_ref(e, field, pos, true)?;
                continue;
            }
            if self.peek_token()?.is_keyword(Keyword::Inc) {
                self.next_token()?;
                let ty = e.ctype.clone();
                e = Node::new(
                    NodeKind::Unary {
                        op: UnOp::PostInc,
                        operand: Box::new(e),
                    },
                    ty,
                    pos,
                );
                continue;
            }
            if self.peek_token()?.is_keyword(Keyword::Dec) {
                self.next_token()?;
                let ty = e.ctype.clone();
                e = Node::new(
                    NodeKind::Unary {
                        op: UnOp::PostDec,
                        operand: Box::new(e),
                    },
                    ty,
                    pos,
                );
                continue;
            }
            break;
        }
        Ok(e)
    }

    fn make_struct_ref(
        &mut self,
        base: Node,
        field: String,
        pos: SourcePosition,
        via_arrow: bool,
    ) -> CResult<Node> {
        let base = if via_arrow {
            let pointee = match &base.ctype {
                Ctype::Ptr(p) => (**p).clone(),
                _ => {
                    return Err(Diagnostic::ty(
                        pos,
                        "member reference base type is not a pointer",
                    ))
                }
            };
            Node::new(
                NodeKind::Unary {
                    op: UnOp::Deref,
                    operand: Box::new(base),
                },
                pointee,
                pos.clone(),
            )
        } else {
            base
        };
        let (fty, foffset) = match &base.ctype {
            Ctype::Struct(st) | Ctype::Union(st) => {
                let b = st.borrow();
                let fi = b.fields.get(&field).ok_or_else(|| {
                    Diagnostic::ty(pos.clone(), format!("no member named '{field}'"))
                })?;
                (fi.ty.clone(), fi.offset)
            }
            _ => {
                return Err(Diagnostic::ty(
                    pos,
                    "member reference base is not a struct or union",
                ))
            }
        };
        Ok(Node::new(
            NodeKind::StructRef {
                base: Box::new(base),
                field,
                offset: foffset,
            },
            fty,
            pos,
        ))
    }

    fn parse_call(&mut self, callee: Node, pos: SourcePosition) -> CResult<Node> {
        let mut args = Vec::new();
        if !self.peek_is_punct(')')? {
            loop {
                args.push(self.parse_assignment_expr()?);
                if !self.accept_punct(',')? {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        match &callee.kind {
            NodeKind::GlobalVar { name, .. } if callee.ctype.is_func() => {
                let func_ctype = callee.ctype.clone();
                let ret = match &func_ctype {
                    Ctype::Func { return_type, .. } => (**return_type).clone(),
                    _ => Ctype::Int { signed: true },
                };
                Ok(Node::new(
                    NodeKind::FuncCall {
                        name: name.clone(),
                        func_ctype,
                        args,
                    },
                    ret,
                    pos,
                ))
            }
            _ => {
                let fn_ty = match &callee.ctype {
                    Ctype::Ptr(inner) if inner.is_func() => (**inner).clone(),
                    Ctype::Func { .. } => callee.ctype.clone(),
                    _ => {
                        return Err(Diagnostic::ty(
                            pos,
                            "called object is not a function or function pointer",
                        ))
                    }
                };
                let ret = match &fn_ty {
                    Ctype::Func { return_type, .. } => (**return_type).clone(),
                    _ => Ctype::Void,
                };
                Ok(Node::new(
                    NodeKind::FuncPtrCall {
                        callee: Box::new(callee),
                        args,
                    },
                    ret,
                    pos,
                ))
            }
        }
    }

    fn parse_primary_expr(&mut self) -> CResult<Node> {
        let pos = self.current_pos()?;
        let t = self.next_token()?;
        match t.kind {
            TokenKind::Number(text) => self.parse_number_literal(&text, pos),
            TokenKind::Char { value, .. } => Ok(Node::int_lit(value, Ctype::Int { signed: true }, pos)),
            TokenKind::Str { value, encoding } => {
                let ty = Ctype::array(Ctype::Char { signed: true }, Some(value.len() + 1));
                Ok(Node::new(
                    NodeKind::StrLit {
                        value,
                        encoding,
                        label: RefCell::new(None),
                    },
                    ty,
                    pos,
                ))
            }
            TokenKind::Ident(name) => self.resolve_ident(&name, pos),
            TokenKind::Keyword(Keyword::Punct('(')) => {
                let e = self.parse_expr()?;
                self.expect_punct(')')?;
                Ok(e)
            }
            TokenKind::Keyword(Keyword::Generic) => self.parse_generic(pos),
            _ => Err(Diagnostic::parse(pos, format!("unexpected token {}", t.describe()))),
        }
    }

    fn resolve_ident(&mut self, name: &str, pos: SourcePosition) -> CResult<Node> {
        if matches!(name, "va_start" | "va_arg" | "va_end") {
            return self.parse_va_builtin(name, pos);
        }
        if name == "__func__" {
            let text = self.current_func_name.clone().unwrap_or_default();
            let ty = Ctype::array(Ctype::Char { signed: true }, Some(text.len() + 1));
            return Ok(Node::new(
                NodeKind::StrLit {
                    value: text,
                    encoding: Encoding::None,
                    label: RefCell::new(None),
                },
                ty,
                pos,
            ));
        }
        if let Some(sym) = self.lookup_var(name).cloned() {
            return Ok(match sym.kind {
                super::SymbolKind::Local(loff) => Node::new(
                    NodeKind::LocalVar {
                        name: name.to_string(),
                        loff,
                    },
                    sym.ctype,
                    pos,
                ),
                super::SymbolKind::Global(label) => Node::new(
                    NodeKind::GlobalVar {
                        name: name.to_string(),
                        label,
                    },
                    sym.ctype,
                    pos,
                ),
                super::SymbolKind::EnumConst(v) => Node::int_lit(v, sym.ctype, pos),
            });
        }
        Err(Diagnostic::parse(pos, format!("use of undeclared identifier '{name}'")))
    }

    fn parse_va_builtin(&mut self, name: &str, pos: SourcePosition) -> CResult<Node> {
        self.expect_punct('(')?;
        let node = match name {
            "va_start" => {
                let ap = self.parse_assignment_expr()?;
                self.expect_punct(',')?;
                let _last_named_param = self.parse_assignment_expr()?;
                Node::stmt(NodeKind::VaStart(Box::new(ap)), pos)
            }
            "va_arg" => {
                let ap = self.parse_assignment_expr()?;
                self.expect_punct(',')?;
                let ty = self.parse_type_name()?;
                Node::new(NodeKind::VaArg(Box::new(ap)), ty, pos)
            }
            "va_end" => {
                let ap = self.parse_assignment_expr()?;
                Node::stmt(NodeKind::VaEnd(Box::new(ap)), pos)
            }
            _ => unreachable!(),
        };
        self.expect_punct(')')?;
        Ok(node)
    }

    fn parse_generic(&mut self, pos: SourcePosition) -> CResult<Node> {
        self.expect_punct('(')?;
        let ctrl = self.parse_assignment_expr()?;
        let probe_ty = ctrl.ctype;
        self.expect_punct(',')?;
        let mut default_arm = None;
        let mut chosen = None;
        loop {
            if self.accept(Keyword::Default)? {
                self.expect_punct(':')?;
                let e = self.parse_assignment_expr()?;
                default_arm = Some(e);
            } else {
                let ty = self.parse_type_name()?;
                self.expect_punct(':')?;
                let e = self.parse_assignment_expr()?;
                if chosen.is_none() && ty.is_compatible(&probe_ty) {
                    chosen = Some(e);
                }
            }
            if !self.accept_punct(',')? {
                break;
            }
        }
        self.expect_punct(')')?;
        chosen
            .or(default_arm)
            .ok_or_else(|| Diagnostic::ty(pos, "_Generic has no matching association and no default"))
    }

    fn parse_number_literal(&mut self, text: &str, pos: SourcePosition) -> CResult<Node> {
        let lower = text.to_ascii_lowercase();
        let is_hex_int = lower.starts_with("0x") && !lower.contains('p') && !lower.contains('.');
        let is_float = !is_hex_int && (lower.contains('.') || (lower.contains('e') && !lower.starts_with("0x")) || lower.contains('p'));

        if is_float {
            let mut core = text.to_string();
            let mut is_ldouble = false;
            let mut is_float32 = false;
            while let Some(c) = core.chars().last() {
                match c {
                    'f' | 'F' => {
                        is_float32 = true;
                        core.pop();
                    }
                    'l' | 'L' => {
                        is_ldouble = true;
                        core.pop();
                    }
                    _ => break,
                }
            }
            let value: f64 = core
                .parse()
                .map_err(|_| Diagnostic::parse(pos.clone(), format!("invalid floating constant '{text}'")))?;
            let ty = if is_float32 {
                Ctype::Float
            } else if is_ldouble {
                Ctype::LDouble
            } else {
                Ctype::Double
            };
            return Ok(Node::new(
                NodeKind::FloatLit {
                    value,
                    label: RefCell::new(None),
                },
                ty,
                pos,
            ));
        }

        let mut core = text.to_string();
        let mut unsigned = false;
        let mut long_count = 0u32;
        loop {
            match core.chars().last() {
                Some('u') | Some('U') => {
                    unsigned = true;
                    core.pop();
                }
                Some('l') | Some('L') => {
                    long_count += 1;
                    core.pop();
                }
                _ => break,
            }
        }
        let value = if let Some(hex) = core.strip_prefix("0x").or_else(|| core.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
                .map_err(|_| Diagnostic::parse(pos.clone(), format!("invalid integer constant '{text}'")))?
        } else if core.len() > 1 && core.starts_with('0') {
            i64::from_str_radix(&core[1..], 8)
                .map_err(|_| Diagnostic::parse(pos.clone(), format!("invalid integer constant '{text}'")))?
        } else {
            core.parse::<i64>()
                .map_err(|_| Diagnostic::parse(pos.clone(), format!("invalid integer constant '{text}'")))?
        };
        let ty = match (long_count, unsigned) {
            (0, false) => Ctype::Int { signed: true },
            (0, true) => Ctype::Int { signed: false },
            (1, _) => Ctype::Long { signed: !unsigned },
            (_, _) => Ctype::LLong { signed: !unsigned },
        };
        Ok(Node::int_lit(value, ty, pos))
    }

    /// Conversion inserted whenever an operand's type differs from the type
    /// a binary op, assignment, or initializer settled on.
    pub(super) fn convert_to(&self, node: Node, target: &Ctype) -> Node {
        if node.ctype.is_compatible(target) {
            return node;
        }
        let pos = node.pos.clone();
        Node::new(NodeKind::Conv(Box::new(node)), target.clone(), pos)
    }

    /// Placeholder for the boolean-context conversion the source applies
    /// before a branch condition; codegen already does a size-specific
    /// zero test on any scalar type, so there is nothing to rewrite here.
    pub(super) fn to_bool_context(&self, node: Node) -> Node {
        node
    }
}

fn compound_assign_op(k: &Keyword) -> Option<BinOp> {
    use Keyword::*;
    Some(match k {
        AddAssign => BinOp::Add,
        SubAssign => BinOp::Sub,
        MulAssign => BinOp::Mul,
        DivAssign => BinOp::Div,
        ModAssign => BinOp::Mod,
        AndAssign => BinOp::BitAnd,
        OrAssign => BinOp::BitOr,
        XorAssign => BinOp::BitXor,
        ShlAssign => BinOp::Shl,
        ShrAssign => BinOp::Shr,
        _ => return None,
    })
}

fn binop_info(kind: &TokenKind) -> Option<(BinOp, u8)> {
    use Keyword::*;
    let k = match kind {
        TokenKind::Keyword(k) => k,
        _ => return None,
    };
    Some(match k {
        Punct('*') => (BinOp::Mul, 10),
        Punct('/') => (BinOp::Div, 10),
        Punct('%') => (BinOp::Mod, 10),
        Punct('+') => (BinOp::Add, 9),
        Punct('-') => (BinOp::Sub, 9),
        Shl => (BinOp::Shl, 8),
        Shr => (BinOp::Shr, 8),
        Punct('<') => (BinOp::Lt, 7),
        Punct('>') => (BinOp::Gt, 7),
        Le => (BinOp::Le, 7),
        Ge => (BinOp::Ge, 7),
        Eq => (BinOp::Eq, 6),
        Ne => (BinOp::Ne, 6),
        Punct('&') => (BinOp::BitAnd, 5),
        Punct('^') => (BinOp::BitXor, 4),
        Punct('|') => (BinOp::BitOr, 3),
        LogAnd => (BinOp::LogAnd, 2),
        LogOr => (BinOp::LogOr, 1),
        _ => return None,
    })
}
