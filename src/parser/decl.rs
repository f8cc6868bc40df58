//! Declarator and type-specifier grammar: `DeclSpecs`, declarators (plain /
//! pointer / array / function, plus the one special-cased function-pointer
//! production), struct/union/enum specifiers, and initializer flattening.
//!
//! Declarator nesting is deliberately narrower than the classic C
//! "placeholder patch" algorithm: plain, pointer, (possibly multi-dimensional)
//! array, and function-suffix declarators are supported, plus
//! `(*name)(params)` for function-pointer variables. Deeper nesting
//! (function returning pointer to array, etc.) raises a parse error; no
//! end-to-end scenario this compiler targets needs it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{InitElem, Node};
use crate::diagnostics::{CResult, Diagnostic};
use crate::token::{Keyword, Token, TokenKind};
use crate::types::{complete_struct, Ctype, StructType};

use super::{Parser, Symbol, SymbolKind};

pub struct DeclSpecs {
    pub(super) base: Ctype,
    pub(super) is_static: bool,
    pub(super) is_typedef: bool,
    pub(super) is_extern: bool,
}

/// Whether `t` can start a declaration: a storage-class/type-qualifier
/// keyword, a type-specifier keyword, or an identifier bound to a typedef.
pub(super) fn is_decl_specifier_token(parser: &Parser, t: &Token) -> bool {
    use Keyword::*;
    match &t.kind {
        TokenKind::Keyword(k) => matches!(
            k,
            Void | Char | Short | Int | Long | Float | Double | Signed | Unsigned | Bool
                | Struct | Union | Enum | Typedef | Static | Extern | Auto | Register | Const
                | Volatile | Restrict | Inline | Noreturn | ThreadLocal | Alignas
        ),
        TokenKind::Ident(name) => parser.lookup_typedef(name).is_some(),
        _ => false,
    }
}

fn wrap_struct(st: StructType, is_union: bool) -> Ctype {
    let rc = Rc::new(RefCell::new(st));
    if is_union {
        Ctype::Union(rc)
    } else {
        Ctype::Struct(rc)
    }
}

fn is_char_ty(ty: &Ctype) -> bool {
    matches!(ty, Ctype::Char { .. })
}

impl Parser {
    pub(super) fn parse_decl_specs(&mut self) -> CResult<DeclSpecs> {
        use Keyword::*;

        let mut is_static = false;
        let mut is_typedef = false;
        let mut is_extern = false;
        let mut kind: Option<Ctype> = None;
        let mut saw_char = false;
        let mut saw_short = false;
        let mut saw_int = false;
        let mut saw_double = false;
        let mut long_count = 0u32;
        let mut signed: Option<bool> = None;
        let mut any = false;

        loop {
            let t = self.peek_token()?;
            match &t.kind {
                TokenKind::Keyword(Static) => {
                    self.next_token()?;
                    is_static = true;
                }
                TokenKind::Keyword(Extern) => {
                    self.next_token()?;
                    is_extern = true;
                }
                TokenKind::Keyword(Typedef) => {
                    self.next_token()?;
                    is_typedef = true;
                }
                TokenKind::Keyword(Auto)
                | TokenKind::Keyword(Register)
                | TokenKind::Keyword(Const)
                | TokenKind::Keyword(Volatile)
                | TokenKind::Keyword(Restrict)
                | TokenKind::Keyword(Inline)
                | TokenKind::Keyword(Noreturn)
                | TokenKind::Keyword(ThreadLocal)
                | TokenKind::Keyword(Alignas) => {
                    self.next_token()?;
                }
                TokenKind::Keyword(Void) => {
                    self.next_token()?;
                    kind = Some(Ctype::Void);
                }
                TokenKind::Keyword(Bool) => {
                    self.next_token()?;
                    kind = Some(Ctype::Bool);
                }
                TokenKind::Keyword(Char) => {
                    self.next_token()?;
                    saw_char = true;
                }
                TokenKind::Keyword(Short) => {
                    self.next_token()?;
                    saw_short = true;
                }
                TokenKind::Keyword(Int) => {
                    self.next_token()?;
                    saw_int = true;
                }
                TokenKind::Keyword(Long) => {
                    self.next_token()?;
                    long_count += 1;
                }
                TokenKind::Keyword(Float) => {
                    self.next_token()?;
                    kind = Some(Ctype::Float);
                }
                TokenKind::Keyword(Double) => {
                    self.next_token()?;
                    saw_double = true;
                }
                TokenKind::Keyword(Signed) => {
                    self.next_token()?;
                    signed = Some(true);
                }
                TokenKind::Keyword(Unsigned) => {
                    self.next_token()?;
                    signed = Some(false);
                }
                TokenKind::Keyword(Struct) => {
                    self.next_token()?;
                    kind = Some(self.parse_struct_or_union_specifier(false)?);
                }
                TokenKind::Keyword(Union) => {
                    self.next_token()?;
                    kind = Some(self.parse_struct_or_union_specifier(true)?);
                }
                TokenKind::Keyword(Enum) => {
                    self.next_token()?;
                    kind = Some(self.parse_enum_specifier()?);
                }
                TokenKind::Ident(name)
                    if kind.is_none()
                        && !saw_char
                        && !saw_short
                        && !saw_int
                        && !saw_double
                        && long_count == 0
                        && signed.is_none() =>
                {
                    match self.lookup_typedef(name).cloned() {
                        Some(ty) => {
                            self.next_token()?;
                            kind = Some(ty);
                        }
                        None => break,
                    }
                }
                _ => break,
            }
            any = true;
        }

        if !any {
            let pos = self.current_pos()?;
            return Err(Diagnostic::parse(pos, "expected a declaration"));
        }

        let base = if let Some(k) = kind {
            k
        } else if saw_double {
            if long_count > 0 {
                Ctype::LDouble
            } else {
                Ctype::Double
            }
        } else if saw_char {
            Ctype::Char {
                signed: signed.unwrap_or(true),
            }
        } else if saw_short {
            Ctype::Short {
                signed: signed.unwrap_or(true),
            }
        } else if long_count >= 2 {
            Ctype::LLong {
                signed: signed.unwrap_or(true),
            }
        } else if long_count == 1 {
            Ctype::Long {
                signed: signed.unwrap_or(true),
            }
        } else {
            Ctype::Int {
                signed: signed.unwrap_or(true),
            }
        };

        Ok(DeclSpecs {
            base,
            is_static,
            is_typedef,
            is_extern,
        })
    }

    fn parse_struct_or_union_specifier(&mut self, is_union: bool) -> CResult<Ctype> {
        let pos = self.current_pos()?;
        let tag_name = self.accept_ident()?;
        if self.accept_punct('{')? {
            let mut fields = Vec::new();
            while !self.peek_is_punct('}')? {
                let specs = self.parse_decl_specs()?;
                loop {
                    let (name, ty) = self.parse_declarator(specs.base.clone())?;
                    let name = name.ok_or_else(|| {
                        Diagnostic::parse(pos.clone(), "struct member is missing a name")
                    })?;
                    let bits = if self.accept_punct(':')? {
                        let e = self.parse_conditional_expr()?;
                        Some(super::constexpr::eval_intexpr(&e)? as u32)
                    } else {
                        None
                    };
                    fields.push((name, ty, bits));
                    if !self.accept_punct(',')? {
                        break;
                    }
                }
                self.expect_punct(';')?;
            }
            self.expect_punct('}')?;
            let completed = complete_struct(tag_name.clone(), fields, is_union);
            if let Some(name) = &tag_name {
                if let Some(existing) = self.lookup_tag(name).cloned() {
                    match &existing {
                        Ctype::Struct(rc) | Ctype::Union(rc) => {
                            *rc.borrow_mut() = completed;
                            return Ok(existing);
                        }
                        _ => {}
                    }
                }
                let ty = wrap_struct(completed, is_union);
                self.declare_tag(name, ty.clone());
                Ok(ty)
            } else {
                Ok(wrap_struct(completed, is_union))
            }
        } else if let Some(name) = tag_name {
            if let Some(existing) = self.lookup_tag(&name) {
                Ok(existing.clone())
            } else {
                let st = StructType::incomplete(Some(name.clone()), is_union);
                let ty = wrap_struct(st, is_union);
                self.declare_tag(&name, ty.clone());
                Ok(ty)
            }
        } else {
            Err(Diagnostic::parse(
                pos,
                "expected a tag name or '{' after struct/union",
            ))
        }
    }

    fn parse_enum_specifier(&mut self) -> CResult<Ctype> {
        let pos = self.current_pos()?;
        let tag_name = self.accept_ident()?;
        if self.accept_punct('{')? {
            let mut next_val: i64 = 0;
            while !self.peek_is_punct('}')? {
                let name = self.expect_ident()?;
                if self.accept_punct('=')? {
                    let e = self.parse_conditional_expr()?;
                    next_val = super::constexpr::eval_intexpr(&e)?;
                }
                self.declare_var(
                    &name,
                    Symbol {
                        ctype: Ctype::Int { signed: true },
                        kind: SymbolKind::EnumConst(next_val),
                    },
                );
                next_val += 1;
                if !self.accept_punct(',')? {
                    break;
                }
            }
            self.expect_punct('}')?;
            if let Some(name) = &tag_name {
                self.declare_tag(name, Ctype::Int { signed: true });
            }
            Ok(Ctype::Int { signed: true })
        } else if let Some(name) = tag_name {
            self.lookup_tag(&name)
                .cloned()
                .ok_or_else(|| Diagnostic::parse(pos, format!("undeclared enum tag '{name}'")))
        } else {
            Err(Diagnostic::parse(pos, "expected enum tag or '{'"))
        }
    }

    fn skip_type_qualifiers(&mut self) -> CResult<()> {
        loop {
            if self.accept(Keyword::Const)? || self.accept(Keyword::Volatile)? || self.accept(Keyword::Restrict)? {
                continue;
            }
            break;
        }
        Ok(())
    }

    /// Parses one declarator, returning its name (`None` for an abstract
    /// declarator, e.g. inside `sizeof`/a cast, or an unnamed parameter) and
    /// its full type built on top of `base`.
    pub(super) fn parse_declarator(&mut self, base: Ctype) -> CResult<(Option<String>, Ctype)> {
        let mut ty = base;
        while self.accept_punct('*')? {
            self.skip_type_qualifiers()?;
            ty = Ctype::ptr(ty);
        }
        if self.peek_is_punct('(')? {
            let open = self.next_token()?;
            if self.peek_is_punct('*')? {
                self.next_token()?;
                self.skip_type_qualifiers()?;
                let name = self.accept_ident()?;
                self.expect_punct(')')?;
                self.expect_punct('(')?;
                let (params, has_varargs) = self.parse_param_type_list()?;
                let func_ty = Ctype::func(ty, params, has_varargs);
                return Ok((name, Ctype::ptr(func_ty)));
            }
            self.unget_token(open);
        }
        let name = self.accept_ident()?;
        let ty = self.parse_declarator_suffix(ty)?;
        Ok((name, ty))
    }

    fn parse_declarator_suffix(&mut self, base: Ctype) -> CResult<Ctype> {
        if self.accept_punct('[')? {
            let length = if self.peek_is_punct(']')? {
                None
            } else {
                let e = self.parse_conditional_expr()?;
                Some(super::constexpr::eval_intexpr(&e)? as usize)
            };
            self.expect_punct(']')?;
            let elem = self.parse_declarator_suffix(base)?;
            return Ok(Ctype::array(elem, length));
        }
        if self.accept_punct('(')? {
            let (params, has_varargs) = self.parse_param_type_list()?;
            return Ok(Ctype::func(base, params, has_varargs));
        }
        Ok(base)
    }

    fn parse_param_type_list(&mut self) -> CResult<(Vec<Ctype>, bool)> {
        let mut params = Vec::new();
        let mut has_varargs = false;
        if self.accept_punct(')')? {
            return Ok((params, has_varargs));
        }
        if self.peek_token()?.is_keyword(Keyword::Void) {
            let save = self.next_token()?;
            if self.peek_is_punct(')')? {
                self.next_token()?;
                return Ok((params, has_varargs));
            }
            self.unget_token(save);
        }
        loop {
            if self.peek_token()?.is_keyword(Keyword::Ellipsis) {
                self.next_token()?;
                has_varargs = true;
                break;
            }
            let specs = self.parse_decl_specs()?;
            let (_, ty) = self.parse_declarator(specs.base)?;
            params.push(ty.decay());
            if !self.accept_punct(',')? {
                break;
            }
        }
        self.expect_punct(')')?;
        Ok((params, has_varargs))
    }

    /// Abstract-declarator type, used by `sizeof(type)` and casts.
    pub(super) fn parse_type_name(&mut self) -> CResult<Ctype> {
        let specs = self.parse_decl_specs()?;
        let (_, ty) = self.parse_declarator(specs.base)?;
        Ok(ty)
    }

    // ---- initializers -----------------------------------------------------

    pub(super) fn parse_global_initializer(&mut self, ty: &mut Ctype) -> CResult<Vec<InitElem>> {
        self.parse_initializer_flat(ty)
    }

    pub(super) fn parse_local_initializer(&mut self, ty: &mut Ctype) -> CResult<Vec<InitElem>> {
        self.parse_initializer_flat(ty)
    }

    fn parse_initializer_flat(&mut self, ty: &mut Ctype) -> CResult<Vec<InitElem>> {
        let mut out = Vec::new();
        if let Ctype::Array { elem, length } = ty {
            if is_char_ty(elem) && length.is_none() && matches!(self.peek_token()?.kind, TokenKind::Str { .. }) {
                let tok = self.next_token()?;
                let pos = tok.pos.clone();
                if let TokenKind::Str { value, .. } = tok.kind {
                    let bytes = value.into_bytes();
                    for (i, b) in bytes.iter().enumerate() {
                        out.push(InitElem {
                            value: Node::int_lit(*b as i64, (**elem).clone(), pos.clone()),
                            offset: i as u32,
                            ctype: (**elem).clone(),
                        });
                    }
                    out.push(InitElem {
                        value: Node::int_lit(0, (**elem).clone(), pos),
                        offset: bytes.len() as u32,
                        ctype: (**elem).clone(),
                    });
                    *length = Some(bytes.len() + 1);
                    return Ok(out);
                }
            }
        }
        self.parse_initializer_into(ty, 0, &mut out)?;
        finalize_inits(&mut out);
        Ok(out)
    }

    fn parse_initializer_into(
        &mut self,
        ty: &Ctype,
        base_offset: u32,
        out: &mut Vec<InitElem>,
    ) -> CResult<()> {
        match ty {
            Ctype::Array { elem, length } => {
                self.expect_punct('{')?;
                let mut idx: usize = 0;
                if !self.peek_is_punct('}')? {
                    loop {
                        if self.accept_punct('[')? {
                            let ie = self.parse_conditional_expr()?;
                            idx = super::constexpr::eval_intexpr(&ie)? as usize;
                            self.expect_punct(']')?;
                            self.expect_punct('=')?;
                        }
                        let elem_offset = base_offset + idx as u32 * elem.size();
                        self.parse_initializer_into(elem, elem_offset, out)?;
                        idx += 1;
                        if !self.accept_punct(',')? {
                            break;
                        }
                        if self.peek_is_punct('}')? {
                            break;
                        }
                    }
                }
                self.expect_punct('}')?;
                if length.is_none() {
                    let pos = self.current_pos()?;
                    return Err(Diagnostic::parse(
                        pos,
                        "array length cannot be inferred from this initializer; only a \
                         string-literal initializer for a char array may omit the length",
                    ));
                }
                Ok(())
            }
            Ctype::Struct(st) | Ctype::Union(st) => {
                self.expect_punct('{')?;
                let names: Vec<String> = st.borrow().fields.keys().map(|s| s.to_string()).collect();
                let mut field_idx = 0usize;
                if !self.peek_is_punct('}')? {
                    loop {
                        let mut target_name = None;
                        if self.accept_punct('.')? {
                            target_name = Some(self.expect_ident()?);
                            self.expect_punct('=')?;
                        }
                        let fname = target_name.unwrap_or_else(|| {
                            names.get(field_idx).cloned().unwrap_or_default()
                        });
                        let (fty, foffset) = {
                            let b = st.borrow();
                            let fi = b.fields.get(&fname).ok_or_else(|| {
                                Diagnostic::parse(
                                    self.unknown_pos(),
                                    format!("no member named '{fname}' in this struct/union"),
                                )
                            })?;
                            (fi.ty.clone(), fi.offset)
                        };
                        self.parse_initializer_into(&fty, base_offset + foffset, out)?;
                        field_idx = names.iter().position(|n| *n == fname).unwrap_or(field_idx) + 1;
                        if !self.accept_punct(',')? {
                            break;
                        }
                        if self.peek_is_punct('}')? {
                            break;
                        }
                    }
                }
                self.expect_punct('}')?;
                Ok(())
            }
            scalar => {
                let braced = self.accept_punct('{')?;
                let e = self.parse_assignment_expr()?;
                let e = self.convert_to(e, scalar);
                if braced {
                    self.accept_punct(',')?;
                    self.expect_punct('}')?;
                }
                out.push(InitElem {
                    value: e,
                    offset: base_offset,
                    ctype: scalar.clone(),
                });
                Ok(())
            }
        }
    }

    fn unknown_pos(&self) -> crate::diagnostics::SourcePosition {
        crate::diagnostics::SourcePosition::unknown()
    }
}

/// Designated initializers let a later element overwrite an earlier one at
/// the same offset; a stable sort by offset followed by adjacent dedup
/// (keeping the later entry) reproduces "last designator wins" without
/// tracking occupancy explicitly.
fn finalize_inits(elems: &mut Vec<InitElem>) {
    elems.sort_by_key(|e| e.offset);
    let mut deduped: Vec<InitElem> = Vec::with_capacity(elems.len());
    for e in elems.drain(..) {
        if let Some(last) = deduped.last() {
            if last.offset == e.offset {
                deduped.pop();
            }
        }
        deduped.push(e);
    }
    *elems = deduped;
}
