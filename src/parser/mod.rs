//! Recursive-descent parser driver: token-stream plumbing, lexical scopes,
//! statement grammar, and top-level (function/global) declarations.
//! Expression grammar lives in `expr.rs`, the declarator/type grammar and
//! initializer flattening in `decl.rs`, constant folding in `constexpr.rs`.

pub(crate) mod constexpr;
mod decl;
mod expr;

use crate::ast::{Node, NodeKind};
use crate::diagnostics::{CResult, Diagnostic, SourcePosition, Warning};
use crate::lexer::Lexer;
use crate::token::{Keyword, Token, TokenKind};
use crate::types::{align_to, Ctype};
use crate::util::OrderedMap;

pub use decl::DeclSpecs;

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Local(i32),
    Global(String),
    EnumConst(i64),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub ctype: Ctype,
    pub kind: SymbolKind,
}

#[derive(Default)]
struct Scope {
    vars: OrderedMap<Symbol>,
    tags: OrderedMap<Ctype>,
    typedefs: OrderedMap<Ctype>,
}

pub struct Parser {
    lexer: Lexer,
    scopes: Vec<Scope>,
    pub warnings: Vec<Warning>,

    // Per-function state, reset by `reset_function_state`.
    locals: Vec<Node>,
    frame_offset: i32,
    func_labels: OrderedMap<String>,
    pending_gotos: Vec<(String, SourcePosition)>,
    current_func_name: Option<String>,
    loop_depth: u32,
    switch_depth: u32,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Parser {
            lexer,
            scopes: vec![Scope::default()],
            warnings: Vec::new(),
            locals: Vec::new(),
            frame_offset: 0,
            func_labels: OrderedMap::new(),
            pending_gotos: Vec::new(),
            current_func_name: None,
            loop_depth: 0,
            switch_depth: 0,
        }
    }

    pub fn parse_translation_unit(mut self) -> CResult<(Vec<Node>, Vec<Warning>)> {
        let mut top = Vec::new();
        loop {
            let t = self.peek_token()?;
            if t.is_eof() {
                break;
            }
            top.push(self.parse_external_decl()?);
        }
        self.warnings.extend(self.lexer_warnings());
        Ok((top, self.warnings))
    }

    fn lexer_warnings(&mut self) -> Vec<Warning> {
        // File-stack line-splice warnings surface through the lexer; drained
        // here so callers get one combined warning list.
        self.lexer.drain_warnings()
    }

    // ---- token-stream plumbing -------------------------------------------

    fn next_token(&mut self) -> CResult<Token> {
        self.lexer.next_token()
    }

    fn peek_token(&mut self) -> CResult<Token> {
        let t = self.lexer.next_token()?;
        self.lexer.unget_token(t.clone());
        Ok(t)
    }

    fn unget_token(&mut self, t: Token) {
        self.lexer.unget_token(t);
    }

    fn current_pos(&mut self) -> CResult<SourcePosition> {
        Ok(self.peek_token()?.pos)
    }

    fn accept(&mut self, kw: Keyword) -> CResult<bool> {
        let t = self.peek_token()?;
        if t.is_keyword(kw) {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn accept_punct(&mut self, c: char) -> CResult<bool> {
        self.accept(Keyword::Punct(c))
    }

    fn peek_is_punct(&mut self, c: char) -> CResult<bool> {
        Ok(self.peek_token()?.is_punct(c))
    }

    fn expect(&mut self, kw: Keyword) -> CResult<()> {
        let t = self.next_token()?;
        if t.is_keyword(kw) {
            Ok(())
        } else {
            Err(Diagnostic::parse(
                t.pos,
                format!("expected {kw:?}, found {}", t.describe()),
            ))
        }
    }

    fn expect_punct(&mut self, c: char) -> CResult<()> {
        self.expect(Keyword::Punct(c))
    }

    fn accept_ident(&mut self) -> CResult<Option<String>> {
        let t = self.peek_token()?;
        if let TokenKind::Ident(name) = &t.kind {
            let name = name.clone();
            self.next_token()?;
            Ok(Some(name))
        } else {
            Ok(None)
        }
    }

    fn expect_ident(&mut self) -> CResult<String> {
        let t = self.next_token()?;
        match t.kind {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(Diagnostic::parse(
                t.pos,
                format!("expected identifier, found {}", t.describe()),
            )),
        }
    }

    fn warn(&mut self, pos: SourcePosition, msg: impl Into<String>) {
        self.warnings.push(Warning::new(pos, msg));
    }

    // ---- scopes -------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name: &str, sym: Symbol) {
        self.scopes.last_mut().unwrap().vars.insert(name, sym);
    }

    fn lookup_var(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.vars.get(name))
    }

    fn declare_typedef(&mut self, name: &str, ty: Ctype) {
        self.scopes.last_mut().unwrap().typedefs.insert(name, ty);
    }

    fn lookup_typedef(&self, name: &str) -> Option<&Ctype> {
        self.scopes.iter().rev().find_map(|s| s.typedefs.get(name))
    }

    fn declare_tag(&mut self, name: &str, ty: Ctype) {
        // Tags are only ever looked up / redeclared at the scope where they
        // were first seen; file scope is where struct/union/enum names
        // almost always live for this subset.
        self.scopes.last_mut().unwrap().tags.insert(name, ty);
    }

    fn lookup_tag(&self, name: &str) -> Option<&Ctype> {
        self.scopes.iter().rev().find_map(|s| s.tags.get(name))
    }

    // ---- per-function bookkeeping --------------------------------------

    fn reset_function_state(&mut self, name: &str) {
        self.locals.clear();
        self.frame_offset = 0;
        self.func_labels = OrderedMap::new();
        self.pending_gotos.clear();
        self.current_func_name = Some(name.to_string());
        self.loop_depth = 0;
        self.switch_depth = 0;
    }

    fn alloc_frame_slot(&mut self, ty: &Ctype) -> i32 {
        let size = align_to(ty.size().max(1), 8) as i32;
        self.frame_offset -= size;
        self.frame_offset
    }

    fn add_local(&mut self, name: &str, ty: Ctype, pos: SourcePosition) -> Node {
        let loff = self.alloc_frame_slot(&ty);
        self.declare_var(
            name,
            Symbol {
                ctype: ty.clone(),
                kind: SymbolKind::Local(loff),
            },
        );
        let node = Node::new(
            NodeKind::LocalVar {
                name: name.to_string(),
                loff,
            },
            ty,
            pos,
        );
        self.locals.push(clone_local(&node));
        node
    }

    fn emitted_label(&mut self, source_name: &str) -> String {
        if let Some(l) = self.func_labels.get(source_name) {
            return l.clone();
        }
        let func = self.current_func_name.clone().unwrap_or_default();
        let label = format!(".L{func}_{source_name}");
        self.func_labels.insert(source_name, label.clone());
        label
    }

    // ---- top-level ------------------------------------------------------

    fn parse_external_decl(&mut self) -> CResult<Node> {
        let pos = self.current_pos()?;
        let specs = self.parse_decl_specs()?;
        if self.accept_punct(';')? {
            // A bare struct/union/enum declaration with no declarator.
            return Ok(Node::stmt(NodeKind::Compound(Vec::new()), pos));
        }
        let (name, ty) = self.parse_declarator(specs.base.clone())?;
        let name = name.ok_or_else(|| {
            Diagnostic::parse(pos.clone(), "declaration is missing an identifier")
        })?;

        if ty.is_func() && self.peek_is_punct('{')? {
            return self.parse_function_definition(name, ty, specs.is_static, pos);
        }

        if ty.is_func() {
            // A prototype with no body: record its type for call sites to
            // check against, but emit nothing — there is no storage to
            // declare, and a later definition (or none, for an extern
            // library function) supplies the actual code.
            self.declare_var(
                &name,
                Symbol {
                    ctype: ty,
                    kind: SymbolKind::Global(name.clone()),
                },
            );
            self.expect_punct(';')?;
            return Ok(Node::stmt(NodeKind::Compound(Vec::new()), pos));
        }

        // Global variable (with possible comma-separated siblings and
        // trailing initializer).
        let mut globals = Vec::new();
        let mut cur_name = name;
        let mut cur_ty = ty;
        loop {
            let label = cur_name.clone();
            let init = if self.accept_punct('=')? {
                self.parse_global_initializer(&mut cur_ty)?
            } else {
                Vec::new()
            };
            self.declare_var(
                &cur_name,
                Symbol {
                    ctype: cur_ty.clone(),
                    kind: SymbolKind::Global(label.clone()),
                },
            );
            globals.push(Node::new(
                NodeKind::GlobalDecl {
                    name: cur_name.clone(),
                    label,
                    init,
                    is_static: specs.is_static,
                },
                cur_ty.clone(),
                pos.clone(),
            ));
            if !self.accept_punct(',')? {
                break;
            }
            let (n2, t2) = self.parse_declarator(specs.base.clone())?;
            cur_name = n2.ok_or_else(|| {
                Diagnostic::parse(pos.clone(), "declaration is missing an identifier")
            })?;
            cur_ty = t2;
        }
        self.expect_punct(';')?;
        if globals.len() == 1 {
            Ok(globals.pop().unwrap())
        } else {
            Ok(Node::stmt(NodeKind::Compound(globals), pos))
        }
    }

    fn parse_function_definition(
        &mut self,
        name: String,
        ty: Ctype,
        is_static: bool,
        pos: SourcePosition,
    ) -> CResult<Node> {
        let (return_type, param_types, has_varargs) = match &ty {
            Ctype::Func {
                return_type,
                params,
                has_varargs,
            } => ((**return_type).clone(), params.clone(), *has_varargs),
            _ => unreachable!("caller checked is_func"),
        };

        self.reset_function_state(&name);
        self.declare_var(
            &name,
            Symbol {
                ctype: ty.clone(),
                kind: SymbolKind::Global(name.clone()),
            },
        );
        self.push_scope();

        // Re-parse the parameter list's declarators to get names in this
        // fresh scope (the prototype pass above only recorded types).
        self.expect_punct('(')?;
        let mut param_nodes = Vec::new();
        if !self.peek_is_punct(')')? {
            loop {
                if self.peek_token()?.is_keyword(Keyword::Ellipsis) {
                    self.next_token()?;
                    break;
                }
                let specs = self.parse_decl_specs()?;
                let (pname, pty) = self.parse_declarator(specs.base)?;
                let pty = pty.decay();
                let pname = pname.unwrap_or_else(|| format!("__anon{}", param_nodes.len()));
                let node = self.add_local(&pname, pty, pos.clone());
                param_nodes.push(node);
                if !self.accept_punct(',')? {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        let _ = param_types;

        let body = self.parse_compound_stmt()?;
        self.pop_scope();

        if let Some((label, lpos)) = self.pending_gotos.first().cloned() {
            if !self.func_labels.contains_key(&label) {
                return Err(Diagnostic::parse(lpos, format!("goto to undefined label '{label}'")));
            }
        }

        let func_ty = Ctype::func(return_type, param_nodes.iter().map(|p| p.ctype.clone()).collect(), has_varargs);
        Ok(Node::stmt(
            NodeKind::FuncDef {
                name,
                params: param_nodes,
                locals: std::mem::take(&mut self.locals),
                body: Box::new(body),
                is_static,
            },
            pos,
        ))
        .map(|mut n| {
            n.ctype = func_ty;
            n
        })
    }

    // ---- statements -------------------------------------------------------

    fn parse_stmt(&mut self) -> CResult<Node> {
        let pos = self.current_pos()?;
        if self.peek_is_punct('{')? {
            return self.parse_compound_stmt();
        }
        if self.accept(Keyword::If)? {
            return self.parse_if_stmt(pos);
        }
        if self.accept(Keyword::For)? {
            return self.parse_for_stmt(pos);
        }
        if self.accept(Keyword::While)? {
            return self.parse_while_stmt(pos);
        }
        if self.accept(Keyword::Do)? {
            return self.parse_do_stmt(pos);
        }
        if self.accept(Keyword::Switch)? {
            return self.parse_switch_stmt(pos);
        }
        if self.accept(Keyword::Case)? {
            return self.parse_case_stmt(pos);
        }
        if self.accept(Keyword::Default)? {
            self.expect_punct(':')?;
            if self.switch_depth == 0 {
                return Err(Diagnostic::parse(pos, "default label not within a switch statement"));
            }
            let label = self.emitted_label("default");
            return Ok(Node::stmt(NodeKind::Default { label }, pos));
        }
        if self.accept(Keyword::Break)? {
            self.expect_punct(';')?;
            if self.loop_depth == 0 && self.switch_depth == 0 {
                return Err(Diagnostic::parse(pos, "break statement not within loop or switch"));
            }
            return Ok(Node::stmt(NodeKind::Break, pos));
        }
        if self.accept(Keyword::Continue)? {
            self.expect_punct(';')?;
            if self.loop_depth == 0 {
                return Err(Diagnostic::parse(pos, "continue statement not within a loop"));
            }
            return Ok(Node::stmt(NodeKind::Continue, pos));
        }
        if self.accept(Keyword::Goto)? {
            let name = self.expect_ident()?;
            self.expect_punct(';')?;
            let label = self.emitted_label(&name);
            self.pending_gotos.push((name, pos.clone()));
            return Ok(Node::stmt(NodeKind::Goto { label }, pos));
        }
        if self.accept(Keyword::Return)? {
            if self.accept_punct(';')? {
                return Ok(Node::stmt(NodeKind::Return(None), pos));
            }
            let e = self.parse_expr()?;
            self.expect_punct(';')?;
            return Ok(Node::stmt(NodeKind::Return(Some(Box::new(e))), pos));
        }
        if self.accept_punct(';')? {
            return Ok(Node::stmt(NodeKind::Compound(Vec::new()), pos));
        }
        // Labeled statement: IDENT ':' stmt
        if let TokenKind::Ident(name) = self.peek_token()?.kind {
            let save = self.next_token()?;
            if self.peek_is_punct(':')? {
                self.next_token()?;
                let label = self.emitted_label(&name);
                self.func_labels.insert(name, label.clone());
                let stmt = self.parse_stmt()?;
                return Ok(Node::stmt(
                    NodeKind::Compound(vec![Node::stmt(NodeKind::Label { label }, pos.clone()), stmt]),
                    pos,
                ));
            }
            self.unget_token(save);
        }
        if self.is_decl_start()? {
            return self.parse_local_decl(pos);
        }
        let e = self.parse_expr()?;
        self.expect_punct(';')?;
        Ok(Node::stmt(NodeKind::ExprStmt(Box::new(e)), pos))
    }

    fn parse_compound_stmt(&mut self) -> CResult<Node> {
        let pos = self.current_pos()?;
        self.expect_punct('{')?;
        self.push_scope();
        let mut stmts = Vec::new();
        while !self.peek_is_punct('}')? {
            stmts.push(self.parse_stmt()?);
        }
        self.expect_punct('}')?;
        self.pop_scope();
        Ok(Node::stmt(NodeKind::Compound(stmts), pos))
    }

    fn parse_if_stmt(&mut self, pos: SourcePosition) -> CResult<Node> {
        self.expect_punct('(')?;
        let cond = self.parse_expr()?;
        let cond = self.to_bool_context(cond);
        self.expect_punct(')')?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.accept(Keyword::Else)? {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Node::stmt(
            NodeKind::If {
                cond: Box::new(cond),
                then_branch,
                else_branch,
            },
            pos,
        ))
    }

    fn parse_for_stmt(&mut self, pos: SourcePosition) -> CResult<Node> {
        self.expect_punct('(')?;
        self.push_scope();
        let init = if self.peek_is_punct(';')? {
            None
        } else if self.is_decl_start()? {
            Some(Box::new(self.parse_local_decl(self.current_pos()?)?))
        } else {
            let e = self.parse_expr()?;
            self.expect_punct(';')?;
            Some(Box::new(Node::stmt(NodeKind::ExprStmt(Box::new(e)), pos.clone())))
        };
        let cond = if self.peek_is_punct(';')? {
            None
        } else {
            let c = self.parse_expr()?;
            Some(Box::new(self.to_bool_context(c)))
        };
        self.expect_punct(';')?;
        let step = if self.peek_is_punct(')')? {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect_punct(')')?;
        self.loop_depth += 1;
        let body = Box::new(self.parse_stmt()?);
        self.loop_depth -= 1;
        self.pop_scope();
        Ok(Node::stmt(NodeKind::For { init, cond, step, body }, pos))
    }

    fn parse_while_stmt(&mut self, pos: SourcePosition) -> CResult<Node> {
        self.expect_punct('(')?;
        let cond = self.parse_expr()?;
        let cond = self.to_bool_context(cond);
        self.expect_punct(')')?;
        self.loop_depth += 1;
        let body = Box::new(self.parse_stmt()?);
        self.loop_depth -= 1;
        Ok(Node::stmt(NodeKind::While { cond: Box::new(cond), body }, pos))
    }

    fn parse_do_stmt(&mut self, pos: SourcePosition) -> CResult<Node> {
        self.loop_depth += 1;
        let body = Box::new(self.parse_stmt()?);
        self.loop_depth -= 1;
        self.expect(Keyword::While)?;
        self.expect_punct('(')?;
        let cond = self.parse_expr()?;
        let cond = self.to_bool_context(cond);
        self.expect_punct(')')?;
        self.expect_punct(';')?;
        Ok(Node::stmt(NodeKind::DoWhile { cond: Box::new(cond), body }, pos))
    }

    fn parse_switch_stmt(&mut self, pos: SourcePosition) -> CResult<Node> {
        self.expect_punct('(')?;
        let expr = self.parse_expr()?;
        self.expect_punct(')')?;
        self.switch_depth += 1;
        let body = Box::new(self.parse_stmt()?);
        self.switch_depth -= 1;
        Ok(Node::stmt(NodeKind::Switch { expr: Box::new(expr), body }, pos))
    }

    fn parse_case_stmt(&mut self, pos: SourcePosition) -> CResult<Node> {
        if self.switch_depth == 0 {
            return Err(Diagnostic::parse(pos, "case label not within a switch statement"));
        }
        let low_expr = self.parse_conditional_expr()?;
        let low = constexpr::eval_intexpr(&low_expr)?;
        // GNU range case `case LO ... HI:` — the three dots lex as a single
        // Ellipsis token, the same one used for variadic parameter lists.
        let high = if self.accept(Keyword::Ellipsis)? {
            let high_expr = self.parse_conditional_expr()?;
            constexpr::eval_intexpr(&high_expr)?
        } else {
            low
        };
        self.expect_punct(':')?;
        let label = self.emitted_label(&format!("case_{low}_{high}"));
        Ok(Node::stmt(NodeKind::Case { low, high, label }, pos))
    }

    fn is_decl_start(&mut self) -> CResult<bool> {
        let t = self.peek_token()?;
        Ok(decl::is_decl_specifier_token(self, &t))
    }

    fn parse_local_decl(&mut self, pos: SourcePosition) -> CResult<Node> {
        let specs = self.parse_decl_specs()?;
        if specs.is_typedef {
            loop {
                let (name, ty) = self.parse_declarator(specs.base.clone())?;
                let name = name.ok_or_else(|| {
                    Diagnostic::parse(pos.clone(), "typedef is missing a name")
                })?;
                self.declare_typedef(&name, ty);
                if !self.accept_punct(',')? {
                    break;
                }
            }
            self.expect_punct(';')?;
            return Ok(Node::stmt(NodeKind::Compound(Vec::new()), pos));
        }

        let mut decls = Vec::new();
        loop {
            let (name, mut ty) = self.parse_declarator(specs.base.clone())?;
            let name = name.ok_or_else(|| {
                Diagnostic::parse(pos.clone(), "declaration is missing an identifier")
            })?;
            let var_pos = pos.clone();
            let inits = if self.accept_punct('=')? {
                self.parse_local_initializer(&mut ty)?
            } else {
                Vec::new()
            };
            let var = self.add_local(&name, ty, var_pos.clone());
            decls.push(Node::stmt(
                NodeKind::Decl {
                    var: Box::new(var),
                    inits,
                },
                var_pos,
            ));
            if !self.accept_punct(',')? {
                break;
            }
        }
        self.expect_punct(';')?;
        if decls.len() == 1 {
            Ok(decls.pop().unwrap())
        } else {
            Ok(Node::stmt(NodeKind::Compound(decls), pos))
        }
    }
}

/// `Node` has no `Clone` impl (the AST owns its subtrees); local-variable
/// declaration sites need two independent handles to the same leaf
/// (`locals` for frame layout, the expression tree for the use at the
/// declaration itself), so this makes a second leaf node by hand instead of
/// deriving `Clone` crate-wide just for this one narrow case.
fn clone_local(n: &Node) -> Node {
    match &n.kind {
        NodeKind::LocalVar { name, loff } => Node::new(
            NodeKind::LocalVar {
                name: name.clone(),
                loff: *loff,
            },
            n.ctype.clone(),
            n.pos.clone(),
        ),
        _ => unreachable!("clone_local only used for LocalVar nodes"),
    }
}
