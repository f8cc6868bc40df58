//! Statement codegen: compound blocks, declarations, `if`, the three loop
//! forms, `switch`/`case`/`default`, `goto`/labels, `break`/`continue`, and
//! `return`. Ported from 8cc's `emit_if`/`emit_for`/`emit_while`/`emit_do`
//! (the shared "begin/step/end label triple with saved/restored
//! `lbreak`/`lcontinue`" pattern) and `emit_switch`/`emit_case`.

use crate::ast::{InitElem, Node, NodeKind};
use crate::diagnostics::{CResult, Diagnostic};

use super::state::CodeGen;

impl CodeGen {
    pub(super) fn emit_stmt(&mut self, node: &Node) -> CResult<()> {
        match &node.kind {
            NodeKind::ExprStmt(e) => self.emit_expr(e),
            NodeKind::Compound(stmts) => {
                for s in stmts {
                    self.emit_stmt(s)?;
                }
                Ok(())
            }
            NodeKind::Decl { var, inits } => self.emit_decl(var, inits),
            NodeKind::If { cond, then_branch, else_branch } => {
                self.emit_if(cond, then_branch, else_branch.as_deref())
            }
            NodeKind::For { init, cond, step, body } => {
                self.emit_for(init.as_deref(), cond.as_deref(), step.as_deref(), body)
            }
            NodeKind::While { cond, body } => self.emit_while(cond, body),
            NodeKind::DoWhile { cond, body } => self.emit_do_while(cond, body),
            NodeKind::Switch { expr, body } => self.emit_switch(expr, body),
            NodeKind::Case { label, .. } => self.emit_label(label),
            NodeKind::Default { label } => self.emit_label(label),
            NodeKind::Goto { label } => self.emit_jmp(label),
            NodeKind::Label { label } => self.emit_label(label),
            NodeKind::Break => {
                let l = self
                    .lbreak
                    .clone()
                    .ok_or_else(|| Diagnostic::internal("break outside a loop or switch"))?;
                self.emit_jmp(&l)
            }
            NodeKind::Continue => {
                let l = self
                    .lcontinue
                    .clone()
                    .ok_or_else(|| Diagnostic::internal("continue outside a loop"))?;
                self.emit_jmp(&l)
            }
            NodeKind::Return(value) => self.emit_return(value.as_deref()),
            _ => {
                // A bare expression used as a statement without the
                // `ExprStmt` wrapper (shouldn't happen, but harmless).
                self.emit_expr(node)
            }
        }
    }

    fn emit_decl(&mut self, var: &Node, inits: &[InitElem]) -> CResult<()> {
        let loff = match &var.kind {
            NodeKind::LocalVar { loff, .. } => *loff,
            _ => return Err(Diagnostic::internal("declaration target is not a local variable")),
        };
        let base = self.local_offset(loff);
        self.emit_zero_fill(base, var.ctype.size())?;
        for elem in inits {
            self.emit_expr(&elem.value)?;
            self.emit_load_convert(&elem.ctype, &elem.value.ctype)?;
            self.emit_lsave(&elem.ctype, base + elem.offset as i32)?;
        }
        Ok(())
    }

    /// Zero-fills `size` bytes starting at `base(%rbp)` before running the
    /// initializer list, so padding and any uninitialized tail reads as 0
    /// (needed for e.g. a partially-initialized array or struct).
    fn emit_zero_fill(&mut self, base: i32, size: u32) -> CResult<()> {
        let mut off = 0u32;
        while off + 4 <= size {
            self.emit(format!("movl $0, {}(%rbp)", base + off as i32))?;
            off += 4;
        }
        while off < size {
            self.emit(format!("movb $0, {}(%rbp)", base + off as i32))?;
            off += 1;
        }
        Ok(())
    }

    fn emit_if(&mut self, cond: &Node, then_branch: &Node, else_branch: Option<&Node>) -> CResult<()> {
        self.emit_ternary_core(
            cond,
            |g| g.emit_stmt(then_branch),
            |g| {
                if let Some(e) = else_branch {
                    g.emit_stmt(e)
                } else {
                    Ok(())
                }
            },
            else_branch.is_some(),
        )
    }

    fn emit_for(
        &mut self,
        init: Option<&Node>,
        cond: Option<&Node>,
        step: Option<&Node>,
        body: &Node,
    ) -> CResult<()> {
        if let Some(init) = init {
            self.emit_stmt(init)?;
        }
        let lbegin = self.make_label();
        let lstep = self.make_label();
        let lend = self.make_label();
        let (saved_break, saved_continue) = (self.lbreak.take(), self.lcontinue.take());
        self.lbreak = Some(lend.clone());
        self.lcontinue = Some(lstep.clone());

        self.emit_label(&lbegin)?;
        if let Some(cond) = cond {
            self.emit_expr(cond)?;
            self.emit_je(&lend)?;
        }
        self.emit_stmt(body)?;
        self.emit_label(&lstep)?;
        if let Some(step) = step {
            self.emit_expr(step)?;
        }
        self.emit_jmp(&lbegin)?;
        self.emit_label(&lend)?;

        self.lbreak = saved_break;
        self.lcontinue = saved_continue;
        Ok(())
    }

    fn emit_while(&mut self, cond: &Node, body: &Node) -> CResult<()> {
        let lbegin = self.make_label();
        let lend = self.make_label();
        let (saved_break, saved_continue) = (self.lbreak.take(), self.lcontinue.take());
        self.lbreak = Some(lend.clone());
        self.lcontinue = Some(lbegin.clone());

        self.emit_label(&lbegin)?;
        self.emit_expr(cond)?;
        self.emit_je(&lend)?;
        self.emit_stmt(body)?;
        self.emit_jmp(&lbegin)?;
        self.emit_label(&lend)?;

        self.lbreak = saved_break;
        self.lcontinue = saved_continue;
        Ok(())
    }

    fn emit_do_while(&mut self, cond: &Node, body: &Node) -> CResult<()> {
        let lbegin = self.make_label();
        let lcontinue = self.make_label();
        let lend = self.make_label();
        let (saved_break, saved_continue) = (self.lbreak.take(), self.lcontinue.take());
        self.lbreak = Some(lend.clone());
        self.lcontinue = Some(lcontinue.clone());

        self.emit_label(&lbegin)?;
        self.emit_stmt(body)?;
        self.emit_label(&lcontinue)?;
        self.emit_expr(cond)?;
        self.emit("test %rax, %rax")?;
        self.emit(format!("jne {lbegin}"))?;
        self.emit_label(&lend)?;

        self.lbreak = saved_break;
        self.lcontinue = saved_continue;
        Ok(())
    }

    /// `switch` evaluates the controlling expression then runs a dispatch
    /// chain of comparisons built by pre-scanning the body for its
    /// `case`/`default` markers (see `collect_cases`) — one `cmp`+`je` (or
    /// range double-compare) per case, jumping to that case's own label.
    /// The body is then emitted normally once, with each `case`/`default`
    /// node just dropping its label in place; ordinary fallthrough between
    /// cases is just the body's straight-line code, same as real `switch`.
    fn emit_switch(&mut self, expr: &Node, body: &Node) -> CResult<()> {
        let lend = self.make_label();
        let saved_break = self.lbreak.take();
        self.lbreak = Some(lend.clone());

        self.emit_expr(expr)?;
        let mut cases = Vec::new();
        let mut default_label = None;
        collect_cases(body, &mut cases, &mut default_label);
        for (low, high, label) in &cases {
            if low == high {
                self.emit(format!("cmp ${low}, %eax"))?;
                self.emit(format!("je {label}"))?;
            } else {
                let next = self.make_label();
                self.emit(format!("cmp ${low}, %eax"))?;
                self.emit(format!("jl {next}"))?;
                self.emit(format!("cmp ${high}, %eax"))?;
                self.emit(format!("jg {next}"))?;
                self.emit_jmp(label)?;
                self.emit_label(&next)?;
            }
        }
        match &default_label {
            Some(d) => self.emit_jmp(d)?,
            None => self.emit_jmp(&lend)?,
        }
        self.emit_stmt(body)?;
        self.emit_label(&lend)?;

        self.lbreak = saved_break;
        Ok(())
    }

    fn emit_return(&mut self, value: Option<&Node>) -> CResult<()> {
        if let Some(value) = value {
            self.emit_expr(value)?;
        }
        self.emit("leave")?;
        self.emit("ret")
    }
}

/// Walks a switch body collecting every `case`/`default` marker's target
/// label, without descending into a nested `switch` (that one owns its own
/// cases) or across a function boundary (there isn't one inside a body).
fn collect_cases<'a>(node: &'a Node, cases: &mut Vec<(i64, i64, &'a str)>, default_label: &mut Option<String>) {
    match &node.kind {
        NodeKind::Compound(stmts) => {
            for s in stmts {
                collect_cases(s, cases, default_label);
            }
        }
        NodeKind::Case { low, high, label } => cases.push((*low, *high, label.as_str())),
        NodeKind::Default { label } => *default_label = Some(label.clone()),
        NodeKind::If { then_branch, else_branch, .. } => {
            collect_cases(then_branch, cases, default_label);
            if let Some(e) = else_branch {
                collect_cases(e, cases, default_label);
            }
        }
        NodeKind::For { body, .. } | NodeKind::While { body, .. } | NodeKind::DoWhile { body, .. } => {
            collect_cases(body, cases, default_label);
        }
        NodeKind::Switch { .. } => {}
        _ => {}
    }
}
