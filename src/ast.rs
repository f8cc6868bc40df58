//! The AST. `Node` carries the three fields every construct needs —
//! `kind`, `ctype` (the expression's type after decay/conversions, or
//! `Ctype::Void` for statements), and a source position — with the
//! kind-specific payload living in `NodeKind`.

use std::cell::RefCell;

use crate::diagnostics::SourcePosition;
use crate::token::Encoding;
use crate::types::Ctype;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    LogNot,
    BitNot,
    AddrOf,
    Deref,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug)]
pub struct InitElem {
    pub value: Node,
    pub offset: u32,
    pub ctype: Ctype,
}

#[derive(Debug)]
pub enum NodeKind {
    IntLit(i64),
    FloatLit {
        value: f64,
        /// Assigned the first time codegen emits this literal to `.data`;
        /// kept in a cell because emission happens on a `&Node`.
        label: RefCell<Option<String>>,
    },
    StrLit {
        value: String,
        encoding: Encoding,
        label: RefCell<Option<String>>,
    },
    LocalVar {
        name: String,
        loff: i32,
    },
    GlobalVar {
        name: String,
        label: String,
    },
    Unary {
        op: UnOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Assign {
        target: Box<Node>,
        value: Box<Node>,
    },
    CompoundAssign {
        op: BinOp,
        target: Box<Node>,
        value: Box<Node>,
    },
    /// Explicit source-level cast, e.g. `(long)x`.
    Cast(Box<Node>),
    /// Implicit conversion inserted by the parser when an operand's type
    /// differs from the type a binary op or assignment settled on.
    Conv(Box<Node>),
    Ternary {
        cond: Box<Node>,
        then_expr: Box<Node>,
        else_expr: Box<Node>,
    },
    Comma(Box<Node>, Box<Node>),
    FuncCall {
        name: String,
        func_ctype: Ctype,
        args: Vec<Node>,
    },
    FuncPtrCall {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    StructRef {
        base: Box<Node>,
        field: String,
        offset: u32,
    },
    VaStart(Box<Node>),
    VaArg(Box<Node>),
    VaEnd(Box<Node>),

    ExprStmt(Box<Node>),
    Compound(Vec<Node>),
    If {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    For {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        step: Option<Box<Node>>,
        body: Box<Node>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    DoWhile {
        cond: Box<Node>,
        body: Box<Node>,
    },
    /// GNU range cases (`case LO ... HI:`) set `low != high`; an ordinary
    /// case sets `low == high`.
    Switch {
        expr: Box<Node>,
        body: Box<Node>,
    },
    Case {
        low: i64,
        high: i64,
        label: String,
    },
    Default {
        label: String,
    },
    Goto {
        label: String,
    },
    Label {
        label: String,
    },
    Break,
    Continue,
    Return(Option<Box<Node>>),
    Decl {
        var: Box<Node>,
        inits: Vec<InitElem>,
    },

    FuncDef {
        name: String,
        params: Vec<Node>,
        locals: Vec<Node>,
        body: Box<Node>,
        is_static: bool,
    },
    GlobalDecl {
        name: String,
        label: String,
        init: Vec<InitElem>,
        is_static: bool,
    },
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub ctype: Ctype,
    pub pos: SourcePosition,
}

impl Node {
    pub fn new(kind: NodeKind, ctype: Ctype, pos: SourcePosition) -> Self {
        Node { kind, ctype, pos }
    }

    /// Statements carry no value; `void` communicates that uniformly
    /// instead of wrapping `ctype` in an `Option` just for this case.
    pub fn stmt(kind: NodeKind, pos: SourcePosition) -> Self {
        Node::new(kind, Ctype::Void, pos)
    }

    pub fn int_lit(value: i64, ctype: Ctype, pos: SourcePosition) -> Self {
        Node::new(NodeKind::IntLit(value), ctype, pos)
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::LocalVar { .. }
                | NodeKind::GlobalVar { .. }
                | NodeKind::StructRef { .. }
                | NodeKind::Unary {
                    op: UnOp::Deref,
                    ..
                }
        )
    }
}
