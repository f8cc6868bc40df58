//! Constant-expression folding for array bounds, bitfield widths, `case`
//! labels, and enumerator values — the only place in the parser where an
//! expression must be reduced to a value rather than left as an AST node.

use crate::ast::{BinOp, Node, NodeKind, UnOp};
use crate::diagnostics::{CResult, Diagnostic};

pub(crate) fn eval_intexpr(node: &Node) -> CResult<i64> {
    match &node.kind {
        NodeKind::IntLit(v) => Ok(*v),
        NodeKind::FloatLit { value, .. } => Ok(*value as i64),
        NodeKind::Cast(inner) | NodeKind::Conv(inner) => eval_intexpr(inner),
        NodeKind::Unary { op, operand } => {
            let v = eval_intexpr(operand)?;
            Ok(match op {
                UnOp::Neg => -v,
                UnOp::BitNot => !v,
                UnOp::LogNot => (v == 0) as i64,
                _ => {
                    return Err(Diagnostic::parse(
                        node.pos.clone(),
                        "not a valid constant expression",
                    ))
                }
            })
        }
        NodeKind::Binary { op, left, right } => {
            let l = eval_intexpr(left)?;
            let r = eval_intexpr(right)?;
            Ok(match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div => {
                    if r == 0 {
                        return Err(Diagnostic::parse(node.pos.clone(), "division by zero in constant expression"));
                    }
                    l.wrapping_div(r)
                }
                BinOp::Mod => {
                    if r == 0 {
                        return Err(Diagnostic::parse(node.pos.clone(), "division by zero in constant expression"));
                    }
                    l.wrapping_rem(r)
                }
                BinOp::Shl => l.wrapping_shl(r as u32),
                BinOp::Shr => l.wrapping_shr(r as u32),
                BinOp::Lt => (l < r) as i64,
                BinOp::Le => (l <= r) as i64,
                BinOp::Gt => (l > r) as i64,
                BinOp::Ge => (l >= r) as i64,
                BinOp::Eq => (l == r) as i64,
                BinOp::Ne => (l != r) as i64,
                BinOp::BitAnd => l & r,
                BinOp::BitOr => l | r,
                BinOp::BitXor => l ^ r,
                BinOp::LogAnd => ((l != 0) && (r != 0)) as i64,
                BinOp::LogOr => ((l != 0) || (r != 0)) as i64,
            })
        }
        NodeKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            if eval_intexpr(cond)? != 0 {
                eval_intexpr(then_expr)
            } else {
                eval_intexpr(else_expr)
            }
        }
        _ => Err(Diagnostic::parse(
            node.pos.clone(),
            "expression is not a compile-time constant",
        )),
    }
}
