//! Folding of `+` chains over adjacent literals of the same kind.
//!
//! `"a" + "b" + x + [1] + [2]` is compiled as `"ab" + x + [1, 2]`. Only
//! string, bytes, list-display and tuple-display operands fold; the order of
//! evaluation and every remaining `+` (with its position, for errors) is
//! preserved.

use crate::ast::{BinaryOp, Expr, Literal};
use crate::token::Position;

/// One operand of an n-ary sum after folding.
#[derive(Debug)]
pub(super) enum Summand<'a> {
    Expr(&'a Expr),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<&'a Expr>),
    Tuple(Vec<&'a Expr>),
}

/// A summand and the position of the `+` before it (`None` for the first).
#[derive(Debug)]
pub(super) struct Term<'a> {
    pub(super) summand: Summand<'a>,
    pub(super) plus_pos: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Bytes,
    List,
    Tuple,
}

fn kind(e: &Expr) -> Option<Kind> {
    match e {
        Expr::Literal {
            value: Literal::Str(_), ..
        } => Some(Kind::Str),
        Expr::Literal {
            value: Literal::Bytes(_),
            ..
        } => Some(Kind::Bytes),
        Expr::List { .. } => Some(Kind::List),
        Expr::Tuple { .. } => Some(Kind::Tuple),
        _ => None,
    }
}

/// Operands of the left-leaning tree of `+` rooted at `e`, in source order.
fn operands(e: &Expr) -> Vec<(&Expr, Option<Position>)> {
    let mut out = Vec::with_capacity(2);
    let mut plus = e;
    while let Expr::Binary {
        op: BinaryOp::Plus,
        x,
        y,
        op_pos,
    } = plus
    {
        out.push((y.unparen(), Some(*op_pos)));
        let left = x.unparen();
        if !matches!(left, Expr::Binary { op: BinaryOp::Plus, .. }) {
            out.push((left, None));
            break;
        }
        plus = left;
    }
    out.reverse();
    out
}

fn fold<'a>(kind: Kind, run: &[(&'a Expr, Option<Position>)]) -> Summand<'a> {
    let exprs = run.iter().map(|&(e, _)| e);
    match kind {
        Kind::Str => Summand::Str(
            exprs
                .map(|e| match e {
                    Expr::Literal {
                        value: Literal::Str(s), ..
                    } => s.as_str(),
                    _ => unreachable!(),
                })
                .collect(),
        ),
        Kind::Bytes => Summand::Bytes(
            exprs
                .flat_map(|e| match e {
                    Expr::Literal {
                        value: Literal::Bytes(b),
                        ..
                    } => b.iter().copied(),
                    _ => unreachable!(),
                })
                .collect(),
        ),
        Kind::List => Summand::List(
            exprs
                .flat_map(|e| match e {
                    Expr::List { elems, .. } => elems.iter(),
                    _ => unreachable!(),
                })
                .collect(),
        ),
        Kind::Tuple => Summand::Tuple(
            exprs
                .flat_map(|e| match e {
                    Expr::Tuple { elems, .. } => elems.iter(),
                    _ => unreachable!(),
                })
                .collect(),
        ),
    }
}

/// Flattens the sum `e` (whose root must be a `+`) and folds runs of
/// two or more adjacent foldable operands of the same kind.
pub(super) fn fold_sum(e: &Expr) -> Vec<Term<'_>> {
    let args = operands(e);
    let mut terms = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        let (first, plus_pos) = args[i];
        let mut j = i + 1;
        let summand = match kind(first) {
            Some(k) => {
                while j < args.len() && kind(args[j].0) == Some(k) {
                    j += 1;
                }
                if j > i + 1 { fold(k, &args[i..j]) } else { Summand::Expr(first) }
            }
            None => Summand::Expr(first),
        };
        terms.push(Term { summand, plus_pos });
        i = j;
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_expr;

    #[test]
    fn folds_adjacent_strings_around_other_operands() {
        let e = parse_expr(r#""a" + "b" + x + "c" + "d" + "e""#).expect("parse");
        let terms = fold_sum(&e);
        assert_eq!(terms.len(), 3);
        assert!(matches!(&terms[0].summand, Summand::Str(s) if s == "ab"));
        assert!(terms[0].plus_pos.is_none());
        assert!(matches!(terms[1].summand, Summand::Expr(Expr::Ident(_))));
        assert!(matches!(&terms[2].summand, Summand::Str(s) if s == "cde"));
        assert!(terms[2].plus_pos.is_some());
    }

    #[test]
    fn folds_lists_and_tuples_separately() {
        let e = parse_expr("[1] + [2, 3] + (4,) + (5, 6)").expect("parse");
        let terms = fold_sum(&e);
        assert_eq!(terms.len(), 2);
        assert!(matches!(&terms[0].summand, Summand::List(elems) if elems.len() == 3));
        assert!(matches!(&terms[1].summand, Summand::Tuple(elems) if elems.len() == 3));
    }

    #[test]
    fn single_literals_are_left_alone() {
        let e = parse_expr(r#"1 + "a" + b"x""#).expect("parse");
        let terms = fold_sum(&e);
        assert_eq!(terms.len(), 3);
        assert!(terms.iter().all(|t| matches!(t.summand, Summand::Expr(_))));
    }

    #[test]
    fn right_nested_sums_are_one_operand() {
        let e = parse_expr(r#""a" + ("b" + "c")"#).expect("parse");
        let terms = fold_sum(&e);
        assert_eq!(terms.len(), 2);
        assert!(matches!(terms[1].summand, Summand::Expr(Expr::Binary { .. })));
    }
}
