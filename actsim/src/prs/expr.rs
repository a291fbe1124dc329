//! The pull-expression AST evaluated by each PRS gate.

use actsim_types::{Bit, GlobalOffset};

/// Whether a rule is a normal-strength or weak (keeper-class) pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStrength {
    Normal,
    Weak,
}

/// A pull-up or pull-down boolean expression over circuit nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrsExpr {
    And(Box<PrsExpr>, Box<PrsExpr>),
    Or(Box<PrsExpr>, Box<PrsExpr>),
    Not(Box<PrsExpr>),
    Var(GlobalOffset),
    True,
    False,
}

impl PrsExpr {
    pub fn eval(&self, get: &impl Fn(GlobalOffset) -> Bit) -> Bit {
        match self {
            PrsExpr::And(a, b) => a.eval(get).and(b.eval(get)),
            PrsExpr::Or(a, b) => a.eval(get).or(b.eval(get)),
            PrsExpr::Not(a) => a.eval(get).not(),
            PrsExpr::Var(g) => get(*g),
            PrsExpr::True => Bit::One,
            PrsExpr::False => Bit::Zero,
        }
    }

    /// The set of nodes this expression reads, used when the hierarchy
    /// layer computes fanout by static analysis.
    pub fn referenced_vars(&self, out: &mut Vec<GlobalOffset>) {
        match self {
            PrsExpr::And(a, b) | PrsExpr::Or(a, b) => {
                a.referenced_vars(out);
                b.referenced_vars(out);
            }
            PrsExpr::Not(a) => a.referenced_vars(out),
            PrsExpr::Var(g) => out.push(*g),
            PrsExpr::True | PrsExpr::False => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_of_known_one_and_unknown_is_unknown() {
        let e = PrsExpr::And(Box::new(PrsExpr::True), Box::new(PrsExpr::Var(GlobalOffset(0))));
        assert_eq!(e.eval(&|_| Bit::X), Bit::X);
    }

    #[test]
    fn or_of_known_one_and_unknown_is_one() {
        let e = PrsExpr::Or(Box::new(PrsExpr::True), Box::new(PrsExpr::Var(GlobalOffset(0))));
        assert_eq!(e.eval(&|_| Bit::X), Bit::One);
    }

    #[test]
    fn referenced_vars_collects_all_leaves() {
        let e = PrsExpr::And(
            Box::new(PrsExpr::Var(GlobalOffset(1))),
            Box::new(PrsExpr::Not(Box::new(PrsExpr::Var(GlobalOffset(2))))),
        );
        let mut out = vec![];
        e.referenced_vars(&mut out);
        assert_eq!(out, vec![GlobalOffset(1), GlobalOffset(2)]);
    }
}
