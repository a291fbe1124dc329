//! The straight-line VM that steps a fragmented channel method one opcode
//! at a time, per §4.7.

use actsim_types::GlobalOffset;

/// One opcode of a compiled fragment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragOp {
    Skip,
    /// Write `1` to `var` and propagate.
    BoolT(GlobalOffset),
    /// Write `0` to `var` and propagate.
    BoolF(GlobalOffset),
    /// Evaluate expression `expr` and copy the result into `data_for_recv`.
    SelfOp(u32),
    /// Evaluate expression `expr` and copy the result into `data_for_send`.
    SelfAck(u32),
    /// Evaluate guard `expr`; continue on true, jump to `target` on false.
    /// A backwards jump (`target <= current index`) whose guard is false
    /// suspends the method, returning `target` as the resumption point.
    Sel { expr: u32, target: u32 },
    Goto(u32),
}

/// Host environment a fragment method evaluates against: expression
/// evaluation and boolean writes are owned by the CHP/HSE layer so the
/// channel module stays independent of the expression IR.
pub trait FragEnv {
    fn eval_bool(&mut self, expr: u32) -> bool;
    fn eval_into_recv(&mut self, expr: u32);
    fn eval_into_send(&mut self, expr: u32);
    fn write_bool(&mut self, var: GlobalOffset, value: bool);
}

/// Outcome of running (or resuming) a fragment method to its next
/// suspension point or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Done,
    Suspended(u32),
}

/// Alias kept for readability at call sites that only care about the
/// outcome, not micro-state bookkeeping.
pub type FragResult = RunResult;

/// Execute `ops` starting at `pc`, stopping at completion or at a guard
/// that is not yet satisfied.
pub fn run_method(ops: &[FragOp], pc: u32, env: &mut impl FragEnv) -> RunResult {
    let mut ip = pc;
    loop {
        let Some(op) = ops.get(ip as usize) else {
            return RunResult::Done;
        };
        match op {
            FragOp::Skip => ip += 1,
            FragOp::BoolT(var) => {
                env.write_bool(*var, true);
                ip += 1;
            }
            FragOp::BoolF(var) => {
                env.write_bool(*var, false);
                ip += 1;
            }
            FragOp::SelfOp(expr) => {
                env.eval_into_recv(*expr);
                ip += 1;
            }
            FragOp::SelfAck(expr) => {
                env.eval_into_send(*expr);
                ip += 1;
            }
            FragOp::Goto(target) => ip = *target,
            FragOp::Sel { expr, target } => {
                if env.eval_bool(*expr) {
                    ip += 1;
                } else if *target <= ip {
                    return RunResult::Suspended(*target);
                } else {
                    ip = *target;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestEnv {
        bools: Vec<bool>,
        guard: bool,
    }

    impl FragEnv for TestEnv {
        fn eval_bool(&mut self, _expr: u32) -> bool {
            self.guard
        }
        fn eval_into_recv(&mut self, _expr: u32) {}
        fn eval_into_send(&mut self, _expr: u32) {}
        fn write_bool(&mut self, var: GlobalOffset, value: bool) {
            self.bools[var.0 as usize] = value;
        }
    }

    #[test]
    fn straight_line_program_runs_to_completion() {
        let ops = vec![
            FragOp::BoolT(GlobalOffset(0)),
            FragOp::BoolF(GlobalOffset(1)),
        ];
        let mut env = TestEnv {
            bools: vec![false, true],
            guard: true,
        };
        assert_eq!(run_method(&ops, 0, &mut env), RunResult::Done);
        assert_eq!(env.bools, vec![true, false]);
    }

    #[test]
    fn backwards_false_guard_suspends_at_the_guard() {
        let ops = vec![FragOp::Sel { expr: 0, target: 0 }];
        let mut env = TestEnv {
            bools: vec![],
            guard: false,
        };
        assert_eq!(run_method(&ops, 0, &mut env), RunResult::Suspended(0));
    }

    #[test]
    fn true_guard_falls_through() {
        let ops = vec![FragOp::Sel { expr: 0, target: 5 }, FragOp::BoolT(GlobalOffset(0))];
        let mut env = TestEnv {
            bools: vec![false],
            guard: true,
        };
        assert_eq!(run_method(&ops, 0, &mut env), RunResult::Done);
        assert!(env.bools[0]);
    }
}
