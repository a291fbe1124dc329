//! Scenario S2 (arbiter fairness) plus the exclusivity mutual-exclusion
//! invariant.

mod test_helpers;

use actsim::chp::{ChpHost, DerefDescriptor, Expr, ExprArena, Stmt};
use actsim::config::SimConfig;
use actsim::constraints::{Direction, Policy};
use actsim::{Bit, Simulator, WideInt};

use test_helpers::{build_graph, init_tracing, start_actor};

/// A `SelectNondet` with two unconditionally true guards must pick one
/// of them via arbitration, with neither the deterministic
/// `MultiGuardTrue` warning (that's only for `Select`) nor a stall.
#[test]
fn selectnondet_with_two_true_guards_picks_one_branch_without_warning() {
    init_tracing();
    let mut sim = Simulator::new(SimConfig::default(), 3);
    let marker = sim.alloc_ints(1, 8);

    let mut exprs = ExprArena::new();
    let true1 = exprs.push(Expr::Const(WideInt::from_u64(1, 1).unwrap()));
    let true2 = exprs.push(Expr::Const(WideInt::from_u64(1, 1).unwrap()));
    let val0 = exprs.push(Expr::Const(WideInt::from_u64(8, 0).unwrap()));
    let val1 = exprs.push(Expr::Const(WideInt::from_u64(8, 1).unwrap()));

    let branch0 = Stmt::Assign {
        target: DerefDescriptor::scalar(marker, 8, false),
        expr: val0,
        is_struct: false,
    };
    let branch1 = Stmt::Assign {
        target: DerefDescriptor::scalar(marker, 8, false),
        expr: val1,
        is_struct: false,
    };
    let top = Stmt::SelectNondet(
        vec![(true1, branch0), (true2, branch1)],
        vec![(false, false), (false, false)],
    );
    let graph = build_graph(&top, exprs);

    let id = sim.alloc_actor_id();
    sim.register_chp_actor(id, graph);
    start_actor(&mut sim, id);
    sim.run_until_empty();

    let chosen = sim.state().get_int(marker).dec_print();
    assert!(chosen == "0" || chosen == "1");
    assert!(sim.warnings().is_empty());
}

/// Over 1000 draws from a seeded arbiter, neither outcome should vanish
/// for a whole 100-iteration window, and no window should skew beyond a
/// 3:1 ratio.
#[test]
fn seeded_arbitration_avoids_starvation_over_any_hundred_iteration_window() {
    let mut sim = Simulator::new(SimConfig::default(), 42);
    let choices: Vec<usize> = (0..1000)
        .map(|_| ChpHost::choose_arbitrated(&mut sim, 2))
        .collect();

    assert!(choices.contains(&0));
    assert!(choices.contains(&1));

    for window in choices.windows(100) {
        let count0 = window.iter().filter(|&&c| c == 0).count();
        let count1 = window.len() - count0;
        assert!(
            count0 > 0 && count1 > 0,
            "a branch starved for a full 100-iteration window: {count0} vs {count1}"
        );
        let (hi, lo) = if count0 > count1 {
            (count0, count1)
        } else {
            (count1, count0)
        };
        assert!(
            hi <= 3 * lo,
            "arbitration skewed beyond 3x within a 100-iteration window: {count0} vs {count1}"
        );
    }
}

/// An enforcing exclusivity group must deny a second member following
/// its sibling to the guarded value, leaving the denied cell unchanged.
#[test]
fn enforcing_exclusivity_group_keeps_members_mutually_exclusive() {
    let mut sim = Simulator::new(SimConfig::default(), 1);
    let a = sim.alloc_bools(1);
    let b = sim.alloc_bools(1);
    sim.mark_special(a);
    sim.mark_special(b);
    sim.exclusivity_mut()
        .add_group("arb", Direction::Hi, Policy::Enforce, vec![a, b]);

    sim.set_bool(a, Bit::One).unwrap();
    assert_eq!(sim.state().get_bool(a), Bit::One);

    sim.set_bool(b, Bit::One).unwrap();
    assert_eq!(
        sim.state().get_bool(b),
        Bit::X,
        "enforcing group must deny the second member going high"
    );
    assert!(sim.warnings().is_empty());
}
