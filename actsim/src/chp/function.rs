//! User function evaluation: a function body is a restricted CHP program
//! (no communication, no comma, no probes/shared guards) compiled into
//! its own small [`Graph`], walked synchronously to completion rather
//! than through the event-driven `step` loop, since it cannot block.

use actsim_types::{GlobalOffset, WideInt};

use crate::chp::expr::Expr;
use crate::chp::graph::{Graph, NodeKind};
use crate::chp::interpreter::{eval_expr, is_truthy, ExprHost};
use crate::error::{SimFatal, SimResult};

/// A declared function: either dispatched to a native symbol, or
/// interpreted from its own compiled graph.
#[derive(Clone)]
pub enum FunctionDef {
    External {
        symbol: String,
    },
    User {
        /// Formal parameter cells, in declaration order; actual arguments
        /// are written into these before the body runs.
        params: Vec<GlobalOffset>,
        /// The cell holding the local named `self`, read back as the
        /// return value once the body reaches its stop node.
        self_cell: GlobalOffset,
        graph: std::rc::Rc<Graph>,
    },
}

/// Evaluate a call to `def` with already-evaluated `args`, via `host` for
/// both external dispatch and, for user functions, state reads/writes
/// during the synchronous walk.
pub fn call_function(
    def: &FunctionDef,
    args: &[WideInt],
    host: &mut impl ExprHost,
) -> SimResult<WideInt> {
    match def {
        FunctionDef::External { symbol } => host.call_external(symbol, args),
        FunctionDef::User {
            params,
            self_cell,
            graph,
        } => {
            if params.len() != args.len() {
                return Err(SimFatal::FunctionTypeMismatch {
                    function: symbol_name_or_anon(graph),
                });
            }
            for (&cell, arg) in params.iter().zip(args) {
                host.set_int_local(cell, arg.clone());
            }
            run_body(graph, host)?;
            Ok(host.get_int_local(*self_cell))
        }
    }
}

fn symbol_name_or_anon(_graph: &Graph) -> String {
    "<user function>".to_string()
}

/// Walk `graph` from its entry to its `Stop` node without going through
/// the event queue. Functions may use `Assign`, `Func`, and non-blocking
/// `Cond`/`Loop` dispatch; `Fork`/`Send`/`Recv` are rejected since a
/// function body may not communicate or run branches concurrently.
fn run_body(graph: &Graph, host: &mut impl ExprHost) -> SimResult<()> {
    let mut pc = graph.entry;
    loop {
        let node = graph.node(pc);
        match &node.kind {
            NodeKind::Stop => return Ok(()),
            NodeKind::Assign {
                target,
                expr,
                is_struct: _,
            } => {
                let value = eval_expr(graph, *expr, host)?;
                if target.is_bool {
                    host.set_bool_local(target.base, is_truthy(&value));
                } else {
                    host.set_int_local(target.base, value);
                }
                pc = node.next.expect("non-terminal node must have a successor");
            }
            NodeKind::Func { name, args } => {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(eval_expr(graph, *a, host)?);
                }
                host.run_intrinsic(name, &vals)?;
                pc = node.next.expect("non-terminal node must have a successor");
            }
            NodeKind::Cond { branches, .. } | NodeKind::Loop { branches } => {
                let mut taken = None;
                for b in branches {
                    let is_true = match b.guard {
                        None => true,
                        Some(g) => is_truthy(&eval_expr(graph, g, host)?),
                    };
                    if is_true {
                        taken = Some(b.entry);
                        break;
                    }
                }
                match taken {
                    Some(entry) => pc = entry,
                    None => return Ok(()),
                }
            }
            NodeKind::Nop { .. } => {
                pc = node.next.expect("non-terminal node must have a successor");
            }
            NodeKind::Fork { .. } | NodeKind::Join { .. } | NodeKind::Send { .. } | NodeKind::Recv { .. } => {
                return Err(SimFatal::UnknownGotoTarget {
                    label: "function body used a disallowed construct".to_string(),
                });
            }
        }
    }
}

#[allow(dead_code)]
fn _assert_expr_variant_is_exhaustive(e: &Expr) {
    // Keeps this module honest if new Expr variants are added; functions
    // reject anything channel/probe-shaped at evaluation time instead.
    match e {
        Expr::Const(_)
        | Expr::Var(_)
        | Expr::Field(_, _)
        | Expr::Bin(_, _, _)
        | Expr::Un(_, _)
        | Expr::ToBool(_)
        | Expr::ToInt(_, _)
        | Expr::Bitfield { .. }
        | Expr::Call { .. }
        | Expr::Probe(_, _)
        | Expr::ChanValue(_)
        | Expr::SelfVar
        | Expr::SelfAckVar => {}
    }
}
