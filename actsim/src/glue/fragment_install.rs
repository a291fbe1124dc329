//! Bridges a compiled fragment method (§4.7) onto a live CHP expression
//! host: `FragOp` expression indices are evaluated through the same
//! [`ExprHost`] every ordinary CHP statement uses, and boolean writes are
//! routed through a propagating setter rather than a bare state write.

use actsim_types::{GlobalOffset, WideInt};

use crate::channel::fragment::FragEnv;
use crate::chp::expr::ExprId;
use crate::chp::graph::Graph;
use crate::chp::interpreter::{eval_expr, is_truthy, ExprHost};
use crate::error::SimFatal;

/// What a fragment method needs beyond plain expression evaluation: a
/// boolean write that also notifies fanout, mirroring [`BoolT`]/[`BoolF`]'s
/// "write and propagate" contract.
///
/// [`BoolT`]: crate::channel::fragment::FragOp::BoolT
/// [`BoolF`]: crate::channel::fragment::FragOp::BoolF
pub trait FragmentHost: ExprHost {
    fn write_bool(&mut self, var: GlobalOffset, value: bool) -> Result<(), SimFatal>;
}

/// Adapts a `(Graph, FragmentHost)` pair to the channel module's
/// environment-agnostic [`FragEnv`]. `recv_value`/`send_value` collect
/// whatever `SelfOp`/`SelfAck` most recently computed, for the caller to
/// hand to `data_for_recv`/`data_for_send`; the first evaluation error
/// encountered is latched in `error` rather than propagated through
/// `FragEnv`'s infallible signatures, since `run_method` itself cannot
/// fail.
pub struct FragmentAdapter<'a, H: FragmentHost> {
    pub graph: &'a Graph,
    pub host: &'a mut H,
    pub recv_value: Option<WideInt>,
    pub send_value: Option<WideInt>,
    pub error: Option<SimFatal>,
}

impl<'a, H: FragmentHost> FragmentAdapter<'a, H> {
    pub fn new(graph: &'a Graph, host: &'a mut H) -> Self {
        Self {
            graph,
            host,
            recv_value: None,
            send_value: None,
            error: None,
        }
    }

    pub fn take_error(&mut self) -> Option<SimFatal> {
        self.error.take()
    }
}

impl<'a, H: FragmentHost> FragEnv for FragmentAdapter<'a, H> {
    fn eval_bool(&mut self, expr: u32) -> bool {
        match eval_expr(self.graph, ExprId(expr), self.host) {
            Ok(v) => is_truthy(&v),
            Err(e) => {
                self.error.get_or_insert(e);
                false
            }
        }
    }

    fn eval_into_recv(&mut self, expr: u32) {
        match eval_expr(self.graph, ExprId(expr), self.host) {
            Ok(v) => self.recv_value = Some(v),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
    }

    fn eval_into_send(&mut self, expr: u32) {
        match eval_expr(self.graph, ExprId(expr), self.host) {
            Ok(v) => self.send_value = Some(v),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
    }

    fn write_bool(&mut self, var: GlobalOffset, value: bool) {
        if let Err(e) = self.host.write_bool(var, value) {
            self.error.get_or_insert(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fragment::{run_method, FragOp, RunResult};
    use crate::chp::expr::Expr;
    use crate::chp::graph::Graph;
    use crate::error::SimResult;
    use actsim_types::Bit;

    struct TestHost {
        bools: Vec<bool>,
        writes: Vec<(u32, bool)>,
    }

    impl ExprHost for TestHost {
        fn get_bool(&self, g: GlobalOffset) -> Bit {
            if self.bools[g.0 as usize] {
                Bit::One
            } else {
                Bit::Zero
            }
        }
        fn get_int(&self, _g: GlobalOffset) -> WideInt {
            WideInt::zero(1).unwrap()
        }
        fn set_bool_local(&mut self, g: GlobalOffset, v: bool) {
            self.bools[g.0 as usize] = v;
        }
        fn set_int_local(&mut self, _g: GlobalOffset, _v: WideInt) {}
        fn call_external(&mut self, _name: &str, _args: &[WideInt]) -> SimResult<WideInt> {
            WideInt::zero(1).map_err(SimFatal::from)
        }
        fn call_function(&mut self, _name: &str, _args: &[WideInt]) -> SimResult<WideInt> {
            WideInt::zero(1).map_err(SimFatal::from)
        }
        fn run_intrinsic(&mut self, _name: &str, _args: &[WideInt]) -> SimResult<()> {
            Ok(())
        }
        fn warn(&mut self, _w: crate::error::SimWarning) {}
        fn probe_peek(&self, _chan: GlobalOffset, _probing_send_side: bool) -> bool {
            false
        }
        fn chan_sender_value(&self, _chan: GlobalOffset) -> SimResult<WideInt> {
            WideInt::zero(1).map_err(SimFatal::from)
        }
        fn self_value(&self) -> SimResult<WideInt> {
            WideInt::zero(1).map_err(SimFatal::from)
        }
        fn self_ack_value(&self) -> SimResult<WideInt> {
            WideInt::zero(1).map_err(SimFatal::from)
        }
    }

    impl FragmentHost for TestHost {
        fn write_bool(&mut self, var: GlobalOffset, value: bool) -> Result<(), SimFatal> {
            self.bools[var.0 as usize] = value;
            self.writes.push((var.0, value));
            Ok(())
        }
    }

    fn empty_graph() -> Graph {
        use crate::chp::expr::ExprArena;
        use crate::chp::graph::{CostAnnotation, GraphBuilder, Stmt};
        let builder = GraphBuilder::new(CostAnnotation::default());
        builder.build(&Stmt::Skip, ExprArena::new()).unwrap()
    }

    #[test]
    fn bool_ops_write_through_and_propagate() {
        let graph = empty_graph();
        let mut host = TestHost {
            bools: vec![false, false],
            writes: vec![],
        };
        let mut adapter = FragmentAdapter::new(&graph, &mut host);
        let ops = vec![FragOp::BoolT(GlobalOffset(0)), FragOp::BoolF(GlobalOffset(1))];
        let result = run_method(&ops, 0, &mut adapter);
        assert_eq!(result, RunResult::Done);
        assert!(adapter.take_error().is_none());
        assert_eq!(host.writes, vec![(0, true), (1, false)]);
    }

    #[test]
    fn self_ops_collect_expression_results() {
        let mut graph = empty_graph();
        let const_expr = graph.exprs.push(Expr::Const(WideInt::from_u64(4, 9).unwrap()));
        let mut host = TestHost {
            bools: vec![],
            writes: vec![],
        };
        let mut adapter = FragmentAdapter::new(&graph, &mut host);
        let ops = vec![FragOp::SelfOp(const_expr.0), FragOp::SelfAck(const_expr.0)];
        run_method(&ops, 0, &mut adapter);
        assert_eq!(adapter.recv_value.unwrap().dec_print(), "9");
        assert_eq!(adapter.send_value.unwrap().dec_print(), "9");
    }
}
