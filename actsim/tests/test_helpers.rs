//! Shared scaffolding for the scenario tests: building a graph from a
//! loose [`Stmt`] tree, and kicking off a freshly registered actor the
//! way hierarchy wiring would once it hands the instance to the
//! simulator.

use std::rc::Rc;

use actsim::chp::{ChpHost, ChpTag, CostAnnotation, ExprArena, Graph, GraphBuilder, Stmt};
use actsim::state::fanout::ActorId;
use actsim::Simulator;

/// Install an env-filter `fmt` subscriber for the test binary, so
/// `RUST_LOG=actsim=debug cargo test -- --nocapture` shows the
/// `tracing::warn!`/`debug!` calls scenario tests otherwise swallow.
/// Safe to call from every test: the second and later calls just see
/// `try_init` fail and do nothing.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn build_graph(stmt: &Stmt, exprs: ExprArena) -> Rc<Graph> {
    Rc::new(
        GraphBuilder::new(CostAnnotation::default())
            .build(stmt, exprs)
            .expect("statement tree lowers to a valid graph"),
    )
}

/// Schedule `id`'s entry node at time zero, as `wire_hierarchy`'s caller
/// would once every instance is registered.
#[allow(dead_code)]
pub fn start_actor(sim: &mut Simulator, id: ActorId) {
    sim.schedule(id, ChpTag { pc_slot: 0, flag: false }, 0);
}
