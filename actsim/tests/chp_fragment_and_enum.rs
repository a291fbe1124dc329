//! Scenario S5 (fragmented channel) and S6 (enum range).

mod test_helpers;

use actsim::channel::{ChanState, FragOp};
use actsim::chp::{DerefDescriptor, Expr, ExprArena, Stmt};
use actsim::config::SimConfig;
use actsim::simulator::FragMethodKind;
use actsim::{ConnId, SimWarning, Simulator, WideInt};

use test_helpers::{build_graph, init_tracing, start_actor};

/// A CHP sender and a fragmented receiver over the same channel: the
/// sender blocks with its payload deposited the ordinary way, and the
/// receive side's compiled method unpacks that deposit directly (a
/// `ChanValue` read, the wire-level peek a real HSE-side wrapper would
/// perform bit by bit) instead of going through the normal rendezvous.
/// The handshake still finalizes: the sender is woken and the channel's
/// `count` still advances by one.
#[test]
fn fragmented_receiver_unpacks_the_senders_payload_and_completes_the_handshake() {
    init_tracing();
    let mut sim = Simulator::new(SimConfig::default(), 1);

    let mut chan_state = ChanState::new(ConnId(0), "int8", 0);
    chan_state.fragmented.input = true;
    let chan = sim.alloc_chan(chan_state);
    let sink = sim.alloc_ints(1, 8);

    let mut frag_exprs = ExprArena::new();
    let chan_val = frag_exprs.push(Expr::ChanValue(chan));
    sim.install_frag_method(
        ConnId(0),
        FragMethodKind::RecvUp,
        vec![FragOp::SelfOp(chan_val.0)],
        frag_exprs,
    );

    let mut exprs = ExprArena::new();
    let payload = exprs.push(Expr::Const(WideInt::from_u64(8, 0b1010).unwrap()));
    let sender = Stmt::Send {
        chan,
        expr: payload,
        flavor: None,
        is_struct: false,
        bidir_recv: None,
    };
    let receiver = Stmt::Recv {
        chan,
        target: Some(DerefDescriptor::scalar(sink, 8, false)),
        flavor: None,
        is_struct: false,
        bidir_send: None,
    };
    let top = Stmt::Comma(vec![sender, receiver]);
    let graph = build_graph(&top, exprs);

    let id = sim.alloc_actor_id();
    sim.register_chp_actor(id, graph);
    start_actor(&mut sim, id);
    sim.run_until_empty();

    assert_eq!(sim.state().get_int(sink).dec_print(), "10");
    assert_eq!(sim.state().get_chan(chan).count, 1);
    assert!(sim.warnings().is_empty());
}

/// Assigning a value outside an enumerated type's declared range still
/// stores the (truncated-to-width) value, but reports the violation as
/// a breakpoint-eligible warning rather than silently accepting it.
#[test]
fn out_of_range_enum_assignment_still_stores_but_warns() {
    let mut sim = Simulator::new(SimConfig::default(), 1);
    let var = sim.alloc_ints(1, 3);

    let mut exprs = ExprArena::new();
    let six = exprs.push(Expr::Const(WideInt::from_u64(3, 6).unwrap()));
    let target = DerefDescriptor {
        base: var,
        width: 3,
        is_bool: false,
        is_enum: true,
        enum_size: 5,
        indices: Vec::new(),
        stride: 1,
    };
    let stmt = Stmt::Assign {
        target,
        expr: six,
        is_struct: false,
    };
    let graph = build_graph(&stmt, exprs);

    let id = sim.alloc_actor_id();
    sim.register_chp_actor(id, graph);
    start_actor(&mut sim, id);
    sim.run_until_empty();

    assert_eq!(sim.state().get_int(var).dec_print(), "6");
    assert!(matches!(sim.warnings(), [SimWarning::EnumOutOfRange { .. }]));
}
