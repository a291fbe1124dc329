//! The simulator context (§4.13): the single owner of everything §9
//! calls out as process-wide — the event queue, the state vector, the
//! exclusivity/timing-fork tables, the trace hub, the external-function
//! table, and the typed [`SimConfig`]. All actor `step`/`propagate`
//! implementations borrow `&mut Simulator` rather than reaching into
//! statics; this is the structural decision §9's "global mutable state"
//! note calls for.

use std::rc::Rc;

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use actsim_types::{Bit, ConnId, GlobalOffset, WideInt};

use crate::channel::{run_method, ChanState, FragOp, Flavor, RecvOutcome, RunResult, SendOutcome};
use crate::chp::{
    call_function, ChpActor, ChpHost, ChpTag, CostAnnotation, ExprArena, ExprHost, FunctionDef,
    Graph, GraphBuilder, Stmt, SHARED_WAKEUP,
};
use crate::config::SimConfig;
use crate::constraints::{ExclusivityTables, TimingForkTable};
use crate::error::{SimFatal, SimResult, SimWarning, WarningResponse};
use crate::event_queue::{Disposition, EventHandle, EventQueue, EventSink, VirtualTime};
use crate::glue::{AnalogBoundary, FragmentAdapter, FragmentHost, TraceHub, TraceNodeId, ValueEncoding};
use crate::profiler::Profiler;
use crate::prs::{PrsGate, ScheduleAction};
use crate::state::debugger::Debugger;
use crate::state::fanout::ActorId;
use crate::state::{CellKind, MultiValue, StateVector};

/// Which engine a registered [`ActorId`] belongs to, for event dispatch
/// and fanout notification. A closed tagged union rather than open
/// subclassing, per §9's "dynamic dispatch across actor kinds" note.
enum Actor {
    Chp(ChpActor),
    Prs(PrsGate),
}

/// The event tag the simulator's single queue carries: either a CHP
/// `(pc_slot, flag)` pair, or the value a PRS gate's pending event
/// targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorTag {
    Chp(ChpTag),
    Prs(Bit),
}

/// One of the ten fragment-method kinds a fragmented channel compiles
/// at hierarchy-setup time, per §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragMethodKind {
    SendInit,
    RecvInit,
    Set,
    Get,
    SendUp,
    SendRest,
    RecvUp,
    RecvRest,
    SendProbe,
    RecvProbe,
}

#[derive(Default)]
struct FragMethodTable {
    methods: HashMap<(ConnId, FragMethodKind), (Vec<FragOp>, Rc<Graph>)>,
}

impl FragMethodTable {
    fn install(&mut self, chan: ConnId, kind: FragMethodKind, ops: Vec<FragOp>, exprs: ExprArena) {
        let graph = GraphBuilder::new(CostAnnotation::default())
            .build(&Stmt::Skip, exprs)
            .expect("trivial Skip graph always builds");
        self.methods.insert((chan, kind), (ops, Rc::new(graph)));
    }

    fn get(&self, chan: ConnId, kind: FragMethodKind) -> Option<(&[FragOp], &Rc<Graph>)> {
        self.methods
            .get(&(chan, kind))
            .map(|(ops, graph)| (ops.as_slice(), graph))
    }
}

/// The simulation engine. Owns every piece of state a running design
/// touches; actors never hold their own copy of anything shared.
pub struct Simulator {
    pub config: SimConfig,
    state: StateVector,
    queue: EventQueue<ActorId, ActorTag>,
    actors: HashMap<ActorId, Actor>,
    /// Reverse lookup from a PRS gate's driven output to the actor that
    /// drives it, so an exclusivity flush can find the right pending
    /// event to cancel.
    output_actor: HashMap<u32, ActorId>,
    functions: HashMap<String, FunctionDef>,
    exclusivity: ExclusivityTables,
    timing_forks: TimingForkTable,
    frag_methods: FragMethodTable,
    rand_init_cells: Vec<GlobalOffset>,
    hazard_cells: Vec<GlobalOffset>,
    analog: AnalogBoundary,
    trace: TraceHub,
    trace_nodes: HashMap<u32, TraceNodeId>,
    profiler: Profiler,
    debugger: Debugger,
    rng: StdRng,
    warnings: Vec<SimWarning>,
    break_requested: bool,
    next_actor_id: u32,
    /// The channel whose fragment method is currently executing, if any;
    /// `self`/`self.ack` in that method's own expression arena resolve
    /// against this channel's deposited value. `None` outside
    /// [`Simulator::run_frag_method`].
    current_frag_chan: Option<GlobalOffset>,
}

impl Simulator {
    pub fn new(config: SimConfig, seed: u64) -> Self {
        Self {
            config,
            state: StateVector::new(),
            queue: EventQueue::new(),
            actors: HashMap::new(),
            output_actor: HashMap::new(),
            functions: HashMap::new(),
            exclusivity: ExclusivityTables::new(),
            timing_forks: TimingForkTable::new(),
            frag_methods: FragMethodTable::default(),
            rand_init_cells: Vec::new(),
            hazard_cells: Vec::new(),
            analog: AnalogBoundary::new(),
            trace: TraceHub::new(),
            trace_nodes: HashMap::new(),
            profiler: Profiler::new(),
            debugger: Debugger::new(),
            rng: StdRng::seed_from_u64(seed),
            warnings: Vec::new(),
            break_requested: false,
            next_actor_id: 0,
            current_frag_chan: None,
        }
    }

    pub fn now(&self) -> VirtualTime {
        self.queue.now()
    }

    pub fn state(&self) -> &StateVector {
        &self.state
    }

    pub fn warnings(&self) -> &[SimWarning] {
        &self.warnings
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn trace_hub_mut(&mut self) -> &mut TraceHub {
        &mut self.trace
    }

    pub fn analog_boundary_mut(&mut self) -> &mut AnalogBoundary {
        &mut self.analog
    }

    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    /// Hands out the next actor id, for use as the `next_id` callback
    /// passed to [`crate::hierarchy::wire_hierarchy`].
    pub fn alloc_actor_id(&mut self) -> ActorId {
        let id = ActorId(self.next_actor_id);
        self.next_actor_id += 1;
        id
    }

    pub fn alloc_bools(&mut self, count: usize) -> GlobalOffset {
        self.state.alloc_bools(count)
    }

    pub fn alloc_ints(&mut self, count: usize, width: u32) -> GlobalOffset {
        self.state.alloc_ints(count, width)
    }

    pub fn alloc_chan(&mut self, chan: ChanState) -> GlobalOffset {
        self.state.alloc_chan(chan)
    }

    pub fn mark_special(&mut self, g: GlobalOffset) {
        self.state.mark_special(g);
    }

    /// Register `actor` to be notified whenever `g` changes. Called by
    /// whatever installs a [`crate::hierarchy::WiringResult`]'s static
    /// reads onto this simulator's state vector.
    pub fn register_fanout(&mut self, g: GlobalOffset, kind: CellKind, actor: ActorId) {
        self.state.inc_fanout(g, kind, actor);
    }

    pub fn mark_rand_init(&mut self, g: GlobalOffset) {
        self.rand_init_cells.push(g);
    }

    pub fn mark_hazard(&mut self, g: GlobalOffset) {
        self.hazard_cells.push(g);
    }

    pub fn register_trace_node(&mut self, g: GlobalOffset, node: TraceNodeId) {
        self.trace_nodes.insert(g.0, node);
    }

    pub fn register_function(&mut self, name: impl Into<String>, def: FunctionDef) {
        self.functions.insert(name.into(), def);
    }

    /// `exprs` backs any `FragOp::SelfOp`/`SelfAck`/`Sel` in `ops`: a
    /// fragment method's expression indices are the channel's own arena,
    /// never the owning process's graph.
    pub fn install_frag_method(
        &mut self,
        chan: ConnId,
        kind: FragMethodKind,
        ops: Vec<FragOp>,
        exprs: ExprArena,
    ) {
        self.frag_methods.install(chan, kind, ops, exprs);
    }

    pub fn register_chp_actor(&mut self, id: ActorId, graph: std::rc::Rc<Graph>) {
        self.actors.insert(id, Actor::Chp(ChpActor::new(id, graph)));
    }

    pub fn register_prs_gate(&mut self, id: ActorId, gate: PrsGate) {
        self.output_actor.insert(gate.output.0, id);
        self.actors.insert(id, Actor::Prs(gate));
    }

    pub fn exclusivity_mut(&mut self) -> &mut ExclusivityTables {
        &mut self.exclusivity
    }

    pub fn timing_forks_mut(&mut self) -> &mut TimingForkTable {
        &mut self.timing_forks
    }

    /// Start every stalled slot of every registered CHP actor at virtual
    /// time zero; used by the last step of [`Simulator::run_init`].
    fn wake_all_chp(&mut self) {
        let ids: Vec<ActorId> = self
            .actors
            .iter()
            .filter_map(|(id, a)| matches!(a, Actor::Chp(_)).then_some(*id))
            .collect();
        for id in ids {
            self.notify_actor(id);
        }
    }

    /// `runInit` per §4.12.
    pub fn run_init(&mut self) -> SimResult<()> {
        for id in self.chp_actor_ids() {
            if let Some(Actor::Chp(actor)) = self.actors.get_mut(&id) {
                actor.reset = true;
            }
        }
        let rand_targets = std::mem::take(&mut self.rand_init_cells);
        for g in &rand_targets {
            if self.state.get_bool(*g) == Bit::X {
                let v = if self.rng.gen_bool(0.5) { Bit::One } else { Bit::Zero };
                self.set_bool(*g, v)?;
            }
        }
        self.rand_init_cells = rand_targets;

        for idx in 0..self.state.chan_count() {
            let chan = GlobalOffset(idx as u32);
            let (conn_id, mask) = {
                let c = self.state.get_chan(chan);
                (c.id, c.fragmented)
            };
            if mask.input == mask.output {
                continue;
            }
            let kind = if mask.input {
                FragMethodKind::SendInit
            } else {
                FragMethodKind::RecvInit
            };
            let (result, _, _) = self.run_frag_method(chan, conn_id, kind, 0)?;
            if !matches!(result, RunResult::Done) {
                self.report_warning(SimWarning::FragmentedChannelInitFailed { chan: conn_id });
            }
        }

        let mut count = 0;
        while self.queue.peek_time().is_some() && count < 100 {
            count += 1;
            self.advance(10);
        }
        if count == 100 {
            self.report_warning(SimWarning::PendingEventsDuringReset);
        }

        for id in self.chp_actor_ids() {
            if let Some(Actor::Chp(actor)) = self.actors.get_mut(&id) {
                actor.reset = false;
            }
        }
        self.wake_all_chp();
        Ok(())
    }

    fn chp_actor_ids(&self) -> Vec<ActorId> {
        self.actors
            .iter()
            .filter_map(|(id, a)| matches!(a, Actor::Chp(_)).then_some(*id))
            .collect()
    }

    pub fn advance(&mut self, dt: VirtualTime) -> Disposition {
        let target = self.queue.now() + dt;
        self.advance_until(target)
    }

    fn advance_until(&mut self, t_target: VirtualTime) -> Disposition {
        loop {
            match self.queue.peek_time() {
                Some(t) if t <= t_target => {}
                _ => return Disposition::Continue,
            }
            match self.step(1) {
                Disposition::Continue => continue,
                other => return other,
            }
        }
    }

    pub fn step(&mut self, n: usize) -> Disposition {
        for _ in 0..n {
            if self.queue.peek_time().is_none() {
                return Disposition::Continue;
            }
            match self.pop_and_deliver() {
                Disposition::Continue => continue,
                other => return other,
            }
        }
        Disposition::Continue
    }

    pub fn run_until_empty(&mut self) -> Disposition {
        loop {
            if self.queue.peek_time().is_none() {
                return Disposition::Continue;
            }
            match self.pop_and_deliver() {
                Disposition::Continue => continue,
                other => return other,
            }
        }
    }

    /// `EventQueue::step` needs an `&mut impl EventSink`, and `Simulator`
    /// is its own sink; moving the queue out for the call avoids
    /// borrowing `self` as both the queue's owner and its sink at once.
    fn pop_and_deliver(&mut self) -> Disposition {
        let mut queue = std::mem::replace(&mut self.queue, EventQueue::new());
        let disposition = queue.step(self, 1);
        self.queue = queue;
        if std::mem::take(&mut self.break_requested) {
            return Disposition::Breakpoint;
        }
        disposition
    }

    fn report_warning(&mut self, w: SimWarning) {
        tracing::warn!(at = self.queue.now(), warning = %w, "simulation warning");
        let response = self.config_warning_response(&w);
        self.warnings.push(w);
        if matches!(response, WarningResponse::Break | WarningResponse::Exit) {
            self.break_requested = true;
        }
    }

    fn config_warning_response(&self, _w: &SimWarning) -> WarningResponse {
        WarningResponse::Continue
    }

    /// The `set_bool(g, v)` contract from §4.3: exclusivity check, timing
    /// fork monitors, the store itself, then synchronous fanout.
    pub fn set_bool(&mut self, g: GlobalOffset, v: Bit) -> SimResult<()> {
        let old = self.state.get_bool(g);
        if old == v {
            return Ok(());
        }
        if self.state.is_special(g) {
            let state = &self.state;
            let decision = self.exclusivity.safe_change(g, v, |o| state.get_bool(o));
            if let Some(msg) = decision.violation {
                self.report_warning(SimWarning::MutexViolation { group: msg });
            }
            if !decision.allowed {
                return Ok(());
            }
            for flushed in decision.flush {
                self.flush_pending_for(GlobalOffset(flushed));
            }
        }
        for violation in self.timing_forks.on_transition(g, old, v, self.queue.now()) {
            self.report_warning(SimWarning::TimingForkViolation {
                fork: violation.fork,
                margin: violation.margin,
                actual: violation.actual,
            });
        }
        self.state.set_bool_raw(g, v);
        self.trace_bool_change(g, v);
        if self.debugger.on_bool_write(g, old, v) {
            self.break_requested = true;
        }
        if self.analog.is_bridged(g) {
            // Outward DAC notification is the bridge implementation's
            // responsibility; the boundary only needs to know which
            // cells to watch. Nothing further to do on this side.
        }
        let fanout: Vec<ActorId> = self.state.fanout(g, CellKind::Bool).to_vec();
        for actor in fanout {
            self.notify_actor(actor);
        }
        Ok(())
    }

    pub fn set_int(&mut self, g: GlobalOffset, v: WideInt) -> SimResult<()> {
        self.state.set_int_raw(g, v);
        let fanout: Vec<ActorId> = self.state.fanout(g, CellKind::Int).to_vec();
        for actor in fanout {
            self.notify_actor(actor);
        }
        Ok(())
    }

    fn trace_bool_change(&mut self, g: GlobalOffset, v: Bit) {
        let Some(&node) = self.trace_nodes.get(&g.0) else {
            return;
        };
        let encoded = match v {
            Bit::Zero => ValueEncoding::False,
            Bit::One => ValueEncoding::True,
            Bit::X => ValueEncoding::X,
        };
        let at = self.queue.now();
        self.trace.digital_change(node, at, encoded);
    }

    /// Cancel the pending event (if any) belonging to whatever actor
    /// drives `g`, because an exclusivity decision determined it can no
    /// longer fire.
    fn flush_pending_for(&mut self, g: GlobalOffset) {
        let Some(&actor_id) = self.output_actor.get(&g.0) else {
            return;
        };
        self.queue
            .match_pending(|target, tag| *target == actor_id && matches!(tag, ActorTag::Prs(_)));
        if let Some(Actor::Prs(gate)) = self.actors.get_mut(&actor_id) {
            gate.clear_pending();
        }
    }

    /// Fanout notification: wake a stalled CHP actor, or re-evaluate a
    /// PRS gate's pull expressions and (re)schedule its pending event.
    fn notify_actor(&mut self, id: ActorId) {
        match self.actors.remove(&id) {
            Some(Actor::Chp(mut actor)) => {
                actor.propagate(self);
                self.actors.insert(id, Actor::Chp(actor));
            }
            Some(Actor::Prs(mut gate)) => {
                let now = self.queue.now();
                let (action, warning) = {
                    let state = &self.state;
                    gate.propagate(|g| state.get_bool(g), now)
                };
                if let Some(w) = warning {
                    self.report_warning(w);
                }
                match action {
                    ScheduleAction::Schedule { value, delay } => {
                        gate.set_pending(value, now + delay);
                        self.queue.new_event(id, ActorTag::Prs(value), delay);
                    }
                    ScheduleAction::Unstable { forced_delay } => {
                        self.queue
                            .match_pending(|target, tag| *target == id && matches!(tag, ActorTag::Prs(_)));
                        gate.set_pending(Bit::X, now + forced_delay);
                        self.queue.new_event(id, ActorTag::Prs(Bit::X), forced_delay);
                    }
                    ScheduleAction::AlreadyPending | ScheduleAction::None => {}
                }
                self.actors.insert(id, Actor::Prs(gate));
            }
            None => {}
        }
    }

    /// Run a fragmented channel's compiled method, resuming from
    /// `resume_from` if the previous attempt suspended. Returns the
    /// outcome plus whatever `SelfOp`/`SelfAck` last computed, for the
    /// caller to fold into the data it hands back to the CHP/HSE side.
    fn run_frag_method(
        &mut self,
        chan: GlobalOffset,
        conn_id: ConnId,
        kind: FragMethodKind,
        resume_from: u32,
    ) -> SimResult<(RunResult, Option<WideInt>, Option<WideInt>)> {
        let Some((ops, graph)) = self.frag_methods.get(conn_id, kind) else {
            return Ok((RunResult::Done, None, None));
        };
        let ops = ops.to_vec();
        let graph = graph.clone();
        let outer = self.current_frag_chan.replace(chan);
        let mut adapter = FragmentAdapter::new(&graph, self);
        let result = run_method(&ops, resume_from, &mut adapter);
        let err = adapter.take_error();
        let recv_value = adapter.recv_value.take();
        let send_value = adapter.send_value.take();
        self.current_frag_chan = outer;
        if let Some(err) = err {
            return Err(err);
        }
        Ok((result, recv_value, send_value))
    }
}

impl EventSink<ActorId, ActorTag> for Simulator {
    fn deliver(&mut self, target: ActorId, tag: ActorTag, at: VirtualTime) -> Disposition {
        match tag {
            ActorTag::Chp(chp_tag) => self.deliver_chp(target, chp_tag, at),
            ActorTag::Prs(value) => self.deliver_prs(target, value, at),
        }
    }
}

impl Simulator {
    fn deliver_chp(&mut self, target: ActorId, tag: ChpTag, _at: VirtualTime) -> Disposition {
        let Some(Actor::Chp(mut actor)) = self.actors.remove(&target) else {
            return Disposition::Continue;
        };
        let result = actor.step(tag, self);
        self.actors.insert(target, Actor::Chp(actor));
        match result {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(actor = target.0, error = %e, "CHP actor step failed");
                Disposition::Stop
            }
        }
    }

    fn deliver_prs(&mut self, target: ActorId, value: Bit, _at: VirtualTime) -> Disposition {
        let Some(Actor::Prs(mut gate)) = self.actors.remove(&target) else {
            return Disposition::Continue;
        };
        let fired = gate.fire(value);
        let output = gate.output;
        self.actors.insert(target, Actor::Prs(gate));
        if fired {
            if let Err(e) = self.set_bool(output, value) {
                tracing::error!(actor = target.0, error = %e, "PRS gate set_bool failed");
                return Disposition::Stop;
            }
        }
        Disposition::Continue
    }
}

impl ExprHost for Simulator {
    fn get_bool(&self, g: GlobalOffset) -> Bit {
        self.state.get_bool(g)
    }

    fn get_int(&self, g: GlobalOffset) -> WideInt {
        self.state.get_int(g).clone()
    }

    fn set_bool_local(&mut self, g: GlobalOffset, v: bool) {
        let _ = self.set_bool(g, if v { Bit::One } else { Bit::Zero });
    }

    fn set_int_local(&mut self, g: GlobalOffset, v: WideInt) {
        let _ = self.set_int(g, v);
    }

    fn call_external(&mut self, name: &str, _args: &[WideInt]) -> SimResult<WideInt> {
        tracing::debug!(symbol = name, "external function lookup failed");
        Err(SimFatal::MissingExternalFunction {
            name: name.to_string(),
        })
    }

    fn call_function(&mut self, name: &str, args: &[WideInt]) -> SimResult<WideInt> {
        let def = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| SimFatal::MissingExternalFunction {
                name: name.to_string(),
            })?;
        call_function(&def, args, self)
    }

    fn run_intrinsic(&mut self, _name: &str, _args: &[WideInt]) -> SimResult<()> {
        Ok(())
    }

    fn warn(&mut self, w: SimWarning) {
        self.report_warning(w);
    }

    fn probe_peek(&self, chan: GlobalOffset, probing_send_side: bool) -> bool {
        let c = self.state.get_chan(chan);
        if probing_send_side {
            c.is_recv_blocked()
        } else {
            c.is_send_blocked()
        }
    }

    fn chan_sender_value(&self, chan: GlobalOffset) -> SimResult<WideInt> {
        let c = self.state.get_chan(chan);
        match c.data_for_send().and_then(|mv| mv.field(0)) {
            Some(v) => Ok(v.clone()),
            None => Ok(WideInt::unknown(1)?),
        }
    }

    fn self_value(&self) -> SimResult<WideInt> {
        let chan = self.current_frag_chan.ok_or(SimFatal::SelfUsedOutsideFragment)?;
        match self.state.get_chan(chan).data_for_send().and_then(|mv| mv.field(0)) {
            Some(v) => Ok(v.clone()),
            None => Ok(WideInt::unknown(1)?),
        }
    }

    fn self_ack_value(&self) -> SimResult<WideInt> {
        let chan = self.current_frag_chan.ok_or(SimFatal::SelfUsedOutsideFragment)?;
        match self.state.get_chan(chan).data_for_recv().and_then(|mv| mv.field(0)) {
            Some(v) => Ok(v.clone()),
            None => Ok(WideInt::unknown(1)?),
        }
    }
}

impl ChpHost for Simulator {
    fn now(&self) -> VirtualTime {
        self.queue.now()
    }

    fn set_bool(&mut self, g: GlobalOffset, v: Bit) -> SimResult<()> {
        Simulator::set_bool(self, g, v)
    }

    fn set_int(&mut self, g: GlobalOffset, v: WideInt) -> SimResult<()> {
        Simulator::set_int(self, g, v)
    }

    fn schedule(&mut self, actor: ActorId, tag: ChpTag, dt: VirtualTime) -> EventHandle {
        self.queue.new_event(actor, ActorTag::Chp(tag), dt)
    }

    fn cancel(&mut self, handle: EventHandle) {
        self.queue.remove(handle);
    }

    fn var_send(
        &mut self,
        chan: GlobalOffset,
        pc: u32,
        wakeup: bool,
        payload: MultiValue,
        bidir: bool,
        flavor: Option<Flavor>,
    ) -> SimResult<SendOutcome> {
        let (conn_id, fragmented_out) = {
            let c = self.state.get_chan(chan);
            (c.id, c.fragmented.output)
        };
        if fragmented_out && !wakeup {
            let resume = self.state.get_chan(chan).sfrag_st;
            let (result, _recv_value, send_value) =
                self.run_frag_method(chan, conn_id, FragMethodKind::SendUp, resume)?;
            match result {
                RunResult::Done => {
                    let chan_state = self.state.get_chan_mut(chan);
                    chan_state.sfrag_st = 0;
                    let xchg_in = send_value.map(MultiValue::scalar);
                    return Ok(match chan_state.finish_blocked_receiver() {
                        Some(wake_pc) => SendOutcome::CompletedNotifyReceiver { wake_pc, xchg_in },
                        None => SendOutcome::Completed { xchg_in },
                    });
                }
                RunResult::Suspended(next) => {
                    self.state.get_chan_mut(chan).sfrag_st = next;
                    return Ok(SendOutcome::Blocked);
                }
            }
        }
        self.state
            .get_chan_mut(chan)
            .var_send(pc, wakeup, payload, bidir, flavor)
    }

    fn var_recv(
        &mut self,
        chan: GlobalOffset,
        pc: u32,
        wakeup: bool,
        payload: Option<MultiValue>,
        bidir: bool,
        flavor: Option<Flavor>,
    ) -> SimResult<RecvOutcome> {
        let (conn_id, fragmented_in) = {
            let c = self.state.get_chan(chan);
            (c.id, c.fragmented.input)
        };
        if fragmented_in && !wakeup {
            let resume = self.state.get_chan(chan).rfrag_st;
            let (result, recv_value, _send_value) =
                self.run_frag_method(chan, conn_id, FragMethodKind::RecvUp, resume)?;
            match result {
                RunResult::Done => {
                    let chan_state = self.state.get_chan_mut(chan);
                    chan_state.rfrag_st = 0;
                    let value = recv_value
                        .map(MultiValue::scalar)
                        .or(payload)
                        .unwrap_or_else(|| MultiValue::scalar(WideInt::zero(1).expect("width 1 is never zero")));
                    return Ok(match chan_state.finish_blocked_sender() {
                        Some(wake_pc) => RecvOutcome::CompletedNotifySender { wake_pc, value },
                        None => RecvOutcome::Completed { value },
                    });
                }
                RunResult::Suspended(next) => {
                    self.state.get_chan_mut(chan).rfrag_st = next;
                    return Ok(RecvOutcome::Blocked);
                }
            }
        }
        self.state
            .get_chan_mut(chan)
            .var_recv(pc, wakeup, payload, bidir, flavor)
    }

    fn choose_arbitrated(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    fn deadlock_detected(&mut self, message: String) {
        tracing::warn!(at = self.queue.now(), "deadlock: {message}");
    }

    fn probe_send(&mut self, chan: GlobalOffset, pc: u32, waiter: ActorId) -> bool {
        self.state.get_chan_mut(chan).probe_send(pc, waiter)
    }

    fn probe_recv(&mut self, chan: GlobalOffset, pc: u32, waiter: ActorId) -> bool {
        self.state.get_chan_mut(chan).probe_recv(pc, waiter)
    }

    fn release_probe(&mut self, chan: GlobalOffset) {
        self.state.get_chan_mut(chan).clear_probe();
    }
}

impl FragmentHost for Simulator {
    fn write_bool(&mut self, var: GlobalOffset, value: bool) -> Result<(), SimFatal> {
        Simulator::set_bool(self, var, if value { Bit::One } else { Bit::Zero })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prs::{PrsExpr, PrsGate};

    #[test]
    fn set_bool_is_idempotent_and_skips_fanout() {
        let mut sim = Simulator::new(SimConfig::default(), 1);
        let g = sim.alloc_bools(1);
        sim.set_bool(g, Bit::One).unwrap();
        sim.set_bool(g, Bit::One).unwrap();
        assert_eq!(sim.state().get_bool(g), Bit::One);
    }

    #[test]
    fn prs_gate_schedules_and_fires_after_notification() {
        let mut sim = Simulator::new(SimConfig::default(), 1);
        let input = sim.alloc_bools(1);
        let output = sim.alloc_bools(1);
        let gate = PrsGate::new(
            output,
            PrsExpr::Var(input),
            PrsExpr::False,
            PrsExpr::Not(Box::new(PrsExpr::Var(input))),
            PrsExpr::False,
            5,
        );
        let id = sim.alloc_actor_id();
        sim.register_prs_gate(id, gate);
        sim.state.inc_fanout(input, CellKind::Bool, id);
        sim.set_bool(input, Bit::One).unwrap();
        sim.advance(5);
        assert_eq!(sim.state().get_bool(output), Bit::One);
    }

    #[test]
    fn watched_cell_write_requests_a_breakpoint() {
        let mut sim = Simulator::new(SimConfig::default(), 1);
        let g = sim.alloc_bools(1);
        sim.debugger_mut().watch(g);
        sim.set_bool(g, Bit::One).unwrap();
        assert!(sim.break_requested);
    }

    #[test]
    fn run_init_drives_rand_init_cells_away_from_x() {
        let mut sim = Simulator::new(SimConfig::default(), 7);
        let g = sim.alloc_bools(1);
        sim.mark_rand_init(g);
        sim.run_init().unwrap();
        assert_ne!(sim.state().get_bool(g), Bit::X);
    }
}
