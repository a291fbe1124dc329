//! The CHP interpreter: a per-instance array of program counters
//! multiplexed over one event-driven `step` loop, per the "coroutine-like
//! control flow" design note — no stackful coroutines, just an explicit
//! pc-slot array with a free-list of holes.

use actsim_types::{Bit, GlobalOffset, WideInt};

use crate::channel::{Flavor, RecvOutcome, SendOutcome};
use crate::chp::expr::{BinOp, Expr, ExprId, ProbeSide, UnOp};
use crate::chp::graph::{Branch, Graph, Node, NodeId, NodeKind};
use crate::error::{SimFatal, SimResult, SimWarning};
use crate::event_queue::{Disposition, EventHandle, VirtualTime};
use crate::state::fanout::ActorId;
use crate::state::MultiValue;

/// Sentinel pc-slot meaning "a shared-variable/probe wake-up": the
/// dummy `MAX_LOCAL_PCS` event target in §4.10.
pub const SHARED_WAKEUP: u32 = u32::MAX;

/// `(pc_slot, flag)`, the event tag a CHP actor's events carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChpTag {
    pub pc_slot: u32,
    pub flag: bool,
}

/// Everything a CHP actor's `step`/`propagate`/function-call evaluation
/// needs from its environment, without coupling this module to the
/// concrete `Simulator` type.
pub trait ExprHost {
    fn get_bool(&self, g: GlobalOffset) -> Bit;
    fn get_int(&self, g: GlobalOffset) -> WideInt;
    fn set_bool_local(&mut self, g: GlobalOffset, v: bool);
    fn set_int_local(&mut self, g: GlobalOffset, v: WideInt);
    fn get_int_local(&self, g: GlobalOffset) -> WideInt {
        self.get_int(g)
    }
    fn call_external(&mut self, name: &str, args: &[WideInt]) -> SimResult<WideInt>;
    fn call_function(&mut self, name: &str, args: &[WideInt]) -> SimResult<WideInt>;
    fn run_intrinsic(&mut self, name: &str, args: &[WideInt]) -> SimResult<()>;
    fn warn(&mut self, w: SimWarning);
    fn probe_peek(&self, chan: GlobalOffset, probing_send_side: bool) -> bool;
    fn chan_sender_value(&self, chan: GlobalOffset) -> SimResult<WideInt>;
    fn self_value(&self) -> SimResult<WideInt>;
    fn self_ack_value(&self) -> SimResult<WideInt>;
}

/// The full environment a live (non-function-body) CHP actor `step`
/// needs: everything [`ExprHost`] offers, plus scheduling, channel
/// mutation, and arbitration.
pub trait ChpHost: ExprHost {
    fn now(&self) -> VirtualTime;
    fn set_bool(&mut self, g: GlobalOffset, v: Bit) -> SimResult<()>;
    fn set_int(&mut self, g: GlobalOffset, v: WideInt) -> SimResult<()>;
    fn schedule(&mut self, actor: ActorId, tag: ChpTag, dt: VirtualTime) -> EventHandle;
    fn cancel(&mut self, handle: EventHandle);
    fn var_send(
        &mut self,
        chan: GlobalOffset,
        pc: u32,
        wakeup: bool,
        payload: MultiValue,
        bidir: bool,
        flavor: Option<Flavor>,
    ) -> SimResult<SendOutcome>;
    fn var_recv(
        &mut self,
        chan: GlobalOffset,
        pc: u32,
        wakeup: bool,
        payload: Option<MultiValue>,
        bidir: bool,
        flavor: Option<Flavor>,
    ) -> SimResult<RecvOutcome>;
    fn choose_arbitrated(&mut self, n: usize) -> usize;
    fn deadlock_detected(&mut self, message: String);
    /// Register a probe guard on `chan`'s send side at slot `pc`; see
    /// [`crate::channel::ChanState::probe_send`].
    fn probe_send(&mut self, chan: GlobalOffset, pc: u32, waiter: ActorId) -> bool;
    /// Symmetric to [`ChpHost::probe_send`].
    fn probe_recv(&mut self, chan: GlobalOffset, pc: u32, waiter: ActorId) -> bool;
    /// Clear whatever probe registration is pending on `chan`, for a slot
    /// re-scanning its guards after a wake-up.
    fn release_probe(&mut self, chan: GlobalOffset);
}

/// Reads a [`WideInt`]'s low 64 bits as a plain integer, for uses that are
/// inherently native-sized regardless of the value's declared width: shift
/// amounts, array indices, enum ordinals, truthiness checks.
fn truncate_to_u64(v: &WideInt) -> u64 {
    v.limbs().first().copied().unwrap_or(0)
}

pub(crate) fn is_truthy(v: &WideInt) -> bool {
    v.limbs().iter().any(|&limb| limb != 0)
}

fn bool_const(b: bool) -> SimResult<WideInt> {
    Ok(WideInt::from_u64(1, if b { 1 } else { 0 })?)
}

/// Evaluate an expression in `graph`'s arena. Shared by the live
/// interpreter and the synchronous user-function walker.
pub fn eval_expr(graph: &Graph, id: ExprId, host: &mut impl ExprHost) -> SimResult<WideInt> {
    match graph.exprs.get(id) {
        Expr::Const(v) => Ok(v.clone()),
        Expr::Var(deref) => {
            if deref.is_bool {
                let b = host.get_bool(deref.base);
                if !b.is_known() {
                    host.warn(SimWarning::BooleanReadIsX { variable: deref.base });
                }
                bool_const(b == Bit::One)
            } else {
                Ok(host.get_int(deref.base))
            }
        }
        Expr::Field(deref, leaf) => {
            Ok(host.get_int(GlobalOffset(deref.base.0 + *leaf as u32)))
        }
        Expr::Bin(op, l, r) => {
            let lv = eval_expr(graph, *l, host)?;
            let rv = eval_expr(graph, *r, host)?;
            eval_binop(*op, &lv, &rv)
        }
        Expr::Un(op, e) => {
            let v = eval_expr(graph, *e, host)?;
            match op {
                UnOp::Neg => {
                    let zero = WideInt::zero(v.width())?;
                    Ok(zero.sub(&v)?)
                }
                UnOp::Not | UnOp::LogicalNot => Ok(v.bitnot()),
            }
        }
        Expr::ToBool(e) => {
            let v = eval_expr(graph, *e, host)?;
            bool_const(is_truthy(&v))
        }
        Expr::ToInt(e, width) => {
            let v = eval_expr(graph, *e, host)?;
            let value_bits = v.width();
            let (widened, lossy) = v.set_width_checked(*width)?;
            if lossy {
                host.warn(SimWarning::WidthMismatch {
                    variable: GlobalOffset(0),
                    target_width: *width,
                    value_bits,
                });
            }
            Ok(widened)
        }
        Expr::Bitfield { base, shift, width } => {
            let v = eval_expr(graph, *base, host)?;
            let shifted = v.shr(*shift);
            let (masked, _) = shifted.set_width_checked(*width)?;
            Ok(masked)
        }
        Expr::Call { name, args } => {
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval_expr(graph, *a, host)?);
            }
            host.call_function(name, &vals)
        }
        Expr::Probe(chan, side) => {
            bool_const(host.probe_peek(*chan, matches!(side, ProbeSide::Send)))
        }
        Expr::ChanValue(chan) => host.chan_sender_value(*chan),
        Expr::SelfVar => host.self_value(),
        Expr::SelfAckVar => host.self_ack_value(),
    }
}

fn eval_binop(op: BinOp, l: &WideInt, r: &WideInt) -> SimResult<WideInt> {
    use BinOp::*;
    Ok(match op {
        Add => l.add(r)?,
        Sub => l.sub(r)?,
        Mul => l.mul(r)?,
        Div => l.checked_div(r)?,
        Rem => l.checked_rem(r)?,
        And => l.bitand(r)?,
        Or => l.bitor(r)?,
        Xor => l.bitxor(r)?,
        Shl => l.shl(truncate_to_u64(r) as u32),
        Shr => l.shr(truncate_to_u64(r) as u32),
        Asr => l.asr(truncate_to_u64(r) as u32),
        Eq => return bool_const(l.eq_value(r)),
        Ne => return bool_const(!l.eq_value(r)),
        Lt => return bool_const(l.lt(r)),
        Le => return bool_const(l.le(r)),
        Gt => return bool_const(l.gt(r)),
        Ge => return bool_const(l.ge(r)),
        LogicalAnd => return bool_const(is_truthy(l) && is_truthy(r)),
        LogicalOr => return bool_const(is_truthy(l) || is_truthy(r)),
    })
}

/// Per-instance CHP actor state: the pc-slot array, its free list, and
/// the join/stall bookkeeping described in §4.10.
pub struct ChpActor {
    pub id: ActorId,
    pub graph: std::rc::Rc<Graph>,
    pcs: Vec<Option<NodeId>>,
    holes: Vec<u32>,
    tot: hashbrown::HashMap<u32, u32>,
    stalled_pcs: Vec<u32>,
    pub pcused: u32,
    pub reset: bool,
    pub energy: u64,
    pub area: u64,
    pub leakage: u64,
}

impl ChpActor {
    pub fn new(id: ActorId, graph: std::rc::Rc<Graph>) -> Self {
        let npc = graph.max_program_counters().max(1) as usize;
        let mut pcs = vec![None; npc];
        pcs[0] = Some(graph.entry);
        Self {
            id,
            graph,
            pcs,
            holes: (1..npc as u32).rev().collect(),
            tot: hashbrown::HashMap::new(),
            stalled_pcs: Vec::new(),
            pcused: 1,
            reset: false,
            energy: 0,
            area: 0,
            leakage: 0,
        }
    }

    fn alloc_slot(&mut self, node: NodeId) -> u32 {
        match self.holes.pop() {
            Some(slot) => {
                self.pcs[slot as usize] = Some(node);
                self.pcused += 1;
                slot
            }
            None => {
                let slot = self.pcs.len() as u32;
                self.pcs.push(Some(node));
                self.pcused += 1;
                slot
            }
        }
    }

    fn free_slot(&mut self, slot: u32) {
        self.pcs[slot as usize] = None;
        self.holes.push(slot);
        self.pcused -= 1;
    }

    /// Mark `slot` stalled (blocked on a shared variable or probe,
    /// awaiting a `SHARED_WAKEUP` dummy event posted by a fanout
    /// notification).
    fn stall(&mut self, slot: u32) {
        self.stalled_pcs.push(slot);
    }

    /// Called when fanout notifies this actor that an input it reads has
    /// changed: wake every stalled slot by re-scheduling it immediately.
    pub fn propagate(&mut self, host: &mut impl ChpHost) {
        let stalled = std::mem::take(&mut self.stalled_pcs);
        for slot in stalled {
            host.schedule(self.id, ChpTag { pc_slot: slot, flag: true }, 0);
        }
    }

    fn node_at(&self, slot: u32) -> NodeId {
        self.pcs[slot as usize].expect("stepped slot must be occupied")
    }

    fn node<'g>(&self, graph: &'g Graph, slot: u32) -> &'g Node {
        graph.node(self.node_at(slot))
    }

    fn advance(&mut self, slot: u32, next: Option<NodeId>) {
        self.pcs[slot as usize] = next;
        if next.is_none() {
            self.free_slot(slot);
        }
    }

    /// Run one event: `tag.pc_slot == SHARED_WAKEUP` pops a stalled slot
    /// first (per §4.10 step 1); otherwise the tagged slot is dispatched
    /// directly.
    pub fn step(&mut self, tag: ChpTag, host: &mut impl ChpHost) -> SimResult<Disposition> {
        if self.reset {
            return Ok(Disposition::Continue);
        }
        let slot = if tag.pc_slot == SHARED_WAKEUP {
            match self.stalled_pcs.pop() {
                Some(s) => s,
                None => return Ok(Disposition::Continue),
            }
        } else {
            tag.pc_slot
        };
        if self.pcs[slot as usize].is_none() {
            return Ok(Disposition::Continue);
        }
        self.dispatch(slot, tag.flag, host)
    }

    fn dispatch(&mut self, slot: u32, flag: bool, host: &mut impl ChpHost) -> SimResult<Disposition> {
        let graph = std::rc::Rc::clone(&self.graph);
        let node_id = self.node_at(slot);
        let node = graph.node(node_id);
        match &node.kind {
            NodeKind::Stop => {
                self.advance(slot, None);
                Ok(Disposition::Continue)
            }
            NodeKind::Nop { watchdog } => {
                if *watchdog {
                    host.deadlock_detected(format!(
                        "actor {:?} idle in an empty loop body",
                        self.id
                    ));
                }
                self.advance(slot, node.next);
                self.reschedule_if_live(slot, node, host);
                Ok(Disposition::Continue)
            }
            NodeKind::Assign {
                target,
                expr,
                is_struct,
            } => {
                let target = target.clone();
                let expr_id = *expr;
                let is_struct = *is_struct;
                let value = eval_expr(&graph, expr_id, host)?;
                if is_struct {
                    host.set_int(target.base, value)?;
                } else if target.is_bool {
                    host.set_bool(target.base, if is_truthy(&value) { Bit::One } else { Bit::Zero })?;
                } else {
                    let value_bits = value.width();
                    let (widened, lossy) = value.set_width_checked(target.width)?;
                    if lossy {
                        host.warn(SimWarning::WidthMismatch {
                            variable: target.base,
                            target_width: target.width,
                            value_bits,
                        });
                    }
                    if target.is_enum && truncate_to_u64(&widened) >= target.enum_size as u64 {
                        host.warn(SimWarning::EnumOutOfRange {
                            variable: target.base,
                            value: widened.dec_print(),
                            size: target.enum_size,
                        });
                    }
                    host.set_int(target.base, widened)?;
                }
                self.advance(slot, node.next);
                self.reschedule_if_live(slot, node, host);
                Ok(Disposition::Continue)
            }
            NodeKind::Func { name, args } => {
                let args = args.clone();
                let name = name.clone();
                let mut vals = Vec::with_capacity(args.len());
                for a in &args {
                    vals.push(eval_expr(&graph, *a, host)?);
                }
                host.run_intrinsic(&name, &vals)?;
                self.advance(slot, node.next);
                self.reschedule_if_live(slot, node, host);
                Ok(Disposition::Continue)
            }
            NodeKind::Fork { children, join } => {
                let join = *join;
                let children = children.clone();
                self.advance(slot, None);
                for child in children {
                    let child_slot = self.alloc_slot(child);
                    host.schedule(self.id, ChpTag { pc_slot: child_slot, flag: false }, node.cost.delay);
                }
                let _ = join;
                Ok(Disposition::Continue)
            }
            NodeKind::Join { wait, totidx } => {
                let wait = *wait;
                let totidx = *totidx;
                let count = self.tot.entry(totidx).or_insert(0);
                *count += 1;
                if *count >= wait {
                    self.tot.remove(&totidx);
                    self.advance(slot, node.next);
                    self.reschedule_if_live(slot, node, host);
                } else {
                    self.advance(slot, None);
                }
                Ok(Disposition::Continue)
            }
            NodeKind::Send {
                chan,
                expr,
                flavor,
                is_struct: _,
                bidir_recv,
            } => {
                let chan = *chan;
                let flavor = *flavor;
                let bidir = bidir_recv.is_some();
                let bidir_recv = bidir_recv.clone();
                let value = eval_expr(&graph, *expr, host)?;
                let payload = MultiValue::scalar(value);
                let outcome = host.var_send(chan, slot, flag, payload, bidir, flavor)?;
                match outcome {
                    SendOutcome::Blocked => {
                        self.stall_on_chan(slot);
                        Ok(Disposition::Continue)
                    }
                    SendOutcome::BlockedProbeWoken { probe_pc, waiter } => {
                        host.schedule(waiter, ChpTag { pc_slot: probe_pc, flag: true }, 0);
                        self.stall_on_chan(slot);
                        Ok(Disposition::Continue)
                    }
                    SendOutcome::Completed { xchg_in } => {
                        self.complete_bidir(&bidir_recv, xchg_in, host)?;
                        self.advance(slot, node.next);
                        self.reschedule_if_live(slot, node, host);
                        Ok(Disposition::Continue)
                    }
                    SendOutcome::CompletedNotifyReceiver { wake_pc, xchg_in } => {
                        host.schedule(self.id, ChpTag { pc_slot: wake_pc, flag: true }, 0);
                        self.complete_bidir(&bidir_recv, xchg_in, host)?;
                        self.advance(slot, node.next);
                        self.reschedule_if_live(slot, node, host);
                        Ok(Disposition::Continue)
                    }
                }
            }
            NodeKind::Recv {
                chan,
                target,
                flavor,
                is_struct: _,
                bidir_send,
            } => {
                let chan = *chan;
                let flavor = *flavor;
                let bidir = bidir_send.is_some();
                let target = target.clone();
                let ack_payload = match bidir_send {
                    Some(e) => Some(MultiValue::scalar(eval_expr(&graph, *e, host)?)),
                    None => None,
                };
                let outcome = host.var_recv(chan, slot, flag, ack_payload, bidir, flavor)?;
                match outcome {
                    RecvOutcome::Blocked => {
                        self.stall_on_chan(slot);
                        Ok(Disposition::Continue)
                    }
                    RecvOutcome::BlockedProbeWoken { probe_pc, waiter } => {
                        host.schedule(waiter, ChpTag { pc_slot: probe_pc, flag: true }, 0);
                        self.stall_on_chan(slot);
                        Ok(Disposition::Continue)
                    }
                    RecvOutcome::Completed { value } | RecvOutcome::CompletedNotifySender { value, .. } => {
                        if let Some(t) = &target {
                            let v = value
                                .field(0)
                                .cloned()
                                .unwrap_or_else(|| WideInt::zero(1).expect("width 1 is never zero"));
                            if t.is_bool {
                                host.set_bool(t.base, if is_truthy(&v) { Bit::One } else { Bit::Zero })?;
                            } else {
                                host.set_int(t.base, v)?;
                            }
                        }
                        if let RecvOutcome::CompletedNotifySender { wake_pc, .. } = outcome {
                            host.schedule(self.id, ChpTag { pc_slot: wake_pc, flag: true }, 0);
                        }
                        self.advance(slot, node.next);
                        self.reschedule_if_live(slot, node, host);
                        Ok(Disposition::Continue)
                    }
                }
            }
            NodeKind::Cond { arbitrated, branches } | NodeKind::Loop { branches } => {
                let arbitrated = matches!(&node.kind, NodeKind::Cond { arbitrated, .. } if *arbitrated);
                let _ = arbitrated;
                let branches = branches.clone();
                let is_cond = matches!(node.kind, NodeKind::Cond { .. });
                if flag {
                    self.release_branch_probes(&graph, &branches, host);
                }
                let mut true_branches = Vec::new();
                for (i, b) in branches.iter().enumerate() {
                    let truth = match b.guard {
                        None => true,
                        Some(g) => is_truthy(&eval_expr(&graph, g, host)?),
                    };
                    if truth {
                        true_branches.push(i);
                    }
                }
                if true_branches.len() > 1 && is_cond && !arbitrated {
                    host.warn(SimWarning::MultiGuardTrue {
                        process: format!("{:?}", self.id),
                    });
                }
                let chosen = if true_branches.is_empty() {
                    None
                } else if true_branches.len() == 1 || !arbitrated {
                    Some(true_branches[0])
                } else {
                    let pick = host.choose_arbitrated(true_branches.len());
                    Some(true_branches[pick])
                };
                match chosen {
                    Some(i) => {
                        let entry = branches[i].entry;
                        self.advance(slot, Some(entry));
                        host.schedule(self.id, ChpTag { pc_slot: slot, flag: false }, node.cost.delay);
                        Ok(Disposition::Continue)
                    }
                    None => {
                        if is_cond {
                            self.arm_branch_probes(slot, &graph, &branches, host);
                        }
                        self.stall(slot);
                        Ok(Disposition::Continue)
                    }
                }
            }
        }
    }

    /// Release every probe this slot armed on the previous visit to a
    /// `COND`/`CONDARB` node, before re-scanning guards on a wake-up.
    fn release_branch_probes(&self, graph: &Graph, branches: &[Branch], host: &mut impl ChpHost) {
        for b in branches {
            if !b.is_probe {
                continue;
            }
            if let Some(g) = b.guard {
                if let Expr::Probe(chan, _) = graph.exprs.get(g) {
                    host.release_probe(*chan);
                }
            }
        }
    }

    /// Arm a probe registration for every `is_probe` branch of a
    /// `COND`/`CONDARB` node whose guard evaluated false, so a later real
    /// send/recv on that channel wakes this slot.
    fn arm_branch_probes(&self, slot: u32, graph: &Graph, branches: &[Branch], host: &mut impl ChpHost) {
        for b in branches {
            if !b.is_probe {
                continue;
            }
            if let Some(g) = b.guard {
                if let Expr::Probe(chan, side) = graph.exprs.get(g) {
                    match side {
                        ProbeSide::Send => {
                            host.probe_send(*chan, slot, self.id);
                        }
                        ProbeSide::Recv => {
                            host.probe_recv(*chan, slot, self.id);
                        }
                    }
                }
            }
        }
    }

    fn complete_bidir(
        &mut self,
        bidir_recv: &Option<crate::chp::expr::DerefDescriptor>,
        xchg_in: Option<MultiValue>,
        host: &mut impl ChpHost,
    ) -> SimResult<()> {
        if let (Some(target), Some(mv)) = (bidir_recv, xchg_in) {
            let v = mv
                .field(0)
                .cloned()
                .unwrap_or_else(|| WideInt::zero(1).expect("width 1 is never zero"));
            if target.is_bool {
                host.set_bool(target.base, if is_truthy(&v) { Bit::One } else { Bit::Zero })?;
            } else {
                host.set_int(target.base, v)?;
            }
        }
        Ok(())
    }

    fn stall_on_chan(&mut self, slot: u32) {
        self.stall(slot);
    }

    fn reschedule_if_live(&mut self, slot: u32, node: &Node, host: &mut impl ChpHost) {
        if self.pcs[slot as usize].is_some() {
            host.schedule(
                self.id,
                ChpTag { pc_slot: slot, flag: false },
                node.cost.delay + node.cost.bw_cost,
            );
        }
    }
}
