//! Channel state: the rendezvous protocol for non-fragmented channels, and
//! the straight-line VM used to step fragmented channels method by method.

mod fragment;

pub use fragment::{run_method, FragEnv, FragOp, FragResult, RunResult};

use actsim_types::ConnId;

use crate::error::{ChannelSide, SimFatal};
use crate::state::fanout::ActorId;
use crate::state::MultiValue;

/// The two-phase handshake polarity used by protocols that alternate
/// `+`/`-` half-actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Plus,
    Minus,
}

impl Flavor {
    fn next(self) -> Flavor {
        match self {
            Flavor::Plus => Flavor::Minus,
            Flavor::Minus => Flavor::Plus,
        }
    }
}

/// Which side of a channel is fragmented (partially observable to
/// PRS/HSE code), per the two-bit mask in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentedMask {
    pub input: bool,
    pub output: bool,
}

impl FragmentedMask {
    pub fn any(self) -> bool {
        self.input || self.output
    }
}

/// The full per-channel record the state vector owns, per §3's "Channel
/// state" field list.
#[derive(Debug, Clone)]
pub struct ChanState {
    pub id: ConnId,
    pub type_desc: String,
    pub instance_id: u32,

    send_pc: u32,
    recv_pc: u32,
    sender_probe: bool,
    receiver_probe: bool,
    data_for_recv: Option<MultiValue>,
    data_for_send: Option<MultiValue>,

    pub fragmented: FragmentedMask,
    pub sfrag_st: u32,
    pub rfrag_st: u32,
    pub sufrag_st: u32,
    pub rufrag_st: u32,
    pub skip_action: bool,

    pub use_flavors: bool,
    send_flavor: Option<Flavor>,
    recv_flavor: Option<Flavor>,

    probe_waiter: Option<ActorId>,
    wait_set: Vec<ActorId>,

    pub count: u64,
}

impl ChanState {
    pub fn new(id: ConnId, type_desc: impl Into<String>, instance_id: u32) -> Self {
        Self {
            id,
            type_desc: type_desc.into(),
            instance_id,
            send_pc: 0,
            recv_pc: 0,
            sender_probe: false,
            receiver_probe: false,
            data_for_recv: None,
            data_for_send: None,
            fragmented: FragmentedMask::default(),
            sfrag_st: 0,
            rfrag_st: 0,
            sufrag_st: 0,
            rufrag_st: 0,
            skip_action: false,
            use_flavors: false,
            send_flavor: None,
            recv_flavor: None,
            probe_waiter: None,
            wait_set: Vec::new(),
            count: 0,
        }
    }

    pub fn is_send_blocked(&self) -> bool {
        self.send_pc != 0 && !self.sender_probe
    }

    pub fn is_recv_blocked(&self) -> bool {
        self.recv_pc != 0 && !self.receiver_probe
    }

    fn check_flavor(&mut self, side: ChannelSide, flavor: Option<Flavor>) -> Result<(), SimFatal> {
        let (using, expected) = match side {
            ChannelSide::Sender => (&mut self.use_flavors, &mut self.send_flavor),
            ChannelSide::Receiver => (&mut self.use_flavors, &mut self.recv_flavor),
        };
        match (flavor, &*expected) {
            (None, _) => Ok(()),
            (Some(f), None) => {
                *using = true;
                *expected = Some(f.next());
                Ok(())
            }
            (Some(f), Some(exp)) if f == *exp => {
                *expected = Some(f.next());
                Ok(())
            }
            _ => Err(SimFatal::FlavorViolation { chan: self.id }),
        }
    }

    /// `var_send(pc, wakeup_flag, payload, bidir)`: see §4.6. `pc` is the
    /// program counter the sender would resume at if it must block.
    pub fn var_send(
        &mut self,
        pc: u32,
        wakeup_flag: bool,
        payload: MultiValue,
        bidir: bool,
        flavor: Option<Flavor>,
    ) -> Result<SendOutcome, SimFatal> {
        self.check_flavor(ChannelSide::Sender, flavor)?;
        if wakeup_flag {
            // The rendezvous was already counted by whichever side detected
            // it (the `CompletedNotify*` branch below); this call only lets
            // the woken party finish its own statement.
            let xchg_in = if bidir {
                self.data_for_send.take()
            } else {
                None
            };
            self.send_pc = 0;
            return Ok(SendOutcome::Completed { xchg_in });
        }
        if self.is_recv_blocked() {
            let wake_pc = self.recv_pc - 1;
            let xchg_in = if bidir {
                self.data_for_send.take()
            } else {
                None
            };
            self.data_for_recv = Some(payload);
            self.recv_pc = 0;
            self.count += 1;
            return Ok(SendOutcome::CompletedNotifyReceiver { wake_pc, xchg_in });
        }
        if self.recv_pc != 0 && self.receiver_probe {
            let wake_pc = self.recv_pc - 1;
            let waiter = self.probe_waiter.take().expect("receiver_probe implies a registered waiter");
            self.recv_pc = 0;
            self.receiver_probe = false;
            // Fall through to blocking: the probe is notified separately
            // by the caller via the returned `probe_to_wake`.
            self.data_for_send = Some(payload);
            self.send_pc = pc + 1;
            self.wait_set.push(ActorId(self.instance_id));
            return Ok(SendOutcome::BlockedProbeWoken { probe_pc: wake_pc, waiter });
        }
        if self.is_send_blocked() {
            return Err(SimFatal::ConcurrentChannelAccess {
                chan: self.id,
                side: ChannelSide::Sender,
            });
        }
        self.data_for_send = Some(payload);
        self.send_pc = pc + 1;
        Ok(SendOutcome::Blocked)
    }

    /// Symmetric to [`var_send`](Self::var_send).
    pub fn var_recv(
        &mut self,
        pc: u32,
        wakeup_flag: bool,
        payload: Option<MultiValue>,
        bidir: bool,
        flavor: Option<Flavor>,
    ) -> Result<RecvOutcome, SimFatal> {
        self.check_flavor(ChannelSide::Receiver, flavor)?;
        if wakeup_flag {
            // Already counted on the notifying side; see `var_send`.
            let value = self
                .data_for_recv
                .take()
                .expect("wakeup implies a deposited value");
            self.recv_pc = 0;
            return Ok(RecvOutcome::Completed { value });
        }
        if self.is_send_blocked() {
            let wake_pc = self.send_pc - 1;
            let value = self
                .data_for_send
                .take()
                .expect("sender blocked implies a deposited value");
            if bidir {
                self.data_for_recv = payload;
            }
            self.send_pc = 0;
            self.count += 1;
            return Ok(RecvOutcome::CompletedNotifySender { wake_pc, value });
        }
        if self.send_pc != 0 && self.sender_probe {
            let wake_pc = self.send_pc - 1;
            let waiter = self.probe_waiter.take().expect("sender_probe implies a registered waiter");
            self.send_pc = 0;
            self.sender_probe = false;
            self.recv_pc = pc + 1;
            return Ok(RecvOutcome::BlockedProbeWoken { probe_pc: wake_pc, waiter });
        }
        if self.is_recv_blocked() {
            return Err(SimFatal::ConcurrentChannelAccess {
                chan: self.id,
                side: ChannelSide::Receiver,
            });
        }
        self.recv_pc = pc + 1;
        Ok(RecvOutcome::Blocked)
    }

    /// Register a probe on the send side; returns whether a non-probe
    /// receiver is already blocked (the probe is immediately "true").
    pub fn probe_send(&mut self, pc: u32, waiter: ActorId) -> bool {
        if self.is_recv_blocked() {
            return true;
        }
        self.sender_probe = true;
        self.send_pc = pc + 1;
        self.probe_waiter = Some(waiter);
        false
    }

    pub fn probe_recv(&mut self, pc: u32, waiter: ActorId) -> bool {
        if self.is_send_blocked() {
            return true;
        }
        self.receiver_probe = true;
        self.recv_pc = pc + 1;
        self.probe_waiter = Some(waiter);
        false
    }

    /// Clear a probe registration once its wake-up has been consumed or
    /// purged by `match_pending`.
    pub fn clear_probe(&mut self) {
        self.sender_probe = false;
        self.receiver_probe = false;
        self.send_pc = 0;
        self.recv_pc = 0;
        self.probe_waiter = None;
    }

    pub fn wait_set(&self) -> &[ActorId] {
        &self.wait_set
    }

    pub fn clear_wait_set(&mut self) {
        self.wait_set.clear();
    }

    /// The sender's deposited value, for peeking while it is blocked
    /// (a fragmented receiver's `ChanValue` read, not a consuming recv).
    pub fn data_for_send(&self) -> Option<&MultiValue> {
        self.data_for_send.as_ref()
    }

    /// The receiver's deposited value on a bidirectional exchange, for
    /// `self_ack` reads while evaluating a fragmented method.
    pub fn data_for_recv(&self) -> Option<&MultiValue> {
        self.data_for_recv.as_ref()
    }

    /// A fragmented receive method finished without going through the
    /// ordinary `var_recv` handshake; if a sender is actually blocked on
    /// the other end, finalize the rendezvous for it. Returns the pc it
    /// should resume at.
    pub fn finish_blocked_sender(&mut self) -> Option<u32> {
        if !self.is_send_blocked() {
            return None;
        }
        let wake_pc = self.send_pc - 1;
        self.send_pc = 0;
        self.count += 1;
        Some(wake_pc)
    }

    /// Symmetric to [`finish_blocked_sender`](Self::finish_blocked_sender),
    /// for a fragmented send method completing against a blocked receiver.
    pub fn finish_blocked_receiver(&mut self) -> Option<u32> {
        if !self.is_recv_blocked() {
            return None;
        }
        let wake_pc = self.recv_pc - 1;
        self.recv_pc = 0;
        self.count += 1;
        Some(wake_pc)
    }
}

/// Outcome of [`ChanState::var_send`].
#[derive(Debug)]
pub enum SendOutcome {
    Completed { xchg_in: Option<MultiValue> },
    CompletedNotifyReceiver { wake_pc: u32, xchg_in: Option<MultiValue> },
    BlockedProbeWoken { probe_pc: u32, waiter: ActorId },
    Blocked,
}

/// Outcome of [`ChanState::var_recv`].
#[derive(Debug)]
pub enum RecvOutcome {
    Completed { value: MultiValue },
    CompletedNotifySender { wake_pc: u32, value: MultiValue },
    BlockedProbeWoken { probe_pc: u32, waiter: ActorId },
    Blocked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use actsim_types::WideInt;

    fn payload(v: u64) -> MultiValue {
        MultiValue::scalar(WideInt::from_u64(8, v).unwrap())
    }

    #[test]
    fn send_then_recv_completes_rendezvous_and_increments_count() {
        let mut c = ChanState::new(ConnId(0), "int", 0);
        let out = c.var_send(1, false, payload(5), false, None).unwrap();
        assert!(matches!(out, SendOutcome::Blocked));
        let out = c.var_recv(2, false, None, false, None).unwrap();
        match out {
            RecvOutcome::CompletedNotifySender { wake_pc, value } => {
                assert_eq!(wake_pc, 1);
                assert_eq!(value.field(0).unwrap().dec_print(), "5");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(c.count, 1);
        assert!(!c.is_send_blocked());
        assert!(!c.is_recv_blocked());
    }

    #[test]
    fn second_blocking_sender_is_fatal() {
        let mut c = ChanState::new(ConnId(0), "int", 0);
        c.var_send(1, false, payload(1), false, None).unwrap();
        let err = c.var_send(2, false, payload(2), false, None).unwrap_err();
        assert!(matches!(err, SimFatal::ConcurrentChannelAccess { .. }));
    }

    #[test]
    fn flavor_discipline_must_alternate() {
        let mut c = ChanState::new(ConnId(0), "int", 0);
        c.var_send(1, false, payload(1), false, Some(Flavor::Plus))
            .unwrap();
        c.var_recv(2, false, None, false, Some(Flavor::Plus))
            .unwrap();
        let err = c
            .var_send(3, false, payload(2), false, Some(Flavor::Plus))
            .unwrap_err();
        assert!(matches!(err, SimFatal::FlavorViolation { .. }));
    }

    /// A sender that shows up against a probing receiver must wake the
    /// actor that actually registered the probe, not the sender itself.
    #[test]
    fn sender_wakes_the_actor_that_registered_the_probe() {
        let mut c = ChanState::new(ConnId(0), "int", 0);
        let prober = ActorId(9);
        assert!(!c.probe_recv(4, prober));
        let out = c.var_send(1, false, payload(7), false, None).unwrap();
        match out {
            SendOutcome::BlockedProbeWoken { probe_pc, waiter } => {
                assert_eq!(probe_pc, 4);
                assert_eq!(waiter, prober);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
