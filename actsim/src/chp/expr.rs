//! The CHP expression intermediate representation: everything a guard,
//! assignment right-hand side, or function argument can be built from.

use actsim_types::{GlobalOffset, WideInt};

/// A resolved reference to a scalar, array element, or structure leaf, per
/// the "Deref descriptor" design note. Array indices are kept as compiled
/// index expressions so execution re-resolves them (the index may itself
/// be a variable).
#[derive(Debug, Clone)]
pub struct DerefDescriptor {
    pub base: GlobalOffset,
    pub width: u32,
    pub is_bool: bool,
    pub is_enum: bool,
    pub enum_size: u32,
    /// For array references: per-dimension index expressions, paired with
    /// that dimension's extent for the range check, plus the stride to
    /// linearize into a flat offset.
    pub indices: Vec<(ExprId, u32)>,
    pub stride: u32,
}

impl DerefDescriptor {
    pub fn scalar(base: GlobalOffset, width: u32, is_bool: bool) -> Self {
        Self {
            base,
            width,
            is_bool,
            is_enum: false,
            enum_size: 0,
            indices: Vec::new(),
            stride: 1,
        }
    }

    pub fn is_array(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Index of an [`Expr`] in a [`crate::chp::graph::Graph`]'s expression
/// arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Asr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    LogicalNot,
}

/// Which side of a channel a `probe(c)` guard is evaluated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSide {
    Send,
    Recv,
}

/// One node of the expression tree. Stored by value in the owning
/// process's expression arena and referenced elsewhere by [`ExprId`].
#[derive(Debug, Clone)]
pub enum Expr {
    Const(WideInt),
    Var(DerefDescriptor),
    /// A field projection into a structure reference: the base deref plus
    /// a leaf index into its multi-value.
    Field(DerefDescriptor, usize),
    Bin(BinOp, ExprId, ExprId),
    Un(UnOp, ExprId),
    /// `bool(e)` / `int(e, width)` builtin casts.
    ToBool(ExprId),
    ToInt(ExprId, u32),
    Bitfield {
        base: ExprId,
        shift: u32,
        width: u32,
    },
    Call {
        name: String,
        args: Vec<ExprId>,
    },
    /// Valid only while evaluating a guard in a selection: `probe(c)`. The
    /// side names which end of `c` the probing process sits on, since
    /// `probe_peek` must check the *other* end for a committed party.
    Probe(GlobalOffset, ProbeSide),
    /// Valid only while a sender is blocked on `chan`: reads its deposited
    /// value.
    ChanValue(GlobalOffset),
    /// Valid only inside a fragmented-channel method evaluation.
    SelfVar,
    SelfAckVar,
}

/// An owned arena of expression nodes for one process's compiled graph.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, e: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(e);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.0 as usize]
    }
}
