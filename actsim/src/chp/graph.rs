//! Lowering of structured CHP/HSE programs into an executable DAG, per
//! §4.9. Loops in the source (back-edges of `LOOP`/`DOLOOP`) would make
//! naive per-node ownership cyclic, so nodes live in one arena owned by
//! the process's shared graph and reference each other by index; the
//! graph is immutable after construction and shared read-only by every
//! instance of that process.

use hashbrown::HashMap;

use actsim_types::GlobalOffset;

use crate::channel::Flavor;
use crate::chp::expr::{DerefDescriptor, ExprArena, ExprId};

/// Index of a node in a [`Graph`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Per-statement cost annotations, pulled from configuration or an SDF
/// override at build time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostAnnotation {
    pub delay: u64,
    pub bw_cost: u64,
    pub energy: u64,
    pub area: u64,
    pub leakage: u64,
}

/// A guarded branch in a `COND`/`CONDARB`/`LOOP` node.
#[derive(Debug, Clone)]
pub struct Branch {
    /// `None` for an unconditional `else` arm (used by `DOLOOP`'s repeat
    /// branch and unguarded `LOOP` bodies).
    pub guard: Option<ExprId>,
    pub is_probe: bool,
    pub is_shared: bool,
    pub entry: NodeId,
}

/// The statement a node carries, per the listing in "CHP executable
/// graph".
#[derive(Debug, Clone)]
pub enum NodeKind {
    Fork {
        children: Vec<NodeId>,
        join: NodeId,
    },
    Join {
        wait: u32,
        totidx: u32,
    },
    Assign {
        target: DerefDescriptor,
        expr: ExprId,
        is_struct: bool,
    },
    Send {
        chan: GlobalOffset,
        expr: ExprId,
        flavor: Option<Flavor>,
        is_struct: bool,
        bidir_recv: Option<DerefDescriptor>,
    },
    Recv {
        chan: GlobalOffset,
        target: Option<DerefDescriptor>,
        flavor: Option<Flavor>,
        is_struct: bool,
        bidir_send: Option<ExprId>,
    },
    Cond {
        arbitrated: bool,
        branches: Vec<Branch>,
    },
    /// A `LOOP`/`DOLOOP` dispatch node: like `Cond`, but a `None`-guard
    /// branch that reaches this same node again is a bare repeat.
    Loop {
        branches: Vec<Branch>,
    },
    Nop {
        watchdog: bool,
    },
    Func {
        name: String,
        args: Vec<ExprId>,
    },
    /// A dead end: the graph's implicit "stop" pointer. Present only at
    /// the tail of a top-level process body.
    Stop,
}

/// One node: its statement plus the shared cost annotation and the
/// `next` pointer chaining it to whatever follows in program order
/// (`None` at the graph's stop node, and unused on `Fork`/`Cond`/`Loop`
/// nodes, whose successors are named explicitly).
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub next: Option<NodeId>,
    pub cost: CostAnnotation,
}

/// The compiled, immutable graph for one process. Shared read-only by
/// every instance of that process; instances hold only an array of
/// `NodeId` program counters into it.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    pub entry: NodeId,
    pub labels: HashMap<String, NodeId>,
    pub exprs: ExprArena,
    max_pcs: u32,
}

impl Graph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn max_program_counters(&self) -> u32 {
        self.max_pcs
    }
}

/// Loose tree form of a CHP/HSE body as read out of the elaborated
/// design, prior to lowering into the arena DAG.
#[derive(Debug, Clone)]
pub enum Stmt {
    Semi(Vec<Stmt>),
    Comma(Vec<Stmt>),
    Select(Vec<(ExprId, Stmt)>, Vec<(bool, bool)>),
    SelectNondet(Vec<(ExprId, Stmt)>, Vec<(bool, bool)>),
    Loop(Box<Stmt>),
    DoLoop(Box<Stmt>),
    Send {
        chan: GlobalOffset,
        expr: ExprId,
        flavor: Option<Flavor>,
        is_struct: bool,
        bidir_recv: Option<DerefDescriptor>,
    },
    Recv {
        chan: GlobalOffset,
        target: Option<DerefDescriptor>,
        flavor: Option<Flavor>,
        is_struct: bool,
        bidir_send: Option<ExprId>,
    },
    Assign {
        target: DerefDescriptor,
        expr: ExprId,
        is_struct: bool,
    },
    Func {
        name: String,
        args: Vec<ExprId>,
    },
    Skip,
    Label(String, Box<Stmt>),
    Goto(String),
}

/// Builds a [`Graph`] from a [`Stmt`] tree, threading `next` pointers and
/// precomputing `max_program_counters` (the sum over `Comma` children,
/// the max over everything else, per §4.9).
pub struct GraphBuilder {
    nodes: Vec<Node>,
    labels: HashMap<String, NodeId>,
    pending_gotos: Vec<(NodeId, String)>,
    next_totidx: u32,
    default_cost: CostAnnotation,
}

impl GraphBuilder {
    pub fn new(default_cost: CostAnnotation) -> Self {
        Self {
            nodes: Vec::new(),
            labels: HashMap::new(),
            pending_gotos: Vec::new(),
            next_totidx: 0,
            default_cost,
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            next: None,
            cost: self.default_cost,
        });
        id
    }

    fn set_next(&mut self, id: NodeId, next: NodeId) {
        self.nodes[id.0 as usize].next = Some(next);
    }

    /// Lower `stmt`, returning its entry node and the set of tail nodes
    /// whose `next` the caller should patch to whatever follows.
    fn lower(&mut self, stmt: &Stmt) -> (NodeId, Vec<NodeId>) {
        match stmt {
            Stmt::Skip => {
                let id = self.push(NodeKind::Nop { watchdog: false });
                (id, vec![id])
            }
            Stmt::Label(name, inner) => {
                let (entry, tails) = self.lower(inner);
                self.labels.insert(name.clone(), entry);
                (entry, tails)
            }
            Stmt::Goto(label) => {
                // Represented as a Nop whose `next` will be patched once
                // every label is known (see `resolve_gotos`).
                let id = self.push(NodeKind::Nop { watchdog: false });
                self.pending_gotos.push((id, label.clone()));
                (id, vec![])
            }
            Stmt::Semi(children) => {
                if children.is_empty() {
                    return self.lower(&Stmt::Skip);
                }
                let (entry, mut tails) = self.lower(&children[0]);
                for child in &children[1..] {
                    let (next_entry, next_tails) = self.lower(child);
                    for t in &tails {
                        self.set_next(*t, next_entry);
                    }
                    tails = next_tails;
                }
                (entry, tails)
            }
            Stmt::Comma(children) => {
                let non_trivial: Vec<&Stmt> =
                    children.iter().filter(|c| !matches!(c, Stmt::Skip)).collect();
                if non_trivial.len() <= 1 {
                    return self.lower(children.first().unwrap_or(&Stmt::Skip));
                }
                let totidx = self.next_totidx;
                self.next_totidx += 1;
                let join = self.push(NodeKind::Join {
                    wait: non_trivial.len() as u32,
                    totidx,
                });
                let mut child_entries = Vec::new();
                for child in &non_trivial {
                    let (entry, tails) = self.lower(child);
                    for t in tails {
                        self.set_next(t, join);
                    }
                    child_entries.push(entry);
                }
                let fork = self.push(NodeKind::Fork {
                    children: child_entries,
                    join,
                });
                (fork, vec![join])
            }
            Stmt::Select(branches, flags) | Stmt::SelectNondet(branches, flags) => {
                let arbitrated = matches!(stmt, Stmt::SelectNondet(..));
                let mut out_branches = Vec::new();
                let mut tails = Vec::new();
                for ((guard, body), (is_probe, is_shared)) in branches.iter().zip(flags) {
                    let (entry, body_tails) = self.lower(body);
                    out_branches.push(Branch {
                        guard: Some(*guard),
                        is_probe: *is_probe,
                        is_shared: *is_shared,
                        entry,
                    });
                    tails.extend(body_tails);
                }
                let id = self.push(NodeKind::Cond {
                    arbitrated,
                    branches: out_branches,
                });
                (id, tails)
            }
            Stmt::Loop(body) => {
                if matches!(**body, Stmt::Skip) {
                    let id = self.push(NodeKind::Nop { watchdog: true });
                    self.set_next(id, id);
                    return (id, vec![]);
                }
                let (body_entry, body_tails) = self.lower(body);
                let dispatch = self.push(NodeKind::Loop {
                    branches: vec![Branch {
                        guard: None,
                        is_probe: false,
                        is_shared: false,
                        entry: body_entry,
                    }],
                });
                for t in body_tails {
                    self.set_next(t, dispatch);
                }
                (dispatch, vec![])
            }
            Stmt::DoLoop(body) => {
                let (first_entry, first_tails) = self.lower(body);
                let (loop_entry, loop_tails) = self.lower(&Stmt::Loop(body.clone()));
                debug_assert!(loop_tails.is_empty());
                for t in first_tails {
                    self.set_next(t, loop_entry);
                }
                (first_entry, vec![])
            }
            Stmt::Assign {
                target,
                expr,
                is_struct,
            } => {
                let id = self.push(NodeKind::Assign {
                    target: target.clone(),
                    expr: *expr,
                    is_struct: *is_struct,
                });
                (id, vec![id])
            }
            Stmt::Send {
                chan,
                expr,
                flavor,
                is_struct,
                bidir_recv,
            } => {
                let id = self.push(NodeKind::Send {
                    chan: *chan,
                    expr: *expr,
                    flavor: *flavor,
                    is_struct: *is_struct,
                    bidir_recv: bidir_recv.clone(),
                });
                (id, vec![id])
            }
            Stmt::Recv {
                chan,
                target,
                flavor,
                is_struct,
                bidir_send,
            } => {
                let id = self.push(NodeKind::Recv {
                    chan: *chan,
                    target: target.clone(),
                    flavor: *flavor,
                    is_struct: *is_struct,
                    bidir_send: *bidir_send,
                });
                (id, vec![id])
            }
            Stmt::Func { name, args } => {
                let id = self.push(NodeKind::Func {
                    name: name.clone(),
                    args: args.clone(),
                });
                (id, vec![id])
            }
        }
    }

    fn resolve_gotos(&mut self) -> Result<(), String> {
        let pending = std::mem::take(&mut self.pending_gotos);
        for (from, label) in pending {
            let target = self
                .labels
                .get(&label)
                .copied()
                .ok_or_else(|| label.clone())?;
            self.set_next(from, target);
        }
        Ok(())
    }

    /// `max_program_counters`: sum over `Comma` fork fan-out, max
    /// elsewhere, computed by walking the statement tree (not the
    /// lowered graph, since the graph's fork/join shape mirrors it
    /// exactly).
    fn max_pcs(stmt: &Stmt) -> u32 {
        match stmt {
            Stmt::Semi(children) => children.iter().map(Self::max_pcs).max().unwrap_or(1),
            Stmt::Comma(children) => children.iter().map(Self::max_pcs).sum::<u32>().max(1),
            Stmt::Select(branches, _) | Stmt::SelectNondet(branches, _) => branches
                .iter()
                .map(|(_, b)| Self::max_pcs(b))
                .max()
                .unwrap_or(1),
            Stmt::Loop(b) | Stmt::DoLoop(b) => Self::max_pcs(b),
            Stmt::Label(_, inner) => Self::max_pcs(inner),
            _ => 1,
        }
    }

    pub fn build(mut self, root: &Stmt, exprs: ExprArena) -> Result<Graph, String> {
        let (entry, tails) = self.lower(root);
        let stop = self.push(NodeKind::Stop);
        for t in tails {
            self.set_next(t, stop);
        }
        self.resolve_gotos()?;
        let max_pcs = Self::max_pcs(root);
        Ok(Graph {
            nodes: self.nodes,
            entry,
            labels: self.labels,
            exprs,
            max_pcs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chp::expr::Expr;
    use actsim_types::WideInt;

    fn dummy_expr(exprs: &mut ExprArena) -> ExprId {
        exprs.push(Expr::Const(WideInt::from_u64(1, 1).unwrap()))
    }

    #[test]
    fn semi_chains_nodes_in_order() {
        let mut exprs = ExprArena::new();
        let e = dummy_expr(&mut exprs);
        let stmt = Stmt::Semi(vec![
            Stmt::Assign {
                target: DerefDescriptor::scalar(GlobalOffset(0), 1, false),
                expr: e,
                is_struct: false,
            },
            Stmt::Assign {
                target: DerefDescriptor::scalar(GlobalOffset(1), 1, false),
                expr: e,
                is_struct: false,
            },
        ]);
        let graph = GraphBuilder::new(CostAnnotation::default())
            .build(&stmt, exprs)
            .unwrap();
        let first = graph.node(graph.entry);
        assert!(first.next.is_some());
    }

    #[test]
    fn comma_with_two_branches_forks_and_joins() {
        let mut exprs = ExprArena::new();
        let e = dummy_expr(&mut exprs);
        let stmt = Stmt::Comma(vec![
            Stmt::Assign {
                target: DerefDescriptor::scalar(GlobalOffset(0), 1, false),
                expr: e,
                is_struct: false,
            },
            Stmt::Assign {
                target: DerefDescriptor::scalar(GlobalOffset(1), 1, false),
                expr: e,
                is_struct: false,
            },
        ]);
        let graph = GraphBuilder::new(CostAnnotation::default())
            .build(&stmt, exprs)
            .unwrap();
        assert!(matches!(graph.node(graph.entry).kind, NodeKind::Fork { .. }));
        assert_eq!(graph.max_program_counters(), 2);
    }

    #[test]
    fn empty_loop_body_is_a_self_looping_watchdog_nop() {
        let exprs = ExprArena::new();
        let stmt = Stmt::Loop(Box::new(Stmt::Skip));
        let graph = GraphBuilder::new(CostAnnotation::default())
            .build(&stmt, exprs)
            .unwrap();
        let node = graph.node(graph.entry);
        assert!(matches!(node.kind, NodeKind::Nop { watchdog: true }));
        assert_eq!(node.next, Some(graph.entry));
    }

    #[test]
    fn goto_resolves_to_the_labeled_node() {
        let exprs = ExprArena::new();
        let stmt = Stmt::Semi(vec![
            Stmt::Label("top".to_string(), Box::new(Stmt::Skip)),
            Stmt::Goto("top".to_string()),
        ]);
        let graph = GraphBuilder::new(CostAnnotation::default())
            .build(&stmt, exprs)
            .unwrap();
        let labeled = graph.labels["top"];
        // entry -> labeled skip node; its `next` was patched to the goto
        // node, whose own `next` now points back at `labeled`.
        let goto_node_id = graph.node(labeled).next.unwrap();
        assert_eq!(graph.node(goto_node_id).next, Some(labeled));
    }
}
