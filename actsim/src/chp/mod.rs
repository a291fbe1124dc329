//! The CHP (Communicating Hardware Processes) execution engine: an
//! expression IR, a statement-tree-to-DAG lowering pass, the per-actor
//! interpreter that walks that DAG event by event, and synchronous user
//! function evaluation.

pub mod expr;
pub mod function;
pub mod graph;
pub mod interpreter;

pub use expr::{BinOp, DerefDescriptor, Expr, ExprArena, ExprId, UnOp};
pub use function::{call_function, FunctionDef};
pub use graph::{Branch, CostAnnotation, Graph, GraphBuilder, Node, NodeId, NodeKind, Stmt};
pub use interpreter::{ChpActor, ChpHost, ChpTag, ExprHost, SHARED_WAKEUP};
