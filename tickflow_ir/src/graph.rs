//! Nodes, ports, edges, and the reaction builder surface.
//!
//! Entities live in slotmap arenas keyed by stable ids; nodes, ports, edges,
//! variables, and reactions are declared through explicit builder calls on
//! `GraphBuilder` rather than any reflective descriptor mechanism.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::expr::Expr;
use crate::policy::Policy;
use crate::value::Value;

new_key_type! {
    pub struct NodeId;
    pub struct PortId;
    pub struct EdgeId;
    pub struct VarId;
    pub struct ReactionId;
}

/// A behavioral contract an `External` node promises to uphold. Opting out
/// of every field (`unsafe_opaque`) is the fully-opaque escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub deterministic: bool,
    pub no_side_effects: bool,
    pub monotone: bool,
    pub no_instant_loop: bool,
    /// Maximum wall-clock latency the node promises per tick, if bounded.
    pub max_latency: Option<f64>,
}
impl Contract {
    /// The strongest contract: safe to assume anything about this node.
    pub fn trusted() -> Self {
        Self {
            deterministic: true,
            no_side_effects: true,
            monotone: true,
            no_instant_loop: true,
            max_latency: None,
        }
    }

    /// No promises at all — the `@unsafe` escape hatch.
    pub fn unsafe_opaque() -> Self {
        Self {
            deterministic: false,
            no_side_effects: false,
            monotone: false,
            no_instant_loop: false,
            max_latency: None,
        }
    }
}

/// Integration method for a `Continuous` node's state. See `continuous` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integrator {
    Euler,
    Rk4,
}

/// Static description of a `Continuous` node, i.e. what `tickflow_rt::continuous`
/// needs to run it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuousSpec {
    pub integrator: Integrator,
    pub max_step: f64,
    /// Names of the derivative-dict keys the node's `derivative` function is
    /// required to populate; checked at build time against the state shape.
    pub derivative_keys: Vec<String>,
    /// `Some(initial)` marks this node as the hybrid variant: the `u` port
    /// is zero-order-held across ticks rather than re-read from
    /// its default whenever a tick leaves it unwritten, seeded with
    /// `initial` before the first tick. `None` means `u` is read fresh every
    /// tick through the ordinary port-default mechanism.
    pub hybrid_held_u: Option<Value>,
}

/// What kind of node this is, and the node-kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// An ordinary reactive node: ports, state, and `Reaction`s evaluated by
    /// the discrete synchronous scheduler.
    Core,
    /// An opaque foreign-function node admitted into the graph under a
    /// `Contract`; it has no `Reaction`s of its own, only ports, and is
    /// driven by a synthetic reaction at `build_ir` time (see `ir::build_ir`).
    External(Contract),
    /// A node whose internal state evolves under a continuous-time
    /// integrator, bridged to the discrete clock via a zero-order hold.
    Continuous(ContinuousSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// A single I/O port on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    pub node: NodeId,
    pub name: String,
    pub direction: Direction,
    /// The value this port carries when nothing has written to it this tick.
    /// `None` means Absent.
    pub default: Option<Value>,
    /// Declared type name, if any, for `TypeCheckPass`. `None` means the port
    /// declares no concrete type and is treated the same as the literal
    /// `"Any"` type name: it suppresses the check on any edge touching it.
    pub type_name: Option<String>,
    /// SDF static production/consumption rate, if multi-rate.
    pub rate: Option<i64>,
    /// If this output port is fed exclusively from a `Delay` buffer, the
    /// variable backing that buffer — used by the scheduler to flip edge
    /// polarity across the delay.
    pub is_delay_output: Option<VarId>,
}

/// A directed dataflow edge between two ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: PortId,
    pub to: PortId,
}

/// A persistent state variable owned by a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    pub node: NodeId,
    pub name: String,
    pub init: Value,
    pub policy: Policy,
    /// True if this variable exists solely to back a `Delay` expression.
    pub is_delay_buffer: bool,
}

/// A single effect a `Reaction` performs: either emitting a value on an
/// output port, or writing a state variable under its declared `Policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Effect {
    Emit { port: PortId, value: Expr },
    /// `priority` is only consulted by a `Policy::Lww` variable's merge:
    /// picks the intent whose producer declares the maximum priority. Every
    /// other policy ignores it.
    Write { var: VarId, value: Expr, priority: i64 },
}

/// A named computation attached to a `Core` node: reads some ports/variables,
/// produces a set of `Effect`s. Built fluently and admitted to the
/// `GraphBuilder` via `add_reaction`, which runs `lint_reaction` first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub node: NodeId,
    pub name: String,
    pub effects: Vec<Effect>,
    /// Extra read dependencies that aren't visible in `effects` because this
    /// reaction was synthesized for an `External`/`Continuous` node rather
    /// than authored against the expression DSL (see `ir::build_ir`). Empty
    /// for every user-authored `Core` reaction.
    pub extra_reads: Vec<crate::expr::Ref>,
    /// The state cell this reaction is stratified by, if the author has
    /// declared one: certifies to `CausalityPass` that repeated firing of
    /// this reaction within an SCC's microstep loop is bounded by that
    /// cell's policy height, so the constructive check may be skipped for
    /// the whole SCC.
    pub nonzeno_rank: Option<VarId>,
    /// Per-reaction override of the SCC microstep cap; the scheduler takes
    /// the minimum of this and the runtime's global `max_microsteps` for any
    /// SCC this reaction participates in.
    pub nonzeno_limit: Option<usize>,
}
impl Reaction {
    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
            effects: Vec::new(),
            extra_reads: Vec::new(),
            nonzeno_rank: None,
            nonzeno_limit: None,
        }
    }

    /// Declares this reaction's non-Zeno rank and microstep limit.
    pub fn with_nonzeno(mut self, rank: VarId, limit: usize) -> Self {
        self.nonzeno_rank = Some(rank);
        self.nonzeno_limit = Some(limit);
        self
    }

    pub fn emit(mut self, port: PortId, value: Expr) -> Self {
        self.effects.push(Effect::Emit { port, value });
        self
    }

    pub fn write(mut self, var: VarId, value: Expr) -> Self {
        self.effects.push(Effect::Write { var, value, priority: 0 });
        self
    }

    /// Like `write`, but declares an explicit LWW priority for this write
    /// site. Ignored by every policy except `Policy::Lww`.
    pub fn write_with_priority(mut self, var: VarId, value: Expr, priority: i64) -> Self {
        self.effects.push(Effect::Write { var, value, priority });
        self
    }

    /// Builds the implicit, effect-free reaction the IR attaches to every
    /// `External`/`Continuous` node so the causality pass can treat all node
    /// kinds uniformly (see `ir::build_ir`).
    pub fn synthetic(node: NodeId, name: impl Into<String>, reads: Vec<PortId>) -> Self {
        Self {
            node,
            name: name.into(),
            effects: Vec::new(),
            extra_reads: reads.into_iter().map(crate::expr::Ref::Port).collect(),
            nonzeno_rank: None,
            nonzeno_limit: None,
        }
    }
}

/// Errors raised while building a graph: either a reaction fails
/// `lint_reaction`, or a reference (port/var/node id) does not belong to this
/// builder.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    NonConstDelayDefault { reaction: String },
    DanglingReference { reaction: String, detail: String },
}
impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonConstDelayDefault { reaction } => {
                write!(f, "reaction `{reaction}` has a Delay default that is not a closed Const expression")
            }
            Self::DanglingReference { reaction, detail } => {
                write!(f, "reaction `{reaction}` references {detail}, which does not exist in this graph")
            }
        }
    }
}
impl std::error::Error for GraphError {}

/// Checks reaction-level well-formedness: every `Delay` default must be a
/// closed `Const`, since `lower_delays` needs a concrete value to seed the
/// buffer it synthesizes and has no "previous tick" to fall back on.
pub fn lint_reaction(reaction: &Reaction) -> Result<(), GraphError> {
    for effect in &reaction.effects {
        let expr = match effect {
            Effect::Emit { value, .. } => value,
            Effect::Write { value, .. } => value,
        };
        let mut ok = true;
        expr.for_each_delay(&mut |default| {
            ok &= default.is_closed_const();
        });
        if !ok {
            return Err(GraphError::NonConstDelayDefault { reaction: reaction.name.clone() });
        }
    }
    Ok(())
}

/// Evaluates a closed-const expression (no `Ref`s, no nested `Delay`) down to
/// a concrete `Value`. Callable without an `interp::Env` since a closed
/// expression never performs a read.
fn eval_closed_const(expr: &Expr) -> Value {
    struct NoReads;
    impl crate::interp::Env for NoReads {
        fn read(&self, _: crate::expr::Ref) -> Value {
            unreachable!("closed-const expression performed a read")
        }
        fn read_prev(&self, _: crate::expr::Ref) -> Value {
            unreachable!("closed-const expression performed a read")
        }
    }
    crate::interp::eval(expr, &NoReads)
}

/// Rewrites `expr` in place, recursively lowering every `Delay(e, d)`
/// occurrence: allocates an anonymous delay-buffer state seeded with `d`,
/// appends a write of that state from the (recursively lowered) `e` to
/// `extra_writes`, and replaces the occurrence with a read of the buffer.
/// Lowering `e` before allocating the buffer means a nested `Delay` is
/// lowered innermost-first, so the outer buffer's write reads the inner
/// buffer rather than a surviving `Delay` node.
fn lower_expr(
    expr: Expr,
    node: NodeId,
    variables: &mut SlotMap<VarId, VariableDef>,
    extra_writes: &mut Vec<Effect>,
    counter: &mut usize,
) -> Expr {
    match expr {
        Expr::Const(_) | Expr::Var(_) => expr,
        Expr::Cmp(op, a, b) => Expr::Cmp(
            op,
            Box::new(lower_expr(*a, node, variables, extra_writes, counter)),
            Box::new(lower_expr(*b, node, variables, extra_writes, counter)),
        ),
        Expr::BinOp(op, a, b) => Expr::BinOp(
            op,
            Box::new(lower_expr(*a, node, variables, extra_writes, counter)),
            Box::new(lower_expr(*b, node, variables, extra_writes, counter)),
        ),
        Expr::Not(a) => Expr::Not(Box::new(lower_expr(*a, node, variables, extra_writes, counter))),
        Expr::If(c, t, e) => Expr::If(
            Box::new(lower_expr(*c, node, variables, extra_writes, counter)),
            Box::new(lower_expr(*t, node, variables, extra_writes, counter)),
            Box::new(lower_expr(*e, node, variables, extra_writes, counter)),
        ),
        Expr::Delay(inner, default) => {
            let lowered_inner = lower_expr(*inner, node, variables, extra_writes, counter);
            let init = eval_closed_const(&default);
            let name = format!("__delay{}", *counter);
            *counter += 1;
            let buffer = variables.insert(VariableDef {
                node,
                name,
                init,
                policy: Policy::Error,
                is_delay_buffer: true,
            });
            extra_writes.push(Effect::Write { var: buffer, value: lowered_inner, priority: 0 });
            Expr::Var(crate::expr::Ref::Var(buffer))
        }
    }
}

/// Lowers every `Delay` occurrence across every reaction in `builder`,
/// synthesizing the anonymous buffers and writes spec.md requires (see
/// `Expr::Delay`'s doc comment). Runs once, before `ir::build_ir` freezes the
/// builder into an `Ir`. A reaction whose rewritten `Emit` value is a direct
/// read of a buffer created during its own lowering has its output port
/// marked `is_delay_output`, so the scheduler flips edge polarity across it
/// exactly as it would for a hand-declared delay buffer.
pub fn lower_delays(builder: &mut GraphBuilder) {
    let mut counter = 0usize;
    let reaction_ids: Vec<ReactionId> = builder.reactions.keys().collect();
    for id in reaction_ids {
        let mut reaction = builder.reactions.remove(id).expect("reaction id from this builder");
        let mut extra_writes = Vec::new();
        let node = reaction.node;
        reaction.effects = reaction
            .effects
            .into_iter()
            .map(|effect| match effect {
                Effect::Emit { port, value } => {
                    let value = lower_expr(value, node, &mut builder.variables, &mut extra_writes, &mut counter);
                    if let Expr::Var(crate::expr::Ref::Var(v)) = &value {
                        if builder.variables[*v].is_delay_buffer {
                            builder.ports[port].is_delay_output = Some(*v);
                        }
                    }
                    Effect::Emit { port, value }
                }
                Effect::Write { var, value, priority } => Effect::Write {
                    var,
                    value: lower_expr(value, node, &mut builder.variables, &mut extra_writes, &mut counter),
                    priority,
                },
            })
            .collect();
        reaction.effects.extend(extra_writes);
        builder.reactions.insert(reaction);
    }
}

/// Mutable graph-under-construction. Owns every entity arena plus the
/// compile configuration that will travel with the frozen `Ir`.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    pub(crate) nodes: SlotMap<NodeId, NodeKind>,
    pub(crate) node_names: BTreeMap<NodeId, String>,
    pub(crate) ports: SlotMap<PortId, PortDef>,
    pub(crate) edges: SlotMap<EdgeId, EdgeDef>,
    pub(crate) variables: SlotMap<VarId, VariableDef>,
    pub(crate) reactions: SlotMap<ReactionId, Reaction>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            node_names: BTreeMap::new(),
            ports: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            variables: SlotMap::with_key(),
            reactions: SlotMap::with_key(),
        }
    }

    fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let name = name.into();
        let id = self.nodes.insert(kind);
        self.node_names.insert(id, name);
        id
    }

    pub fn add_core_node(&mut self, name: impl Into<String>) -> NodeId {
        self.add_node(name, NodeKind::Core)
    }

    pub fn add_external_node(&mut self, name: impl Into<String>, contract: Contract) -> NodeId {
        self.add_node(name, NodeKind::External(contract))
    }

    pub fn add_continuous_node(&mut self, name: impl Into<String>, spec: ContinuousSpec) -> NodeId {
        self.add_node(name, NodeKind::Continuous(spec))
    }

    pub fn add_input(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        default: Option<Value>,
    ) -> PortId {
        self.ports.insert(PortDef {
            node,
            name: name.into(),
            direction: Direction::Input,
            default,
            type_name: None,
            rate: None,
            is_delay_output: None,
        })
    }

    pub fn add_output(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        default: Option<Value>,
    ) -> PortId {
        self.ports.insert(PortDef {
            node,
            name: name.into(),
            direction: Direction::Output,
            default,
            type_name: None,
            rate: None,
            is_delay_output: None,
        })
    }

    /// Like `add_output`, but marks the port as fed exclusively by a `Delay`
    /// buffer — the scheduler uses this to flip edge polarity across it.
    pub fn add_delay_output(&mut self, node: NodeId, name: impl Into<String>, buffer: VarId) -> PortId {
        self.ports.insert(PortDef {
            node,
            name: name.into(),
            direction: Direction::Output,
            default: None,
            type_name: None,
            rate: None,
            is_delay_output: Some(buffer),
        })
    }

    pub fn add_state(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        init: Value,
        policy: Policy,
    ) -> VarId {
        self.variables.insert(VariableDef {
            node,
            name: name.into(),
            init,
            policy,
            is_delay_buffer: false,
        })
    }

    pub fn add_delay_buffer(&mut self, node: NodeId, name: impl Into<String>, init: Value) -> VarId {
        self.variables.insert(VariableDef {
            node,
            name: name.into(),
            init,
            policy: Policy::Error,
            is_delay_buffer: true,
        })
    }

    /// Declares an SDF static production/consumption rate for a port;
    /// consumed by `passes::sdf`.
    pub fn set_port_rate(&mut self, port: PortId, rate: i64) {
        self.ports[port].rate = Some(rate);
    }

    /// Declares a concrete type name for a port, consumed by `TypeCheckPass`.
    /// The literal name `"Any"` suppresses the check on any edge touching
    /// this port, same as leaving it undeclared.
    pub fn set_port_type(&mut self, port: PortId, type_name: impl Into<String>) {
        self.ports[port].type_name = Some(type_name.into());
    }

    pub fn add_edge(&mut self, from: PortId, to: PortId) -> EdgeId {
        self.edges.insert(EdgeDef { from, to })
    }

    /// Validates and admits a reaction, running `lint_reaction` first.
    pub fn add_reaction(&mut self, reaction: Reaction) -> Result<ReactionId, GraphError> {
        lint_reaction(&reaction)?;
        Ok(self.reactions.insert(reaction))
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        self.node_names.get(&id).map(String::as_str).unwrap_or("<unnamed>")
    }
}
