//! The tick-execution engine: per-tick phases (prepare, apply externals,
//! propose, resolve, commit) and the per-SCC microstep fixed-point loop
//! (spec.md §4.6).
//!
//! Grounded on `original_source/src/rg_compiler/core/runtime.py`'s
//! `GraphRuntime.run_tick`, restructured around Rust ownership: rather than
//! the original's single mutable node-state dict threaded through every
//! call, each tick computes into a throwaway working copy and only commits
//! to `Runtime::vars` on success, so a failed tick leaves the persistent
//! store untouched (spec.md §8 property 5) without needing an explicit
//! rollback path.

use std::collections::{HashMap, HashSet};

use tickflow_ir::expr::Ref;
use tickflow_ir::graph::{Direction, NodeId, NodeKind, PortId, VarId};
use tickflow_ir::interp::{self, Env};
use tickflow_ir::ir::Ir;
use tickflow_ir::policy::Intent;
use tickflow_ir::value::Value;

use crate::context::{Context, ContinuousDynamics, ExternalStep};
use crate::continuous::{self, ContinuousRuntime};
use crate::errors::{RuntimeError, ZenoRuntimeError};
use crate::scheduler::{self, Schedule, ScheduleBlock};

/// Owns the compiled graph, its schedule, and every piece of state that
/// persists across ticks: the committed variable store and each continuous
/// node's zero-order-hold memory and trace.
pub struct Runtime {
    ir: Ir,
    schedule: Schedule,
    vars: HashMap<VarId, Value>,
    producer_of: HashMap<PortId, PortId>,
    continuous: ContinuousRuntime,
    externals: HashMap<NodeId, Box<dyn ExternalStep>>,
    dynamics: HashMap<NodeId, Box<dyn ContinuousDynamics>>,
    time: f64,
    /// The previous tick's final port values, consulted only under
    /// `tickwise_mode` (SPEC_FULL.md §6): every edge behaves like a delay
    /// output, so a consumer reads the producer's last commit rather than
    /// anything written this tick. Empty before the first tick.
    prev_port_values: HashMap<PortId, Value>,
}

impl Runtime {
    /// Builds the execution schedule and seeds every variable at its
    /// declared initial value (spec.md §4.4: "before tick 0, every variable
    /// holds its declared init").
    pub fn new(ir: Ir) -> Self {
        let schedule = scheduler::build_schedule(&ir);
        let vars = ir.variables.iter().map(|(id, v)| (id, v.init.clone())).collect();
        let mut producer_of = HashMap::new();
        for edge in ir.edges.values() {
            producer_of.insert(edge.to, edge.from);
        }
        Self {
            ir,
            schedule,
            vars,
            producer_of,
            continuous: ContinuousRuntime::new(256),
            externals: HashMap::new(),
            dynamics: HashMap::new(),
            time: 0.0,
            prev_port_values: HashMap::new(),
        }
    }

    /// Registers the step routine driving an `External` node. Every
    /// `External` node in the compiled graph must have one registered
    /// before the first tick that reaches it.
    pub fn register_external(&mut self, node: NodeId, step: Box<dyn ExternalStep>) {
        self.externals.insert(node, step);
    }

    /// Registers the differential system driving a `Continuous` node.
    pub fn register_continuous(&mut self, node: NodeId, dynamics: Box<dyn ContinuousDynamics>) {
        self.dynamics.insert(node, dynamics);
    }

    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn variable(&self, var: VarId) -> Value {
        self.vars.get(&var).cloned().unwrap_or(Value::Absent)
    }

    /// The value `port` held at the end of the most recently committed
    /// tick. Only populated under `tickwise_mode` (§6); elsewhere port
    /// values are tick-scoped and not retained (spec.md §3).
    pub fn port_value(&self, port: PortId) -> Value {
        self.prev_port_values.get(&port).cloned().unwrap_or(Value::Absent)
    }

    pub fn continuous_trace(&self, node: NodeId) -> impl Iterator<Item = &continuous::TraceEntry> {
        self.continuous.trace(node)
    }

    /// Runs one tick: prepares port state, applies caller overrides and the
    /// global `dt`, drives every schedule block to a fixed point, and
    /// commits the result. On any error the persistent variable store is
    /// byte-for-byte unchanged from before the call.
    pub fn run_tick(
        &mut self,
        overrides: Option<HashMap<PortId, Value>>,
        dt: Option<f64>,
    ) -> Result<(), RuntimeError> {
        tracing::debug!(time = self.time, dt, "tick start");

        let mut port_values: HashMap<PortId, Value> = HashMap::new();
        for (port_id, port) in self.ir.ports.iter() {
            if let Some(buffer) = port.is_delay_output {
                let v = self.vars.get(&buffer).cloned().unwrap_or_else(|| self.ir.variables[buffer].init.clone());
                port_values.insert(port_id, v);
            }
        }
        if self.ir.config.tickwise_mode {
            for edge in self.ir.edges.values() {
                if let Some(v) = self.prev_port_values.get(&edge.from) {
                    port_values.entry(edge.from).or_insert_with(|| v.clone());
                }
            }
        }

        if let Some(overrides) = overrides {
            port_values.extend(overrides);
        }
        if let Some(dt) = dt {
            for (node_id, kind) in self.ir.nodes.iter() {
                if matches!(kind, NodeKind::Continuous(_)) {
                    if let Some(dt_port) = find_port(&self.ir, node_id, Direction::Input, "dt") {
                        port_values.insert(dt_port, Value::num(dt));
                    }
                }
            }
        }

        let prev_vars = self.vars.clone();
        let mut working_vars = self.vars.clone();
        let mut tick_intents: Vec<(VarId, Intent)> = Vec::new();

        for block in self.schedule.blocks.clone() {
            self.run_block(&block, &mut port_values, &mut working_vars, &prev_vars, &mut tick_intents)?;
        }

        self.vars = working_vars;
        if self.ir.config.tickwise_mode {
            self.prev_port_values = port_values.clone();
        }
        if let Some(dt) = dt {
            self.time += dt;
        }
        tracing::debug!(time = self.time, "tick committed");
        Ok(())
    }

    fn run_block(
        &mut self,
        block: &ScheduleBlock,
        port_values: &mut HashMap<PortId, Value>,
        working_vars: &mut HashMap<VarId, Value>,
        prev_vars: &HashMap<VarId, Value>,
        tick_intents: &mut Vec<(VarId, Intent)>,
    ) -> Result<(), RuntimeError> {
        if !block.needs_microstep_loop() {
            let Some(&node) = block.members.first() else {
                return Ok(());
            };
            let mut intents = Vec::new();
            self.execute_node(node, port_values, working_vars, prev_vars, &mut intents)?;
            commit_intents(&self.ir, tick_intents, intents, working_vars)?;
            return Ok(());
        }

        let limit = self.microstep_limit_for(block);
        let mut prev_ports = port_values.clone();
        let mut prev_working = working_vars.clone();
        for _ in 0..limit {
            let mut round_intents = Vec::new();
            for &node in &block.members {
                self.execute_node(node, port_values, working_vars, prev_vars, &mut round_intents)?;
            }
            // Per-round resolve is local to this SCC's fixed-point search:
            // each round's intents are merged on their own (never accumulated
            // with earlier rounds of the same SCC), matching spec.md §4.6's
            // "the last round's intents" — intermediate rounds exist only to
            // find the fixed point, not to contribute partial writes.
            let updates = resolve_intents(&round_intents, &self.ir)?;
            working_vars.extend(updates);

            let converged = *port_values == prev_ports && *working_vars == prev_working;
            if converged {
                commit_intents(&self.ir, tick_intents, round_intents, working_vars)?;
                return Ok(());
            }
            prev_ports = port_values.clone();
            prev_working = working_vars.clone();
        }
        Err(ZenoRuntimeError { scc_members: block.members.iter().copied().collect(), limit }.into())
    }

    fn microstep_limit_for(&self, block: &ScheduleBlock) -> usize {
        let mut limit = self.ir.config.max_microsteps;
        for &node in &block.members {
            for reaction_id in self.ir.reactions_of(node) {
                if let Some(l) = self.ir.reactions[reaction_id].nonzeno_limit {
                    limit = limit.min(l);
                }
            }
        }
        limit
    }

    fn execute_node(
        &mut self,
        node: NodeId,
        port_values: &mut HashMap<PortId, Value>,
        working_vars: &HashMap<VarId, Value>,
        prev_vars: &HashMap<VarId, Value>,
        intents: &mut Vec<(VarId, Intent)>,
    ) -> Result<(), RuntimeError> {
        let kind = self.ir.nodes[node].clone();
        match kind {
            NodeKind::Core => {
                let reaction_ids = self.ir.reactions_of(node);
                for reaction_id in reaction_ids {
                    let effects = self.ir.reactions[reaction_id].effects.clone();
                    let mut ctx =
                        RunContext { ir: &self.ir, producer_of: &self.producer_of, port_values: &mut *port_values, working_vars, prev_vars, intents: &mut *intents };
                    for effect in &effects {
                        run_effect(&mut ctx, effect);
                    }
                }
                Ok(())
            }
            NodeKind::External(_) => {
                let step = self.externals.get_mut(&node).unwrap_or_else(|| {
                    panic!(
                        "external node `{}` has no registered step; call Runtime::register_external before run_tick",
                        self.ir.node_names.get(&node).map(String::as_str).unwrap_or("<unnamed>")
                    )
                });
                let mut ctx =
                    RunContext { ir: &self.ir, producer_of: &self.producer_of, port_values: &mut *port_values, working_vars, prev_vars, intents: &mut *intents };
                step.step(&mut ctx);
                Ok(())
            }
            NodeKind::Continuous(spec) => {
                let dynamics = self.dynamics.get(&node).unwrap_or_else(|| {
                    panic!(
                        "continuous node `{}` has no registered dynamics; call Runtime::register_continuous before run_tick",
                        self.ir.node_names.get(&node).map(String::as_str).unwrap_or("<unnamed>")
                    )
                });

                let dt = {
                    let ctx = RunContext {
                        ir: &self.ir,
                        producer_of: &self.producer_of,
                        port_values: &mut *port_values,
                        working_vars,
                        prev_vars,
                        intents: &mut *intents,
                    };
                    find_port(&self.ir, node, Direction::Input, "dt")
                        .map(|p| ctx.read(p))
                        .and_then(|v| v.as_number())
                        .unwrap_or(0.0)
                };

                let fresh_u = {
                    let ctx = RunContext {
                        ir: &self.ir,
                        producer_of: &self.producer_of,
                        port_values: &mut *port_values,
                        working_vars,
                        prev_vars,
                        intents: &mut *intents,
                    };
                    find_port(&self.ir, node, Direction::Input, "u").map(|p| ctx.read(p))
                };
                let fresh_u = fresh_u.and_then(|v| continuous::value_to_record(&v));
                let u = self.continuous.resolve_u(node, fresh_u, &spec.hybrid_held_u);

                let state_vars = self.ir.variables_of(node);
                let mut x = std::collections::BTreeMap::new();
                for &var in &state_vars {
                    let name = self.ir.variables[var].name.clone();
                    let value = working_vars.get(&var).cloned().unwrap_or_else(|| self.ir.variables[var].init.clone());
                    x.insert(name, value.as_number().unwrap_or(0.0));
                }

                let (new_x, y) = self.continuous.step(node, &spec, dynamics.as_ref(), self.time, &x, &u, dt)?;

                let name_to_var: HashMap<&str, VarId> =
                    state_vars.iter().map(|&v| (self.ir.variables[v].name.as_str(), v)).collect();
                for (name, value) in &new_x {
                    if let Some(&var) = name_to_var.get(name.as_str()) {
                        intents.push((var, Intent::new(Value::num(*value))));
                    }
                }

                let mut ctx = RunContext { ir: &self.ir, producer_of: &self.producer_of, port_values: &mut *port_values, working_vars, prev_vars, intents: &mut *intents };
                if let Some(state_port) = find_port(&self.ir, node, Direction::Output, "state") {
                    ctx.write(state_port, continuous::record_to_value(&new_x));
                }
                if let Some(y_port) = find_port(&self.ir, node, Direction::Output, "y") {
                    ctx.write(y_port, continuous::record_to_value(&y));
                }
                Ok(())
            }
        }
    }
}

fn find_port(ir: &Ir, node: NodeId, direction: Direction, name: &str) -> Option<PortId> {
    ir.ports_of(node, direction).into_iter().find(|&p| ir.ports[p].name == name)
}

fn run_effect(ctx: &mut RunContext<'_>, effect: &tickflow_ir::graph::Effect) {
    use tickflow_ir::graph::Effect;
    match effect {
        Effect::Emit { port, value } => {
            let v = interp::eval(value, &EvalEnv { ctx });
            ctx.write(*port, v);
        }
        Effect::Write { var, value, priority } => {
            let v = interp::eval(value, &EvalEnv { ctx });
            ctx.write_var_with_priority(*var, v, *priority);
        }
    }
}

/// Groups `intents` by variable and invokes each variable's declared policy.
/// A variable untouched this round keeps its working-copy value (callers
/// only insert entries for variables actually present in `intents`).
fn resolve_intents(intents: &[(VarId, Intent)], ir: &Ir) -> Result<HashMap<VarId, Value>, RuntimeError> {
    let mut by_var: HashMap<VarId, Vec<Intent>> = HashMap::new();
    for (var, intent) in intents {
        by_var.entry(*var).or_default().push(intent.clone());
    }
    let mut updates = HashMap::new();
    for (var, group) in by_var {
        let policy = ir.variables[var].policy;
        let value = policy.merge(&group)?;
        updates.insert(var, value);
    }
    Ok(updates)
}

/// Appends `new_intents` to the tick-wide pool and recomputes every variable
/// they touch from its *entire* pool so far this tick — not just
/// `new_intents` in isolation. Two different schedule blocks writing the
/// same variable (e.g. two unrelated nodes both summing into one `Sum`
/// variable, or two both writing one `Error` variable) must be seen
/// together, or a later block's resolve would silently clobber an earlier
/// block's committed value instead of joining or conflicting with it.
fn commit_intents(
    ir: &Ir,
    tick_intents: &mut Vec<(VarId, Intent)>,
    new_intents: Vec<(VarId, Intent)>,
    working_vars: &mut HashMap<VarId, Value>,
) -> Result<(), RuntimeError> {
    let touched: HashSet<VarId> = new_intents.iter().map(|(var, _)| *var).collect();
    tick_intents.extend(new_intents);
    for var in touched {
        let group: Vec<Intent> =
            tick_intents.iter().filter(|(v, _)| *v == var).map(|(_, intent)| intent.clone()).collect();
        let value = ir.variables[var].policy.merge(&group)?;
        working_vars.insert(var, value);
    }
    Ok(())
}

/// Live view into the tick's in-flight state a node's step sees: port
/// writes so far this round, the working variable copy as of round start,
/// and an append-only sink for this node's write-variable intents.
struct RunContext<'a> {
    ir: &'a Ir,
    producer_of: &'a HashMap<PortId, PortId>,
    port_values: &'a mut HashMap<PortId, Value>,
    working_vars: &'a HashMap<VarId, Value>,
    prev_vars: &'a HashMap<VarId, Value>,
    intents: &'a mut Vec<(VarId, Intent)>,
}

impl<'a> Context for RunContext<'a> {
    fn read(&self, input_port: PortId) -> Value {
        if let Some(&producer) = self.producer_of.get(&input_port) {
            if let Some(v) = self.port_values.get(&producer) {
                return v.clone();
            }
        }
        self.ir.port_default(input_port)
    }

    fn write(&mut self, output_port: PortId, v: Value) {
        self.port_values.insert(output_port, v);
    }

    fn read_var(&self, state: VarId) -> Value {
        self.working_vars.get(&state).cloned().unwrap_or_else(|| self.ir.variables[state].init.clone())
    }

    fn write_var(&mut self, state: VarId, v: Value) {
        self.intents.push((state, Intent::new(v)));
    }

    fn write_var_with_priority(&mut self, state: VarId, v: Value, priority: i64) {
        self.intents.push((state, Intent::with_priority(v, priority)));
    }
}

/// Bridges `RunContext`'s `Context` trait to `interp::Env`, kept as a
/// separate type so the two traits' same-named `read` methods never need
/// disambiguating at a call site.
struct EvalEnv<'a, 'b> {
    ctx: &'b RunContext<'a>,
}
impl<'a, 'b> Env for EvalEnv<'a, 'b> {
    fn read(&self, r: Ref) -> Value {
        match r {
            Ref::Port(p) => Context::read(self.ctx, p),
            Ref::Var(v) => Context::read_var(self.ctx, v),
        }
    }

    fn read_prev(&self, r: Ref) -> Value {
        match r {
            Ref::Var(v) => self.ctx.prev_vars.get(&v).cloned().unwrap_or_else(|| self.ctx.ir.variables[v].init.clone()),
            Ref::Port(_) => unreachable!("a Delay operand is always a Var reference"),
        }
    }
}
