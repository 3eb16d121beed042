//! The live dependency graph.
//!
//! Cells, workers and structured-cell registrations are nodes; accessors
//! are the directed edges between them. Every accessor that currently
//! demands a value holds an [`Expression`]; expressions are deduplicated
//! structurally, so equal demands share one bookkeeping entry and one
//! evaluation.
//!
//! Mutation methods append [`GraphEffect`]s instead of reaching into the
//! cache or scheduler: the manager applies them afterwards. This keeps
//! teardown re-entrancy local to the graph (the `destroying` set) and the
//! graph itself testable in isolation.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};
use weft_common::{CellType, Checksum};

use crate::arena::SlotArena;
use crate::error::GraphError;
use crate::expression::Expression;
use crate::ids::{AccessorId, CellId, ScellId, WorkerId};
use crate::status::StatusReason;
use crate::worker::Worker;

/// Where an accessor reads from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ReadSide {
    /// A cell's value.
    Cell(CellId),
    /// A worker's output.
    WorkerOutput(WorkerId),
    /// A structured cell's outchannel at a path.
    Outchannel(ScellId, Vec<String>),
}

/// Where an accessor writes to.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WriteSide {
    /// A cell's value.
    Cell(CellId),
    /// A worker's named input pin.
    WorkerPin(WorkerId, String),
    /// A structured cell's inchannel at a path.
    Inchannel(ScellId, Vec<String>),
}

/// A live dependency edge.
#[derive(Debug)]
pub struct Accessor {
    /// The read side.
    pub read: ReadSide,
    /// The write side.
    pub write: WriteSide,
    /// Celltype the write side expects.
    pub target_celltype: CellType,
    /// The currently demanded expression, if the read side has a value.
    pub expression: Option<Expression>,
}

/// A cell node.
#[derive(Debug)]
pub struct Cell {
    /// Celltype of the held value.
    pub celltype: CellType,
    /// The held checksum, or `None` when void.
    pub checksum: Option<Checksum>,
    /// Why the cell is void.
    pub void_reason: Option<StatusReason>,
    upstream: Option<AccessorId>,
    downstream: Vec<AccessorId>,
}

impl Cell {
    /// The accessor currently writing this cell, if any.
    pub fn upstream(&self) -> Option<AccessorId> {
        self.upstream
    }

    /// Accessors reading this cell.
    pub fn downstream(&self) -> &[AccessorId] {
        &self.downstream
    }
}

/// State of one worker input pin.
#[derive(Debug)]
pub struct PinState {
    /// Celltype the pin expects.
    pub celltype: CellType,
    /// The accessor feeding the pin.
    pub upstream: Option<AccessorId>,
    /// The resolved input checksum.
    pub checksum: Option<Checksum>,
}

/// A worker node.
#[derive(Debug)]
pub struct WorkerNode {
    /// Static definition.
    pub def: Worker,
    /// Input pins by name.
    pub pins: BTreeMap<String, PinState>,
    /// The produced output checksum.
    pub output: Option<Checksum>,
    /// Why the output is void.
    pub void_reason: Option<StatusReason>,
    /// Captured diagnostics from a failed execution.
    pub diagnostics: Option<String>,
    downstream: Vec<AccessorId>,
}

impl WorkerNode {
    /// Accessors reading this worker's output.
    pub fn downstream(&self) -> &[AccessorId] {
        &self.downstream
    }

    /// `true` when every pin holds a resolved checksum.
    pub fn inputs_resolved(&self) -> bool {
        self.pins.values().all(|pin| pin.checksum.is_some())
    }
}

/// A structured cell's registration in the graph.
#[derive(Debug)]
pub struct ScellNode {
    /// The cell holding the joined value.
    pub data_cell: CellId,
    /// Authoritative write paths.
    pub inchannels: Vec<Vec<String>>,
    /// Read paths.
    pub outchannels: Vec<Vec<String>>,
}

/// Side effects of a graph mutation, applied by the manager.
#[derive(Debug)]
pub enum GraphEffect {
    /// A distinct expression gained its first holder.
    ExpressionCreated(Expression),
    /// A distinct expression lost its last holder.
    ExpressionDestroyed(Expression),
    /// A cell now holds a value.
    CellChanged(CellId),
    /// A cell is now void.
    CellVoided(CellId, StatusReason),
    /// All of a worker's inputs are resolved.
    WorkerReady(WorkerId),
    /// An inchannel delta for a structured cell.
    StructuredDelta {
        /// The structured cell.
        scell: ScellId,
        /// The inchannel path.
        path: Vec<String>,
        /// The new channel checksum, or `None` when retracted.
        checksum: Option<Checksum>,
    },
    /// A cell was torn down; provenance keyed on it must go.
    CellDestroyed(CellId),
    /// A worker was torn down; any in-flight job must be cancelled.
    WorkerDestroyed(WorkerId),
}

/// Observer callback invoked when a cell's value changes.
pub type Observer = Box<dyn FnMut(Option<Checksum>)>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum DestroyKey {
    Cell(CellId),
    Accessor(AccessorId),
    Worker(WorkerId),
    Scell(ScellId),
}

#[derive(Default, Debug)]
struct ExprEntry {
    holders: HashSet<AccessorId>,
    result: Option<Result<Checksum, StatusReason>>,
}

/// The live graph. See the module docs.
#[derive(Default)]
pub struct LiveGraph {
    cells: SlotArena<CellId, Cell>,
    accessors: SlotArena<AccessorId, Accessor>,
    workers: SlotArena<WorkerId, WorkerNode>,
    scells: SlotArena<ScellId, ScellNode>,
    expressions: HashMap<Expression, ExprEntry>,
    observers: HashMap<CellId, Vec<Observer>>,
    destroying: HashSet<DestroyKey>,
    deferred: Vec<(CellId, Option<Checksum>)>,
}

impl LiveGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // -- registration --------------------------------------------------

    /// Registers a new independent cell, initially void with reason
    /// `Undefined`.
    pub fn register_cell(&mut self, celltype: CellType) -> CellId {
        self.cells.insert(Cell {
            celltype,
            checksum: None,
            void_reason: Some(StatusReason::Undefined),
            upstream: None,
            downstream: Vec::new(),
        })
    }

    /// Registers a worker with its named input pins.
    pub fn register_worker(&mut self, def: Worker, pins: &[(String, CellType)]) -> WorkerId {
        let pins = pins
            .iter()
            .map(|(name, celltype)| {
                (
                    name.clone(),
                    PinState {
                        celltype: *celltype,
                        upstream: None,
                        checksum: None,
                    },
                )
            })
            .collect();
        self.workers.insert(WorkerNode {
            def,
            pins,
            output: None,
            void_reason: Some(StatusReason::Undefined),
            diagnostics: None,
            downstream: Vec::new(),
        })
    }

    /// Registers a structured cell's channel maps against its data cell.
    ///
    /// Path overlap among inchannels is validated by the structured-cell
    /// layer before registration.
    pub fn register_structured_cell(
        &mut self,
        data_cell: CellId,
        inchannels: Vec<Vec<String>>,
        outchannels: Vec<Vec<String>>,
    ) -> Result<ScellId, GraphError> {
        if !self.cells.contains(data_cell) {
            return Err(GraphError::Stale { kind: "cell" });
        }
        Ok(self.scells.insert(ScellNode {
            data_cell,
            inchannels,
            outchannels,
        }))
    }

    // -- lookups -------------------------------------------------------

    /// The cell node, if live.
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    /// The worker node, if live.
    pub fn worker(&self, id: WorkerId) -> Option<&WorkerNode> {
        self.workers.get(id)
    }

    /// The accessor, if live.
    pub fn accessor(&self, id: AccessorId) -> Option<&Accessor> {
        self.accessors.get(id)
    }

    /// The structured cell registration, if live.
    pub fn scell(&self, id: ScellId) -> Option<&ScellNode> {
        self.scells.get(id)
    }

    /// `true` if the cell has no upstream accessor.
    pub fn has_independence(&self, id: CellId) -> Result<bool, GraphError> {
        let cell = self.cells.get(id).ok_or(GraphError::Stale { kind: "cell" })?;
        Ok(cell.upstream.is_none())
    }

    /// Number of live accessors currently holding an equal expression.
    pub fn expression_refcount(&self, expr: &Expression) -> usize {
        self.expressions
            .get(expr)
            .map(|entry| entry.holders.len())
            .unwrap_or(0)
    }

    /// Number of distinct live expressions.
    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }

    /// Counts of live cells, accessors and workers.
    pub fn node_counts(&self) -> (usize, usize, usize) {
        (self.cells.len(), self.accessors.len(), self.workers.len())
    }

    // -- observers -----------------------------------------------------

    /// Registers an observer on a cell's value.
    pub fn add_observer(&mut self, cell: CellId, observer: Observer) -> Result<(), GraphError> {
        if !self.cells.contains(cell) {
            return Err(GraphError::Stale { kind: "cell" });
        }
        self.observers.entry(cell).or_default().push(observer);
        Ok(())
    }

    fn notify(&mut self, cell: CellId, value: Option<Checksum>) {
        if !self.destroying.is_empty() {
            // observation is deferred until the teardown batch empties
            self.deferred.push((cell, value));
            return;
        }
        self.run_observers(cell, value);
    }

    fn run_observers(&mut self, cell: CellId, value: Option<Checksum>) {
        if let Some(mut observers) = self.observers.remove(&cell) {
            for observer in observers.iter_mut() {
                observer(value);
            }
            if self.cells.contains(cell) {
                self.observers.entry(cell).or_default().extend(observers);
            }
        }
    }

    fn flush_deferred(&mut self) {
        while !self.deferred.is_empty() {
            let (cell, value) = self.deferred.remove(0);
            if self.cells.contains(cell) {
                self.run_observers(cell, value);
            }
        }
    }

    // -- value mutation ------------------------------------------------

    /// Writes a cell's value or voids it. Called by the manager; direct
    /// callers bypass cache refcounting.
    pub fn set_cell_state(
        &mut self,
        id: CellId,
        checksum: Option<Checksum>,
        reason: Option<StatusReason>,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<(), GraphError> {
        let cell = self.cells.get_mut(id).ok_or(GraphError::Stale { kind: "cell" })?;
        match checksum {
            Some(cs) => {
                if cell.checksum == Some(cs) {
                    return Ok(());
                }
                cell.checksum = Some(cs);
                cell.void_reason = None;
                effects.push(GraphEffect::CellChanged(id));
                self.notify(id, Some(cs));
            }
            None => {
                let reason = reason.unwrap_or(StatusReason::Undefined);
                if cell.checksum.is_none() && cell.void_reason == Some(reason) {
                    return Ok(());
                }
                cell.checksum = None;
                cell.void_reason = Some(reason);
                effects.push(GraphEffect::CellVoided(id, reason));
                self.notify(id, None);
            }
        }
        Ok(())
    }

    // -- connections ---------------------------------------------------

    /// Connects a cell to an independent target cell.
    pub fn connect_cell_cell(
        &mut self,
        source: CellId,
        target: CellId,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<AccessorId, GraphError> {
        let source_state = {
            let cell = self
                .cells
                .get(source)
                .ok_or(GraphError::Stale { kind: "cell" })?;
            (cell.checksum, cell.celltype)
        };
        let target_celltype = self.claim_target(target)?;
        let acc = self.accessors.insert(Accessor {
            read: ReadSide::Cell(source),
            write: WriteSide::Cell(target),
            target_celltype,
            expression: None,
        });
        self.attach(acc)?;
        let expr = source_state
            .0
            .map(|cs| Expression::conversion(cs, source_state.1, target_celltype));
        self.bind_expression(acc, expr, effects)?;
        Ok(acc)
    }

    /// Connects a cell to a worker's input pin.
    pub fn connect_cell_pin(
        &mut self,
        source: CellId,
        worker: WorkerId,
        pin: &str,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<AccessorId, GraphError> {
        let source_state = {
            let cell = self
                .cells
                .get(source)
                .ok_or(GraphError::Stale { kind: "cell" })?;
            (cell.checksum, cell.celltype)
        };
        let pin_celltype = {
            let node = self
                .workers
                .get(worker)
                .ok_or(GraphError::Stale { kind: "worker" })?;
            let state = node.pins.get(pin).ok_or_else(|| GraphError::UnknownPin {
                pin: pin.to_string(),
            })?;
            if state.upstream.is_some() {
                return Err(GraphError::PinBound {
                    pin: pin.to_string(),
                });
            }
            state.celltype
        };
        let acc = self.accessors.insert(Accessor {
            read: ReadSide::Cell(source),
            write: WriteSide::WorkerPin(worker, pin.to_string()),
            target_celltype: pin_celltype,
            expression: None,
        });
        self.attach(acc)?;
        let expr = source_state
            .0
            .map(|cs| Expression::conversion(cs, source_state.1, pin_celltype));
        self.bind_expression(acc, expr, effects)?;
        Ok(acc)
    }

    /// Connects a worker's output to an independent target cell.
    pub fn connect_pin_cell(
        &mut self,
        worker: WorkerId,
        target: CellId,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<AccessorId, GraphError> {
        let output_state = {
            let node = self
                .workers
                .get(worker)
                .ok_or(GraphError::Stale { kind: "worker" })?;
            (node.output, node.def.output_celltype)
        };
        let target_celltype = self.claim_target(target)?;
        let acc = self.accessors.insert(Accessor {
            read: ReadSide::WorkerOutput(worker),
            write: WriteSide::Cell(target),
            target_celltype,
            expression: None,
        });
        self.attach(acc)?;
        let expr = output_state
            .0
            .map(|cs| Expression::conversion(cs, output_state.1, target_celltype));
        self.bind_expression(acc, expr, effects)?;
        Ok(acc)
    }

    /// Connects a structured cell's outchannel to an independent target
    /// cell.
    pub fn connect_scell_cell(
        &mut self,
        scell: ScellId,
        path: Vec<String>,
        target: CellId,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<AccessorId, GraphError> {
        let (data_cell, data_state) = {
            let node = self
                .scells
                .get(scell)
                .ok_or(GraphError::Stale { kind: "scell" })?;
            if !node.outchannels.contains(&path) {
                return Err(GraphError::InvalidExpression(format!(
                    "no outchannel at path {path:?}"
                )));
            }
            let cell = self
                .cells
                .get(node.data_cell)
                .ok_or(GraphError::Stale { kind: "cell" })?;
            (node.data_cell, (cell.checksum, cell.celltype))
        };
        let target_celltype = self.claim_target(target)?;
        let acc = self.accessors.insert(Accessor {
            read: ReadSide::Outchannel(scell, path.clone()),
            write: WriteSide::Cell(target),
            target_celltype,
            expression: None,
        });
        // outchannel reads hang off the data cell's fanout
        self.cells
            .get_mut(data_cell)
            .ok_or(GraphError::Stale { kind: "cell" })?
            .downstream
            .push(acc);
        let expr = match data_state.0 {
            Some(cs) => Some(Expression::new(
                cs,
                path,
                data_state.1,
                None,
                target_celltype,
                None,
            )?),
            None => None,
        };
        self.bind_expression(acc, expr, effects)?;
        Ok(acc)
    }

    /// Connects a cell to a structured cell's inchannel.
    pub fn connect_cell_scell(
        &mut self,
        source: CellId,
        scell: ScellId,
        path: Vec<String>,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<AccessorId, GraphError> {
        let source_state = {
            let cell = self
                .cells
                .get(source)
                .ok_or(GraphError::Stale { kind: "cell" })?;
            (cell.checksum, cell.celltype)
        };
        {
            let node = self
                .scells
                .get(scell)
                .ok_or(GraphError::Stale { kind: "scell" })?;
            if !node.inchannels.contains(&path) {
                return Err(GraphError::InvalidExpression(format!(
                    "no inchannel at path {path:?}"
                )));
            }
        }
        let taken = self.accessors.iter().any(|(_, acc)| {
            matches!(&acc.write, WriteSide::Inchannel(s, p) if *s == scell && *p == path)
        });
        if taken {
            return Err(GraphError::NotIndependent);
        }
        let acc = self.accessors.insert(Accessor {
            read: ReadSide::Cell(source),
            write: WriteSide::Inchannel(scell, path),
            target_celltype: CellType::Mixed,
            expression: None,
        });
        self.attach(acc)?;
        let expr = source_state
            .0
            .map(|cs| Expression::conversion(cs, source_state.1, CellType::Mixed));
        self.bind_expression(acc, expr, effects)?;
        Ok(acc)
    }

    /// Claims an independent cell as a write target, void-cancelling it
    /// without propagation.
    fn claim_target(&mut self, target: CellId) -> Result<CellType, GraphError> {
        let cell = self
            .cells
            .get_mut(target)
            .ok_or(GraphError::Stale { kind: "cell" })?;
        if cell.upstream.is_some() {
            return Err(GraphError::NotIndependent);
        }
        // cancel any held value silently; the new upstream will supply one
        cell.checksum = None;
        cell.void_reason = Some(StatusReason::Undefined);
        Ok(cell.celltype)
    }

    /// Records the new accessor in the adjacency of both endpoints.
    fn attach(&mut self, acc: AccessorId) -> Result<(), GraphError> {
        let (read, write) = {
            let accessor = self
                .accessors
                .get(acc)
                .ok_or(GraphError::Stale { kind: "accessor" })?;
            (accessor.read.clone(), accessor.write.clone())
        };
        match read {
            ReadSide::Cell(cell) => {
                self.cells
                    .get_mut(cell)
                    .ok_or(GraphError::Stale { kind: "cell" })?
                    .downstream
                    .push(acc);
            }
            ReadSide::WorkerOutput(worker) => {
                self.workers
                    .get_mut(worker)
                    .ok_or(GraphError::Stale { kind: "worker" })?
                    .downstream
                    .push(acc);
            }
            ReadSide::Outchannel(..) => {}
        }
        match write {
            WriteSide::Cell(cell) => {
                self.cells
                    .get_mut(cell)
                    .ok_or(GraphError::Stale { kind: "cell" })?
                    .upstream = Some(acc);
            }
            WriteSide::WorkerPin(worker, pin) => {
                let node = self
                    .workers
                    .get_mut(worker)
                    .ok_or(GraphError::Stale { kind: "worker" })?;
                if let Some(state) = node.pins.get_mut(&pin) {
                    state.upstream = Some(acc);
                }
            }
            WriteSide::Inchannel(..) => {}
        }
        Ok(())
    }

    // -- expressions ---------------------------------------------------

    /// Makes an accessor hold an expression (or none), releasing any
    /// previously held one.
    pub fn bind_expression(
        &mut self,
        acc: AccessorId,
        expr: Option<Expression>,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<(), GraphError> {
        let old = {
            let accessor = self
                .accessors
                .get_mut(acc)
                .ok_or(GraphError::Stale { kind: "accessor" })?;
            let old = accessor.expression.take();
            accessor.expression = expr.clone();
            old
        };
        if let Some(old_expr) = old {
            if Some(&old_expr) != expr.as_ref() {
                self.decref_expression(&old_expr, acc, effects);
            }
        }
        match expr {
            Some(new_expr) => {
                self.incref_expression(new_expr.clone(), acc, effects);
                // a memoized result is delivered immediately
                if let Some(result) = self.expressions.get(&new_expr).and_then(|e| e.result) {
                    self.deliver(acc, result, effects)?;
                }
            }
            None => {
                self.deliver(acc, Err(StatusReason::Upstream), effects)?;
            }
        }
        Ok(())
    }

    /// Adds an accessor as a holder of an expression; the first holder
    /// creates the bookkeeping entry.
    pub fn incref_expression(
        &mut self,
        expr: Expression,
        acc: AccessorId,
        effects: &mut Vec<GraphEffect>,
    ) {
        let entry = self.expressions.entry(expr.clone()).or_default();
        let first = entry.holders.is_empty() && entry.result.is_none();
        entry.holders.insert(acc);
        if first {
            debug!(?expr, "expression created");
            effects.push(GraphEffect::ExpressionCreated(expr));
        }
    }

    /// Removes an accessor as a holder; the last holder destroys the
    /// entry.
    pub fn decref_expression(
        &mut self,
        expr: &Expression,
        acc: AccessorId,
        effects: &mut Vec<GraphEffect>,
    ) {
        let destroyed = match self.expressions.get_mut(expr) {
            Some(entry) => {
                entry.holders.remove(&acc);
                entry.holders.is_empty()
            }
            None => {
                warn!(?expr, "decref of an unknown expression");
                false
            }
        };
        if destroyed {
            self.expressions.remove(expr);
            debug!(?expr, "expression destroyed");
            effects.push(GraphEffect::ExpressionDestroyed(expr.clone()));
        }
    }

    /// Stores an evaluation result and delivers it to every holder.
    pub fn expression_resolved(
        &mut self,
        expr: &Expression,
        result: Result<Checksum, StatusReason>,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<(), GraphError> {
        let holders: Vec<AccessorId> = match self.expressions.get_mut(expr) {
            Some(entry) => {
                entry.result = Some(result);
                entry.holders.iter().copied().collect()
            }
            // all holders were destroyed while the evaluation ran
            None => return Ok(()),
        };
        for acc in holders {
            self.deliver(acc, result, effects)?;
        }
        Ok(())
    }

    /// Writes a resolved (or failed) value through an accessor's write
    /// side.
    fn deliver(
        &mut self,
        acc: AccessorId,
        result: Result<Checksum, StatusReason>,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<(), GraphError> {
        let write = {
            let accessor = self
                .accessors
                .get(acc)
                .ok_or(GraphError::Stale { kind: "accessor" })?;
            accessor.write.clone()
        };
        match write {
            WriteSide::Cell(cell) => {
                if self.destroying.contains(&DestroyKey::Cell(cell)) {
                    return Ok(());
                }
                match result {
                    Ok(cs) => self.set_cell_state(cell, Some(cs), None, effects)?,
                    Err(reason) => self.set_cell_state(cell, None, Some(reason), effects)?,
                }
            }
            WriteSide::WorkerPin(worker, pin) => {
                let ready = {
                    let node = self
                        .workers
                        .get_mut(worker)
                        .ok_or(GraphError::Stale { kind: "worker" })?;
                    if let Some(state) = node.pins.get_mut(&pin) {
                        state.checksum = result.ok();
                    }
                    if result.is_err() {
                        node.void_reason = Some(StatusReason::Upstream);
                    }
                    result.is_ok() && node.inputs_resolved()
                };
                if ready {
                    effects.push(GraphEffect::WorkerReady(worker));
                } else if result.is_err() {
                    self.worker_output_resolved(
                        worker,
                        Err((StatusReason::Upstream, None)),
                        effects,
                    )?;
                }
            }
            WriteSide::Inchannel(scell, path) => {
                effects.push(GraphEffect::StructuredDelta {
                    scell,
                    path,
                    checksum: result.ok(),
                });
            }
        }
        Ok(())
    }

    /// Records a worker's output (or its failure) and re-binds the
    /// downstream accessors.
    pub fn worker_output_resolved(
        &mut self,
        worker: WorkerId,
        result: Result<Checksum, (StatusReason, Option<String>)>,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<(), GraphError> {
        let (downstream, output_celltype) = {
            let node = self
                .workers
                .get_mut(worker)
                .ok_or(GraphError::Stale { kind: "worker" })?;
            match &result {
                Ok(cs) => {
                    node.output = Some(*cs);
                    node.void_reason = None;
                    node.diagnostics = None;
                }
                Err((reason, diagnostics)) => {
                    node.output = None;
                    node.void_reason = Some(*reason);
                    node.diagnostics = diagnostics.clone();
                }
            }
            (node.downstream.clone(), node.def.output_celltype)
        };
        for acc in downstream {
            let expr = match (&result, self.accessors.get(acc)) {
                (Ok(cs), Some(accessor)) => Some(Expression::conversion(
                    *cs,
                    output_celltype,
                    accessor.target_celltype,
                )),
                _ => None,
            };
            self.bind_expression(acc, expr, effects)?;
        }
        Ok(())
    }

    /// Re-binds a cell's downstream accessors after its value changed.
    pub fn fanout_cell(
        &mut self,
        cell: CellId,
        effects: &mut Vec<GraphEffect>,
    ) -> Result<(), GraphError> {
        let (state, downstream) = {
            let node = self.cells.get(cell).ok_or(GraphError::Stale { kind: "cell" })?;
            ((node.checksum, node.celltype), node.downstream.clone())
        };
        for acc in downstream {
            let expr = match (state.0, self.accessors.get(acc)) {
                (Some(cs), Some(accessor)) => match &accessor.read {
                    ReadSide::Outchannel(_, path) => Some(Expression::new(
                        cs,
                        path.clone(),
                        state.1,
                        None,
                        accessor.target_celltype,
                        None,
                    )?),
                    _ => Some(Expression::conversion(cs, state.1, accessor.target_celltype)),
                },
                _ => None,
            };
            self.bind_expression(acc, expr, effects)?;
        }
        Ok(())
    }

    // -- teardown ------------------------------------------------------

    /// Destroys an accessor. Idempotent; re-entrant calls during a
    /// teardown batch are no-ops.
    pub fn destroy_accessor(&mut self, acc: AccessorId, effects: &mut Vec<GraphEffect>) {
        if !self.accessors.contains(acc) || !self.destroying.insert(DestroyKey::Accessor(acc)) {
            return;
        }
        if let Some(accessor) = self.accessors.remove(acc) {
            debug!(?acc, "accessor destroyed");
            if let Some(expr) = accessor.expression {
                self.decref_expression(&expr, acc, effects);
            }
            match accessor.read {
                ReadSide::Cell(cell) => self.detach_downstream_cell(cell, acc),
                ReadSide::WorkerOutput(worker) => {
                    if let Some(node) = self.workers.get_mut(worker) {
                        node.downstream.retain(|a| *a != acc);
                    }
                }
                ReadSide::Outchannel(scell, _) => {
                    let data_cell = self.scells.get(scell).map(|node| node.data_cell);
                    if let Some(cell) = data_cell {
                        self.detach_downstream_cell(cell, acc);
                    }
                }
            }
            match accessor.write {
                WriteSide::Cell(cell) => {
                    let live = match self.cells.get_mut(cell) {
                        Some(node) => {
                            node.upstream = None;
                            true
                        }
                        None => false,
                    };
                    // the newly independent target is voided, observably
                    if live && !self.destroying.contains(&DestroyKey::Cell(cell)) {
                        let _ = self.set_cell_state(
                            cell,
                            None,
                            Some(StatusReason::Unconnected),
                            effects,
                        );
                    }
                }
                WriteSide::WorkerPin(worker, pin) => {
                    let live = match self.workers.get_mut(worker) {
                        Some(node) => {
                            if let Some(state) = node.pins.get_mut(&pin) {
                                state.upstream = None;
                                state.checksum = None;
                            }
                            true
                        }
                        None => false,
                    };
                    if live && !self.destroying.contains(&DestroyKey::Worker(worker)) {
                        let _ = self.worker_output_resolved(
                            worker,
                            Err((StatusReason::Unconnected, None)),
                            effects,
                        );
                    }
                }
                WriteSide::Inchannel(scell, path) => {
                    if self.scells.contains(scell)
                        && !self.destroying.contains(&DestroyKey::Scell(scell))
                    {
                        effects.push(GraphEffect::StructuredDelta {
                            scell,
                            path,
                            checksum: None,
                        });
                    }
                }
            }
        }
        self.destroying.remove(&DestroyKey::Accessor(acc));
        if self.destroying.is_empty() {
            self.flush_deferred();
        }
    }

    /// Destroys a cell and every accessor touching it.
    pub fn destroy_cell(&mut self, cell: CellId, effects: &mut Vec<GraphEffect>) {
        if !self.cells.contains(cell) || !self.destroying.insert(DestroyKey::Cell(cell)) {
            return;
        }
        let touching: Vec<AccessorId> = {
            let node = match self.cells.get(cell) {
                Some(node) => node,
                None => return,
            };
            node.upstream
                .into_iter()
                .chain(node.downstream.iter().copied())
                .collect()
        };
        for acc in touching {
            self.destroy_accessor(acc, effects);
        }
        self.cells.remove(cell);
        self.observers.remove(&cell);
        effects.push(GraphEffect::CellDestroyed(cell));
        self.destroying.remove(&DestroyKey::Cell(cell));
        if self.destroying.is_empty() {
            self.flush_deferred();
        }
    }

    /// Destroys a worker and every accessor touching it.
    pub fn destroy_worker(&mut self, worker: WorkerId, effects: &mut Vec<GraphEffect>) {
        if !self.workers.contains(worker) || !self.destroying.insert(DestroyKey::Worker(worker))
        {
            return;
        }
        let touching: Vec<AccessorId> = {
            let node = match self.workers.get(worker) {
                Some(node) => node,
                None => return,
            };
            node.pins
                .values()
                .filter_map(|pin| pin.upstream)
                .chain(node.downstream.iter().copied())
                .collect()
        };
        for acc in touching {
            self.destroy_accessor(acc, effects);
        }
        self.workers.remove(worker);
        effects.push(GraphEffect::WorkerDestroyed(worker));
        self.destroying.remove(&DestroyKey::Worker(worker));
        if self.destroying.is_empty() {
            self.flush_deferred();
        }
    }

    /// Destroys a structured cell registration and every accessor
    /// touching its channels. The data cell itself stays.
    pub fn destroy_structured_cell(&mut self, scell: ScellId, effects: &mut Vec<GraphEffect>) {
        if !self.scells.contains(scell) || !self.destroying.insert(DestroyKey::Scell(scell)) {
            return;
        }
        let touching: Vec<AccessorId> = self
            .accessors
            .iter()
            .filter(|(_, acc)| {
                matches!(&acc.read, ReadSide::Outchannel(s, _) if *s == scell)
                    || matches!(&acc.write, WriteSide::Inchannel(s, _) if *s == scell)
            })
            .map(|(id, _)| id)
            .collect();
        for acc in touching {
            self.destroy_accessor(acc, effects);
        }
        self.scells.remove(scell);
        self.destroying.remove(&DestroyKey::Scell(scell));
        if self.destroying.is_empty() {
            self.flush_deferred();
        }
    }

    fn detach_downstream_cell(&mut self, cell: CellId, acc: AccessorId) {
        if let Some(node) = self.cells.get_mut(cell) {
            node.downstream.retain(|a| *a != acc);
        }
    }
}
