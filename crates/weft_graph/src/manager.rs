//! The engine manager.
//!
//! Owns the live graph, the buffer cache, the converter, the elision
//! table and the scheduler, and drives them together: graph mutations
//! return effects, the manager turns effects into tasks, and `compute`
//! drains tasks and job outcomes until the fabric is quiescent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use weft_cache::{BufferCache, CacheError, RemoteStore};
use weft_common::{Buffer, CellType, Checksum};
use weft_convert::{ConversionError, Converter};

use crate::cachemanager::{CacheManager, Provenance};
use crate::config::EngineConfig;
use crate::elision::ElisionTable;
use crate::error::GraphError;
use crate::expression::{evaluate_expression, Expression};
use crate::ids::{AccessorId, CellId, ScellId, WorkerId};
use crate::livegraph::{GraphEffect, LiveGraph, Observer};
use crate::scheduler::{CancelToken, Job, JobOutcome, JobPool, Task, TaskManager};
use crate::status::StatusReason;
use crate::worker::{Executor, TransformationRecord, Worker};

/// Outcome of one `compute` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeReport {
    /// Tasks handled this call.
    pub tasks_handled: usize,
    /// Execution jobs that completed this call.
    pub jobs_completed: usize,
    /// `true` when tasks or jobs remain outstanding.
    pub pending: bool,
}

/// The engine manager. See the module docs.
pub struct Manager {
    config: EngineConfig,
    cache: BufferCache,
    converter: Converter,
    graph: LiveGraph,
    tasks: TaskManager,
    pool: JobPool,
    elision: ElisionTable,
    cachemanager: CacheManager,
    executor: Arc<dyn Executor>,
    next_job: u64,
    running: HashMap<u64, (WorkerId, CancelToken, Checksum)>,
    jobs_by_worker: HashMap<WorkerId, u64>,
    inflight_tf: HashMap<Checksum, u64>,
    waiting_tf: HashMap<Checksum, Vec<WorkerId>>,
    cell_values: HashMap<CellId, Checksum>,
    deltas: HashMap<ScellId, Vec<(Vec<String>, Option<Checksum>)>>,
    pending_joins: Vec<ScellId>,
}

impl Manager {
    /// Creates a manager over a remote store and an executor.
    pub fn new(
        config: EngineConfig,
        remote: Box<dyn RemoteStore>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let cache = BufferCache::with_lifetimes(
            remote,
            config.cache.small_buffer_limit as usize,
            Duration::from_secs(config.cache.lifetime_temp_secs),
            Duration::from_secs(config.cache.lifetime_temp_small_secs),
        );
        let pool = JobPool::new(config.scheduler.job_pool_size, Arc::clone(&executor));
        info!(
            pool_size = config.scheduler.job_pool_size,
            "manager started"
        );
        Self {
            config,
            cache,
            converter: Converter::new(),
            graph: LiveGraph::new(),
            tasks: TaskManager::new(),
            pool,
            elision: ElisionTable::new(),
            cachemanager: CacheManager::new(),
            executor,
            next_job: 0,
            running: HashMap::new(),
            jobs_by_worker: HashMap::new(),
            inflight_tf: HashMap::new(),
            waiting_tf: HashMap::new(),
            cell_values: HashMap::new(),
            deltas: HashMap::new(),
            pending_joins: Vec::new(),
        }
    }

    /// The live graph, read-only.
    pub fn graph(&self) -> &LiveGraph {
        &self.graph
    }

    /// The buffer cache.
    pub fn cache(&mut self) -> &mut BufferCache {
        &mut self.cache
    }

    /// The elision table.
    pub fn elision(&mut self) -> &mut ElisionTable {
        &mut self.elision
    }

    /// Conversion counters, for diagnostics.
    pub fn conversion_counters(&self) -> weft_convert::ConversionCounters {
        self.converter.counters()
    }

    // -- graph construction -------------------------------------------

    /// Registers an independent cell.
    pub fn register_cell(&mut self, celltype: CellType) -> CellId {
        self.graph.register_cell(celltype)
    }

    /// Registers a worker with named input pins.
    pub fn register_worker(&mut self, def: Worker, pins: &[(String, CellType)]) -> WorkerId {
        self.graph.register_worker(def, pins)
    }

    /// Registers a structured cell's channel maps.
    pub fn register_structured_cell(
        &mut self,
        data_cell: CellId,
        inchannels: Vec<Vec<String>>,
        outchannels: Vec<Vec<String>>,
    ) -> Result<ScellId, GraphError> {
        self.graph
            .register_structured_cell(data_cell, inchannels, outchannels)
    }

    /// Connects a cell to an independent cell.
    pub fn connect_cell_cell(
        &mut self,
        source: CellId,
        target: CellId,
    ) -> Result<AccessorId, GraphError> {
        let mut effects = Vec::new();
        let acc = self.graph.connect_cell_cell(source, target, &mut effects)?;
        self.apply_effects(effects);
        Ok(acc)
    }

    /// Connects a cell to a worker input pin.
    pub fn connect_cell_pin(
        &mut self,
        source: CellId,
        worker: WorkerId,
        pin: &str,
    ) -> Result<AccessorId, GraphError> {
        let mut effects = Vec::new();
        let acc = self
            .graph
            .connect_cell_pin(source, worker, pin, &mut effects)?;
        self.apply_effects(effects);
        Ok(acc)
    }

    /// Connects a worker's output to an independent cell.
    pub fn connect_pin_cell(
        &mut self,
        worker: WorkerId,
        target: CellId,
    ) -> Result<AccessorId, GraphError> {
        let mut effects = Vec::new();
        let acc = self.graph.connect_pin_cell(worker, target, &mut effects)?;
        self.apply_effects(effects);
        Ok(acc)
    }

    /// Connects a structured cell outchannel to an independent cell.
    pub fn connect_scell_cell(
        &mut self,
        scell: ScellId,
        path: Vec<String>,
        target: CellId,
    ) -> Result<AccessorId, GraphError> {
        let mut effects = Vec::new();
        let acc = self
            .graph
            .connect_scell_cell(scell, path, target, &mut effects)?;
        self.apply_effects(effects);
        Ok(acc)
    }

    /// Connects a cell to a structured cell inchannel.
    pub fn connect_cell_scell(
        &mut self,
        source: CellId,
        scell: ScellId,
        path: Vec<String>,
    ) -> Result<AccessorId, GraphError> {
        let mut effects = Vec::new();
        let acc = self
            .graph
            .connect_cell_scell(source, scell, path, &mut effects)?;
        self.apply_effects(effects);
        Ok(acc)
    }

    /// Registers an observer on a cell.
    pub fn add_observer(&mut self, cell: CellId, observer: Observer) -> Result<(), GraphError> {
        self.graph.add_observer(cell, observer)
    }

    // -- teardown ------------------------------------------------------

    /// Destroys an accessor.
    pub fn destroy_accessor(&mut self, acc: AccessorId) {
        let mut effects = Vec::new();
        self.graph.destroy_accessor(acc, &mut effects);
        self.apply_effects(effects);
    }

    /// Destroys a cell and everything touching it.
    pub fn destroy_cell(&mut self, cell: CellId) {
        let mut effects = Vec::new();
        self.graph.destroy_cell(cell, &mut effects);
        self.apply_effects(effects);
    }

    /// Destroys a worker and everything touching it.
    pub fn destroy_worker(&mut self, worker: WorkerId) {
        let mut effects = Vec::new();
        self.graph.destroy_worker(worker, &mut effects);
        self.apply_effects(effects);
    }

    /// Destroys a structured cell registration.
    pub fn destroy_structured_cell(&mut self, scell: ScellId) {
        let mut effects = Vec::new();
        self.graph.destroy_structured_cell(scell, &mut effects);
        self.apply_effects(effects);
        self.deltas.remove(&scell);
        self.pending_joins.retain(|s| *s != scell);
    }

    // -- values --------------------------------------------------------

    /// Caches a buffer and writes its checksum into an independent cell.
    pub fn set_cell(&mut self, cell: CellId, buffer: Buffer) -> Result<(), GraphError> {
        let checksum = buffer.checksum();
        self.cache.cache_buffer(checksum, buffer)?;
        self.set_cell_checksum(cell, Some(checksum))
    }

    /// Writes a checksum into an independent cell, or voids it with
    /// `None`. The sole authoritative mutation path for cell values.
    pub fn set_cell_checksum(
        &mut self,
        cell: CellId,
        checksum: Option<Checksum>,
    ) -> Result<(), GraphError> {
        if !self.graph.has_independence(cell)? {
            return Err(GraphError::NotIndependent);
        }
        let mut effects = Vec::new();
        self.graph
            .set_cell_state(cell, checksum, Some(StatusReason::Undefined), &mut effects)?;
        self.apply_effects(effects);
        Ok(())
    }

    /// The checksum a cell currently holds.
    pub fn cell_checksum(&self, cell: CellId) -> Option<Checksum> {
        self.graph.cell(cell).and_then(|node| node.checksum)
    }

    /// Resolves a cell's value to a buffer, fingertipping if needed.
    pub fn cell_buffer(&mut self, cell: CellId) -> Result<Option<Buffer>, GraphError> {
        match self.cell_checksum(cell) {
            Some(cs) => Ok(Some(self.fingertip(cs)?)),
            None => Ok(None),
        }
    }

    /// Drains the inchannel deltas accumulated for a structured cell.
    pub fn take_deltas(&mut self, scell: ScellId) -> Vec<(Vec<String>, Option<Checksum>)> {
        self.deltas.remove(&scell).unwrap_or_default()
    }

    /// Drains the structured cells whose channels changed since the last
    /// call.
    pub fn take_pending_joins(&mut self) -> Vec<ScellId> {
        std::mem::take(&mut self.pending_joins)
    }

    // -- scheduling ----------------------------------------------------

    /// Drives the fabric until quiescent or the deadline passes.
    pub fn compute(&mut self, timeout: Duration) -> ComputeReport {
        let deadline = Instant::now() + timeout;
        let mut report = ComputeReport::default();
        loop {
            let mut progressed = false;
            let mut handled = 0;
            while handled < self.config.scheduler.max_tasks_per_compute {
                let task = match self.tasks.pop() {
                    Some(task) => task,
                    None => break,
                };
                self.process_task(task);
                handled += 1;
            }
            report.tasks_handled += handled;
            progressed |= handled > 0;

            for outcome in self.pool.poll() {
                self.finish_job(outcome);
                report.jobs_completed += 1;
                progressed = true;
            }

            if self.tasks.is_empty() && self.running.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            if !progressed && !self.running.is_empty() {
                // block briefly on the result channel rather than spin
                let wait = deadline.saturating_duration_since(Instant::now());
                if let Some(outcome) =
                    self.pool.poll_timeout(wait.min(Duration::from_millis(50)))
                {
                    self.finish_job(outcome);
                    report.jobs_completed += 1;
                }
            }
        }
        report.pending = !self.tasks.is_empty() || !self.running.is_empty();
        report
    }

    /// Runs one eviction sweep on the buffer cache.
    pub fn tick(&mut self) -> usize {
        self.cache.tick(Instant::now())
    }

    fn apply_effects(&mut self, effects: Vec<GraphEffect>) {
        for effect in effects {
            match effect {
                GraphEffect::ExpressionCreated(expr) => {
                    // the origin buffer is pinned while the demand lives
                    if let Err(err) = self.cache.incref(expr.checksum) {
                        warn!(%err, "could not pin expression origin");
                    }
                    self.tasks.enqueue(Task::Evaluate(expr));
                }
                GraphEffect::ExpressionDestroyed(expr) => {
                    self.cache.decref(expr.checksum);
                }
                GraphEffect::CellChanged(cell) => {
                    if let Some(cs) = self.graph.cell(cell).and_then(|node| node.checksum) {
                        if let Err(err) = self.cache.incref(cs) {
                            warn!(%err, "could not pin cell value");
                        }
                        if let Some(old) = self.cell_values.insert(cell, cs) {
                            self.cache.decref(old);
                        }
                    }
                    self.tasks.enqueue(Task::CellFanout(cell));
                }
                GraphEffect::CellVoided(cell, _) => {
                    if let Some(old) = self.cell_values.remove(&cell) {
                        self.cache.decref(old);
                    }
                    self.tasks.enqueue(Task::CellFanout(cell));
                }
                GraphEffect::WorkerReady(worker) => {
                    self.tasks.enqueue(Task::WorkerUpdate(worker));
                }
                GraphEffect::StructuredDelta {
                    scell,
                    path,
                    checksum,
                } => {
                    self.deltas.entry(scell).or_default().push((path, checksum));
                    self.tasks.enqueue(Task::StructuredJoin(scell));
                }
                GraphEffect::CellDestroyed(cell) => {
                    if let Some(old) = self.cell_values.remove(&cell) {
                        self.cache.decref(old);
                    }
                    self.elision.invalidate_cell(cell);
                }
                GraphEffect::WorkerDestroyed(worker) => {
                    for waiters in self.waiting_tf.values_mut() {
                        waiters.retain(|w| *w != worker);
                    }
                    if let Some(id) = self.jobs_by_worker.remove(&worker) {
                        if let Some((_, token, tf)) = self.running.remove(&id) {
                            token.cancel();
                            self.inflight_tf.remove(&tf);
                            // waiters on the cancelled record submit their own
                            for waiter in self.waiting_tf.remove(&tf).unwrap_or_default() {
                                self.tasks.enqueue(Task::WorkerUpdate(waiter));
                            }
                        }
                    }
                }
            }
        }
    }

    fn process_task(&mut self, task: Task) {
        match task {
            Task::Evaluate(expr) => self.evaluate(expr),
            Task::CellFanout(cell) => {
                let mut effects = Vec::new();
                if let Err(err) = self.graph.fanout_cell(cell, &mut effects) {
                    warn!(%err, "cell fanout failed");
                }
                self.apply_effects(effects);
            }
            Task::WorkerUpdate(worker) => self.update_worker(worker),
            Task::StructuredJoin(scell) => {
                // joined by the structured-cell layer between compute calls
                self.pending_joins.push(scell);
            }
        }
    }

    fn evaluate(&mut self, expr: Expression) {
        if self.graph.expression_refcount(&expr) == 0 {
            return;
        }
        let mut attempt = evaluate_expression(&mut self.cache, &mut self.converter, &expr);
        if Self::is_miss(&attempt) {
            // the origin fell out of every cache; recompute it, then retry
            attempt = self
                .fingertip(expr.checksum)
                .and_then(|_| evaluate_expression(&mut self.cache, &mut self.converter, &expr));
        }
        let result = match attempt {
            Ok(cs) => {
                self.cachemanager
                    .record_provenance(cs, Provenance::Expression(expr.clone()));
                Ok(cs)
            }
            Err(err) => {
                debug!(%err, "expression evaluation failed");
                Err(match err {
                    GraphError::Conversion(_) | GraphError::InvalidExpression(_) => {
                        StatusReason::Invalid
                    }
                    _ => StatusReason::Error,
                })
            }
        };
        let mut effects = Vec::new();
        if let Err(err) = self.graph.expression_resolved(&expr, result, &mut effects) {
            warn!(%err, "could not deliver expression result");
        }
        self.apply_effects(effects);
    }

    fn is_miss(attempt: &Result<Checksum, GraphError>) -> bool {
        matches!(
            attempt,
            Err(GraphError::Cache(CacheError::Miss { .. }))
                | Err(GraphError::Conversion(ConversionError::BufferUnavailable { .. }))
        )
    }

    fn update_worker(&mut self, worker: WorkerId) {
        let record = match self.build_record(worker) {
            Some(record) => record,
            None => return,
        };
        let tf_checksum = record.checksum();
        if let Some(result) = self
            .cachemanager
            .transformation_result(&self.cache, tf_checksum)
        {
            debug!(%tf_checksum, %result, "transformation result cache hit");
            self.cachemanager
                .record_provenance(result, Provenance::Transformation(tf_checksum));
            self.cachemanager.record_transformation(record, result);
            self.finish_worker(worker, Ok(result));
            return;
        }
        if self.inflight_tf.contains_key(&tf_checksum) {
            // an identical record is already executing; wait for it
            debug!(%tf_checksum, "joining in-flight transformation");
            self.waiting_tf.entry(tf_checksum).or_default().push(worker);
            self.finish_worker(worker, Err((StatusReason::Executing, None)));
            return;
        }
        let inputs = match self.gather_inputs(&record) {
            Ok(inputs) => inputs,
            Err(err) => {
                warn!(%err, "could not gather transformation inputs");
                self.finish_worker(worker, Err((StatusReason::Error, Some(err.to_string()))));
                return;
            }
        };
        let token = CancelToken::new();
        let id = self.next_job;
        self.next_job += 1;
        self.running.insert(id, (worker, token.clone(), tf_checksum));
        self.jobs_by_worker.insert(worker, id);
        self.inflight_tf.insert(tf_checksum, id);
        let mut effects = Vec::new();
        // output is void while the job runs
        if let Err(err) = self.graph.worker_output_resolved(
            worker,
            Err((StatusReason::Executing, None)),
            &mut effects,
        ) {
            warn!(%err, "could not mark worker as executing");
        }
        self.apply_effects(effects);
        debug!(job = id, %tf_checksum, "job submitted");
        self.pool.submit(Job {
            id,
            worker,
            record,
            inputs,
            cancel: token,
        });
    }

    fn build_record(&self, worker: WorkerId) -> Option<TransformationRecord> {
        let node = self.graph.worker(worker)?;
        if !node.inputs_resolved() {
            return None;
        }
        let mut inputs = BTreeMap::new();
        for (name, pin) in &node.pins {
            inputs.insert(name.clone(), (pin.celltype, pin.checksum?));
        }
        Some(TransformationRecord {
            inputs,
            output_celltype: node.def.output_celltype,
            params: node.def.params,
            runtime: node.def.runtime.clone(),
        })
    }

    fn gather_inputs(
        &mut self,
        record: &TransformationRecord,
    ) -> Result<BTreeMap<String, Buffer>, GraphError> {
        let mut buffers = BTreeMap::new();
        for (name, (_, checksum)) in &record.inputs {
            buffers.insert(name.clone(), self.fingertip(*checksum)?);
        }
        Ok(buffers)
    }

    fn finish_job(&mut self, outcome: JobOutcome) {
        let (worker, token, tf_checksum) = match self.running.remove(&outcome.id) {
            Some(entry) => entry,
            // the worker was destroyed while the job ran
            None => return,
        };
        self.jobs_by_worker.remove(&worker);
        self.inflight_tf.remove(&tf_checksum);
        let waiters = self.waiting_tf.remove(&tf_checksum).unwrap_or_default();
        if token.is_cancelled() {
            self.finish_worker(worker, Err((StatusReason::Cancelled, None)));
            for waiter in waiters {
                self.tasks.enqueue(Task::WorkerUpdate(waiter));
            }
            return;
        }
        match outcome.result {
            Ok(buffer) => {
                let checksum = buffer.checksum();
                if let Err(err) = self.cache.cache_buffer(checksum, buffer) {
                    warn!(%err, "could not cache transformation output");
                    self.finish_worker(worker, Err((StatusReason::Error, None)));
                    return;
                }
                // pins may have moved on while the job ran; only memoize
                // when the record still matches what was submitted
                if let Some(record) = self.build_record(worker) {
                    if record.checksum() == tf_checksum {
                        self.cachemanager.record_transformation(record, checksum);
                        self.cachemanager
                            .push_transformation_result(&self.cache, tf_checksum, checksum);
                    }
                }
                debug!(%tf_checksum, %checksum, "transformation executed");
                self.finish_worker(worker, Ok(checksum));
                // waiters re-run their update and hit the memo
                for waiter in waiters {
                    self.tasks.enqueue(Task::WorkerUpdate(waiter));
                }
            }
            Err(err) => {
                debug!(%err, "transformation failed");
                let captured = if err.captured.is_empty() {
                    err.message.clone()
                } else {
                    err.captured.clone()
                };
                self.finish_worker(worker, Err((StatusReason::Error, Some(captured.clone()))));
                for waiter in waiters {
                    self.finish_worker(waiter, Err((StatusReason::Error, Some(captured.clone()))));
                }
            }
        }
    }

    fn finish_worker(
        &mut self,
        worker: WorkerId,
        result: Result<Checksum, (StatusReason, Option<String>)>,
    ) {
        let mut effects = Vec::new();
        if let Err(err) = self
            .graph
            .worker_output_resolved(worker, result, &mut effects)
        {
            warn!(%err, "could not deliver worker output");
        }
        self.apply_effects(effects);
    }

    // -- fingertipping -------------------------------------------------

    /// Resolves a checksum to its buffer: local cache, then remote, then
    /// provenance replay. Fails with [`GraphError::Irrecoverable`] when no
    /// recipe can reproduce the exact bytes.
    pub fn fingertip(&mut self, checksum: Checksum) -> Result<Buffer, GraphError> {
        if let Some(buffer) = self.cache.get_local(checksum) {
            return Ok(buffer);
        }
        match self.cache.get_buffer(checksum) {
            Ok(buffer) => return Ok(buffer),
            Err(CacheError::Miss { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        info!(%checksum, "fingertipping by provenance replay");
        let provenance = self
            .cachemanager
            .provenance(checksum)
            .cloned()
            .ok_or(GraphError::Irrecoverable { checksum })?;
        match provenance {
            Provenance::Expression(expr) => {
                self.fingertip(expr.checksum)?;
                let result =
                    evaluate_expression(&mut self.cache, &mut self.converter, &expr)?;
                if result != checksum {
                    return Err(GraphError::Irrecoverable { checksum });
                }
                self.cache
                    .get_local(checksum)
                    .ok_or(GraphError::Irrecoverable { checksum })
            }
            Provenance::Transformation(tf_checksum) => {
                let record = self
                    .cachemanager
                    .transformation_record(tf_checksum)
                    .cloned()
                    .ok_or(GraphError::Irrecoverable { checksum })?;
                // a memo cannot be trusted for a buffer that went missing
                self.cachemanager.forget_result(tf_checksum);
                let inputs = self.gather_inputs(&record)?;
                let buffer = self
                    .executor
                    .execute(&record, &inputs, &CancelToken::new())?;
                if buffer.checksum() != checksum {
                    return Err(GraphError::Irrecoverable { checksum });
                }
                self.cache.cache_buffer(checksum, buffer.clone())?;
                self.cachemanager.record_transformation(record, checksum);
                Ok(buffer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_cache::NoRemote;
    use weft_common::CellType;
    use crate::worker::{ExecutionError, FnExecutor};

    fn manager() -> Manager {
        let executor = FnExecutor(
            |record: &TransformationRecord, inputs: &BTreeMap<String, Buffer>| {
                let fail = |message: String| ExecutionError {
                    name: "sum".to_string(),
                    message,
                    captured: String::new(),
                };
                if record.runtime != "sum" {
                    return Err(fail(format!("unknown runtime {:?}", record.runtime)));
                }
                let mut total = 0i64;
                for buffer in inputs.values() {
                    let text = std::str::from_utf8(buffer.as_bytes())
                        .map_err(|e| fail(e.to_string()))?;
                    total += text
                        .trim()
                        .parse::<i64>()
                        .map_err(|e| fail(e.to_string()))?;
                }
                Ok(Buffer::from_text(&total.to_string()))
            },
        );
        Manager::new(
            EngineConfig::default(),
            Box::new(NoRemote),
            Arc::new(executor),
        )
    }

    fn sum_worker() -> Worker {
        Worker {
            name: "sum".to_string(),
            params: Checksum::from_bytes(b"sum-params"),
            runtime: "sum".to_string(),
            output_celltype: CellType::Int,
        }
    }

    #[test]
    fn value_propagates_through_a_connection() {
        let mut m = manager();
        let a = m.register_cell(CellType::Plain);
        let b = m.register_cell(CellType::Plain);
        m.connect_cell_cell(a, b).unwrap();
        m.set_cell(a, Buffer::from_text("[1,2]")).unwrap();
        let report = m.compute(Duration::from_secs(5));
        assert!(!report.pending);
        assert_eq!(m.cell_checksum(b), m.cell_checksum(a));
    }

    #[test]
    fn conversion_happens_along_the_edge() {
        let mut m = manager();
        let a = m.register_cell(CellType::Text);
        let b = m.register_cell(CellType::Str);
        m.connect_cell_cell(a, b).unwrap();
        m.set_cell(a, Buffer::from_text("hello")).unwrap();
        m.compute(Duration::from_secs(5));
        let buffer = m.cell_buffer(b).unwrap().unwrap();
        assert_eq!(buffer.as_bytes(), b"\"hello\"");
    }

    #[test]
    fn forbidden_edge_voids_the_target() {
        let mut m = manager();
        let a = m.register_cell(CellType::Code);
        let b = m.register_cell(CellType::Bool);
        m.connect_cell_cell(a, b).unwrap();
        m.set_cell(a, Buffer::from_text("x = 1")).unwrap();
        m.compute(Duration::from_secs(5));
        let node = m.graph().cell(b).unwrap();
        assert_eq!(node.checksum, None);
        assert_eq!(node.void_reason, Some(StatusReason::Invalid));
    }

    #[test]
    fn worker_executes_and_feeds_downstream() {
        let mut m = manager();
        let x = m.register_cell(CellType::Int);
        let y = m.register_cell(CellType::Int);
        let out = m.register_cell(CellType::Int);
        let w = m.register_worker(
            sum_worker(),
            &[
                ("x".to_string(), CellType::Int),
                ("y".to_string(), CellType::Int),
            ],
        );
        m.connect_cell_pin(x, w, "x").unwrap();
        m.connect_cell_pin(y, w, "y").unwrap();
        m.connect_pin_cell(w, out).unwrap();
        m.set_cell(x, Buffer::from_text("2")).unwrap();
        m.set_cell(y, Buffer::from_text("3")).unwrap();
        let report = m.compute(Duration::from_secs(10));
        assert!(!report.pending);
        let buffer = m.cell_buffer(out).unwrap().unwrap();
        assert_eq!(buffer.as_bytes(), b"5");
    }

    #[test]
    fn identical_transformation_is_not_reexecuted() {
        let mut m = manager();
        let x = m.register_cell(CellType::Int);
        let out1 = m.register_cell(CellType::Int);
        let out2 = m.register_cell(CellType::Int);
        let w1 = m.register_worker(sum_worker(), &[("x".to_string(), CellType::Int)]);
        let w2 = m.register_worker(sum_worker(), &[("x".to_string(), CellType::Int)]);
        m.connect_cell_pin(x, w1, "x").unwrap();
        m.connect_cell_pin(x, w2, "x").unwrap();
        m.connect_pin_cell(w1, out1).unwrap();
        m.connect_pin_cell(w2, out2).unwrap();
        m.set_cell(x, Buffer::from_text("7")).unwrap();
        let report = m.compute(Duration::from_secs(10));
        assert!(!report.pending);
        assert_eq!(m.cell_checksum(out1), m.cell_checksum(out2));
        // the second worker joins the in-flight record and hits the memo
        assert_eq!(report.jobs_completed, 1);
        let buffer = m.cell_buffer(out1).unwrap().unwrap();
        assert_eq!(buffer.as_bytes(), b"7");
    }

    #[test]
    fn failed_worker_voids_downstream_with_diagnostics() {
        let mut m = manager();
        let x = m.register_cell(CellType::Int);
        let out = m.register_cell(CellType::Int);
        let w = m.register_worker(
            Worker {
                runtime: "unknown".to_string(),
                ..sum_worker()
            },
            &[("x".to_string(), CellType::Int)],
        );
        m.connect_cell_pin(x, w, "x").unwrap();
        m.connect_pin_cell(w, out).unwrap();
        m.set_cell(x, Buffer::from_text("1")).unwrap();
        m.compute(Duration::from_secs(10));
        let node = m.graph().worker(w).unwrap();
        assert_eq!(node.void_reason, Some(StatusReason::Error));
        assert!(node.diagnostics.is_some());
        let target = m.graph().cell(out).unwrap();
        assert_eq!(target.void_reason, Some(StatusReason::Upstream));
    }

    #[test]
    fn dependent_cell_rejects_direct_writes() {
        let mut m = manager();
        let a = m.register_cell(CellType::Plain);
        let b = m.register_cell(CellType::Plain);
        m.connect_cell_cell(a, b).unwrap();
        let err = m.set_cell(b, Buffer::from_text("1")).unwrap_err();
        assert!(matches!(err, GraphError::NotIndependent));
    }

    #[test]
    fn fingertip_replays_an_evicted_expression_result() {
        let mut config = EngineConfig::default();
        config.cache.lifetime_temp_secs = 0;
        config.cache.lifetime_temp_small_secs = 0;
        let mut m = Manager::new(
            config,
            Box::new(NoRemote),
            Arc::new(FnExecutor(
                |_: &TransformationRecord, _: &BTreeMap<String, Buffer>| {
                    Ok(Buffer::from_text("unused"))
                },
            )),
        );
        let a = m.register_cell(CellType::Text);
        let b = m.register_cell(CellType::Str);
        m.connect_cell_cell(a, b).unwrap();
        m.set_cell(a, Buffer::from_text("alpha")).unwrap();
        m.compute(Duration::from_secs(5));
        let derived = m.cell_checksum(b).unwrap();
        // drop the cell-value pin so the sweep can evict the derived buffer
        m.cache.decref(derived);
        m.tick();
        assert!(!m.cache.is_resident(derived));
        let buffer = m.fingertip(derived).unwrap();
        assert_eq!(buffer.as_bytes(), b"\"alpha\"");
    }

    #[test]
    fn unknown_checksum_is_irrecoverable() {
        let mut m = manager();
        let missing = Checksum::from_bytes(b"never stored");
        let err = m.fingertip(missing).unwrap_err();
        assert!(matches!(err, GraphError::Irrecoverable { .. }));
    }
}
