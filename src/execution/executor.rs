use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::{
    buffer::BufferPoolManager,
    catalog::{Catalog, Schema, TableMetadata},
    error::DbError,
    execution::{Expression, PlanNode},
    storage::{
        table::TableIterator,
        tuple::{Cell, Tuple},
    },
    transaction::Transaction,
    types::DbResult,
};

/// What an executor needs from the instance it runs against.
pub struct ExecutorContext {
    catalog: Arc<Catalog>,
    bpm: Arc<BufferPoolManager>,
    txn: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn new(catalog: Arc<Catalog>, bpm: Arc<BufferPoolManager>, txn: Arc<Transaction>) -> Self {
        Self { catalog, bpm, txn }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    pub fn txn(&self) -> &Arc<Transaction> {
        &self.txn
    }

    /// Swap the transaction, keeping the rest of the context.
    pub fn set_txn(&mut self, txn: Arc<Transaction>) {
        self.txn = txn;
    }
}

/// Volcano driver: build the executor tree for a plan and drain it.
pub struct ExecutionEngine;

impl ExecutionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(
        &self,
        plan: &PlanNode,
        context: &ExecutorContext,
    ) -> Result<Vec<Tuple>, DbError> {
        let mut executor = Executor::create(plan, context)?;
        executor.init()?;

        let mut results = Vec::new();
        while let Some(tuple) = executor.next()? {
            results.push(tuple);
        }
        Ok(results)
    }
}

/// The executors, one variant per plan operator.
pub enum Executor {
    SeqScan(SeqScanExecutor),
    Insert(InsertExecutor),
    Update(UpdateExecutor),
    Delete(DeleteExecutor),
    Limit(LimitExecutor),
    HashJoin(HashJoinExecutor),
}

impl Executor {
    pub fn create(plan: &PlanNode, context: &ExecutorContext) -> Result<Executor, DbError> {
        match plan {
            PlanNode::SeqScan {
                out_schema,
                predicate,
                table_oid,
            } => {
                let metadata = context.catalog.get_table_by_oid(*table_oid)?;
                Ok(Executor::SeqScan(SeqScanExecutor {
                    metadata,
                    out_schema: out_schema.clone(),
                    predicate: predicate.clone(),
                    iter: None,
                }))
            }
            PlanNode::Insert { rows, table_oid } => {
                let metadata = context.catalog.get_table_by_oid(*table_oid)?;
                Ok(Executor::Insert(InsertExecutor {
                    metadata,
                    rows: rows.clone(),
                    txn: Arc::clone(&context.txn),
                    done: false,
                }))
            }
            PlanNode::Update {
                values,
                predicate,
                table_oid,
            } => {
                let metadata = context.catalog.get_table_by_oid(*table_oid)?;
                Ok(Executor::Update(UpdateExecutor {
                    metadata,
                    values: values.clone(),
                    predicate: predicate.clone(),
                    txn: Arc::clone(&context.txn),
                    iter: None,
                }))
            }
            PlanNode::Delete {
                predicate,
                table_oid,
            } => {
                let metadata = context.catalog.get_table_by_oid(*table_oid)?;
                Ok(Executor::Delete(DeleteExecutor {
                    metadata,
                    predicate: predicate.clone(),
                    txn: Arc::clone(&context.txn),
                    iter: None,
                }))
            }
            PlanNode::Limit {
                child,
                limit,
                offset,
            } => Ok(Executor::Limit(LimitExecutor {
                child: Box::new(Executor::create(child, context)?),
                limit: *limit,
                offset: *offset,
                skipped: 0,
                emitted: 0,
            })),
            PlanNode::HashJoin {
                left,
                right,
                left_key,
                right_key,
                out_schema,
            } => Ok(Executor::HashJoin(HashJoinExecutor {
                left: Box::new(Executor::create(left, context)?),
                right: Box::new(Executor::create(right, context)?),
                left_key: left_key.clone(),
                right_key: right_key.clone(),
                out_schema: out_schema.clone(),
                build_table: HashMap::new(),
                pending: Vec::new(),
            })),
        }
    }

    pub fn init(&mut self) -> DbResult {
        match self {
            Executor::SeqScan(e) => e.init(),
            Executor::Insert(e) => e.init(),
            Executor::Update(e) => e.init(),
            Executor::Delete(e) => e.init(),
            Executor::Limit(e) => e.init(),
            Executor::HashJoin(e) => e.init(),
        }
    }

    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        match self {
            Executor::SeqScan(e) => e.next(),
            Executor::Insert(e) => e.next(),
            Executor::Update(e) => e.next(),
            Executor::Delete(e) => e.next(),
            Executor::Limit(e) => e.next(),
            Executor::HashJoin(e) => e.next(),
        }
    }
}

/// Project a full-width tuple onto an output schema by column name.
fn project(tuple: &Tuple, table_schema: &Schema, out_schema: &Schema) -> Result<Tuple, DbError> {
    let mut cells = Vec::with_capacity(out_schema.len());
    for column in out_schema.columns() {
        let index = table_schema.col_index(column.name()).ok_or_else(|| {
            DbError::internal(&format!("projected column {} not in table", column.name()))
        })?;
        cells.push(tuple.cell(index).clone());
    }
    Ok(Tuple::new(cells))
}

fn selects(tuple: &Tuple, predicate: &Option<Expression>) -> bool {
    match predicate {
        Some(predicate) => predicate.evaluate(tuple).to_bool(),
        None => true,
    }
}

/// Sequential scan with on-the-fly selection and projection.
pub struct SeqScanExecutor {
    metadata: Arc<TableMetadata>,
    out_schema: Schema,
    predicate: Option<Expression>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    fn init(&mut self) -> DbResult {
        self.iter = Some(self.metadata.table().iterator());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        let iter = match self.iter.as_mut() {
            Some(iter) => iter,
            None => return Ok(None),
        };

        for (_rid, tuple) in iter {
            if selects(&tuple, &self.predicate) {
                let projected = project(&tuple, self.metadata.schema(), &self.out_schema)?;
                return Ok(Some(projected));
            }
        }
        Ok(None)
    }
}

/// Insert the plan's literal rows; produces no output tuples.
pub struct InsertExecutor {
    metadata: Arc<TableMetadata>,
    rows: Vec<Vec<Cell>>,
    txn: Arc<Transaction>,
    done: bool,
}

impl InsertExecutor {
    fn init(&mut self) -> DbResult {
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        for row in &self.rows {
            let tuple = Tuple::new(row.clone());
            let rid = self.metadata.table().insert_tuple(&tuple, &self.txn)?;
            debug!("insert executor placed {} at {}", tuple, rid);
        }
        Ok(None)
    }
}

/// Scan for matching rows and replace each with the plan's values.
pub struct UpdateExecutor {
    metadata: Arc<TableMetadata>,
    values: Vec<Cell>,
    predicate: Option<Expression>,
    txn: Arc<Transaction>,
    iter: Option<TableIterator>,
}

impl UpdateExecutor {
    fn init(&mut self) -> DbResult {
        self.iter = Some(self.metadata.table().iterator());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            let entry = match self.iter.as_mut().and_then(|iter| iter.next()) {
                Some(entry) => entry,
                None => return Ok(None),
            };

            let (rid, tuple) = entry;
            if !selects(&tuple, &self.predicate) {
                continue;
            }

            let new_tuple = Tuple::new(self.values.clone());
            self.metadata
                .table()
                .update_tuple(&new_tuple, rid, &self.txn)?;
            return Ok(Some(new_tuple));
        }
    }
}

/// Scan for matching rows and tombstone them.
pub struct DeleteExecutor {
    metadata: Arc<TableMetadata>,
    predicate: Option<Expression>,
    txn: Arc<Transaction>,
    iter: Option<TableIterator>,
}

impl DeleteExecutor {
    fn init(&mut self) -> DbResult {
        self.iter = Some(self.metadata.table().iterator());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            let entry = match self.iter.as_mut().and_then(|iter| iter.next()) {
                Some(entry) => entry,
                None => return Ok(None),
            };

            let (rid, tuple) = entry;
            if !selects(&tuple, &self.predicate) {
                continue;
            }

            self.metadata.table().mark_delete(rid, &self.txn)?;
            return Ok(Some(tuple));
        }
    }
}

pub struct LimitExecutor {
    child: Box<Executor>,
    limit: usize,
    offset: usize,
    skipped: usize,
    emitted: usize,
}

impl LimitExecutor {
    fn init(&mut self) -> DbResult {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        while self.skipped < self.offset {
            if self.child.next()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }

        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(tuple) => {
                self.emitted += 1;
                Ok(Some(tuple))
            }
            None => Ok(None),
        }
    }
}

/// Classic two-phase hash join: drain the left child into a hash table
/// keyed by the serialized join key, then stream the right child through
/// it. Output rows are left cells followed by right cells, matching the
/// plan's merged output schema.
pub struct HashJoinExecutor {
    left: Box<Executor>,
    right: Box<Executor>,
    left_key: Expression,
    right_key: Expression,
    out_schema: Schema,
    build_table: HashMap<Vec<u8>, Vec<Tuple>>,
    pending: Vec<Tuple>,
}

impl HashJoinExecutor {
    fn init(&mut self) -> DbResult {
        self.left.init()?;
        self.right.init()?;

        while let Some(tuple) = self.left.next()? {
            let key = Self::key_bytes(&self.left_key.evaluate(&tuple));
            self.build_table.entry(key).or_insert_with(Vec::new).push(tuple);
        }
        debug!("hash join built {} buckets", self.build_table.len());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            if let Some(tuple) = self.pending.pop() {
                return Ok(Some(tuple));
            }

            let right_tuple = match self.right.next()? {
                Some(tuple) => tuple,
                None => return Ok(None),
            };

            let key = Self::key_bytes(&self.right_key.evaluate(&right_tuple));
            if let Some(matches) = self.build_table.get(&key) {
                for left_tuple in matches {
                    let mut cells = left_tuple.cells().to_vec();
                    cells.extend(right_tuple.cells().iter().cloned());
                    if cells.len() != self.out_schema.len() {
                        return Err(DbError::internal(
                            "join output width does not match its schema",
                        ));
                    }
                    self.pending.push(Tuple::new(cells));
                }
            }
        }
    }

    fn key_bytes(cell: &Cell) -> Vec<u8> {
        let mut writer = crate::io::ByteWriter::new();
        cell.encode(&mut writer);
        writer.into_bytes()
    }
}
