#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use minirel::{
    catalog::TableMetadata,
    execution::{ExecutionEngine, ExecutorContext, PlanNode},
    storage::tuple::Cell,
    transaction::Transaction,
    types::TypeId,
    utils::init_log,
    Column, Database, Schema, Tuple,
};

pub fn db_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(name)
}

/// Start from a clean slate: fresh log config, no database or log file
/// left over from a previous run.
pub fn setup(name: &str) -> Database {
    init_log();

    let path = db_path(name);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(path.with_extension("log"));

    Database::with_pool_size(&path, 32).unwrap()
}

/// Reopen an existing database, keeping its files.
pub fn reopen(name: &str) -> Database {
    Database::with_pool_size(&db_path(name), 32).unwrap()
}

pub fn two_int_schema() -> Schema {
    Schema::new(vec![
        Column::new("a", TypeId::Integer, false),
        Column::new("b", TypeId::Integer, false),
    ])
}

pub fn int_varchar_schema() -> Schema {
    Schema::new(vec![
        Column::new("a", TypeId::Integer, false),
        Column::new("b", TypeId::Varchar, false),
    ])
}

pub fn int_row(a: i32, b: i32) -> Vec<Cell> {
    vec![Cell::Integer(a), Cell::Integer(b)]
}

pub fn varchar_row(a: i32, b: &str) -> Vec<Cell> {
    vec![Cell::Integer(a), Cell::Varchar(b.to_string())]
}

/// Insert literal rows through the execution engine, the way every
/// scenario seeds its tables.
pub fn insert_rows(
    db: &Database,
    table: &Arc<TableMetadata>,
    txn: &Arc<Transaction>,
    rows: Vec<Vec<Cell>>,
) {
    let plan = PlanNode::Insert {
        rows,
        table_oid: table.oid(),
    };
    let context = executor_context(db, txn);
    ExecutionEngine::new().execute(&plan, &context).unwrap();
}

pub fn executor_context(db: &Database, txn: &Arc<Transaction>) -> ExecutorContext {
    ExecutorContext::new(
        Arc::clone(db.catalog()),
        Arc::clone(db.buffer_pool()),
        Arc::clone(txn),
    )
}

/// Scan a table through the heap directly, returning every live tuple.
pub fn scan_all(table: &Arc<TableMetadata>) -> Vec<Tuple> {
    table.table().iterator().map(|(_, tuple)| tuple).collect()
}
