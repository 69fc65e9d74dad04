use crate::{catalog::Schema, execution::Expression, storage::tuple::Cell, types::OID};

/// Physical plan tree: a tagged enum over the closed set of operators the
/// engine supports. Dispatch is a `match` in the executor factory.
#[derive(Clone, Debug)]
pub enum PlanNode {
    /// Full scan of a table, filtering by `predicate` and projecting onto
    /// `out_schema` (columns matched by name against the table schema).
    SeqScan {
        out_schema: Schema,
        predicate: Option<Expression>,
        table_oid: OID,
    },

    /// Insert literal rows.
    Insert {
        rows: Vec<Vec<Cell>>,
        table_oid: OID,
    },

    /// Replace every matching row with `values`.
    Update {
        values: Vec<Cell>,
        predicate: Option<Expression>,
        table_oid: OID,
    },

    /// Tombstone every matching row; reclamation happens at commit.
    Delete {
        predicate: Option<Expression>,
        table_oid: OID,
    },

    Limit {
        child: Box<PlanNode>,
        limit: usize,
        offset: usize,
    },

    /// Hash join: build on the left input, probe with the right. The key
    /// expressions address their own side (`tuple_index` 0 and 1).
    HashJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_key: Expression,
        right_key: Expression,
        out_schema: Schema,
    },
}
