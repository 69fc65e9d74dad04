mod executor;
mod expression;
mod plans;

pub use executor::{ExecutionEngine, Executor, ExecutorContext};
pub use expression::{ComparisonOp, Expression, LogicalOp};
pub use plans::PlanNode;
