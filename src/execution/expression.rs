use crate::storage::tuple::{Cell, Tuple};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LogicalOp {
    And,
    Or,
}

/// Expression tree over a closed set of node kinds, dispatched by `match`.
///
/// `ColumnValue` picks a column out of a tuple; `tuple_index` selects the
/// probe side in a join context (0 = left/outer, 1 = right/inner) and is 0
/// everywhere else.
#[derive(Clone, Debug)]
pub enum Expression {
    ColumnValue {
        tuple_index: usize,
        col_index: usize,
    },
    Constant {
        value: Cell,
    },
    Comparison {
        left: Box<Expression>,
        right: Box<Expression>,
        op: ComparisonOp,
    },
    Logical {
        left: Box<Expression>,
        right: Box<Expression>,
        op: LogicalOp,
    },
}

impl Expression {
    pub fn column(col_index: usize) -> Expression {
        Expression::ColumnValue {
            tuple_index: 0,
            col_index,
        }
    }

    pub fn join_column(tuple_index: usize, col_index: usize) -> Expression {
        Expression::ColumnValue {
            tuple_index,
            col_index,
        }
    }

    pub fn constant(value: Cell) -> Expression {
        Expression::Constant { value }
    }

    pub fn comparison(left: Expression, op: ComparisonOp, right: Expression) -> Expression {
        Expression::Comparison {
            left: Box::new(left),
            right: Box::new(right),
            op,
        }
    }

    pub fn logical(left: Expression, op: LogicalOp, right: Expression) -> Expression {
        Expression::Logical {
            left: Box::new(left),
            right: Box::new(right),
            op,
        }
    }

    /// Evaluate against a single tuple.
    pub fn evaluate(&self, tuple: &Tuple) -> Cell {
        self.evaluate_with(tuple, None)
    }

    /// Evaluate in a join context with both inputs available.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> Cell {
        self.evaluate_with(left, Some(right))
    }

    fn evaluate_with(&self, left: &Tuple, right: Option<&Tuple>) -> Cell {
        match self {
            Expression::ColumnValue {
                tuple_index,
                col_index,
            } => {
                let tuple = match (tuple_index, right) {
                    (1, Some(right)) => right,
                    _ => left,
                };
                tuple.cell(*col_index).clone()
            }
            Expression::Constant { value } => value.clone(),
            Expression::Comparison { left: l, right: r, op } => {
                let lhs = l.evaluate_with(left, right);
                let rhs = r.evaluate_with(left, right);
                Cell::Boolean(Self::compare(&lhs, &rhs, *op))
            }
            Expression::Logical { left: l, right: r, op } => {
                let lhs = l.evaluate_with(left, right).to_bool();
                let rhs = r.evaluate_with(left, right).to_bool();
                Cell::Boolean(match op {
                    LogicalOp::And => lhs && rhs,
                    LogicalOp::Or => lhs || rhs,
                })
            }
        }
    }

    fn compare(lhs: &Cell, rhs: &Cell, op: ComparisonOp) -> bool {
        match op {
            ComparisonOp::Equal => lhs == rhs,
            ComparisonOp::NotEqual => lhs != rhs,
            ComparisonOp::LessThan => lhs < rhs,
            ComparisonOp::LessThanOrEqual => lhs <= rhs,
            ComparisonOp::GreaterThan => lhs > rhs,
            ComparisonOp::GreaterThanOrEqual => lhs >= rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Tuple {
        Tuple::new(vec![
            Cell::Integer(20),
            Cell::Integer(22),
            Cell::Varchar("foo".to_string()),
        ])
    }

    #[test]
    fn test_comparison() {
        let expr = Expression::comparison(
            Expression::column(1),
            ComparisonOp::Equal,
            Expression::constant(Cell::Integer(22)),
        );
        assert_eq!(expr.evaluate(&row()), Cell::Boolean(true));

        let expr = Expression::comparison(
            Expression::column(2),
            ComparisonOp::NotEqual,
            Expression::constant(Cell::Varchar("foo".to_string())),
        );
        assert_eq!(expr.evaluate(&row()), Cell::Boolean(false));
    }

    #[test]
    fn test_logical() {
        let both = Expression::logical(
            Expression::comparison(
                Expression::column(0),
                ComparisonOp::GreaterThan,
                Expression::constant(Cell::Integer(10)),
            ),
            LogicalOp::And,
            Expression::comparison(
                Expression::column(1),
                ComparisonOp::LessThan,
                Expression::constant(Cell::Integer(10)),
            ),
        );
        assert_eq!(both.evaluate(&row()), Cell::Boolean(false));
    }

    #[test]
    fn test_join_column_sides() {
        let left = Tuple::new(vec![Cell::Integer(1)]);
        let right = Tuple::new(vec![Cell::Integer(2)]);

        let expr = Expression::join_column(1, 0);
        assert_eq!(expr.evaluate_join(&left, &right), Cell::Integer(2));

        let expr = Expression::join_column(0, 0);
        assert_eq!(expr.evaluate_join(&left, &right), Cell::Integer(1));
    }
}
