//! Equality criteria constraining selects, updates and deletes.
//!
//! A [`Where`] is a tree of `column = value` leaves joined with AND and OR.
//! Combining never changes an operand; it builds a new tree.

use crate::value::{SqlValue, ToSqlValue};

/// A criteria tree. The empty tree matches every row.
///
/// # Example
///
/// ```ignore
/// use sqlob::Where;
///
/// let adults = Where::eq("age", 30).and(Where::eq("name", "Ann"));
/// let (sql, params) = adults.to_sql();
/// assert_eq!(sql, "(age = ?) AND (name = ?)");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    node: Option<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Equals { column: String, value: SqlValue },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Where {
    /// Creates the empty criteria.
    #[must_use]
    pub const fn none() -> Self {
        Self { node: None }
    }

    /// Matches rows whose `column` equals `value`; a null value matches NULL.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self {
            node: Some(Node::Equals {
                column: column.into(),
                value: value.to_sql_value(),
            }),
        }
    }

    /// Matches rows matching both criteria.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.combine(other, Node::And)
    }

    /// Matches rows matching either criteria.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.combine(other, Node::Or)
    }

    /// Joins every criteria with AND.
    #[must_use]
    pub fn all(criteria: impl IntoIterator<Item = Self>) -> Self {
        criteria.into_iter().fold(Self::none(), Self::and)
    }

    /// Joins every criteria with OR.
    #[must_use]
    pub fn any(criteria: impl IntoIterator<Item = Self>) -> Self {
        criteria.into_iter().fold(Self::none(), Self::or)
    }

    /// Returns whether this criteria matches every row.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    /// Renders the predicate and its parameters in placeholder order.
    ///
    /// The empty criteria renders as an empty predicate.
    #[must_use]
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut params = Vec::new();
        let sql = self
            .node
            .as_ref()
            .map(|node| render(node, &mut params))
            .unwrap_or_default();
        (sql, params)
    }

    fn combine(self, other: Self, join: fn(Box<Node>, Box<Node>) -> Node) -> Self {
        match (self.node, other.node) {
            (Some(l), Some(r)) => Self {
                node: Some(join(Box::new(l), Box::new(r))),
            },
            (node, None) | (None, node) => Self { node },
        }
    }
}

fn render(node: &Node, params: &mut Vec<SqlValue>) -> String {
    match node {
        Node::Equals { column, value } if value.is_null() => format!("{column} IS NULL"),
        Node::Equals { column, value } => {
            params.push(value.clone());
            format!("{column} = {}", SqlValue::placeholder())
        }
        Node::And(l, r) => {
            let left = render(l, params);
            let right = render(r, params);
            format!("({left}) AND ({right})")
        }
        Node::Or(l, r) => {
            let left = render(l, params);
            let right = render(r, params);
            format!("({left}) OR ({right})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf() {
        let (sql, params) = Where::eq("name", "Ann").to_sql();
        assert_eq!(sql, "name = ?");
        assert_eq!(params, vec![SqlValue::Text(String::from("Ann"))]);
    }

    #[test]
    fn test_parameter_order_follows_placeholders() {
        let (sql, params) = Where::eq("a", 1).and(Where::eq("b", 2)).to_sql();
        assert_eq!(sql, "(a = ?) AND (b = ?)");
        assert_eq!(params, vec![SqlValue::Int(1), SqlValue::Int(2)]);

        let (sql, params) = Where::eq("a", 1)
            .or(Where::eq("b", 2).and(Where::eq("c", 3)))
            .to_sql();
        assert_eq!(sql, "(a = ?) OR ((b = ?) AND (c = ?))");
        assert_eq!(
            params,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_null_renders_is_null_without_parameter() {
        let (sql, params) = Where::eq("email", None::<String>).to_sql();
        assert_eq!(sql, "email IS NULL");
        assert!(params.is_empty());

        let (sql, params) = Where::eq("email", SqlValue::Null)
            .and(Where::eq("age", 3))
            .to_sql();
        assert_eq!(sql, "(email IS NULL) AND (age = ?)");
        assert_eq!(params, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_empty_criteria() {
        let empty = Where::none();
        assert!(empty.is_empty());
        assert_eq!(empty.to_sql(), (String::new(), Vec::new()));

        let leaf = Where::eq("a", 1);
        assert_eq!(Where::none().and(leaf.clone()), leaf);
        assert_eq!(leaf.clone().or(Where::none()), leaf);
        assert!(Where::any(Vec::new()).is_empty());
    }

    #[test]
    fn test_combining_leaves_operands_intact() {
        let left = Where::eq("a", 1);
        let right = Where::eq("b", 2);
        let both = left.clone().and(right.clone());
        assert_eq!(left.to_sql().0, "a = ?");
        assert_eq!(right.to_sql().0, "b = ?");
        assert_eq!(both.to_sql().0, "(a = ?) AND (b = ?)");
    }

    #[test]
    fn test_any_folds_left_to_right() {
        let (sql, params) = Where::any([Where::eq("a", 1), Where::eq("a", 2), Where::eq("a", 3)]).to_sql();
        assert_eq!(sql, "((a = ?) OR (a = ?)) OR (a = ?)");
        assert_eq!(
            params,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }
}
