//! Expression syntax tree.
//!
//! Every node keeps the trimmed surface text it was parsed from, so
//! diagnostics and printing can quote the user's own syntax. Nodes are
//! immutable once parsed; binding walks them bottom-up.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::statement::SelectStatement;
use crate::binding::unbound::UnboundEntities;
use crate::registry::{ExternalAggregator, Registry};
use crate::value::{ColumnPath, Value};

/// Sort direction for ORDER BY items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One item excluded by a wildcard's EXCLUDING list; either an exact
/// column or a prefix wildcard.
#[derive(Debug, Clone, PartialEq)]
pub struct WildcardExclusion {
    pub prefix: ColumnPath,
    pub is_wildcard: bool,
}

/// The right-hand side of an IN expression.
#[derive(Debug, Clone, PartialEq)]
pub enum InItems {
    /// `x IN (a, b, c)`
    Tuple(Vec<SqlExpr>),
    /// `x IN (SELECT ...)`, with the sub-select fully parsed.
    Subtable(Box<SelectStatement>),
    /// `x IN (KEYS OF expr)`
    KeysOf(Box<SqlExpr>),
    /// `x IN (VALUES OF expr)`
    ValuesOf(Box<SqlExpr>),
}

/// Type names checkable with `IS [NOT] ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheck {
    Null,
    True,
    False,
    String,
    Number,
    Integer,
    Timestamp,
    Interval,
}

impl TypeCheck {
    pub fn name(&self) -> &'static str {
        match self {
            TypeCheck::Null => "NULL",
            TypeCheck::True => "TRUE",
            TypeCheck::False => "FALSE",
            TypeCheck::String => "STRING",
            TypeCheck::Number => "NUMBER",
            TypeCheck::Integer => "INTEGER",
            TypeCheck::Timestamp => "TIMESTAMP",
            TypeCheck::Interval => "INTERVAL",
        }
    }
}

/// A parsed expression node with its captured surface text.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlExpr {
    pub surface: String,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Value),
    /// A column read, possibly dotted.
    Column(ColumnPath),
    /// `$1` or `$name` query parameter.
    Parameter(String),
    /// Function call, optionally table-qualified, optionally followed by
    /// an `[extract]` sub-expression evaluated over the function result.
    Function {
        table: Option<String>,
        name: String,
        args: Vec<SqlExpr>,
        extract: Option<Box<SqlExpr>>,
    },
    /// `~x`, `-x`, `+x`, `NOT x`.
    Unary { op: &'static str, expr: Box<SqlExpr> },
    /// Arithmetic, bitwise, comparison and logical binary operators.
    Binary {
        op: &'static str,
        lhs: Box<SqlExpr>,
        rhs: Box<SqlExpr>,
    },
    /// `CAST (expr AS type)`.
    Cast { expr: Box<SqlExpr>, target: String },
    /// Searched or simple CASE.
    Case {
        expr: Option<Box<SqlExpr>>,
        when_clauses: Vec<(SqlExpr, SqlExpr)>,
        else_clause: Option<Box<SqlExpr>>,
    },
    Between {
        expr: Box<SqlExpr>,
        lower: Box<SqlExpr>,
        upper: Box<SqlExpr>,
        negated: bool,
    },
    In {
        expr: Box<SqlExpr>,
        items: InItems,
        negated: bool,
    },
    Like {
        expr: Box<SqlExpr>,
        pattern: Box<SqlExpr>,
        negated: bool,
    },
    IsType {
        expr: Box<SqlExpr>,
        type_check: TypeCheck,
        negated: bool,
    },
    /// `{ a: 1, x.* }` row literal; elements are row clauses.
    RowLiteral(Vec<SqlExpr>),
    /// `[1, 2, 3]` embedding literal.
    Embedding(Vec<SqlExpr>),
    /// `prefix*` with optional `AS rename` and EXCLUDING list.
    Wildcard {
        prefix: ColumnPath,
        rename: Option<ColumnPath>,
        exclusions: Vec<WildcardExclusion>,
    },
    /// `name : expr` or `expr AS name`.
    NamedColumn {
        name: ColumnPath,
        expr: Box<SqlExpr>,
    },
    /// `COLUMN EXPR (...)` generated-column clause.
    GeneratedColumns {
        select: Box<SqlExpr>,
        name: Box<SqlExpr>,
        where_clause: Box<SqlExpr>,
        order_by: Vec<(SqlExpr, SortOrder)>,
        offset: u64,
        limit: Option<u64>,
    },
}

impl SqlExpr {
    pub fn new(surface: impl Into<String>, kind: ExprKind) -> Self {
        let surface = surface.into();
        debug_assert!(!surface.is_empty(), "expression node with empty surface");
        SqlExpr { surface, kind }
    }

    /// The constant `true`, used as a default for optional clauses.
    pub fn constant_true() -> Self {
        SqlExpr::new("true", ExprKind::Constant(Value::Bool(true)))
    }

    /// The constant `1`, the default ORDER BY of a generated column.
    pub fn constant_one() -> Self {
        SqlExpr::new("1", ExprKind::Constant(Value::Int(1)))
    }

    pub fn is_constant_kind(&self, value: &Value) -> bool {
        matches!(&self.kind, ExprKind::Constant(v) if v == value)
    }

    pub fn is_constant_true(&self) -> bool {
        self.is_constant()
            && matches!(&self.kind, ExprKind::Constant(v) if v.is_true())
    }

    pub fn is_constant_false(&self) -> bool {
        self.is_constant()
            && matches!(&self.kind, ExprKind::Constant(v) if v.is_false())
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&SqlExpr> {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::Column(_) | ExprKind::Parameter(_) => Vec::new(),
            ExprKind::Function { args, extract, .. } => {
                let mut out: Vec<&SqlExpr> = args.iter().collect();
                if let Some(e) = extract {
                    out.push(e);
                }
                out
            }
            ExprKind::Unary { expr, .. } => vec![expr],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Cast { expr, .. } => vec![expr],
            ExprKind::Case {
                expr,
                when_clauses,
                else_clause,
            } => {
                let mut out = Vec::new();
                if let Some(e) = expr {
                    out.push(e.as_ref());
                }
                for (w, t) in when_clauses {
                    out.push(w);
                    out.push(t);
                }
                if let Some(e) = else_clause {
                    out.push(e.as_ref());
                }
                out
            }
            ExprKind::Between {
                expr, lower, upper, ..
            } => vec![expr, lower, upper],
            ExprKind::In { expr, items, .. } => {
                let mut out: Vec<&SqlExpr> = vec![expr];
                match items {
                    InItems::Tuple(list) => out.extend(list.iter()),
                    InItems::KeysOf(e) | InItems::ValuesOf(e) => out.push(e),
                    InItems::Subtable(_) => {}
                }
                out
            }
            ExprKind::Like { expr, pattern, .. } => vec![expr, pattern],
            ExprKind::IsType { expr, .. } => vec![expr],
            ExprKind::RowLiteral(clauses) => clauses.iter().collect(),
            ExprKind::Embedding(items) => items.iter().collect(),
            ExprKind::Wildcard { .. } => Vec::new(),
            ExprKind::NamedColumn { expr, .. } => vec![expr],
            ExprKind::GeneratedColumns {
                select,
                name,
                where_clause,
                order_by,
                ..
            } => {
                let mut out = vec![select.as_ref(), name.as_ref(), where_clause.as_ref()];
                out.extend(order_by.iter().map(|(e, _)| e));
                out
            }
        }
    }

    /// True when the expression can be evaluated with no row context.
    /// Function calls are never assumed constant; their semantics live
    /// in whatever scope or registry resolves them.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Constant(_) => true,
            ExprKind::Column(_)
            | ExprKind::Parameter(_)
            | ExprKind::Function { .. }
            | ExprKind::Wildcard { .. }
            | ExprKind::GeneratedColumns { .. } => false,
            ExprKind::In {
                items: InItems::Subtable(_),
                ..
            } => false,
            _ => self.children().iter().all(|c| c.is_constant()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind, ExprKind::Wildcard { .. })
    }

    /// True for an unqualified call to a registered aggregate function.
    pub fn is_aggregator(&self, aggregators: &Registry<ExternalAggregator>) -> bool {
        match &self.kind {
            ExprKind::Function { table: None, name, .. } => aggregators.contains(name),
            _ => false,
        }
    }

    /// All entities this expression needs from its environment.
    pub fn get_unbound(&self) -> UnboundEntities {
        let mut out = UnboundEntities::default();
        self.collect_unbound(&mut out);
        out
    }

    pub fn collect_unbound(&self, out: &mut UnboundEntities) {
        match &self.kind {
            ExprKind::Column(path) => {
                out.add_column(path.to_string());
            }
            ExprKind::Parameter(name) => {
                out.add_param(name.clone());
            }
            ExprKind::Wildcard { prefix, .. } => {
                out.add_wildcard(prefix.to_string());
            }
            ExprKind::In {
                expr,
                items: InItems::Subtable(statement),
                ..
            } => {
                expr.collect_unbound(out);
                out.merge(statement.get_unbound());
            }
            ExprKind::Function {
                table, name, args, extract,
            } => {
                let mut arg_names = Vec::new();
                for arg in args {
                    arg.collect_unbound(out);
                    arg_names.push(arg.surface.clone());
                }
                match table {
                    Some(t) => {
                        out.add_table_function(t.clone(), name.clone(), args.len(), arg_names)
                    }
                    None => out.add_function(name.clone(), args.len(), arg_names),
                }
                if let Some(e) = extract {
                    e.collect_unbound(out);
                }
            }
            _ => {
                for child in self.children() {
                    child.collect_unbound(out);
                }
            }
        }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.surface)
    }
}

impl Serialize for SqlExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.surface)
    }
}

impl<'de> Deserialize<'de> for SqlExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::sql::parser::parse_expression(&text).map_err(D::Error::custom)
    }
}

/// Breadth-first scan of a clause list for aggregator calls.
///
/// Children of non-aggregator nodes are re-injected into the scan right
/// after their parent, so aggregators are found at any depth while the
/// arguments of an aggregator itself are not descended into (count(*)
/// may legitimately contain a wildcard). A wildcard outside any
/// aggregator cannot be grouped, which is an error as soon as grouping
/// is in play.
pub fn find_aggregators<'a>(
    clauses: &[&'a SqlExpr],
    with_group_by: bool,
    aggregators: &Registry<ExternalAggregator>,
) -> crate::error::Result<Vec<&'a SqlExpr>> {
    let mut queue: Vec<&'a SqlExpr> = clauses.to_vec();
    let mut found: Vec<&'a SqlExpr> = Vec::new();
    let mut loose_wildcard: Option<&'a SqlExpr> = None;

    let mut i = 0;
    while i < queue.len() {
        let node = queue[i];
        if node.is_aggregator(aggregators) {
            found.push(node);
        } else if node.is_wildcard() {
            if loose_wildcard.is_none() {
                loose_wildcard = Some(node);
            }
        } else {
            let children = node.children();
            let mut rest = queue.split_off(i + 1);
            queue.extend(children);
            queue.append(&mut rest);
        }
        i += 1;
    }

    if let Some(wildcard) = loose_wildcard {
        if with_group_by {
            return Err(crate::error::SqlError::semantic(
                format!(
                    "Non-aggregator '{}' with GROUP BY clause is not allowed",
                    wildcard.surface
                ),
                wildcard.surface.clone(),
            ));
        }
        if !found.is_empty() {
            return Err(crate::error::SqlError::semantic(
                format!(
                    "Mixing non-aggregator '{}' with aggregators is not allowed",
                    wildcard.surface
                ),
                wildcard.surface.clone(),
            ));
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::parse_expression;

    #[test]
    fn test_is_constant() {
        let e = parse_expression("1 + 2 * 3").unwrap();
        assert!(e.is_constant());

        let e = parse_expression("x + 1").unwrap();
        assert!(!e.is_constant());

        let e = parse_expression("sqrt(4)").unwrap();
        assert!(!e.is_constant());

        let e = parse_expression("CASE WHEN true THEN 1 ELSE 2 END").unwrap();
        assert!(e.is_constant());
    }

    #[test]
    fn test_surface_is_trimmed_input() {
        let e = parse_expression("  a +  b ").unwrap();
        assert_eq!(e.surface, "a +  b");
        assert_eq!(e.to_string(), "a +  b");
    }

    #[test]
    fn test_children_order() {
        let e = parse_expression("a BETWEEN b AND c").unwrap();
        let kids = e.children();
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0].surface, "a");
        assert_eq!(kids[1].surface, "b");
        assert_eq!(kids[2].surface, "c");
    }

    #[test]
    fn test_get_unbound_basics() {
        let e = parse_expression("x + y.z + $p + f(a) + t.g(b)").unwrap();
        let unbound = e.get_unbound();
        assert!(unbound.columns.contains("x"));
        assert!(unbound.columns.contains("y.z"));
        assert!(unbound.params.contains("p"));
        assert!(unbound.functions.contains_key("f"));
        assert!(unbound.tables.contains_key("t"));
        assert!(unbound.tables["t"].functions.contains_key("g"));
    }

    #[test]
    fn test_in_subtable_contributes_unbound() {
        let e = parse_expression("x IN (SELECT t.a, free FROM ds AS t)").unwrap();
        let unbound = e.get_unbound();
        assert!(unbound.columns.contains("x"));
        // the sub-select resolves its own alias but not the rest
        assert!(!unbound.columns.contains("t.a"));
        assert!(unbound.columns.contains("free"));
    }
}
