//! Compound clauses and the full SELECT statement.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ast::{ExprKind, SortOrder, SqlExpr};
use super::lexer::ParseContext;
use super::parser::{parse_expr, STARTING_PRECEDENCE};
use super::rowexpr::{parse_row_clause, parse_u64};
use super::table::{parse_table_expression, TableExpression};
use crate::binding::unbound::UnboundEntities;
use crate::error::Result;
use crate::value::Value;

/// `expr [ASC|DESC], ...` with ASC the default.
pub fn parse_order_by_items(ctx: &mut ParseContext) -> Result<Vec<(SqlExpr, SortOrder)>> {
    let mut items = Vec::new();
    loop {
        let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
        let direction = if ctx.match_keyword("DESC") {
            SortOrder::Descending
        } else {
            ctx.match_keyword("ASC");
            SortOrder::Ascending
        };
        items.push((expr, direction));
        ctx.skip_whitespace();
        if !ctx.match_literal(",") {
            break;
        }
    }
    Ok(items)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderByExpression {
    pub clauses: Vec<(SqlExpr, SortOrder)>,
}

impl OrderByExpression {
    pub fn parse(text: &str) -> Result<Self> {
        let mut ctx = ParseContext::new(text);
        let clauses = parse_order_by_items(&mut ctx)?;
        ctx.expect_eof("Unexpected characters at end of ORDER BY expression")?;
        Ok(OrderByExpression { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `rowHash() ASC`: a deterministic but arbitrary stable order.
    pub fn row_hash() -> Self {
        let call = SqlExpr::new(
            "rowHash()",
            ExprKind::Function {
                table: None,
                name: "rowHash".to_string(),
                args: Vec::new(),
                extract: None,
            },
        );
        OrderByExpression {
            clauses: vec![(call, SortOrder::Ascending)],
        }
    }

    pub fn get_unbound(&self) -> UnboundEntities {
        let mut out = UnboundEntities::default();
        for (expr, _) in &self.clauses {
            out.merge(expr.get_unbound());
        }
        out
    }
}

impl fmt::Display for OrderByExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (expr, direction)) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let dir = match direction {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            write!(f, "{} {}", expr.surface, dir)?;
        }
        Ok(())
    }
}

impl Serialize for OrderByExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderByExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        OrderByExpression::parse(&text).map_err(D::Error::custom)
    }
}

/// A comma-separated list of value expressions; the GROUP BY clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TupleExpression {
    pub clauses: Vec<SqlExpr>,
}

impl TupleExpression {
    pub fn parse(text: &str) -> Result<Self> {
        let mut ctx = ParseContext::new(text);
        let tuple = Self::parse_inner(&mut ctx)?;
        ctx.expect_eof("Unexpected characters at end of tuple expression")?;
        Ok(tuple)
    }

    pub fn parse_inner(ctx: &mut ParseContext) -> Result<Self> {
        let mut clauses = Vec::new();
        loop {
            clauses.push(parse_expr(ctx, STARTING_PRECEDENCE)?);
            ctx.skip_whitespace();
            if !ctx.match_literal(",") {
                break;
            }
        }
        Ok(TupleExpression { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn get_unbound(&self) -> UnboundEntities {
        let mut out = UnboundEntities::default();
        for clause in &self.clauses {
            out.merge(clause.get_unbound());
        }
        out
    }
}

impl fmt::Display for TupleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let surfaces: Vec<&str> = self.clauses.iter().map(|c| c.surface.as_str()).collect();
        f.write_str(&surfaces.join(", "))
    }
}

impl Serialize for TupleExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TupleExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        TupleExpression::parse(&text).map_err(D::Error::custom)
    }
}

/// The SELECT list: row clauses producing the output row.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpression {
    pub clauses: Vec<SqlExpr>,
    pub surface: String,
}

impl SelectExpression {
    pub fn parse(text: &str) -> Result<Self> {
        let mut ctx = ParseContext::new(text);
        let select = Self::parse_inner(&mut ctx)?;
        ctx.expect_eof("Unexpected characters at end of select expression")?;
        Ok(select)
    }

    pub fn parse_inner(ctx: &mut ParseContext) -> Result<Self> {
        ctx.skip_whitespace();
        let start = ctx.pos();
        let mut clauses = Vec::new();
        loop {
            clauses.push(parse_row_clause(ctx)?);
            ctx.skip_whitespace();
            if !ctx.match_literal(",") {
                break;
            }
        }
        Ok(SelectExpression {
            clauses,
            surface: ctx.captured_since(start),
        })
    }

    /// `SELECT *`.
    pub fn star() -> Self {
        SelectExpression {
            clauses: vec![SqlExpr::new(
                "*",
                ExprKind::Wildcard {
                    prefix: crate::value::ColumnPath::empty(),
                    rename: None,
                    exclusions: Vec::new(),
                },
            )],
            surface: "*".to_string(),
        }
    }

    pub fn get_unbound(&self) -> UnboundEntities {
        let mut out = UnboundEntities::default();
        for clause in &self.clauses {
            out.merge(clause.get_unbound());
        }
        out
    }
}

impl fmt::Display for SelectExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.surface)
    }
}

impl Serialize for SelectExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.surface)
    }
}

impl<'de> Deserialize<'de> for SelectExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SelectExpression::parse(&text).map_err(D::Error::custom)
    }
}

/// The WHEN clause: a boolean over tuple timestamps selecting which
/// cells of each row survive.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenExpression {
    pub when: SqlExpr,
}

impl WhenExpression {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(WhenExpression {
            when: super::parser::parse_expression(text)?,
        })
    }

    /// The default: keep everything.
    pub fn always_true() -> Self {
        WhenExpression {
            when: SqlExpr::constant_true(),
        }
    }

    pub fn get_unbound(&self) -> UnboundEntities {
        self.when.get_unbound()
    }
}

impl fmt::Display for WhenExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.when.surface)
    }
}

impl Serialize for WhenExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.when.surface)
    }
}

impl<'de> Deserialize<'de> for WhenExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        WhenExpression::parse(&text).map_err(D::Error::custom)
    }
}

/// A complete SELECT statement with every clause defaulted when
/// absent.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub select: SelectExpression,
    /// NAMED clause: the output row's name.
    pub named: SqlExpr,
    pub from: Option<TableExpression>,
    pub when: WhenExpression,
    pub where_clause: SqlExpr,
    pub group_by: TupleExpression,
    pub having: SqlExpr,
    pub order_by: OrderByExpression,
    pub offset: u64,
    pub limit: Option<u64>,
    pub surface: String,
}

impl SelectStatement {
    pub fn parse(text: &str) -> Result<Self> {
        let mut ctx = ParseContext::new(text);
        let statement = Self::parse_inner(&mut ctx)?;
        ctx.expect_eof("Unexpected characters at end of SELECT statement")?;
        Ok(statement)
    }

    /// Parse without requiring end of input; used for sub-SELECTs.
    pub fn parse_inner(ctx: &mut ParseContext) -> Result<Self> {
        ctx.skip_whitespace();
        let start = ctx.pos();
        ctx.expect_keyword("SELECT", "expected SELECT")?;

        let select = SelectExpression::parse_inner(ctx)?;

        let named = if ctx.match_keyword("NAMED") {
            Some(parse_expr(ctx, STARTING_PRECEDENCE)?)
        } else {
            None
        };

        let from = if ctx.match_keyword("FROM") {
            Some(parse_table_expression(ctx)?)
        } else {
            None
        };

        let when = if from.is_some() && ctx.match_keyword("WHEN") {
            WhenExpression {
                when: parse_expr(ctx, STARTING_PRECEDENCE)?,
            }
        } else {
            WhenExpression::always_true()
        };

        let where_clause = if ctx.match_keyword("WHERE") {
            parse_expr(ctx, STARTING_PRECEDENCE)?
        } else {
            SqlExpr::constant_true()
        };

        let group_by = if ctx.match_keyword("GROUP BY") {
            TupleExpression::parse_inner(ctx)?
        } else {
            TupleExpression::default()
        };

        let having = if ctx.match_keyword("HAVING") {
            parse_expr(ctx, STARTING_PRECEDENCE)?
        } else {
            SqlExpr::constant_true()
        };

        let order_by = if ctx.match_keyword("ORDER BY") {
            OrderByExpression {
                clauses: parse_order_by_items(ctx)?,
            }
        } else {
            OrderByExpression::default()
        };

        let limit = if ctx.match_keyword("LIMIT") {
            Some(parse_u64(ctx, "LIMIT")?)
        } else {
            None
        };

        let offset = if ctx.match_keyword("OFFSET") {
            parse_u64(ctx, "OFFSET")?
        } else {
            0
        };

        // a query over a dataset is named by its row; a free-standing
        // expression gets the fixed name 'result'
        let named = named.unwrap_or_else(|| {
            if from.is_some() {
                SqlExpr::new(
                    "rowPath()",
                    ExprKind::Function {
                        table: None,
                        name: "rowPath".to_string(),
                        args: Vec::new(),
                        extract: None,
                    },
                )
            } else {
                SqlExpr::new(
                    "'result'",
                    ExprKind::Constant(Value::String("result".to_string())),
                )
            }
        });

        Ok(SelectStatement {
            select,
            named,
            from,
            when,
            where_clause,
            group_by,
            having,
            order_by,
            offset,
            limit,
            surface: ctx.captured_since(start),
        })
    }

    /// Everything the statement needs from outside its own FROM.
    pub fn get_unbound(&self) -> UnboundEntities {
        let mut clause_side = UnboundEntities::default();
        clause_side.merge(self.select.get_unbound());
        clause_side.merge(self.named.get_unbound());
        clause_side.merge(self.when.get_unbound());
        clause_side.merge(self.where_clause.get_unbound());
        clause_side.merge(self.group_by.get_unbound());
        clause_side.merge(self.having.get_unbound());
        clause_side.merge(self.order_by.get_unbound());

        let mut out = UnboundEntities::default();
        match &self.from {
            Some(from) => {
                out.merge(from.get_unbound());
                out.merge_filtered(clause_side, &from.table_names());
            }
            None => out.merge(clause_side),
        }
        out
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.surface)
    }
}

impl Serialize for SelectStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.surface)
    }
}

impl<'de> Deserialize<'de> for SelectStatement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SelectStatement::parse(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_statement_defaults() {
        let s = SelectStatement::parse("SELECT 1 + 1").unwrap();
        assert!(s.from.is_none());
        assert_eq!(s.named.surface, "'result'");
        assert!(s.when.when.is_constant_true());
        assert!(s.where_clause.is_constant_true());
        assert!(s.having.is_constant_true());
        assert!(s.group_by.is_empty());
        assert!(s.order_by.is_empty());
        assert_eq!(s.offset, 0);
        assert_eq!(s.limit, None);
    }

    #[test]
    fn test_from_defaults_named_to_row_path() {
        let s = SelectStatement::parse("SELECT * FROM ds").unwrap();
        assert_eq!(s.named.surface, "rowPath()");
    }

    #[test]
    fn test_full_statement() {
        let s = SelectStatement::parse(
            "SELECT x, sum(y) AS total NAMED x FROM ds WHEN timestamp() < now \
             WHERE x > 0 GROUP BY x HAVING sum(y) > 10 ORDER BY x DESC LIMIT 5 OFFSET 2",
        )
        .unwrap();
        assert_eq!(s.select.clauses.len(), 2);
        assert!(s.from.is_some());
        assert!(!s.when.when.is_constant_true());
        assert_eq!(s.group_by.clauses.len(), 1);
        assert_eq!(s.order_by.clauses.len(), 1);
        assert_eq!(s.limit, Some(5));
        assert_eq!(s.offset, 2);
    }

    #[test]
    fn test_when_requires_from() {
        // without FROM the WHEN keyword is not consumed, so parsing
        // the full text fails cleanly
        assert!(SelectStatement::parse("SELECT 1 WHEN true").is_err());
    }

    #[test]
    fn test_statement_unbound_filters_from_aliases() {
        let s = SelectStatement::parse("SELECT t.x, free FROM ds AS t").unwrap();
        let unbound = s.get_unbound();
        assert!(!unbound.columns.contains("t.x"));
        assert!(unbound.columns.contains("free"));
    }

    #[test]
    fn test_order_by_display_round_trip() {
        let o = OrderByExpression::parse("x DESC, y").unwrap();
        assert_eq!(o.to_string(), "x DESC, y ASC");
        let again = OrderByExpression::parse(&o.to_string()).unwrap();
        assert_eq!(o, again);
    }

    #[test]
    fn test_row_hash_order() {
        let o = OrderByExpression::row_hash();
        assert_eq!(o.to_string(), "rowHash() ASC");
    }

    #[test]
    fn test_select_star_constant() {
        let star = SelectExpression::star();
        assert_eq!(star.surface, "*");
        assert!(star.clauses[0].is_wildcard());
    }
}
