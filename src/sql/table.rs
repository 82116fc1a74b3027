//! Table expressions: what can appear after FROM.
//!
//! Datasets by name, dataset functions with an optional trailing
//! options object, `row_dataset(...)` for turning a row into a
//! one-column-per-row table, parenthesized sub-SELECTs, and joins
//! folded left to right.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ast::{ExprKind, SqlExpr};
use super::lexer::ParseContext;
use super::parser::{parse_expr, STARTING_PRECEDENCE};
use super::statement::SelectStatement;
use crate::binding::unbound::UnboundEntities;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinQualification {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableExpression {
    pub surface: String,
    pub kind: TableKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    /// A dataset referenced by name.
    Dataset { name: String, alias: Option<String> },
    /// `fn(arg, ..., {options})` producing a dataset; the options
    /// object, when present, must be the last argument.
    DatasetFunction {
        name: String,
        args: Vec<SqlExpr>,
        options: Option<SqlExpr>,
        alias: Option<String>,
    },
    /// `row_dataset(expr) AS name`: one output row per column of the
    /// row value.
    RowDataset { expr: SqlExpr, alias: String },
    /// A parenthesized sub-SELECT.
    SubSelect {
        statement: Box<SelectStatement>,
        alias: Option<String>,
    },
    Join {
        left: Box<TableExpression>,
        right: Box<TableExpression>,
        on: Option<SqlExpr>,
        qualification: JoinQualification,
    },
}

impl TableExpression {
    pub fn parse(text: &str) -> Result<TableExpression> {
        let mut ctx = ParseContext::new(text);
        let table = parse_table_expression(&mut ctx)?;
        ctx.expect_eof("Unexpected characters at end of table expression")?;
        Ok(table)
    }

    /// The alias (or name, for an unaliased dataset) each side of this
    /// expression makes visible.
    pub fn table_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_table_names(&mut names);
        names
    }

    fn collect_table_names(&self, out: &mut BTreeSet<String>) {
        match &self.kind {
            TableKind::Dataset { name, alias } => {
                out.insert(alias.clone().unwrap_or_else(|| name.clone()));
            }
            TableKind::DatasetFunction { name, alias, .. } => {
                out.insert(alias.clone().unwrap_or_else(|| name.clone()));
            }
            TableKind::RowDataset { alias, .. } => {
                out.insert(alias.clone());
            }
            TableKind::SubSelect { alias, .. } => {
                if let Some(a) = alias {
                    out.insert(a.clone());
                }
            }
            TableKind::Join { left, right, .. } => {
                left.collect_table_names(out);
                right.collect_table_names(out);
            }
        }
    }

    /// What this table expression needs from outside. A join resolves
    /// its own aliases, so references to them in the ON condition are
    /// not reported.
    pub fn get_unbound(&self) -> UnboundEntities {
        let mut out = UnboundEntities::default();
        match &self.kind {
            TableKind::Dataset { .. } => {}
            TableKind::DatasetFunction { args, options, .. } => {
                for arg in args {
                    out.merge(arg.get_unbound());
                }
                if let Some(o) = options {
                    out.merge(o.get_unbound());
                }
            }
            TableKind::RowDataset { expr, .. } => {
                out.merge(expr.get_unbound());
            }
            TableKind::SubSelect { statement, .. } => {
                out.merge(statement.get_unbound());
            }
            TableKind::Join {
                left, right, on, ..
            } => {
                out.merge(left.get_unbound());
                out.merge(right.get_unbound());
                if let Some(on) = on {
                    let known = self.table_names();
                    out.merge_filtered(on.get_unbound(), &known);
                }
            }
        }
        out
    }
}

impl fmt::Display for TableExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.surface)
    }
}

impl Serialize for TableExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.surface)
    }
}

impl<'de> Deserialize<'de> for TableExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        TableExpression::parse(&text).map_err(D::Error::custom)
    }
}

/// Joins fold left to right: `a JOIN b ON x JOIN c ON y` is
/// `(a JOIN b ON x) JOIN c ON y`.
pub fn parse_table_expression(ctx: &mut ParseContext) -> Result<TableExpression> {
    ctx.skip_whitespace();
    let start = ctx.pos();
    let mut left = parse_primary_table(ctx)?;

    while let Some(qualification) = match_join_qualification(ctx) {
        let right = parse_primary_table(ctx)?;
        let on = if ctx.match_keyword("ON") {
            Some(parse_expr(ctx, STARTING_PRECEDENCE)?)
        } else {
            None
        };
        left = TableExpression {
            surface: ctx.captured_since(start),
            kind: TableKind::Join {
                left: Box::new(left),
                right: Box::new(right),
                on,
                qualification,
            },
        };
    }

    Ok(left)
}

/// Longest qualification first, so `LEFT JOIN` does not shadow
/// `LEFT OUTER JOIN`.
pub fn match_join_qualification(ctx: &mut ParseContext) -> Option<JoinQualification> {
    let forms = [
        ("INNER JOIN", JoinQualification::Inner),
        ("LEFT OUTER JOIN", JoinQualification::Left),
        ("LEFT JOIN", JoinQualification::Left),
        ("RIGHT OUTER JOIN", JoinQualification::Right),
        ("RIGHT JOIN", JoinQualification::Right),
        ("FULL OUTER JOIN", JoinQualification::Full),
        ("FULL JOIN", JoinQualification::Full),
        ("OUTER JOIN", JoinQualification::Full),
        ("JOIN", JoinQualification::Inner),
    ];
    for (kw, q) in forms {
        if ctx.match_keyword(kw) {
            return Some(q);
        }
    }
    None
}

fn parse_primary_table(ctx: &mut ParseContext) -> Result<TableExpression> {
    ctx.skip_whitespace();
    let start = ctx.pos();

    if ctx.match_literal("(") {
        if ctx.peek_keyword("SELECT") {
            let statement = SelectStatement::parse_inner(ctx)?;
            ctx.skip_whitespace();
            if !ctx.match_literal(")") {
                return Err(ctx.error(
                    "Expected ')' to close a table expression; a sub-SELECT used as a \
                     table must be surrounded by parentheses",
                ));
            }
            let alias = parse_alias(ctx)?;
            return Ok(TableExpression {
                surface: ctx.captured_since(start),
                kind: TableKind::SubSelect {
                    statement: Box::new(statement),
                    alias,
                },
            });
        }
        let inner = parse_table_expression(ctx)?;
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' closing a parenthesized table expression"));
        }
        return Ok(TableExpression {
            surface: ctx.captured_since(start),
            kind: inner.kind,
        });
    }

    if ctx.match_keyword("row_dataset") {
        ctx.skip_whitespace();
        if !ctx.match_literal("(") {
            return Err(ctx.error("expected '(' after row_dataset"));
        }
        let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' closing row_dataset argument"));
        }
        ctx.expect_keyword("AS", "row_dataset(...) requires an AS <name> alias")?;
        ctx.skip_whitespace();
        let alias = ctx
            .match_identifier()?
            .ok_or_else(|| ctx.error("expected alias name after AS"))?;
        return Ok(TableExpression {
            surface: ctx.captured_since(start),
            kind: TableKind::RowDataset { expr, alias },
        });
    }

    ctx.skip_whitespace();
    let name = ctx
        .match_identifier()?
        .ok_or_else(|| ctx.error("expected a table expression"))?;

    if ctx.match_literal("(") {
        let mut args = Vec::new();
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            loop {
                args.push(parse_expr(ctx, STARTING_PRECEDENCE)?);
                ctx.skip_whitespace();
                if ctx.match_literal(",") {
                    continue;
                }
                if ctx.match_literal(")") {
                    break;
                }
                return Err(ctx.error("expected ',' or ')' in dataset function arguments"));
            }
        }
        // a row-literal options object is only legal as the last argument
        let options_misplaced = args
            .iter()
            .rev()
            .skip(1)
            .any(|a| matches!(a.kind, ExprKind::RowLiteral(_)));
        if options_misplaced {
            return Err(ctx.error(format!(
                "options to dataset function '{}' must be the last argument",
                name
            )));
        }
        let options = match args.last() {
            Some(last) if matches!(last.kind, ExprKind::RowLiteral(_)) => args.pop(),
            _ => None,
        };
        let alias = parse_alias(ctx)?;
        return Ok(TableExpression {
            surface: ctx.captured_since(start),
            kind: TableKind::DatasetFunction {
                name,
                args,
                options,
                alias,
            },
        });
    }

    let alias = parse_alias(ctx)?;
    Ok(TableExpression {
        surface: ctx.captured_since(start),
        kind: TableKind::Dataset { name, alias },
    })
}

fn parse_alias(ctx: &mut ParseContext) -> Result<Option<String>> {
    if ctx.match_keyword("AS") {
        ctx.skip_whitespace();
        let alias = ctx
            .match_identifier()?
            .ok_or_else(|| ctx.error("expected alias name after AS"))?;
        Ok(Some(alias))
    } else {
        Ok(None)
    }
}
