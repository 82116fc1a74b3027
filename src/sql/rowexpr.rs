//! Row-clause parser: the things that can appear in a SELECT list or
//! `{ ... }` row literal.
//!
//! Five forms, tried in order: `COLUMN EXPR (...)` generated columns,
//! a wildcard with optional EXCLUDING and rename, the `name : expr`
//! shorthand, the `prefix* : prefix2*` rename shorthand (folded into
//! the wildcard form), and a general value expression with an optional
//! AS name.

use super::ast::{ExprKind, SortOrder, SqlExpr, WildcardExclusion};
use super::lexer::ParseContext;
use super::parser::{parse_expr, STARTING_PRECEDENCE};
use crate::error::Result;
use crate::value::{ColumnPath, Value};

pub fn parse_row_clause(ctx: &mut ParseContext) -> Result<SqlExpr> {
    ctx.skip_whitespace();
    let start = ctx.pos();

    if ctx.match_keyword("COLUMN EXPR") {
        return parse_generated_columns(ctx, start);
    }

    if let Some(wildcard) = try_parse_wildcard(ctx, start)? {
        return Ok(wildcard);
    }

    // name : expr shorthand
    let saved = ctx.save();
    if let Some(name) = ctx.match_column_path()? {
        ctx.skip_whitespace();
        if ctx.match_literal(":") {
            let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
            return Ok(SqlExpr::new(
                ctx.captured_since(start),
                ExprKind::NamedColumn {
                    name,
                    expr: Box::new(expr),
                },
            ));
        }
    }
    ctx.restore(saved);

    // general expression, named explicitly or by default
    let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
    let name = if ctx.match_keyword("AS") {
        ctx.skip_whitespace();
        ctx.match_column_path()?
            .ok_or_else(|| ctx.error("expected column name after AS"))?
    } else {
        default_name(&expr)
    };
    Ok(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::NamedColumn {
            name,
            expr: Box::new(expr),
        },
    ))
}

/// A bare column read is named by its own path; anything else by its
/// surface text as a single path element.
fn default_name(expr: &SqlExpr) -> ColumnPath {
    match &expr.kind {
        ExprKind::Column(path) => path.clone(),
        _ => ColumnPath::single(expr.surface.clone()),
    }
}

/// `prefix*`, possibly with EXCLUDING (...) and an `AS rename*` or
/// `: rename*` suffix. Backtracks fully when the star turns out to be
/// multiplication.
fn try_parse_wildcard(ctx: &mut ParseContext, start: usize) -> Result<Option<SqlExpr>> {
    let saved = ctx.save();

    let prefix = match ctx.match_column_path()? {
        Some(path) => {
            // the star must be adjacent to the prefix (or its dot)
            if !ctx.match_literal("*") {
                ctx.restore(saved);
                return Ok(None);
            }
            path
        }
        None => {
            if !ctx.match_literal("*") {
                ctx.restore(saved);
                return Ok(None);
            }
            ColumnPath::empty()
        }
    };

    if !wildcard_context_follows(ctx) {
        ctx.restore(saved);
        return Ok(None);
    }

    let mut exclusions = Vec::new();
    if ctx.match_keyword("EXCLUDING") {
        ctx.skip_whitespace();
        if !ctx.match_literal("(") {
            return Err(ctx.error("expected '(' after EXCLUDING"));
        }
        loop {
            ctx.skip_whitespace();
            let path = ctx
                .match_column_path()?
                .ok_or_else(|| ctx.error("expected column name in EXCLUDING list"))?;
            let is_wildcard = ctx.match_literal("*");
            exclusions.push(WildcardExclusion {
                prefix: path,
                is_wildcard,
            });
            ctx.skip_whitespace();
            if ctx.match_literal(",") {
                continue;
            }
            if ctx.match_literal(")") {
                break;
            }
            return Err(ctx.error("expected ',' or ')' in EXCLUDING list"));
        }
    }

    let rename = if ctx.match_keyword("AS") || {
        ctx.skip_whitespace();
        ctx.match_literal(":")
    } {
        ctx.skip_whitespace();
        let path = ctx.match_column_path()?.unwrap_or_else(ColumnPath::empty);
        if !ctx.match_literal("*") {
            return Err(ctx.error("expected '*' ending a wildcard rename prefix"));
        }
        Some(path)
    } else {
        None
    };

    Ok(Some(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::Wildcard {
            prefix,
            rename,
            exclusions,
        },
    )))
}

/// What may legitimately follow a wildcard; anything else means the
/// star was multiplication.
fn wildcard_context_follows(ctx: &mut ParseContext) -> bool {
    let saved = ctx.save();
    ctx.skip_whitespace();
    let ok = ctx.eof()
        || matches!(
            ctx.peek_char(),
            Some(',') | Some(')') | Some('}') | Some(']') | Some(':')
        )
        || [
            "AS",
            "EXCLUDING",
            "NAMED",
            "FROM",
            "WHERE",
            "GROUP BY",
            "HAVING",
            "LIMIT",
            "OFFSET",
        ]
        .iter()
        .any(|kw| ctx.peek_keyword(kw));
    ctx.restore(saved);
    ok
}

/// `COLUMN EXPR ( [SELECT e] [AS e] [WHERE e] [ORDER BY ...]
/// [OFFSET n] [LIMIT n] )`; the defaults pass every column through
/// under its own name.
fn parse_generated_columns(ctx: &mut ParseContext, start: usize) -> Result<SqlExpr> {
    ctx.skip_whitespace();
    if !ctx.match_literal("(") {
        return Err(ctx.error("expected '(' after COLUMN EXPR"));
    }

    let select = if ctx.match_keyword("SELECT") {
        parse_expr(ctx, STARTING_PRECEDENCE)?
    } else {
        builtin_call("value()", "value")
    };
    let name = if ctx.match_keyword("AS") {
        parse_expr(ctx, STARTING_PRECEDENCE)?
    } else {
        builtin_call("columnPath()", "columnPath")
    };
    if ctx.peek_keyword("WHEN") {
        return Err(ctx.error("WHEN is not supported in a COLUMN EXPR"));
    }
    let where_clause = if ctx.match_keyword("WHERE") {
        parse_expr(ctx, STARTING_PRECEDENCE)?
    } else {
        SqlExpr::constant_true()
    };
    let order_by = if ctx.match_keyword("ORDER BY") {
        super::statement::parse_order_by_items(ctx)?
    } else {
        vec![(SqlExpr::constant_one(), SortOrder::Ascending)]
    };
    let offset = if ctx.match_keyword("OFFSET") {
        parse_u64(ctx, "OFFSET")?
    } else {
        0
    };
    let limit = if ctx.match_keyword("LIMIT") {
        Some(parse_u64(ctx, "LIMIT")?)
    } else {
        None
    };

    ctx.skip_whitespace();
    if !ctx.match_literal(")") {
        return Err(ctx.error("expected ')' closing COLUMN EXPR"));
    }

    Ok(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::GeneratedColumns {
            select: Box::new(select),
            name: Box::new(name),
            where_clause: Box::new(where_clause),
            order_by,
            offset,
            limit,
        },
    ))
}

fn builtin_call(surface: &str, name: &str) -> SqlExpr {
    SqlExpr::new(
        surface,
        ExprKind::Function {
            table: None,
            name: name.to_string(),
            args: Vec::new(),
            extract: None,
        },
    )
}

pub(crate) fn parse_u64(ctx: &mut ParseContext, what: &str) -> Result<u64> {
    ctx.skip_whitespace();
    match ctx.match_constant()? {
        Some(Value::Int(i)) if i >= 0 => Ok(i as u64),
        _ => Err(ctx.error(format!("expected a non-negative integer after {}", what))),
    }
}
