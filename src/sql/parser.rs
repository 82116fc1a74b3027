//! Value-expression parser: precedence climbing directly over the raw
//! text, with the captured surface attached to every node.

use super::ast::{ExprKind, InItems, SqlExpr, TypeCheck};
use super::lexer::ParseContext;
use crate::error::Result;
use crate::value::Value;

/// One row of the operator table.
struct Operator {
    token: &'static str,
    unary: bool,
    precedence: u32,
    handler: OpHandler,
}

enum OpHandler {
    Unary(&'static str),
    Binary(&'static str),
    /// Binary operator sugar for a builtin function call.
    BinaryFunction(&'static str),
    /// Unary keyword sugar for a builtin function call.
    UnaryFunction(&'static str),
    Unimplemented(&'static str),
}

/// Operators in match order. Multi-character operators sharing a prefix
/// come before their prefix; precedence tiers ascend.
const OPERATORS: &[Operator] = &[
    Operator { token: "~", unary: true, precedence: 1, handler: OpHandler::Unary("~") },
    Operator { token: "timestamp", unary: true, precedence: 1, handler: OpHandler::UnaryFunction("to_timestamp") },
    Operator { token: "@", unary: false, precedence: 2, handler: OpHandler::BinaryFunction("at") },
    Operator { token: "*", unary: false, precedence: 2, handler: OpHandler::Binary("*") },
    Operator { token: "/", unary: false, precedence: 2, handler: OpHandler::Binary("/") },
    Operator { token: "%", unary: false, precedence: 2, handler: OpHandler::Binary("%") },
    Operator { token: "+", unary: true, precedence: 3, handler: OpHandler::Unary("+") },
    Operator { token: "-", unary: true, precedence: 3, handler: OpHandler::Unary("-") },
    Operator { token: "+", unary: false, precedence: 3, handler: OpHandler::Binary("+") },
    Operator { token: "-", unary: false, precedence: 3, handler: OpHandler::Binary("-") },
    Operator { token: "&", unary: false, precedence: 3, handler: OpHandler::Binary("&") },
    Operator { token: "|", unary: false, precedence: 3, handler: OpHandler::Binary("|") },
    Operator { token: "^", unary: false, precedence: 3, handler: OpHandler::Binary("^") },
    Operator { token: "=", unary: false, precedence: 4, handler: OpHandler::Binary("=") },
    Operator { token: ">=", unary: false, precedence: 4, handler: OpHandler::Binary(">=") },
    Operator { token: "<=", unary: false, precedence: 4, handler: OpHandler::Binary("<=") },
    Operator { token: "<>", unary: false, precedence: 4, handler: OpHandler::Binary("<>") },
    Operator { token: "!=", unary: false, precedence: 4, handler: OpHandler::Binary("!=") },
    Operator { token: "!>", unary: false, precedence: 4, handler: OpHandler::Binary("!>") },
    Operator { token: "!<", unary: false, precedence: 4, handler: OpHandler::Binary("!<") },
    Operator { token: ">", unary: false, precedence: 4, handler: OpHandler::Binary(">") },
    Operator { token: "<", unary: false, precedence: 4, handler: OpHandler::Binary("<") },
    Operator { token: "NOT", unary: true, precedence: 5, handler: OpHandler::Unary("NOT") },
    Operator { token: "AND", unary: false, precedence: 6, handler: OpHandler::Binary("AND") },
    Operator { token: "OR", unary: false, precedence: 7, handler: OpHandler::Binary("OR") },
    Operator { token: "ALL", unary: false, precedence: 7, handler: OpHandler::Unimplemented("ALL") },
    Operator { token: "ANY", unary: false, precedence: 7, handler: OpHandler::Unimplemented("ANY") },
    Operator { token: "SOME", unary: false, precedence: 7, handler: OpHandler::Unimplemented("SOME") },
];

/// The precedence ceiling a fresh expression starts with.
pub const STARTING_PRECEDENCE: u32 = 10;

/// Parse a complete expression, requiring all input to be consumed.
pub fn parse_expression(text: &str) -> Result<SqlExpr> {
    let mut ctx = ParseContext::new(text);
    let expr = parse_expr(&mut ctx, STARTING_PRECEDENCE)?;
    ctx.expect_eof("Unexpected characters at end of expression")?;
    Ok(expr)
}

/// Like [`parse_expression`], but empty or all-whitespace text parses
/// to the given constant. Used for optional clause fields.
pub fn parse_default(text: &str, default: Value) -> Result<SqlExpr> {
    let mut probe = ParseContext::new(text);
    probe.skip_whitespace();
    if probe.eof() {
        let surface = default.to_display_string();
        return Ok(SqlExpr::new(surface, ExprKind::Constant(default)));
    }
    parse_expression(text)
}

/// Parse one value expression with a precedence ceiling. Binary
/// operators bind only when their precedence is strictly below the
/// ceiling; unary operators when at or below it.
pub fn parse_expr(ctx: &mut ParseContext, ceiling: u32) -> Result<SqlExpr> {
    ctx.skip_whitespace();
    let start = ctx.pos();
    let mut lhs: Option<SqlExpr> = None;

    loop {
        ctx.skip_whitespace();
        match lhs {
            None => {
                lhs = Some(parse_prefix(ctx, ceiling, start)?);
            }
            Some(expr) => match parse_infix(ctx, expr, ceiling, start)? {
                Continuation::Extended(e) => lhs = Some(e),
                Continuation::Done(e) => return Ok(e),
            },
        }
    }
}

enum Continuation {
    Extended(SqlExpr),
    Done(SqlExpr),
}

fn parse_prefix(ctx: &mut ParseContext, ceiling: u32, start: usize) -> Result<SqlExpr> {
    if ctx.match_literal("(") {
        let inner = parse_expr(ctx, STARTING_PRECEDENCE)?;
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' closing parenthesized expression"));
        }
        return Ok(SqlExpr::new(ctx.captured_since(start), inner.kind));
    }

    if ctx.match_literal("{") {
        let clauses = parse_row_literal_body(ctx)?;
        return Ok(SqlExpr::new(
            ctx.captured_since(start),
            ExprKind::RowLiteral(clauses),
        ));
    }

    if ctx.match_literal("[") {
        let mut items = Vec::new();
        ctx.skip_whitespace();
        if !ctx.match_literal("]") {
            loop {
                items.push(parse_expr(ctx, STARTING_PRECEDENCE)?);
                ctx.skip_whitespace();
                if ctx.match_literal(",") {
                    continue;
                }
                if ctx.match_literal("]") {
                    break;
                }
                return Err(ctx.error("expected ',' or ']' in embedding literal"));
            }
        }
        return Ok(SqlExpr::new(
            ctx.captured_since(start),
            ExprKind::Embedding(items),
        ));
    }

    if ctx.match_keyword("CASE") {
        return parse_case(ctx, start);
    }

    if ctx.match_keyword("CAST") {
        return parse_cast(ctx, start);
    }

    // unary operators, in table order
    for op in OPERATORS {
        if !op.unary || op.precedence > ceiling {
            continue;
        }
        let before = ctx.save();
        let matched = if op.token.chars().all(|c| c.is_ascii_alphabetic()) {
            ctx.match_keyword(op.token)
        } else {
            ctx.match_operator(op.token)
        };
        // `timestamp(...)` is the function of that name, not the
        // unary conversion operator
        if matched && matches!(op.handler, OpHandler::UnaryFunction(_)) {
            let probe = ctx.save();
            ctx.skip_whitespace();
            let is_call = ctx.peek_char() == Some('(');
            ctx.restore(probe);
            if is_call {
                ctx.restore(before);
                continue;
            }
        }
        if matched {
            let operand = parse_expr(ctx, op.precedence)?;
            let surface = ctx.captured_since(start);
            return Ok(match &op.handler {
                OpHandler::Unary(name) => SqlExpr::new(
                    surface,
                    ExprKind::Unary {
                        op: name,
                        expr: Box::new(operand),
                    },
                ),
                OpHandler::UnaryFunction(func) => SqlExpr::new(
                    surface,
                    ExprKind::Function {
                        table: None,
                        name: (*func).to_string(),
                        args: vec![operand],
                        extract: None,
                    },
                ),
                _ => return Err(ctx.error(format!("operator '{}' is not prefix", op.token))),
            });
        }
    }

    if let Some(value) = ctx.match_constant()? {
        return Ok(SqlExpr::new(
            ctx.captured_since(start),
            ExprKind::Constant(value),
        ));
    }

    if ctx.match_literal("$") {
        return parse_parameter(ctx, start);
    }

    if let Some(path) = ctx.match_column_path()? {
        ctx.skip_whitespace();
        if ctx.match_literal("(") {
            return parse_function_call(ctx, path, start);
        }
        return Ok(SqlExpr::new(
            ctx.captured_since(start),
            ExprKind::Column(path),
        ));
    }

    Err(ctx.error("expected an expression"))
}

fn parse_infix(
    ctx: &mut ParseContext,
    lhs: SqlExpr,
    ceiling: u32,
    start: usize,
) -> Result<Continuation> {
    // IS binds at any ceiling, so it extends even a unary operand
    for negated in [true, false] {
        let kw = if negated { "IS NOT" } else { "IS" };
        if ctx.match_keyword(kw) {
            let type_check = parse_type_check(ctx)?;
            return Ok(Continuation::Extended(SqlExpr::new(
                ctx.captured_since(start),
                ExprKind::IsType {
                    expr: Box::new(lhs),
                    type_check,
                    negated,
                },
            )));
        }
    }

    // BETWEEN sits below the comparison tier; its bounds admit
    // comparisons but stop before AND
    if ceiling > 4 {
        for negated in [true, false] {
            let kw = if negated { "NOT BETWEEN" } else { "BETWEEN" };
            if ctx.match_keyword(kw) {
                let lower = parse_expr(ctx, 5)?;
                ctx.expect_keyword("AND", "expected AND between BETWEEN bounds")?;
                let upper = parse_expr(ctx, 5)?;
                return Ok(Continuation::Extended(SqlExpr::new(
                    ctx.captured_since(start),
                    ExprKind::Between {
                        expr: Box::new(lhs),
                        lower: Box::new(lower),
                        upper: Box::new(upper),
                        negated,
                    },
                )));
            }
        }
    }

    if ceiling > 5 {
        for negated in [true, false] {
            let kw = if negated { "NOT IN" } else { "IN" };
            if ctx.match_keyword(kw) {
                let items = parse_in_items(ctx)?;
                return Ok(Continuation::Extended(SqlExpr::new(
                    ctx.captured_since(start),
                    ExprKind::In {
                        expr: Box::new(lhs),
                        items,
                        negated,
                    },
                )));
            }
        }

        for negated in [true, false] {
            let kw = if negated { "NOT LIKE" } else { "LIKE" };
            if ctx.match_keyword(kw) {
                let pattern = parse_expr(ctx, 5)?;
                return Ok(Continuation::Extended(SqlExpr::new(
                    ctx.captured_since(start),
                    ExprKind::Like {
                        expr: Box::new(lhs),
                        pattern: Box::new(pattern),
                        negated,
                    },
                )));
            }
        }
    }

    for op in OPERATORS {
        if op.unary {
            continue;
        }
        if op.precedence >= ceiling {
            break;
        }
        let matched = if op.token.chars().all(|c| c.is_ascii_alphabetic()) {
            ctx.match_keyword(op.token)
        } else {
            ctx.match_operator(op.token)
        };
        if matched {
            if let OpHandler::Unimplemented(name) = &op.handler {
                return Err(ctx.error(format!("Operator {} is not implemented", name)));
            }
            let rhs = parse_expr(ctx, op.precedence)?;
            let surface = ctx.captured_since(start);
            let expr = match &op.handler {
                OpHandler::Binary(name) => SqlExpr::new(
                    surface,
                    ExprKind::Binary {
                        op: name,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                ),
                OpHandler::BinaryFunction(func) => SqlExpr::new(
                    surface,
                    ExprKind::Function {
                        table: None,
                        name: (*func).to_string(),
                        args: vec![lhs, rhs],
                        extract: None,
                    },
                ),
                _ => unreachable!("unary handlers filtered above"),
            };
            return Ok(Continuation::Extended(expr));
        }
    }

    Ok(Continuation::Done(lhs))
}

fn parse_type_check(ctx: &mut ParseContext) -> Result<TypeCheck> {
    let checks = [
        ("NULL", TypeCheck::Null),
        ("TRUE", TypeCheck::True),
        ("FALSE", TypeCheck::False),
        ("STRING", TypeCheck::String),
        ("NUMBER", TypeCheck::Number),
        ("INTEGER", TypeCheck::Integer),
        ("TIMESTAMP", TypeCheck::Timestamp),
        ("INTERVAL", TypeCheck::Interval),
    ];
    for (kw, check) in checks {
        if ctx.match_keyword(kw) {
            return Ok(check);
        }
    }
    Err(ctx.error(
        "expected NULL, TRUE, FALSE, STRING, NUMBER, INTEGER, TIMESTAMP or \
         INTERVAL after IS",
    ))
}

fn parse_in_items(ctx: &mut ParseContext) -> Result<InItems> {
    ctx.skip_whitespace();
    if !ctx.match_literal("(") {
        return Err(ctx.error("expected '(' after IN"));
    }
    if ctx.peek_keyword("SELECT") {
        let statement = super::statement::SelectStatement::parse_inner(ctx)?;
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' closing IN sub-select"));
        }
        return Ok(InItems::Subtable(Box::new(statement)));
    }
    if ctx.match_keyword("KEYS OF") {
        let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' after KEYS OF expression"));
        }
        return Ok(InItems::KeysOf(Box::new(expr)));
    }
    if ctx.match_keyword("VALUES OF") {
        let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' after VALUES OF expression"));
        }
        return Ok(InItems::ValuesOf(Box::new(expr)));
    }
    let mut items = Vec::new();
    loop {
        items.push(parse_expr(ctx, STARTING_PRECEDENCE)?);
        ctx.skip_whitespace();
        if ctx.match_literal(",") {
            continue;
        }
        if ctx.match_literal(")") {
            break;
        }
        return Err(ctx.error("expected ',' or ')' in IN list"));
    }
    Ok(InItems::Tuple(items))
}

fn parse_case(ctx: &mut ParseContext, start: usize) -> Result<SqlExpr> {
    let expr = if ctx.peek_keyword("WHEN") {
        None
    } else {
        Some(Box::new(parse_expr(ctx, STARTING_PRECEDENCE)?))
    };
    let mut when_clauses = Vec::new();
    while ctx.match_keyword("WHEN") {
        let condition = parse_expr(ctx, STARTING_PRECEDENCE)?;
        ctx.expect_keyword("THEN", "expected THEN after WHEN condition")?;
        let result = parse_expr(ctx, STARTING_PRECEDENCE)?;
        when_clauses.push((condition, result));
    }
    if when_clauses.is_empty() {
        return Err(ctx.error("expected at least one WHEN clause in CASE"));
    }
    let else_clause = if ctx.match_keyword("ELSE") {
        Some(Box::new(parse_expr(ctx, STARTING_PRECEDENCE)?))
    } else {
        None
    };
    ctx.expect_keyword("END", "expected END closing CASE expression")?;
    Ok(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::Case {
            expr,
            when_clauses,
            else_clause,
        },
    ))
}

fn parse_cast(ctx: &mut ParseContext, start: usize) -> Result<SqlExpr> {
    ctx.skip_whitespace();
    if !ctx.match_literal("(") {
        return Err(ctx.error("expected '(' after CAST"));
    }
    let expr = parse_expr(ctx, STARTING_PRECEDENCE)?;
    ctx.expect_keyword("AS", "expected AS in CAST expression")?;
    ctx.skip_whitespace();
    let target = ctx
        .match_identifier()?
        .ok_or_else(|| ctx.error("expected type name after AS in CAST"))?
        .to_ascii_lowercase();
    ctx.skip_whitespace();
    if !ctx.match_literal(")") {
        return Err(ctx.error("expected ')' closing CAST expression"));
    }
    Ok(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::Cast {
            expr: Box::new(expr),
            target,
        },
    ))
}

fn parse_parameter(ctx: &mut ParseContext, start: usize) -> Result<SqlExpr> {
    let mut name = String::new();
    while let Some(c) = ctx.peek_char() {
        if !c.is_ascii_digit() {
            break;
        }
        name.push(c);
        ctx.advance_char();
    }
    if name.is_empty() {
        name = ctx
            .match_identifier()?
            .ok_or_else(|| ctx.error("expected parameter name or number after '$'"))?;
    }
    Ok(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::Parameter(name),
    ))
}

/// Function names carry at most two dot-separated elements: an
/// optional table prefix and the function proper.
fn parse_function_call(
    ctx: &mut ParseContext,
    path: crate::value::ColumnPath,
    start: usize,
) -> Result<SqlExpr> {
    let (table, name) = match path.elements() {
        [name] => (None, name.clone()),
        [table, name] => (Some(table.clone()), name.clone()),
        _ => {
            return Err(ctx.error(format!(
                "Ambiguous function name '{}': at most two dot-separated elements are \
                 allowed; surround a dotted table name with double quotes to use it as \
                 a function prefix",
                path
            )))
        }
    };

    let mut args = Vec::new();
    ctx.skip_whitespace();
    // count(*) and friends take a constant-true argument
    if (name == "count" || name == "vertical_count") && ctx.match_literal("*") {
        args.push(SqlExpr::new("*", ExprKind::Constant(Value::Bool(true))));
        ctx.skip_whitespace();
        if !ctx.match_literal(")") {
            return Err(ctx.error("expected ')' after '*' argument"));
        }
    } else if !ctx.match_literal(")") {
        loop {
            args.push(parse_expr(ctx, STARTING_PRECEDENCE)?);
            ctx.skip_whitespace();
            if ctx.match_literal(",") {
                continue;
            }
            if ctx.match_literal(")") {
                break;
            }
            return Err(ctx.error("expected ',' or ')' in function arguments"));
        }
    }

    // an [extract] clause evaluates over the function's result row
    ctx.skip_whitespace();
    let extract = if ctx.match_literal("[") {
        let inner = parse_expr(ctx, STARTING_PRECEDENCE)?;
        ctx.skip_whitespace();
        if !ctx.match_literal("]") {
            return Err(ctx.error("expected ']' closing extract expression"));
        }
        Some(Box::new(inner))
    } else {
        None
    };

    Ok(SqlExpr::new(
        ctx.captured_since(start),
        ExprKind::Function {
            table,
            name,
            args,
            extract,
        },
    ))
}

/// `{ ... }` row literal body: comma-separated row clauses up to the
/// closing brace, which is consumed.
fn parse_row_literal_body(ctx: &mut ParseContext) -> Result<Vec<SqlExpr>> {
    let mut clauses = Vec::new();
    ctx.skip_whitespace();
    if ctx.match_literal("}") {
        return Ok(clauses);
    }
    loop {
        clauses.push(super::rowexpr::parse_row_clause(ctx)?);
        ctx.skip_whitespace();
        if ctx.match_literal(",") {
            continue;
        }
        if ctx.match_literal("}") {
            break;
        }
        return Err(ctx.error("expected ',' or '}' in row literal"));
    }
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SqlExpr {
        parse_expression(text).unwrap()
    }

    #[test]
    fn test_precedence() {
        let e = parse("1 + 2 * 3");
        match &e.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                assert_eq!(*op, "+");
                assert_eq!(lhs.surface, "1");
                assert_eq!(rhs.surface, "2 * 3");
            }
            other => panic!("unexpected node: {:?}", other),
        }

        let e = parse("a OR b AND NOT c");
        match &e.kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(*op, "OR");
                assert_eq!(rhs.surface, "b AND NOT c");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_left_associativity() {
        let e = parse("10 - 4 - 3");
        match &e.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                assert_eq!(*op, "-");
                assert_eq!(lhs.surface, "10 - 4");
                assert_eq!(rhs.surface, "3");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_surface() {
        let e = parse("(1 + 2) * 3");
        match &e.kind {
            ExprKind::Binary { op, lhs, .. } => {
                assert_eq!(*op, "*");
                assert_eq!(lhs.surface, "(1 + 2)");
                assert!(matches!(lhs.kind, ExprKind::Binary { op: "+", .. }));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_at_operator_rewrites_to_function() {
        let e = parse("x @ t");
        match &e.kind {
            ExprKind::Function { name, args, .. } => {
                assert_eq!(name, "at");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_unary_rewrites_to_function() {
        let e = parse("timestamp '2024-01-01T00:00:00Z'");
        match &e.kind {
            ExprKind::Function { name, args, .. } => {
                assert_eq!(name, "to_timestamp");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_between_and_not_between() {
        let e = parse("x BETWEEN 1 AND 10");
        assert!(matches!(e.kind, ExprKind::Between { negated: false, .. }));

        let e = parse("x NOT BETWEEN 1 AND 10 AND y");
        // NOT BETWEEN binds tighter than AND
        match &e.kind {
            ExprKind::Binary { op: "AND", lhs, .. } => {
                assert!(matches!(lhs.kind, ExprKind::Between { negated: true, .. }));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_in_forms() {
        let e = parse("x IN (1, 2, 3)");
        match &e.kind {
            ExprKind::In { items: InItems::Tuple(items), negated: false, .. } => {
                assert_eq!(items.len(), 3)
            }
            other => panic!("unexpected node: {:?}", other),
        }

        let e = parse("x NOT IN (KEYS OF r)");
        assert!(matches!(
            e.kind,
            ExprKind::In { items: InItems::KeysOf(_), negated: true, .. }
        ));

        let e = parse("x IN (SELECT a FROM ds)");
        match &e.kind {
            ExprKind::In { items: InItems::Subtable(statement), .. } => {
                assert_eq!(statement.surface, "SELECT a FROM ds");
                assert_eq!(statement.select.clauses.len(), 1);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_in_subtable_rejects_malformed_select() {
        assert!(parse_expression("x IN (SELECT ???)").is_err());
        assert!(parse_expression("x IN (SELECT a FROM)").is_err());
    }

    #[test]
    fn test_is_type() {
        let e = parse("x IS NOT NULL");
        assert!(matches!(
            e.kind,
            ExprKind::IsType { type_check: TypeCheck::Null, negated: true, .. }
        ));

        let e = parse("x IS STRING");
        assert!(matches!(
            e.kind,
            ExprKind::IsType { type_check: TypeCheck::String, negated: false, .. }
        ));

        // no article forms
        assert!(parse_expression("x IS A STRING").is_err());
        assert!(parse_expression("x IS AN INTEGER").is_err());
    }

    #[test]
    fn test_is_extends_a_unary_operand() {
        // IS is checked at every ceiling, so it attaches to the
        // operand of the unary minus, not to the negated expression
        let e = parse("- x IS NOT NULL");
        match &e.kind {
            ExprKind::Unary { op: "-", expr } => {
                assert!(matches!(
                    expr.kind,
                    ExprKind::IsType { type_check: TypeCheck::Null, negated: true, .. }
                ));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_between_bounds_admit_comparisons() {
        let e = parse("1 BETWEEN 0 = 0 AND 2");
        match &e.kind {
            ExprKind::Between { lower, upper, .. } => {
                assert_eq!(lower.surface, "0 = 0");
                assert_eq!(upper.surface, "2");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_multibyte_literals_and_identifiers() {
        let e = parse("'caf\u{e9}'");
        assert!(matches!(
            &e.kind,
            ExprKind::Constant(Value::String(s)) if s == "caf\u{e9}"
        ));

        let e = parse("\"\u{65e5}\u{672c}\" + 1");
        match &e.kind {
            ExprKind::Binary { op: "+", lhs, .. } => {
                assert!(matches!(lhs.kind, ExprKind::Column(_)));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_case_forms() {
        let e = parse("CASE WHEN x > 1 THEN 'big' ELSE 'small' END");
        match &e.kind {
            ExprKind::Case { expr, when_clauses, else_clause } => {
                assert!(expr.is_none());
                assert_eq!(when_clauses.len(), 1);
                assert!(else_clause.is_some());
            }
            other => panic!("unexpected node: {:?}", other),
        }

        let e = parse("CASE x WHEN 1 THEN 'one' WHEN 2 THEN 'two' END");
        match &e.kind {
            ExprKind::Case { expr, when_clauses, else_clause } => {
                assert!(expr.is_some());
                assert_eq!(when_clauses.len(), 2);
                assert!(else_clause.is_none());
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_cast() {
        let e = parse("CAST (x AS integer)");
        match &e.kind {
            ExprKind::Cast { target, .. } => assert_eq!(target, "integer"),
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_count_star() {
        let e = parse("count(*)");
        match &e.kind {
            ExprKind::Function { name, args, .. } => {
                assert_eq!(name, "count");
                assert_eq!(args.len(), 1);
                assert!(args[0].is_constant_true());
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_function_name_depth_limit() {
        let err = parse_expression("a.b.c(1)").unwrap_err();
        assert!(err.to_string().contains("at most two dot-separated elements"));

        let e = parse("t.f(1)");
        match &e.kind {
            ExprKind::Function { table, name, .. } => {
                assert_eq!(table.as_deref(), Some("t"));
                assert_eq!(name, "f");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_extract_clause() {
        let e = parse("f(x)[a + b]");
        match &e.kind {
            ExprKind::Function { extract, .. } => {
                assert_eq!(extract.as_ref().unwrap().surface, "a + b");
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_parameters() {
        let e = parse("$1 + $foo");
        match &e.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                assert!(matches!(&lhs.kind, ExprKind::Parameter(n) if n == "1"));
                assert!(matches!(&rhs.kind, ExprKind::Parameter(n) if n == "foo"));
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_row_and_embedding_literals() {
        let e = parse("{ a: 1, b: x + 1 }");
        match &e.kind {
            ExprKind::RowLiteral(clauses) => assert_eq!(clauses.len(), 2),
            other => panic!("unexpected node: {:?}", other),
        }

        let e = parse("[1, 2, 3]");
        assert!(matches!(&e.kind, ExprKind::Embedding(items) if items.len() == 3));
    }

    #[test]
    fn test_all_any_some_unimplemented() {
        let err = parse_expression("a ALL b").unwrap_err();
        assert!(err.to_string().contains("Operator ALL is not implemented"));
    }

    #[test]
    fn test_parse_default() {
        let e = parse_default("   ", Value::Bool(true)).unwrap();
        assert!(e.is_constant_true());
        assert_eq!(e.surface, "true");

        let e = parse_default("x + 1", Value::Bool(true)).unwrap();
        assert!(!e.is_constant());
    }

    #[test]
    fn test_comments_inside_expressions() {
        let e = parse("1 + /* two */ 2 -- trailing\n");
        assert!(e.is_constant());
    }

    #[test]
    fn test_in_not_confused_with_inner() {
        // "INNER" must not be taken as the IN operator; the stray word
        // is left for the caller to reject
        let err = parse_expression("x INNER").unwrap_err();
        assert!(err.to_string().contains("Unexpected characters"));
    }
}
