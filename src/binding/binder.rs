//! Bottom-up binding: turn parsed expressions into executable
//! closures against a scope, plus the bound forms of the compound
//! clauses (SELECT lists, ORDER BY, WHEN, grouped selects).

use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{Duration, Months};

use crate::binding::scope::{
    BindingScope, ColumnExprScope, ColumnFilter, ColumnRowScope, ConstantScope, EmptyRowScope,
    ExprInfo, RowScope, ValueGetter, WhenRowScope, WhenScope,
};
use crate::error::{Result, SqlError};
use crate::registry::{AggregateState, ExternalAggregator, ExternalFunction, Registries};
use crate::sql::ast::{
    find_aggregators, ExprKind, InItems, SortOrder, SqlExpr, TypeCheck, WildcardExclusion,
};
use crate::sql::statement::{
    OrderByExpression, SelectExpression, TupleExpression, WhenExpression,
};
use crate::sql::table::{TableExpression, TableKind};
use crate::value::{
    filter_cells, ColumnPath, ExpressionValue, NamedRow, Timestamp, Value, ValueFilter,
};

type Exec = Arc<dyn Fn(&dyn RowScope, ValueFilter) -> Result<ExpressionValue> + Send + Sync>;

/// A compiled expression: evaluator, static info, and the surface text
/// it came from.
#[derive(Clone)]
pub struct BoundSqlExpr {
    pub exec: Exec,
    pub info: ExprInfo,
    pub surface: String,
}

impl std::fmt::Debug for BoundSqlExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSqlExpr")
            .field("info", &self.info)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl BoundSqlExpr {
    fn new(
        surface: &str,
        info: ExprInfo,
        exec: impl Fn(&dyn RowScope, ValueFilter) -> Result<ExpressionValue> + Send + Sync + 'static,
    ) -> Self {
        BoundSqlExpr {
            exec: Arc::new(exec),
            info,
            surface: surface.to_string(),
        }
    }

    pub fn evaluate(&self, scope: &dyn RowScope) -> Result<ExpressionValue> {
        (self.exec)(scope, ValueFilter::Latest)
    }

    pub fn evaluate_filtered(
        &self,
        scope: &dyn RowScope,
        filter: ValueFilter,
    ) -> Result<ExpressionValue> {
        (self.exec)(scope, filter)
    }

    /// The value of a constant expression; an error naming the surface
    /// otherwise.
    pub fn constant_value(&self) -> Result<ExpressionValue> {
        if !self.info.is_constant {
            return Err(SqlError::semantic(
                format!("Expression '{}' is not constant", self.surface),
                self.surface.clone(),
            ));
        }
        self.evaluate(&EmptyRowScope)
    }
}

/// Bound form of a WHEN clause, specialized at bind time.
pub enum BoundWhen {
    /// Constant true: nothing is ever filtered.
    KeepAll,
    /// Constant false: every cell goes.
    DiscardAll,
    /// Not constant, but independent of the tuple timestamp; one
    /// evaluation decides the whole row.
    RowIndependent(BoundSqlExpr),
    /// Depends on `timestamp()`: evaluated once per cell.
    PerTuple(BoundSqlExpr),
}

impl BoundWhen {
    /// Apply the filter to a row in place. Rows that pass completely
    /// are left untouched.
    pub fn filter_row(&self, row: &mut NamedRow, scope: &dyn RowScope) -> Result<()> {
        match self {
            BoundWhen::KeepAll => Ok(()),
            BoundWhen::DiscardAll => {
                row.columns.clear();
                Ok(())
            }
            BoundWhen::RowIndependent(bound) => {
                if !bound.evaluate(scope)?.is_true() {
                    row.columns.clear();
                }
                Ok(())
            }
            BoundWhen::PerTuple(bound) => {
                let mut keep = Vec::with_capacity(row.columns.len());
                for (i, (_, _, ts)) in row.columns.iter().enumerate() {
                    let tuple_scope = WhenRowScope::new(scope, *ts);
                    if bound.evaluate(&tuple_scope)?.is_true() {
                        keep.push(i);
                    }
                }
                if keep.len() != row.columns.len() {
                    let mut kept = Vec::with_capacity(keep.len());
                    for i in keep {
                        kept.push(row.columns[i].clone());
                    }
                    row.columns = kept;
                }
                Ok(())
            }
        }
    }
}

/// Bound ORDER BY: evaluate a sort key per row, compare keys with
/// per-clause direction.
pub struct BoundOrderBy {
    pub clauses: Vec<(BoundSqlExpr, SortOrder)>,
}

impl BoundOrderBy {
    pub fn evaluate_key(&self, scope: &dyn RowScope) -> Result<Vec<ExpressionValue>> {
        self.clauses
            .iter()
            .map(|(bound, _)| bound.evaluate(scope))
            .collect()
    }

    pub fn compare_keys(&self, a: &[ExpressionValue], b: &[ExpressionValue]) -> Ordering {
        for ((_, direction), (x, y)) in self.clauses.iter().zip(a.iter().zip(b.iter())) {
            let ord = x.value.compare(&y.value);
            let ord = match direction {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// One aggregator call inside a grouped select.
pub struct BoundAggregateCall {
    pub name: String,
    pub aggregator: Arc<ExternalAggregator>,
    pub args: Vec<BoundSqlExpr>,
    pub surface: String,
}

impl BoundAggregateCall {
    pub fn init(&self) -> AggregateState {
        (self.aggregator.init)()
    }

    pub fn process(&self, state: &mut AggregateState, scope: &dyn RowScope) -> Result<()> {
        let args: Vec<ExpressionValue> = self
            .args
            .iter()
            .map(|a| a.evaluate(scope))
            .collect::<Result<_>>()?;
        (self.aggregator.process)(state, &args)
    }

    pub fn extract(&self, state: AggregateState) -> Result<ExpressionValue> {
        (self.aggregator.extract)(state)
    }
}

impl std::fmt::Debug for BoundAggregateCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAggregateCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

/// Bound form of `SELECT aggs... GROUP BY keys...`.
#[derive(Debug)]
pub struct BoundGroupSelect {
    pub aggregates: Vec<BoundAggregateCall>,
    pub group_keys: Vec<BoundSqlExpr>,
}

/// A FROM-clause dataset function bound through the registry; it
/// evaluates to the dataset's row value.
pub struct BoundTableFunction {
    pub name: String,
    pub call: Arc<dyn Fn(&[ExpressionValue]) -> Result<ExpressionValue> + Send + Sync>,
    pub args: Vec<BoundSqlExpr>,
    pub surface: String,
}

impl std::fmt::Debug for BoundTableFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundTableFunction")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl BoundTableFunction {
    pub fn evaluate(&self, scope: &dyn RowScope) -> Result<ExpressionValue> {
        let args: Vec<ExpressionValue> = self
            .args
            .iter()
            .map(|a| a.evaluate(scope))
            .collect::<Result<_>>()?;
        (self.call)(&args)
    }
}

/// Binds expressions against scopes, resolving functions through the
/// injected registries.
pub struct Binder {
    registries: Arc<Registries>,
}

impl Binder {
    pub fn new(registries: Arc<Registries>) -> Self {
        Binder { registries }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    /// Fold a constant expression down to its value without any scope.
    pub fn fold_constant(&self, expr: &SqlExpr) -> Result<ExpressionValue> {
        self.bind(expr, &ConstantScope)?.constant_value()
    }

    pub fn bind(&self, expr: &SqlExpr, scope: &dyn BindingScope) -> Result<BoundSqlExpr> {
        let info = if expr.is_constant() {
            ExprInfo::constant()
        } else {
            ExprInfo::variable()
        };
        let surface = &expr.surface;

        match &expr.kind {
            ExprKind::Constant(value) => {
                let value = value.clone();
                Ok(BoundSqlExpr::new(surface, info, move |_scope, _filter| {
                    Ok(ExpressionValue::constant(value.clone()))
                }))
            }

            ExprKind::Column(path) => {
                let getter = scope.get_column(path)?;
                Ok(BoundSqlExpr {
                    exec: getter.exec,
                    info: getter.info,
                    surface: surface.clone(),
                })
            }

            ExprKind::Parameter(name) => {
                let getter = scope.get_parameter(name)?;
                Ok(BoundSqlExpr {
                    exec: getter.exec,
                    info: getter.info,
                    surface: surface.clone(),
                })
            }

            ExprKind::Function {
                table,
                name,
                args,
                extract,
            } => self.bind_function(expr, scope, table, name, args, extract.as_deref(), info),

            ExprKind::Unary { op, expr: operand } => {
                let bound = self.bind(operand, scope)?;
                let op = *op;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (bound.exec)(scope, filter)?;
                    eval_unary(op, v)
                }))
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lhs = self.bind(lhs, scope)?;
                let rhs = self.bind(rhs, scope)?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let l = (lhs.exec)(scope, filter)?;
                    let r = (rhs.exec)(scope, filter)?;
                    eval_binary(op, l, r)
                }))
            }

            ExprKind::Cast { expr: inner, target } => {
                let bound = self.bind(inner, scope)?;
                let target = target.clone();
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (bound.exec)(scope, filter)?;
                    Ok(ExpressionValue::new(v.value.cast_to(&target)?, v.timestamp))
                }))
            }

            ExprKind::Case {
                expr: operand,
                when_clauses,
                else_clause,
            } => {
                let operand = operand
                    .as_deref()
                    .map(|e| self.bind(e, scope))
                    .transpose()?;
                let whens: Vec<(BoundSqlExpr, BoundSqlExpr)> = when_clauses
                    .iter()
                    .map(|(w, t)| Ok((self.bind(w, scope)?, self.bind(t, scope)?)))
                    .collect::<Result<_>>()?;
                let else_clause = else_clause
                    .as_deref()
                    .map(|e| self.bind(e, scope))
                    .transpose()?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let matched = match &operand {
                        Some(op) => {
                            let v = (op.exec)(scope, filter)?;
                            let mut hit = None;
                            for (when, then) in &whens {
                                let w = (when.exec)(scope, filter)?;
                                if v.value.loose_eq(&w.value) {
                                    hit = Some(then);
                                    break;
                                }
                            }
                            hit
                        }
                        None => {
                            let mut hit = None;
                            for (when, then) in &whens {
                                if (when.exec)(scope, filter)?.is_true() {
                                    hit = Some(then);
                                    break;
                                }
                            }
                            hit
                        }
                    };
                    match (matched, &else_clause) {
                        (Some(then), _) => (then.exec)(scope, filter),
                        (None, Some(e)) => (e.exec)(scope, filter),
                        (None, None) => Ok(ExpressionValue::null()),
                    }
                }))
            }

            ExprKind::Between {
                expr: operand,
                lower,
                upper,
                negated,
            } => {
                let operand = self.bind(operand, scope)?;
                let lower = self.bind(lower, scope)?;
                let upper = self.bind(upper, scope)?;
                let negated = *negated;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (operand.exec)(scope, filter)?;
                    let lo = (lower.exec)(scope, filter)?;
                    let hi = (upper.exec)(scope, filter)?;
                    let ts = v.timestamp.max(lo.timestamp).max(hi.timestamp);
                    if v.is_null() || lo.is_null() || hi.is_null() {
                        return Ok(ExpressionValue::new(Value::Null, ts));
                    }
                    let inside = v.value.compare(&lo.value) != Ordering::Less
                        && v.value.compare(&hi.value) != Ordering::Greater;
                    Ok(ExpressionValue::new(Value::Bool(inside != negated), ts))
                }))
            }

            ExprKind::In {
                expr: operand,
                items,
                negated,
            } => self.bind_in(surface, scope, operand, items, *negated, info),

            ExprKind::Like {
                expr: operand,
                pattern,
                negated,
            } => {
                let operand = self.bind(operand, scope)?;
                let bound_pattern = self.bind(pattern, scope)?;
                if !bound_pattern.info.is_constant {
                    return Err(SqlError::semantic(
                        format!(
                            "LIKE pattern '{}' must be a constant string",
                            bound_pattern.surface
                        ),
                        surface.clone(),
                    ));
                }
                let pattern_value = bound_pattern.constant_value()?;
                let pattern_text = match pattern_value.value {
                    Value::String(s) => s,
                    other => {
                        return Err(SqlError::semantic(
                            format!("LIKE pattern must be a string, got {}", other.type_name()),
                            surface.clone(),
                        ))
                    }
                };
                let negated = *negated;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (operand.exec)(scope, filter)?;
                    if v.is_null() {
                        return Ok(ExpressionValue::new(Value::Null, v.timestamp));
                    }
                    let text = match &v.value {
                        Value::String(s) => s,
                        other => {
                            return Err(SqlError::evaluation(format!(
                                "LIKE requires a string, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    let hit = like_match(text, &pattern_text);
                    Ok(ExpressionValue::new(Value::Bool(hit != negated), v.timestamp))
                }))
            }

            ExprKind::IsType {
                expr: operand,
                type_check,
                negated,
            } => {
                let operand = self.bind(operand, scope)?;
                let type_check = *type_check;
                let negated = *negated;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (operand.exec)(scope, filter)?;
                    let hit = match type_check {
                        TypeCheck::Null => v.value.is_null(),
                        TypeCheck::True => v.value.is_true(),
                        TypeCheck::False => v.value.is_false(),
                        TypeCheck::String => v.value.is_string(),
                        TypeCheck::Number => v.value.is_number(),
                        TypeCheck::Integer => v.value.is_integer(),
                        TypeCheck::Timestamp => v.value.is_timestamp(),
                        TypeCheck::Interval => v.value.is_interval(),
                    };
                    Ok(ExpressionValue::new(Value::Bool(hit != negated), v.timestamp))
                }))
            }

            ExprKind::RowLiteral(clauses) => {
                let bound: Vec<BoundSqlExpr> = clauses
                    .iter()
                    .map(|c| self.bind_row_clause(c, scope))
                    .collect::<Result<_>>()?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    concat_row_clauses(&bound, scope, filter)
                }))
            }

            ExprKind::Embedding(items) => {
                let bound: Vec<BoundSqlExpr> = items
                    .iter()
                    .map(|i| self.bind(i, scope))
                    .collect::<Result<_>>()?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let mut out = Vec::with_capacity(bound.len());
                    let mut ts = crate::value::negative_infinity();
                    for b in &bound {
                        let v = (b.exec)(scope, filter)?;
                        ts = ts.max(v.timestamp);
                        let f = v.value.as_f64().ok_or_else(|| {
                            SqlError::evaluation(format!(
                                "embedding elements must be numeric, got {}",
                                v.value.type_name()
                            ))
                        })?;
                        out.push(f);
                    }
                    Ok(ExpressionValue::new(Value::Embedding(out), ts))
                }))
            }

            ExprKind::Wildcard { .. }
            | ExprKind::NamedColumn { .. }
            | ExprKind::GeneratedColumns { .. } => self.bind_row_clause(expr, scope),
        }
    }

    fn bind_function(
        &self,
        expr: &SqlExpr,
        scope: &dyn BindingScope,
        table: &Option<String>,
        name: &str,
        args: &[SqlExpr],
        extract: Option<&SqlExpr>,
        info: ExprInfo,
    ) -> Result<BoundSqlExpr> {
        let bound_args: Vec<BoundSqlExpr> = args
            .iter()
            .map(|a| self.bind(a, scope))
            .collect::<Result<_>>()?;
        let function = self.resolve_function(scope, table.as_deref(), name, args.len(), expr)?;
        let call = function.call.clone();

        let core = move |scope: &dyn RowScope, filter: ValueFilter| -> Result<ExpressionValue> {
            let values: Vec<ExpressionValue> = bound_args
                .iter()
                .map(|a| (a.exec)(scope, filter))
                .collect::<Result<_>>()?;
            (call)(&values, scope)
        };

        match extract {
            None => Ok(BoundSqlExpr::new(&expr.surface, info, core)),
            Some(extract_expr) => {
                let extract_bound = self.bind(extract_expr, &ExtractScope)?;
                Ok(BoundSqlExpr::new(
                    &expr.surface,
                    info,
                    move |scope, filter| {
                        let result = core(scope, filter)?;
                        let extract_scope = ExtractRowScope { row: result };
                        (extract_bound.exec)(&extract_scope, filter)
                    },
                ))
            }
        }
    }

    fn resolve_function(
        &self,
        scope: &dyn BindingScope,
        table: Option<&str>,
        name: &str,
        arity: usize,
        expr: &SqlExpr,
    ) -> Result<ExternalFunction> {
        if let Some(f) = scope.get_function(table, name, arity)? {
            return Ok(f);
        }
        if table.is_none() {
            if let Some(f) = self.registries.functions.lookup(name) {
                return Ok((*f).clone());
            }
            if self.registries.aggregators.contains(name) {
                return Err(SqlError::semantic(
                    format!(
                        "Aggregate function '{}' cannot be used outside of an aggregating context",
                        name
                    ),
                    expr.surface.clone(),
                ));
            }
            if matches!(
                name,
                "leftRowName" | "rightRowName" | "leftRowPath" | "rightRowPath"
            ) {
                return Err(SqlError::semantic(
                    format!("Function '{}' is only available within a join", name),
                    expr.surface.clone(),
                ));
            }
        }
        log::debug!("function lookup failed for '{}'", name);
        Err(SqlError::semantic(
            format!("Unable to find function '{}'", name),
            expr.surface.clone(),
        ))
    }

    fn bind_in(
        &self,
        surface: &str,
        scope: &dyn BindingScope,
        operand: &SqlExpr,
        items: &InItems,
        negated: bool,
        info: ExprInfo,
    ) -> Result<BoundSqlExpr> {
        let operand = self.bind(operand, scope)?;
        match items {
            InItems::Subtable(_) => Err(SqlError::semantic(
                "IN (SELECT ...) requires a dataset execution context",
                surface.to_string(),
            )),
            InItems::Tuple(items) => {
                let bound: Vec<BoundSqlExpr> = items
                    .iter()
                    .map(|i| self.bind(i, scope))
                    .collect::<Result<_>>()?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (operand.exec)(scope, filter)?;
                    if v.is_null() {
                        return Ok(ExpressionValue::new(Value::Null, v.timestamp));
                    }
                    let mut saw_null = false;
                    let mut ts = v.timestamp;
                    for item in &bound {
                        let candidate = (item.exec)(scope, filter)?;
                        ts = ts.max(candidate.timestamp);
                        if candidate.is_null() {
                            saw_null = true;
                        } else if v.value.loose_eq(&candidate.value) {
                            return Ok(ExpressionValue::new(Value::Bool(!negated), ts));
                        }
                    }
                    if saw_null {
                        return Ok(ExpressionValue::new(Value::Null, ts));
                    }
                    Ok(ExpressionValue::new(Value::Bool(negated), ts))
                }))
            }
            InItems::KeysOf(row_expr) => {
                let row_bound = self.bind(row_expr, scope)?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (operand.exec)(scope, filter)?;
                    if v.is_null() {
                        return Ok(ExpressionValue::new(Value::Null, v.timestamp));
                    }
                    let row = (row_bound.exec)(scope, filter)?;
                    let ts = v.timestamp.max(row.timestamp);
                    let hit = match &row.value {
                        Value::Row(cells) => cells
                            .iter()
                            .any(|(path, _)| v.value.loose_eq(&Value::String(path.to_string()))),
                        _ => false,
                    };
                    Ok(ExpressionValue::new(Value::Bool(hit != negated), ts))
                }))
            }
            InItems::ValuesOf(row_expr) => {
                let row_bound = self.bind(row_expr, scope)?;
                Ok(BoundSqlExpr::new(surface, info, move |scope, filter| {
                    let v = (operand.exec)(scope, filter)?;
                    if v.is_null() {
                        return Ok(ExpressionValue::new(Value::Null, v.timestamp));
                    }
                    let row = (row_bound.exec)(scope, filter)?;
                    let ts = v.timestamp.max(row.timestamp);
                    let hit = match &row.value {
                        Value::Row(cells) => {
                            cells.iter().any(|(_, cell)| v.value.loose_eq(&cell.value))
                        }
                        _ => false,
                    };
                    Ok(ExpressionValue::new(Value::Bool(hit != negated), ts))
                }))
            }
        }
    }

    /// Bind one SELECT-list clause to a row-valued evaluator.
    pub fn bind_row_clause(
        &self,
        clause: &SqlExpr,
        scope: &dyn BindingScope,
    ) -> Result<BoundSqlExpr> {
        match &clause.kind {
            ExprKind::NamedColumn { name, expr } => {
                let bound = self.bind(expr, scope)?;
                let name = name.clone();
                let info = bound.info.clone();
                Ok(BoundSqlExpr::new(&clause.surface, info, move |scope, filter| {
                    let v = (bound.exec)(scope, filter)?;
                    let ts = v.timestamp;
                    Ok(ExpressionValue::new(
                        Value::Row(vec![(name.clone(), v)]),
                        ts,
                    ))
                }))
            }

            ExprKind::Wildcard {
                prefix,
                rename,
                exclusions,
            } => {
                let keep = wildcard_filter(prefix.clone(), rename.clone(), exclusions.clone());
                let getter = scope.get_all_columns("", keep)?;
                Ok(BoundSqlExpr {
                    exec: getter.exec,
                    info: getter.info,
                    surface: clause.surface.clone(),
                })
            }

            ExprKind::GeneratedColumns {
                select,
                name,
                where_clause,
                order_by,
                offset,
                limit,
            } => self.bind_generated_columns(
                clause,
                scope,
                select,
                name,
                where_clause,
                order_by,
                *offset,
                *limit,
            ),

            _ => self.bind(clause, scope),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_generated_columns(
        &self,
        clause: &SqlExpr,
        scope: &dyn BindingScope,
        select: &SqlExpr,
        name: &SqlExpr,
        where_clause: &SqlExpr,
        order_by: &[(SqlExpr, SortOrder)],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<BoundSqlExpr> {
        let column_scope = ColumnExprScope::new(scope);
        let select = self.bind(select, &column_scope)?;
        let name = self.bind(name, &column_scope)?;
        let where_bound = self.bind(where_clause, &column_scope)?;
        let order_bound = BoundOrderBy {
            clauses: order_by
                .iter()
                .map(|(e, d)| Ok((self.bind(e, &column_scope)?, *d)))
                .collect::<Result<_>>()?,
        };
        let all = scope.get_all_columns("", Arc::new(|p: &ColumnPath| Some(p.clone())))?;

        Ok(BoundSqlExpr::new(
            &clause.surface,
            ExprInfo::variable(),
            move |scope, filter| {
                let source = (all.exec)(scope, filter)?;
                let cells = match source.value {
                    Value::Row(cells) => cells,
                    _ => Vec::new(),
                };

                // keep the columns the WHERE admits, with their sort keys
                let mut candidates = Vec::new();
                for (path, value) in cells {
                    let column = ColumnRowScope {
                        path: path.clone(),
                        value: value.clone(),
                    };
                    if (where_bound.exec)(&column, filter)?.is_true() {
                        let key = order_bound.evaluate_key(&column)?;
                        candidates.push((path, value, key));
                    }
                }
                candidates.sort_by(|a, b| order_bound.compare_keys(&a.2, &b.2));

                let skip = offset as usize;
                let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);

                let mut out = Vec::new();
                let mut ts = crate::value::negative_infinity();
                for (path, value, _) in candidates.into_iter().skip(skip).take(take) {
                    let column = ColumnRowScope {
                        path: path.clone(),
                        value: value.clone(),
                    };
                    let name_value = (name.exec)(&column, filter)?;
                    let out_path = match name_value.value {
                        Value::String(s) => ColumnPath::single(s),
                        other => {
                            return Err(SqlError::evaluation(format!(
                                "generated column name must be a string, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    let out_value = (select.exec)(&column, filter)?;
                    ts = ts.max(out_value.timestamp);
                    out.push((out_path, out_value));
                }
                Ok(ExpressionValue::new(
                    Value::Row(filter_cells(out, filter)),
                    ts,
                ))
            },
        ))
    }

    /// Bind a whole SELECT list to one row-valued evaluator.
    pub fn bind_select(
        &self,
        select: &SelectExpression,
        scope: &dyn BindingScope,
    ) -> Result<BoundSqlExpr> {
        let bound: Vec<BoundSqlExpr> = select
            .clauses
            .iter()
            .map(|c| self.bind_row_clause(c, scope))
            .collect::<Result<_>>()?;
        Ok(BoundSqlExpr::new(
            &select.surface,
            ExprInfo::variable(),
            move |scope, filter| concat_row_clauses(&bound, scope, filter),
        ))
    }

    pub fn bind_order_by(
        &self,
        order_by: &OrderByExpression,
        scope: &dyn BindingScope,
    ) -> Result<BoundOrderBy> {
        Ok(BoundOrderBy {
            clauses: order_by
                .clauses
                .iter()
                .map(|(e, d)| Ok((self.bind(e, scope)?, *d)))
                .collect::<Result<_>>()?,
        })
    }

    /// The three-way WHEN specialization: constant clauses collapse to
    /// keep-all or discard-all; non-constant clauses split on whether
    /// they consult the tuple timestamp.
    pub fn bind_when(
        &self,
        when: &WhenExpression,
        scope: &dyn BindingScope,
    ) -> Result<BoundWhen> {
        if when.when.is_constant() {
            let value = self.fold_constant(&when.when)?;
            return Ok(if value.is_true() {
                BoundWhen::KeepAll
            } else {
                BoundWhen::DiscardAll
            });
        }
        let when_scope = WhenScope::new(scope);
        let bound = self.bind(&when.when, &when_scope)?;
        Ok(if when_scope.is_tuple_dependent() {
            BoundWhen::PerTuple(bound)
        } else {
            BoundWhen::RowIndependent(bound)
        })
    }

    /// Bind a grouped select: find the aggregator calls, bind their
    /// arguments and the grouping keys.
    pub fn bind_group_select(
        &self,
        select: &SelectExpression,
        group_by: &TupleExpression,
        scope: &dyn BindingScope,
    ) -> Result<BoundGroupSelect> {
        let clause_refs: Vec<&SqlExpr> = select.clauses.iter().collect();
        let aggregator_nodes = find_aggregators(
            &clause_refs,
            !group_by.is_empty(),
            &self.registries.aggregators,
        )?;

        let mut aggregates = Vec::with_capacity(aggregator_nodes.len());
        for node in aggregator_nodes {
            let (name, args) = match &node.kind {
                ExprKind::Function {
                    table: None,
                    name,
                    args,
                    ..
                } => (name.clone(), args),
                _ => continue,
            };
            // scope first, then the registry
            let aggregator = match scope.get_aggregator(&name, args.len())? {
                Some(a) => a,
                None => self.registries.aggregators.lookup(&name).ok_or_else(|| {
                    SqlError::semantic(
                        format!("Unable to find aggregate function '{}'", name),
                        node.surface.clone(),
                    )
                })?,
            };
            let args = args
                .iter()
                .map(|a| self.bind(a, scope))
                .collect::<Result<_>>()?;
            aggregates.push(BoundAggregateCall {
                name,
                aggregator,
                args,
                surface: node.surface.clone(),
            });
        }

        let group_keys = group_by
            .clauses
            .iter()
            .map(|e| self.bind(e, scope))
            .collect::<Result<_>>()?;

        Ok(BoundGroupSelect {
            aggregates,
            group_keys,
        })
    }

    /// Bind a table-producing FROM clause. The function resolves scope
    /// first, then through the dataset-function registry; `row_dataset`
    /// goes through the same path under its fixed name.
    pub fn bind_table_function(
        &self,
        table: &TableExpression,
        scope: &dyn BindingScope,
    ) -> Result<BoundTableFunction> {
        let (name, exprs): (String, Vec<&SqlExpr>) = match &table.kind {
            TableKind::RowDataset { expr, .. } => ("row_dataset".to_string(), vec![expr]),
            TableKind::DatasetFunction {
                name, args, options, ..
            } => {
                let mut exprs: Vec<&SqlExpr> = args.iter().collect();
                if let Some(o) = options {
                    exprs.push(o);
                }
                (name.clone(), exprs)
            }
            _ => {
                return Err(SqlError::semantic(
                    format!(
                        "Table expression '{}' is not a dataset function",
                        table.surface
                    ),
                    table.surface.clone(),
                ))
            }
        };

        let function = match scope.get_dataset_function(&name, exprs.len())? {
            Some(f) => f,
            None => match self.registries.dataset_functions.lookup(&name) {
                Some(f) => (*f).clone(),
                None => {
                    return Err(SqlError::semantic(
                        format!("Unable to find dataset function '{}'", name),
                        table.surface.clone(),
                    ))
                }
            },
        };

        let args = exprs
            .into_iter()
            .map(|e| self.bind(e, scope))
            .collect::<Result<_>>()?;
        Ok(BoundTableFunction {
            name,
            call: function.call.clone(),
            args,
            surface: table.surface.clone(),
        })
    }
}

fn concat_row_clauses(
    bound: &[BoundSqlExpr],
    scope: &dyn RowScope,
    filter: ValueFilter,
) -> Result<ExpressionValue> {
    let mut cells = Vec::new();
    let mut ts = crate::value::negative_infinity();
    for clause in bound {
        let v = (clause.exec)(scope, filter)?;
        ts = ts.max(v.timestamp);
        match v.value {
            Value::Row(mut inner) => cells.append(&mut inner),
            other => {
                return Err(SqlError::evaluation(format!(
                    "select clause produced a {} instead of a row",
                    other.type_name()
                )))
            }
        }
    }
    Ok(ExpressionValue::new(
        Value::Row(filter_cells(cells, filter)),
        ts,
    ))
}

fn wildcard_filter(
    prefix: ColumnPath,
    rename: Option<ColumnPath>,
    exclusions: Vec<WildcardExclusion>,
) -> ColumnFilter {
    Arc::new(move |path: &ColumnPath| {
        if !path.starts_with(&prefix) {
            return None;
        }
        for exclusion in &exclusions {
            let hit = if exclusion.is_wildcard {
                path.starts_with(&exclusion.prefix)
            } else {
                path == &exclusion.prefix
            };
            if hit {
                return None;
            }
        }
        match &rename {
            Some(target) => path.replace_prefix(&prefix, target),
            None => Some(path.clone()),
        }
    })
}

fn eval_unary(op: &str, v: ExpressionValue) -> Result<ExpressionValue> {
    let ts = v.timestamp;
    if v.is_null() {
        return Ok(ExpressionValue::new(Value::Null, ts));
    }
    let out = match op {
        "~" => {
            let i = v.value.as_i64().ok_or_else(|| {
                SqlError::evaluation(format!("'~' requires an integer, got {}", v.value.type_name()))
            })?;
            Value::Int(!i)
        }
        "-" => match v.value {
            Value::Int(i) => Value::Int(i.checked_neg().ok_or_else(|| {
                SqlError::evaluation("integer overflow in negation")
            })?),
            Value::Float(f) => Value::Float(-f),
            other => {
                return Err(SqlError::evaluation(format!(
                    "unary '-' requires a number, got {}",
                    other.type_name()
                )))
            }
        },
        "+" => {
            if !v.value.is_number() && !matches!(v.value, Value::Bool(_)) {
                return Err(SqlError::evaluation(format!(
                    "unary '+' requires a number, got {}",
                    v.value.type_name()
                )));
            }
            v.value
        }
        "NOT" => Value::Bool(!v.value.is_true()),
        other => return Err(SqlError::evaluation(format!("unknown unary operator '{}'", other))),
    };
    Ok(ExpressionValue::new(out, ts))
}

fn eval_binary(op: &str, l: ExpressionValue, r: ExpressionValue) -> Result<ExpressionValue> {
    let ts = l.timestamp.max(r.timestamp);

    // three-valued logic handles nulls itself
    match op {
        "AND" => {
            let out = if l.value.is_false() || r.value.is_false() {
                Value::Bool(false)
            } else if l.value.is_null() || r.value.is_null() {
                Value::Null
            } else {
                Value::Bool(true)
            };
            return Ok(ExpressionValue::new(out, ts));
        }
        "OR" => {
            let out = if l.value.is_true() || r.value.is_true() {
                Value::Bool(true)
            } else if l.value.is_null() || r.value.is_null() {
                Value::Null
            } else {
                Value::Bool(false)
            };
            return Ok(ExpressionValue::new(out, ts));
        }
        _ => {}
    }

    if l.value.is_null() || r.value.is_null() {
        return Ok(ExpressionValue::new(Value::Null, ts));
    }

    let out = match op {
        "=" => Value::Bool(l.value.loose_eq(&r.value)),
        "!=" | "<>" => Value::Bool(!l.value.loose_eq(&r.value)),
        ">" => Value::Bool(l.value.compare(&r.value) == Ordering::Greater),
        "<" => Value::Bool(l.value.compare(&r.value) == Ordering::Less),
        ">=" | "!<" => Value::Bool(l.value.compare(&r.value) != Ordering::Less),
        "<=" | "!>" => Value::Bool(l.value.compare(&r.value) != Ordering::Greater),
        "+" | "-" => eval_additive(op, &l.value, &r.value)?,
        "*" => match (&l.value, &r.value) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_mul(*b).ok_or_else(|| {
                SqlError::evaluation("integer overflow in multiplication")
            })?),
            (a, b) => numeric_pair(a, b, op, |x, y| x * y)?,
        },
        "/" => {
            let (x, y) = float_pair(&l.value, &r.value, op)?;
            Value::Float(x / y)
        }
        "%" => match (&l.value, &r.value) {
            (Value::Int(a), Value::Int(b)) => {
                let v = a
                    .checked_rem(*b)
                    .ok_or_else(|| SqlError::evaluation("modulus by zero"))?;
                Value::Int(v)
            }
            (a, b) => numeric_pair(a, b, op, |x, y| x % y)?,
        },
        "&" | "|" | "^" => {
            let a = l.value.as_i64().ok_or_else(|| {
                SqlError::evaluation(format!("'{}' requires integers", op))
            })?;
            let b = r.value.as_i64().ok_or_else(|| {
                SqlError::evaluation(format!("'{}' requires integers", op))
            })?;
            Value::Int(match op {
                "&" => a & b,
                "|" => a | b,
                _ => a ^ b,
            })
        }
        other => {
            return Err(SqlError::evaluation(format!(
                "unknown binary operator '{}'",
                other
            )))
        }
    };
    Ok(ExpressionValue::new(out, ts))
}

fn eval_additive(op: &str, l: &Value, r: &Value) -> Result<Value> {
    let negate = op == "-";
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let out = if negate {
                a.checked_sub(*b)
            } else {
                a.checked_add(*b)
            };
            Ok(Value::Int(out.ok_or_else(|| {
                SqlError::evaluation("integer overflow in addition")
            })?))
        }
        (Value::Timestamp(ts), Value::Interval { months, days, seconds }) => Ok(Value::Timestamp(
            shift_timestamp(*ts, *months, *days, *seconds, negate)?,
        )),
        (Value::Interval { months, days, seconds }, Value::Timestamp(ts)) if !negate => Ok(
            Value::Timestamp(shift_timestamp(*ts, *months, *days, *seconds, false)?),
        ),
        (Value::Timestamp(a), Value::Timestamp(b)) if negate => {
            let delta = a.signed_duration_since(*b);
            Ok(Value::Float(delta.num_milliseconds() as f64 / 1000.0))
        }
        (
            Value::Interval { months, days, seconds },
            Value::Interval { months: m2, days: d2, seconds: s2 },
        ) if !negate => Ok(Value::Interval {
            months: months + m2,
            days: days + d2,
            seconds: seconds + s2,
        }),
        (a, b) => numeric_pair(a, b, op, |x, y| if negate { x - y } else { x + y }),
    }
}

fn numeric_pair(a: &Value, b: &Value, op: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    let (x, y) = float_pair(a, b, op)?;
    Ok(Value::Float(f(x, y)))
}

fn float_pair(a: &Value, b: &Value, op: &str) -> Result<(f64, f64)> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(SqlError::evaluation(format!(
            "'{}' requires numbers, got {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn shift_timestamp(
    ts: Timestamp,
    months: u32,
    days: u32,
    seconds: f64,
    negate: bool,
) -> Result<Timestamp> {
    let out_of_range = || SqlError::evaluation("timestamp out of range");
    let shifted = if negate {
        ts.checked_sub_months(Months::new(months))
    } else {
        ts.checked_add_months(Months::new(months))
    }
    .ok_or_else(out_of_range)?;
    let delta = Duration::days(days as i64)
        + Duration::milliseconds((seconds * 1000.0).round() as i64);
    if negate {
        shifted.checked_sub_signed(delta)
    } else {
        shifted.checked_add_signed(delta)
    }
    .ok_or_else(out_of_range)
}

/// SQL LIKE: `%` matches any run, `_` any single character.
fn like_match(text: &str, pattern: &str) -> bool {
    fn inner(text: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => {
                (0..=text.len()).any(|skip| inner(&text[skip..], rest))
            }
            Some(('_', rest)) => match text.split_first() {
                Some((_, text_rest)) => inner(text_rest, rest),
                None => false,
            },
            Some((c, rest)) => match text.split_first() {
                Some((t, text_rest)) => t == c && inner(text_rest, rest),
                None => false,
            },
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    inner(&text, &pattern)
}

/// Scope an `[extract]` sub-expression binds in: column reads resolve
/// against the function's result row.
struct ExtractScope;

impl BindingScope for ExtractScope {
    fn kind(&self) -> &'static str {
        "function-result scope"
    }

    fn get_column(&self, path: &ColumnPath) -> Result<ValueGetter> {
        let path = path.clone();
        Ok(ValueGetter::new(
            move |scope, _filter| {
                let row = scope
                    .as_any()
                    .downcast_ref::<ExtractRowScope>()
                    .ok_or_else(|| {
                        SqlError::evaluation("extract expression evaluated without a function result")
                    })?;
                Ok(row.lookup(&path))
            },
            ExprInfo::variable(),
        ))
    }

    fn get_all_columns(&self, _table: &str, keep: ColumnFilter) -> Result<ValueGetter> {
        Ok(ValueGetter::new(
            move |scope, filter| {
                let row = scope
                    .as_any()
                    .downcast_ref::<ExtractRowScope>()
                    .ok_or_else(|| {
                        SqlError::evaluation("extract expression evaluated without a function result")
                    })?;
                let cells = match &row.row.value {
                    Value::Row(cells) => cells
                        .iter()
                        .filter_map(|(p, v)| keep(p).map(|out| (out, v.clone())))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(ExpressionValue::new(
                    Value::Row(filter_cells(cells, filter)),
                    row.row.timestamp,
                ))
            },
            ExprInfo::variable(),
        ))
    }
}

struct ExtractRowScope {
    row: ExpressionValue,
}

impl ExtractRowScope {
    fn lookup(&self, path: &ColumnPath) -> ExpressionValue {
        if let Value::Row(cells) = &self.row.value {
            for (p, v) in cells {
                if p == path {
                    return v.clone();
                }
            }
        }
        ExpressionValue::null()
    }
}

impl RowScope for ExtractRowScope {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::parse_expression;

    fn binder() -> Binder {
        Binder::new(Registries::with_builtins().unwrap())
    }

    fn fold(text: &str) -> ExpressionValue {
        binder()
            .fold_constant(&parse_expression(text).unwrap())
            .unwrap()
    }

    // function calls are not considered constant, so evaluate those
    // against the empty row scope instead of folding
    fn eval(text: &str) -> ExpressionValue {
        binder()
            .bind(&parse_expression(text).unwrap(), &ConstantScope)
            .unwrap()
            .evaluate(&EmptyRowScope)
            .unwrap()
    }

    #[test]
    fn test_constant_arithmetic() {
        assert_eq!(fold("1 + 2 * 3").value, Value::Int(7));
        assert_eq!(fold("10 - 4 - 3").value, Value::Int(3));
        assert_eq!(fold("7 / 2").value, Value::Float(3.5));
        assert_eq!(fold("7 % 3").value, Value::Int(1));
        assert_eq!(fold("-3 + 1").value, Value::Int(-2));
        assert_eq!(fold("~0").value, Value::Int(-1));
        assert_eq!(fold("5 & 3").value, Value::Int(1));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(fold("1 < 2").value, Value::Bool(true));
        assert_eq!(fold("1 !> 2").value, Value::Bool(true));
        assert_eq!(fold("2 = 2.0").value, Value::Bool(true));
        assert_eq!(fold("true AND false").value, Value::Bool(false));
        assert_eq!(fold("false OR null").value, Value::Null);
        assert_eq!(fold("true OR null").value, Value::Bool(true));
        assert_eq!(fold("NOT 0").value, Value::Bool(true));
    }

    #[test]
    fn test_null_propagation() {
        assert_eq!(fold("null + 1").value, Value::Null);
        assert_eq!(fold("null = null").value, Value::Null);
        assert_eq!(fold("null IS NULL").value, Value::Bool(true));
        assert_eq!(fold("1 IS NOT NULL").value, Value::Bool(true));
    }

    #[test]
    fn test_between_and_in() {
        assert_eq!(fold("5 BETWEEN 1 AND 10").value, Value::Bool(true));
        assert_eq!(fold("5 NOT BETWEEN 1 AND 4").value, Value::Bool(true));
        assert_eq!(fold("2 IN (1, 2, 3)").value, Value::Bool(true));
        assert_eq!(fold("5 IN (1, null)").value, Value::Null);
        assert_eq!(fold("5 NOT IN (1, 2)").value, Value::Bool(true));
    }

    #[test]
    fn test_case_and_cast() {
        assert_eq!(
            fold("CASE WHEN 1 > 2 THEN 'a' ELSE 'b' END").value,
            Value::String("b".to_string())
        );
        assert_eq!(
            fold("CASE 2 WHEN 1 THEN 'one' WHEN 2 THEN 'two' END").value,
            Value::String("two".to_string())
        );
        assert_eq!(fold("CASE 9 WHEN 1 THEN 'one' END").value, Value::Null);
        assert_eq!(fold("CAST ('42' AS integer)").value, Value::Int(42));
    }

    #[test]
    fn test_like() {
        assert_eq!(fold("'hello' LIKE 'h%'").value, Value::Bool(true));
        assert_eq!(fold("'hello' LIKE 'h_llo'").value, Value::Bool(true));
        assert_eq!(fold("'hello' NOT LIKE '%z%'").value, Value::Bool(true));
        assert_eq!(fold("'hello' LIKE 'h'").value, Value::Bool(false));
    }

    #[test]
    fn test_like_pattern_must_be_constant() {
        let b = binder();
        // function calls are never constant, even over constant args
        let expr = parse_expression("'x' LIKE lower('A%')").unwrap();
        let err = b.bind(&expr, &ConstantScope).unwrap_err();
        assert!(err.to_string().contains("must be a constant"));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let out = eval("timestamp '2024-01-01T00:00:00Z' + interval '2 DAY'");
        assert_eq!(
            out.value,
            Value::Timestamp("2024-01-03T00:00:00Z".parse().unwrap())
        );

        let out = eval(
            "timestamp '2024-01-02T00:00:00Z' - timestamp '2024-01-01T00:00:00Z'",
        );
        assert_eq!(out.value, Value::Float(86400.0));
    }

    #[test]
    fn test_at_operator_sets_timestamp() {
        let out = eval("3 @ timestamp '2024-01-01T00:00:00Z'");
        assert_eq!(out.value, Value::Int(3));
        assert_eq!(
            out.timestamp,
            "2024-01-01T00:00:00Z".parse::<Timestamp>().unwrap()
        );
    }

    #[test]
    fn test_fold_rejects_non_constant() {
        let b = binder();
        let expr = parse_expression("x + 1").unwrap();
        let err = b.bind(&expr, &ConstantScope).unwrap_err();
        assert!(err
            .to_string()
            .contains("does not support column lookup"));
    }

    #[test]
    fn test_unknown_function_diagnostics() {
        let b = binder();
        let expr = parse_expression("no_such_fn(1)").unwrap();
        let err = b.bind(&expr, &ConstantScope).unwrap_err();
        assert!(err.to_string().contains("Unable to find function 'no_such_fn'"));

        let expr = parse_expression("leftRowName()").unwrap();
        let err = b.bind(&expr, &ConstantScope).unwrap_err();
        assert!(err.to_string().contains("only available within a join"));

        let expr = parse_expression("sum(1)").unwrap();
        let err = b.bind(&expr, &ConstantScope).unwrap_err();
        assert!(err.to_string().contains("Aggregate function 'sum'"));
    }

    #[test]
    fn test_row_literal_and_keys_of() {
        assert_eq!(fold("'a' IN (KEYS OF {a: 1, b: 2})").value, Value::Bool(true));
        assert_eq!(fold("2 IN (VALUES OF {a: 1, b: 2})").value, Value::Bool(true));
        assert_eq!(fold("'z' IN (KEYS OF {a: 1})").value, Value::Bool(false));
    }

    #[test]
    fn test_in_subtable_needs_dataset_context() {
        let b = binder();
        let expr = parse_expression("x IN (SELECT a FROM ds)").unwrap();
        let err = b.bind(&expr, &ConstantScope).unwrap_err();
        assert!(err.to_string().contains("dataset execution context"));
    }

    #[test]
    fn test_embedding_literal() {
        let out = fold("[1, 2, 3.5]");
        assert_eq!(out.value, Value::Embedding(vec![1.0, 2.0, 3.5]));
    }

    #[test]
    fn test_extract_over_function_result() {
        // a row literal is not a function, so exercise extract through
        // a builtin returning a row is not available; instead check the
        // extract scope machinery directly
        let scope = ExtractRowScope {
            row: ExpressionValue::constant(Value::Row(vec![(
                ColumnPath::single("x"),
                ExpressionValue::constant(Value::Int(9)),
            )])),
        };
        assert_eq!(scope.lookup(&ColumnPath::single("x")).value, Value::Int(9));
        assert_eq!(scope.lookup(&ColumnPath::single("y")).value, Value::Null);
    }

    #[test]
    fn test_row_dataset_binds_through_registry() {
        let b = binder();
        let table = TableExpression::parse("row_dataset({x: 1, y: 2}) AS r").unwrap();
        let bound = b.bind_table_function(&table, &ConstantScope).unwrap();
        assert_eq!(bound.name, "row_dataset");

        let out = bound.evaluate(&EmptyRowScope).unwrap();
        match out.value {
            Value::Row(cells) => assert_eq!(cells.len(), 2),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dataset_function() {
        let b = binder();
        let table = TableExpression::parse("no_such(1) AS t").unwrap();
        let err = b.bind_table_function(&table, &ConstantScope).unwrap_err();
        assert!(err
            .to_string()
            .contains("Unable to find dataset function 'no_such'"));

        let table = TableExpression::parse("plain_dataset").unwrap();
        let err = b.bind_table_function(&table, &ConstantScope).unwrap_err();
        assert!(err.to_string().contains("is not a dataset function"));
    }

    #[test]
    fn test_scope_aggregator_resolves_before_registry() {
        struct FixedAggScope;

        impl BindingScope for FixedAggScope {
            fn kind(&self) -> &'static str {
                "aggregate-test scope"
            }

            fn get_aggregator(
                &self,
                name: &str,
                _arity: usize,
            ) -> Result<Option<Arc<ExternalAggregator>>> {
                if name != "sum" {
                    return Ok(None);
                }
                Ok(Some(Arc::new(ExternalAggregator {
                    init: Box::new(|| Box::new(0i64)),
                    process: Box::new(|state, _args| {
                        *state.downcast_mut::<i64>().unwrap() += 10;
                        Ok(())
                    }),
                    extract: Box::new(|state| {
                        let n = *state.downcast::<i64>().unwrap();
                        Ok(ExpressionValue::constant(Value::Int(n)))
                    }),
                })))
            }
        }

        let b = binder();
        let select = SelectExpression::parse("sum(1)").unwrap();
        let bound = b
            .bind_group_select(&select, &TupleExpression::default(), &FixedAggScope)
            .unwrap();
        assert_eq!(bound.aggregates.len(), 1);

        // the scope's aggregator adds 10 per row; the builtin would sum
        // the constant argument instead
        let agg = &bound.aggregates[0];
        let mut state = agg.init();
        agg.process(&mut state, &EmptyRowScope).unwrap();
        agg.process(&mut state, &EmptyRowScope).unwrap();
        let out = agg.extract(state).unwrap();
        assert_eq!(out.value, Value::Int(20));
    }

    #[test]
    fn test_like_match_helper() {
        assert!(like_match("abc", "abc"));
        assert!(like_match("abc", "a%"));
        assert!(like_match("abc", "%c"));
        assert!(like_match("abc", "a_c"));
        assert!(!like_match("abc", "a_b"));
        assert!(like_match("", "%"));
        assert!(!like_match("", "_"));
    }
}
