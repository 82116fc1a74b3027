//! Binding scopes: the capability protocol between expressions and
//! their environment.
//!
//! A scope answers, at bind time, "what does this name mean here".
//! Every method has a failing default, so a scope only implements the
//! capabilities it genuinely has; asking for anything else produces a
//! structured error naming the scope, the capability and the name.

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use crate::error::{Result, SqlError};
use crate::registry::{ExternalAggregator, ExternalDatasetFunction, ExternalFunction};
use crate::sql::ast::SqlExpr;
use crate::value::{ColumnPath, ExpressionValue, NamedRow, Timestamp, Value, ValueFilter};

/// Static knowledge about a bound value.
#[derive(Debug, Clone, Default)]
pub struct ExprInfo {
    pub is_constant: bool,
}

impl ExprInfo {
    pub fn constant() -> Self {
        ExprInfo { is_constant: true }
    }

    pub fn variable() -> Self {
        ExprInfo { is_constant: false }
    }
}

/// A compiled accessor: row scope in, timestamped value out.
#[derive(Clone)]
pub struct ValueGetter {
    pub exec: Arc<dyn Fn(&dyn RowScope, ValueFilter) -> Result<ExpressionValue> + Send + Sync>,
    pub info: ExprInfo,
}

impl std::fmt::Debug for ValueGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueGetter")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ValueGetter {
    pub fn new(
        exec: impl Fn(&dyn RowScope, ValueFilter) -> Result<ExpressionValue> + Send + Sync + 'static,
        info: ExprInfo,
    ) -> Self {
        ValueGetter {
            exec: Arc::new(exec),
            info,
        }
    }
}

/// Column-path mapping a wildcard applies when expanding: rename,
/// exclusion, prefix stripping. `None` drops the column.
pub type ColumnFilter = Arc<dyn Fn(&ColumnPath) -> Option<ColumnPath> + Send + Sync>;

/// Produces the rows a WHERE predicate admits; scopes backed by an
/// enumerable dataset override [`BindingScope::get_row_generator`] to
/// run full-table scans through one of these.
pub type RowGenerator = Arc<dyn Fn(&dyn RowScope) -> Result<Vec<NamedRow>> + Send + Sync>;

/// Rewrites one cell on its way into the output row.
pub type ColumnTransform = Arc<dyn Fn(ExpressionValue) -> Result<ExpressionValue> + Send + Sync>;

/// Per-row evaluation context. Concrete scopes are downcast through
/// `as_any` by the getters their binding scope produced.
pub trait RowScope {
    fn as_any(&self) -> &dyn Any;

    /// The tuple timestamp, when evaluating under a WHEN clause.
    fn tuple_timestamp(&self) -> Option<Timestamp> {
        None
    }
}

/// A row scope with nothing in it, for evaluating constant expressions.
pub struct EmptyRowScope;

impl RowScope for EmptyRowScope {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The bind-time environment. Implementations override what they
/// support; the defaults refuse with a structured error.
pub trait BindingScope {
    /// Short human-readable description used in capability errors.
    fn kind(&self) -> &'static str;

    fn get_column(&self, path: &ColumnPath) -> Result<ValueGetter> {
        Err(SqlError::unsupported(
            self.kind(),
            "column lookup",
            path.to_string(),
        ))
    }

    /// Expand a wildcard into a row value of all matching columns.
    fn get_all_columns(&self, table: &str, keep: ColumnFilter) -> Result<ValueGetter> {
        let _ = keep;
        Err(SqlError::unsupported(
            self.kind(),
            "wildcard expansion",
            table.to_string(),
        ))
    }

    fn get_parameter(&self, name: &str) -> Result<ValueGetter> {
        Err(SqlError::unsupported(
            self.kind(),
            "query parameters",
            name.to_string(),
        ))
    }

    /// Resolve a function by name. `Ok(None)` means "not mine"; the
    /// binder then falls back to the function registries.
    fn get_function(
        &self,
        table: Option<&str>,
        name: &str,
        arity: usize,
    ) -> Result<Option<ExternalFunction>> {
        let _ = (table, name, arity);
        Ok(None)
    }

    /// Resolve an aggregate function by name. `Ok(None)` falls back to
    /// the aggregator registry.
    fn get_aggregator(
        &self,
        name: &str,
        arity: usize,
    ) -> Result<Option<Arc<ExternalAggregator>>> {
        let _ = (name, arity);
        Ok(None)
    }

    /// Resolve a table-producing function. `Ok(None)` falls back to the
    /// dataset-function registry.
    fn get_dataset_function(
        &self,
        name: &str,
        arity: usize,
    ) -> Result<Option<ExternalDatasetFunction>> {
        let _ = (name, arity);
        Ok(None)
    }

    /// A generator of the rows a WHERE predicate admits.
    fn get_row_generator(&self, where_clause: &SqlExpr) -> Result<RowGenerator> {
        Err(SqlError::unsupported(
            self.kind(),
            "row generation",
            where_clause.surface.clone(),
        ))
    }

    /// A transform applied to one column's cells.
    fn get_column_transform(&self, name: &str) -> Result<ColumnTransform> {
        Err(SqlError::unsupported(
            self.kind(),
            "column transforms",
            name.to_string(),
        ))
    }

    /// A dataset referenced by name in a FROM clause.
    fn get_dataset(&self, name: &str) -> Result<ValueGetter> {
        Err(SqlError::unsupported(
            self.kind(),
            "dataset lookup",
            name.to_string(),
        ))
    }

    /// A dataset built from an inline configuration object.
    fn get_dataset_from_config(&self, config: &SqlExpr) -> Result<ValueGetter> {
        Err(SqlError::unsupported(
            self.kind(),
            "dataset configuration",
            config.surface.clone(),
        ))
    }

    /// A table (dataset or sub-query result) by name.
    fn get_table(&self, name: &str) -> Result<ValueGetter> {
        Err(SqlError::unsupported(
            self.kind(),
            "table lookup",
            name.to_string(),
        ))
    }

    /// The table alias a qualified column resolves against.
    fn resolve_table_name(&self, path: &ColumnPath) -> Result<String> {
        Err(SqlError::unsupported(
            self.kind(),
            "table-name resolution",
            path.to_string(),
        ))
    }
}

/// The scope constants are folded in: it supports nothing.
pub struct ConstantScope;

impl BindingScope for ConstantScope {
    fn kind(&self) -> &'static str {
        "constant-folding scope"
    }
}

/// Wraps the user's scope for binding a WHEN clause. Adds the
/// zero-argument `timestamp()` function and records whether the bound
/// expression ever resolved it; an expression that never did is
/// independent of the tuple timestamp and can be evaluated once per
/// row.
pub struct WhenScope<'a> {
    parent: &'a dyn BindingScope,
    tuple_dependent: Cell<bool>,
}

impl<'a> WhenScope<'a> {
    pub fn new(parent: &'a dyn BindingScope) -> Self {
        WhenScope {
            parent,
            tuple_dependent: Cell::new(false),
        }
    }

    pub fn is_tuple_dependent(&self) -> bool {
        self.tuple_dependent.get()
    }
}

impl BindingScope for WhenScope<'_> {
    fn kind(&self) -> &'static str {
        "when-clause scope"
    }

    fn get_column(&self, path: &ColumnPath) -> Result<ValueGetter> {
        self.parent.get_column(path)
    }

    fn get_all_columns(&self, table: &str, keep: ColumnFilter) -> Result<ValueGetter> {
        self.parent.get_all_columns(table, keep)
    }

    fn get_parameter(&self, name: &str) -> Result<ValueGetter> {
        self.parent.get_parameter(name)
    }

    fn get_function(
        &self,
        table: Option<&str>,
        name: &str,
        arity: usize,
    ) -> Result<Option<ExternalFunction>> {
        if table.is_none() && name == "timestamp" && arity == 0 {
            self.tuple_dependent.set(true);
            return Ok(Some(ExternalFunction::new(|_args, scope| {
                let ts = scope.tuple_timestamp().ok_or_else(|| {
                    SqlError::evaluation("timestamp() called outside a temporal filter")
                })?;
                Ok(ExpressionValue::new(Value::Timestamp(ts), ts))
            })));
        }
        self.parent.get_function(table, name, arity)
    }

    fn get_aggregator(
        &self,
        name: &str,
        arity: usize,
    ) -> Result<Option<Arc<ExternalAggregator>>> {
        self.parent.get_aggregator(name, arity)
    }

    fn get_dataset_function(
        &self,
        name: &str,
        arity: usize,
    ) -> Result<Option<ExternalDatasetFunction>> {
        self.parent.get_dataset_function(name, arity)
    }
}

/// Evaluation-side companion of [`WhenScope`]: the caller's row scope
/// plus the tuple timestamp under consideration. Downcasts pass
/// through to the inner scope so its column getters keep working.
pub struct WhenRowScope<'a> {
    inner: &'a dyn RowScope,
    timestamp: Timestamp,
}

impl<'a> WhenRowScope<'a> {
    pub fn new(inner: &'a dyn RowScope, timestamp: Timestamp) -> Self {
        WhenRowScope { inner, timestamp }
    }
}

impl RowScope for WhenRowScope<'_> {
    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }

    fn tuple_timestamp(&self) -> Option<Timestamp> {
        Some(self.timestamp)
    }
}

/// Scope a `COLUMN EXPR` select clause is bound in: the enclosing
/// scope plus the per-column functions `value()` and `columnPath()`.
pub struct ColumnExprScope<'a> {
    parent: &'a dyn BindingScope,
}

impl<'a> ColumnExprScope<'a> {
    pub fn new(parent: &'a dyn BindingScope) -> Self {
        ColumnExprScope { parent }
    }
}

impl BindingScope for ColumnExprScope<'_> {
    fn kind(&self) -> &'static str {
        "generated-column scope"
    }

    fn get_parameter(&self, name: &str) -> Result<ValueGetter> {
        self.parent.get_parameter(name)
    }

    fn get_function(
        &self,
        table: Option<&str>,
        name: &str,
        arity: usize,
    ) -> Result<Option<ExternalFunction>> {
        if table.is_none() && arity == 0 {
            match name {
                "value" => {
                    return Ok(Some(ExternalFunction::new(|_args, scope| {
                        let col = downcast_column_scope(scope)?;
                        Ok(col.value.clone())
                    })))
                }
                "columnPath" => {
                    return Ok(Some(ExternalFunction::new(|_args, scope| {
                        let col = downcast_column_scope(scope)?;
                        Ok(ExpressionValue::constant(Value::String(
                            col.path.to_string(),
                        )))
                    })))
                }
                _ => {}
            }
        }
        self.parent.get_function(table, name, arity)
    }
}

fn downcast_column_scope(scope: &dyn RowScope) -> Result<&ColumnRowScope> {
    scope.as_any().downcast_ref::<ColumnRowScope>().ok_or_else(|| {
        SqlError::evaluation("value()/columnPath() used outside a COLUMN EXPR")
    })
}

/// Evaluation-side companion of [`ColumnExprScope`]: one candidate
/// column with its path and value.
pub struct ColumnRowScope {
    pub path: ColumnPath,
    pub value: ExpressionValue,
}

impl RowScope for ColumnRowScope {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_defaults_name_the_capability() {
        let scope = ConstantScope;
        let err = scope.get_column(&ColumnPath::single("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "binding scope 'constant-folding scope' does not support column lookup (wanted 'x')"
        );

        let err = scope.get_parameter("p").unwrap_err();
        assert!(err.to_string().contains("query parameters"));

        assert!(scope.get_function(None, "f", 1).unwrap().is_none());
    }

    #[test]
    fn test_dataset_capability_defaults() {
        let scope = ConstantScope;
        let predicate = crate::sql::parser::parse_expression("x > 0").unwrap();

        let err = scope.get_row_generator(&predicate).err().unwrap();
        assert!(err.to_string().contains("row generation"));
        assert!(err.to_string().contains("x > 0"));

        let err = scope.get_column_transform("x").err().unwrap();
        assert!(err.to_string().contains("column transforms"));

        let err = scope.get_dataset("ds").unwrap_err();
        assert!(err.to_string().contains("dataset lookup"));

        let config = crate::sql::parser::parse_expression("{rows: 10}").unwrap();
        let err = scope.get_dataset_from_config(&config).unwrap_err();
        assert!(err.to_string().contains("dataset configuration"));

        let err = scope.get_table("t").unwrap_err();
        assert!(err.to_string().contains("table lookup"));

        let err = scope
            .resolve_table_name(&ColumnPath::single("t"))
            .unwrap_err();
        assert!(err.to_string().contains("table-name resolution"));

        // resolution hooks with registry fallbacks decline instead
        assert!(scope.get_aggregator("sum", 1).unwrap().is_none());
        assert!(scope.get_dataset_function("row_dataset", 1).unwrap().is_none());
    }

    #[test]
    fn test_when_scope_tracks_tuple_dependence() {
        let parent = ConstantScope;
        let when = WhenScope::new(&parent);
        assert!(!when.is_tuple_dependent());

        let f = when.get_function(None, "timestamp", 0).unwrap().unwrap();
        assert!(when.is_tuple_dependent());

        // without a tuple timestamp the function refuses to run
        let err = (f.call)(&[], &EmptyRowScope).unwrap_err();
        assert!(err.to_string().contains("temporal filter"));

        let ts = crate::value::negative_infinity();
        let row = WhenRowScope::new(&EmptyRowScope, ts);
        let out = (f.call)(&[], &row).unwrap();
        assert_eq!(out.value, Value::Timestamp(ts));
    }

    #[test]
    fn test_column_expr_scope_functions() {
        let parent = ConstantScope;
        let scope = ColumnExprScope::new(&parent);

        let value_fn = scope.get_function(None, "value", 0).unwrap().unwrap();
        let path_fn = scope.get_function(None, "columnPath", 0).unwrap().unwrap();

        let row = ColumnRowScope {
            path: ColumnPath::single("height"),
            value: ExpressionValue::constant(Value::Int(7)),
        };
        assert_eq!((value_fn.call)(&[], &row).unwrap().value, Value::Int(7));
        assert_eq!(
            (path_fn.call)(&[], &row).unwrap().value,
            Value::String("height".to_string())
        );

        // unknown names still fall through to the parent
        assert!(scope.get_function(None, "f", 0).unwrap().is_none());
    }
}
