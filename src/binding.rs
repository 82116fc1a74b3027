// Binding module - scopes, unbound analysis, and the binder itself

pub mod binder;
pub mod scope;
pub mod unbound;

pub use binder::{
    Binder, BoundAggregateCall, BoundGroupSelect, BoundOrderBy, BoundSqlExpr, BoundTableFunction,
    BoundWhen,
};
pub use scope::{
    BindingScope, ColumnFilter, ColumnTransform, ConstantScope, EmptyRowScope, ExprInfo,
    RowGenerator, RowScope, ValueGetter,
};
pub use unbound::{UnboundEntities, UnboundFunction};
