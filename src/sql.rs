// SQL module - parsing and AST representation

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod rowexpr;
pub mod statement;
pub mod table;

pub use ast::{ExprKind, InItems, SortOrder, SqlExpr, TypeCheck};
pub use lexer::ParseContext;
pub use parser::{parse_expression, STARTING_PRECEDENCE};
pub use statement::{
    OrderByExpression, SelectExpression, SelectStatement, TupleExpression, WhenExpression,
};
pub use table::{JoinQualification, TableExpression, TableKind};
