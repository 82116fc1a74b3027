pub mod binding;
pub mod builtins;
pub mod error;
pub mod registry;
pub mod sql;
pub mod value;
