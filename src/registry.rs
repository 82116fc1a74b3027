//! Name registries for functions, aggregators and dataset functions.
//!
//! Registries are plain values injected wherever binding happens; there
//! is no process-global state. Registration returns a handle that
//! unregisters the name when dropped, so a plugin's functions disappear
//! with the plugin.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

use crate::binding::scope::RowScope;
use crate::error::{Result, SqlError};
use crate::value::ExpressionValue;

/// A scalar function: evaluated arguments in, one value out. The row
/// scope is available for functions that inspect the current row.
#[derive(Clone)]
pub struct ExternalFunction {
    pub call: Arc<dyn Fn(&[ExpressionValue], &dyn RowScope) -> Result<ExpressionValue> + Send + Sync>,
}

impl ExternalFunction {
    pub fn new(
        call: impl Fn(&[ExpressionValue], &dyn RowScope) -> Result<ExpressionValue>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        ExternalFunction { call: Arc::new(call) }
    }
}

/// Per-group accumulator state.
pub type AggregateState = Box<dyn Any + Send>;

/// An aggregate function as an init/process/extract triple.
pub struct ExternalAggregator {
    pub init: Box<dyn Fn() -> AggregateState + Send + Sync>,
    pub process: Box<dyn Fn(&mut AggregateState, &[ExpressionValue]) -> Result<()> + Send + Sync>,
    pub extract: Box<dyn Fn(AggregateState) -> Result<ExpressionValue> + Send + Sync>,
}

/// A table-producing function; the result is a row value the caller
/// iterates as a dataset.
#[derive(Clone)]
pub struct ExternalDatasetFunction {
    pub call: Arc<dyn Fn(&[ExpressionValue]) -> Result<ExpressionValue> + Send + Sync>,
}

/// A concurrent name-to-entry map. Lookups go straight to the shard
/// map; registrations serialize on a mutex so the existence check and
/// the insert are atomic.
pub struct Registry<T> {
    kind: &'static str,
    entries: DashMap<String, Arc<T>>,
    registration: Mutex<()>,
}

impl<T: Send + Sync + 'static> Registry<T> {
    pub fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Registry {
            kind,
            entries: DashMap::new(),
            registration: Mutex::new(()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Register a name, failing if it is already live. The returned
    /// handle owns the registration.
    pub fn register(
        self: &Arc<Self>,
        name: impl Into<String>,
        value: T,
    ) -> Result<RegistrationHandle<T>> {
        let name = name.into();
        let _guard = self.registration.lock();
        if self.entries.contains_key(&name) {
            return Err(SqlError::DuplicateRegistration {
                kind: self.kind,
                name,
            });
        }
        log::debug!("registering {} '{}'", self.kind, name);
        self.entries.insert(name.clone(), Arc::new(value));
        Ok(RegistrationHandle {
            registry: Arc::clone(self),
            name,
        })
    }

    fn unregister(&self, name: &str) {
        log::debug!("unregistering {} '{}'", self.kind, name);
        self.entries.remove(name);
    }
}

/// Owns one registry entry; dropping it unregisters the name.
pub struct RegistrationHandle<T: Send + Sync + 'static> {
    registry: Arc<Registry<T>>,
    name: String,
}

impl<T: Send + Sync + 'static> std::fmt::Debug for RegistrationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> RegistrationHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send + Sync + 'static> Drop for RegistrationHandle<T> {
    fn drop(&mut self) {
        self.registry.unregister(&self.name);
    }
}

/// The registry bundle a binder works against.
pub struct Registries {
    pub functions: Arc<Registry<ExternalFunction>>,
    pub aggregators: Arc<Registry<ExternalAggregator>>,
    pub dataset_functions: Arc<Registry<ExternalDatasetFunction>>,
    // keeps builtin registrations alive for the bundle's lifetime
    builtin_handles: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl Registries {
    /// An empty bundle, for callers that bring all their own functions.
    pub fn new() -> Arc<Self> {
        Arc::new(Registries {
            functions: Registry::new("function"),
            aggregators: Registry::new("aggregate function"),
            dataset_functions: Registry::new("dataset function"),
            builtin_handles: Mutex::new(Vec::new()),
        })
    }

    /// A bundle with the standard functions and aggregators installed.
    pub fn with_builtins() -> Result<Arc<Self>> {
        let registries = Self::new();
        let handles = crate::builtins::install(&registries)?;
        *registries.builtin_handles.lock() = handles;
        Ok(registries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn constant_fn(v: Value) -> ExternalFunction {
        ExternalFunction::new(move |_args, _scope| Ok(ExpressionValue::constant(v.clone())))
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry: Arc<Registry<ExternalFunction>> = Registry::new("function");
        let _h = registry.register("f", constant_fn(Value::Int(1))).unwrap();
        let err = registry
            .register("f", constant_fn(Value::Int(2)))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "attempt to double register function 'f'"
        );
    }

    #[test]
    fn test_drop_handle_frees_name() {
        let registry: Arc<Registry<ExternalFunction>> = Registry::new("function");
        {
            let _h = registry.register("f", constant_fn(Value::Int(1))).unwrap();
            assert!(registry.contains("f"));
        }
        assert!(!registry.contains("f"));
        // name is reusable after the handle is gone
        let _h = registry.register("f", constant_fn(Value::Int(3))).unwrap();
        assert!(registry.lookup("f").is_some());
    }

    #[test]
    fn test_builtins_installed() {
        let registries = Registries::with_builtins().unwrap();
        assert!(registries.functions.contains("lower"));
        assert!(registries.aggregators.contains("sum"));
        assert!(!registries.functions.contains("no_such_function"));
    }
}
