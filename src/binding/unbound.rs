//! What an expression needs from its environment before it can run.
//!
//! Collected compositionally over the syntax tree; merging is
//! commutative and associative per key so clause order never changes
//! the result.

use std::collections::{BTreeMap, BTreeSet};

/// Call sites of one unresolved function, keyed by arity. Each arity
/// keeps the argument surfaces of one representative call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnboundFunction {
    pub args_for_arity: BTreeMap<usize, Vec<String>>,
}

impl UnboundFunction {
    pub fn merge(&mut self, other: UnboundFunction) {
        for (arity, args) in other.args_for_arity {
            self.args_for_arity.entry(arity).or_insert(args);
        }
    }
}

/// Names a 5-function set that requires full-row access; scopes that
/// stream single columns can refuse expressions that use any of them.
const ROW_FUNCTIONS: [&str; 5] = [
    "columnCount",
    "rowHash",
    "rowPath",
    "leftRowHash",
    "rightRowHash",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnboundEntities {
    /// Column reads, as printed paths.
    pub columns: BTreeSet<String>,
    /// Wildcard prefixes, as printed paths ("" for a bare `*`).
    pub wildcards: BTreeSet<String>,
    /// Query parameter names, without the `$`.
    pub params: BTreeSet<String>,
    /// Unqualified function calls.
    pub functions: BTreeMap<String, UnboundFunction>,
    /// Per-table-alias requirements, nested.
    pub tables: BTreeMap<String, UnboundEntities>,
}

impl UnboundEntities {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.wildcards.is_empty()
            && self.params.is_empty()
            && self.functions.is_empty()
            && self.tables.is_empty()
    }

    pub fn add_column(&mut self, path: String) {
        self.columns.insert(path);
    }

    pub fn add_wildcard(&mut self, prefix: String) {
        self.wildcards.insert(prefix);
    }

    pub fn add_param(&mut self, name: String) {
        self.params.insert(name);
    }

    pub fn add_function(&mut self, name: String, arity: usize, arg_surfaces: Vec<String>) {
        self.functions
            .entry(name)
            .or_default()
            .args_for_arity
            .entry(arity)
            .or_insert(arg_surfaces);
    }

    pub fn add_table_function(
        &mut self,
        table: String,
        name: String,
        arity: usize,
        arg_surfaces: Vec<String>,
    ) {
        self.tables
            .entry(table)
            .or_default()
            .add_function(name, arity, arg_surfaces);
    }

    pub fn merge(&mut self, other: UnboundEntities) {
        self.columns.extend(other.columns);
        self.wildcards.extend(other.wildcards);
        self.params.extend(other.params);
        for (name, func) in other.functions {
            self.functions.entry(name).or_default().merge(func);
        }
        for (name, table) in other.tables {
            self.tables.entry(name).or_default().merge(table);
        }
    }

    /// Merge, dropping everything the enclosing join resolves itself:
    /// table entries for its aliases, and columns or wildcards
    /// qualified by those aliases.
    pub fn merge_filtered(&mut self, mut other: UnboundEntities, known_tables: &BTreeSet<String>) {
        for table in known_tables {
            other.tables.remove(table);
        }
        other
            .columns
            .retain(|c| !known_tables.contains(first_segment(c)));
        other
            .wildcards
            .retain(|w| !known_tables.contains(first_segment(w)));
        self.merge(other);
    }

    /// True if any of the functions needing whole-row access is used.
    pub fn has_row_functions(&self) -> bool {
        ROW_FUNCTIONS
            .iter()
            .any(|name| self.functions.contains_key(*name))
    }

    pub fn has_unbound_variables(&self) -> bool {
        !self.columns.is_empty() || !self.wildcards.is_empty()
    }
}

fn first_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_column(name: &str) -> UnboundEntities {
        let mut u = UnboundEntities::default();
        u.add_column(name.to_string());
        u
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut a = with_column("x");
        a.add_function("f".to_string(), 2, vec!["a".to_string(), "b".to_string()]);
        let mut b = with_column("y");
        b.add_function("f".to_string(), 1, vec!["c".to_string()]);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.functions["f"].args_for_arity.len(), 2);
    }

    #[test]
    fn test_merge_filtered_drops_known_aliases() {
        let mut join = UnboundEntities::default();
        let mut side = with_column("t.x");
        side.add_wildcard("t".to_string());
        side.add_column("free".to_string());
        side.add_table_function("t".to_string(), "rowPath".to_string(), 0, vec![]);
        side.add_table_function("u".to_string(), "rowPath".to_string(), 0, vec![]);

        let known: BTreeSet<String> = ["t".to_string()].into_iter().collect();
        join.merge_filtered(side, &known);

        assert!(!join.columns.contains("t.x"));
        assert!(join.columns.contains("free"));
        assert!(join.wildcards.is_empty());
        assert!(!join.tables.contains_key("t"));
        assert!(join.tables.contains_key("u"));
    }

    #[test]
    fn test_has_row_functions() {
        let mut u = UnboundEntities::default();
        assert!(!u.has_row_functions());
        u.add_function("rowHash".to_string(), 0, vec![]);
        assert!(u.has_row_functions());
    }
}
