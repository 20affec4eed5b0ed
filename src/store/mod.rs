//! Persistence for bridge rules.

pub mod rules;

pub use rules::{Rule, RuleFile, RuleMap, RuleStore, SourceFilter};
