// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # hakgal
//!
//! Governance-gated, atomic fact insertion into a SQLite knowledge base.
//!
//! ## Architecture
//!
//! - **Statements** (`statement`): flat `Predicate(arg1, arg2, ...)` parsing
//! - **Governance** (`governance`): constitution rules, risk metrics, bypass, the per-fact gate
//! - **Fact store** (`store`): SQLite in WAL mode, one transaction per batch
//! - **Audit** (`audit`): append-only, SHA-256 hash-chained log
//! - **Engine** (`engine`): the `governed_add_facts_atomic` facade
//!
//! ## Library usage
//!
//! ```no_run
//! use hakgal::config::EngineConfig;
//! use hakgal::engine::GovernanceEngine;
//! use hakgal::governance::GovernanceContext;
//!
//! let mut engine = GovernanceEngine::new(EngineConfig::with_db("kb.db")).unwrap();
//! let ctx = GovernanceContext::new("user");
//! let inserted = engine
//!     .governed_add_facts_atomic(&["IsA(TestEntity, Entity)."], &ctx)
//!     .unwrap();
//! assert_eq!(inserted, 1);
//! ```

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod governance;
pub mod paths;
pub mod statement;
pub mod store;
