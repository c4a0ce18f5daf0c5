//! Governance: deciding whether a fact mutation may reach the store.
//!
//! - [`context`]: per-call metadata and metric resolution
//! - [`constitution`]: declarative rule groups (`DEFAULT_PASS`, `OVERRIDE_GATE`)
//! - [`rule_engine`]: fail-closed clause evaluation
//! - [`metrics`]: fact-derived risk metrics
//! - [`classify`]: ADD / DELETE / OVERRIDE classification
//! - [`settings`]: process-wide flags, re-read per call
//! - [`gate`]: the per-fact decision

pub mod classify;
pub mod constitution;
pub mod context;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod rule_engine;
pub mod settings;

pub use classify::{OperationClassifier, OperationKind, PredicateRegistry, PrefixClassifier};
pub use constitution::Constitution;
pub use context::{GovernanceContext, OverrideFlags};
pub use error::{GovernanceError, GovernanceResult};
pub use gate::{BypassSource, DecisionReason, GateDecision, GovernanceGate};
pub use settings::{
    ConfigProvider, EnvConfigProvider, GovernanceConfig, StaticConfigProvider, WriteAccess,
};
