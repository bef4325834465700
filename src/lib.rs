//! Core of a coverage-guided smart-contract fuzzer: call-sequence generation,
//! mutation, shrinking, the shared corpus, and the worker-activity / metrics
//! discipline that coordinates concurrent workers.
//!
//! The chain simulator, ABI compilation metadata, dashboard, and CLI are
//! treated as peripheral or external collaborators; see [`chain::Chain`],
//! [`value::ValueGenerator`]/[`value::ValueMutator`], and [`oracle`] for the
//! seams where they plug in.

pub mod abi;
pub mod activity;
pub mod chain;
pub mod config;
pub mod corpus;
pub mod fuzzer;
pub mod generator;
pub mod logger;
pub mod metrics;
pub mod oracle;
pub mod reversion;
pub mod sequence;
pub mod shrinker;
pub mod types;
pub mod value;
pub mod worker;
