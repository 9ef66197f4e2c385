// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_imports)]
#![warn(unused_must_use)]
#![deny(nonstandard_style)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::cognitive_complexity)]
#![deny(overflowing_literals)]
#![deny(arithmetic_overflow)]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Bowtie Sync
//!
//! Declarative, idempotent management of a Bowtie controller's sites,
//! DNS policies, DNS block lists, user groups, access resources and
//! resource groups.
//!
//! ## Architecture
//!
//! 1. **Desired State**: declared in `bowtie.yaml`
//! 2. **Observed State**: read from the controller API
//! 3. **Local State**: remote ids and payload hashes from previous runs
//! 4. **Reconciler**: diffs the three and executes ordered actions
//!
//! Remote ids of ordered sub-collections (DNS servers and exclusions) are
//! reconciled by position, so editing a server address keeps its id and
//! truncating a list keeps the ids of the surviving prefix.
//!
//! ## Modules
//!
//! - [`api`]: controller client, wire codec and the [`api::ControlPlane`] seam
//! - [`config`]: configuration parsing, environment overrides and validation
//! - [`state`]: local state file and lock
//! - [`planner`]: identity reconciliation, diffing, planning and execution
//! - [`reconciler`]: plan, apply, drift and destroy
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! sites:
//!   - name: office
//!     ranges:
//!       - name: lan
//!         ipv4_range: 10.0.0.0/16
//!
//! dns:
//!   - name: corp.example.com
//!     servers: [10.0.0.2, 10.0.0.3]
//!     include_only_sites: [office]
//!
//! dns_block_lists:
//!   - name: ads
//!     upstream: https://lists.example.com/ads.txt
//!     override_to_allow: [cdn.example.com]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{BowtieClient, ControlPlane, Credentials, StateObserver};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{BowtieConfig, ConfigHasher, ConfigParser, ConfigValidator};
pub use error::{BowtieError, Result};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use state::{DeploymentState, LocalStateStore, StateStore};
