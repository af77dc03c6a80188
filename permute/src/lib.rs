//! Enumerates design-rule-clean metal permutations of standard-cell layouts.

pub mod batch;
pub mod config;
pub mod drc;
pub mod error;
pub mod gds;
pub mod layout;
pub mod permutation;
pub mod tech;
pub mod verification;

pub(crate) mod log;

pub use self::config::{FlowType, PermuteConfig};
pub use self::error::{ErrorSource, PermuteError, Result};
pub use self::log::Log;
pub use self::permutation::{
    Evaluation, PermutationEngine, PermutationOptions, PermutationReport,
};
