//! Core domain types for tiergate.

pub mod dimension;
pub mod error;
pub mod report;

pub use dimension::{BuiltinDimension, DimensionConfig, Tier};
pub use error::{PluginError, Result, TiergateError};
pub use report::{CheckOutcome, CheckResult, Report, TierResult};
