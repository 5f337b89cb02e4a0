//! Newton-based optimisation for NDT scan matching (Magnusson 2009, chapter 6).

pub mod more_thuente;
pub mod newton;
pub mod solver;
pub mod types;

pub use more_thuente::{more_thuente_search, LineSearchConfig, LineSearchResult};
pub use newton::{condition_number, newton_step, newton_step_regularized};
pub use solver::{NdtOptimizer, OptimizationConfig};
pub use types::{ConvergenceStatus, NdtConfig, NdtResult};
