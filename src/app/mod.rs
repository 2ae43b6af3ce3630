pub mod context;
pub mod error;
pub mod run;

pub use context::{AppContext, SharedStore};
pub use error::{FreshetError, Result};
pub use run::{RunOptions, RunSummary};
