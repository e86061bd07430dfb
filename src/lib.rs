pub mod ai;
pub mod cli;
pub mod cluster;
pub mod context;
pub mod embed;
mod error;
pub mod logging;
pub mod report;
pub mod search;
pub(crate) mod serde_helpers;
pub mod text;
pub mod vector_store;

pub use error::{AppError, AppResult};
