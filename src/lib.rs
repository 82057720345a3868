pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod focus;
pub mod jj;
pub mod providers;
pub mod repo;
pub mod stack;
pub mod utils;
pub mod workspace;

pub use errors::{ErrorKind, WeaveError};
pub use repo::WeaveRepo;
