pub mod completions;
pub mod config;
pub mod daemon;
pub mod focus;
pub mod registry;
pub mod resolve;
pub mod stack;
pub mod workspace;
