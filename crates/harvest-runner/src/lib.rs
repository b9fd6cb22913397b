pub mod collaborators;
pub mod config;
pub mod orchestrator;
pub mod runner;

pub use collaborators::*;
pub use config::*;
pub use orchestrator::*;
pub use runner::*;
