//! CLI commands module.

mod cluster;
mod config;
mod persons;
mod run;
mod util;

pub use cluster::ClusterCommand;
pub use config::ConfigCommand;
pub use persons::PersonsCommand;
pub use run::RunCommand;

pub(crate) use util::*;
