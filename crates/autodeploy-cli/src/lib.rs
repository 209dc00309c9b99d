//! autodeploy CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// autodeploy - render Kubernetes manifests for auto-deploy releases
#[derive(Parser, Debug)]
#[command(name = "autodeploy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the manifests of a release to stdout
    Template(commands::template::TemplateArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Template(args) => commands::template::run(args),
        }
    }
}
