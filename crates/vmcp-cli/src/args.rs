//! Top-level CLI surface (spec §6 `run`/`serve-test`), mirroring the
//! teacher's `Cli`/subcommand split but scoped to the two commands the
//! spec actually names.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "vmcp",
    version,
    about = "vMCP aggregator: run the Protocol Adapter, or boot an ephemeral instance for manual testing"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Overrides the `LOG_LEVEL` environment variable.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the MCP Protocol Adapter against the configuration in the
    /// environment (spec §6).
    Run(RunArgs),
    /// Boot an ephemeral, in-memory vMCP server with no persisted state,
    /// for local smoke-testing.
    ServeTest(ServeTestArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Overrides the `PORT` environment variable.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, clap::Args)]
pub struct ServeTestArgs {
    /// Port to bind the ephemeral server to.
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Name of the demo vMCP created at startup (has no upstreams or
    /// custom tools — it exists only so the adapter has something to
    /// route `/private/{name}/vmcp` requests to).
    #[arg(long, default_value = "demo")]
    pub vmcp_name: String,
}
