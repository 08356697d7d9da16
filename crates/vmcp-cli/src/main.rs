use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = vmcp_cli::args::Cli::parse();
    vmcp_cli::execute(cli).await
}
