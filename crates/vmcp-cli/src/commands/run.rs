//! `vmcp run`: boots the Protocol Adapter against environment
//! configuration (spec §6), the production entry point.

use vmcp_server::VmcpServerConfig;

use crate::args::RunArgs;

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut config = VmcpServerConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    let port = config.port;

    let state = super::build_app_state(config);
    super::serve(state, port).await
}
