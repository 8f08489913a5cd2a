pub mod codes;
pub mod serve;
pub mod validate;

use clap::ArgMatches;
use execgate_runtime::GatewayConfig;

/// File configuration when `--config` is given, defaults otherwise, with
/// `EXECGATE_*` overrides on top.
pub fn load_config(matches: &ArgMatches) -> anyhow::Result<GatewayConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}
