//! Information display handlers

use crate::capabilities::Capabilities;
use crate::cli::output::*;
use crate::AppConfig;
use crate::Result;

/// Handle config command
pub async fn handle_config_command(config: &AppConfig) -> Result<()> {
    print_config(config, &Capabilities::resolve(config));
    Ok(())
}
