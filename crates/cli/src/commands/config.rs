use anyhow::Result;
use ct_core::configs::settings::Config;
use ct_core::execution::TaskRunner;

use crate::ConfigCommands;

pub fn execute(runner: &TaskRunner, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => print!("{}", runner.config().to_yaml()?),
        ConfigCommands::Schema => println!("{}", Config::json_schema()?),
    }
    Ok(())
}
