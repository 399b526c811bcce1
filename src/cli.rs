use clap::Parser;

/// Command line of the bridge binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "discourse-bridge-telegram")]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<String>,
    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub check_config: bool,
}
