use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pulse-node")]
#[command(about = "Runs a local cluster of pulse-synchronized consensus nodes")]
pub struct Args {
    /// Template configuration; written with defaults when missing.
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    pub config: PathBuf,

    /// Number of simulated nodes. The first one is the discovery node.
    #[arg(long, default_value_t = 5)]
    pub nodes: usize,

    /// Pulses to run before leaving gracefully. 0 runs until Ctrl+C.
    #[arg(long, default_value_t = 10)]
    pub pulses: usize,

    #[arg(long, value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}
