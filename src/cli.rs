use clap::{Parser, ValueEnum};

/// `cmd -t {crawler,loader} [-f FILE] [-v] [URL ...]` (spec.md §6).
#[derive(Parser)]
#[command(name = "darc", about = "Distributed dark-web crawling engine")]
pub struct Cli {
    /// Which pool this process runs — a deployment runs one process per pool.
    #[arg(short = 't', long = "type")]
    pub pool: PoolArg,

    /// Path to a TOML config file.
    #[arg(short = 'c', long = "config", default_value = "darc.toml")]
    pub config: String,

    /// File of seed URLs, one per line; blank lines and `#`-comments ignored.
    #[arg(short = 'f', long = "file")]
    pub seed_file: Option<String>,

    /// Verbose logging.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Positional seed URLs, appended to the fetch queue on startup.
    pub urls: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PoolArg {
    Crawler,
    Loader,
}
