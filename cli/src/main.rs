//! `boa-inspector` runs the debugger agent against a scripted engine.
//!
//! Input is a stream of protocol messages: front-end requests, plus `engine` messages that
//! drive the scripted engine when replaying a recorded session. Responses and events are
//! written to stdout with `Content-Length` framing. Logs go to stderr.

use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use boa_inspector::{
    InspectorConfig,
    protocol::{Framing, InspectorServer, StdioTransport, StreamTransport, Transport},
};
use clap::{Parser, ValueEnum, ValueHint};
use color_eyre::{Result, eyre::WrapErr};
use log::{LevelFilter, debug, info};
use simple_logger::SimpleLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFraming {
    /// `Content-Length` headers, as sent by protocol clients.
    ContentLength,
    /// One JSON message per line.
    Lines,
}

impl From<InputFraming> for Framing {
    fn from(framing: InputFraming) -> Self {
        match framing {
            InputFraming::ContentLength => Self::ContentLength,
            InputFraming::Lines => Self::Lines,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Opt {
    /// Recorded session to replay. Messages are read from stdin when omitted.
    #[arg(name = "FILE", value_hint = ValueHint::FilePath)]
    session: Option<PathBuf>,

    /// TOML file with agent settings.
    #[arg(long, short, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Async call stack depth; `0` disables async tracking.
    #[arg(long)]
    async_depth: Option<usize>,

    /// Regular expression of script URLs to blackbox.
    #[arg(long)]
    skip_pattern: Option<String>,

    /// How incoming messages are delimited. Session files default to `lines`, stdin to
    /// `content-length`.
    #[arg(long, value_enum)]
    framing: Option<InputFraming>,

    /// Log verbosity. `RUST_LOG` takes precedence when set.
    #[arg(long, default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,
}

fn load_config(opt: &Opt) -> Result<InspectorConfig> {
    let mut config = match &opt.config {
        Some(path) => read_config(path)?,
        None => InspectorConfig::default(),
    };
    if let Some(depth) = opt.async_depth {
        config.max_async_call_stack_depth = depth;
    }
    if let Some(pattern) = &opt.skip_pattern {
        config.skip_stack_pattern = Some(pattern.clone());
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<InspectorConfig> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("could not read config file {}", path.display()))?;
    toml::from_str(&text).wrap_err_with(|| format!("invalid config file {}", path.display()))
}

fn serve<T: Transport>(transport: T, config: InspectorConfig) -> Result<()> {
    debug!("agent configuration: {config:?}");
    let mut server = InspectorServer::new(transport, config)?;
    server.run().wrap_err("debugging session failed")?;
    info!(
        "session finished with {} breakpoints",
        server.agent().state_cookie().breakpoints.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    SimpleLogger::new().with_level(opt.log_level).env().init()?;

    let config = load_config(&opt)?;
    match &opt.session {
        Some(path) => {
            let file = File::open(path)
                .wrap_err_with(|| format!("could not open session {}", path.display()))?;
            info!("replaying {}", path.display());
            let framing = opt.framing.map_or(Framing::Lines, Framing::from);
            serve(StreamTransport::new(BufReader::new(file), io::stdout(), framing), config)
        }
        None => {
            let framing = opt.framing.map_or(Framing::ContentLength, Framing::from);
            serve(StdioTransport::stdio(framing), config)
        }
    }
}
