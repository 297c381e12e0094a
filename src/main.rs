//! CLI entry point for the `zio` tool
//!
//! Provides command-line access to:
//! - the discovered device tree (`list`)
//! - blocks from one channel (`dump`)
//! - blocks from every ready channel (`watch`)
//! - saved control records (`decode`)
//!
//! # Usage
//!
//! ```bash
//! zio list
//! zio dump zzero-0000-0-0 --blocks 4
//! zio watch --direction input --count 100
//! zio decode block.ctrl
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use zio::{
    logging, Block, ControlRecord, Device, Direction, Multiplexer, Payload, ZioConfig, ZioContext,
};

#[derive(Parser)]
#[command(name = "zio")]
#[command(about = "Inspect and read ZIO acquisition devices", long_about = None)]
struct Cli {
    /// Config file (defaults to config/zio.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Input,
    Output,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Input => Direction::Input,
            DirectionArg::Output => Direction::Output,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print devices, channel-sets and channels with their attributes
    List,

    /// Read blocks from one channel
    Dump {
        /// Channel devname, e.g. zzero-0000-0-0
        channel: String,

        /// Number of blocks to read
        #[arg(long, default_value = "1")]
        blocks: usize,

        /// Print raw data bytes instead of decoded samples
        #[arg(long)]
        raw: bool,
    },

    /// Read blocks from every channel as they become ready
    Watch {
        /// Only channels of this direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,

        /// Per-wait timeout in milliseconds (overrides config; negative waits forever)
        #[arg(long, allow_hyphen_values = true)]
        timeout_ms: Option<i64>,

        /// Stop after this many blocks
        #[arg(long)]
        count: Option<usize>,
    },

    /// Decode a control record saved to a file
    Decode {
        /// File holding exactly one control record
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ZioConfig::load_from(path),
        None => ZioConfig::load(),
    }
    .context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    match cli.command {
        Commands::List => list(config),
        Commands::Dump {
            channel,
            blocks,
            raw,
        } => dump(config, &channel, blocks, raw),
        Commands::Watch {
            direction,
            timeout_ms,
            count,
        } => {
            if let Some(ms) = timeout_ms {
                config.acquisition.poll_timeout_ms = ms;
            }
            watch(config, direction.map(Direction::from), count)
        }
        Commands::Decode { file } => decode(&file),
    }
}

fn print_attributes(dir: &zio::sysfs::ObjectDir, indent: usize) {
    for attr in dir.attributes() {
        let value = attr.read().unwrap_or_else(|_| "<unreadable>".to_string());
        // binary attributes such as current-control are not printable
        if value.chars().all(|c| !c.is_control()) {
            println!("{:indent$}{} = {}", "", attr.name(), value, indent = indent);
        }
    }
}

fn print_device(dev: &Device) {
    println!("{}", dev.devname());
    print_attributes(dev.dir(), 2);
    for cset in dev.csets() {
        println!("  cset {} ({})", cset.name(), cset.direction());
        print_attributes(cset.dir(), 4);
        if let Some(trigger) = cset.trigger() {
            println!("    trigger ({:?})", trigger.kind());
            print_attributes(trigger.dir(), 6);
        }
        for channel in cset.channels() {
            let chan = channel.lock();
            let cdev = if chan.interface().is_some() { " [cdev]" } else { "" };
            println!("    chan {}{}", chan.devname(), cdev);
            print_attributes(chan.dir(), 6);
        }
    }
}

fn list(config: ZioConfig) -> Result<()> {
    let ctx = ZioContext::new(config)?;
    println!("buffers: {}", ctx.available_buffers().join(", "));
    println!("triggers: {}", ctx.available_triggers().join(", "));
    for dev in ctx.devices() {
        print_device(dev);
    }
    Ok(())
}

fn print_block(devname: &str, block: &Block) {
    if let Some(ctrl) = &block.control {
        println!("{devname}:");
        print!("{ctrl}");
    }
    match &block.data {
        Some(Payload::Samples(samples)) => println!("Data: {:?}", samples.to_wide()),
        Some(Payload::Raw(bytes)) => println!("Data: {bytes:02x?}"),
        None => {}
    }
}

fn dump(config: ZioConfig, devname: &str, blocks: usize, raw: bool) -> Result<()> {
    let ctx = ZioContext::new(config)?;
    let channel = ctx
        .channel(devname)
        .with_context(|| format!("no channel named {devname}"))?;
    let mut chan = channel.lock();
    if chan.direction() != Direction::Input {
        bail!("{devname} is an output channel");
    }
    for _ in 0..blocks {
        let block = chan.read_block(true, true, !raw)?;
        print_block(devname, &block);
    }
    chan.close_interface();
    Ok(())
}

fn watch(config: ZioConfig, direction: Option<Direction>, count: Option<usize>) -> Result<()> {
    let timeout = config.acquisition.poll_timeout();
    let ctx = ZioContext::new(config)?;
    let channels = ctx.open_channels(direction)?;
    let mut mux = Multiplexer::new();
    let registered = mux.register(&channels, direction)?;
    if registered == 0 {
        bail!("no input channels with a char-device interface to watch");
    }
    info!(registered, "Watching channels");

    let limit = count.unwrap_or(usize::MAX);
    for item in mux.next_ready(timeout).take(limit) {
        match item {
            Ok((channel, block)) => {
                let devname = channel.lock().devname().to_string();
                print_block(&devname, &block);
            }
            Err(e) => warn!(error = %e, "Block read failed"),
        }
    }
    Ok(())
}

fn decode(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let ctrl = ControlRecord::decode(&bytes)?;
    print!("{ctrl}");
    if !ctrl.is_supported_version() {
        println!("(unsupported major version {})", ctrl.major_version);
    }
    Ok(())
}
