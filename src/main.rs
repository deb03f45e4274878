//! Muxlink CLI - attach to a remote multiplexer in control mode and mirror
//! its session locally.
//!
//! This is the binary entry point; see the `muxlink` library for the
//! protocol engine and model.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use muxlink::{Client, Config, Transport};

#[derive(Parser, Debug)]
#[command(name = "muxlink", version, about = "Mirror a remote terminal multiplexer over its control protocol")]
struct Cli {
    /// Server socket name (tmux -L).
    #[arg(short = 'L', long, global = true)]
    socket: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach to a session and mirror it (the default).
    Attach {
        /// Target session name or id; falls back to the configured default.
        target: Option<String>,

        /// Run without the TUI; useful for scripting and protocol debugging.
        #[arg(long)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("could not load configuration")?;

    let (target, headless) = match cli.command {
        Some(Command::Attach { target, headless }) => (target, headless),
        None => (None, false),
    };

    init_logging(headless)?;

    let Some(target) = target.or_else(|| config.default_target.clone()) else {
        bail!("no target session: pass one with `muxlink attach <target>` or set default_target in the config");
    };

    let socket = cli.socket.as_deref().or(config.socket_name.as_deref());
    let (transport, mut child) =
        Transport::process(&config.tmux_bin, socket, &target).context("could not attach")?;

    let client = Client::new(config.options(), transport);
    let result = if headless { client.run_headless().await } else { client.run().await };

    // The child follows the transport down; reap it so it does not linger.
    let _ = child.kill().await;
    let _ = child.wait().await;

    result
}

/// Route logs to a file while the TUI owns the terminal; stderr otherwise.
fn init_logging(headless: bool) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    if headless {
        env_logger::Builder::from_env(env).init();
    } else {
        let path = Config::config_dir()?.join("muxlink.log");
        let file = std::fs::File::create(&path)
            .with_context(|| format!("could not create log file {}", path.display()))?;
        env_logger::Builder::from_env(env)
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    }
    Ok(())
}
