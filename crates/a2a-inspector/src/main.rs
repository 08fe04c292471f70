use std::env;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use a2a_inspector::config::{self, APP_NAME, AppConfig};
use a2a_inspector::ids::CHANNEL_TRACE_ID;
use a2a_inspector::target::{collect_headers, normalize_agent_url, parse_header_arg};
use a2a_inspector::{
    BackoffPolicy, ChannelAdapter, HttpCardFetcher, Intent, Phase, SessionController,
    TraceCategory, WsConnector,
};

mod console;

use console::{ConsoleCommand, SessionView};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_chat(ctx: RuntimeContext, cmd: ChatCommand) -> Result<()> {
    handle_chat(&ctx, cmd).await
}

#[tokio::main]
async fn async_card(ctx: RuntimeContext, cmd: CardCommand) -> Result<()> {
    handle_card(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("using config file {}", ctx.config_path.display());

    match cli.command {
        Command::Chat(cmd) => async_chat(ctx, cmd),
        Command::Card(cmd) => async_card(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Inspect and chat with A2A agents through an inspector backend.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Maximum seconds to wait for the handshake
    #[arg(long = "timeout", value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to an agent and chat interactively
    Chat(ChatCommand),
    /// Fetch and validate an agent card, then exit
    Card(CardCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct TargetArgs {
    /// Agent URL (http:// is assumed when no scheme is given)
    agent_url: String,
    /// Extra header sent to the agent, as NAME=VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME=VALUE", value_parser = parse_header_arg)]
    headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Args)]
struct ChatCommand {
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Clone, Args)]
struct CardCommand {
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_path: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_path = config::resolve_config_path(common.config.as_deref())
            .context("resolving config path")?;
        let config = config::load_or_init_config(&config_path, common.dry_run)
            .with_context(|| format!("loading config from {}", config_path.display()))?;
        Ok(Self {
            common,
            config_path,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("a2a_inspector={level}")));

        let file_layer = match self.config.logging.file.as_deref() {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {path}"))?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(
            self.common
                .timeout
                .unwrap_or(self.config.server.request_timeout_secs),
        )
    }
}

fn build_controller(config: &AppConfig) -> Result<SessionController> {
    let connector = WsConnector::new(
        config.server.channel_url(),
        BackoffPolicy::from(&config.channel),
    );
    debug!("Channel endpoint {}", connector.url());
    let fetcher = HttpCardFetcher::from_config(&config.server).context("building HTTP client")?;
    Ok(SessionController::new(
        ChannelAdapter::new(connector),
        Arc::new(fetcher),
    ))
}

fn resolve_target(target: TargetArgs) -> Result<(String, a2a_inspector_protocol::CustomHeaders)> {
    let url = normalize_agent_url(&target.agent_url)?;
    let headers = collect_headers(target.headers);
    Ok((url, headers))
}

async fn handle_chat(ctx: &RuntimeContext, cmd: ChatCommand) -> Result<()> {
    let (url, headers) = resolve_target(cmd.target)?;
    let controller = build_controller(&ctx.config)?;
    let mut updates = controller.subscribe_updates();

    let (intent_tx, intent_rx) = mpsc::channel(32);
    let session = tokio::spawn(controller.run(intent_rx));

    info!("Connecting to {} via {}", url, ctx.config.server.base_url);
    intent_tx
        .send(Intent::Connect { url, headers })
        .await
        .context("session stopped before connecting")?;

    let mut view = SessionView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let json = ctx.common.json;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(text) = console::render_update(&update, json) {
                        println!("{text}");
                    }
                    view.apply(&update);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Display fell behind, skipped {} update(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let intent = match console::parse_line(&line) {
                    ConsoleCommand::Send(text) => {
                        if view.state.phase != Phase::Connected {
                            println!("-- not connected ({})", view.state.phase);
                            continue;
                        }
                        Intent::SendMessage(text)
                    }
                    ConsoleCommand::Disconnect => Intent::Disconnect,
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Raw(id) => {
                        print_trace(&view, Some(&id));
                        continue;
                    }
                    ConsoleCommand::Trace => {
                        print_trace(&view, None);
                        continue;
                    }
                    ConsoleCommand::Card => {
                        print_card(&view.state, json)?;
                        continue;
                    }
                    ConsoleCommand::Help => {
                        println!("{}", console::HELP);
                        continue;
                    }
                    ConsoleCommand::Unknown(input) => {
                        println!("-- unknown command {input}, try /help");
                        continue;
                    }
                    ConsoleCommand::Empty => continue,
                };
                if intent_tx.send(intent).await.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(intent_tx);
    session.await.context("session task panicked")?;
    Ok(())
}

fn print_trace(view: &SessionView, id: Option<&str>) {
    let entries: Vec<_> = match id {
        Some(id) => view.trace.by_id(id).collect(),
        None => view.trace.entries().iter().collect(),
    };
    if entries.is_empty() {
        println!("-- no trace entries");
    }
    for entry in entries {
        println!("{}", console::format_trace_entry(entry));
    }
}

fn print_card(state: &a2a_inspector::ConnectionState, json: bool) -> Result<()> {
    let Some(card) = state.descriptor.as_ref() else {
        println!("-- no agent card fetched");
        return Ok(());
    };

    let body = serde_json::json!({
        "card": card,
        "validation_errors": state.descriptor_validation_errors,
    });
    let text = if json {
        serde_json::to_string(&body)
    } else {
        serde_json::to_string_pretty(&body)
    }
    .context("serializing agent card")?;
    println!("{text}");
    Ok(())
}

async fn handle_card(ctx: &RuntimeContext, cmd: CardCommand) -> Result<()> {
    let (url, headers) = resolve_target(cmd.target)?;
    let mut controller = build_controller(&ctx.config)?;
    controller.connect(url, headers);

    let wait = async {
        while controller.state().descriptor.is_none()
            && !matches!(controller.state().phase, Phase::Failed(_))
        {
            controller.step().await;
        }
    };
    let timed_out = tokio::time::timeout(ctx.handshake_timeout(), wait)
        .await
        .is_err();
    controller.channel().disconnect();

    if timed_out {
        let cause = controller
            .trace()
            .latest(CHANNEL_TRACE_ID, TraceCategory::Error)
            .map(|entry| format!(": {}", entry.payload))
            .unwrap_or_default();
        return Err(anyhow!(
            "timed out after {:?} waiting for the agent card{}",
            ctx.handshake_timeout(),
            cause
        ));
    }

    if let Phase::Failed(reason) = &controller.state().phase {
        return Err(anyhow!("agent card fetch failed: {reason}"));
    }

    print_card(controller.state(), ctx.common.json)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.config_path.display()
                );
                return Ok(());
            }
            config::write_default_config(&ctx.config_path)
                .with_context(|| format!("resetting {}", ctx.config_path.display()))
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
