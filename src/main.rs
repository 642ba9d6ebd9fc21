use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use humantype::control::{ControlMessage, ControlResponse, ControlSurface};
use humantype::dispatch::console::ConsoleHost;
use humantype::dispatch::{open_host, resolve_backend, DispatchBackend, TargetHost};
use humantype::model::StartPayload;
use humantype::pause::sleep_until_stopped;
use humantype::session::SessionRegistry;

const LOG_ENV: &str = "HUMANTYPE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Auto,
    Console,
    X11,
}

impl BackendArg {
    fn to_library(self) -> DispatchBackend {
        match self {
            BackendArg::Auto => DispatchBackend::Auto,
            BackendArg::Console => DispatchBackend::Console,
            BackendArg::X11 => DispatchBackend::X11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Mild jitter and hesitation, no mistakes.
    Normal,
    /// Mistakes, long hesitations and random pauses.
    Bad,
    /// Minimal jitter, no mistakes.
    Perfect,
}

#[derive(Debug, Args, Clone)]
struct TuningArgs {
    /// Target speed in words per minute (5-240) [default: 60]
    #[arg(long)]
    wpm: Option<f64>,

    /// Speed fluctuation in words per minute (0-160) [default: 0]
    #[arg(long)]
    fluctuation: Option<f64>,

    /// Typo probability per letter in percent (0-100, bad mode only) [default: 0]
    #[arg(long)]
    typo_chance: Option<f64>,

    /// Typing personality [default: normal]
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Longest random pause in seconds (0-30, bad mode only) [default: 0]
    #[arg(long)]
    max_pause: Option<f64>,
}

impl TuningArgs {
    fn to_payload(&self) -> StartPayload {
        let mode = self.mode.unwrap_or(ModeArg::Normal);
        StartPayload {
            text: None,
            wpm: self.wpm,
            fluct: self.fluctuation,
            typo_chance: self.typo_chance,
            bad_mode: mode == ModeArg::Bad,
            perfect_mode: mode == ModeArg::Perfect,
            max_pause_sec: self.max_pause,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "humantype")]
#[command(about = "Human-like keystroke entry into the focused document", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type a text into the active target
    Type {
        /// Input backend.
        ///
        /// - auto: X11 when a display is available
        /// - console: dry run; prints the trace and the resulting text
        /// - x11: type into the focused X11 window (XTEST)
        #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
        backend: BackendArg,

        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Typing request as JSON (text, wpm, fluct, typoChance, badMode, perfectMode, maxPauseSec)
        #[arg(
            long,
            value_name = "PATH",
            conflicts_with_all = ["wpm", "fluctuation", "typo_chance", "mode", "max_pause"]
        )]
        request: Option<PathBuf>,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Countdown seconds before typing starts
        #[arg(long, default_value_t = 5)]
        countdown: u64,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Disable console typing trace output
        #[arg(long)]
        no_trace: bool,
    },

    /// Serve JSON-lines control messages on stdin/stdout
    Serve {
        /// Input backend.
        #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
        backend: BackendArg,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,

        /// Disable console typing trace output
        #[arg(long)]
        no_trace: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_request(path: &Path) -> Result<StartPayload> {
    let json =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).context("failed to parse typing request JSON")
}

fn build_host(
    backend: BackendArg,
    trace: bool,
) -> Result<(Arc<dyn TargetHost>, Option<Arc<ConsoleHost>>)> {
    match resolve_backend(backend.to_library())? {
        DispatchBackend::Console => {
            let console = Arc::new(ConsoleHost::new(trace));
            let host: Arc<dyn TargetHost> = console.clone();
            Ok((host, Some(console)))
        }
        resolved => Ok((open_host(resolved, trace)?, None)),
    }
}

fn expect_ok(response: ControlResponse, what: &str) -> Result<ControlResponse> {
    if response.ok {
        return Ok(response);
    }
    Err(anyhow!(
        "{what} failed: {}",
        response.message.as_deref().unwrap_or("unknown error")
    ))
}

async fn type_command(
    backend: BackendArg,
    input: Option<PathBuf>,
    request: Option<PathBuf>,
    tuning: TuningArgs,
    countdown_secs: u64,
    seed: Option<u64>,
    trace: bool,
) -> Result<()> {
    let mut payload = match &request {
        Some(path) => load_request(path)?,
        None => tuning.to_payload(),
    };
    if let Some(path) = &input {
        payload.text = Some(read_input(path)?);
    }
    if payload.text.is_none() {
        bail!("no text to type: pass --input, or a --request file with a \"text\" field");
    }

    let (host, console) = build_host(backend, trace)?;
    let registry = Arc::new(SessionRegistry::new());
    let surface = ControlSurface::new(host, registry.clone(), seed);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let registry = registry.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
            registry.request_stop_all();
        })
        .context("failed to install Ctrl+C handler")?;
    }

    if countdown_secs > 0 {
        eprintln!("Focus the target document. Starting in {countdown_secs}s...");
        for remaining in (1..=countdown_secs).rev() {
            if stop.load(Ordering::SeqCst) {
                return Err(anyhow!("aborted"));
            }
            eprintln!("{remaining}...");
            sleep_until_stopped(1000, || stop.load(Ordering::SeqCst)).await;
        }
        if stop.load(Ordering::SeqCst) {
            return Err(anyhow!("aborted"));
        }
    }

    let status = expect_ok(
        surface.handle(ControlMessage::GetActiveSession).await,
        "finding the active target",
    )?;
    let session_id = status.session_id;

    expect_ok(
        surface
            .handle(ControlMessage::Attach {
                session_id: session_id.clone(),
            })
            .await,
        "attach",
    )?;

    let started = surface
        .handle(ControlMessage::Start {
            session_id: session_id.clone(),
            payload,
        })
        .await;

    surface
        .handle(ControlMessage::Detach {
            session_id: session_id.clone(),
        })
        .await;

    let started = expect_ok(started, "typing")?;
    eprintln!("{}", started.message.as_deref().unwrap_or("Done."));

    if let (Some(console), Some(id)) = (console, &session_id) {
        if let Some(text) = console.text(id) {
            println!("{text}");
        }
    }

    if stop.load(Ordering::SeqCst) {
        return Err(anyhow!("aborted"));
    }
    Ok(())
}

async fn serve_command(backend: BackendArg, seed: Option<u64>, trace: bool) -> Result<()> {
    let (host, _console) = build_host(backend, trace)?;
    let registry = Arc::new(SessionRegistry::new());
    let surface = Arc::new(ControlSurface::new(host, registry.clone(), seed));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stop_registry = registry.clone();
    ctrlc::set_handler(move || {
        stop_registry.request_stop_all();
        let _ = shutdown_tx.send(true);
    })
    .context("failed to install Ctrl+C handler")?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ControlResponse>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = out_rx.recv().await {
            let mut line =
                serde_json::to_string(&response).context("failed to serialize response")?;
            line.push('\n');
            stdout
                .write_all(line.as_bytes())
                .await
                .context("failed to write response")?;
            stdout.flush().await.context("failed to flush stdout")?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let summary = surface
        .serve(BufReader::new(tokio::io::stdin()), out_tx, shutdown_rx)
        .await
        .context("failed to read stdin")?;
    debug!(
        handled = summary.handled,
        peak_in_flight = summary.peak_in_flight,
        sessions = ?registry.ids(),
        "serve shutting down"
    );
    writer.await.context("response writer panicked")??;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Type {
            backend,
            input,
            request,
            tuning,
            countdown,
            seed,
            no_trace,
        } => {
            // Fail fast on unsupported environments/backends.
            resolve_backend(backend.to_library())?;
            type_command(backend, input, request, tuning, countdown, seed, !no_trace).await?;
        }
        Command::Serve {
            backend,
            seed,
            no_trace,
        } => {
            resolve_backend(backend.to_library())?;
            serve_command(backend, seed, !no_trace).await?;
        }
    }

    Ok(())
}
