mod app;
mod external;
mod ui;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal;
use directories::ProjectDirs;
use termdoc_core::{
    Command, Config, DocumentProvider, FileStateStore, Session, StateStore, ViewerError,
};
use termdoc_render::PdfRenderFactory;
use termdoc_tty::{query_screen_geometry, PageDisplay, Transport, TtyReplies};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::app::{App, LoopAction};

#[derive(Debug, Parser)]
#[command(name = "termdoc", version, about = "Document viewer for kitty-compatible terminals")]
struct Args {
    /// Logical page to open on
    #[arg(short = 'p', long = "page")]
    page: Option<String>,

    /// Number shown on the first physical page
    #[arg(short = 'f', long = "first-page", allow_negative_numbers = true)]
    first_page: Option<i64>,

    /// Server address of the editor that receives notes
    #[arg(long = "nvim-listen-address")]
    nvim_listen_address: Option<String>,

    /// Citation key of the document
    #[arg(long = "citekey")]
    citekey: Option<String>,

    /// Do not restore saved position and view settings
    #[arg(long = "ignore-cache")]
    ignore_cache: bool,

    /// Documents to open
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let missing: Vec<String> = args
        .files
        .iter()
        .filter(|path| !path.exists())
        .map(|path| path.display().to_string())
        .collect();
    if !missing.is_empty() {
        bail!("file not found: {}", missing.join(", "));
    }

    let project_dirs = ProjectDirs::from("net", "termdoc", "termdoc")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;
    let config = Config::load(&project_dirs.config_dir().join("config.toml"))?;

    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_dir)?);
    let mut session = Session::new(store);
    session.set_ignore_cache(args.ignore_cache);
    session.set_default_first_page_offset(config.default_first_page_offset);

    let provider: Arc<dyn DocumentProvider> = Arc::new(PdfRenderFactory::new()?);
    for path in &args.files {
        if let Err(err) = session.open_with(&*provider, path.clone()).await {
            if args.files.len() == 1 {
                return Err(err.context(format!("failed to open {:?}", path)));
            }
            warn!(?err, path = %path.display(), "skipping unreadable document");
            eprintln!("skipping {}: {err:#}", path.display());
        }
    }
    if session.is_empty() {
        bail!("none of the given documents could be opened");
    }

    if let Some(key) = args.citekey.clone() {
        session.set_citation_key(Some(key));
    }
    if let Some(offset) = args.first_page {
        if let Some(doc) = session.active_mut() {
            doc.set_first_page_offset(offset);
        }
    }
    if let Some(label) = args.page.clone() {
        session.apply(Command::GotoLogicalPage { label })?;
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;

    let mut transport = Transport::new(stdout, TtyReplies::stdin(), config.handshake_timeout())
        .with_z_index(config.z_index);
    if !transport.query_support()? {
        return Err(ViewerError::UnsupportedTerminal(
            "no reply to the graphics query".into(),
        )
        .into());
    }
    let screen = query_screen_geometry()?;
    info!(?screen, "terminal ready");

    let display = PageDisplay::new(transport, config.tint_color, config.transfer_format);
    let mut app = App::new(session, Arc::clone(&provider), display, screen);
    app.set_nvim_address(args.nvim_listen_address.clone());
    app.watch_files(config.watch_interval());

    let outcome = run(&mut app).await;
    let teardown = app.shutdown();
    outcome.and(teardown)
}

async fn run<W: Write, R: termdoc_tty::ReplySource>(app: &mut App<W, R>) -> Result<()> {
    loop {
        app.redraw()?;
        if app.replay_typed_ahead()? == LoopAction::Quit {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            if let Event::Resize(..) = ev {
                match query_screen_geometry() {
                    Ok(screen) => app.set_screen(screen),
                    Err(err) => warn!(?err, "keeping previous screen size"),
                }
            }
            if app.handle_event(ev)? == LoopAction::Quit {
                break;
            }
            app.draw_status()?;
        } else {
            app.poll_watcher().await?;
        }
    }
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "termdoc.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
