mod attributes;
mod classify;
mod format;
mod map_draw;
mod service;
mod state;
mod ui;

use std::fs::File;
use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use service::RestClient;
use state::AppState;

const DEFAULT_ENDPOINT: &str = "https://services.arcgis.com/P3ePLMYs2RVChkJx/arcgis/rest/services/USDA_Census_of_Agriculture_2022_All/FeatureServer/0";

#[derive(Parser)]
#[command(
    name = "census-atlas",
    about = "County choropleth viewer for the USDA Census of Agriculture"
)]
struct Args {
    /// Feature service layer URL.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Log file; the alternate screen owns stdout, so logs go to a file.
    #[arg(long, default_value = "census-atlas.log")]
    log_file: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log = File::create(&args.log_file)
        .with_context(|| format!("creating log file {}", args.log_file))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log)))
        .init();

    let service = Arc::new(RestClient::new(&args.endpoint));
    let (tx, rx) = mpsc::channel();
    let mut state = AppState::new(service, tx).context("loading census layer")?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        terminal.draw(|f| ui::draw(f, &mut state))?;

        // Finished background classifications land here; stale generations
        // are dropped inside apply_outcome.
        while let Ok(outcome) = rx.try_recv() {
            state.apply_outcome(outcome);
        }

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(KeyEvent { code, kind: KeyEventKind::Press, .. }) => {
                    if state.handle_key(code) {
                        break;
                    }
                }
                Event::Mouse(mouse) => state.handle_mouse(mouse),
                _ => {}
            }
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
