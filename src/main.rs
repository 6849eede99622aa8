mod ui;

use std::{
    error::Error,
    fs::File,
    io::{self, stdin},
    path::PathBuf,
};

use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::KeyCode,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use kraepelin::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    logging,
    report::Report,
    runtime::{apply_event, Command, CrosstermEventSource, FixedTicker, KrEvent, Runner},
    store::{ResultMeta, ResultStore},
    KrResult, ScoringMode, Session, SessionState, TestResult,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use time_humanize::HumanTime;
use tracing::{debug, info, warn};
use webbrowser::Browser;

/// timed column arithmetic test for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A Kraepelin (Pauli) column arithmetic test: add neighbouring digits as fast and as accurately as you can. Reports speed, accuracy, consistency and endurance, and keeps a local history of results."
)]
pub struct Cli {
    /// test length in minutes; in the authentic format the sheet is resized to fill it
    #[clap(short = 'd', long)]
    duration_minutes: Option<f64>,

    /// number of columns on the sheet
    #[clap(short = 'c', long)]
    columns: Option<usize>,

    /// digits per column
    #[clap(short = 'l', long)]
    column_length: Option<usize>,

    /// seconds allowed on each column
    #[clap(short = 's', long)]
    seconds_per_column: Option<u32>,

    /// two-digit rows against a single countdown instead of the full sheet
    #[clap(long)]
    simplified: bool,

    /// how expected answers are derived
    #[clap(long, value_enum)]
    scoring: Option<ScoringMode>,

    /// seed for reproducible sheets
    #[clap(long)]
    seed: Option<u64>,

    /// print the N most recent stored results and exit
    #[clap(long, value_name = "N")]
    history: Option<usize>,

    /// write every stored result to PATH as CSV and exit
    #[clap(long, value_name = "PATH")]
    export_csv: Option<PathBuf>,

    /// print the final result as JSON after the TUI closes
    #[clap(long)]
    json: bool,
}

impl Cli {
    /// Layers command line flags over the saved configuration.
    fn apply_to(&self, mut config: Config) -> Config {
        if self.simplified {
            config.simplified = true;
        }
        if let Some(secs) = self.seconds_per_column {
            config.seconds_per_column = secs;
        }
        if let Some(len) = self.column_length {
            config.column_length = len;
        }
        if let Some(minutes) = self.duration_minutes {
            config = config.with_duration(minutes);
        }
        // an explicit column count wins over the duration-derived one
        if let Some(columns) = self.columns {
            config.number_of_columns = columns;
        }
        if self.scoring.is_some() {
            config.scoring = self.scoring;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config
    }
}

#[derive(Debug)]
pub struct App {
    pub config: Config,
    pub session: Session,
    pub report: Option<Report>,
    pub last_result: Option<TestResult>,
    pub saved_id: Option<i64>,
}

impl App {
    pub fn new(config: Config) -> KrResult<Self> {
        let session = new_session(&config)?;
        Ok(Self {
            config,
            session,
            report: None,
            last_result: None,
            saved_id: None,
        })
    }

    pub fn reset(&mut self) -> KrResult<()> {
        self.session = new_session(&self.config)?;
        self.report = None;
        self.saved_id = None;
        Ok(())
    }

    /// Builds the report for a finished session and stores it when a store is available.
    pub fn record_result(&mut self, store: Option<&mut ResultStore>) {
        let Some(result) = self.session.result() else {
            return;
        };
        self.report = Some(Report::from_result(result));
        self.last_result = Some(result.clone());

        if let Some(store) = store {
            let meta = ResultMeta {
                taken_at: Local::now(),
                scoring: self.session.config().scoring,
                duration_minutes: self.session.config().duration_minutes,
            };
            match store.save(result, &meta) {
                Ok(id) => self.saved_id = Some(id),
                Err(err) => warn!(%err, "could not store result"),
            }
        }
    }
}

fn new_session(config: &Config) -> KrResult<Session> {
    let session_config = config.session_config();
    let mut session = match config.seed {
        Some(seed) => Session::seeded(session_config, seed)?,
        None => Session::new(session_config)?,
    };
    session.show_instructions()?;
    Ok(session)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(AppDirs::log_path().as_deref());

    if let Some(limit) = cli.history {
        return print_history(limit);
    }
    if let Some(path) = &cli.export_csv {
        let store = ResultStore::open_default()?;
        let rows = store.export_csv(File::create(path)?)?;
        println!("exported {rows} results to {}", path.display());
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config = cli.apply_to(FileConfigStore::new().load());
    let mut app = App::new(config)?;
    let mut store = match ResultStore::open_default() {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(%err, "result history unavailable");
            None
        }
    };

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app, store.as_mut());

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    outcome?;

    if cli.json {
        if let Some(result) = &app.last_result {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }

    Ok(())
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut store: Option<&mut ResultStore>,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::per_second());
    terminal.draw(|f| ui::draw(app, f))?;

    loop {
        let event = runner.step();
        let before = app.session.state();

        if let KrEvent::Key(key) = &event {
            if before == SessionState::Finished {
                match key.code {
                    KeyCode::Char('r') => {
                        app.reset()?;
                        terminal.draw(|f| ui::draw(app, f))?;
                        continue;
                    }
                    KeyCode::Char('t') => {
                        if let Some(report) = &app.report {
                            if Browser::is_available() {
                                webbrowser::open(&report.share_url()).unwrap_or_default();
                            }
                        }
                        continue;
                    }
                    _ => {}
                }
            }
            if Command::from_key(key, before) == Some(Command::Quit) {
                info!(state = %before, "quit");
                break;
            }
        }

        match apply_event(&mut app.session, &event) {
            Ok(_) => {}
            Err(err) if err.is_recoverable() => debug!(%err, "ignored event"),
            Err(err) => return Err(err.into()),
        }

        let after = app.session.state();
        if after == SessionState::Running && before != SessionState::Running {
            runner.reset_clock();
        }
        if after == SessionState::Finished && before != SessionState::Finished {
            app.record_result(store.as_deref_mut());
        }

        terminal.draw(|f| ui::draw(app, f))?;
    }

    Ok(())
}

fn print_history(limit: usize) -> Result<(), Box<dyn Error>> {
    let store = ResultStore::open_default()?;
    let results = store.recent(limit)?;
    if results.is_empty() {
        println!("no stored results yet");
        return Ok(());
    }

    let now = Local::now();
    for stored in results {
        let ago = (now - stored.meta.taken_at).num_seconds().max(0);
        let r = &stored.result;
        println!(
            "#{:<4} {:<16} {:>5.1} min  {:>4}/{:<4} acc {:>5.1}%  spd {:.2}  con {:.2}  end {:.2}",
            stored.id,
            HumanTime::from_seconds(-ago).to_string(),
            stored.meta.duration_minutes,
            r.correct_answers,
            r.total_answers,
            r.accuracy * 100.0,
            r.speed,
            r.consistency,
            r.endurance,
        );
    }
    Ok(())
}
