use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use blog_avail::batch::{Batch, Progress, partition};
use blog_avail::check::{CheckError, Outcome};
use blog_avail::config::{
    ConfigError, Credentials, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, Pacing, Platform,
};
use blog_avail::handle::{Handle, MAX_HANDLE_LENGTH};
use blog_avail::session::{AuthError, Session};

#[derive(Parser)]
#[command(
    name = "blog-avail",
    about = "Check whether Tumblr blog handles are truly available",
    after_help = "Logs in, probes each handle's blog page, and asks the availability \
                  endpoint only when the page alone is not conclusive.\n\n\
                  Outcomes: available, purgatory (reserved or blocked), cursed-purgatory \
                  (endpoint says available but a page exists), taken, password-protected, \
                  private, and mystery-taken / mystery-untaken when the signals disagree \
                  in an unrecognized way."
)]
struct Cli {
    /// Handles to check, e.g. `example` for example.tumblr.com (read from stdin if none)
    #[arg(allow_hyphen_values = true)]
    handles: Vec<String>,

    /// JSON file with `email` and `password` keys
    #[arg(short, long, value_name = "FILE", default_value = "creds.json")]
    credential_file: PathBuf,

    /// JSON file overriding platform endpoints and page markers
    #[arg(long, value_name = "FILE")]
    platform_file: Option<PathBuf>,

    /// Shortest pause between checks, in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_MIN_DELAY)]
    min_delay: f64,

    /// Longest pause between checks, in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_MAX_DELAY)]
    max_delay: f64,

    /// Suppress output, exit code only
    #[arg(short, long)]
    quiet: bool,

    /// Only print available handles
    #[arg(short, long)]
    available_only: bool,

    /// Log more to stderr (repeat for more detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Anything that stops a run after the handles were read.
enum RunError {
    Config(ConfigError),
    Auth(AuthError),
    Check(CheckError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Auth(e) => write!(f, "{e}"),
            Self::Check(e) => write!(f, "{e}"),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<AuthError> for RunError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<CheckError> for RunError {
    fn from(e: CheckError) -> Self {
        Self::Check(e)
    }
}

/// Prints one padded line per handle as results arrive.
struct Table {
    width: usize,
    quiet: bool,
    available_only: bool,
    all_available: bool,
    in_flight: bool,
}

impl Progress for Table {
    fn checking(&mut self, handle: &Handle) {
        if self.quiet || self.available_only {
            return;
        }
        // the check can take a while; show which handle is in flight
        print!("{:<width$}", handle.as_str(), width = self.width);
        io::stdout().flush().ok();
        self.in_flight = true;
    }

    fn checked(&mut self, handle: &Handle, outcome: Outcome) {
        self.in_flight = false;
        if !outcome.is_available() {
            self.all_available = false;
        }
        if self.quiet {
            return;
        }
        let label = if outcome.is_available() {
            outcome.label().to_uppercase()
        } else {
            outcome.label().to_owned()
        };
        if !self.available_only {
            println!("{label}");
        } else if outcome.is_available() {
            println!("{:<width$}{label}", handle.as_str(), width = self.width);
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_stdin() -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            names.push(trimmed.to_owned());
        }
    }
    Ok(names)
}

fn run(cli: &Cli, handles: &[Handle], table: &mut Table) -> Result<(), RunError> {
    let pacing = Pacing::from_secs(cli.min_delay, cli.max_delay)?;
    let platform = match &cli.platform_file {
        Some(path) => Platform::load(path)?,
        None => Platform::default(),
    };
    let credentials = Credentials::load(&cli.credential_file)?;

    Session::scoped(&credentials, &platform, |session| -> Result<(), RunError> {
        Batch::new(session, &platform, pacing).run(handles, table)?;
        Ok(())
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut names = cli.handles.clone();
    if names.is_empty() {
        match read_stdin() {
            Ok(lines) => names = lines,
            Err(e) => {
                eprintln!("error: reading stdin: {e}");
                return ExitCode::from(2);
            }
        }
    }

    if names.is_empty() {
        eprintln!("error: no handles provided");
        eprintln!("usage: blog-avail [OPTIONS] [HANDLES...]");
        return ExitCode::from(2);
    }

    // Deduplicate while preserving order
    let mut seen = HashSet::new();
    names.retain(|n| seen.insert(n.clone()));

    let (handles, invalid) = partition(&names);
    if !invalid.is_empty() {
        eprintln!(
            "Handles must be 1-{MAX_HANDLE_LENGTH} characters of only a-z, 0-9 and -, \
             and must neither start nor end with a -"
        );
        eprintln!("The following handles are invalid and will be skipped:");
        for (name, reason) in &invalid {
            eprintln!("{name}\t{reason}");
        }
    }

    if handles.is_empty() {
        return ExitCode::from(1);
    }

    let width = handles.iter().map(|h| h.as_str().len()).max().unwrap_or(0) + 4;
    let mut table = Table {
        width,
        quiet: cli.quiet,
        available_only: cli.available_only,
        all_available: invalid.is_empty(),
        in_flight: false,
    };

    if let Err(e) = run(&cli, &handles, &mut table) {
        if table.in_flight {
            println!();
        }
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    if table.all_available {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
