use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use pdflu::config::{default_config_path, load_config};
use pdflu::lookup::{default_sources, run_lookup, LookupError, LookupInput};
use pdflu::sources::SourceCapabilities;
use pdflu::ui::{header, is_terminal, terminal_width, Selection, Selector, Spinner};
use pdflu::utils::clipboard::{self, CopyMethod};
use pdflu::utils::entry_for;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// pdflu - Look up the BibTeX entry of an academic PDF
#[derive(Parser, Debug)]
#[command(name = "pdflu")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Look up the BibTeX entry of an academic PDF using Crossref and arXiv", long_about = None)]
struct Cli {
    /// Print detailed output
    #[arg(long)]
    verbose: bool,

    /// Print debug output
    #[arg(long)]
    debug: bool,

    /// Configuration file path (default: ~/.config/pdflu/pdflu.conf)
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Choose the result interactively
    #[arg(long, short)]
    interactive: bool,

    /// Search for TEXT instead of parsing a PDF
    #[arg(long, short, value_name = "TEXT", conflicts_with = "file")]
    query: Option<String>,

    /// Show the configuration environment variables and exit
    #[arg(long)]
    env: bool,

    /// PDF file to look up
    #[arg(value_name = "FILE", required_unless_present_any = ["query", "env"])]
    file: Option<PathBuf>,
}

/// Print the environment variables that override the config file
fn print_env_vars() {
    println!("pdflu Environment Variables");
    println!("===========================");
    println!();
    println!("Every config key can be set as PDFLU_<SECTION>__<KEY>:");
    println!();
    println!("[pdflu]");
    println!("  PDFLU_PDFLU__MAX_QUERY_RESULTS   Results per service per query (default: 10)");
    println!("  PDFLU_PDFLU__POLITE_POOL_EMAIL   Contact email for the Crossref polite pool");
    println!("  PDFLU_PDFLU__DISP_QUERY_RESULTS  Results shown for selection (default: 10)");
    println!("  PDFLU_PDFLU__USE_CLIPBOARD       Copy the entry to the clipboard (default: false)");
    println!("  PDFLU_PDFLU__MAX_QUERIES         Candidate queries per document, 0 = all (default: 3)");
    println!("  PDFLU_PDFLU__ARXIV_BIBTEX_STYLE  misc or article (default: misc)");
    println!("  PDFLU_PDFLU__FETCH_BIBTEX        Fetch publisher entries for DOIs (default: true)");
    println!("  PDFLU_PDFLU__SHOW_FIRST_LINES    Lines shown by the s command (default: 10)");
    println!("  PDFLU_PDFLU__FIELD_ORDER         Comma-separated BibTeX field order");
    println!("  PDFLU_PDFLU__MAX_RETRIES         Retries per service request (default: 0)");
    println!("  PDFLU_PDFLU__TIMEOUT_SECS        HTTP timeout in seconds (default: 30)");
    println!();
    println!("[parsing]");
    println!("  PDFLU_PARSING__MAX_PAGES          Pages parsed (default: 2)");
    println!("  PDFLU_PARSING__MAX_LINES          Max lines per candidate (default: 4)");
    println!("  PDFLU_PARSING__MIN_WORDS          Min words per candidate (default: 2)");
    println!("  PDFLU_PARSING__MAX_WORDS          Max words per candidate (default: 30)");
    println!("  PDFLU_PARSING__MAX_CHARS          Max characters per query (default: 200)");
    println!("  PDFLU_PARSING__LARGEST_FONT_ONLY  Query only the largest font (default: true)");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                          Logging filter (e.g., pdflu=debug)");
    if let Some(path) = default_config_path() {
        println!();
        println!("Default config file: {}", path.display());
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("warn,pdflu={}", level)),
    );

    // Timestamps only in debug output
    let timed = cli.debug.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
    });
    let plain = (!cli.debug).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .without_time()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(timed)
        .with(plain)
        .init();
}

/// Exit status for an error, from the first lookup error in its chain
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<LookupError>())
        .map(LookupError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref()).map_err(LookupError::from)?;
    tracing::debug!("{:?}", config);

    let input = match (&cli.query, &cli.file) {
        (Some(query), _) => LookupInput::Text(query.clone()),
        (None, Some(path)) => LookupInput::Pdf(path.clone()),
        (None, None) => return Err(LookupError::Input("No FILE or --query given".to_string()).into()),
    };

    let sources = default_sources(&config)
        .map_err(LookupError::from)
        .context("Failed to set up bibliography sources")?;
    let bibtex_source = sources
        .iter()
        .find(|s| s.capabilities().contains(SourceCapabilities::BIBTEX))
        .cloned();

    let mut out = io::stdout();
    if cli.interactive && !is_terminal() {
        tracing::warn!("stdin is not a terminal, reading selections from it anyway");
    }
    if cli.interactive {
        if let LookupInput::Pdf(path) = &input {
            writeln!(out, "{}", header(&format!("Parsing {}...", path.display())))?;
        }
    }

    let spinner = cli.interactive.then(|| Spinner::new("Querying Crossref and arXiv..."));
    let outcome = run_lookup(&input, &config, sources).await;
    if let Some(spinner) = &spinner {
        spinner.finish();
    }
    let outcome = outcome?;

    if cli.interactive {
        writeln!(out, "{}", header("Queried Crossref and arXiv with:"))?;
        for query in &outcome.queries {
            writeln!(out, "  \"{}\"", query)?;
        }
    }

    let index = if cli.interactive {
        let pdf = match &input {
            LookupInput::Pdf(path) => Some(path.as_path()),
            LookupInput::Text(_) => None,
        };
        let selection = Selector::new(io::stdin().lock(), io::stdout(), &outcome.results)
            .pdf(pdf)
            .show_first_lines(config.pdflu.show_first_lines)
            .width(terminal_width())
            .run()?;

        match selection {
            Selection::Selected(index) => index,
            Selection::Manual => return Err(LookupError::ManualEntry.into()),
            Selection::Quit => return Err(LookupError::Cancelled.into()),
        }
    } else {
        0
    };

    let selected = outcome
        .results
        .get(index)
        .ok_or(LookupError::NoResults)?;
    tracing::info!("Selected {:?}", selected.title);

    let entry = entry_for(selected, bibtex_source.as_deref(), &config.pdflu).await;

    if cli.interactive {
        writeln!(out, "{}", header("BibTeX entry:"))?;
    }
    writeln!(out, "{}", entry)?;

    if config.pdflu.use_clipboard {
        if cli.interactive {
            writeln!(out, "{}", header("Copying BibTeX entry to clipboard..."))?;
        }
        out.flush()?;
        match clipboard::copy(&entry) {
            Ok(CopyMethod::System) => tracing::info!("Copied BibTeX entry to the system clipboard"),
            Ok(CopyMethod::Terminal) => {
                tracing::info!("Copied BibTeX entry through the terminal (needs OSC 52 support)")
            }
            Err(e) => tracing::warn!("Could not copy to clipboard: {}", e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        std::process::exit(0);
    }

    init_tracing(&cli);

    // Selection prompts block their thread, so Ctrl-C is watched from a worker
    tokio::spawn(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!();
                fail(&LookupError::Interrupted.into());
            }
            Err(e) => tracing::debug!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    if let Err(e) = run(cli).await {
        fail(&e);
    }
}

/// Report `err` on stderr and exit with its status
fn fail(err: &anyhow::Error) -> ! {
    eprintln!("{} {:#}", "error:".red().bold(), err);
    std::process::exit(exit_code(err))
}
