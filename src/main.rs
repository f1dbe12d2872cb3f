//! Severity sweep CLI.
//!
//! Audits severity values across the supervisory store and repairs values
//! that no longer map to a configured level — either an explicit old→new
//! remap or the automatic next-lower policy. Dry run unless `--change` is
//! given.

use std::io::{self, Write as _};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sevsweep_core::{run, RunOptions, RunSummary, SweepError};
use sevsweep_postgres::{connect, PgConfig};

#[derive(Parser)]
#[command(name = "sevsweep")]
#[command(version)]
#[command(about = "Audit and repair alarm severity values in the supervisory store")]
struct Cli {
    /// Server node name or address
    #[arg(short, long, default_value = "localhost", env = "SEVSWEEP_NODE")]
    node: String,

    /// Server port number
    #[arg(short, long, default_value_t = 5432, env = "SEVSWEEP_PORT")]
    port: u16,

    /// Database name
    #[arg(long, default_value = "scada", env = "SEVSWEEP_DBNAME")]
    dbname: String,

    /// User name (omit to enter interactively)
    #[arg(short, long, env = "SEVSWEEP_USER")]
    user: Option<String>,

    /// Password (omit to enter interactively)
    #[arg(short = 'a', long, env = "SEVSWEEP_PASSWORD")]
    password: Option<String>,

    /// Delay in milliseconds between server requests during the write phase
    #[arg(short, long, default_value_t = 1)]
    delay: u64,

    /// Remap all values recorded at this severity (requires --to)
    #[arg(short = 'f', long)]
    from: Option<i64>,

    /// Remap matched values to this severity (requires --from)
    #[arg(short = 't', long)]
    to: Option<i64>,

    /// Make database changes. THE STORE IS NOT CHANGED UNLESS THIS IS SET
    #[arg(short, long)]
    change: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Per-row detail during execution
    #[arg(short, long)]
    verbose: bool,

    /// Pause for Enter after completion
    #[arg(short, long)]
    wait: bool,

    /// Final summary format
    #[arg(long, default_value = "pretty", value_enum)]
    format: SummaryFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Pretty,
    Json,
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("sevsweep={level},sevsweep_core={level},sevsweep_postgres={level}").into()
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end().to_string())
}

/// Launched without a user name, we were most likely double-clicked from a
/// file manager: keep the window open afterwards, and get an explicit go
/// ahead before a run that writes.
fn confirm_interactive_change() -> io::Result<bool> {
    println!(
        "\nStarting severity sweep with default options.\n\
         Run from the command line to specify options.\n\
         {}\n",
        "THIS PROGRAM CAN MAKE CHANGES TO YOUR STORE.".red().bold()
    );
    let answer = prompt("Type Y and Enter to continue, or Enter to exit: ")?;
    Ok(answer.eq_ignore_ascii_case("y"))
}

fn print_summary(summary: &RunSummary, format: SummaryFormat, applied: bool) {
    match format {
        SummaryFormat::Json => match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("summary serialization failed: {e}"),
        },
        SummaryFormat::Pretty => {
            println!();
            println!("{}", "Sweep complete.".bold());
            println!("  Tables scanned:       {}", summary.tables_scanned);
            println!("  Fields scanned:       {}", summary.fields_scanned);
            println!("  Rows with severities: {}", summary.rows_with_severity);
            println!("  Unmapped values:      {}", summary.unmapped);
            let changed = format!("  Severities changed:   {}", summary.changed);
            if applied {
                println!("{}", changed.green());
            } else {
                println!("{changed}");
                println!("  {}", "(dry run — use --change to apply)".yellow());
            }
            if summary.errors > 0 {
                println!(
                    "{}",
                    format!("  Errors:               {}", summary.errors).red()
                );
            }
            println!("  Duration:             {:.3} seconds", summary.elapsed_secs);
        }
    }
}

async fn sweep(cli: &Cli, user: String, password: String) -> Result<RunSummary, SweepError> {
    let config = PgConfig {
        host: cli.node.clone(),
        port: cli.port,
        dbname: cli.dbname.clone(),
        user,
        password,
    };
    let store = connect(&config).await?;
    tracing::info!("connected and logged in");

    let options = RunOptions {
        remap_from: cli.from,
        remap_to: cli.to,
        apply: cli.change,
        delay: Duration::from_millis(cli.delay),
    };
    run(&store, &options).await
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();
    init_tracing(&cli);

    println!("{}", "** Severity Sweep **".bold());

    let interactive = cli.user.is_none();
    if interactive {
        cli.wait = true;
        if cli.change {
            match confirm_interactive_change() {
                Ok(true) => {}
                Ok(false) => return ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{}", format!("prompt failed: {e}").red());
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    let credentials = (|| {
        let user = match cli.user.clone() {
            Some(user) => user,
            None => prompt("Enter store user name: ")?,
        };
        let password = match cli.password.clone() {
            Some(password) => password,
            None => prompt("Enter store password: ")?,
        };
        Ok::<_, io::Error>((user, password))
    })();
    let (user, password) = match credentials {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("{}", format!("prompt failed: {e}").red());
            return ExitCode::FAILURE;
        }
    };

    let code = match sweep(&cli, user, password).await {
        Ok(summary) => {
            print_summary(&summary, cli.format, cli.change);
            ExitCode::SUCCESS
        }
        Err(SweepError::AccessDenied(reason)) => {
            eprintln!(
                "{}",
                format!("Access denied ({reason}). Check user name and password, and that CAPS LOCK is off.")
                    .red()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            ExitCode::FAILURE
        }
    };

    if cli.wait {
        let _ = prompt("Press Enter to continue: ");
    }
    code
}
