mod commands;
mod generator;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "Codegrade CLI - Grade C submissions locally and scaffold test cases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file and run it against a test case file
    Run {
        /// C source file to grade
        #[arg(short, long)]
        source: String,

        /// Test case specification (JSON); omitted means a smoke test
        #[arg(short, long)]
        tests: Option<String>,

        /// Engine config file (defaults to $CODEGRADE_CONFIG or config/engine.json)
        #[arg(short, long)]
        config: Option<String>,

        /// Print the raw JSON report instead of a summary
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show the effective configuration and probe the toolchain
    Check {
        /// Engine config file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a grading project with a default config and a sample test
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Generate a single-case test file from an expected output
    NewTest {
        /// Expected program output
        #[arg(short, long)]
        expected: String,

        /// Text fed to the program's stdin
        #[arg(short, long, default_value = "")]
        input: String,

        /// Output file (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            tests,
            config,
            json,
        } => {
            let code = commands::run_submission(&source, tests.as_deref(), config.as_deref(), json).await?;
            std::process::exit(code);
        }
        Commands::Check { config } => {
            commands::check_toolchain(config.as_deref()).await?;
        }
        Commands::Init { path } => {
            commands::init_project(&path)?;
        }
        Commands::NewTest {
            expected,
            input,
            output,
        } => {
            commands::new_test(&expected, &input, output.as_deref())?;
        }
    }

    Ok(())
}
