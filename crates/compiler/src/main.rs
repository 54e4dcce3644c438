//! Slate Compiler CLI
//!
//! Command-line interface for compiling Slate sources to x86-64
//! assembly and for running parse/type checks without code generation.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;

use slatec::{ColorMode, DriverConfig};

#[derive(ClapParser)]
#[command(name = "slatec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Slate compiler - compile .sl sources to x86-64 assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .sl file to GNU assembler text
    Build {
        /// Input .sl source file
        input: PathBuf,

        /// Output path (defaults to the input with the configured
        /// output extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Driver configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Parse and type-check a .sl file without generating assembly
    Check {
        /// Input .sl source file
        input: PathBuf,

        /// Driver configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            config,
        } => {
            let config = load_config(config.as_deref());
            let output =
                output.unwrap_or_else(|| input.with_extension(&config.output_extension));
            run_build(&input, &output, &config);
        }
        Commands::Check { input, config } => {
            let config = load_config(config.as_deref());
            run_check(&input, &config);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "slatec", &mut io::stdout());
        }
    }
}

fn load_config(path: Option<&Path>) -> DriverConfig {
    let path = match path {
        Some(path) => path,
        None => return DriverConfig::default(),
    };
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(
            &DriverConfig::default(),
            &format!("failed to read {}: {}", path.display(), e),
        ),
    };
    match DriverConfig::from_toml(&content) {
        Ok(config) => config,
        Err(e) => fail(&DriverConfig::default(), &e),
    }
}

fn run_build(input: &Path, output: &Path, config: &DriverConfig) {
    match slatec::compile_file(input, output) {
        Ok(()) => println!("Compiled {} -> {}", input.display(), output.display()),
        Err(e) => fail(config, &e),
    }
}

fn run_check(input: &Path, config: &DriverConfig) {
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => fail(config, &format!("failed to read {}: {}", input.display(), e)),
    };
    match slatec::check_source(&source) {
        Ok(()) => println!("{}: ok", input.display()),
        Err(e) => fail(config, &e),
    }
}

/// Print a diagnostic with a red `error:` prefix and exit non-zero.
/// All diagnostics are fatal; there is no recovery.
fn fail(config: &DriverConfig, msg: &str) -> ! {
    let color = match config.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stderr().is_terminal(),
    };
    if color {
        eprintln!("\x1b[1;31merror:\x1b[0m {}", msg);
    } else {
        eprintln!("error: {}", msg);
    }
    process::exit(1);
}
