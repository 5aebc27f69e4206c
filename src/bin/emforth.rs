//! Thin command-line demo: reads a script (or stdin) and runs it through
//! the library's public `Engine` API. Not part of the core crate itself,
//! no line editor, no TUI, just argument parsing and a subscriber install
//! around the library.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use emforth::{Engine, EngineOptions};

#[derive(Parser)]
#[command(name = "emforth", version, about = "An embeddable Forth interpreter")]
struct Args {
    /// Forth source file to run; reads stdin if omitted.
    script: Option<PathBuf>,

    /// Image size in cells.
    #[arg(long, default_value_t = emforth::EngineOptions::default().core_size)]
    core_size: usize,

    /// Saved core image to resume from.
    #[arg(long)]
    core: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = EngineOptions {
        core_size: args.core_size,
        ..EngineOptions::default()
    };

    let mut engine = match &args.core {
        Some(path) => {
            let mut file = match std::fs::File::open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("( fatal \"could not open core image: {}\" )", e);
                    return ExitCode::FAILURE;
                }
            };
            match Engine::load_core(&mut file, options) {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("( fatal \"{}\" )", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        None => match Engine::new(options) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("( fatal \"{}\" )", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let source = match &args.script {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            eprintln!("( fatal \"{}\" )", e);
            return ExitCode::FAILURE;
        }
    };

    match engine.eval(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("( fatal \"{}\" )", e);
            ExitCode::FAILURE
        }
    }
}
