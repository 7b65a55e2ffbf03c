//! Pagemark Replay
//!
//! Runs a JSON gesture script against an in-memory document and writes each
//! export to stdout.

mod runner;
mod script;

use clap::Parser;
use kurbo::Size;
use pagemark_core::{ConfigError, Engine, EngineConfig, EngineError, MemoryRemote, RemoteError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Invalid image data: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Gesture script (JSON array of steps)
    script: PathBuf,

    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pages in the document
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// Page width in points
    #[arg(long, default_value_t = 612.0)]
    page_width_pt: f64,

    /// Page height in points
    #[arg(long, default_value_t = 792.0)]
    page_height_pt: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Replay failed: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ReplayError> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let steps = script::load(&args.script)?;
    log::info!("Loaded {} steps from {}", steps.len(), args.script.display());

    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
    let local = tokio::task::LocalSet::new();

    let store = Rc::new(MemoryRemote::with_dpi(config.dpi));
    let document = store.add_document(args.pages, Size::new(args.page_width_pt, args.page_height_pt));
    let mut engine = Engine::new(config, store, document, args.pages);
    engine.set_viewport(Size::new(800.0, 600.0));

    let mut stdout = std::io::stdout().lock();
    local.block_on(&runtime, async {
        engine.navigate(1)?;
        runner::run(&mut engine, steps, &mut stdout).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_script_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{ "step": "settle" }}, {{ "step": "undo" }}]"#).unwrap();
        let steps = script::load(file.path()).unwrap();
        assert_eq!(steps, vec![script::Step::Settle, script::Step::Undo]);
    }

    #[test]
    fn test_missing_script_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = script::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ReplayError::Io(_))));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["pagemark-replay", "script.json"]);
        assert_eq!(args.pages, 1);
        assert!((args.page_width_pt - 612.0).abs() < f64::EPSILON);
        assert!(args.config.is_none());
    }
}
