//! Diagnostic CLI: run one utterance through the decision pipeline and print
//! the JSON report.
//!
//! ```text
//! classify <audio.wav> [--user ID] [--help-menu]
//! ```

use std::path::PathBuf;

use intentio_core::IntentioEngine;

#[derive(Debug)]
struct Args {
    audio_path: PathBuf,
    user: Option<String>,
    help_menu: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut audio_path: Option<PathBuf> = None;
    let mut user: Option<String> = None;
    let mut help_menu = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--user" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --user".into());
                };
                user = Some(v);
            }
            "--help-menu" => help_menu = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown flag: {other}"));
            }
            other => {
                if audio_path.is_some() {
                    return Err("only one audio file may be given".into());
                }
                audio_path = Some(PathBuf::from(other));
            }
        }
    }

    let Some(audio_path) = audio_path else {
        return Err("usage: classify <audio.wav> [--user ID] [--help-menu]".into());
    };

    Ok(Args {
        audio_path,
        user,
        help_menu,
    })
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    let bytes = std::fs::read(&args.audio_path)
        .map_err(|e| format!("read {}: {e}", args.audio_path.display()))?;

    let engine = IntentioEngine::with_defaults();
    if !engine.validate_audio(&bytes) {
        eprintln!(
            "warning: {} is below the minimum utterance length; extraction falls back",
            args.audio_path.display()
        );
    }

    let report = if args.help_menu {
        engine
            .process_help_utterance(&bytes, args.user.as_deref())
            .map_err(|e| e.to_string())?
    } else {
        engine
            .process_utterance(&bytes, args.user.as_deref())
            .map_err(|e| e.to_string())?
    };

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("classify failed: {e}");
        std::process::exit(1);
    }
}
