//! BeatBax command-line front end.
//!
//! Thin by design: `play` renders a song and (in headless mode) writes it
//! to a scratch WAV so the pipeline is exercisable without an audio
//! device; `verify` runs the compile pipeline and reports success/failure;
//! `export` dispatches to one of the `beatbax-export` sinks. Exit codes:
//! 0 success, 1 runtime failure, 2 argument/validation error.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use beatbax_core::render::RenderConfig;

#[derive(Parser)]
#[command(name = "beatbax", about = "Compile and render BeatBax chiptune source for the Game Boy APU")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and render a song, optionally writing a headless WAV preview.
    Play {
        /// Path to a `.bbx` source file.
        file: PathBuf,
        /// Render without an audio device, writing a WAV file alongside
        /// the source instead of playing it live.
        #[arg(long, conflicts_with = "browser")]
        headless: bool,
        /// Placeholder for a browser-hosted playback target; unsupported
        /// from this CLI binary.
        #[arg(long, conflicts_with = "headless")]
        browser: bool,
    },
    /// Compile a song and report whether it's valid.
    Verify {
        /// Path to a `.bbx` source file.
        file: PathBuf,
    },
    /// Export a compiled song to one of the supported sink formats.
    Export {
        /// Sink format.
        format: ExportFormat,
        /// Path to a `.bbx` source file.
        input: PathBuf,
        /// Destination path.
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Midi,
    Uge,
    Wav,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::from(0),
        Err(CliError::Validation(msg)) => {
            eprintln!("beatbax: {msg}");
            ExitCode::from(2)
        }
        Err(CliError::Runtime(msg)) => {
            eprintln!("beatbax: {msg}");
            ExitCode::from(1)
        }
    }
}

enum CliError {
    Validation(String),
    Runtime(String),
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Play { file, headless, browser } => cmd_play(file, headless, browser),
        Command::Verify { file } => cmd_verify(file),
        Command::Export { format, input, output } => cmd_export(format, input, output),
    }
}

fn read_source(path: &PathBuf) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|e| CliError::Validation(format!("cannot read {}: {e}", path.display())))
}

fn base_dir(path: &PathBuf) -> PathBuf {
    path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

fn compile_or_validation_error(source: &str, base: PathBuf) -> Result<(beatbax_lang::Ism, Vec<beatbax_lang::ResolveWarning>), CliError> {
    beatbax_lang::compile(source, base).map_err(|e| CliError::Validation(e.to_string()))
}

fn cmd_verify(file: PathBuf) -> Result<(), CliError> {
    let source = read_source(&file)?;
    let base = base_dir(&file);
    match compile_or_validation_error(&source, base) {
        Ok((_, warnings)) => {
            for warning in &warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}: valid", file.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn cmd_play(file: PathBuf, headless: bool, browser: bool) -> Result<(), CliError> {
    if browser {
        return Err(CliError::Validation("--browser playback is not supported from this binary".to_string()));
    }
    let source = read_source(&file)?;
    let base = base_dir(&file);
    let (ism, warnings) = compile_or_validation_error(&source, base)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    if headless {
        let cfg = RenderConfig::default();
        let out_path = file.with_extension("wav");
        let errors = beatbax_export::wav::export_wav(&ism, &cfg, &out_path).map_err(|e| CliError::Runtime(e.to_string()))?;
        for error in &errors {
            eprintln!("playback warning: {error}");
        }
        println!("wrote {}", out_path.display());
        Ok(())
    } else {
        Err(CliError::Runtime("live playback requires an audio device; pass --headless to render offline".to_string()))
    }
}

fn cmd_export(format: ExportFormat, input: PathBuf, output: PathBuf) -> Result<(), CliError> {
    let source = read_source(&input)?;
    let base = base_dir(&input);
    let (ism, warnings) = compile_or_validation_error(&source, base)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    match format {
        ExportFormat::Json => {
            let file = fs::File::create(&output).map_err(|e| CliError::Runtime(format!("cannot create {}: {e}", output.display())))?;
            beatbax_export::json::export_ism_json(&ism, "1970-01-01T00:00:00Z", file).map_err(|e| CliError::Runtime(e.to_string()))?;
        }
        ExportFormat::Midi => {
            let file = fs::File::create(&output).map_err(|e| CliError::Runtime(format!("cannot create {}: {e}", output.display())))?;
            beatbax_export::midi::export_midi(&ism, file).map_err(|e| CliError::Runtime(e.to_string()))?;
        }
        ExportFormat::Uge => {
            let file = fs::File::create(&output).map_err(|e| CliError::Runtime(format!("cannot create {}: {e}", output.display())))?;
            let warnings = beatbax_export::uge::export_uge(&ism, file).map_err(|e| CliError::Runtime(e.to_string()))?;
            for warning in &warnings {
                eprintln!("export warning: {}", warning.message);
            }
        }
        ExportFormat::Wav => {
            let cfg = RenderConfig::default();
            let errors = beatbax_export::wav::export_wav(&ism, &cfg, &output).map_err(|e| CliError::Runtime(e.to_string()))?;
            for error in &errors {
                eprintln!("playback warning: {error}");
            }
        }
    }
    println!("wrote {}", output.display());
    Ok(())
}
