//! Command-line driver: argument handling, toolchain invocation and
//! intermediate-file cleanup. The compiler core only ever sees source
//! text and a file label; everything process-related lives here.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use tracing::{Level, debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Platform {
  Linux,
  Win,
  Lith,
}

#[derive(Debug, Parser)]
#[command(name = "lithc")]
#[command(about = "Compile a .l source file into a native executable")]
struct Args {
  /// Source file to compile.
  input: PathBuf,

  /// Path of the produced executable.
  #[arg(short, long, default_value = "out")]
  output: PathBuf,

  /// Trace the pipeline stages and dump the emitted listing.
  #[arg(short, long)]
  verbose: bool,

  /// Keep the intermediate assembly and object files.
  #[arg(short, long)]
  debug: bool,

  /// Target platform.
  #[arg(short, long, value_enum, default_value_t = Platform::Linux)]
  platform: Platform,
}

fn main() -> ExitCode {
  let args = Args::parse();

  tracing_subscriber::fmt()
    .with_target(false)
    .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
    .init();

  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("{err:#}");
      ExitCode::FAILURE
    }
  }
}

fn run(args: &Args) -> Result<()> {
  match args.platform {
    Platform::Linux => {}
    Platform::Win => bail!("platform 'win' is no longer supported"),
    Platform::Lith => bail!("platform 'lith' is not yet supported"),
  }

  let source = fs::read_to_string(&args.input)
    .with_context(|| format!("reading {}", args.input.display()))?;
  let file_label = args
    .input
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| args.input.display().to_string());

  info!(file = %file_label, "compiling");
  let asm = lithc::generate_assembly(&source, &file_label)?;
  debug!("emitted listing:\n{asm}");

  let asm_path = args.output.with_extension("asm");
  let obj_path = args.output.with_extension("o");
  fs::write(&asm_path, &asm).with_context(|| format!("writing {}", asm_path.display()))?;

  // nasm derives the object file name from the input basename, which
  // matches obj_path by construction
  info!(path = %asm_path.display(), "assembling");
  let status = Command::new("nasm")
    .arg("-felf64")
    .arg(&asm_path)
    .status()
    .context("running nasm")?;
  if !status.success() {
    bail!("nasm failed with {status}");
  }

  info!(output = %args.output.display(), "linking");
  let status = Command::new("ld")
    .arg("-o")
    .arg(&args.output)
    .arg(&obj_path)
    .status()
    .context("running ld")?;
  if !status.success() {
    bail!("ld failed with {status}");
  }

  if !args.debug {
    let _ = fs::remove_file(&asm_path);
    let _ = fs::remove_file(&obj_path);
  }

  info!(output = %args.output.display(), "build finished");
  Ok(())
}
