use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ark_savegame::batch::{self, BatchOptions};
use ark_savegame::{Error, PropertyRegistry, ReadOptions, Result, SaveFile, SaveFormat, WriteOptions};

#[derive(Parser)]
#[command(name = "ark-tool")]
#[command(about = "Convert ARK save archives to JSON and back")]
struct Cli {
    /// Debug logging and full error detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a save file to JSON
    ToJson {
        input: PathBuf,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// world, profile, tribe or bag; detected from the extension if omitted
        #[arg(long, value_parser = parse_format)]
        format: Option<SaveFormat>,
        #[arg(long)]
        pretty: bool,
        /// Memory-map the input
        #[arg(long)]
        mmap: bool,
        #[arg(long)]
        allow_broken: bool,
        #[arg(long)]
        build_tree: bool,
        /// Emit one container with hibernated objects appended
        #[arg(long)]
        merge_hibernation: bool,
    },
    /// Encode a JSON projection back into a save file
    FromJson {
        input: PathBuf,
        output: PathBuf,
        /// Write through a memory map
        #[arg(long)]
        mmap: bool,
    },
    /// Count objects per class
    Classes {
        input: PathBuf,
        #[arg(long, value_parser = parse_format)]
        format: Option<SaveFormat>,
        #[arg(long)]
        allow_broken: bool,
        #[arg(long)]
        merge_hibernation: bool,
    },
    /// Convert every save in a directory to JSON
    Batch {
        input_dir: PathBuf,
        output_dir: PathBuf,
        /// Worker threads (0 = one per core)
        #[arg(long, default_value = "0")]
        threads: usize,
        #[arg(long)]
        pretty: bool,
        #[arg(long)]
        mmap: bool,
        #[arg(long)]
        allow_broken: bool,
    },
}

fn parse_format(s: &str) -> std::result::Result<SaveFormat, String> {
    SaveFormat::from_name(&s.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown format {s:?} (expected world, profile, tribe or bag)"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli.verbose {
                eprintln!("error[{}]: {err}\n{err:?}", err.kind());
            } else {
                eprintln!("error[{}]: {err}", err.kind());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::ToJson { input, output, format, pretty, mmap, allow_broken, build_tree, merge_hibernation } => {
            let options = ReadOptions::new()
                .allow_broken(allow_broken)
                .build_tree(build_tree)
                .merge_hibernation(merge_hibernation);
            let (save, stats) = SaveFile::read_path(&input, format, &options, mmap)?;
            if stats.unreadable_properties > 0 {
                info!(skipped = stats.unreadable_properties, "skipped unreadable properties");
            }
            let json = match &save {
                SaveFile::World(world) if merge_hibernation => {
                    let mut json = world.to_json();
                    json["objects"] = world.container().to_json();
                    if let Some(object) = json.as_object_mut() {
                        object.remove("hibernation");
                    }
                    serde_json::json!({ "format": save.format().name(), "save": json })
                }
                _ => save.to_json(),
            };
            write_json(&json, output.as_deref(), pretty)
        }
        Commands::FromJson { input, output, mmap } => {
            let json: Value = serde_json::from_slice(&fs::read(&input)?)?;
            let save = SaveFile::from_json(&json, &PropertyRegistry::standard())?;
            let written = save.write_path(&output, WriteOptions::default().memory_map(mmap))?;
            info!(bytes = written, path = %output.display(), "wrote save");
            Ok(())
        }
        Commands::Classes { input, format, allow_broken, merge_hibernation } => {
            let options = ReadOptions::new().allow_broken(allow_broken).merge_hibernation(merge_hibernation);
            let (save, _) = SaveFile::read_path(&input, format, &options, false)?;
            for (class, count) in save.class_counts() {
                println!("{count:>8}  {class}");
            }
            Ok(())
        }
        Commands::Batch { input_dir, output_dir, threads, pretty, mmap, allow_broken } => {
            let options = BatchOptions {
                threads,
                pretty,
                memory_map: mmap,
                read: ReadOptions::new().allow_broken(allow_broken),
            };
            let report = batch::run(&input_dir, &output_dir, &options)?;
            for (path, err) in &report.failed {
                eprintln!("{}: error[{}]: {err}", path.display(), err.kind());
            }
            println!("converted {} files, {} failed", report.converted.len(), report.failed.len());
            match report.failed.into_iter().next() {
                None => Ok(()),
                Some((_, err)) => Err(err),
            }
        }
    }
}

fn write_json(json: &Value, output: Option<&Path>, pretty: bool) -> Result<()> {
    let mut text = if pretty { serde_json::to_string_pretty(json)? } else { serde_json::to_string(json)? };
    text.push('\n');
    match output {
        Some(path) => fs::write(path, text).map_err(Error::from),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}
