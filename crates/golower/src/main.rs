use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use golower::{BuildOptions, BuildSession, GolowerConfig};
use golower_cache::BuildCache;
use golower_tags::{Verdict, evaluate, good_os_arch_file};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "golower", version, about = "Compile Go packages to JavaScript")]
struct Cli {
    /// Extra build tags, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    tags: Vec<String>,

    /// Target operating system tag
    #[arg(long, global = true)]
    os: Option<String>,

    /// Target architecture tag
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Emit minified JavaScript
    #[arg(long, global = true)]
    minify: bool,

    /// Neither read nor write the build cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a package and, for a main package, write the linked program
    Build {
        /// Import path or directory
        target: String,

        /// Output file (default: <package dir name>.js)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report whether a source file participates in the build
    Tags {
        file: PathBuf,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the build cache
    CleanCache,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("GOLOWER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn options(cli: &Cli, config: &GolowerConfig) -> BuildOptions {
    let mut options = BuildOptions::from_config(config);
    if let Some(os) = &cli.os {
        options.os = os.clone();
    }
    if let Some(arch) = &cli.arch {
        options.arch = arch.clone();
    }
    options.tags.extend(cli.tags.iter().cloned());
    options.minify |= cli.minify;
    if cli.no_cache {
        options.cache_dir = None;
    }
    options
}

fn build(options: BuildOptions, target: &str, output: Option<&Path>) -> Result<()> {
    let mut session = BuildSession::new(options);
    let entry = session.build_target(target)?;
    let is_command = session.archive(&entry).is_some_and(|a| a.name == "main");
    if !is_command {
        tracing::info!(package = %entry, "built non-main package, nothing to link");
        return Ok(());
    }

    let js = session.link(&entry)?;
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = session
                .package_dir(&entry)
                .and_then(|d| d.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "main".to_string());
            PathBuf::from(format!("{stem}.js"))
        }
    };
    std::fs::write(&output, js).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(output = %output.display(), "wrote program");
    Ok(())
}

fn tags(options: &BuildOptions, file: &Path, json: bool) -> Result<()> {
    let source =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let tag_set = options.tag_set();
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name_ok = good_os_arch_file(&name, &tag_set);
    let verdict = evaluate(&source, &tag_set);

    if json {
        let (status, line, reason) = match (&verdict, name_ok) {
            (_, false) => ("excluded", None, Some("file name".to_string())),
            (Verdict::Included, true) => ("included", None, None),
            (Verdict::Excluded { line }, true) => ("excluded", Some(line.clone()), None),
            (Verdict::Malformed { line, reason }, true) => {
                ("malformed", Some(line.clone()), Some(reason.to_string()))
            }
        };
        let report = serde_json::json!({
            "file": file.display().to_string(),
            "status": status,
            "line": line,
            "reason": reason,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match verdict {
        _ if !name_ok => println!("excluded: file name {name}"),
        Verdict::Included => println!("included"),
        Verdict::Excluded { line } => println!("excluded: {line}"),
        Verdict::Malformed { line, reason } => println!("malformed: {line} ({reason})"),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let config = GolowerConfig::load(&cwd);
    match &cli.command {
        Command::Build { target, output } => build(options(&cli, &config), target, output.as_deref()),
        Command::Tags { file, json } => tags(&options(&cli, &config), file, *json),
        Command::CleanCache => {
            let dir = config.cache_dir();
            BuildCache::new(&dir)
                .clear()
                .with_context(|| format!("clearing {}", dir.display()))?;
            println!("removed {}", dir.display());
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
