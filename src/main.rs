//! stylecheck CLI - multi-pass static analysis over add-in parsers and analyzers

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use glob::glob;
use std::path::PathBuf;
use stylecheck::cache::{default_cache_path, JsonCacheStore, ResultsCache};
use stylecheck::engine::{Engine, EngineOptions};
use stylecheck::events::OutputLevel;
use stylecheck::fixer::unified_diff;
use stylecheck::output::{JsonFormatter, OutputFormatter, TextFormatter};
use stylecheck::project::{Project, SourceFile};
use stylecheck::rule::Rule;
use stylecheck::violation::Severity;

#[derive(Parser)]
#[command(
    name = "stylecheck",
    version,
    about = "Static analysis driven by add-in modules",
    long_about = "Runs parsers and analyzers loaded from add-in modules over source files, \
                  caching results between runs."
)]
struct Cli {
    /// Files or glob patterns to analyze
    files: Vec<String>,

    /// Project name (defaults to the current directory name)
    #[arg(long)]
    project: Option<String>,

    /// Build flags identifying the project configuration (comma-separated)
    #[arg(long, value_delimiter = ',')]
    flags: Vec<String>,

    /// Settings file path
    #[arg(short, long)]
    settings: Option<String>,

    /// Additional add-in directories
    #[arg(long)]
    addins: Vec<PathBuf>,

    /// Do not scan the default add-in locations
    #[arg(long)]
    no_default_addins: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Number of parallel workers (0 = auto)
    #[arg(short, long, default_value = "0")]
    jobs: usize,

    /// Run a single worker
    #[arg(long)]
    single_worker: bool,

    /// Ignore cached results
    #[arg(long)]
    full: bool,

    /// Reuse results between runs
    #[arg(long)]
    cache: bool,

    /// Cache file location (implies --cache)
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Apply safe fixes (shows a diff unless --write is given)
    #[arg(long)]
    fix: bool,

    /// Write fixes to files (requires --fix)
    #[arg(long, requires = "fix")]
    write: bool,

    /// Key identifying trusted add-in modules
    #[arg(long, env = "STYLECHECK_HOST_KEY")]
    host_key: Option<String>,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Exit with 0 even if errors are found
    #[arg(long)]
    exit_zero: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detailed information about a rule
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn severity_str(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    }
}

/// Helper function to print a rule in a consistent format
fn print_rule(rule: &Rule) {
    let disabled = if rule.enabled {
        "".normal()
    } else {
        " [disabled]".yellow()
    };

    println!(
        "    {} [{}] ({}){}",
        rule.id.cyan(),
        severity_str(rule.severity),
        rule.category,
        disabled
    );
    if let Some(desc) = &rule.description {
        println!("      {}", desc);
    }
}

/// Print detailed rule explanation
fn explain_rule(rule: &Rule) {
    println!("{}", "Rule Details".bold());
    println!();
    println!("  {}: {}", "ID".bold(), rule.id.cyan());
    println!("  {}: {}", "Name".bold(), rule.display_name());
    println!("  {}: {}", "Add-in".bold(), rule.addin_id);
    println!("  {}: {}", "Severity".bold(), severity_str(rule.severity));
    println!("  {}: {}", "Category".bold(), rule.category);
    println!("  {}: {}", "Message".bold(), rule.context);

    if let Some(desc) = &rule.description {
        println!();
        println!("  {}", "Description".bold());
        println!("  {}", desc);
    }

    if let Some(pattern) = &rule.pattern {
        println!();
        println!("  {}: {}", "Pattern".bold(), pattern);
    }

    if rule.fix.is_some() {
        println!();
        println!("  {}", "Auto-fix Available".bold());
    }
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Handle --no-color
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let options = EngineOptions {
        jobs: cli.jobs,
        single_worker: cli.single_worker,
        host_key: cli.host_key.clone().unwrap_or_default().into_bytes(),
    };

    let mut engine = Engine::new(options);
    if cli.cache || cli.cache_file.is_some() {
        let path = cli.cache_file.clone().unwrap_or_else(default_cache_path);
        log::info!("Using cache: {}", path.display());
        engine = engine.with_cache(ResultsCache::open(JsonCacheStore::new(path)));
    }

    engine.on_output(|event| match event.level {
        OutputLevel::Warning => eprintln!("{}: {}", "warning".yellow(), event.message),
        OutputLevel::Info => eprintln!("{}: {}", "note".blue(), event.message),
    });

    let report = engine
        .initialize(&cli.addins, !cli.no_default_addins)
        .context("Failed to load add-ins")?;
    log::debug!(
        "Loaded add-ins: {} (skipped {})",
        report.loaded.join(", "),
        report.skipped.len()
    );

    if let Some(Commands::Explain { rule_id }) = &cli.command {
        let registry = engine.registry();
        let Some(rule) = registry.rules().into_iter().find(|r| &r.id == rule_id) else {
            eprintln!("{}: Rule '{}' not found", "error".red().bold(), rule_id);
            eprintln!();
            eprintln!("Use {} to see all available rules", "--list-rules".cyan());
            return Ok(1);
        };
        explain_rule(rule);
        return Ok(0);
    }

    if cli.list_rules {
        for parser in engine.registry().parsers() {
            println!("{} ({})", parser.name().bold(), parser.extensions().join(", "));
            for analyzer in engine.registry().analyzers_of(parser.id()) {
                println!("  {}", analyzer.name());
                for rule in analyzer.rules() {
                    print_rule(rule);
                }
            }
        }
        return Ok(0);
    }

    // Expand glob patterns
    let mut files: Vec<PathBuf> = Vec::new();
    for pattern in &cli.files {
        let paths = glob(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?;
        files.extend(paths.flatten().filter(|p| p.is_file()));
    }

    if files.is_empty() {
        bail!("No files found to analyze");
    }

    let root = std::env::current_dir().context("Cannot determine current directory")?;
    let name = cli.project.clone().unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    let mut project = Project::new(&name, &root).with_flags(cli.flags.iter().cloned());
    for path in &files {
        let file = SourceFile::load(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        project.add_file(file);
    }
    log::info!("Analyzing {} files in {}", files.len(), name);

    let projects = vec![project];
    let summary = match (cli.fix, cli.full, cli.settings.as_deref()) {
        (true, _, Some(settings)) => engine.auto_fix_with_settings(&projects, cli.write, settings)?,
        (true, _, None) => engine.auto_fix(&projects, cli.write)?,
        (false, true, Some(settings)) => engine.full_analyze_with_settings(&projects, settings)?,
        (false, true, None) => engine.full_analyze(&projects)?,
        (false, false, Some(settings)) => engine.analyze_with_settings(&projects, settings)?,
        (false, false, None) => engine.analyze(&projects)?,
    };

    // Show what --fix would change
    if cli.fix && !cli.write {
        for file in projects.iter().flat_map(|p| p.files()) {
            if !file.is_modified() {
                continue;
            }
            let original = std::fs::read_to_string(file.path())
                .with_context(|| format!("Failed to read {}", file.path().display()))?;
            if let Some(fixed) = file.source_text() {
                print!("{}", unified_diff(file.path(), &original, &fixed));
            }
        }
        if summary.fixes_applied > 0 {
            eprintln!("Use --write to apply fixes");
        }
    }

    let formatter: Box<dyn OutputFormatter> = match cli.format {
        Format::Text => {
            let mut f = TextFormatter::new();
            if cli.no_color {
                f = f.without_color();
            }
            Box::new(f)
        }
        Format::Json => Box::new(JsonFormatter::new().pretty()),
    };
    print!("{}", formatter.format(&summary));

    // Exit with appropriate code
    Ok(if cli.exit_zero { 0 } else { summary.exit_code() })
}
