use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use kapuchin::config::{
    apply_patch_set, build_host, load_from_path, load_model_from_path, revert_patch_set,
    snapshot, snapshot_text, PatchResult, PatchSetConfig, ValueSpec,
};
use kapuchin::Host;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "kapuchin")]
#[command(about = "Layered, reversible patching of a host object model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to a host model
    Apply {
        /// Host model description (TOML)
        #[arg(long)]
        host: PathBuf,

        /// Patch set file, or directory of *.toml patch sets (default: ./patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Show a diff of the host before and after patching
        #[arg(short, long)]
        diff: bool,

        /// Print results and the patched host as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply and revert every patch set, checking the host is restored
    Verify {
        /// Host model description (TOML)
        #[arg(long)]
        host: PathBuf,

        /// Patch set file, or directory of *.toml patch sets (default: ./patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// List patch definitions
    List {
        /// Patch set file, or directory of *.toml patch sets (default: ./patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// Print every member of a host model
    Show {
        /// Host model description (TOML)
        #[arg(long)]
        host: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            host,
            patches,
            diff,
            json,
        } => cmd_apply(&host, patches, diff, json),

        Commands::Verify { host, patches } => cmd_verify(&host, patches),

        Commands::List { patches } => cmd_list(patches),

        Commands::Show { host, json } => cmd_show(&host, json),
    }
}

/// Helper: Resolve the patch set files to load.
///
/// An explicit file is used as-is; a directory (default `./patches`) yields
/// its `*.toml` files, non-recursively and sorted by path.
fn discover_patch_files(patches: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    let path = patches.unwrap_or_else(|| PathBuf::from("patches"));
    if path.is_file() {
        return Ok(vec![path]);
    }
    if !path.is_dir() {
        anyhow::bail!("Patch path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&path).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No .toml patch files found in {}", path.display());
    }
    Ok(files)
}

fn load_host(path: &Path) -> Result<Host> {
    let model = load_model_from_path(path)?;
    build_host(&model).with_context(|| format!("failed to build host from {}", path.display()))
}

/// Helper: Show unified diff between the host before and after patching
fn display_diff(label: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", label.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", label.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", sign);
    }
}

fn spec_text(spec: &ValueSpec) -> String {
    match spec {
        ValueSpec::Bool(v) => v.to_string(),
        ValueSpec::Int(v) => v.to_string(),
        ValueSpec::Float(v) => format!("{v:?}"),
        ValueSpec::Str(v) => format!("{v:?}"),
        ValueSpec::List(items) => {
            let items: Vec<String> = items.iter().map(spec_text).collect();
            format!("[{}]", items.join(", "))
        }
        ValueSpec::Ref { target } => format!("-> {target}"),
    }
}

fn cmd_apply(host_path: &Path, patches: Option<PathBuf>, show_diff: bool, as_json: bool) -> Result<()> {
    let patch_files = discover_patch_files(patches)?;
    let mut host = load_host(host_path)?;
    let before = snapshot_text(&host);

    let mut created = 0;
    let mut layered = 0;
    let mut failed = 0;
    let mut reports = Vec::new();

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        if !as_json {
            println!("Applying patches from {}...", patch_file.display());
        }

        for (patch_id, result) in apply_patch_set(&mut host, &config) {
            match &result {
                Ok(PatchResult::Created { .. }) => created += 1,
                Ok(PatchResult::Layered { .. }) => layered += 1,
                Ok(PatchResult::Reverted { .. }) => {}
                Err(_) => failed += 1,
            }

            if as_json {
                let message = match &result {
                    Ok(outcome) => outcome.to_string(),
                    Err(e) => e.to_string(),
                };
                reports.push(json!({
                    "file": patch_file.display().to_string(),
                    "id": patch_id,
                    "ok": result.is_ok(),
                    "message": message,
                }));
                continue;
            }

            match result {
                Ok(outcome @ PatchResult::Created { .. }) => {
                    println!("{} {}: {}", "+".green(), patch_id, outcome)
                }
                Ok(outcome) => println!("{} {}: {}", "✓".green(), patch_id, outcome),
                Err(e) => eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e),
            }
        }

        if !as_json {
            println!();
        }
    }

    if as_json {
        let out = json!({
            "results": reports,
            "host": snapshot(&host),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if show_diff {
            let after = snapshot_text(&host);
            if before != after {
                display_diff(host_path, &before, &after);
                println!();
            }
        }

        println!("{}", "Summary:".bold());
        println!("  {} created", format!("{}", created).green());
        println!("  {} replaced", format!("{}", layered).green());
        println!("  {} failed", format!("{}", failed).red());
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_verify(host_path: &Path, patches: Option<PathBuf>) -> Result<()> {
    let patch_files = discover_patch_files(patches)?;

    println!("{}", "Verifying patches...".bold());
    println!("Host: {}", host_path.display());
    println!();

    let mut verified = 0;
    let mut mismatch = 0;

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        let mut host = load_host(host_path)?;
        let before = snapshot_text(&host);

        // only definitions that went in are taken back out
        let mut applied = PatchSetConfig {
            meta: config.meta.clone(),
            patches: Vec::new(),
        };
        for (definition, (patch_id, result)) in config
            .patches
            .iter()
            .zip(apply_patch_set(&mut host, &config))
        {
            match result {
                Ok(_) => applied.patches.push(definition.clone()),
                Err(e) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                    eprintln!("  Error: {}", e);
                    mismatch += 1;
                }
            }
        }

        for (patch_id, result) in revert_patch_set(&mut host, &applied) {
            if let Err(e) = result {
                eprintln!("{} {}: revert failed", "✗".red(), patch_id);
                eprintln!("  Error: {}", e);
                mismatch += 1;
            }
        }

        let after = snapshot_text(&host);
        if before == after {
            println!(
                "{} {}: {} patches apply and revert cleanly",
                "✓".green(),
                patch_file.display(),
                applied.patches.len()
            );
            verified += 1;
        } else {
            eprintln!("{} {}: MISMATCH", "✗".red(), patch_file.display());
            eprintln!("  Host was not restored after revert");
            display_diff(host_path, &before, &after);
            mismatch += 1;
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(patches: Option<PathBuf>) -> Result<()> {
    for patch_file in discover_patch_files(patches)? {
        let config = load_from_path(&patch_file)?;
        let title = if config.meta.name.is_empty() {
            patch_file.display().to_string()
        } else {
            config.meta.name.clone()
        };
        println!("{} ({})", title.bold(), patch_file.display());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }

        for patch in &config.patches {
            let tag = patch
                .tag
                .as_deref()
                .map(|tag| format!(" [{tag}]"))
                .unwrap_or_default();
            println!(
                "  - {}: {}.{} = {}{}",
                patch.id,
                patch.destination,
                patch.member,
                spec_text(&patch.value),
                tag.cyan()
            );
        }
        println!();
    }
    Ok(())
}

fn cmd_show(host_path: &Path, as_json: bool) -> Result<()> {
    let host = load_host(host_path)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot(&host))?);
    } else {
        print!("{}", snapshot_text(&host));
    }
    Ok(())
}
