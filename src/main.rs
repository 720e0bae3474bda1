use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod axe;
mod config;
mod contrast;
mod conversation;
mod fixes;
mod llm;
mod tools;

use axe::AxeServer;
use config::Config;
use conversation::{ConversationLoop, Outcome};
use fixes::{parse_fix_plan, ApplyStrategy, ContrastPolicy, FixApplier};
use llm::OpenAiClient;
use tools::{tool_definitions, AxeToolInvoker, ToolExecutor};

const SYSTEM_PROMPT: &str = "You are a web accessibility expert. You are given an HTML document \
and must find and fix WCAG violations in it. Use the available tools to test the document, check \
color contrast ratios, and look up accessibility rules before proposing fixes. When you are done \
analyzing, reply with your final answer only: a JSON array of fixes, where each fix is an object \
with the fields \"type\" (one of \"color-contrast\", \"alt-text\", \"aria\", \"form\", \
\"heading\", \"other\"), \"description\", \"originalCode\" (the exact text to replace, verbatim \
from the document), \"fixedCode\" (the replacement text), and \"explanation\". Do not include \
any prose outside the JSON.";

#[derive(Parser)]
#[command(name = "a11yfix")]
#[command(version)]
#[command(about = "Find and fix WCAG accessibility violations in HTML files with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an HTML file and apply the fixes the model proposes
    Fix {
        /// HTML file to fix
        file: PathBuf,

        /// Model to use (overrides the config file)
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum LLM round trips before giving up
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Print the proposed fixes without touching the file
        #[arg(long)]
        dry_run: bool,

        /// Apply color fixes even when they still fail the AA contrast check
        #[arg(long)]
        apply_failing_contrast: bool,

        /// Enable verbose logging
        #[arg(long, short)]
        verbose: bool,
    },

    /// Run the accessibility test on a file and print the violations
    Scan {
        /// HTML file to test
        file: PathBuf,

        /// WCAG tags to test against
        #[arg(long, default_value = "wcag2aa")]
        tags: Vec<String>,

        /// Enable verbose logging
        #[arg(long, short)]
        verbose: bool,
    },

    /// Check the contrast ratio between two hex colors
    Contrast {
        /// Foreground color (e.g. '#777777')
        foreground: String,

        /// Background color (e.g. '#ffffff')
        background: String,
    },

    /// List the accessibility rules known to the axe server
    Rules {
        /// WCAG tags to filter by
        #[arg(long, default_value = "wcag2aa")]
        tags: Vec<String>,

        /// Enable verbose logging
        #[arg(long, short)]
        verbose: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("a11yfix=debug")
    } else {
        EnvFilter::new("a11yfix=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fix {
            file,
            model,
            max_iterations,
            dry_run,
            apply_failing_contrast,
            verbose,
        } => {
            init_logging(verbose);
            run_fix(&file, model, max_iterations, dry_run, apply_failing_contrast).await?;
        }

        Commands::Scan { file, tags, verbose } => {
            init_logging(verbose);
            run_tool(
                "test_html_accessibility",
                serde_json::json!({
                    "html": std::fs::read_to_string(&file)
                        .with_context(|| format!("failed to read {}", file.display()))?,
                    "tags": tags,
                }),
            )
            .await?;
        }

        Commands::Contrast {
            foreground,
            background,
        } => {
            run_contrast(&foreground, &background);
        }

        Commands::Rules { tags, verbose } => {
            init_logging(verbose);
            run_tool("get_accessibility_rules", serde_json::json!({ "tags": tags })).await?;
        }
    }

    Ok(())
}

async fn run_fix(
    file: &Path,
    model: Option<String>,
    max_iterations: Option<usize>,
    dry_run: bool,
    apply_failing_contrast: bool,
) -> Result<()> {
    let config = Config::load()?;
    // Fatal before anything is spawned or connected.
    let api_key = config.resolve_api_key()?;

    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let model = model.unwrap_or_else(|| config.resolve_model());
    let mut completer = OpenAiClient::new(&config.resolve_base_url(), &api_key, &model);

    let (program, args) = config.resolve_axe_command();
    let server = AxeServer::spawn(&program, &args).await?;
    let mut invoker = AxeToolInvoker::new(server);

    let user_prompt = format!(
        "Find and fix the WCAG violations in this HTML document:\n\n```html\n{}\n```",
        html
    );
    let mut convo = ConversationLoop::new(
        SYSTEM_PROMPT,
        &user_prompt,
        tool_definitions(),
        max_iterations.unwrap_or_else(|| config.resolve_max_iterations()),
    );

    let outcome = convo.run(&mut completer, &mut invoker).await;

    // The server handle is released on every path out of the loop.
    invoker.into_server().shutdown().await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(
                turns = convo.transcript().len(),
                tool_call_rounds = convo.tool_call_rounds(),
                "aborting after LLM failure"
            );
            return Err(e);
        }
    };

    let final_text = match outcome {
        Outcome::Completed { final_text } => final_text,
        Outcome::Exhausted => {
            println!(
                "{}",
                "Max iterations reached without a final analysis; no fixes applied.".yellow()
            );
            return Ok(());
        }
    };

    let fix_list = match parse_fix_plan(&final_text) {
        Ok(fixes) => fixes,
        Err(e) => {
            tracing::warn!("could not parse a fix plan from the final answer: {:#}", e);
            println!("{}", "Analysis (no machine-readable fix plan):".bold());
            println!("{}", final_text);
            println!("\n{}", "No changes.".yellow());
            return Ok(());
        }
    };

    if fix_list.is_empty() {
        println!("{}", "The model proposed no fixes. No changes.".yellow());
        return Ok(());
    }

    let policy = if apply_failing_contrast {
        ContrastPolicy::ApplyAnyway
    } else {
        config.resolve_contrast_policy()
    };
    let report = FixApplier::new(policy).apply(&html, &fix_list);

    println!(
        "{} {} applied, {} skipped ({} tool-call rounds)",
        "Fixes:".bold(),
        report.applied.len().to_string().green(),
        report.skipped.len().to_string().yellow(),
        convo.tool_call_rounds()
    );
    for applied in &report.applied {
        let how = match applied.strategy {
            ApplyStrategy::Verbatim => "verbatim",
            ApplyStrategy::ColorFallback => "color fallback",
        };
        println!("  {} {} ({})", "✔".green(), applied.fix.description, how);
    }
    for skipped in &report.skipped {
        println!(
            "  {} {}: {}",
            "✘".yellow(),
            skipped.fix.description,
            skipped.reason
        );
    }

    if dry_run {
        println!("\n{}", "Dry run, file left untouched.".cyan());
        return Ok(());
    }

    if !report.changed() {
        println!("\n{}", "No changes.".yellow());
        return Ok(());
    }

    let backup = write_patched(file, &html, &report.patched)?;
    println!(
        "\n{} {} (backup at {})",
        "Patched".green().bold(),
        file.display(),
        backup.display()
    );

    Ok(())
}

/// Write a backup of the original next to the file, then overwrite the file
/// with the patched content. Returns the backup path.
fn write_patched(file: &Path, original: &str, patched: &str) -> Result<PathBuf> {
    let backup = backup_path(file);
    std::fs::write(&backup, original)
        .with_context(|| format!("failed to write backup {}", backup.display()))?;
    std::fs::write(file, patched)
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(backup)
}

/// Run one tool against the axe server and print its JSON payload.
async fn run_tool(name: &str, arguments: serde_json::Value) -> Result<()> {
    let config = Config::load()?;
    let (program, args) = config.resolve_axe_command();
    let server = AxeServer::spawn(&program, &args).await?;
    let mut invoker = AxeToolInvoker::new(server);

    let result = invoker.execute(name, &arguments).await;
    invoker.into_server().shutdown().await;

    let payload = result.map_err(|e| anyhow!(e.error))?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_contrast(foreground: &str, background: &str) {
    let result = contrast::contrast_ratio(foreground, background);
    println!(
        "Contrast ratio: {}",
        format!("{:.2}:1", result.contrast_ratio).bold()
    );
    println!(
        "  WCAG AA  (4.5:1): {}",
        if result.wcag_aa { "pass".green() } else { "fail".red() }
    );
    println!(
        "  WCAG AAA (7.0:1): {}",
        if result.wcag_aaa { "pass".green() } else { "fail".red() }
    );
}

fn backup_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path_keeps_extension() {
        assert_eq!(
            backup_path(Path::new("pages/index.html")),
            Path::new("pages/index.html.bak")
        );
    }

    #[test]
    fn test_write_patched_preserves_original_in_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.html");
        std::fs::write(&file, "<p>old</p>").unwrap();

        let backup = write_patched(&file, "<p>old</p>", "<p>new</p>").unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "<p>new</p>");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "<p>old</p>");
        assert_eq!(backup, dir.path().join("page.html.bak"));
    }
}
