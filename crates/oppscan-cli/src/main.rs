use anyhow::Result;
use clap::{Parser, Subcommand};
use oppscan_scan::{load_digest_view, ScanConfig, ScanPipeline, ScanProfile, ScanSummary};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "oppscan")]
#[command(about = "Find recent questions and discussions worth replying to")]
struct Cli {
    /// Hit each API once and report reachability instead of scanning.
    #[arg(long = "test")]
    test: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Commands {
    /// Run every source and write the digest (default).
    Scan,
    /// Show how many items of the latest digest are done.
    Status,
    /// Toggle one item's done flag by its stable id.
    Done { id: String },
    /// Serve the dashboard data API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ScanConfig::from_env();
    info!(root = %config.project_root.display(), "configuration loaded");

    if cli.test {
        let profile = ScanProfile::load(&config.project_root)?;
        let pipeline = ScanPipeline::new(config, profile)?;
        println!("Testing API connectivity...");
        let results = pipeline.connectivity_check().await;
        for result in &results {
            println!("{}", result.status_line());
        }
        let reachable = results.iter().filter(|r| r.is_ok()).count();
        println!("\n{reachable}/{} APIs reachable.", results.len());
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Scan) {
        Commands::Scan => {
            let profile = ScanProfile::load(&config.project_root)?;
            let summary = ScanPipeline::new(config, profile)?.run_once().await?;
            print_summary(&summary);
        }
        Commands::Status => {
            let view = load_digest_view(&config).await?;
            if view.sections.is_empty() {
                println!("No opportunity scan found. Run: oppscan");
                return Ok(());
            }
            println!("Digest {}", view.date);
            for (name, done, listed) in view.progress() {
                println!("  {name}: {done} of {listed} done");
            }
            println!("Total: {} of {} done", view.total_done, view.total);
        }
        Commands::Done { id } => {
            let done = config.completion_store().toggle(&id).await?;
            let state = if done { "done" } else { "not done" };
            println!("{id}: {state}");
        }
        Commands::Serve => {
            println!("Serving dashboard API on http://127.0.0.1:{}", config.web_port);
            oppscan_web::serve(config).await?;
        }
    }

    Ok(())
}

fn print_summary(summary: &ScanSummary) {
    println!("\nDone — {} opportunities found.", summary.total);
    for source in &summary.sources {
        println!("  {}: {}", source.name, source.count);
    }
    println!("  Manual links: {} platforms", summary.manual_platforms);
    println!("Report: {}", summary.report_path);
    println!("Latest: {}", summary.latest_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_means_scan() {
        let cli = Cli::parse_from(["oppscan"]);
        assert!(!cli.test);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_flag_selects_connectivity_check() {
        let cli = Cli::parse_from(["oppscan", "--test"]);
        assert!(cli.test);
    }

    #[test]
    fn done_takes_an_id() {
        let cli = Cli::parse_from(["oppscan", "done", "redditisetorosafe"]);
        assert_eq!(
            cli.command,
            Some(Commands::Done {
                id: "redditisetorosafe".to_string()
            })
        );
    }

    #[test]
    fn unknown_subcommands_are_rejected() {
        assert!(Cli::try_parse_from(["oppscan", "publish"]).is_err());
    }
}
