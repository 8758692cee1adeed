//! `market-crew`: run the stock analysis crew from the command line

mod render;

use agent_market::{MarketAnalysisCrew, MarketConfig};
use agent_runtime::AgentRuntime;
use agent_utils::Config;
use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::info;

/// Exit code when the report is complete but some stages failed
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "market-crew", version)]
#[command(about = "Multi-agent stock analysis: market, technical, fundamental, risk and strategy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a ticker with the full crew
    Analyze(AnalyzeArgs),
    /// List the analysis stages and their tools
    Stages,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Ticker symbol, e.g. AAPL or BRK.B
    ticker: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Run a single stage without upstream context
    #[arg(long, value_name = "ID")]
    stage: Option<String>,

    /// Skip the ticker check against Yahoo Finance
    #[arg(long)]
    no_validate: bool,

    /// Skip the market snapshot shown above the report
    #[arg(long)]
    no_snapshot: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    agent_utils::init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!(
                "{}",
                render::error_banner(&format!("{e:#}"), std::io::stderr().is_terminal())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Stages => {
            println!("{}", render::stages_table());
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze(args) => analyze(args).await,
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let config = Config::from_env().context("failed to load configuration")?;
    let provider =
        agent_llm::providers::from_settings(&config.llm).context("failed to create LLM provider")?;
    let runtime = AgentRuntime::builder()
        .provider(provider)
        .settings(&config.llm)
        .retry_policy(config.retry.clone())
        .build()?;

    let market = MarketConfig::builder()
        .validate_ticker(!args.no_validate)
        .fetch_snapshot(!args.no_snapshot)
        .retry(config.retry.clone())
        .build()?
        .with_env_api_key();

    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        fundamentals = market.has_fundamentals(),
        "Configuration loaded"
    );
    let crew = MarketAnalysisCrew::from_config(&runtime, market)?;
    let color = std::io::stdout().is_terminal();

    if let Some(stage_id) = &args.stage {
        let stage = crew.analyze_stage(&args.ticker, stage_id).await?;
        match args.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(&stage)?),
            Format::Text | Format::Markdown => println!("{}", render::stage_section(&stage, None, color)),
        }
        return Ok(if stage.is_completed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_PARTIAL)
        });
    }

    let report = crew.analyze(&args.ticker).await?;
    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Markdown => println!("{}", report.to_markdown()),
        Format::Text => println!("{}", render::report(&report, color)),
    }

    if report.has_failures() {
        let failed: Vec<&str> = report.failures().iter().map(|s| s.output.title.as_str()).collect();
        eprintln!(
            "{}",
            render::error_banner(
                &format!("{} stage(s) did not complete: {}", failed.len(), failed.join(", ")),
                std::io::stderr().is_terminal(),
            )
        );
        return Ok(ExitCode::from(EXIT_PARTIAL));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "market-crew",
            "analyze",
            "aapl",
            "--format",
            "json",
            "--stage",
            "risk",
            "--no-validate",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze(args) => {
                assert_eq!(args.ticker, "aapl");
                assert_eq!(args.format, Format::Json);
                assert_eq!(args.stage.as_deref(), Some("risk"));
                assert!(args.no_validate);
                assert!(!args.no_snapshot);
            }
            Command::Stages => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_ticker_is_required() {
        assert!(Cli::try_parse_from(["market-crew", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["market-crew", "stages"]).is_ok());
    }
}
