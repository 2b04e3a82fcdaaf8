//! `nutrigen-research` — run one research query from the command line.
//!
//! Usage: `nutrigen-research [--breadth-first] [--genotype <1-6>] [--case <id>] <query…>`

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use nutrigen_research::inference::config::load_or_default;
use nutrigen_research::inference::{GeminiClient, ModelInvoker};
use nutrigen_research::research::history::{NewReport, ResearchHistory};
use nutrigen_research::research::{
    describe_failure, PerformanceTracker, PipelineState, ResearchMode, ResearchOrchestrator,
    ResponseCache,
};

/// Run a nutrigenomics research query: plan, batched analysis, synthesis.
#[derive(Parser, Debug)]
#[command(name = "nutrigen-research", version, about, long_about = None)]
struct CliArgs {
    /// Research query
    #[arg(required = true, trailing_var_arg = true)]
    query: Vec<String>,

    /// Plan independent aspects instead of progressively deeper ones
    #[arg(long, conflicts_with = "depth_first")]
    breadth_first: bool,

    /// Depth-first planning (the default)
    #[arg(long)]
    depth_first: bool,

    /// Metabolic genotype (1-6) to scope the prompts to
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=6))]
    genotype: Option<u8>,

    /// Existing case id to attach the report to
    #[arg(long = "case")]
    case_id: Option<String>,
}

impl CliArgs {
    fn mode(&self) -> ResearchMode {
        if self.breadth_first {
            ResearchMode::BreadthFirst
        } else {
            ResearchMode::DepthFirst
        }
    }

    fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let query = args.query_text();
    if query.trim().is_empty() {
        bail!("the research query is empty");
    }

    if let Err(e) = nutrigen_research::init_tracing() {
        eprintln!("warning: logging disabled: {e}");
    }

    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let config = load_or_default(&cwd).context("failed to load research config")?;
    config
        .require_api_key()
        .context("the research pipeline needs a Gemini API key")?;

    let client = GeminiClient::from_config(&config).context("failed to build Gemini client")?;
    let tracker = Arc::new(PerformanceTracker::new(&config));
    let cache = Arc::new(ResponseCache::new(config.cache_ttl()));
    let invoker = Arc::new(ModelInvoker::new(
        Arc::new(client),
        tracker.clone(),
        cache,
        config,
    ));

    let history = ResearchHistory::open(&nutrigen_research::resolve_db_path())
        .context("failed to open history database")?;
    if let Some(case_id) = args.case_id.as_deref() {
        if history.get_case(case_id)?.is_none() {
            bail!("case not found: '{case_id}'");
        }
    }

    let state = ResearchOrchestrator::new(invoker)
        .run(&query, args.mode(), args.genotype)
        .await;

    let exit_ok = match &state {
        PipelineState::Done {
            results, synthesis, ..
        } => {
            println!("{}\n", synthesis.summary_text);
            if !synthesis.recommendations.is_empty() {
                println!("## Recomendaciones Clínicas\n");
                for rec in &synthesis.recommendations {
                    println!("- {rec}");
                }
                println!();
            }
            println!("**Nivel de evidencia:** {}", synthesis.evidence_level);
            let failed = results.iter().filter(|r| !r.is_usable()).count();
            if failed > 0 {
                println!("\n_{failed} de {} aspectos no se incluyeron en la síntesis._", results.len());
            }
            true
        }
        PipelineState::Failed { reason, .. } => {
            eprintln!("{}", describe_failure(reason).to_markdown());
            false
        }
        other => {
            tracing::error!(state = other.name(), "pipeline ended in a non-terminal state");
            false
        }
    };

    if let Some(report) = NewReport::from_state(
        &query,
        args.mode(),
        args.genotype,
        args.case_id.clone(),
        &state,
    ) {
        history
            .record_report(report)
            .context("failed to record report")?;
    }

    for record in tracker.snapshot() {
        tracing::info!(
            model = %record.model_id,
            requests = record.total_requests,
            success_rate = record.success_rate(),
            avg_latency_ms = record.avg_latency_ms,
            "model performance"
        );
    }

    if !exit_ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("nutrigen-research").chain(line.split_whitespace()))
    }

    #[test]
    fn parses_flags_and_query() {
        let cli = parse("--breadth-first --genotype 3 --case abc Investiga MTHFR C677T").unwrap();
        assert_eq!(cli.mode(), ResearchMode::BreadthFirst);
        assert_eq!(cli.genotype, Some(3));
        assert_eq!(cli.case_id.as_deref(), Some("abc"));
        assert_eq!(cli.query_text(), "Investiga MTHFR C677T");

        let cli = parse("Investiga MTHFR").unwrap();
        assert_eq!(cli.mode(), ResearchMode::DepthFirst);
        assert_eq!(cli.genotype, None);
    }

    #[test]
    fn rejects_unknown_genotype_and_empty_query() {
        assert!(parse("--genotype 9 q").is_err());
        assert!(parse("--genotype 0 q").is_err());
        assert!(parse("--genotype x q").is_err());
        assert!(parse("--breadth-first").is_err());
        assert!(parse("--breadth-first --depth-first q").is_err());
    }
}
