use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use deck_agents::cli::{BuildArgs, Cli, Command, StatusArgs};
use deck_agents::console::{approval_gate, render_view, review_loop};
use deck_agents::http::{HttpPlanner, HttpSlideTool};
use deck_agents::offline::{DryRunSlideTool, OfflinePlanner};
use deck_agents::plan_file::{load_content_file, load_plan_file};
use deck_agents::telemetry;
use deck_coordination::{
    EventFilter, InMemoryTasklistStore, JsonFileTasklistStore, LayoutCatalog, Orchestrator,
    PipelineConfig, SharedPlanner, SharedSlideTool, SharedTasklistStore, TasklistStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Plan generation takes far longer than a single slide edit
const PLANNER_TIMEOUT: Duration = Duration::from_secs(180);

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Build(args) => build(args, cli.config.as_deref()).await,
        Command::Status(args) => status(args, cli.config.as_deref()),
    }
}

fn load_catalog(path: &Path) -> Result<LayoutCatalog> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    let catalog = LayoutCatalog::from_template_json(&json)
        .with_context(|| format!("Invalid template document {}", path.display()))?;
    if catalog.is_empty() {
        bail!("Template {} has no layouts", path.display());
    }
    Ok(catalog)
}

fn open_store(config: &PipelineConfig) -> Result<SharedTasklistStore> {
    Ok(match &config.state_dir {
        Some(dir) => JsonFileTasklistStore::open(dir)
            .with_context(|| format!("Failed to open state dir {}", dir.display()))?
            .shared(),
        None => InMemoryTasklistStore::new().shared(),
    })
}

async fn build(args: BuildArgs, config_file: Option<&Path>) -> Result<()> {
    let config = args
        .pipeline
        .pipeline_config(config_file)
        .context("Invalid pipeline configuration")?;
    let catalog = load_catalog(&args.template)?;
    info!(
        layouts = catalog.len(),
        pool_size = config.pool_size,
        retry_ceiling = config.retry_ceiling,
        "Deck build starting"
    );

    let planner: SharedPlanner = match &args.planner_url {
        Some(url) => Arc::new(
            HttpPlanner::new(url.as_str(), PLANNER_TIMEOUT)
                .context("Failed to build planner client")?,
        ),
        None => Arc::new(OfflinePlanner),
    };
    let tool: SharedSlideTool = match (&args.tool_url, args.dry_run) {
        (_, true) => match &args.batch_dir {
            Some(dir) => Arc::new(DryRunSlideTool::with_out_dir(dir)),
            None => Arc::new(DryRunSlideTool::new()),
        },
        (Some(url), false) => Arc::new(
            HttpSlideTool::new(url.as_str(), config.tool_timeout)
                .context("Failed to build slide tool client")?,
        ),
        (None, false) => bail!("Either --tool-url or --dry-run is required"),
    };

    let store = open_store(&config)?;
    let orchestrator = Orchestrator::new(config, catalog, planner, store)
        .context("Invalid pipeline configuration")?
        .shared();

    let plan_id = match (&args.plan, &args.content) {
        (Some(path), _) => {
            let plan = load_plan_file(path)
                .with_context(|| format!("Failed to load plan {}", path.display()))?;
            orchestrator.submit_draft_plan(plan).await?
        }
        (None, Some(path)) => {
            let content = load_content_file(path)?;
            orchestrator.generate_draft_plan(&content).await?.id
        }
        (None, None) => bail!("Either --plan or --content is required"),
    };

    let logger = telemetry::spawn_event_logger(
        orchestrator.events(),
        EventFilter::new().plan(&plan_id),
        args.events_log.clone(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    if !args.yes && !approval_gate(&orchestrator, &plan_id, &mut lines, &mut stdout).await? {
        info!(plan_id = %plan_id, "Draft not approved");
        logger.abort();
        return Ok(());
    }

    let handle = orchestrator.start(tool);
    let summary = orchestrator.approve_plan(&plan_id).await?;
    info!(plan_id = %plan_id, tasks = summary.created.len() + summary.reused.len(), "Building");

    let result = review_loop(&orchestrator, &plan_id, &mut lines, &mut stdout).await;

    handle.shutdown().await;
    logger.abort();

    let view = result?;
    writeln!(stdout, "Done: {} of {} slides built", view.counts.succeeded, view.counts.total())?;
    Ok(())
}

fn status(args: StatusArgs, config_file: Option<&Path>) -> Result<()> {
    let config = match config_file {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    let Some(dir) = args.state_dir.or(config.state_dir) else {
        bail!("No state directory (pass --state-dir or set DECK_STATE_DIR)");
    };
    let store = JsonFileTasklistStore::open(&dir)
        .with_context(|| format!("Failed to open state dir {}", dir.display()))?;

    let mut stdout = std::io::stdout();
    match args.plan_id {
        Some(plan_id) => {
            let tasklist = store
                .load_tasklist(&plan_id)?
                .with_context(|| format!("No tasklist for plan {}", plan_id))?;
            write!(stdout, "{}", render_view(&tasklist.view()))?;
        }
        None => {
            for plan_id in store.list_plans()? {
                writeln!(stdout, "{}", plan_id)?;
            }
        }
    }
    Ok(())
}
