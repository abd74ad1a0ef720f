//! deployflow CLI entry point

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deployflow::core::VertexStatus;
use deployflow::journal::{DeploymentJournal, JOURNAL_DIR};
use deployflow::{
    load_module, transform, ArtifactStore, Config, DevChain, Executor, JsonParameters, Result,
    VertexOutcome,
};

#[derive(Parser)]
#[command(name = "deployflow", version, about = "Declarative on-chain deployments")]
struct Cli {
    /// Config file (defaults to ./deployflow.yml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the execution graph in dependency order
    Plan(ModuleArgs),
    /// Deploy a module to the development chain
    Deploy {
        #[command(flatten)]
        module: ModuleArgs,
        #[arg(long, default_value = JOURNAL_DIR)]
        journal_dir: PathBuf,
    },
    /// List recorded deployments
    History {
        #[arg(long, default_value = JOURNAL_DIR)]
        journal_dir: PathBuf,
    },
}

#[derive(Args)]
struct ModuleArgs {
    /// Module file (YAML)
    module: PathBuf,
    /// Deployment parameters (JSON object)
    #[arg(long)]
    parameters: Option<PathBuf>,
    /// Directory of compiled artifacts
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,
}

impl ModuleArgs {
    fn plan(&self) -> Result<(String, deployflow::ExecutionGraph)> {
        let graph = load_module(&self.module)?;
        let artifacts = if self.artifacts.exists() {
            ArtifactStore::load_dir(&self.artifacts)?
        } else {
            log::debug!("No artifacts directory at {}", self.artifacts.display());
            ArtifactStore::new()
        };
        let parameters = match &self.parameters {
            Some(path) => JsonParameters::from_file(path)?,
            None => JsonParameters::none(),
        };

        let plan = transform(&graph, &artifacts, &parameters)
            .with_context(|| format!("resolving {}", self.module.display()))?;
        let name = self
            .module
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string();
        Ok((name, plan))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::debug!("deployflow v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::auto_load()?,
    };

    match cli.command {
        Command::Plan(args) => plan(&args),
        Command::Deploy {
            module,
            journal_dir,
        } => deploy(&module, &config, &journal_dir).await,
        Command::History { journal_dir } => history(&journal_dir),
    }
}

fn plan(args: &ModuleArgs) -> Result<()> {
    let (_, plan) = args.plan()?;
    let ordered = plan
        .ordered()
        .context("execution graph is cyclic")?;

    for node in ordered {
        let after: Vec<String> = plan
            .adjacency()
            .dependencies(node.id)
            .iter()
            .filter_map(|id| plan.vertex(*id))
            .map(|dep| dep.label.clone())
            .collect();
        if after.is_empty() {
            println!("{}", node);
        } else {
            println!("{}  (after {})", node, after.join(", "));
        }
    }
    Ok(())
}

async fn deploy(args: &ModuleArgs, config: &Config, journal_dir: &Path) -> Result<()> {
    let (name, plan) = args.plan()?;

    let chain = Arc::new(DevChain::new(config.devnet.clone()));
    let (executor, _events) = Executor::new(chain.services(), config.engine);

    let mut journal = DeploymentJournal::new(name);
    let result = executor.execute(&plan).await?;
    journal.record(&result);
    journal.finish();
    journal.save(journal_dir)?;

    for (_, report) in result.reports() {
        match &report.outcome {
            VertexOutcome::Completed(output) => println!("{:<32} {}", report.label, output.value()),
            VertexOutcome::Failed(e) => println!("{:<32} FAILED: {}", report.label, e),
            VertexOutcome::Skipped { cause } => {
                println!("{:<32} skipped (after {})", report.label, cause)
            }
        }
    }

    if !result.is_success() {
        anyhow::bail!(
            "deployment incomplete: {} failed, {} skipped",
            result.failed().len(),
            result.skipped().len()
        );
    }
    Ok(())
}

fn history(journal_dir: &Path) -> Result<()> {
    let ids = DeploymentJournal::list_all(journal_dir)?;
    if ids.is_empty() {
        println!("No deployments recorded in {}", journal_dir.display());
        return Ok(());
    }

    for id in ids {
        let journal = DeploymentJournal::load(journal_dir, &id)?;
        let completed = journal
            .vertices
            .values()
            .filter(|e| e.status == VertexStatus::Completed)
            .count();
        println!(
            "{}  {:<20} {}/{} completed",
            journal.id,
            journal.module,
            completed,
            journal.vertices.len()
        );
    }
    Ok(())
}
