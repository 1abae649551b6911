use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use sqlbench_core::{
	default_catalog, markdown_to_csv, BenchConfig, CsvGroundTruth, EquivalenceJudge, Evaluation, GroundTruthSource,
	ModelRegistry, ProviderSettings, WeightsAccess,
};
use sqlbench_store::EcommerceDb;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sqlbench", about = "Benchmark LLM text-to-SQL generation")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Run the benchmark over the selected models
	Run(RunArgs),
	/// List the model catalog and whether each model is usable
	Models(ModelsArgs),
	/// Create and seed the benchmark database
	InitDb(InitDbArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// YAML config file; flags below override its values
	#[arg(long)]
	config: Option<PathBuf>,

	/// Models to run, as "<provider> : <model>" keys or bare model names (comma-separated). Defaults to every available model.
	#[arg(long, value_delimiter = ',')]
	models: Vec<String>,

	/// Model used as the equivalence judge
	#[arg(long)]
	judge: Option<String>,

	/// Skip the equivalence judge; items are scored by result comparison only
	#[arg(long, action = ArgAction::SetTrue)]
	no_judge: bool,

	/// Base URL of the local OpenAI-compatible server
	#[arg(long)]
	base_url: Option<String>,

	#[arg(long)]
	max_tokens: Option<u32>,

	/// Deterministic seed; -1 means no seed
	#[arg(long, allow_negative_numbers = true)]
	seed: Option<i64>,

	/// Retries after the first attempt per question
	#[arg(long)]
	max_retries: Option<usize>,

	/// Ground truth table (.md or .csv)
	#[arg(long)]
	ground_truth: Option<PathBuf>,

	/// SQLite database; created and seeded if missing
	#[arg(long)]
	database: Option<PathBuf>,

	/// Output JSON reports to a file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
struct ModelsArgs {
	#[arg(long)]
	base_url: Option<String>,
}

#[derive(Debug, Clone, Parser)]
struct InitDbArgs {
	#[arg(long, default_value = "ecommerce-autogen.db")]
	database: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(false)
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Run(args) => run(args).await?,
		Commands::Models(args) => list_models(args),
		Commands::InitDb(args) => {
			EcommerceDb::open_or_create(&args.database)?;
			println!("database ready at {}", args.database.display());
		}
	}
	Ok(())
}

async fn load_config(args: &RunArgs) -> Result<BenchConfig> {
	let mut cfg = match &args.config {
		Some(path) => BenchConfig::load(path).await?,
		None => BenchConfig::default(),
	};

	if !args.models.is_empty() {
		cfg.models = args.models.iter().map(|m| m.trim().to_string()).collect();
	}
	if let Some(judge) = &args.judge {
		cfg.judge_model = judge.clone();
	}
	if let Some(url) = &args.base_url {
		cfg.base_url = Some(url.clone());
	}
	if let Some(n) = args.max_tokens {
		cfg.max_tokens = n;
	}
	if let Some(raw) = args.seed {
		cfg.seed = Some(raw);
	}
	if let Some(r) = args.max_retries {
		cfg.max_retries = r;
	}
	if let Some(path) = &args.ground_truth {
		cfg.ground_truth = path.clone();
	}
	if let Some(path) = &args.database {
		cfg.database = path.clone();
	}
	Ok(cfg)
}

async fn run(args: RunArgs) -> Result<()> {
	let cfg = load_config(&args).await?;

	let db = EcommerceDb::open_or_create(&cfg.database)?;

	let ground_truth_path = match cfg.ground_truth.extension().and_then(|e| e.to_str()) {
		Some("md") | Some("markdown") => markdown_to_csv(&cfg.ground_truth).await?,
		_ => cfg.ground_truth.clone(),
	};
	let ground_truth: Arc<dyn GroundTruthSource> = Arc::new(CsvGroundTruth::new(ground_truth_path));

	let registry = ModelRegistry::from_catalog(&default_catalog(), &ProviderSettings::from_env(cfg.base_url.as_deref()));
	let selectors = if cfg.models.is_empty() {
		registry.available_keys()
	} else {
		cfg.models.clone()
	};
	let models = registry.select(selectors.as_slice())?;

	let options = cfg.generation_options();
	let mut builder = Evaluation::builder()
		.ground_truth(ground_truth)
		.models(models)
		.executor(Arc::new(db))
		.options(options.clone())
		.max_retries(cfg.max_retries);
	if !args.no_judge {
		let judge = EquivalenceJudge::new(registry.resolve(&cfg.judge_model)?, options).with_rules(cfg.rule_set);
		builder = builder.judge(Arc::new(judge));
	}

	let reports = builder.build()?.run().await?;
	for report in &reports {
		println!("{}", report.summary_table());
	}

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(&reports)?;
		tokio::fs::write(&path, json).await?;
		tracing::info!(path = %path.display(), "wrote JSON reports");
	}

	Ok(())
}

fn list_models(args: ModelsArgs) {
	let registry = ModelRegistry::from_catalog(&default_catalog(), &ProviderSettings::from_env(args.base_url.as_deref()));
	println!("{:<42} {:<8} {:<8} {:>10}  status", "model", "weights", "params", "context");
	for entry in default_catalog() {
		let key = entry.identity.key();
		let weights = match entry.capabilities.weights {
			WeightsAccess::Open => "open",
			WeightsAccess::Closed => "closed",
		};
		let status = registry.unavailable_reason(&key).unwrap_or("available");
		println!(
			"{:<42} {:<8} {:<8} {:>10}  {}",
			key,
			weights,
			entry.capabilities.parameter_count.as_deref().unwrap_or("-"),
			entry.capabilities.context_window,
			status
		);
	}
}
