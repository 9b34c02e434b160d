//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use insurprice_core::{DataSourceKind, PipelineConfig, RemoteStoreKind};
use insurprice_core::config::WORKSPACE_CONFIG_FILE;
use insurprice_ml::serving::{self, TRAIN_SUCCESS_MESSAGE};
use insurprice_ml::{
    AppState, CostPredictor, InsuranceData, TrainPipeline, build_document_source,
    build_model_store,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
///
/// Returns `Ok(false)` when the command ran but reported a failure to the
/// user, so the process can exit non-zero without printing the error twice.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<bool> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_path),
        Commands::Train { seed } => {
            let mut config = load(workspace, config_path)?;
            if seed.is_some() {
                config.ingestion.seed = seed;
            }
            handle_train(config).await
        }
        Commands::Serve { host, port } => {
            let mut config = load(workspace, config_path)?;
            if let Some(host) = host {
                config.serving.host = host;
            }
            if let Some(port) = port {
                config.serving.port = port;
            }
            handle_serve(config).await
        }
        Commands::Predict {
            age,
            sex,
            bmi,
            children,
            smoker,
            region,
            model,
        } => {
            let config = load(workspace, config_path)?;
            let data = InsuranceData {
                age,
                sex,
                bmi,
                children,
                smoker,
                region,
            };
            let model = model.map(|m| resolve(workspace, &m));
            handle_predict(config, data, model.as_deref()).await
        }
    }
}

/// Load configuration and anchor its relative paths at `workspace`.
fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = match config_path {
        Some(path) => insurprice_core::load_config_file(&resolve(workspace, path)),
        None => insurprice_core::load_config(Some(workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    resolve_paths(&mut config, workspace);
    Ok(config)
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Rewrite every relative filesystem location in `config` against `workspace`.
/// URLs are left alone.
fn resolve_paths(config: &mut PipelineConfig, workspace: &Path) {
    config.schema_path = resolve(workspace, &config.schema_path);
    config.artifacts.root_dir = resolve(workspace, &config.artifacts.root_dir);
    config.serving.model_cache_dir = resolve(workspace, &config.serving.model_cache_dir);
    if matches!(
        config.data_source.kind,
        DataSourceKind::JsonDir | DataSourceKind::Sqlite
    ) {
        config.data_source.location = resolve(workspace, Path::new(&config.data_source.location))
            .display()
            .to_string();
    }
    if config.remote.kind == RemoteStoreKind::LocalDir {
        config.remote.location = resolve(workspace, Path::new(&config.remote.location))
            .display()
            .to_string();
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<bool> {
    match action {
        ConfigAction::Init => {
            let path = workspace.join(WORKSPACE_CONFIG_FILE);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(true);
            }
            let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created default configuration at: {}", path.display());
            Ok(true)
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(true)
        }
    }
}

async fn handle_train(config: PipelineConfig) -> anyhow::Result<bool> {
    let mut pipeline = TrainPipeline::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to set up pipeline: {}", e.report()))?;
    match pipeline.run().await {
        Ok(run) => {
            println!("{TRAIN_SUCCESS_MESSAGE}");
            println!("  Run directory:  {}", run.run_dir.display());
            println!(
                "  Rows:           {} train / {} test ({} dropped)",
                run.ingestion.train_rows, run.ingestion.test_rows, run.ingestion.dropped_rows
            );
            println!(
                "  Test R²:        {:.4}",
                run.evaluation.trained_model_score
            );
            match run.evaluation.baseline_model_score {
                Some(baseline) => println!("  Published R²:   {baseline:.4}"),
                None => println!("  Published R²:   none"),
            }
            match &run.publish {
                Some(p) => println!("  Published to:   {}/{}", p.bucket, p.key),
                None => println!("  Not published:  model was not accepted"),
            }
            Ok(true)
        }
        Err(e) => {
            println!("Error Occurred! {}", e.report());
            Ok(false)
        }
    }
}

async fn handle_serve(config: PipelineConfig) -> anyhow::Result<bool> {
    let schema = insurprice_core::Schema::from_file(&config.schema_path)
        .map_err(|e| anyhow::anyhow!("Failed to load schema: {}", e))?;
    let source = build_document_source(&config.data_source);
    let store = build_model_store(&config.remote);
    let state = AppState::new(Arc::new(config), Arc::new(schema), source, store);
    serving::run(Arc::new(state)).await?;
    Ok(true)
}

async fn handle_predict(
    config: PipelineConfig,
    data: InsuranceData,
    model: Option<&Path>,
) -> anyhow::Result<bool> {
    let predictor = match model {
        Some(path) => CostPredictor::from_file(path)?,
        None => {
            let store = build_model_store(&config.remote);
            CostPredictor::from_store(
                store.as_ref(),
                &config.remote,
                &config.serving.model_cache_dir,
            )
            .await?
        }
    };
    let prediction = predictor.predict(&data)?;
    println!("{}", serde_json::json!({ "prediction": prediction }));
    Ok(true)
}
