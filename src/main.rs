use adscript::core::config::Config;
use adscript::core::model::{GenerationOutcome, GenerationRequest};
use adscript::services::regeneration::RegenerationController;
use adscript::services::session::run_session;
use anyhow::{Context, Result};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Some(request_path) = std::env::args().nth(1) else {
        eprintln!("Usage: adscript <request.json>");
        std::process::exit(2);
    };

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid LLM settings.");
            return Err(e);
        }
    };
    config.ensure_directories()?;

    let content = tokio::fs::read_to_string(&request_path)
        .await
        .with_context(|| format!("Failed to read {}", request_path))?;
    let request: GenerationRequest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request {}", request_path))?;

    let controller = RegenerationController::from_config(&config)?;
    info!("Running {} with provider {}", request.operation_name(), config.llm.provider);

    match controller.execute(&request).await? {
        GenerationOutcome::Batch(batch) if !config.unattended => {
            run_session(&controller, request.context(), batch, &config.output_folder).await?;
        }
        outcome => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }

    Ok(())
}
