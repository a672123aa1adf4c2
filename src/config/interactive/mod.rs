
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::{Path, PathBuf};

use super::{Config, ConfigError};
use crate::embeddings::OpenAiEmbedder;
use crate::index::DistanceMetric;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Support RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Service Configuration").bold().yellow());
    eprintln!("Configure the OpenAI-compatible service used for embeddings and replies.");
    eprintln!();
    configure_service(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Retrieval Configuration").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Generation Configuration").bold().yellow());
    configure_generation(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_service_connection(&config) {
        Ok(()) => eprintln!("{}", style("✓ Embedding model is available!").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not verify the embedding service").yellow()
            );
            eprintln!("  {}", e);
            eprintln!("You can continue, but building the index will fail until this is fixed.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Service Settings:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.service.base_url).cyan());
    eprintln!(
        "  API Key: {}",
        style(mask_secret(config.service.api_key.as_deref())).cyan()
    );
    eprintln!(
        "  Timeout: {}s",
        style(config.service.timeout_seconds).cyan()
    );
    eprintln!(
        "  Retry Attempts: {}",
        style(config.service.retry_attempts).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.service.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.retrieval.embedding_model).cyan()
    );
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.retrieval.embedding_dimension).cyan()
    );
    eprintln!("  Distance Metric: {}", style(config.retrieval.metric).cyan());
    eprintln!("  Default k: {}", style(config.retrieval.default_k).cyan());
    eprintln!(
        "  Corpus: {} (columns '{}' / '{}')",
        style(config.corpus_path().display()).cyan(),
        config.retrieval.query_column,
        config.retrieval.response_column
    );
    eprintln!("  Index: {}", style(config.index_path().display()).cyan());

    eprintln!();
    eprintln!("{}", style("Generation Settings:").bold().yellow());
    eprintln!(
        "  Chat Model: {}",
        style(&config.generation.chat_model).cyan()
    );
    eprintln!(
        "  Temperature: {}",
        style(config.generation.temperature).cyan()
    );
    eprintln!(
        "  Assistant Name: {}",
        style(&config.generation.assistant_name).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load_file(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_service(config: &mut Config) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Service base URL")
        .default(config.service.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let mut temp = config.service.clone();
            temp.set_base_url(input.clone())
        })
        .interact_text()?;

    let api_key: String = Password::new()
        .with_prompt("API key (leave empty to use OPENAI_API_KEY)")
        .allow_empty_password(true)
        .interact()?;

    let batch_size: usize = Input::new()
        .with_prompt("Batch size for embedding requests")
        .default(config.service.batch_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 2048 {
                Err("Batch size must be 2048 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.service.set_base_url(base_url)?;
    config.service.set_batch_size(batch_size)?;
    if !api_key.trim().is_empty() {
        config.service.api_key = Some(api_key.trim().to_string());
    }

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.retrieval.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: usize = Input::new()
        .with_prompt("Embedding dimension")
        .default(config.retrieval.embedding_dimension)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 1 and 8192")
            }
        })
        .interact_text()?;

    let metrics = [DistanceMetric::Euclidean, DistanceMetric::Cosine];
    let labels = ["L2 (Euclidean distance)", "COSINE (inner product)"];
    let default_index = metrics
        .iter()
        .position(|&m| m == config.retrieval.metric)
        .unwrap_or(0);
    let metric_index = Select::new()
        .with_prompt("Distance metric")
        .default(default_index)
        .items(&labels)
        .interact()?;

    let corpus_path: String = Input::new()
        .with_prompt("Corpus CSV path")
        .default(config.retrieval.corpus_path.display().to_string())
        .interact_text()?;

    let index_path: String = Input::new()
        .with_prompt("Index file path")
        .default(config.retrieval.index_path.display().to_string())
        .interact_text()?;

    let default_k: usize = Input::new()
        .with_prompt("Examples retrieved per query (k)")
        .default(config.retrieval.default_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("k must be at least 1")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.retrieval.set_embedding_model(model)?;
    config.retrieval.set_embedding_dimension(dimension)?;
    config.retrieval.metric = metrics[metric_index];
    config.retrieval.corpus_path = PathBuf::from(corpus_path);
    config.retrieval.index_path = PathBuf::from(index_path);
    config.retrieval.set_default_k(default_k)?;

    Ok(())
}

fn configure_generation(config: &mut Config) -> Result<()> {
    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(config.generation.chat_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Temperature (0 for deterministic replies)")
        .default(config.generation.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    config.generation.set_chat_model(chat_model)?;
    config.generation.set_temperature(temperature)?;

    Ok(())
}

fn test_service_connection(config: &Config) -> Result<()> {
    let embedder = OpenAiEmbedder::from_config(config)?;
    embedder.health_check(&config.retrieval.embedding_model)?;
    Ok(())
}

/// Show only the last four characters of a secret
fn mask_secret(secret: Option<&str>) -> String {
    match secret.map(str::trim).filter(|s| !s.is_empty()) {
        None => "(not set)".to_string(),
        Some(secret) => {
            let chars: Vec<char> = secret.chars().collect();
            if chars.len() <= 8 {
                "****".to_string()
            } else {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("****{}", tail)
            }
        }
    }
}
