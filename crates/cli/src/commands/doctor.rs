//! `mathtutor doctor` — Diagnose configuration, model server and helper programs.

use std::process::Stdio;
use std::sync::Arc;

use mathtutor_config::AppConfig;
use mathtutor_core::error::ProviderError;
use mathtutor_core::provider::{LoadProgress, ModelLoader, ProgressSink};
use mathtutor_providers::RemoteLoader;
use tokio::process::Command;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("MathTutor Doctor — System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults — run `mathtutor onboard`");
    }
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  1 issue found. Fix the config and re-run doctor.");
            return Ok(());
        }
    };

    match config.model.backend.as_str() {
        "local" if cfg!(feature = "local") => {
            println!("  ✅ Local backend, model {}", config.model.name);
        }
        "local" => {
            println!("  ❌ backend = \"local\" but this build lacks the `local` feature");
            issues += 1;
        }
        _ => {
            let loader = RemoteLoader::new(config.model.api_url.as_str(), config.model.api_key.clone());
            let quiet: ProgressSink = Arc::new(|_: LoadProgress| {});
            match loader.load(&config.model.name, quiet).await {
                Ok(_) => println!("  ✅ Model server reachable, {} available", config.model.name),
                Err(ProviderError::ModelNotFound(_)) => {
                    println!(
                        "  ⚠️  Model server reachable but {} is not installed",
                        config.model.name
                    );
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Model server at {} unreachable: {e}", config.model.api_url);
                    issues += 1;
                }
            }
        }
    }

    if program_runs(&config.ocr.command).await {
        println!("  ✅ OCR available ({})", config.ocr.command);
    } else {
        println!("  ⚠️  {} not found — image questions disabled", config.ocr.command);
        issues += 1;
    }

    if config.speech.enabled {
        match config.speech.speak_command.first() {
            Some(program) if program_runs(program).await => {
                println!("  ✅ Speech output available ({program})");
            }
            Some(program) => {
                println!("  ⚠️  {program} not found — answers will not be spoken");
                issues += 1;
            }
            None => {
                println!("  ⚠️  speech.enabled is set but speak_command is empty");
                issues += 1;
            }
        }
    }
    if config.speech.listen_command.is_empty() {
        println!("  ℹ️  No listen_command — speech input disabled");
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

async fn program_runs(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok()
}
