//! `mathtutor onboard` — First-time setup.

use mathtutor_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("MathTutor — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Start a model server (e.g. `ollama pull phi3:mini && ollama serve`)");
    println!("      or set backend = \"local\" in [model] for in-process inference");
    println!("   2. Run: mathtutor repl");
    println!("   3. Type :load, then ask away\n");

    Ok(())
}
