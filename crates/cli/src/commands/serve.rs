//! `mathtutor serve` — Start the HTTP gateway and browser frontend.

use mathtutor_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("MathTutor Gateway");
    println!("   Open:    http://{}:{}/", config.gateway.host, config.gateway.port);
    println!("   Model:   {} ({})", config.model.name, config.model.backend);
    if config.model.autoload {
        println!("   Loading the model in the background");
    }

    mathtutor_gateway::start(config).await?;

    Ok(())
}
