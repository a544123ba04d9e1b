//! `filvyn status`: Show configuration.

use filvyn_config::AppConfig;

use super::{load_config, CliResult};

fn secret(value: Option<&str>) -> &'static str {
    if value.is_some_and(|v| !v.is_empty()) { "set" } else { "missing" }
}

pub async fn run() -> CliResult {
    let config = load_config()?;

    println!("Filvyn Status");
    println!("=============");
    println!("  Config dir:      {}", AppConfig::config_dir().display());
    println!("  Note index:      {}", config.index_path().display());
    println!("  Provider:        {}", config.provider.api_url);
    println!("  Chat model:      {}", config.provider.chat_model);
    println!("  Embedding model: {}", config.provider.embedding_model);
    println!("  API key:         {}", secret(config.provider.api_key.as_deref()));
    println!("  PDP server:      {}", config.pdp.url);
    println!("  PDP token:       {}", secret(config.pdp.token.as_deref()));
    println!(
        "  CID lookup:      {} tries, {}ms apart",
        config.pdp.max_retries, config.pdp.retrieval_delay_ms
    );
    println!(
        "  Cache:           {} notes per user, {}s TTL, {} concurrent fetches",
        config.cache.max_size, config.cache.max_age_secs, config.cache.max_concurrent_requests
    );
    println!("  Vector index:    {:?} ({})", config.vector.backend, config.vector.url);
    println!(
        "  Agent:           {} (max {} turns, {} messages of history)",
        config.agent.name, config.agent.max_turns, config.agent.max_history
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file; run `filvyn init` to create one");
    }
    if config.index_path().exists() {
        println!("  Note index found");
    }

    Ok(())
}
