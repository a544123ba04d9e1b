//! `filvyn init`: Write a default config file.

use filvyn_config::AppConfig;

use super::CliResult;

pub async fn run(force: bool) -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() && !force {
        println!("Config file already exists: {}", config_path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set OPENAI_API_KEY (or provider.api_key in the file)");
    println!("  2. Set PDP_TOKEN (or pdp.token in the file)");
    println!("  3. Run `filvyn chat`");
    Ok(())
}
