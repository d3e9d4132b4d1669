//! `switchboard onboard`: first-time setup.

use switchboard_config::AppConfig;
use switchboard_security::ContactWhitelist;

pub fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Switchboard: first-time setup");
    println!("=============================\n");

    if config_dir.exists() {
        println!("  Config directory exists: {}", config_dir.display());
    } else {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
    }

    // Opening creates the file when missing.
    let config = AppConfig::load_from(&config_path)?;
    let whitelist = ContactWhitelist::open(config.contacts_path(&config_dir));
    println!(
        "  Contacts file: {} ({} contacts)",
        whitelist.path().display(),
        whitelist.len()
    );

    println!("\n  Next steps:");
    println!("   1. Edit {} to pick a model provider", config_path.display());
    println!("   2. Run: switchboard contacts add <phone>");
    println!("   3. Run: switchboard run\n");
    Ok(())
}
