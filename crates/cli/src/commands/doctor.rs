//! `switchboard doctor`: check configuration and supporting files.

use switchboard_config::AppConfig;
use switchboard_security::ContactWhitelist;

pub fn run() -> anyhow::Result<()> {
    println!("Switchboard doctor");
    println!("==================\n");

    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let mut issues = 0;

    if !config_path.exists() {
        println!("  [!!] No config file at {}, run `switchboard onboard`", config_path.display());
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok] Config valid");
            config
        }
        Err(e) => {
            println!("  [!!] Config invalid: {e}");
            println!("\n  1 issue found.");
            return Ok(());
        }
    };

    println!("  [ok] Model: {} ({})", config.llm.model, config.llm.provider);
    if config.llm.provider != "ollama" && !config.has_api_key() {
        println!("  [!!] No API key for provider {}", config.llm.provider);
        issues += 1;
    }

    let enabled: Vec<&str> = [
        (config.channels.web.enabled, "web"),
        (config.channels.whatsapp.enabled, "whatsapp"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if enabled.is_empty() {
        println!("  [!!] No channels enabled");
        issues += 1;
    } else {
        println!("  [ok] Channels: {}", enabled.join(", "));
    }

    let contacts_path = config.contacts_path(&config_dir);
    if contacts_path.exists() {
        let whitelist = ContactWhitelist::open(contacts_path.clone());
        println!("  [ok] Contacts: {} whitelisted", whitelist.len());
        if whitelist.is_empty() && config.channels.whatsapp.enabled {
            println!("  [!!] WhatsApp is enabled but no contacts are whitelisted");
            issues += 1;
        }
    } else {
        println!("  [!!] No contacts file at {}", contacts_path.display());
        issues += 1;
    }

    let knowledge_path = config.knowledge_path(&config_dir);
    if knowledge_path.exists() {
        println!("  [ok] Knowledge base: {}", knowledge_path.display());
    } else {
        println!("  [--] No knowledge base at {}", knowledge_path.display());
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
