//! `switchboard run`: serve every enabled channel until Ctrl-C.

use std::sync::Arc;
use switchboard_channels::{WebChannel, WhatsAppChannel};
use switchboard_core::Channel;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::Setup;

pub async fn run() -> anyhow::Result<()> {
    let setup = Setup::load()?;
    let config = &setup.config;
    let agent = setup.build_agent()?;

    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    if config.channels.web.enabled {
        channels.push(Arc::new(WebChannel::new(config.channels.web.clone())));
    }
    if config.channels.whatsapp.enabled {
        let whitelist = Arc::new(setup.whitelist());
        if whitelist.is_empty() {
            warn!("Contact whitelist is empty, every WhatsApp message will be dropped");
        }
        channels.push(Arc::new(WhatsAppChannel::new(
            &config.channels.whatsapp.bridge_url,
            whitelist,
        )?));
    }
    if channels.is_empty() {
        anyhow::bail!("No channels enabled. Enable channels.web or channels.whatsapp in config.toml");
    }

    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        tools = agent.tools().len(),
        channels = channels.len(),
        "Starting switchboard"
    );

    let mut tasks = JoinSet::new();
    for channel in &channels {
        let (channel, agent) = (channel.clone(), agent.clone());
        tasks.spawn(async move {
            let name = channel.name().to_string();
            if let Err(e) = switchboard_agent::serve(channel, agent).await {
                error!(channel = %name, error = %e, "Channel failed");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        _ = async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Channel task panicked");
                }
            }
        } => info!("All channels stopped"),
    }

    for channel in &channels {
        if let Err(e) = channel.disconnect().await {
            warn!(channel = %channel.name(), error = %e, "Disconnect failed");
        }
    }
    tasks.abort_all();
    Ok(())
}
