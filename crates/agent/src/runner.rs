//! Drive one channel through the agent until its stream ends.

use std::sync::Arc;
use switchboard_core::{Channel, ChannelError};
use tracing::{info, warn};

use crate::orchestrator::SupportAgent;

/// Connect `channel`, then answer every message it yields.
///
/// Messages are handled one at a time in arrival order. Send failures and
/// stream errors are logged and skipped. Returns when the stream ends.
pub async fn serve(channel: Arc<dyn Channel>, agent: Arc<SupportAgent>) -> Result<(), ChannelError> {
    let name = channel.name().to_string();
    if channel.tracks_sessions() {
        agent.contexts().track_sessions_for(&name);
    }

    channel.connect().await?;
    let mut stream = channel.listen().await?;
    info!(channel = %name, "Listening for messages");

    let mut handled = 0usize;
    while let Some(item) = stream.recv().await {
        let message = match item {
            Ok(m) => m,
            Err(e) => {
                warn!(channel = %name, error = %e, "Channel stream error");
                continue;
            }
        };

        let sender = message.sender_id.clone();
        let reply = agent.process_message(message).await;
        if let Err(e) = channel.send(&reply).await {
            warn!(channel = %name, sender = %sender, error = %e, "Failed to deliver reply");
        }
        handled += 1;
    }

    info!(channel = %name, handled, "Channel stream ended");
    Ok(())
}
