//! `switchboard chat`: terminal chat or a single message.

use std::sync::Arc;
use switchboard_channels::CliChannel;
use switchboard_core::Message;

use super::Setup;

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let setup = Setup::load()?;
    let agent = setup.build_agent()?;
    let channel = CliChannel::new();

    if let Some(text) = message {
        let inbound = Message::text(channel.user_id(), text)
            .with_channel("cli")
            .with_sender_name("User");
        let reply = agent.process_message(inbound).await;
        println!("{}", reply.content.as_text().unwrap_or_default());
        return Ok(());
    }

    println!();
    println!("  Switchboard: interactive mode");
    println!("  Provider:  {}", setup.config.llm.provider);
    println!("  Model:     {}", setup.config.llm.model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!();
    println!("  Type your message and press Enter. Type 'exit' to quit.");
    println!();

    switchboard_agent::serve(Arc::new(channel), agent).await?;
    println!("  Goodbye!");
    Ok(())
}
