use crate::bot::convert::relay_message_from;
use crate::bot::resilient::send_message_resilient;
use audio_relay_core::commands::{CommandSurface, ControlCommand};
use audio_relay_core::message::RelayMessage;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::{prelude::*, utils::command::BotCommands, RequestError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Pause relaying
    #[command(description = "Pause relaying.")]
    Pause,
    /// Resume relaying
    #[command(description = "Resume relaying.")]
    Resume,
    /// Show relay status
    #[command(description = "Show relay status.")]
    Status,
}

impl From<Command> for ControlCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Pause => Self::Pause,
            Command::Resume => Self::Resume,
            Command::Status => Self::Status,
        }
    }
}

/// Shared state for update handlers of one pipeline attempt.
pub struct DispatchContext {
    /// Resolved source chat.
    pub source: ChatId,
    /// Live message queue drained by the pipeline.
    pub feed: mpsc::Sender<RelayMessage>,
    /// Owner command handling.
    pub commands: Arc<CommandSurface>,
}

/// Build the update handler tree.
#[must_use]
pub fn setup_handler() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(
            Update::filter_channel_post()
                .filter(|msg: Message, ctx: Arc<DispatchContext>| msg.chat.id == ctx.source)
                .endpoint(handle_post),
        )
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message, ctx: Arc<DispatchContext>| {
                        msg.chat.id == ctx.source
                    })
                    .endpoint(handle_post),
                ),
        )
}

/// Queue a source message for the live listener.
///
/// # Errors
///
/// Never fails; a closed feed means the attempt is ending.
pub async fn handle_post(msg: Message, ctx: Arc<DispatchContext>) -> Result<(), RequestError> {
    let message = relay_message_from(&msg, msg.id, msg.chat.id);
    if ctx.feed.send(message).await.is_err() {
        debug!(id = msg.id.0, "Live feed closed, dropping update");
    }
    Ok(())
}

/// Apply an owner command and reply in the same chat.
///
/// # Errors
///
/// Never fails; reply errors are logged.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<DispatchContext>,
) -> Result<(), RequestError> {
    let user_id = get_user_id_safe(&msg);
    let Some(reply) = ctx.commands.handle(user_id, cmd.into()).await else {
        return Ok(());
    };
    if let Err(e) = send_message_resilient(&bot, msg.chat.id, reply).await {
        warn!("Failed to reply to {:?}: {}", cmd, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse() {
        assert_eq!(Command::parse("/pause", "relaybot").ok(), Some(Command::Pause));
        assert_eq!(
            Command::parse("/status@relaybot", "relaybot").ok(),
            Some(Command::Status)
        );
        assert!(Command::parse("/start", "relaybot").is_err());
    }

    #[test]
    fn test_commands_map_to_control() {
        assert_eq!(ControlCommand::from(Command::Resume), ControlCommand::Resume);
    }
}
