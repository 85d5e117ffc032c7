/// Backend collaborator implementations (forward, history, notify)
pub mod backend;
/// Conversion from Telegram messages to relay messages
pub mod convert;
/// Update routing and command handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
