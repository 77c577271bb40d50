pub mod bot_ready;
pub mod guild_create;
pub mod interaction;
pub mod message_sent;
