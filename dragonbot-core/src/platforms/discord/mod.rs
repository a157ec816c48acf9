// File: dragonbot-core/src/platforms/discord/mod.rs

pub mod client;
pub mod components;
pub mod runtime;

pub use client::DiscordTicketPlatform;
pub use runtime::DiscordRuntime;
