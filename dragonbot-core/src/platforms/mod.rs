// File: dragonbot-core/src/platforms/mod.rs

pub mod discord;
