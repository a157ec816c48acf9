// src/lib.rs

pub mod db;
pub mod repositories;
pub mod cache;
pub mod platforms;
pub mod services;
pub mod test_utils;

pub use db::Database;
pub use dragonbot_common::error::Error;
