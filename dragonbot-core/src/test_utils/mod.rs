// File: dragonbot-core/src/test_utils/mod.rs

pub mod fake_platform;
pub mod helpers;
pub mod memory_store;

pub use fake_platform::FakePlatform;
pub use helpers::TestHarness;
pub use memory_store::MemoryStore;
