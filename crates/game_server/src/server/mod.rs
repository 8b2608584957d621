//! Game server composition.

mod core;

pub use self::core::GameServer;
