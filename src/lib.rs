#[cfg(feature = "http-api")]
pub mod api;
pub mod assembly;
pub mod audit;
pub mod cutlist;
pub mod error;
pub mod logging;
pub mod logic;
pub mod paths;
pub mod registry;
pub mod reload;
pub mod remote;
pub mod session;
pub mod settings;
pub mod state;
pub mod storage;
pub mod timecode;
