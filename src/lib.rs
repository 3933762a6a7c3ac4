pub mod config;
pub mod errors;
pub mod outbound;
pub mod server;
pub mod store;
pub mod telephony;
pub mod textgen;
pub mod voice;
