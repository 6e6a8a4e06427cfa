pub mod config;
pub mod data;
pub mod host;
pub mod score;
pub mod session;
