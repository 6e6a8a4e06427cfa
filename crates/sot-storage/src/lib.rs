pub mod db;
pub mod migrations;
pub mod models;

pub use db::Database;
pub use models::{
    validate_goal, validate_threshold, FocusSession, SessionError, Settings, Strictness,
    DEFAULT_THRESHOLD, MAX_GOAL_CHARS,
};
