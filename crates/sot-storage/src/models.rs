use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest goal a session accepts, counted in characters
pub const MAX_GOAL_CHARS: usize = 200;

/// Threshold used when neither the request nor the settings provide one
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Policy applied to off-topic tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Warn only
    #[default]
    Soft,
    /// Warn, then close the tab unless the user chooses to continue
    Hard,
}

impl Strictness {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }

    /// Whether off-topic tabs get a closure timer
    #[must_use]
    pub const fn closes_tabs(&self) -> bool {
        matches!(self, Self::Hard)
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strictness {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            other => Err(SessionError::UnknownStrictness(other.to_string())),
        }
    }
}

/// Rejections for malformed session requests and settings values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Please enter a focus goal")]
    EmptyGoal,
    #[error("Goal must be 200 characters or less (got {0})")]
    GoalTooLong(usize),
    #[error("Threshold must be between 0 and 1 (got {0})")]
    InvalidThreshold(f64),
    #[error("Unknown strictness '{0}' (expected soft or hard)")]
    UnknownStrictness(String),
    #[error("Unknown setting '{0}'")]
    UnknownSetting(String),
    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidSettingValue { key: String, value: String },
}

/// The goal-driven configuration currently governing tab evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: Uuid,
    pub goal: String,
    pub strictness: Strictness,
    pub threshold: f64,
    pub started_at: DateTime<Utc>,
}

impl FocusSession {
    /// Validate a start request and stamp a new session.
    ///
    /// The goal is trimmed before checking; it must be non-empty and at most
    /// [`MAX_GOAL_CHARS`] characters.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the goal is empty or too long, or the
    /// threshold is outside `[0, 1]`
    pub fn start(goal: &str, strictness: Strictness, threshold: f64) -> Result<Self, SessionError> {
        let goal = validate_goal(goal)?;
        validate_threshold(threshold)?;

        Ok(Self {
            id: Uuid::new_v4(),
            goal,
            strictness,
            threshold,
            started_at: Utc::now(),
        })
    }

    /// Whole minutes elapsed since the session started
    #[must_use]
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.started_at).num_minutes()
    }

    /// Human-readable age of the session ("Just now", "1 minute ago", "N minutes ago")
    #[must_use]
    pub fn describe_elapsed(&self, now: DateTime<Utc>) -> String {
        match self.elapsed_minutes(now) {
            i64::MIN..=0 => String::from("Just now"),
            1 => String::from("1 minute ago"),
            minutes => format!("{minutes} minutes ago"),
        }
    }

    /// Whether the session has outlived `timeout_minutes` (0 disables expiry)
    #[must_use]
    pub fn is_expired(&self, timeout_minutes: u32, now: DateTime<Utc>) -> bool {
        timeout_minutes > 0 && self.elapsed_minutes(now) >= i64::from(timeout_minutes)
    }
}

/// Trim a goal and enforce the length rules
///
/// # Errors
///
/// Returns [`SessionError::EmptyGoal`] or [`SessionError::GoalTooLong`]
pub fn validate_goal(goal: &str) -> Result<String, SessionError> {
    let goal = goal.trim();
    if goal.is_empty() {
        return Err(SessionError::EmptyGoal);
    }
    let chars = goal.chars().count();
    if chars > MAX_GOAL_CHARS {
        return Err(SessionError::GoalTooLong(chars));
    }
    Ok(goal.to_string())
}

/// # Errors
///
/// Returns [`SessionError::InvalidThreshold`] for non-finite values or values outside `[0, 1]`
pub fn validate_threshold(threshold: f64) -> Result<(), SessionError> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(SessionError::InvalidThreshold(threshold))
    }
}

/// User preferences, one flat key each in the key-value store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub default_strictness: Strictness,
    pub default_threshold: f64,
    /// Minutes before an active session ends on its own (0 = never)
    pub session_timeout: u32,
    /// Skip AI-assistant and video platforms entirely
    pub ignore_platforms: bool,
}

impl Settings {
    pub const KEY_DEFAULT_STRICTNESS: &'static str = "defaultStrictness";
    pub const KEY_DEFAULT_THRESHOLD: &'static str = "defaultThreshold";
    pub const KEY_SESSION_TIMEOUT: &'static str = "sessionTimeout";
    pub const KEY_IGNORE_PLATFORMS: &'static str = "ignorePlatforms";

    pub const KEYS: [&'static str; 4] = [
        Self::KEY_DEFAULT_STRICTNESS,
        Self::KEY_DEFAULT_THRESHOLD,
        Self::KEY_SESSION_TIMEOUT,
        Self::KEY_IGNORE_PLATFORMS,
    ];

    #[must_use]
    pub fn default_settings() -> Self {
        Self {
            default_strictness: Strictness::Soft,
            default_threshold: DEFAULT_THRESHOLD,
            session_timeout: 120, // 2 hours
            ignore_platforms: false,
        }
    }

    /// Render one setting as the string a user would type
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSetting`] for keys outside [`Settings::KEYS`]
    pub fn get(&self, key: &str) -> Result<String, SessionError> {
        match key {
            Self::KEY_DEFAULT_STRICTNESS => Ok(self.default_strictness.to_string()),
            Self::KEY_DEFAULT_THRESHOLD => Ok(self.default_threshold.to_string()),
            Self::KEY_SESSION_TIMEOUT => Ok(self.session_timeout.to_string()),
            Self::KEY_IGNORE_PLATFORMS => Ok(self.ignore_platforms.to_string()),
            other => Err(SessionError::UnknownSetting(other.to_string())),
        }
    }

    /// Parse and apply one setting from user input
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys or values that fail to parse or validate
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        let invalid = || SessionError::InvalidSettingValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            Self::KEY_DEFAULT_STRICTNESS => {
                self.default_strictness = value.parse().map_err(|_| invalid())?;
            }
            Self::KEY_DEFAULT_THRESHOLD => {
                let threshold: f64 = value.trim().parse().map_err(|_| invalid())?;
                validate_threshold(threshold)?;
                self.default_threshold = threshold;
            }
            Self::KEY_SESSION_TIMEOUT => {
                self.session_timeout = value.trim().parse().map_err(|_| invalid())?;
            }
            Self::KEY_IGNORE_PLATFORMS => {
                self.ignore_platforms = value.trim().parse().map_err(|_| invalid())?;
            }
            other => return Err(SessionError::UnknownSetting(other.to_string())),
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}
