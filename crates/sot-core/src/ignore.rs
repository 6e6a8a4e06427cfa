use sot_storage::Settings;
use std::sync::atomic::{AtomicBool, Ordering};

/// URL prefixes of browser-internal pages, never evaluated
pub const INTERNAL_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "moz-extension://",
    "about:",
    "edge://",
    "brave://",
];

/// AI assistants and video platforms skipped when the ignore flag is on
pub const IGNORED_PLATFORMS: &[&str] = &[
    "chatgpt.com",
    "openai.com",
    "claude.ai",
    "anthropic.com",
    "deepseek.com",
    "gemini.google.com",
    "bard.google.com",
    "copilot.microsoft.com",
    "bing.com/chat",
    "perplexity.ai",
    "you.com",
    "phind.com",
    "character.ai",
    "huggingface.co",
    "poe.com",
    "replit.com",
    "notion.ai",
    "quora.com/poe",
    "meta.ai",
    "mistral.ai",
    "cohere.com",
    "runwayml.com",
    "stability.ai",
    "midjourney.com",
    "leonardo.ai",
    "firefly.adobe.com",
    "youtube.com",
    "youtu.be",
];

/// Check whether a URL belongs to the browser itself
#[must_use]
pub fn is_internal_page(url: &str) -> bool {
    INTERNAL_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

/// Decides which tabs are exempt from evaluation
pub trait IgnoreRules: Send + Sync {
    fn should_ignore(&self, url: &str) -> bool;
}

/// Platform filter driven by the persisted `ignorePlatforms` flag
#[derive(Debug, Default)]
pub struct IgnoreFilter {
    enabled: AtomicBool,
}

impl IgnoreFilter {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ignore_platforms)
    }

    /// Pick up a changed flag without rebuilding the filter
    pub fn update_settings(&self, settings: &Settings) {
        let previous = self
            .enabled
            .swap(settings.ignore_platforms, Ordering::SeqCst);
        if previous != settings.ignore_platforms {
            log::info!("Platform ignore list enabled: {}", settings.ignore_platforms);
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Check whether a URL is on the platform list, regardless of the flag
    #[must_use]
    pub fn matches_platform(url: &str) -> bool {
        IGNORED_PLATFORMS.iter().any(|platform| url.contains(platform))
    }
}

impl IgnoreRules for IgnoreFilter {
    fn should_ignore(&self, url: &str) -> bool {
        self.is_enabled() && Self::matches_platform(url)
    }
}
