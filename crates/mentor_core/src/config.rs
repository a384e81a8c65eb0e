use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MentorConfig {
    pub coaching: CoachingThresholds,
    pub generation: GenerationConfig,
    pub context: ContextConfig,
}

impl MentorConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: MentorConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.coaching = config.coaching.sanitized();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_parse("MENTOR_GENERATION_TIMEOUT_MS") {
            self.generation.timeout_ms = n;
        }
        if let Some(enabled) = env_parse("MENTOR_GENERATION_ENABLED") {
            self.generation.enabled = enabled;
        }
        if let Some(n) = env_parse("MENTOR_REMOTE_TOKEN_BUDGET") {
            self.context.remote.max_tokens = n;
        }
        if let Some(n) = env_parse("MENTOR_LOCAL_TOKEN_BUDGET") {
            self.context.local.max_tokens = n;
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ============================================================================
// Coaching thresholds
// ============================================================================

/// Thresholds of the priority rule chain, in tier order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoachingThresholds {
    /// Tier 2: a deadline this close (or closer) is urgent.
    pub urgent_deadline_hours: i64,
    /// Tier 3: minimum streak worth protecting.
    pub streak_at_risk_min: u32,
    /// Tier 4: goal age before low progress counts as stalled.
    pub stalled_goal_min_age_days: i64,
    /// Tier 4: progress strictly below this percent is stalled.
    pub stalled_goal_max_progress: u8,
    /// Tier 5: goal age before a mini win is suggested.
    pub mini_win_min_age_days: i64,
    /// Tier 5: progress strictly below this percent.
    pub mini_win_max_progress: u8,
    /// Tier 6: days without journaling before a comeback card.
    pub comeback_min_days: i64,
    /// Tier 8: habit completion rate over the window (0.0-1.0).
    pub winning_completion_rate: f32,
    /// Tier 8: journal entries per week over the window.
    pub winning_journals_per_week: f32,
    /// Tier 8: trailing window length.
    pub winning_window_days: i64,
    /// Tier 7a: how long a finished reflection counts as "just completed".
    pub reflection_window_minutes: i64,
}

impl CoachingThresholds {
    /// Clamp every threshold into a range the rule chain can turn into a
    /// duration. Out-of-range values are logged and replaced.
    pub fn sanitized(mut self) -> Self {
        clamp_threshold("urgent_deadline_hours", &mut self.urgent_deadline_hours, 0, 24 * 365);
        clamp_threshold("stalled_goal_min_age_days", &mut self.stalled_goal_min_age_days, 0, 3650);
        clamp_threshold("mini_win_min_age_days", &mut self.mini_win_min_age_days, 0, 3650);
        clamp_threshold("comeback_min_days", &mut self.comeback_min_days, 0, 3650);
        clamp_threshold("winning_window_days", &mut self.winning_window_days, 1, 365);
        clamp_threshold("reflection_window_minutes", &mut self.reflection_window_minutes, 0, 60 * 24 * 30);
        self.stalled_goal_max_progress = self.stalled_goal_max_progress.min(100);
        self.mini_win_max_progress = self.mini_win_max_progress.min(100);

        let defaults = Self::default();
        if !self.winning_completion_rate.is_finite() {
            tracing::warn!("winning_completion_rate is not a number, using default");
            self.winning_completion_rate = defaults.winning_completion_rate;
        }
        self.winning_completion_rate = self.winning_completion_rate.clamp(0.0, 1.0);
        if !self.winning_journals_per_week.is_finite() || self.winning_journals_per_week < 0.0 {
            tracing::warn!("winning_journals_per_week out of range, using default");
            self.winning_journals_per_week = defaults.winning_journals_per_week;
        }
        self
    }
}

fn clamp_threshold(name: &str, value: &mut i64, min: i64, max: i64) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        tracing::warn!(field = name, value = *value, clamped, "Coaching threshold out of range");
        *value = clamped;
    }
}

impl Default for CoachingThresholds {
    fn default() -> Self {
        Self {
            urgent_deadline_hours: 24,
            streak_at_risk_min: 7,
            stalled_goal_min_age_days: 3,
            stalled_goal_max_progress: 10,
            mini_win_min_age_days: 3,
            mini_win_max_progress: 5,
            comeback_min_days: 3,
            winning_completion_rate: 0.8,
            winning_journals_per_week: 4.0,
            winning_window_days: 14,
            reflection_window_minutes: 60,
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// When false every card uses its template.
    pub enabled: bool,
    /// Upper bound on one external generation call.
    pub timeout_ms: u64,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 8_000,
        }
    }
}

// ============================================================================
// Context budgets
// ============================================================================

/// Text-generation backend a context is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Remote,
    Local,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Remote => "remote",
            Backend::Local => "local",
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(Backend::Remote),
            "local" => Ok(Backend::Local),
            other => Err(format!("unknown backend '{}' (expected remote or local)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendBudget {
    /// Estimated token ceiling for the whole context.
    pub max_tokens: usize,
    pub max_journal_entries: usize,
    pub max_pulse_entries: usize,
    /// Words kept from each journal entry.
    pub journal_excerpt_words: usize,
}

impl Default for BackendBudget {
    fn default() -> Self {
        Self {
            max_tokens: 2_000,
            max_journal_entries: 20,
            max_pulse_entries: 14,
            journal_excerpt_words: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub remote: BackendBudget,
    pub local: BackendBudget,
}

impl ContextConfig {
    pub fn budget(&self, backend: Backend) -> &BackendBudget {
        match backend {
            Backend::Remote => &self.remote,
            Backend::Local => &self.local,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            remote: BackendBudget::default(),
            local: BackendBudget {
                max_tokens: 350,
                max_journal_entries: 3,
                max_pulse_entries: 3,
                journal_excerpt_words: 20,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = MentorConfig::default();
        assert_eq!(cfg.coaching.urgent_deadline_hours, 24);
        assert_eq!(cfg.coaching.streak_at_risk_min, 7);
        assert_eq!(cfg.coaching.winning_window_days, 14);
        assert!(cfg.generation.enabled);
        assert!(cfg.context.remote.max_tokens > cfg.context.local.max_tokens);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[coaching]
streak_at_risk_min = 10
"#;
        let cfg: MentorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.coaching.streak_at_risk_min, 10);
        // Defaults for unspecified fields
        assert_eq!(cfg.coaching.comeback_min_days, 3);
        assert_eq!(cfg.context.local.max_tokens, 350);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[coaching]
urgent_deadline_hours = 48
streak_at_risk_min = 5
stalled_goal_min_age_days = 7
stalled_goal_max_progress = 20
mini_win_min_age_days = 2
mini_win_max_progress = 3
comeback_min_days = 5
winning_completion_rate = 0.9
winning_journals_per_week = 3.0
winning_window_days = 21
reflection_window_minutes = 30

[generation]
enabled = false
timeout_ms = 1500

[context.remote]
max_tokens = 4000
max_journal_entries = 30

[context.local]
max_tokens = 200
journal_excerpt_words = 10
"#;
        let cfg: MentorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.coaching.urgent_deadline_hours, 48);
        assert_eq!(cfg.coaching.winning_window_days, 21);
        assert!(!cfg.generation.enabled);
        assert_eq!(cfg.generation.timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.context.budget(Backend::Remote).max_tokens, 4000);
        assert_eq!(cfg.context.budget(Backend::Remote).max_journal_entries, 30);
        // Partially specified table keeps field defaults
        assert_eq!(cfg.context.budget(Backend::Remote).max_pulse_entries, 14);
        assert_eq!(cfg.context.budget(Backend::Local).journal_excerpt_words, 10);
    }

    #[test]
    fn test_out_of_range_thresholds_are_clamped() {
        let toml_str = r#"
[coaching]
urgent_deadline_hours = 9223372036854775807
comeback_min_days = -4
winning_window_days = 0
reflection_window_minutes = -90000000000000
stalled_goal_max_progress = 250
winning_completion_rate = 3.5
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentor.toml");
        std::fs::write(&path, toml_str).unwrap();

        let t = MentorConfig::load(&path).unwrap().coaching;
        assert_eq!(t.urgent_deadline_hours, 24 * 365);
        assert_eq!(t.comeback_min_days, 0);
        assert_eq!(t.winning_window_days, 1);
        assert_eq!(t.reflection_window_minutes, 0);
        assert_eq!(t.stalled_goal_max_progress, 100);
        assert_eq!(t.winning_completion_rate, 1.0);
        // Values already in range are untouched
        assert_eq!(CoachingThresholds::default().sanitized(), CoachingThresholds::default());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("remote".parse::<Backend>(), Ok(Backend::Remote));
        assert_eq!("LOCAL".parse::<Backend>(), Ok(Backend::Local));
        assert!("cloud".parse::<Backend>().is_err());
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        std::env::set_var("MENTOR_LOCAL_TOKEN_BUDGET", "123");
        let mut cfg = MentorConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.context.local.max_tokens, 123);
        std::env::remove_var("MENTOR_LOCAL_TOKEN_BUDGET");

        // Nonexistent path returns defaults
        let cfg = MentorConfig::load_or_default("/nonexistent/mentor.toml");
        assert_eq!(cfg.coaching.stalled_goal_max_progress, 10);
    }
}
