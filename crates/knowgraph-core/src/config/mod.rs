//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::graph::Confidence;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "KNOWGRAPH_CONFIG_DIR";

/// Upper bound for day-count settings (about a century)
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Knowgraph configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub traversal: TraversalConfig,
    pub learning: LearningConfig,
    pub framing: FramingConfig,
    pub query: QueryConfig,
}

/// Constants of the additive relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub confidence_high: u32,
    pub confidence_medium: u32,
    pub confidence_low: u32,
    /// Points per recorded test
    pub test_weight: u32,
    /// Ceiling for the test-count term
    pub test_cap: u32,
    pub recency_bonus: u32,
    /// A validation younger than this many days counts as recent
    pub recency_days: i64,
    pub mention_bonus: u32,
    /// Multiplier on the emotional weight for emotion nodes
    pub emotion_multiplier: u32,
    pub connectivity_cap: u32,
    pub historical_bonus: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    pub max_hops: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Where `learning-history.json` and `query-patterns.json` live
    pub state_dir: Option<PathBuf>,
    /// Appends between automatic flushes
    pub flush_every: usize,
    pub reinforce_window_days: i64,
    /// Records considered when suggesting connections
    pub history_window: usize,
    /// Token Jaccard threshold for "similar query"
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_items: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            confidence_high: 3,
            confidence_medium: 2,
            confidence_low: 0,
            test_weight: 1,
            test_cap: 5,
            recency_bonus: 2,
            recency_days: 7,
            mention_bonus: 10,
            emotion_multiplier: 2,
            connectivity_cap: 5,
            historical_bonus: 5,
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self { max_hops: 2 }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            flush_every: 10,
            reinforce_window_days: 30,
            history_window: 50,
            similarity_threshold: 0.6,
        }
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { max_items: 10 }
    }
}

impl ScoringConfig {
    /// Points for a confidence tier
    pub fn confidence_points(&self, confidence: Confidence) -> u32 {
        match confidence {
            Confidence::High => self.confidence_high,
            Confidence::Medium => self.confidence_medium,
            Confidence::Low => self.confidence_low,
        }
    }

    /// Per-node normalizer for result confidence
    ///
    /// A fully validated, recently tested node that was named in the question.
    pub fn max_possible(&self) -> u32 {
        self.confidence_high
            .max(self.confidence_medium)
            .max(self.confidence_low)
            .saturating_add(self.test_cap)
            .saturating_add(self.recency_bonus)
            .saturating_add(self.mention_bonus)
    }
}

/// Every key accepted by [`Config::get`] and [`Config::set`]
const KEYS: &[&str] = &[
    "scoring.confidence_high",
    "scoring.confidence_medium",
    "scoring.confidence_low",
    "scoring.test_weight",
    "scoring.test_cap",
    "scoring.recency_bonus",
    "scoring.recency_days",
    "scoring.mention_bonus",
    "scoring.emotion_multiplier",
    "scoring.connectivity_cap",
    "scoring.historical_bonus",
    "traversal.max_hops",
    "learning.state_dir",
    "learning.flush_every",
    "learning.reinforce_window_days",
    "learning.history_window",
    "learning.similarity_threshold",
    "framing.timeout_ms",
    "query.max_items",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("knowgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Default state directory when none is configured
    pub fn default_state_dir() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("state"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.learning.flush_every == 0 {
            return Err(anyhow!("learning.flush_every must be at least 1"));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.learning.reinforce_window_days) {
            return Err(anyhow!(
                "learning.reinforce_window_days must be between 1 and {MAX_WINDOW_DAYS}"
            ));
        }
        if !(0.0..=1.0).contains(&self.learning.similarity_threshold) {
            return Err(anyhow!("learning.similarity_threshold must be between 0.0 and 1.0"));
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.scoring.recency_days) {
            return Err(anyhow!("scoring.recency_days must be between 0 and {MAX_WINDOW_DAYS}"));
        }
        if self.scoring.max_possible() == 0 {
            return Err(anyhow!("scoring constants must not all be zero"));
        }
        if self.framing.timeout_ms == 0 {
            return Err(anyhow!("framing.timeout_ms must be at least 1"));
        }
        if self.query.max_items == 0 {
            return Err(anyhow!("query.max_items must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let s = &self.scoring;
        let value = match key {
            "scoring.confidence_high" => s.confidence_high.to_string(),
            "scoring.confidence_medium" => s.confidence_medium.to_string(),
            "scoring.confidence_low" => s.confidence_low.to_string(),
            "scoring.test_weight" => s.test_weight.to_string(),
            "scoring.test_cap" => s.test_cap.to_string(),
            "scoring.recency_bonus" => s.recency_bonus.to_string(),
            "scoring.recency_days" => s.recency_days.to_string(),
            "scoring.mention_bonus" => s.mention_bonus.to_string(),
            "scoring.emotion_multiplier" => s.emotion_multiplier.to_string(),
            "scoring.connectivity_cap" => s.connectivity_cap.to_string(),
            "scoring.historical_bonus" => s.historical_bonus.to_string(),

            "traversal.max_hops" => self.traversal.max_hops.to_string(),

            "learning.state_dir" => match &self.learning.state_dir {
                Some(dir) => dir.display().to_string(),
                None => "(not set - defaults to <config dir>/state)".to_string(),
            },
            "learning.flush_every" => self.learning.flush_every.to_string(),
            "learning.reinforce_window_days" => self.learning.reinforce_window_days.to_string(),
            "learning.history_window" => self.learning.history_window.to_string(),
            "learning.similarity_threshold" => self.learning.similarity_threshold.to_string(),

            "framing.timeout_ms" => self.framing.timeout_ms.to_string(),
            "query.max_items" => self.query.max_items.to_string(),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `knowgraph config list` to see available keys.",
                    key
                ));
            }
        };
        Ok(value)
    }

    /// Set a configuration value by key
    ///
    /// The whole config is revalidated; an invalid value leaves it unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut next = self.clone();
        match key {
            "scoring.confidence_high" => next.scoring.confidence_high = parse(key, value)?,
            "scoring.confidence_medium" => next.scoring.confidence_medium = parse(key, value)?,
            "scoring.confidence_low" => next.scoring.confidence_low = parse(key, value)?,
            "scoring.test_weight" => next.scoring.test_weight = parse(key, value)?,
            "scoring.test_cap" => next.scoring.test_cap = parse(key, value)?,
            "scoring.recency_bonus" => next.scoring.recency_bonus = parse(key, value)?,
            "scoring.recency_days" => next.scoring.recency_days = parse(key, value)?,
            "scoring.mention_bonus" => next.scoring.mention_bonus = parse(key, value)?,
            "scoring.emotion_multiplier" => next.scoring.emotion_multiplier = parse(key, value)?,
            "scoring.connectivity_cap" => next.scoring.connectivity_cap = parse(key, value)?,
            "scoring.historical_bonus" => next.scoring.historical_bonus = parse(key, value)?,

            "traversal.max_hops" => next.traversal.max_hops = parse(key, value)?,

            "learning.state_dir" => {
                let trimmed = value.trim();
                next.learning.state_dir = if trimmed.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(trimmed))
                };
            }
            "learning.flush_every" => next.learning.flush_every = parse(key, value)?,
            "learning.reinforce_window_days" => {
                next.learning.reinforce_window_days = parse(key, value)?
            }
            "learning.history_window" => next.learning.history_window = parse(key, value)?,
            "learning.similarity_threshold" => {
                next.learning.similarity_threshold = parse(key, value)?
            }

            "framing.timeout_ms" => next.framing.timeout_ms = parse(key, value)?,
            "query.max_items" => next.query.max_items = parse(key, value)?,

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `knowgraph config list` to see available keys.",
                    key
                ));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// All configuration keys
    pub fn keys() -> &'static [&'static str] {
        KEYS
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// The configured state directory, or the default one
    pub fn resolved_state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.learning.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_state_dir(),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}
