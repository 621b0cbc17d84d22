use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{ContextCategory, ExpressionMode, Modifier};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub drift: DriftPolicy,
    #[serde(default)]
    pub context: ContextTable,
    #[serde(default)]
    pub shaping: ShapingTable,
}

impl CoreConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Self::from_toml(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using CoreConfig::default().",
                path.display()
            );
            CoreConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str::<CoreConfig>(text)?)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.memory.db_path = absolutize(root, &self.memory.db_path);
        self.logbook.path = absolutize(root, &self.logbook.path);
        self.logbook.actions = absolutize(root, &self.logbook.actions);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
    #[serde(default = "SystemConfig::default_version")]
    pub version: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "lorekeeper".to_string()
    }

    fn default_version() -> String {
        "0.1.0".to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "MemoryConfig::default_db_path")]
    pub db_path: PathBuf,
}

impl MemoryConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("cache/lore.db")
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_path")]
    pub path: PathBuf,
    #[serde(default = "LogbookConfig::default_actions")]
    pub actions: PathBuf,
    #[serde(default = "LogbookConfig::default_preview_len")]
    pub preview_len: usize,
}

impl LogbookConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("logbook")
    }

    fn default_actions() -> PathBuf {
        PathBuf::from("logbook/actions.jsonl")
    }

    fn default_preview_len() -> usize {
        160
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            actions: Self::default_actions(),
            preview_len: Self::default_preview_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "ServicesConfig::default_true")]
    pub audit_enabled: bool,
    #[serde(default = "ServicesConfig::default_true")]
    pub drift_enabled: bool,
}

impl ServicesConfig {
    fn default_true() -> bool {
        true
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            drift_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_entity_capacity")]
    pub entity_capacity: usize,
}

impl CacheConfig {
    fn default_entity_capacity() -> usize {
        1000
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entity_capacity: Self::default_entity_capacity(),
        }
    }
}

// -------------------------------------------------------------------------
// Drift policy (used by services::signals and services::drift)
// -------------------------------------------------------------------------

/// Per-category contributions to the drift signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftWeights {
    #[serde(default = "DriftWeights::default_context")]
    pub context: f64,
    #[serde(default = "DriftWeights::default_sentiment")]
    pub sentiment: f64,
    #[serde(default = "DriftWeights::default_importance")]
    pub importance: f64,
    /// Flat multiplier applied when more than one category shifted.
    #[serde(default = "DriftWeights::default_multi_signal_bonus")]
    pub multi_signal_bonus: f64,
}

impl DriftWeights {
    fn default_context() -> f64 {
        0.4
    }
    fn default_sentiment() -> f64 {
        0.3
    }
    fn default_importance() -> f64 {
        0.3
    }
    fn default_multi_signal_bonus() -> f64 {
        1.2
    }
}

impl Default for DriftWeights {
    fn default() -> Self {
        Self {
            context: Self::default_context(),
            sentiment: Self::default_sentiment(),
            importance: Self::default_importance(),
            multi_signal_bonus: Self::default_multi_signal_bonus(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftPolicy {
    #[serde(default = "DriftPolicy::default_threshold")]
    pub threshold: f64,
    /// Both windows need at least this many mentions before anything is scored.
    #[serde(default = "DriftPolicy::default_min_mentions")]
    pub min_mentions: usize,
    #[serde(default = "DriftPolicy::default_recent_window_days")]
    pub recent_window_days: u32,
    /// Length of the window that ends where the recent window starts.
    #[serde(default = "DriftPolicy::default_historical_window_days")]
    pub historical_window_days: u32,
    #[serde(default = "DriftPolicy::default_importance_change_ratio")]
    pub importance_change_ratio: f64,
    #[serde(default)]
    pub weights: DriftWeights,
}

impl DriftPolicy {
    fn default_threshold() -> f64 {
        0.65
    }
    fn default_min_mentions() -> usize {
        3
    }
    fn default_recent_window_days() -> u32 {
        30
    }
    fn default_historical_window_days() -> u32 {
        90
    }
    fn default_importance_change_ratio() -> f64 {
        0.5
    }
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            min_mentions: Self::default_min_mentions(),
            recent_window_days: Self::default_recent_window_days(),
            historical_window_days: Self::default_historical_window_days(),
            importance_change_ratio: Self::default_importance_change_ratio(),
            weights: DriftWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextKeywords {
    pub category: ContextCategory,
    pub keywords: Vec<String>,
}

/// Ordered category -> keyword table. Order matters: it breaks ties when
/// picking a dominant context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextTable(pub Vec<ContextKeywords>);

impl ContextTable {
    pub fn entries(&self) -> &[ContextKeywords] {
        &self.0
    }
}

impl Default for ContextTable {
    fn default() -> Self {
        let row = |category, words: &[&str]| ContextKeywords {
            category,
            keywords: words.iter().map(|w| w.to_string()).collect(),
        };
        ContextTable(vec![
            row(
                ContextCategory::Work,
                &["work", "job", "boss", "meeting", "office", "project", "deadline", "colleague", "client"],
            ),
            row(
                ContextCategory::Family,
                &["family", "mom", "dad", "mother", "father", "sister", "brother", "parent", "grandma", "grandpa"],
            ),
            row(
                ContextCategory::Romantic,
                &["date", "love", "boyfriend", "girlfriend", "partner", "romantic", "kiss", "relationship"],
            ),
            row(
                ContextCategory::Social,
                &["friend", "party", "hang out", "drinks", "dinner", "group chat"],
            ),
            row(
                ContextCategory::Personal,
                &["myself", "alone", "personal", "private", "reflect", "journal"],
            ),
            row(
                ContextCategory::Health,
                &["doctor", "gym", "sick", "health", "therapy", "hospital", "workout"],
            ),
            row(
                ContextCategory::Creative,
                &["writing", "paint", "music", "art", "creative", "song", "draw"],
            ),
        ])
    }
}

// -------------------------------------------------------------------------
// Response shaping (used by services::shaping)
// -------------------------------------------------------------------------

/// Expression mode -> directives appended after the tone-derived ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapingTable {
    #[serde(default = "ShapingTable::default_supportive")]
    pub supportive: Vec<Modifier>,
    #[serde(default = "ShapingTable::default_social_focus")]
    pub social_focus: Vec<Modifier>,
    #[serde(default = "ShapingTable::default_factual")]
    pub factual: Vec<Modifier>,
    #[serde(default = "ShapingTable::default_analytical")]
    pub analytical: Vec<Modifier>,
    #[serde(default = "ShapingTable::default_strategic")]
    pub strategic: Vec<Modifier>,
    #[serde(default = "ShapingTable::default_minimal")]
    pub minimal: Vec<Modifier>,
}

impl ShapingTable {
    pub fn for_mode(&self, mode: ExpressionMode) -> &[Modifier] {
        match mode {
            ExpressionMode::Supportive => &self.supportive,
            ExpressionMode::SocialFocus => &self.social_focus,
            ExpressionMode::Factual => &self.factual,
            ExpressionMode::Analytical => &self.analytical,
            ExpressionMode::Strategic => &self.strategic,
            ExpressionMode::Minimal => &self.minimal,
        }
    }

    fn default_supportive() -> Vec<Modifier> {
        vec![
            Modifier::ValidateEmotion,
            Modifier::NoAdvice,
            Modifier::GentleQuestionsOptional,
        ]
    }
    fn default_social_focus() -> Vec<Modifier> {
        vec![Modifier::PeopleCentered, Modifier::NoInference]
    }
    fn default_factual() -> Vec<Modifier> {
        vec![
            Modifier::NeutralLanguage,
            Modifier::NoInference,
            Modifier::NoExtraInsight,
        ]
    }
    fn default_analytical() -> Vec<Modifier> {
        vec![Modifier::Structured, Modifier::ExplainReasoning]
    }
    fn default_strategic() -> Vec<Modifier> {
        vec![Modifier::ActionOriented, Modifier::Prioritize]
    }
    fn default_minimal() -> Vec<Modifier> {
        vec![Modifier::ShortResponse, Modifier::NoExtraInsight]
    }
}

impl Default for ShapingTable {
    fn default() -> Self {
        Self {
            supportive: Self::default_supportive(),
            social_focus: Self::default_social_focus(),
            factual: Self::default_factual(),
            analytical: Self::default_analytical(),
            strategic: Self::default_strategic(),
            minimal: Self::default_minimal(),
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}
