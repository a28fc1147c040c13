use serde::Deserialize;

/// Immutable configuration for one analysis job. Built once by the caller
/// and threaded through the pipeline; no stage reads ambient state.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_soft_time_limit_s")]
    pub soft_time_limit_s: u64,
    #[serde(default = "default_time_limit_s")]
    pub time_limit_s: u64,
    #[serde(default = "default_event_batch_size")]
    pub event_batch_size: usize,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub insight: InsightConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub mask_emails: bool,
    #[serde(default = "default_true")]
    pub mask_phone_numbers: bool,
    #[serde(default = "default_true")]
    pub mask_ip_addresses: bool,
    #[serde(default = "default_true")]
    pub mask_jwts: bool,
    #[serde(default = "default_true")]
    pub mask_api_keys: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightProvider {
    Mock,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsightConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_insight_provider")]
    pub provider: InsightProvider,
    #[serde(default = "default_insight_model")]
    pub model: String,
    #[serde(default = "default_insight_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_insight_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_max_cluster_context")]
    pub max_cluster_context: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_lines() -> usize {
    50_000
}

fn default_max_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_soft_time_limit_s() -> u64 {
    120
}

fn default_time_limit_s() -> u64 {
    180
}

fn default_event_batch_size() -> usize {
    500
}

fn default_similarity_threshold() -> f64 {
    0.72
}

fn default_insight_provider() -> InsightProvider {
    InsightProvider::Mock
}

fn default_insight_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_insight_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_insight_timeout_s() -> u64 {
    20
}

fn default_max_cluster_context() -> usize {
    20
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_bytes: default_max_bytes(),
            soft_time_limit_s: default_soft_time_limit_s(),
            time_limit_s: default_time_limit_s(),
            event_batch_size: default_event_batch_size(),
            merge: MergeConfig::default(),
            redaction: RedactionConfig::default(),
            insight: InsightConfig::default(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mask_emails: true,
            mask_phone_numbers: true,
            mask_ip_addresses: true,
            mask_jwts: true,
            mask_api_keys: true,
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_insight_provider(),
            model: default_insight_model(),
            api_url: default_insight_api_url(),
            api_key: String::new(),
            timeout_s: default_insight_timeout_s(),
            max_cluster_context: default_max_cluster_context(),
        }
    }
}
