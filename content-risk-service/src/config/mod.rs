use crate::error::{Result, RiskServiceError};
use std::env;
use std::path::PathBuf;

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Database / messaging
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,

    // Fusion weights and alerting
    pub fusion_text_weight: f64,
    pub fusion_video_weight: f64,
    pub fusion_audio_weight: f64,
    pub alert_threshold: f64,

    // Storage layout
    pub media_root: PathBuf,
    pub demo_input_dir: PathBuf,
    pub keywords_en_path: PathBuf,
    pub keywords_si_path: PathBuf,

    // Remote inference endpoints (empty = heuristic/degraded defaults only)
    pub text_inference_url: String,
    pub video_inference_url: String,
    pub audio_inference_url: String,
    pub inference_token: String,
    pub inference_timeout_secs: u64,

    // Source polling
    pub twitter_bearer_token: String,
    pub twitter_query: String,
    pub twitter_poll_interval_secs: u64,
    pub twitter_poll_limit: usize,
    pub facebook_access_token: String,
    pub facebook_page_ids: String,
    pub facebook_poll_interval_secs: u64,
    pub facebook_poll_limit: usize,

    // Replay / demo ingestion. Replay runs at startup when a directory is
    // configured.
    pub replay_dir: PathBuf,
    pub replay_speed: f64,
    pub replay_limit: usize,

    // Analysis worker pool
    pub analysis_workers: usize,

    // Service identity
    pub service_name: String,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| RiskServiceError::Config("DATABASE_URL must be set".to_string()))?;

        Ok(Self {
            database_url,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 20),
            fusion_text_weight: env_parse("FUSION_TEXT_WEIGHT", 0.4),
            fusion_video_weight: env_parse("FUSION_VIDEO_WEIGHT", 0.4),
            fusion_audio_weight: env_parse("FUSION_AUDIO_WEIGHT", 0.2),
            alert_threshold: env_parse("ALERT_THRESHOLD", 70.0),
            media_root: PathBuf::from(env_or("MEDIA_ROOT", "storage")),
            demo_input_dir: PathBuf::from(env_or("DEMO_INPUT_DIR", "data/demo_inputs")),
            keywords_en_path: PathBuf::from(env_or("KEYWORDS_EN_PATH", "data/keywords/en.txt")),
            keywords_si_path: PathBuf::from(env_or("KEYWORDS_SI_PATH", "data/keywords/si.txt")),
            text_inference_url: env_or("TEXT_INFERENCE_URL", ""),
            video_inference_url: env_or("VIDEO_INFERENCE_URL", ""),
            audio_inference_url: env_or("AUDIO_INFERENCE_URL", ""),
            inference_token: env_or("INFERENCE_TOKEN", ""),
            inference_timeout_secs: env_parse("INFERENCE_TIMEOUT_SECS", 30),
            twitter_bearer_token: env_or("TWITTER_BEARER_TOKEN", ""),
            twitter_query: env_or(
                "TWITTER_QUERY",
                "(violence OR abuse OR murder OR hate speech OR fight OR weapon) (lang:en OR lang:si)",
            ),
            twitter_poll_interval_secs: env_parse("TWITTER_POLL_INTERVAL_SECS", 30),
            twitter_poll_limit: env_parse("TWITTER_POLL_LIMIT", 20),
            facebook_access_token: env_or("FACEBOOK_PAGE_ACCESS_TOKEN", ""),
            facebook_page_ids: env_or("FACEBOOK_PAGE_IDS", ""),
            facebook_poll_interval_secs: env_parse("FACEBOOK_POLL_INTERVAL_SECS", 60),
            facebook_poll_limit: env_parse("FACEBOOK_POLL_LIMIT", 20),
            replay_dir: PathBuf::from(env_or("REPLAY_DIR", "")),
            replay_speed: env_parse("REPLAY_SPEED", 1.0),
            replay_limit: env_parse("REPLAY_LIMIT", 100),
            analysis_workers: env_parse("ANALYSIS_WORKERS", 4),
            service_name: env_or("SERVICE_NAME", "content-risk-service"),
            environment: env_or("ENVIRONMENT", "development"),
        })
    }

    pub fn facebook_page_ids_list(&self) -> Vec<String> {
        self.facebook_page_ids
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; tests touching them run serialized.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DATABASE_URL", "postgres://test");
        env::remove_var("FACEBOOK_PAGE_IDS");

        let config = Config::from_env().unwrap();
        assert_eq!(config.alert_threshold, 70.0);
        assert_eq!(config.fusion_text_weight, 0.4);
        assert_eq!(config.fusion_audio_weight, 0.2);
        assert!(config.facebook_page_ids_list().is_empty());
        assert!(config.replay_dir.as_os_str().is_empty());
    }

    #[test]
    fn test_facebook_page_ids_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("FACEBOOK_PAGE_IDS", "123, 456,,789");

        let config = Config::from_env().unwrap();
        assert_eq!(config.facebook_page_ids_list(), vec!["123", "456", "789"]);
        env::remove_var("FACEBOOK_PAGE_IDS");
    }
}
