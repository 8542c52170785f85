use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Directory the detector writes annotated images into; mounted read-only.
    pub static_dir: PathBuf,
    /// URL prefix annotated images are served under, without a trailing slash.
    pub static_url_prefix: String,
    /// Scratch directory for uploads while they are being processed.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub model_path: PathBuf,
    pub model_input_size: u32,
    pub warmup_image: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("static_dir", &self.static_dir)
            .field("static_url_prefix", &self.static_url_prefix)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("model_path", &self.model_path)
            .field("model_input_size", &self.model_input_size)
            .field("warmup_image", &self.warmup_image)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("iou_threshold", &self.iou_threshold)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
