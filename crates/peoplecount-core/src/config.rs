use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_unit_f32 = |var: &str, default: &str| -> Result<f32, ConfigError> {
        let value = or_default(var, default)
            .parse::<f32>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(invalid(var, format!("{value} is outside [0, 1]")))
        }
    };

    let database_url = or_default("DATABASE_URL", "sqlite://peoplecount.db");
    let env = parse_environment(&or_default("PEOPLECOUNT_ENV", "development"))?;
    let bind_addr = parse_addr("PEOPLECOUNT_BIND_ADDR", "0.0.0.0:8000")?;
    let log_level = or_default("PEOPLECOUNT_LOG_LEVEL", "info");

    let static_dir = PathBuf::from(or_default("PEOPLECOUNT_STATIC_DIR", "static"));
    let static_url_prefix = normalize_url_prefix(&or_default(
        "PEOPLECOUNT_STATIC_URL_PREFIX",
        "/static",
    ));
    let upload_dir = PathBuf::from(or_default("PEOPLECOUNT_UPLOAD_DIR", "temp_uploads"));
    let max_upload_bytes = parse_usize("PEOPLECOUNT_MAX_UPLOAD_BYTES", "20971520")?;

    let model_path = PathBuf::from(or_default(
        "PEOPLECOUNT_MODEL_PATH",
        "checkpoints/yolo11n.onnx",
    ));
    let model_input_size = parse_u32("PEOPLECOUNT_MODEL_INPUT_SIZE", "640")?;
    if model_input_size == 0 {
        return Err(invalid(
            "PEOPLECOUNT_MODEL_INPUT_SIZE",
            "must be greater than zero".to_string(),
        ));
    }
    let warmup_image = lookup("PEOPLECOUNT_WARMUP_IMAGE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    let confidence_threshold = parse_unit_f32("PEOPLECOUNT_CONFIDENCE_THRESHOLD", "0.5")?;
    let iou_threshold = parse_unit_f32("PEOPLECOUNT_IOU_THRESHOLD", "0.4")?;

    let db_max_connections = parse_u32("PEOPLECOUNT_DB_MAX_CONNECTIONS", "5")?;
    let db_acquire_timeout_secs = parse_u64("PEOPLECOUNT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        static_dir,
        static_url_prefix,
        upload_dir,
        max_upload_bytes,
        model_path,
        model_input_size,
        warmup_image,
        confidence_threshold,
        iou_threshold,
        db_max_connections,
        db_acquire_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PEOPLECOUNT_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

/// Ensures a leading slash and strips trailing ones; an empty prefix maps to `/static`.
fn normalize_url_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/static".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
