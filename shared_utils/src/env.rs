use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Empty values are treated as missing, so `FOO=` in a `.env` file does not
/// silently produce an empty API key or database URL.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Returns `explicit` when it is set, otherwise falls back to the environment variable `name`.
///
/// Used for settings that may live in a config file but are usually injected
/// by the deployment (e.g. `DATABASE_URL`).
pub fn value_or_env(explicit: Option<&str>, name: &str) -> Result<String, MissingEnvVarError> {
    match explicit {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => get_env_var(name),
    }
}
