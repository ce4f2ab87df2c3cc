use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;

/// Load `.env` from the working directory, falling back to the crate-local one
/// (containers usually run the binary from a different CWD).
pub fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

/// Server-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self { port })
    }
}

/// `SEED_DEFAULT_ROLES`, read once by `create_app`.
pub fn seed_default_roles_enabled() -> bool {
    flag_enabled(std::env::var("SEED_DEFAULT_ROLES").ok().as_deref())
}

/// Unset means on; only explicit false-y values disable a flag.
fn flag_enabled(value: Option<&str>) -> bool {
    match value {
        Some(value) => !matches!(value.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_on_and_accept_false_spellings() {
        assert!(flag_enabled(None));
        assert!(flag_enabled(Some("yes")));
        assert!(!flag_enabled(Some(" OFF ")));
        assert!(!flag_enabled(Some("0")));
    }
}
