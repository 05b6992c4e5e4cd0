use thiserror::Error;

pub const ENV_PREFIX: &str = "LOCINTEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting, set the {env_var} environment variable or add it to the config file")]
    MissingEnvVar { env_var: String },

    #[error("Invalid configuration: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted settings path, such as
/// `provider.api_key` to `LOCINTEL_PROVIDER__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    let key = field_path
        .split('.')
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("__");
    format!("{}_{}", ENV_PREFIX, key)
}
