use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{Config, Environment, File};
use locintel::agent::DEFAULT_MAX_STEPS;
use locintel::overlay::{OverlayConfig, Viewport};
use locintel::providers::configs::{
    OpenAiProviderConfig, OPEN_AI_DEFAULT_HOST, OPEN_AI_DEFAULT_MODEL,
};
use locintel::systems::geocode::{
    NominatimConfig, DEFAULT_LIMIT, DEFAULT_USER_AGENT, NOMINATIM_DEFAULT_HOST,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct GatewaySettings {
    pub host: String,
    pub user_agent: String,
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct MapSettings {
    #[serde(default = "default_center")]
    pub center: [f64; 2],
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    pub max_steps: usize,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub gateway: GatewaySettings,
    pub map: MapSettings,
    pub agent: AgentSettings,
}

impl Settings {
    /// Load settings from `path`, or from the default config file when it exists
    pub fn new(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_and_validate(Some(path), true),
            None => Self::load_and_validate(default_config_file().as_deref(), false),
        }
    }

    fn load_and_validate(file: Option<&Path>, required: bool) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Provider defaults
            .set_default("provider.host", OPEN_AI_DEFAULT_HOST)?
            .set_default("provider.model", OPEN_AI_DEFAULT_MODEL)?
            // Gateway defaults
            .set_default("gateway.host", NOMINATIM_DEFAULT_HOST)?
            .set_default("gateway.user_agent", DEFAULT_USER_AGENT)?
            .set_default("gateway.limit", DEFAULT_LIMIT as i64)?
            // Map defaults
            .set_default("map.zoom", Viewport::default().zoom)?
            .set_default("map.min_zoom", OverlayConfig::default().min_zoom)?
            .set_default("map.max_zoom", OverlayConfig::default().max_zoom)?
            .set_default("agent.max_steps", DEFAULT_MAX_STEPS as i64)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(required));
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `limit`" with an optional " for key `gateway`"
                    let mut names = error_str.split('`').skip(1).step_by(2);
                    let field = names.next().unwrap_or_default();
                    let env_var = match names.next() {
                        Some(key) => to_env_var(&format!("{}.{}", key, field)),
                        None => to_env_var(field),
                    };
                    return Err(ConfigError::MissingEnvVar { env_var });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        if settings
            .provider
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
        {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }

        Ok(settings)
    }

    pub fn provider_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.provider.host.clone(),
            api_key: self.provider.api_key.clone().unwrap_or_default(),
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
        }
    }

    pub fn gateway_config(&self) -> NominatimConfig {
        NominatimConfig {
            host: self.gateway.host.clone(),
            user_agent: self.gateway.user_agent.clone(),
            limit: self.gateway.limit,
        }
    }

    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            initial: Viewport {
                center: self.map.center,
                zoom: self.map.zoom,
            },
            min_zoom: self.map.min_zoom,
            max_zoom: self.map.max_zoom,
            ..OverlayConfig::default()
        }
    }
}

/// `<config_dir>/locintel/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("locintel").join("config.toml"))
}

fn default_center() -> [f64; 2] {
    Viewport::default().center
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("LOCINTEL_") {
                env::remove_var(&key);
            }
        }
    }

    fn load() -> Result<Settings, ConfigError> {
        Settings::load_and_validate(None, false)
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("LOCINTEL_PROVIDER__API_KEY", "test-key");

        let settings = load().unwrap();

        assert_eq!(settings.provider.host, "https://api.openai.com");
        assert_eq!(settings.provider.api_key.as_deref(), Some("test-key"));
        assert_eq!(settings.provider.model, "gpt-5-mini");
        assert_eq!(settings.provider.temperature, None);
        assert_eq!(settings.gateway.host, "https://nominatim.openstreetmap.org");
        assert_eq!(settings.gateway.limit, 5);
        assert_eq!(settings.map.center, [77.2088, 28.6139]);
        assert_eq!(settings.map.zoom, 12.0);
        assert_eq!(settings.map.max_zoom, 16.0);
        assert_eq!(settings.agent.max_steps, 5);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();

        match load() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "LOCINTEL_PROVIDER__API_KEY")
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("LOCINTEL_PROVIDER__API_KEY", "test-key");
        env::set_var("LOCINTEL_PROVIDER__HOST", "https://custom.openai.com");
        env::set_var("LOCINTEL_PROVIDER__TEMPERATURE", "0.8");
        env::set_var("LOCINTEL_GATEWAY__LIMIT", "10");
        env::set_var("LOCINTEL_AGENT__MAX_STEPS", "3");

        let settings = load().unwrap();

        assert_eq!(settings.provider.host, "https://custom.openai.com");
        assert_eq!(settings.provider.temperature, Some(0.8));
        assert_eq!(settings.gateway.limit, 10);
        assert_eq!(settings.agent.max_steps, 3);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_config_file_then_env() {
        clean_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[provider]
api_key = "file-key"
model = "gpt-5"

[gateway]
user_agent = "locintel-tests"

[map]
center = [2.3522, 48.8566]
zoom = 11.0
"#
        )
        .unwrap();
        env::set_var("LOCINTEL_PROVIDER__MODEL", "gpt-5-nano");

        let settings = Settings::new(Some(file.path())).unwrap();

        assert_eq!(settings.provider.api_key.as_deref(), Some("file-key"));
        // The environment wins over the file
        assert_eq!(settings.provider.model, "gpt-5-nano");
        assert_eq!(settings.gateway.user_agent, "locintel-tests");

        let overlay = settings.overlay_config();
        assert_eq!(overlay.initial.center, [2.3522, 48.8566]);
        assert_eq!(overlay.initial.zoom, 11.0);
        assert_eq!(overlay.min_zoom, 1.0);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_explicit_config_file_must_exist() {
        clean_env();
        env::set_var("LOCINTEL_PROVIDER__API_KEY", "test-key");
        let dir = tempfile::tempdir().unwrap();

        let result = Settings::new(Some(&dir.path().join("missing.toml")));

        assert!(matches!(result, Err(ConfigError::Other(_))));
        clean_env();
    }

    #[test]
    #[serial]
    fn test_settings_convert_to_library_configs() {
        clean_env();
        env::set_var("LOCINTEL_PROVIDER__API_KEY", "test-key");
        env::set_var("LOCINTEL_PROVIDER__MAX_TOKENS", "2000");

        let settings = load().unwrap();
        let provider = settings.provider_config();
        let gateway = settings.gateway_config();

        assert_eq!(provider.api_key, "test-key");
        assert_eq!(provider.max_tokens, Some(2000));
        assert_eq!(gateway.limit, 5);
        assert!(gateway.user_agent.starts_with("locintel/"));

        clean_env();
    }
}
