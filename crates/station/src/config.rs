use batch::BatchConfig;
use common::{Environment, env_list, env_string};
use session::PluginSettings;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    /// Plugin kinds to load, in order.
    pub plugins: Vec<String>,
    pub ffmpeg_output_dir: PathBuf,
}

impl StationConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            otel_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|endpoint| !endpoint.trim().is_empty()),
            plugins: env_list("PLUGINS"),
            ffmpeg_output_dir: PathBuf::from(env_string("FFMPEG_OUTPUT_DIR", ".")),
        })
    }

    /// Settings for each requested plugin. The file pattern follows the
    /// batch naming so encoders pick up exactly the captured frames.
    pub fn plugin_settings(&self, batch: &BatchConfig) -> Vec<PluginSettings> {
        self.plugins
            .iter()
            .map(|kind| {
                PluginSettings::new(kind.as_str())
                    .with_option("output", self.ffmpeg_output_dir.to_string_lossy())
                    .with_option(
                        "pattern",
                        format!("{}*{}", batch.file_prefix, batch.file_postfix),
                    )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // SAFETY (all tests): env mutation is serialized through `#[serial]`.

    #[test]
    #[serial]
    fn empty_endpoint_disables_telemetry() {
        unsafe { env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "  ") };
        let config = StationConfig::from_env().unwrap();
        assert!(config.otel_endpoint.is_none());
        unsafe { env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
    }

    #[test]
    #[serial]
    fn plugins_get_output_and_pattern() {
        unsafe {
            env::set_var("PLUGINS", "ffmpeg");
            env::set_var("FFMPEG_OUTPUT_DIR", "/srv/anim");
        }

        let config = StationConfig::from_env().unwrap();
        let settings = config.plugin_settings(&BatchConfig::default());
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].kind, "ffmpeg");
        assert_eq!(settings[0].option("output"), Some("/srv/anim"));
        assert_eq!(settings[0].option("pattern"), Some("img-*.jpg"));

        unsafe {
            env::remove_var("PLUGINS");
            env::remove_var("FFMPEG_OUTPUT_DIR");
        }
    }

    #[test]
    #[serial]
    fn no_plugins_by_default() {
        let config = StationConfig::from_env().unwrap();
        assert!(config.plugins.is_empty());
    }
}
