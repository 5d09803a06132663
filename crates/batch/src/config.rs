use common::{env_flag, env_or, env_string};
use std::path::PathBuf;

pub const DEFAULT_JPEG_QUALITY: u8 = 98;

/// Output layout: `<base>/<dir prefix><NN>/<file prefix><NNNN><postfix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub base_directory: PathBuf,
    pub directory_prefix: String,
    pub directory_index_digits: usize,
    pub file_prefix: String,
    pub file_postfix: String,
    pub file_index_digits: usize,
    pub restart_file_index_with_new_directory: bool,
    pub jpeg_quality: u8,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            directory_prefix: "batch-".into(),
            directory_index_digits: 2,
            file_prefix: "img-".into(),
            file_postfix: ".jpg".into(),
            file_index_digits: 4,
            restart_file_index_with_new_directory: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_directory: PathBuf::from(env_string("BASE_DIRECTORY", ".")),
            directory_prefix: env_string("DIRECTORY_PREFIX", &defaults.directory_prefix),
            directory_index_digits: env_or("DIRECTORY_INDEX_DIGITS", defaults.directory_index_digits),
            file_prefix: env_string("FILE_PREFIX", &defaults.file_prefix),
            file_postfix: env_string("FILE_POSTFIX", &defaults.file_postfix),
            file_index_digits: env_or("FILE_INDEX_DIGITS", defaults.file_index_digits),
            restart_file_index_with_new_directory: env_flag(
                "RESTART_FILE_INDEX_WITH_NEW_DIRECTORY",
                defaults.restart_file_index_with_new_directory,
            ),
            jpeg_quality: env_or("JPEG_QUALITY", u32::from(defaults.jpeg_quality)).clamp(1, 100) as u8,
        }
    }

    pub fn directory_name(&self, index: u32) -> String {
        format!(
            "{}{:0width$}",
            self.directory_prefix,
            index,
            width = self.directory_index_digits
        )
    }

    pub fn file_name(&self, index: u32) -> String {
        format!(
            "{}{:0width$}{}",
            self.file_prefix,
            index,
            self.file_postfix,
            width = self.file_index_digits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn names_are_zero_padded() {
        let config = BatchConfig::default();
        assert_eq!(config.directory_name(3), "batch-03");
        assert_eq!(config.file_name(12), "img-0012.jpg");
        assert_eq!(config.directory_name(123), "batch-123");
    }

    // SAFETY (all tests): env mutation is serialized through `#[serial]`.

    #[test]
    #[serial]
    fn reads_layout_from_env() {
        unsafe {
            env::set_var("DIRECTORY_PREFIX", "scene-");
            env::set_var("FILE_INDEX_DIGITS", "3");
            env::set_var("RESTART_FILE_INDEX_WITH_NEW_DIRECTORY", "yes");
            env::set_var("JPEG_QUALITY", "250");
        }

        let config = BatchConfig::from_env();
        assert_eq!(config.directory_name(1), "scene-01");
        assert_eq!(config.file_name(7), "img-007.jpg");
        assert!(config.restart_file_index_with_new_directory);
        assert_eq!(config.jpeg_quality, 100);

        unsafe {
            env::remove_var("DIRECTORY_PREFIX");
            env::remove_var("FILE_INDEX_DIGITS");
            env::remove_var("RESTART_FILE_INDEX_WITH_NEW_DIRECTORY");
            env::remove_var("JPEG_QUALITY");
        }
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        assert_eq!(BatchConfig::from_env(), BatchConfig::default());
    }
}
