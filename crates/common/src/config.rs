use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        match env_string("ENVIRONMENT", "development")
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

pub fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse `key` into `T`, falling back to `default` when unset or malformed.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring malformed {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Boolean flag accepting `true/false`, `1/0`, `yes/no` in any case.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_lowercase()) {
        Ok(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

/// Split a `;`-separated variable into trimmed, non-empty items.
pub fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // SAFETY (all tests): env mutation is serialized through `#[serial]`.

    #[test]
    #[serial]
    fn environment_defaults_to_development() {
        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    #[serial]
    fn environment_accepts_prod_alias() {
        unsafe { env::set_var("ENVIRONMENT", "PROD") };
        assert_eq!(Environment::from_env(), Environment::Production);
        unsafe { env::remove_var("ENVIRONMENT") };
    }

    #[test]
    #[serial]
    fn env_or_falls_back_on_garbage() {
        unsafe { env::set_var("COMMON_TEST_NUMBER", "twelve") };
        assert_eq!(env_or("COMMON_TEST_NUMBER", 7u32), 7);

        unsafe { env::set_var("COMMON_TEST_NUMBER", " 12 ") };
        assert_eq!(env_or("COMMON_TEST_NUMBER", 7u32), 12);
        unsafe { env::remove_var("COMMON_TEST_NUMBER") };
    }

    #[test]
    #[serial]
    fn env_flag_is_case_insensitive() {
        unsafe { env::set_var("COMMON_TEST_FLAG", "True") };
        assert!(env_flag("COMMON_TEST_FLAG", false));

        unsafe { env::set_var("COMMON_TEST_FLAG", "OFF") };
        assert!(!env_flag("COMMON_TEST_FLAG", true));

        unsafe { env::set_var("COMMON_TEST_FLAG", "maybe") };
        assert!(env_flag("COMMON_TEST_FLAG", true));
        unsafe { env::remove_var("COMMON_TEST_FLAG") };
    }

    #[test]
    #[serial]
    fn env_list_skips_blank_items() {
        unsafe { env::set_var("COMMON_TEST_LIST", "Focus, Auto; ;Zoom, Absolute;") };
        assert_eq!(
            env_list("COMMON_TEST_LIST"),
            vec!["Focus, Auto".to_string(), "Zoom, Absolute".to_string()]
        );
        unsafe { env::remove_var("COMMON_TEST_LIST") };
        assert!(env_list("COMMON_TEST_LIST").is_empty());
    }
}
