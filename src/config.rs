use serde_derive::Deserialize;

pub const DEFAULT_FRESHNESS_WINDOW_MS: i64 = 60_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub doorbell: DoorbellConfig,
    pub relay: Option<RelayConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

/// Remote doorbell service the relay talks to.
#[derive(Deserialize, Clone)]
pub struct DoorbellConfig {
    pub server_url: String,
    pub auth_token: String,
    pub doorbell_id: String,
    pub request_timeout_seconds: Option<u64>,
}

// Hand-written so the token never ends up in logs.
impl std::fmt::Debug for DoorbellConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoorbellConfig")
            .field("server_url", &self.server_url)
            .field("auth_token", &"<redacted>")
            .field("doorbell_id", &self.doorbell_id)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RelayConfig {
    pub device_name: Option<String>,
    pub freshness_window_ms: Option<i64>,
    /// Byte limit for `visitor_description`, cut on a char boundary.
    pub max_description_len: Option<usize>,
}

impl AppConfig {
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::de::from_str(contents)
    }

    pub fn relay(&self) -> RelayConfig {
        self.relay.clone().unwrap_or_default()
    }
}

impl RelayConfig {
    pub fn device_name(&self) -> String {
        self.device_name.clone().unwrap_or("pebble".to_string())
    }

    pub fn freshness_window_ms(&self) -> i64 {
        self.freshness_window_ms.unwrap_or(DEFAULT_FRESHNESS_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config() {
        let config_str = r#"
            [mqtt]
            host = "localhost"
            port = 1883
            username = "user"
            password = "pass"

            [doorbell]
            server_url = "http://doorbell.example.com"
            auth_token = "secret-token"
            doorbell_id = "65432353"

            [relay]
            device_name = "Kitchen Watch"
            freshness_window_ms = 30000
        "#;
        let config = AppConfig::from_toml(config_str).unwrap();
        assert!(config.mqtt.host == "localhost");
        assert_eq!(config.doorbell.doorbell_id, "65432353");
        assert_eq!(config.doorbell.request_timeout_seconds, None);
        assert_eq!(config.relay().freshness_window_ms(), 30000);
        assert_eq!(config.relay().device_name(), "Kitchen Watch");
        assert_eq!(config.relay().max_description_len, None);
    }

    #[test]
    fn test_relay_defaults() {
        let config_str = r#"
            [mqtt]
            host = "localhost"

            [doorbell]
            server_url = "http://doorbell.example.com"
            auth_token = "secret-token"
            doorbell_id = "1"
        "#;
        let config = AppConfig::from_toml(config_str).unwrap();
        assert!(config.relay.is_none());
        assert_eq!(config.relay().freshness_window_ms(), DEFAULT_FRESHNESS_WINDOW_MS);
        assert_eq!(config.relay().device_name(), "pebble");
    }

    #[test]
    fn test_missing_doorbell_section() {
        let config_str = r#"
            [mqtt]
            host = "localhost"
        "#;
        assert!(AppConfig::from_toml(config_str).is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = DoorbellConfig {
            server_url: "http://doorbell.example.com".to_string(),
            auth_token: "secret-token".to_string(),
            doorbell_id: "1".to_string(),
            request_timeout_seconds: Some(3),
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("doorbell.example.com"));
    }
}
