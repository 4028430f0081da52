use serde::Deserialize;
use std::time::Duration;

/// Process-wide configuration, set once before the client runs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Default forward target used by the demo binary; handlers can always
    /// choose their own target per request.
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            target_url: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Config {
    /// Loads configuration from `WARDEN_CONFIG` (YAML file) if set, with
    /// `WARDEN_LISTEN` (`host:port`) overriding the listen address.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("WARDEN_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("WARDEN_LISTEN") {
            let (host, port) = listen
                .rsplit_once(':')
                .ok_or_else(|| anyhow::anyhow!("WARDEN_LISTEN must be host:port"))?;
            config.host = host.to_string();
            config.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid port in WARDEN_LISTEN: {port}"))?;
        }

        Ok(config)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
