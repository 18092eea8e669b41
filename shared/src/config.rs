use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub struct UpstreamConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub allowed_origins: Vec<String>,
    pub upstream: UpstreamConfig,
    /// Caller-visible latency budget for one lookup.
    pub deadline: Duration,
    /// `None` disables the scheduled token warmer.
    pub warm_interval: Option<Duration>,
    pub cache_max_entries: u64,
    pub cachable_statuses: Vec<u16>,
    pub cachable_codes: Vec<String>,
}

impl Config {
    const DEFAULT_HOST: &str = "0.0.0.0";
    const DEFAULT_HTTP_PORT: u16 = 8080;
    const DEFAULT_UPSTREAM_URL: &str = "http://localhost:9000";
    const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 8_000;
    const DEFAULT_DEADLINE_MS: u64 = 10_000;
    const DEFAULT_WARM_INTERVAL_SECS: u64 = 60;
    const DEFAULT_CACHE_MAX_ENTRIES: u64 = 100_000;
    const DEFAULT_CACHABLE_STATUSES: &str = "400,404,422";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let upstream_url = lookup("ICP_UPSTREAM_URL").unwrap_or_else(|| {
            warn!(
                "ICP_UPSTREAM_URL not set, using {}",
                Self::DEFAULT_UPSTREAM_URL
            );
            Self::DEFAULT_UPSTREAM_URL.to_string()
        });

        let warm_secs = parse_or(
            &lookup,
            "ICP_WARM_INTERVAL_SECS",
            Self::DEFAULT_WARM_INTERVAL_SECS,
        );

        Self {
            host: lookup("ICP_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string()),
            http_port: parse_or(&lookup, "ICP_HTTP_PORT", Self::DEFAULT_HTTP_PORT),
            allowed_origins: split_list(
                &lookup("ICP_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            ),
            upstream: UpstreamConfig {
                base_url: upstream_url.trim_end_matches('/').to_string(),
                client_id: lookup("ICP_UPSTREAM_CLIENT_ID").unwrap_or_default(),
                client_secret: lookup("ICP_UPSTREAM_CLIENT_SECRET").unwrap_or_else(|| {
                    warn!("ICP_UPSTREAM_CLIENT_SECRET not set, using an empty secret");
                    String::new()
                }),
                timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "ICP_UPSTREAM_TIMEOUT_MS",
                    Self::DEFAULT_UPSTREAM_TIMEOUT_MS,
                )),
            },
            deadline: Duration::from_millis(parse_or(
                &lookup,
                "ICP_DEADLINE_MS",
                Self::DEFAULT_DEADLINE_MS,
            )),
            warm_interval: (warm_secs > 0).then(|| Duration::from_secs(warm_secs)),
            cache_max_entries: parse_or(
                &lookup,
                "ICP_CACHE_MAX_ENTRIES",
                Self::DEFAULT_CACHE_MAX_ENTRIES,
            ),
            cachable_statuses: split_list(
                &lookup("ICP_CACHABLE_STATUSES")
                    .unwrap_or_else(|| Self::DEFAULT_CACHABLE_STATUSES.to_string()),
            )
            .iter()
            .filter_map(|s| match s.parse::<u16>() {
                Ok(status) => Some(status),
                Err(_) => {
                    warn!("Ignoring invalid status '{}' in ICP_CACHABLE_STATUSES", s);
                    None
                }
            })
            .collect(),
            cachable_codes: split_list(&lookup("ICP_CACHABLE_CODES").unwrap_or_default()),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
            default
        }),
        None => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
