use serde::Deserialize;
use std::env;

/// Flat variable names understood in addition to the `STATION__` namespace.
const FLAT_ENV: [(&str, &str); 6] = [
    ("HOST", "http.host"),
    ("PORT", "http.port"),
    ("INFLUX_URL", "influx.url"),
    ("INFLUX_TOKEN", "influx.token"),
    ("INFLUX_ORG", "influx.org"),
    ("INFLUX_BUCKET", "influx.bucket"),
];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StationCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub influx: InfluxCfg,
    #[serde(default)]
    pub ingest: IngestCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HttpCfg {
    /// IP address or hostname, resolved when the listener binds.
    pub host: String,
    pub port: u16,
}
impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}
impl HttpCfg {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn bind(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct InfluxCfg {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}
impl Default for InfluxCfg {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".into(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
        }
    }
}

impl std::fmt::Debug for InfluxCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxCfg")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct IngestCfg {
    pub max_payload_bytes: usize,
    /// How long shutdown waits for in-flight sink writes.
    pub shutdown_drain_ms: u64,
}
impl Default for IngestCfg {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            shutdown_drain_ms: 10_000,
        }
    }
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl StationCfg {
    pub fn load(path: Option<String>, cli: &CliOverrides) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path, cli, |key| env::var(key).ok())?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = reqwest::Url::parse(&self.influx.url)
            .map_err(|e| anyhow::anyhow!("influx.url {:?} is invalid: {e}", self.influx.url))?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "influx.url must be http or https"
        );
        anyhow::ensure!(!self.http.host.is_empty(), "http.host cannot be empty");
        anyhow::ensure!(!self.influx.org.is_empty(), "influx.org cannot be empty");
        anyhow::ensure!(!self.influx.bucket.is_empty(), "influx.bucket cannot be empty");
        Ok(())
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(
    path: Option<String>,
    cli: &CliOverrides,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder()
        .add_source(File::with_name("station-gateway").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(&path));
    }
    builder = builder.add_source(Environment::with_prefix("STATION").separator("__"));
    for (var, key) in FLAT_ENV {
        builder = builder.set_override_option(key, lookup(var).filter(|v| !v.is_empty()))?;
    }
    builder = builder
        .set_override_option("http.host", cli.host.clone())?
        .set_override_option("http.port", cli.port.map(i64::from))?;
    Ok(builder.build()?)
}
