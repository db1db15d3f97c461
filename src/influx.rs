//! InfluxDB v2 write API client.
//!
//! Points are rendered as line protocol with millisecond timestamps:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ms
//! ```

use axum::async_trait;
use reqwest::{header, StatusCode, Url};

use crate::config::InfluxCfg;
use crate::domain::{FieldValue, Point};
use crate::sink::{PointSink, SinkError};

pub struct InfluxSink {
    client: reqwest::Client,
    write_url: Url,
    auth: String,
}

impl InfluxSink {
    pub fn new(cfg: &InfluxCfg) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            write_url: write_url(cfg)?,
            auth: format!("Token {}", cfg.token),
        })
    }
}

/// `{url}/api/v2/write?org=..&bucket=..&precision=ms`
pub fn write_url(cfg: &InfluxCfg) -> anyhow::Result<Url> {
    let mut url = Url::parse(&cfg.url)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("influx.url cannot be a base: {}", cfg.url))?
        .pop_if_empty()
        .extend(["api", "v2", "write"]);
    url.query_pairs_mut()
        .append_pair("org", &cfg.org)
        .append_pair("bucket", &cfg.bucket)
        .append_pair("precision", "ms");
    Ok(url)
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, points: Vec<Point>) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = to_line_protocol(&points);

        let resp = self
            .client
            .post(self.write_url.clone())
            .header(header::AUTHORIZATION, &self.auth)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    SinkError::Fatal(e.to_string())
                } else {
                    SinkError::Transient(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = resp.text().await.unwrap_or_default();
        let msg = format!("influx responded {status}: {detail}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(SinkError::Transient(msg))
        } else {
            Err(SinkError::Fatal(msg))
        }
    }
}

/// Renders points as newline separated line protocol, preserving order.
///
/// Tags with an empty key or value and fields with an empty key are left
/// out; a point left without fields is dropped.
pub fn to_line_protocol(points: &[Point]) -> String {
    points
        .iter()
        .filter_map(point_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn point_line(point: &Point) -> Option<String> {
    let fields: Vec<String> = point
        .fields
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| format!("{}={}", escape_key(key), field_to_line_protocol(value)))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(point.measurement);
    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&point.timestamp_ms.to_string());
    Some(line)
}

fn field_to_line_protocol(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{v}"),
        FieldValue::String(v) => {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        }
        FieldValue::Boolean(v) => v.to_string(),
    }
}

fn escape_whitespace(s: String) -> String {
    s.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn escape_measurement(s: &str) -> String {
    escape_whitespace(s.replace(',', "\\,").replace(' ', "\\ "))
}

/// Tag keys, tag values and field keys share escaping rules.
fn escape_key(s: &str) -> String {
    escape_whitespace(
        s.replace(',', "\\,")
            .replace('=', "\\=")
            .replace(' ', "\\ "),
    )
}
