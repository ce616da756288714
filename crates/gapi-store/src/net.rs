use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

const USER_AGENT: &str = concat!("gapi/", env!("CARGO_PKG_VERSION"));
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
pub const KEEP_PROXIES_ENV: &str = "GAPI_KEEP_PROXIES";

const PROXY_KEYS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "NO_PROXY",
    "no_proxy",
];

#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub keep_proxies: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: HTTP_TIMEOUT,
            keep_proxies: false,
        }
    }
}

pub fn http_client(options: HttpOptions) -> Result<Client> {
    let builder = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(options.timeout);
    let builder = if options.keep_proxies {
        builder
    } else {
        builder.no_proxy()
    };
    builder.build().context("failed to build HTTP client")
}

/// Decide whether standard proxy variables should be honoured.
///
/// - `GAPI_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `GAPI_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are kept only when a proxy variable is set.
pub fn keep_proxies<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(KEEP_PROXIES_ENV) {
        Some(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        }
        None => PROXY_KEYS
            .iter()
            .any(|key| lookup(key).is_some_and(|value| !value.trim().is_empty())),
    }
}
