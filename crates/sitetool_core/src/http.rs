use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::config::SiteConfig;

/// Status, final URL after redirects, and (for GET) the decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    pub body: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP used by the discography builder and the link verifier.
pub trait WebClient {
    fn head(&mut self, url: &str) -> Result<HttpResponse>;
    fn get(&mut self, url: &str) -> Result<HttpResponse>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub head_timeout_ms: u64,
    pub get_timeout_ms: u64,
}

impl HttpClientConfig {
    pub fn from_site_config(config: &SiteConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            head_timeout_ms: config.head_timeout_ms(),
            get_timeout_ms: config.get_timeout_ms(),
        }
    }
}

/// One blocking client per command invocation; redirects are followed.
pub struct SiteHttpClient {
    client: Client,
    config: HttpClientConfig,
    request_count: usize,
}

impl SiteHttpClient {
    pub fn from_site_config(config: &SiteConfig) -> Result<Self> {
        Self::new(HttpClientConfig::from_site_config(config))
    }

    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build site HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }
}

impl WebClient for SiteHttpClient {
    fn head(&mut self, url: &str) -> Result<HttpResponse> {
        self.request_count = self.request_count.saturating_add(1);
        let response = self
            .client
            .head(url)
            .header("User-Agent", self.config.user_agent.clone())
            .timeout(Duration::from_millis(self.config.head_timeout_ms))
            .send()
            .with_context(|| format!("HEAD {url} failed"))?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
            body: None,
        })
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse> {
        self.request_count = self.request_count.saturating_add(1);
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone())
            .header("Accept", "text/html, text/plain;q=0.9,*/*;q=0.1")
            .timeout(Duration::from_millis(self.config.get_timeout_ms))
            .send()
            .with_context(|| format!("GET {url} failed"))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .with_context(|| format!("failed to read response body from {url}"))?;
        Ok(HttpResponse {
            status,
            final_url,
            body: Some(body),
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use anyhow::{Result, bail};

    use super::{HttpResponse, WebClient};

    /// Canned responses keyed by URL; unknown URLs fail like an unreachable host.
    #[derive(Default)]
    pub struct MockWebClient {
        heads: BTreeMap<String, HttpResponse>,
        gets: BTreeMap<String, HttpResponse>,
        pub requests: Vec<String>,
    }

    impl MockWebClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_head(mut self, url: &str, status: u16, final_url: &str) -> Self {
            self.heads.insert(
                url.to_string(),
                HttpResponse {
                    status,
                    final_url: final_url.to_string(),
                    body: None,
                },
            );
            self
        }

        pub fn with_get(mut self, url: &str, status: u16, final_url: &str, body: &str) -> Self {
            self.gets.insert(
                url.to_string(),
                HttpResponse {
                    status,
                    final_url: final_url.to_string(),
                    body: Some(body.to_string()),
                },
            );
            self
        }
    }

    impl WebClient for MockWebClient {
        fn head(&mut self, url: &str) -> Result<HttpResponse> {
            self.requests.push(format!("HEAD {url}"));
            match self.heads.get(url) {
                Some(response) => Ok(response.clone()),
                None => bail!("connection refused: {url}"),
            }
        }

        fn get(&mut self, url: &str) -> Result<HttpResponse> {
            self.requests.push(format!("GET {url}"));
            match self.gets.get(url) {
                Some(response) => Ok(response.clone()),
                None => bail!("connection refused: {url}"),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.len()
        }
    }
}
