//! HTTP client for the control API.

pub mod types;

use reqwest::Url;

use crate::config::DEFAULT_API_PORT;
use crate::error::{Error, Result};
use crate::signal::{AntidelaySeconds, Signal};
use types::{AlarmView, ConfigPatchRequest, ConfigState};

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Client for a daemon on the default local address.
    pub fn new() -> Self {
        Self::with_base_url(format!("http://127.0.0.1:{DEFAULT_API_PORT}"))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> Result<Url> {
        let url = format!("{}/api/v0{path}", self.base_url);
        Url::parse(&url).map_err(|e| Error::Config(format!("invalid API URL {url}: {e}")))
    }

    pub async fn get_alarm(&self) -> Result<AlarmView> {
        let response = self.http.get(self.url("/alarm")?).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn dismiss(&self) -> Result<AlarmView> {
        let response = self.http.post(self.url("/alarm/dismiss")?).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn get_config(&self) -> Result<ConfigState> {
        let response = self.http.get(self.url("/config")?).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn set_antidelay(&self, antidelay: AntidelaySeconds) -> Result<ConfigState> {
        let request = ConfigPatchRequest {
            antidelay_secs: Some(antidelay),
        };
        let response = self
            .http
            .patch(self.url("/config")?)
            .json(&request)
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn get_signals(&self) -> Result<Vec<Signal>> {
        let response = self.http.get(self.url("/signals")?).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn put_signals(&self, signals: &[Signal]) -> Result<Vec<Signal>> {
        let response = self
            .http
            .put(self.url("/signals")?)
            .json(signals)
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }
}
