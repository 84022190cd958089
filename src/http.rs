use crate::config::{parse_collector_url, ShipperConfig};
use crate::error::{ConfigError, SendError};
use crate::sink::{MessageSender, SourceMetadata};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::time::Duration;

pub const X_SUMO_NAME: &str = "X-Sumo-Name";
pub const X_SUMO_CATEGORY: &str = "X-Sumo-Category";
pub const X_SUMO_HOST: &str = "X-Sumo-Host";
pub const X_SUMO_CLIENT: &str = "X-Sumo-Client";

/// HTTP implementation of [`MessageSender`].
///
/// Every batch is one `POST` of the plain-text body to the collector URL.
/// Source metadata travels in `X-Sumo-*` headers. The underlying
/// [`reqwest::Client`] is owned by the sender and released when it drops.
#[derive(Clone)]
pub struct HttpSender {
    client: Client,
    url: Option<Url>,
    client_name: String,
    connection_timeout: Duration,
}

impl HttpSender {
    /// Construct a sender.
    ///
    /// **Parameters**
    /// - `url`: collector endpoint; `None` builds a sender that is never
    ///   ready and never touches the network.
    /// - `connection_timeout`: bound for one attempt, connect included.
    /// - `client_name`: value of the `X-Sumo-Client` header.
    ///
    /// **Returns**
    /// - `Err(ConfigError::InvalidUrl)` for a malformed URL.
    /// - `Err(ConfigError::NotPositive)` for a zero timeout.
    pub fn new(
        url: Option<&str>,
        connection_timeout: Duration,
        client_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if connection_timeout.is_zero() {
            return Err(ConfigError::NotPositive("connection_timeout"));
        }
        let url = url.map(parse_collector_url).transpose()?;
        let client = Client::builder()
            .connect_timeout(connection_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url,
            client_name: client_name.into(),
            connection_timeout,
        })
    }

    pub fn from_config(config: &ShipperConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.url.as_deref(),
            config.connection_timeout,
            config.client_name.clone(),
        )
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    fn map_error(&self, err: reqwest::Error) -> SendError {
        if err.is_timeout() {
            SendError::Timeout(self.connection_timeout)
        } else {
            SendError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl MessageSender for HttpSender {
    fn can_try_send(&self) -> bool {
        self.url.is_some()
    }

    async fn try_send(&self, body: &str, metadata: &SourceMetadata) -> Result<(), SendError> {
        let Some(url) = &self.url else {
            return Err(SendError::NotReady);
        };

        let mut request = self
            .client
            .post(url.clone())
            .timeout(self.connection_timeout)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(X_SUMO_CLIENT, self.client_name.as_str());

        let headers = [
            (X_SUMO_NAME, &metadata.name),
            (X_SUMO_CATEGORY, &metadata.category),
            (X_SUMO_HOST, &metadata.host),
        ];
        for (header, value) in headers {
            if !value.is_empty() {
                request = request.header(header, value.as_str());
            }
        }

        let resp = request
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(SendError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}
