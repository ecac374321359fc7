//! WHIP signaling: one HTTP POST carries the SDP offer, the response carries
//! the answer and a resource URL used to end the session.

use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::TransportError;
use crate::{TransportResult, SIGNALING_TIMEOUT};

const SDP_CONTENT_TYPE: &str = "application/sdp";

/// HTTP client for one WHIP endpoint.
#[derive(Clone)]
pub struct WhipClient {
    http: reqwest::Client,
    endpoint: Url,
    auth_token: Option<SecretString>,
}

/// Result of a successful offer.
#[derive(Debug, Clone)]
pub struct WhipSession {
    pub answer_sdp: String,

    /// Session resource from the `Location` header, resolved against the
    /// endpoint.
    pub resource_url: Option<Url>,
}

impl WhipClient {
    pub fn new(endpoint: &str, auth_token: Option<SecretString>) -> TransportResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::NotConfigured(format!("signaling server: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(SIGNALING_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            auth_token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST the offer and return the answer.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn offer(&self, offer_sdp: &str) -> TransportResult<WhipSession> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .header(ACCEPT, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_owned());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Signaling(format!(
                "offer rejected with {}: {}",
                status,
                body.trim()
            )));
        }

        let resource_url = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| self.endpoint.join(location).ok());

        let answer_sdp = response.text().await?;
        if answer_sdp.trim().is_empty() {
            return Err(TransportError::Signaling("empty SDP answer".to_string()));
        }

        debug!(
            %status,
            resource = ?resource_url.as_ref().map(Url::as_str),
            "Received SDP answer"
        );
        Ok(WhipSession {
            answer_sdp,
            resource_url,
        })
    }

    /// DELETE the session resource. A resource the server no longer knows
    /// counts as terminated.
    #[instrument(skip_all, fields(resource = %resource))]
    pub async fn terminate(&self, resource: &Url) -> TransportResult<()> {
        let mut request = self.http.delete(resource.clone());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let status = request.send().await?.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            info!("WHIP session terminated");
            Ok(())
        } else {
            Err(TransportError::Signaling(format!(
                "session delete returned {}",
                status
            )))
        }
    }
}
