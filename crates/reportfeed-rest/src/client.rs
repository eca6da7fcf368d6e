//! HTTP client for the hosted REST and auth endpoints.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use reportfeed_core::error::{Error, InvalidInputError, ProtocolError, StoreError};
use reportfeed_core::{Result, StoreUrl};

use crate::endpoints::ErrorBody;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const APIKEY: &str = "apikey";
const PREFER: &str = "prefer";

fn transport(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Store(StoreError::Timeout)
    } else if err.is_decode() {
        Error::Store(StoreError::Malformed {
            message: err.to_string(),
        })
    } else {
        Error::Store(StoreError::Transport {
            message: err.to_string(),
        })
    }
}

/// The protocol error inside a rejected request, if that is what `err` is.
pub(crate) fn rejection(err: &Error) -> Option<&ProtocolError> {
    match err {
        Error::Store(StoreError::Rejected(p)) => Some(p),
        _ => None,
    }
}

/// HTTP client for one hosted project.
///
/// Every request carries the project's API key. Requests made without a
/// user token are authorized with the API key itself.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    url: StoreUrl,
    api_key: String,
}

impl RestClient {
    /// Create a new client for the given project URL and API key.
    pub fn new(url: StoreUrl, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reportfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            url,
            api_key: api_key.into(),
        })
    }

    /// Returns the project URL.
    pub fn url(&self) -> &StoreUrl {
        &self.url
    }

    /// Returns the project API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn headers(&self, token: Option<&str>) -> Result<HeaderMap> {
        let invalid = |what: &str| {
            Error::InvalidInput(InvalidInputError::Other {
                message: format!("{what} contains characters not allowed in a header"),
            })
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            APIKEY,
            HeaderValue::from_str(&self.api_key).map_err(|_| invalid("API key"))?,
        );
        let bearer = format!("Bearer {}", token.unwrap_or(&self.api_key));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|_| invalid("access token"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// POST to an auth endpoint.
    #[instrument(skip(self, body, token), fields(url = %self.url))]
    pub async fn auth_post<B, R>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
        token: Option<&str>,
    ) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self.url.auth_url(path);
        debug!(path, "Auth request");

        let response = self
            .client
            .post(&url)
            .query(query)
            .headers(self.headers(token)?)
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        self.handle_response(response).await
    }

    /// POST to an auth endpoint that answers with no content.
    #[instrument(skip(self, token), fields(url = %self.url))]
    pub async fn auth_post_no_response(&self, path: &str, token: &str) -> Result<()> {
        let url = self.url.auth_url(path);
        debug!(path, "Auth request (no response)");

        let response = self
            .client
            .post(&url)
            .headers(self.headers(Some(token))?)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Store(StoreError::Rejected(
                self.parse_error_response(response).await,
            )))
        }
    }

    /// GET an auth endpoint.
    #[instrument(skip(self, token), fields(url = %self.url))]
    pub async fn auth_get<R: DeserializeOwned>(&self, path: &str, token: &str) -> Result<R> {
        let url = self.url.auth_url(path);
        debug!(path, "Auth query");

        let response = self
            .client
            .get(&url)
            .headers(self.headers(Some(token))?)
            .send()
            .await
            .map_err(transport)?;

        self.handle_response(response).await
    }

    /// PUT to an auth endpoint.
    #[instrument(skip(self, body, token), fields(url = %self.url))]
    pub async fn auth_put<B, R>(&self, path: &str, body: &B, token: &str) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self.url.auth_url(path);
        debug!(path, "Auth update");

        let response = self
            .client
            .put(&url)
            .headers(self.headers(Some(token))?)
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Read rows of `table`.
    #[instrument(skip(self, token), fields(url = %self.url))]
    pub async fn select(
        &self,
        table: &str,
        params: &[(String, String)],
        token: Option<&str>,
    ) -> Result<Vec<Value>> {
        let url = self.url.rest_url(table);
        debug!(table, "Selecting rows");
        trace!(?params, "query parameters");

        let response = self
            .client
            .get(&url)
            .query(params)
            .headers(self.headers(token)?)
            .send()
            .await
            .map_err(transport)?;

        self.handle_response(response).await
    }

    /// Insert one row into `table` and return the stored representation.
    #[instrument(skip(self, body, token), fields(url = %self.url))]
    pub async fn insert(&self, table: &str, body: &Value, token: Option<&str>) -> Result<Vec<Value>> {
        let url = self.url.rest_url(table);
        debug!(table, "Inserting row");

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .header(PREFER, "return=representation")
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        self.handle_response(response).await
    }

    /// Patch the rows of `table` matching `params`.
    #[instrument(skip(self, body, token), fields(url = %self.url))]
    pub async fn update(
        &self,
        table: &str,
        params: &[(String, String)],
        body: &Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>> {
        let url = self.url.rest_url(table);
        debug!(table, "Updating rows");
        trace!(?params, "filter parameters");

        let response = self
            .client
            .patch(&url)
            .query(params)
            .headers(self.headers(token)?)
            .header(PREFER, "return=representation")
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        self.handle_response(response).await
    }

    /// Handle a response, parsing the body or the error.
    async fn handle_response<R: DeserializeOwned>(&self, response: reqwest::Response) -> Result<R> {
        let status = response.status();
        trace!(status = %status, "Response");

        if status.is_success() {
            response.json::<R>().await.map_err(transport)
        } else {
            Err(Error::Store(StoreError::Rejected(
                self.parse_error_response(response).await,
            )))
        }
    }

    /// Parse an error response.
    async fn parse_error_response(&self, response: reqwest::Response) -> ProtocolError {
        let status = response.status().as_u16();

        match response.json::<ErrorBody>().await {
            Ok(body) => ProtocolError::new(status, body.code(), body.message()),
            Err(_) => ProtocolError::new(status, None, None),
        }
    }
}
