use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::error::VoteKitError;

/// Transport settings for [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries on top of the first attempt for transient failures.
    pub max_retries: u32,
    /// Allow plain `http://` endpoints (local development and tests only).
    pub allow_insecure_http: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3, // total attempts = 4
            allow_insecure_http: false,
        }
    }
}

/// A simple wrapper on an HTTP client for making requests. Sets sensible defaults such as timeouts,
/// user-agent & ensuring HTTPS, and applies retry middleware for transient failures.
#[derive(Debug, Clone)]
pub struct Request {
    client: reqwest::Client,
    options: RequestOptions,
}

impl Request {
    /// Initializes a new `Request` instance.
    pub(crate) fn new(options: RequestOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }

    /// Ensures `url` uses a scheme the options allow.
    pub(crate) fn check_url(&self, url: &str) -> Result<(), VoteKitError> {
        if url.starts_with("https://")
            || (self.options.allow_insecure_http && url.starts_with("http://"))
        {
            return Ok(());
        }
        Err(VoteKitError::InvalidInput {
            attribute: "url".to_string(),
            reason: format!("{url} is not an https endpoint"),
        })
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.options.timeout)
            .header(
                "User-Agent",
                format!("votekit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Handles sending a request built by `req`/`post` with retries for transient failures.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, VoteKitError> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder)
                .await
                .map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.options.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                RequestHandleError::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(RequestHandleError::is_retryable)
        .notify(|err: &RequestHandleError, delay: Duration| {
            log::debug!("retrying {} in {delay:?}: {}", err.url, err.error);
        })
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug)]
struct RequestHandleError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl RequestHandleError {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<RequestHandleError> for VoteKitError {
    fn from(value: RequestHandleError) -> Self {
        Self::NetworkError {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute_request_builder(
    request_builder: RequestBuilder,
) -> Result<Response, RequestHandleError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        RequestHandleError::permanent(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestHandleError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(RequestHandleError::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }

            Err(RequestHandleError::permanent(
                url,
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}
