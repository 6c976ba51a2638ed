//! reqwest adapter for the [`Transport`] port.
//!
//! POST carries the form as `multipart/form-data`; GET moves it into the
//! query string.

use std::{error::Error as StdError, io};

use async_trait::async_trait;
use tgbot_core::{
    errors::Error,
    transport::{HttpMethod, OutboundRequest, RawResponse, Transport, TransportError},
    Result,
};

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Per-request timeouts come from [`OutboundRequest::timeout`].
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build(&self, request: &OutboundRequest) -> reqwest::RequestBuilder {
        let builder = match request.method {
            HttpMethod::Get => {
                let query: Vec<(&str, &str)> = request.form.iter().collect();
                self.http.get(&request.url).query(&query)
            }
            HttpMethod::Post => {
                let form = request
                    .form
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name.to_string(), value.to_string())
                    });
                self.http.post(&request.url).multipart(form)
            }
        };
        builder.timeout(request.timeout)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let resp = self.build(request).send().await.map_err(map_error)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_error)?;
        tracing::trace!(status, len = body.len(), "http exchange done");
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// The request URL carries the bot token, so it never reaches the message.
fn map_error(e: reqwest::Error) -> TransportError {
    let e = e.without_url();
    if e.is_timeout() {
        return TransportError::Timeout;
    }
    if is_connection_reset(&e) {
        return TransportError::ConnectionReset;
    }
    TransportError::Other(e.to_string())
}

fn is_connection_reset(e: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        if err.to_string().contains("connection reset by peer") {
            return true;
        }
        source = err.source();
    }
    false
}
