//! Request executor: builds one Bot API call and drives it to a final outcome.
//!
//! At most one call is in flight per client. The exchange lock is held across
//! the whole retry loop, waits included.

use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{methods, ApiResponse},
    classify::{classify, Outcome, Reply, RetryPolicy, WaitReason},
    errors::Error,
    transport::{FormFields, HttpMethod, OutboundRequest, Transport},
    Result,
};

const MALFORMED_BODY_PREVIEW: usize = 200;

/// Connection settings for [`ApiClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub method: HttpMethod,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

/// State guarded by the exchange lock.
#[derive(Debug, Default)]
struct Exchange {
    request: Option<OutboundRequest>,
    last_status: Option<u16>,
    attempts: u64,
}

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cfg: ClientConfig,
    cancel: CancellationToken,
    exchange: tokio::sync::Mutex<Exchange>,
    last_response: Mutex<Option<ApiResponse>>,
    sent_messages: AtomicI64,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, cfg: ClientConfig) -> Self {
        Self {
            transport,
            cfg,
            cancel: CancellationToken::new(),
            exchange: tokio::sync::Mutex::new(Exchange::default()),
            last_response: Mutex::new(None),
            sent_messages: AtomicI64::new(0),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    /// Token aborting any retry wait, current or future.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of `sendMessage` calls the remote accepted.
    pub fn sent_messages(&self) -> i64 {
        self.sent_messages.load(Ordering::SeqCst)
    }

    pub fn last_response(&self) -> Option<ApiResponse> {
        self.last_response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_url(&self, action: &str) -> String {
        let mut url = format!("{}{}/{}", self.cfg.base_url, self.cfg.token, action);
        if self.cfg.method == HttpMethod::Get {
            url.push('?');
        }
        url
    }

    /// Issue `action` with `params` as multipart form fields.
    ///
    /// Timeouts, pool exhaustion, connection resets and 429s are retried with no
    /// cap; 5xx up to the policy cap. Only cancellation ends those waits early.
    pub async fn execute(&self, action: &str, params: &[(&str, &str)]) -> Result<Reply> {
        if action.trim().is_empty() {
            return Err(Error::Encoding("empty action name".to_string()));
        }

        let mut exchange = self.exchange.lock().await;

        let request = OutboundRequest {
            method: self.cfg.method,
            url: self.request_url(action),
            form: FormFields::encode(params.iter().copied())?,
            timeout: self.cfg.request_timeout,
        };
        exchange.request = Some(request.clone());

        let mut server_failures = 0u32;
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            exchange.attempts += 1;

            let result = self.transport.send(&request).await;
            if let Ok(resp) = &result {
                exchange.last_status = Some(resp.status);
            }

            match classify(&result, server_failures, &self.cfg.retry) {
                Outcome::Wait { reason, delay } => {
                    if reason == WaitReason::ServerError {
                        server_failures += 1;
                    }
                    tracing::debug!(action, ?reason, attempt, wait = ?delay, "waiting before retry");
                    self.pause(delay).await?;
                }
                Outcome::Success(reply) => {
                    self.settle(action, &reply);
                    return Ok(reply);
                }
                Outcome::Fatal(err) => {
                    if let Some(resp) = err.response() {
                        self.store_response(resp.clone());
                    }
                    tracing::debug!(action, attempt, error = %err, "remote call failed");
                    return Err(err);
                }
                Outcome::Malformed { status, body } => {
                    let body = String::from_utf8_lossy(&body)
                        .chars()
                        .take(MALFORMED_BODY_PREVIEW)
                        .collect();
                    return Err(Error::Malformed { status, body });
                }
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }

    fn settle(&self, action: &str, reply: &Reply) {
        match reply {
            Reply::EmptyText(resp) => {
                tracing::warn!(action, description = %resp.description, "message text is empty");
            }
            Reply::TooLong(resp) => {
                tracing::warn!(action, description = %resp.description, "message is too long");
            }
            Reply::Accepted(resp) => {
                if !resp.ok {
                    // Not every remote error code is modeled; keep going.
                    tracing::warn!(action, %resp, "remote returned ok=false");
                }
                if action == methods::SEND_MESSAGE {
                    self.sent_messages.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        self.store_response(reply.response().clone());
    }

    fn mask(&self, url: &str) -> String {
        if self.cfg.token.is_empty() {
            return url.to_string();
        }
        url.replace(&self.cfg.token, "***")
    }

    fn store_response(&self, resp: ApiResponse) {
        *self
            .last_response
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(resp);
    }
}

impl fmt::Display for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cfg.method.as_str(), self.mask(&self.cfg.base_url))?;
        let Ok(exchange) = self.exchange.try_lock() else {
            return f.write_str(", call in flight");
        };
        match &exchange.request {
            Some(req) => write!(
                f,
                ", last request {} (status {}, {} attempts total)",
                self.mask(&req.url),
                exchange
                    .last_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                exchange.attempts
            ),
            None => f.write_str(", no requests yet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{instant_policy, FakeTransport};
    use crate::transport::TransportError;
    use serde_json::json;

    fn client(transport: Arc<FakeTransport>, policy: RetryPolicy) -> ApiClient {
        ApiClient::new(
            transport,
            ClientConfig {
                base_url: "https://api.example.org/bot".to_string(),
                token: "123:abc".to_string(),
                method: HttpMethod::Post,
                request_timeout: Duration::from_secs(60),
                retry: policy,
            },
        )
    }

    #[tokio::test]
    async fn builds_url_and_form() {
        let fake = Arc::new(FakeTransport::new());
        let api = client(fake.clone(), instant_policy());

        let reply = api
            .execute(methods::GET_CHAT, &[("chat_id", "-100")])
            .await
            .unwrap();
        assert!(reply.is_accepted());

        let reqs = fake.requests.lock().unwrap();
        assert_eq!(reqs[0].url, "https://api.example.org/bot123:abc/getChat");
        assert_eq!(reqs[0].form.get("chat_id"), Some("-100"));
        assert_eq!(reqs[0].timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn display_masks_token() {
        let fake = Arc::new(FakeTransport::new());
        let api = client(fake, instant_policy());
        assert!(api.to_string().contains("no requests yet"));

        api.execute(methods::GET_ME, &[]).await.unwrap();
        let shown = api.to_string();
        assert!(shown.contains("bot***/getMe"));
        assert!(shown.contains("status 200"));
        assert!(!shown.contains("123:abc"));
    }

    #[tokio::test]
    async fn get_method_appends_query_marker() {
        let fake = Arc::new(FakeTransport::new());
        let mut api = client(fake, instant_policy());
        api.cfg.method = HttpMethod::Get;
        assert_eq!(api.request_url("getMe"), "https://api.example.org/bot123:abc/getMe?");
    }

    #[tokio::test]
    async fn encoding_failure_never_reaches_transport() {
        let fake = Arc::new(FakeTransport::new());
        let api = client(fake.clone(), instant_policy());
        let err = api
            .execute(methods::SEND_MESSAGE, &[("bad\nname", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn retries_network_and_rate_limit_until_success() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_err(TransportError::Timeout);
        fake.push_err(TransportError::ConnectionReset);
        fake.push_err(TransportError::NoFreeConnections);
        fake.push(429, json!({"ok": false, "error_code": 429, "description": "Too Many Requests"}));
        fake.push(200, json!({"ok": true, "result": {"message_id": 1}}));
        let api = client(fake.clone(), instant_policy());

        let reply = api
            .execute(methods::SEND_MESSAGE, &[("text", "x")])
            .await
            .unwrap();
        assert!(reply.is_accepted());
        assert_eq!(fake.calls(), 5);
        assert_eq!(api.sent_messages(), 1);
    }

    #[tokio::test]
    async fn unknown_transport_error_returns_immediately() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_err(TransportError::Other("connection refused".into()));
        let api = client(fake.clone(), instant_policy());

        let err = api.execute(methods::GET_ME, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn server_errors_give_up_after_cap() {
        let fake = Arc::new(FakeTransport::new());
        let body = json!({"ok": false, "error_code": 500, "description": "Internal Server Error"});
        for _ in 0..=3 {
            fake.push(500, body.clone());
        }
        let policy = RetryPolicy {
            max_server_retries: 3,
            ..instant_policy()
        };
        let api = client(fake.clone(), policy);

        let err = api.execute(methods::GET_ME, &[]).await.unwrap_err();
        assert!(matches!(err, Error::RemoteServer { attempts: 4, .. }));
        assert_eq!(fake.calls(), 4);
        assert_eq!(err.response().unwrap().error_code, 500);
    }

    #[tokio::test]
    async fn server_error_then_success_recovers() {
        let fake = Arc::new(FakeTransport::new());
        fake.push(500, json!({"ok": false}));
        fake.push(502, json!({"ok": false}));
        let api = client(fake.clone(), instant_policy());

        assert!(api.execute(methods::GET_ME, &[]).await.unwrap().is_accepted());
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn bad_request_keeps_envelope_for_diagnostics() {
        let fake = Arc::new(FakeTransport::new());
        fake.push(
            400,
            json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}),
        );
        let api = client(fake, instant_policy());

        let err = api
            .execute(methods::SEND_MESSAGE, &[("text", "x")])
            .await
            .unwrap_err();
        assert_eq!(
            err.response().unwrap().description,
            "Bad Request: chat not found"
        );
        assert_eq!(api.last_response().unwrap().error_code, 400);
        assert_eq!(api.sent_messages(), 0);
    }

    #[tokio::test]
    async fn not_ok_success_is_returned_and_counted() {
        let fake = Arc::new(FakeTransport::new());
        fake.push(200, json!({"ok": false, "description": "strange"}));
        let api = client(fake, instant_policy());

        let reply = api
            .execute(methods::SEND_MESSAGE, &[("text", "x")])
            .await
            .unwrap();
        assert!(!reply.response().ok);
        assert_eq!(api.sent_messages(), 1);
    }

    #[tokio::test]
    async fn malformed_body_surfaces() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_raw(200, "<html>gateway</html>");
        let api = client(fake, instant_policy());

        let err = api.execute(methods::GET_ME, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Malformed { status: 200, ref body } if body.contains("gateway")));
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialized() {
        let fake = Arc::new(FakeTransport::with_latency(Duration::from_millis(20)));
        let api = Arc::new(client(fake.clone(), instant_policy()));

        let a = {
            let api = api.clone();
            tokio::spawn(async move { api.execute(methods::GET_ME, &[]).await })
        };
        let b = {
            let api = api.clone();
            tokio::spawn(async move { api.execute(methods::GET_UPDATES, &[]).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(fake.calls(), 2);
        assert_eq!(
            fake.max_in_flight.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn cancellation_ends_an_endless_wait() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_err(TransportError::Timeout);
        let policy = RetryPolicy {
            network_wait: Duration::from_secs(3600),
            ..instant_policy()
        };
        let api = Arc::new(client(fake.clone(), policy));
        let token = api.cancellation();

        let call = {
            let api = api.clone();
            tokio::spawn(async move { api.execute(methods::GET_ME, &[]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(fake.calls(), 1);
    }
}
