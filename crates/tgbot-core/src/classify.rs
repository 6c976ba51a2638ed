//! Response classification: one HTTP attempt in, one loop decision out.
//!
//! Pure and deterministic so the retry table can be tested without a transport.

use std::time::Duration;

use crate::{
    api::ApiResponse,
    errors::Error,
    transport::{RawResponse, TransportError},
};

const EMPTY_TEXT_MARKER: &str = "message text is empty";
const TOO_LONG_MARKER: &str = "message is too long";

/// Waits and caps applied by the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Timeout, pool exhaustion and connection reset. Retried without a cap.
    pub network_wait: Duration,
    /// HTTP 429. Retried without a cap.
    pub rate_limit_wait: Duration,
    /// HTTP 5xx.
    pub server_wait: Duration,
    /// Server failures tolerated before giving up.
    pub max_server_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_wait: Duration::from_secs(120),
            rate_limit_wait: Duration::from_secs(1),
            server_wait: Duration::from_secs(10),
            max_server_retries: 100,
        }
    }
}

/// Final, non-error result of a call.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Accepted(ApiResponse),
    /// The remote rejected a blank text. Callers that may send blank lines
    /// treat this as handled.
    EmptyText(ApiResponse),
    TooLong(ApiResponse),
}

impl Reply {
    pub fn response(&self) -> &ApiResponse {
        match self {
            Reply::Accepted(r) | Reply::EmptyText(r) | Reply::TooLong(r) => r,
        }
    }

    pub fn into_response(self) -> ApiResponse {
        match self {
            Reply::Accepted(r) | Reply::EmptyText(r) | Reply::TooLong(r) => r,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Reply::Accepted(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitReason {
    Timeout,
    NoFreeConnections,
    ConnectionReset,
    RateLimited,
    ServerError,
}

#[derive(Debug)]
pub enum Outcome {
    Success(Reply),
    Wait { reason: WaitReason, delay: Duration },
    Fatal(Error),
    Malformed { status: u16, body: Vec<u8> },
}

/// Decide what to do after one attempt.
///
/// `server_failures` counts the 5xx responses already waited out for this call.
pub fn classify(
    attempt: &std::result::Result<RawResponse, TransportError>,
    server_failures: u32,
    policy: &RetryPolicy,
) -> Outcome {
    let resp = match attempt {
        Ok(resp) => resp,
        Err(err) => return classify_transport(err, policy),
    };

    let decoded = ApiResponse::from_slice(&resp.body);
    let status = resp.status;

    match status {
        429 => Outcome::Wait {
            reason: WaitReason::RateLimited,
            delay: policy.rate_limit_wait,
        },
        400 => {
            let envelope = decoded.unwrap_or_default();
            if envelope.description.contains(EMPTY_TEXT_MARKER) {
                Outcome::Success(Reply::EmptyText(envelope))
            } else if envelope.description.contains(TOO_LONG_MARKER) {
                Outcome::Success(Reply::TooLong(envelope))
            } else {
                bad_remote_call(status, envelope)
            }
        }
        401..=499 => bad_remote_call(status, decoded.unwrap_or_default()),
        500..=599 => {
            if server_failures >= policy.max_server_retries {
                Outcome::Fatal(Error::RemoteServer {
                    attempts: server_failures + 1,
                    response: Box::new(decoded.unwrap_or_default()),
                })
            } else {
                Outcome::Wait {
                    reason: WaitReason::ServerError,
                    delay: policy.server_wait,
                }
            }
        }
        _ => match decoded {
            Ok(envelope) => Outcome::Success(Reply::Accepted(envelope)),
            Err(_) => Outcome::Malformed {
                status,
                body: resp.body.clone(),
            },
        },
    }
}

fn classify_transport(err: &TransportError, policy: &RetryPolicy) -> Outcome {
    let reason = match err {
        TransportError::Timeout => WaitReason::Timeout,
        TransportError::NoFreeConnections => WaitReason::NoFreeConnections,
        TransportError::ConnectionReset => WaitReason::ConnectionReset,
        TransportError::Other(msg) => return Outcome::Fatal(Error::Transport(msg.clone())),
    };
    Outcome::Wait {
        reason,
        delay: policy.network_wait,
    }
}

fn bad_remote_call(status: u16, envelope: ApiResponse) -> Outcome {
    Outcome::Fatal(Error::BadRemoteCall {
        status,
        response: Box::new(envelope),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, body: &str) -> std::result::Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            body: body.as_bytes().to_vec(),
        })
    }

    fn error_body(code: u16, desc: &str) -> String {
        serde_json::json!({"ok": false, "error_code": code, "description": desc}).to_string()
    }

    #[test]
    fn network_errors_wait_two_minutes() {
        let policy = RetryPolicy::default();
        for (err, reason) in [
            (TransportError::Timeout, WaitReason::Timeout),
            (TransportError::NoFreeConnections, WaitReason::NoFreeConnections),
            (TransportError::ConnectionReset, WaitReason::ConnectionReset),
        ] {
            match classify(&Err(err), 0, &policy) {
                Outcome::Wait { reason: r, delay } => {
                    assert_eq!(r, reason);
                    assert_eq!(delay, Duration::from_secs(120));
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_transport_error_is_fatal() {
        let out = classify(
            &Err(TransportError::Other("dns failure".into())),
            0,
            &RetryPolicy::default(),
        );
        assert!(matches!(out, Outcome::Fatal(Error::Transport(m)) if m == "dns failure"));
    }

    #[test]
    fn rate_limited_waits_one_second() {
        let out = classify(&resp(429, &error_body(429, "Too Many Requests")), 0, &RetryPolicy::default());
        assert!(matches!(
            out,
            Outcome::Wait { reason: WaitReason::RateLimited, delay } if delay == Duration::from_secs(1)
        ));
    }

    #[test]
    fn empty_and_too_long_texts_are_not_errors() {
        let policy = RetryPolicy::default();
        let empty = classify(
            &resp(400, &error_body(400, "Bad Request: message text is empty")),
            0,
            &policy,
        );
        assert!(matches!(empty, Outcome::Success(Reply::EmptyText(r)) if r.error_code == 400));

        let long = classify(
            &resp(400, &error_body(400, "Bad Request: message is too long")),
            0,
            &policy,
        );
        assert!(matches!(long, Outcome::Success(Reply::TooLong(_))));
    }

    #[test]
    fn other_client_errors_are_bad_remote_calls() {
        let policy = RetryPolicy::default();
        for status in [400u16, 401, 403, 404] {
            let out = classify(&resp(status, &error_body(status, "Bad Request: chat not found")), 0, &policy);
            match out {
                Outcome::Fatal(Error::BadRemoteCall { status: s, response }) => {
                    assert_eq!(s, status);
                    assert_eq!(response.description, "Bad Request: chat not found");
                }
                other => panic!("unexpected outcome for {status}: {other:?}"),
            }
        }
    }

    #[test]
    fn bad_request_with_html_body_is_still_bad_remote_call() {
        let out = classify(&resp(404, "<html>nope</html>"), 0, &RetryPolicy::default());
        assert!(matches!(out, Outcome::Fatal(Error::BadRemoteCall { status: 404, .. })));
    }

    #[test]
    fn server_errors_retry_up_to_the_cap() {
        let policy = RetryPolicy::default();
        let body = error_body(500, "Internal Server Error");
        assert!(matches!(
            classify(&resp(500, &body), 0, &policy),
            Outcome::Wait { reason: WaitReason::ServerError, delay } if delay == Duration::from_secs(10)
        ));
        assert!(matches!(
            classify(&resp(500, &body), 99, &policy),
            Outcome::Wait { reason: WaitReason::ServerError, .. }
        ));
        assert!(matches!(
            classify(&resp(500, &body), 100, &policy),
            Outcome::Fatal(Error::RemoteServer { attempts: 101, .. })
        ));
    }

    #[test]
    fn success_keeps_not_ok_envelopes() {
        let out = classify(&resp(200, &error_body(0, "odd")), 0, &RetryPolicy::default());
        assert!(matches!(out, Outcome::Success(Reply::Accepted(r)) if !r.ok));
    }

    #[test]
    fn undecodable_success_body_is_malformed() {
        let out = classify(&resp(200, "not json"), 0, &RetryPolicy::default());
        assert!(matches!(out, Outcome::Malformed { status: 200, body } if body == b"not json"));
    }

    #[test]
    fn classification_is_deterministic() {
        let policy = RetryPolicy::default();
        let input = resp(400, &error_body(400, "Bad Request: message text is empty"));
        let a = format!("{:?}", classify(&input, 3, &policy));
        let b = format!("{:?}", classify(&input, 3, &policy));
        assert_eq!(a, b);
    }
}
