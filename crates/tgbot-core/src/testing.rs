//! Scripted transport shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    classify::RetryPolicy,
    transport::{OutboundRequest, RawResponse, Transport, TransportError},
};

type Scripted = std::result::Result<RawResponse, TransportError>;

/// Replays queued results; once the script runs dry every call answers
/// `200 {"ok":true}`.
#[derive(Default)]
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    pub(crate) requests: Mutex<Vec<OutboundRequest>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub(crate) fn push(&self, status: u16, body: serde_json::Value) {
        self.script.lock().unwrap().push_back(Ok(RawResponse {
            status,
            body: body.to_string().into_bytes(),
        }));
    }

    pub(crate) fn push_raw(&self, status: u16, body: &str) {
        self.script.lock().unwrap().push_back(Ok(RawResponse {
            status,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub(crate) fn push_err(&self, err: TransportError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.form.get("text").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &OutboundRequest) -> Scripted {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next.unwrap_or_else(|| {
            Ok(RawResponse {
                status: 200,
                body: br#"{"ok":true,"result":{}}"#.to_vec(),
            })
        })
    }
}

pub(crate) fn instant_policy() -> RetryPolicy {
    RetryPolicy {
        network_wait: Duration::ZERO,
        rate_limit_wait: Duration::ZERO,
        server_wait: Duration::ZERO,
        max_server_retries: 100,
    }
}
