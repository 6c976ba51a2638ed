//! Transport port: one HTTP exchange, no retries.
//!
//! Adapter crates implement [`Transport`]; the executor owns every retry decision.

use std::{fmt, time::Duration};

use async_trait::async_trait;

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Multipart form fields, validated and kept in a stable order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: Vec<(String, String)>,
}

impl FormFields {
    /// Local encoding step. A rejected field name is a caller bug, not a
    /// transient condition.
    pub fn encode<'a, I>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (name, value) in params {
            if name.is_empty() {
                return Err(Error::Encoding("empty form field name".to_string()));
            }
            if name.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
                return Err(Error::Encoding(format!("invalid form field name: {name:?}")));
            }
            match fields.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => fields.push((name.to_string(), value.to_string())),
            }
        }
        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub form: FormFields,
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport failures, split by how the executor reacts to them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    NoFreeConnections,
    ConnectionReset,
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::NoFreeConnections => f.write_str("no free connections available"),
            Self::ConnectionReset => f.write_str("connection reset by peer"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for TransportError {}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &OutboundRequest,
    ) -> std::result::Result<RawResponse, TransportError>;
}
