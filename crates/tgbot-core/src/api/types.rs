use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{errors::Error, Result};

/// Envelope returned by every Bot API method.
///
/// `result` is shaped per method, so it stays an untyped JSON value; read it
/// through the fallible accessors below instead of indexing blindly.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ResponseParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
}

impl ApiResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The raw `result` value; errors when the remote omitted it.
    pub fn result(&self) -> Result<&Value> {
        if self.result.is_null() {
            return Err(Error::MissingField("result".to_string()));
        }
        Ok(&self.result)
    }

    pub fn result_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.result()?.clone();
        Ok(serde_json::from_value(value)?)
    }

    pub fn result_i64(&self) -> Result<i64> {
        self.result()?
            .as_i64()
            .ok_or_else(|| Error::MissingField("result (integer)".to_string()))
    }

    pub fn result_str(&self) -> Result<&str> {
        self.result()?
            .as_str()
            .ok_or_else(|| Error::MissingField("result (string)".to_string()))
    }

    /// A single key of an object-shaped `result`.
    pub fn result_field(&self, key: &str) -> Result<&Value> {
        self.result()?
            .get(key)
            .ok_or_else(|| Error::MissingField(format!("result.{key}")))
    }
}

impl fmt::Display for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ok {
            return write!(
                f,
                "request is not ok, error_code: {}, {}",
                self.error_code, self.description
            );
        }
        match self.result_as::<SentMessage>() {
            Ok(sent) => write!(f, "request is ok, {sent}"),
            Err(_) => write!(f, "request is ok, result: {}", self.result),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// `result` of a successful `sendMessage`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SentMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

impl SentMessage {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

impl fmt::Display for SentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self
            .sent_at()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        write!(
            f,
            "message {} in chat {} ({}{}) at {date}",
            self.message_id,
            self.chat.id,
            self.chat.kind,
            self.chat
                .title
                .as_deref()
                .or(self.chat.username.as_deref())
                .map(|t| format!(", {t}"))
                .unwrap_or_default(),
        )
    }
}

/// Reply keyboard attached to an outgoing message (`reply_markup`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ReplyKeyboard {
    pub keyboard: Vec<Vec<String>>,
    #[serde(default)]
    pub one_time_keyboard: bool,
    #[serde(default)]
    pub resize_keyboard: bool,
}

impl ReplyKeyboard {
    /// One button per row.
    pub fn single_column(labels: &[&str]) -> Self {
        Self {
            keyboard: labels.iter().map(|l| vec![l.to_string()]).collect(),
            one_time_keyboard: true,
            resize_keyboard: true,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Encoding(format!("reply_markup: {e}")))
    }
}
