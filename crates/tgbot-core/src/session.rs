//! Bot session: the high-level operation surface over the executor.

use std::{fmt, sync::Arc};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{methods, ApiResponse, ReplyKeyboard},
    classify::Reply,
    config::Config,
    errors::Error,
    executor::{ApiClient, ClientConfig},
    history::MessageHistory,
    segment::Segmenter,
    transport::Transport,
    Result,
};

const READY_TEXT: &str = "Telegram Bot ready";

/// One bot token bound to one chat.
///
/// Safe to share between tasks; outbound HTTP is serialized internally.
pub struct BotSession {
    cfg: Config,
    api: ApiClient,
    segmenter: Segmenter,
    pub(crate) history: MessageHistory,
    /// Makes the dedup check and record of [`BotSession::write`] one step.
    pub(crate) write_gate: tokio::sync::Mutex<()>,
}

impl BotSession {
    /// Fails only when the configured message limit cannot hold the labels.
    /// Token and chat id are checked per call.
    pub fn new(cfg: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let segmenter = Segmenter::new(cfg.instance.clone(), cfg.max_message_length)?;
        let api = ApiClient::new(
            transport,
            ClientConfig {
                base_url: cfg.base_url.clone(),
                token: cfg.bot_token.clone(),
                method: cfg.http_method,
                request_timeout: cfg.request_timeout,
                retry: cfg.retry,
            },
        );
        let history = MessageHistory::new(cfg.history_capacity);
        Ok(Self {
            cfg,
            api,
            segmenter,
            history,
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn chat_id(&self) -> &str {
        &self.cfg.chat_id
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn sent_messages(&self) -> i64 {
        self.api.sent_messages()
    }

    /// Cancelling aborts every pending and future retry wait of this session.
    pub fn cancellation(&self) -> CancellationToken {
        self.api.cancellation()
    }

    fn check(&self) -> Result<()> {
        if self.cfg.bot_token.trim().is_empty() {
            return Err(Error::Config("bot token is empty".to_string()));
        }
        if self.cfg.chat_id.trim().is_empty() {
            return Err(Error::Config("chat id is empty".to_string()));
        }
        Ok(())
    }

    /// Send `text` to the session chat, split into labeled parts when it does
    /// not fit a single message.
    ///
    /// Returns `Ok(None)` when nothing was sent (blank text), otherwise the
    /// reply to the last request issued.
    pub async fn send_message(
        &self,
        text: &str,
        markdown: bool,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<Option<Reply>> {
        self.check()?;

        let text = self.segmenter.prepare(text, markdown);
        if text.is_empty() {
            tracing::warn!("empty message text, nothing sent");
            return Ok(None);
        }

        let markup = keyboard.map(ReplyKeyboard::to_json).transpose()?;
        let mut params: Vec<(&str, &str)> = vec![("chat_id", self.cfg.chat_id.as_str())];
        if markdown {
            params.push(("parse_mode", "Markdown"));
        }
        if let Some(markup) = markup.as_deref() {
            params.push(("reply_markup", markup));
        }

        if self.segmenter.fits(&text) {
            let body = self.segmenter.single(&text);
            params.push(("text", body.as_str()));
            return self.api.execute(methods::SEND_MESSAGE, &params).await.map(Some);
        }

        let mess_no = self.api.sent_messages() + 1;
        let mut last = None;
        for chunk in self.segmenter.chunks(&text) {
            let body = self.segmenter.render(&chunk, mess_no);
            let mut part = params.clone();
            part.push(("text", body.as_str()));
            tracing::debug!(mess_no, part = chunk.index, last = chunk.last, "sending message part");
            last = Some(self.api.execute(methods::SEND_MESSAGE, &part).await?);
        }
        Ok(last)
    }

    /// Startup probe: announces the session in the chat.
    pub async fn announce(&self) -> Result<()> {
        match self.send_message(READY_TEXT, false, None).await {
            Ok(_) => Ok(()),
            Err(Error::BadRemoteCall { status, response }) => Err(Error::Config(format!(
                "bad remote call, status {status}, error_code {}: {}",
                response.error_code, response.description
            ))),
            Err(e) => Err(e),
        }
    }

    pub async fn get_me(&self) -> Result<ApiResponse> {
        self.call(methods::GET_ME, &[]).await
    }

    pub async fn get_updates(&self) -> Result<ApiResponse> {
        self.call(methods::GET_UPDATES, &[]).await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<ApiResponse> {
        self.call(methods::GET_CHAT, &[("chat_id", chat_id)]).await
    }

    pub async fn get_chat_member_count(&self, chat_id: &str) -> Result<i64> {
        self.call(methods::GET_CHAT_MEMBERS_COUNT, &[("chat_id", chat_id)])
            .await?
            .result_i64()
    }

    pub async fn get_chat_member(&self, chat_id: &str, user_id: &str) -> Result<ApiResponse> {
        self.call(
            methods::GET_CHAT_MEMBER,
            &[("chat_id", chat_id), ("user_id", user_id)],
        )
        .await
    }

    /// Primary invite link of `chat_id`, regenerated by the remote.
    pub async fn invite_user(&self, chat_id: &str) -> Result<String> {
        let resp = self
            .call(methods::EXPORT_CHAT_INVITE_LINK, &[("chat_id", chat_id)])
            .await?;
        Ok(resp.result_str()?.to_string())
    }

    pub fn last_response(&self) -> Option<ApiResponse> {
        self.api.last_response()
    }

    /// `result` of the last decoded response.
    pub fn last_result(&self) -> Result<Value> {
        let resp = self
            .last_response()
            .ok_or_else(|| Error::MissingField("no response received yet".to_string()))?;
        resp.result().cloned()
    }

    async fn call(&self, action: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        if self.cfg.bot_token.trim().is_empty() {
            return Err(Error::Config("bot token is empty".to_string()));
        }
        Ok(self.api.execute(action, params).await?.into_response())
    }
}

impl fmt::Display for BotSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self.cfg.bot_token.split_once(':') {
            Some((id, _)) => format!("{id}:***"),
            None if self.cfg.bot_token.is_empty() => String::new(),
            None => "***".to_string(),
        };
        write!(
            f,
            "BotSession {{token: {token}, chat_id: {}, instance: {:?}, api: {}, sent: {}, history: [",
            self.cfg.chat_id,
            self.cfg.instance,
            self.api,
            self.sent_messages(),
        )?;
        for (slot, entry) in self.history.entries() {
            write!(f, "{slot}: {entry}, ")?;
        }
        f.write_str("]}")
    }
}
