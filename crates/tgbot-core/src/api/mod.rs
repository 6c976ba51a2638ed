//! Bot API wire surface: method names and response envelopes.

pub mod types;

pub use types::{ApiResponse, Chat, ReplyKeyboard, ResponseParameters, SentMessage};

/// Remote method names used by the session.
pub mod methods {
    pub const GET_ME: &str = "getMe";
    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const GET_UPDATES: &str = "getUpdates";
    pub const GET_CHAT: &str = "getChat";
    pub const GET_CHAT_MEMBERS_COUNT: &str = "getChatMembersCount";
    pub const GET_CHAT_MEMBER: &str = "getChatMember";
    pub const EXPORT_CHAT_INVITE_LINK: &str = "exportChatInviteLink";
}

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org/bot";

/// Hard limit on `sendMessage` text length.
pub const MAX_MESSAGE_LENGTH: usize = 4096;
