use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Notify a Telegram chat from scripts and services.
#[derive(Parser, Debug)]
#[command(name = "tgbot", version, about, long_about = None)]
pub struct Cli {
    /// YAML file with `BotToken` and `ChatID`. Falls back to TB_* env vars.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Send "Telegram Bot ready" before running the command.
    #[arg(long, global = true)]
    pub announce: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message to the configured chat.
    Send {
        /// Message text. Long texts are split into labeled parts.
        text: String,
        /// Send with `parse_mode=Markdown`.
        #[arg(long)]
        markdown: bool,
        /// Attach a one-column reply keyboard (repeatable).
        #[arg(long = "button")]
        buttons: Vec<String>,
    },

    /// Forward stdin line by line, skipping recently repeated lines.
    Pipe {
        /// Also mirror this process's WARN and ERROR logs into the chat.
        #[arg(long)]
        mirror_logs: bool,
    },

    /// Show the bot identity (`getMe`).
    Me,

    /// Show pending updates (`getUpdates`).
    Updates,

    /// Show chat details.
    Chat {
        /// Defaults to the configured chat. Group ids are negative.
        #[arg(allow_negative_numbers = true)]
        chat_id: Option<String>,
    },

    /// Print the member count of a chat.
    Members {
        #[arg(allow_negative_numbers = true)]
        chat_id: Option<String>,
    },

    /// Show one member of a chat.
    Member {
        user_id: String,
        #[arg(long, allow_negative_numbers = true)]
        chat_id: Option<String>,
    },

    /// Print a fresh primary invite link.
    Invite {
        #[arg(allow_negative_numbers = true)]
        chat_id: Option<String>,
    },
}
