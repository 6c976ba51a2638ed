mod cli;

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use tgbot_core::{
    api::{ApiResponse, ReplyKeyboard},
    config::Config,
    errors::Error,
    session::BotSession,
    sink::SinkWriter,
};
use tgbot_http::ReqwestTransport;

use cli::{Cli, Commands};

const SINK_DRAIN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::from_yaml_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => Config::load().context("reading TB_* environment")?,
    };
    let transport = Arc::new(ReqwestTransport::new()?);
    let session = Arc::new(BotSession::new(cfg, transport)?);

    let mirror = matches!(cli.command, Commands::Pipe { mirror_logs: true });
    let sink_task = if mirror {
        let (writer, task) = SinkWriter::spawn(session.clone());
        tgbot_core::logging::init_with_mirror("tgbot", writer)?;
        Some(task)
    } else {
        tgbot_core::logging::init("tgbot")?;
        None
    };

    tracing::debug!(%session, "session ready");
    if cli.announce {
        session.announce().await.context("announcing session")?;
    }

    let outcome = run(&session, cli.command).await;

    if let Some(task) = sink_task {
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "tgbot failed");
        }
        task.shutdown(SINK_DRAIN_GRACE).await;
    }
    outcome
}

async fn run(session: &BotSession, command: Commands) -> Result<()> {
    let own_chat = session.chat_id().to_string();
    match command {
        Commands::Send {
            text,
            markdown,
            buttons,
        } => {
            let labels: Vec<&str> = buttons.iter().map(String::as_str).collect();
            let keyboard = (!labels.is_empty()).then(|| ReplyKeyboard::single_column(&labels));
            match session.send_message(&text, markdown, keyboard.as_ref()).await? {
                Some(reply) => println!("{}", reply.response()),
                None => tracing::warn!("nothing to send"),
            }
        }
        Commands::Pipe { .. } => pipe_stdin(session).await?,
        Commands::Me => print_result(&session.get_me().await?)?,
        Commands::Updates => print_result(&session.get_updates().await?)?,
        Commands::Chat { chat_id } => {
            let chat = chat_id.unwrap_or(own_chat);
            print_result(&session.get_chat(&chat).await?)?;
        }
        Commands::Members { chat_id } => {
            let chat = chat_id.unwrap_or(own_chat);
            println!("{}", session.get_chat_member_count(&chat).await?);
        }
        Commands::Member { user_id, chat_id } => {
            let chat = chat_id.unwrap_or(own_chat);
            print_result(&session.get_chat_member(&chat, &user_id).await?)?;
        }
        Commands::Invite { chat_id } => {
            let chat = chat_id.unwrap_or(own_chat);
            println!("{}", session.invite_user(&chat).await?);
        }
    }
    Ok(())
}

async fn pipe_stdin(session: &BotSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match session.write(line.as_bytes()).await {
            Ok(_) => {}
            Err(Error::BadWriter) => bail!("chat rejected the stream, stopping"),
            Err(e) => tracing::warn!(error = %e, "line not delivered"),
        }
    }
    tracing::info!(sent = session.sent_messages(), "stdin closed");
    Ok(())
}

fn print_result(resp: &ApiResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&resp.result)?);
    Ok(())
}
