use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use boltun::bot::{ChatType, IncomingMessage, MessageRouter, Stores};
use boltun::config::Config;
use boltun::openai::{Client as CompletionClient, KeyRing, RetryPolicy};
use boltun::search::SearchClient;

type Router = MessageRouter<SearchClient, CompletionClient>;

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("boltun.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting boltun...");
    info!(
        "{} API key(s), max {} chars, {} requests/day",
        config.openai_api_keys.len(),
        config.max_text_length,
        config.daily_request_limit
    );

    let search = match SearchClient::new(config.search_url.clone(), config.search_timeout) {
        Ok(search) => search,
        Err(e) => {
            error!("Failed to create search client: {e}");
            std::process::exit(1);
        }
    };
    let completion = CompletionClient::new(
        KeyRing::new(config.openai_api_keys.clone()),
        config.openai_base_url.clone(),
        RetryPolicy {
            pre_call_delay: config.pre_call_delay,
            cooldown: config.rate_limit_cooldown,
            max_retries: config.max_rate_limit_retries,
        },
    );
    let router: Arc<Router> = Arc::new(MessageRouter::new(
        config.max_text_length,
        Stores::new(config.daily_request_limit),
        search,
        completion,
    ));

    let bot = Bot::new(&config.telegram_bot_token);

    match bot.get_me().await {
        Ok(me) => info!("Bot user ID: {}, username: @{}", me.id, me.username()),
        Err(e) => warn!("Failed to get bot info: {e}"),
    }

    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        warn!("Failed to delete webhook: {e}");
    }

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Stopped");
}

async fn handle_message(bot: Bot, msg: Message, router: Arc<Router>) -> ResponseResult<()> {
    let Some(incoming) = telegram_to_incoming(&msg) else {
        return Ok(());
    };

    if let Some(reply) = router.handle(&incoming).await
        && let Err(e) = bot.send_message(msg.chat.id, reply).await
    {
        warn!("Failed to send reply to {}: {e}", msg.chat.id);
    }

    Ok(())
}

/// Text messages with a known sender only.
fn telegram_to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let user = msg.from.as_ref()?;
    let text = msg.text()?;

    let chat_type = match msg.chat.kind {
        ChatKind::Private(_) => ChatType::Private,
        ChatKind::Public(_) => ChatType::Group,
    };

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        chat_type,
        user_id: user.id.0 as i64,
        display_name: user.first_name.clone(),
        text: text.to_string(),
    })
}
