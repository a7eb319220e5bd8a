use anyhow::Context;
use clap::Parser;
use kb_bridge::app::{create_router, serve, AppState};
use kb_bridge::utils::{logger, validation::Validate};
use kb_bridge::{AnswerCache, Bridge, BridgeConfig, CliArgs, SearchClient, TelegramClient};
use std::sync::Arc;
use std::time::Duration;

const CACHE_JANITOR_INTERVAL: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_logger(args.verbose, args.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting kb-bridge");

    // 缺少必要配置是唯一會讓行程退出的錯誤
    let config = match BridgeConfig::load(args.env_file.as_deref())
        .and_then(|config| config.validate().map(|_| config))
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    if args.verbose {
        tracing::debug!("Bridge config: {:?}", config);
    }

    let cache = config.cache.enabled.then(|| {
        Arc::new(AnswerCache::new(
            config.cache.ttl,
            config.cache.max_entries,
        ))
    });
    match &cache {
        Some(cache) => {
            cache.spawn_janitor(CACHE_JANITOR_INTERVAL);
            tracing::info!(
                ttl_secs = cache.ttl().as_secs(),
                max_entries = config.cache.max_entries,
                "Answer cache enabled"
            );
        }
        None => tracing::info!("Answer cache disabled"),
    }

    let knowledge = SearchClient::new(config.fastgpt.clone(), cache)?;
    let telegram = TelegramClient::new(&config.telegram_bot_token, &config.telegram_api_base)?;

    let me = telegram
        .get_me()
        .await
        .context("Failed to authorize with Telegram")?;
    let bot_username = me.username.unwrap_or(me.first_name);
    tracing::info!(username = %bot_username, "Authorized Telegram bot");

    if args.skip_webhook_setup {
        tracing::info!("Skipping webhook registration");
    } else {
        let endpoint = config.webhook_endpoint();
        telegram
            .set_webhook(&endpoint, config.webhook_secret_token.as_deref())
            .await
            .context("Failed to register Telegram webhook")?;
        tracing::info!(webhook_url = %endpoint, "Webhook registered");
    }

    let bridge = Arc::new(Bridge::new(Arc::new(knowledge), Arc::new(telegram)));
    let state = AppState {
        bridge,
        bot_username,
        webhook_secret: config.webhook_secret_token.clone(),
    };

    let router = create_router(state, &config.webhook_path());
    serve(router, config.port).await?;

    Ok(())
}
