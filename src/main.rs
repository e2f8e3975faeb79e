use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use order_intake::bot::{self, Command, ConversationMachine};
use order_intake::config::AppConfig;
use order_intake::console::{run_console, ConsoleCommand};
use order_intake::ingestion::{run_inbox_scanner, run_order_logger, scan_inbox, OrderIngestionPipeline};
use order_intake::intake_errors::IntakeResult;
use order_intake::manager_registry::ManagerRegistry;
use order_intake::normalizer::order_template;
use order_intake::persistence::{write_json, OrderStore};
use order_intake::users::UserStore;
use order_intake::web_server::{self, WebServerHandle};

/// Pause between stopping and starting the web server on restart
const WEB_RESTART_DELAY: Duration = Duration::from_secs(1);

fn init_tracing() {
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "order_intake=info,teloxide=warn".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Write a sample structured export unless one already exists
fn ensure_order_template(path: &Path) -> IntakeResult<()> {
    if path.exists() {
        return Ok(());
    }
    write_json(path, &order_template())?;
    info!(path = %path.display(), "Order template created");
    Ok(())
}

async fn start_web_server(
    config: &AppConfig,
    pipeline: &Arc<OrderIngestionPipeline>,
) -> Option<WebServerHandle> {
    match web_server::start(config.web_bind_addr, &config.web_pages_dir, pipeline.clone()).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "Failed to start web server");
            None
        }
    }
}

async fn stop_web_server(web: Option<WebServerHandle>) {
    if let Some(handle) = web {
        if let Err(e) = handle.stop().await {
            error!(error = %e, "Web server did not stop cleanly");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads .env as well, so it runs before logging is configured
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    init_tracing();

    info!("Starting order intake service");

    let registry = ManagerRegistry::load_shared(&config.managers_file);
    let users = Arc::new(UserStore::load(&config.users_file));
    let orders = Arc::new(
        OrderStore::open(&config.order_store_dir).context("Failed to open order store")?,
    );
    let pipeline = Arc::new(OrderIngestionPipeline::new(
        orders.clone(),
        &config.orders_inbox_dir,
    ));

    let logger = tokio::spawn(run_order_logger(pipeline.subscribe()));

    if let Err(e) = ensure_order_template(&config.order_template_path) {
        warn!(error = %e, "Failed to write order template");
    }
    scan_inbox(pipeline.clone()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner = config.scan_interval.map(|period| {
        info!(?period, "Periodic inbox scanning enabled");
        tokio::spawn(run_inbox_scanner(pipeline.clone(), period, shutdown_rx.clone()))
    });

    let mut web = start_web_server(&config, &pipeline).await;

    // Initialize the bot
    let bot = Bot::new(config.bot_token.clone());
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "Failed to register bot commands");
    }

    let machine = Arc::new(ConversationMachine::new(
        registry,
        users,
        orders,
        config.web_app_url.clone(),
    ));

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![machine])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .build();
    let shutdown_token = dispatcher.shutdown_token();
    let dispatch = dispatcher.dispatch();
    tokio::pin!(dispatch);

    let (console_tx, mut console_rx) = mpsc::channel(8);
    let mut console_open = config.console_enabled;
    if console_open {
        tokio::spawn(run_console(console_tx));
    } else {
        drop(console_tx);
    }

    let mut dispatcher_running = true;
    loop {
        tokio::select! {
            command = console_rx.recv(), if console_open => match command {
                Some(ConsoleCommand::Quit) => {
                    info!("Quit requested from console");
                    break;
                }
                Some(ConsoleCommand::Restart) => {
                    info!("Restarting web server");
                    stop_web_server(web.take()).await;
                    tokio::time::sleep(WEB_RESTART_DELAY).await;
                    web = start_web_server(&config, &pipeline).await;
                }
                Some(ConsoleCommand::Status) => {
                    info!(
                        web_server = ?web.as_ref().map(WebServerHandle::local_addr),
                        "Service is running"
                    );
                }
                None => console_open = false,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Shutdown signal received");
                break;
            }
            () = &mut dispatch => {
                warn!("Dispatcher stopped");
                dispatcher_running = false;
                break;
            }
        }
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    stop_web_server(web).await;

    if dispatcher_running {
        // The dispatcher only winds down while its future is polled
        match shutdown_token.shutdown() {
            Ok(_) => dispatch.await,
            Err(e) => warn!(error = %e, "Dispatcher was not running"),
        }
    }

    if let Some(scanner) = scanner {
        if let Err(e) = scanner.await {
            error!(error = %e, "Inbox scanner task failed");
        }
    }
    logger.abort();

    info!("Order intake service stopped");
    Ok(())
}
