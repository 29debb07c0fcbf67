use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use feedwatch::server::handle_connection;
use feedwatch::{
    ChromeFactory, Config, ConnectionSink, ControlContext, ControlServer, FanoutSink,
    MonitorManager, NotificationSink, PollSettings, WebhookSink,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    // Initialize logging
    if let Err(e) = feedwatch::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        feedwatch::logging::init_console_only(&config.logging.level);
    }

    info!("feedwatch starting");

    if let Err(e) = run(config).await {
        error!("feedwatch stopped with an error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> feedwatch::Result<()> {
    let factory = Arc::new(ChromeFactory::new(config.browser.clone()));
    if config.browser.debugging_url.is_empty() {
        info!("Rendering with a private browser per monitor");
    } else {
        info!("Rendering in the browser at {}", config.browser.debugging_url);
    }

    let connections = Arc::new(ConnectionSink::new());
    let mut sink = FanoutSink::new().with_sink(connections.clone());
    if !config.notify.webhook_url.is_empty() {
        sink = sink.with_sink(Arc::new(WebhookSink::new(&config.notify.webhook_url)?));
        info!("Webhook notifications enabled");
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);

    let manager = Arc::new(MonitorManager::new(
        factory,
        sink,
        PollSettings::from(&config.monitor),
    ));

    if config.control.token.is_empty() {
        info!("Control token not set; any local client may issue commands");
    }
    let ctx = ControlContext {
        manager: Arc::clone(&manager),
        connections,
        token: config.control.token.clone(),
    };

    let server = ControlServer::bind(&config.control).await?;
    let (close_tx, close_rx) = oneshot::channel::<()>();
    let mut serve = tokio::spawn(server.run(
        move |stream, addr, closing| handle_connection(stream, addr, ctx.clone(), closing),
        async move {
            let _ = close_rx.await;
        },
    ));

    let interrupted = tokio::select! {
        _ = &mut serve => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        info!("Shutdown requested");
        // Connections finish their current command before monitors are stopped.
        let _ = close_tx.send(());
        if let Err(e) = serve.await {
            error!("Control server task failed: {}", e);
        }
    } else {
        warn!("Control server stopped unexpectedly");
    }

    manager.shutdown().await;
    info!("feedwatch stopped");
    Ok(())
}
