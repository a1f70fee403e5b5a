use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use flux_serve::{listen_and_serve, listen_and_serve_tls, HttpServer, ServeConfig, SignalHandler};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config))?;

    // RUST_LOG 优先于配置文件中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting flux-serve with config: {}", args.config);

    let signals = SignalHandler::new();
    let token = signals.token();
    tokio::spawn(async move {
        if let Err(e) = signals.wait_for_system_signal().await {
            // 无法监听系统信号时立即关闭
            tracing::error!("Failed to listen for shutdown signals: {}", e);
            signals.trigger_shutdown();
        }
    });

    let router = Router::new().route("/health", get(|| async { "OK" }));
    let server = HttpServer::new(config.server.addr(), router);

    let policy = config
        .shutdown
        .policy_builder()
        .before_shutdown(|timeout| {
            tracing::info!("Draining connections (timeout: {:?})", timeout);
        })
        .after_shutdown(|err| match err {
            None => tracing::info!("All connections drained"),
            Some(e) => tracing::warn!("Shutdown finished with error: {}", e),
        })
        .build();

    let result = match &config.tls {
        Some(tls) => listen_and_serve_tls(token, &server, &tls.to_tls_config(), policy).await,
        None => listen_and_serve(token, &server, policy).await,
    };
    result.context("Server terminated with an error")?;

    tracing::info!("flux-serve stopped");
    Ok(())
}
