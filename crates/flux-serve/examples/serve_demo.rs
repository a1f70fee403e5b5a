use axum::{routing::get, Router};
use flux_serve::{listen_and_serve, HttpServer, ShutdownPolicy, SignalHandler};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== flux-serve 优雅关闭示例 ===\n");

    let router = Router::new().route("/health", get(|| async { "OK" }));
    let server = HttpServer::new("127.0.0.1:0", router);

    let policy = ShutdownPolicy::builder()
        .shutdown_timeout(Duration::from_secs(5))
        .before_shutdown(|timeout| println!("开始关闭，超时: {:?}", timeout))
        .after_shutdown(|err| println!("关闭完成，错误: {:?}", err))
        .build();

    // 1 秒后手动触发关闭（模拟 Ctrl+C）
    let signals = SignalHandler::new();
    let token = signals.token();
    tokio::spawn({
        let server = server.clone();
        async move {
            if let Some(addr) = server.wait_until_listening().await {
                println!("监听地址: {}", addr);
            }
            sleep(Duration::from_secs(1)).await;
            println!("shutting down");
            signals.trigger_shutdown();
        }
    });

    // 阻塞直到服务关闭
    println!("listening");
    listen_and_serve(token, &server, policy).await?;

    println!("done");
    Ok(())
}
