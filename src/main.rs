use qrgen_service::config::{LoggingConfig, PORT_ENV};
use qrgen_service::{AppConfig, AppState, ShutdownManager, build_app};
use tracing_subscriber::EnvFilter;

/// 初始化日志：RUST_LOG 优先，否则使用配置中的级别。
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("qrgen_service={},tower_http=info", logging.level).into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("compact") {
        builder.compact().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    // 配置加载早于日志初始化，失败时直接输出到 stderr
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config init failed: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);
    if !AppConfig::port_from_env() {
        tracing::info!(
            "未检测到 {} 环境变量，使用默认端口 {}",
            PORT_ENV,
            config.server.port
        );
    }

    let shutdown_manager = ShutdownManager::new();
    if let Err(e) = shutdown_manager.start_signal_handler() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    let addr = config.server_addr();
    let shutdown_timeout = config.shutdown.timeout_duration();

    let state = match AppState::from_config(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("HTTP client init failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "渲染并发许可: {}，Logo 回源超时: {}s",
        state.render_semaphore.available_permits(),
        state.config.logo.timeout_secs
    );

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("QR API: http://{}/qr?data=hello", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);

    let manager = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    // 收到退出信号后，在途请求最多再等待 shutdown_timeout
    let server = tokio::spawn(async move { graceful.await });
    let deadline = async {
        shutdown_manager.wait_for_shutdown().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        res = server => match res {
            Ok(Ok(())) => tracing::info!("服务器已优雅关闭"),
            Ok(Err(e)) => {
                tracing::error!("服务器运行错误: {}", e);
                std::process::exit(1);
            }
            Err(e) => {
                tracing::error!("服务器任务异常: {}", e);
                std::process::exit(1);
            }
        },
        _ = deadline => {
            tracing::warn!("优雅退出超时（{}s），强制退出", shutdown_timeout.as_secs());
        }
    }
}
