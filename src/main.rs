//! 会话服务主入口

use session_service::{
    config::AppConfig,
    db,
    middleware::AppState,
    repository::ApiKeyRepository,
    routes,
    secrets::FileSecretSource,
    sweeper::ExpirySweeper,
    telemetry,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// 子命令
enum Command {
    ServeHttpApi,
    BackgroundProcess,
    MigrateDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    let command = match args.get(1).map(String::as_str) {
        None | Some("serve-http-api") => Command::ServeHttpApi,
        Some("background-process") => Command::BackgroundProcess,
        Some("migrate-db") => Command::MigrateDb,
        Some("--version") => {
            println!("session-service {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") => {
            print_help();
            return Ok(());
        }
        Some(other) => {
            eprintln!("未知参数: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    // 加载 .env 文件（开发环境）
    // 生产环境应该直接设置环境变量
    if let Ok(env) = std::env::var("APP_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = load_config().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    // 3. 数据库连接池
    let db_pool = db::create_pool(&config.database).await?;

    match command {
        Command::MigrateDb => {
            db::run_migrations(&db_pool).await?;
            Ok(())
        }
        Command::BackgroundProcess => run_background_process(config, db_pool).await,
        Command::ServeHttpApi => serve_http_api(config, db_pool).await,
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::from_env()?;

    match config.secrets.dir.clone() {
        Some(dir) => config.resolve_secrets(&FileSecretSource::new(dir))?,
        None if config.has_secret_references() => {
            anyhow::bail!("secret references found but secrets.dir is not set")
        }
        None => {}
    }

    Ok(config)
}

async fn serve_http_api(config: AppConfig, db_pool: sqlx::PgPool) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Session service starting...");

    db::run_migrations(&db_pool).await?;

    let shutdown_timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
    let addr = config.server.addr.clone();

    let app_state = Arc::new(AppState::new(config, db_pool)?);

    // 进程内运行过期 key 清理
    let shutdown = app_state.sweeper.shutdown_token();
    let sweeper = app_state.sweeper.clone().spawn();

    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = forced_exit_after(&shutdown, shutdown_timeout) => {
            tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        }
    }

    wait_for_sweeper(sweeper, shutdown_timeout).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn run_background_process(config: AppConfig, db_pool: sqlx::PgPool) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Background process starting...");

    let shutdown_timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
    let sweeper = Arc::new(ExpirySweeper::from_config(
        ApiKeyRepository::new(db_pool),
        &config.sweeper,
    ));

    let shutdown = sweeper.shutdown_token();
    let handle = sweeper.spawn();

    cancel_on_signal(shutdown).await;
    wait_for_sweeper(handle, shutdown_timeout).await;

    tracing::info!("Background process stopped");
    Ok(())
}

async fn wait_for_sweeper(handle: tokio::task::JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Expiry sweeper task failed"),
        Err(_) => tracing::warn!("Expiry sweeper did not stop within shutdown timeout"),
    }
}

/// 关闭信号到达后再等待超时时间
async fn forced_exit_after(shutdown: &CancellationToken, timeout: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(timeout).await;
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    shutdown_signal().await;
    shutdown.cancel();
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("session-service {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: session-service [命令]");
    println!();
    println!("命令:");
    println!("  serve-http-api      启动 HTTP API 与过期 key 清理（默认）");
    println!("  background-process  只运行过期 key 清理");
    println!("  migrate-db          执行数据库迁移后退出");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 APP_ 前缀的环境变量完成，例如 APP_DATABASE__URL");
    println!("  可用选项请参考 .env.example");
}
