// ==========================================
// 染整车间生产流程引擎 - HTTP 服务入口
// ==========================================
// 配置: DYEHOUSE_DB_PATH / DYEHOUSE_BIND_ADDR / DYEHOUSE_TOKENS_FILE
// 日志: RUST_LOG (默认 info)
// ==========================================

use std::sync::Arc;

use dyehouse_workflow::app::{build_router, AppState, StaticTokenVerifier};
use dyehouse_workflow::config::AppConfig;
use dyehouse_workflow::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", dyehouse_workflow::APP_NAME);
    tracing::info!("系统版本: {}", dyehouse_workflow::VERSION);
    tracing::info!("==================================================");

    let config = AppConfig::from_env();
    tracing::info!("使用数据库: {}", config.db_path);

    let verifier = match &config.tokens_file {
        Some(path) => StaticTokenVerifier::from_json_file(path)?,
        None => {
            tracing::warn!("未配置令牌表, 受保护接口将全部返回 401");
            StaticTokenVerifier::default()
        }
    };

    tracing::info!("正在初始化AppState...");
    let state = AppState::new(config.db_path.clone(), Arc::new(verifier))
        .await
        .map_err(anyhow::Error::msg)?;

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("监听地址: {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
