use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::features::qr::logo::LogoOverlay;

/// 聚合的应用共享状态（只读，跨请求无可变共享）
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Logo 回源与叠加（内部复用 HTTP 连接池）
    pub logo: Arc<LogoOverlay>,
    /// 控制并发渲染的信号量（限制 CPU 密集型任务数量）
    pub render_semaphore: Arc<Semaphore>,
}

impl AppState {
    /// 根据配置构建共享状态
    pub fn from_config(config: AppConfig) -> Result<Self, reqwest::Error> {
        let client = crate::http::client_with_timeout(config.logo.timeout_duration())?;
        let logo = LogoOverlay::new(client, &config.logo);
        let permits = config.image.effective_parallelism();
        Ok(Self {
            config: Arc::new(config),
            logo: Arc::new(logo),
            render_semaphore: Arc::new(Semaphore::new(permits)),
        })
    }
}
