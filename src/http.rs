use reqwest::Client;
use std::time::Duration;

/// 回源请求统一的 User-Agent，便于 Logo 源站识别。
const USER_AGENT: &str = concat!("qrgen-service/", env!("CARGO_PKG_VERSION"));

/// 建连阶段的超时上限（整体超时更短时取整体超时）。
const CONNECT_TIMEOUT_CAP: Duration = Duration::from_secs(5);

/// 构建带整体超时的 HTTP Client。
///
/// `Client` 内部自带连接池且线程安全，应在启动期构建一次并放入共享状态复用。
pub fn client_with_timeout(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT_CAP))
        .build()
}
