/// 健康检查
pub mod health;
/// 二维码生成
pub mod qr;
