//! 日志初始化
//!
//! 安装 `tracing-subscriber` fmt 输出（`RUST_LOG` 过滤，默认 `info`），
//! 并通过 `tracing-log` 把 `log` 记录转发到 tracing。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggerError {
    /// 全局 subscriber 已被设置
    #[error("Global tracing subscriber already set: {0}")]
    SubscriberAlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// `log` 转发已被设置
    #[error("Log bridge already set: {0}")]
    LogBridgeAlreadySet(#[from] tracing_log::log_tracer::SetLoggerError),
}

/// 安装全局日志
///
/// # 错误
/// 已有全局 subscriber 或 `log` logger 时返回错误。
pub fn try_init_logger() -> Result<(), LoggerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// 安装全局日志，已安装时静默忽略（可重复调用）
pub fn init_logger() {
    if let Err(e) = try_init_logger() {
        tracing::debug!("Logger not installed: {}", e);
    }
}
