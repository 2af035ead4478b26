//! 命令定义和实现

pub mod config;
pub mod monitor;
pub mod query;
pub mod scan;

pub use config::ConfigCommand;
pub use monitor::MonitorCommand;
pub use query::QueryKind;
pub use scan::ScanCommand;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 安装 Ctrl-C 处理，返回运行标志
pub(crate) fn install_ctrlc() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("设置 Ctrl-C 处理失败")?;
    Ok(running)
}
