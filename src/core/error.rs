//! 错误处理体系 (Error Handling System)
//!
//! 定义领域相关的错误类型以及全局 Result 别名。

use thiserror::Error;

/// 全局错误定义 (Crawler Domain Errors)
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 浏览器会话级故障：进程退出、传输断开、句柄已关闭。
    /// 捕获方需要丢弃并重建会话。
    #[error("Browser session fault: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 用户主动取消。必须穿透所有重试边界，不得被吞掉。
    #[error("Run aborted by user")]
    Aborted,

    #[error("Other error: {0}")]
    Custom(String),
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, CrawlError>;
