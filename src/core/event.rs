//! 事件系统定义
//!
//! 用于 Engine 与 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

/// 爬取事件类型
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// 运行开始
    RunStarted { total_series: usize },

    /// 系列开始遍历
    SeriesStarted {
        name: String,
        start_url: String,
        page_num: u32,
    },

    /// 系列被跳过（禁用或缺少图片选择器）
    SeriesSkipped { name: String, reason: String },

    /// 页面文件已写入
    PageSaved { series: String, filename: String },

    /// 页面文件已存在且不覆盖，跳过写入
    PageSkipped { series: String, filename: String },

    /// 浏览器会话被回收重建
    SessionRecycled { series: String, reason: String },

    /// 系列遍历结束
    SeriesFinished { name: String, pages_saved: u64 },

    /// 系列遍历失败（运行继续处理后续系列）
    SeriesFailed { name: String, error: String },

    /// 运行正常结束
    RunCompleted,

    /// 运行被用户中止
    RunAborted,
}

/// 事件发送器
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<CrawlEvent>,
}

impl EventSender {
    pub fn emit(&self, event: CrawlEvent) {
        // UI 掉线不影响采集主流程
        let _ = self.tx.send(event);
    }
}

/// 事件接收器
#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: Receiver<CrawlEvent>,
}

impl EventReceiver {
    pub async fn recv_async(&self) -> Option<CrawlEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender { tx }, EventReceiver { rx })
}
