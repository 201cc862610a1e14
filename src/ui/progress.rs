//! 终端进度渲染引擎 (Terminal UI Progress Engine)
//!
//! 基于 `indicatif` 实现非阻塞式进度条编排，事件驱动地同步遍历状态。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::core::event::{CrawlEvent, EventReceiver};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// TUI 状态容器
struct UiState {
    /// 全局运行主状态条
    main_bar: Option<ProgressBar>,
    /// 当前系列进度条
    series_bar: Option<ProgressBar>,
    /// 当前系列名
    series_name: String,
    /// 当前系列已落盘页数
    pages: u64,
}

impl UiState {
    fn new() -> Self {
        Self {
            main_bar: None,
            series_bar: None,
            series_name: String::new(),
            pages: 0,
        }
    }
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::new())))
}

/// 进度协调器 (Progress Orchestrator)
pub struct Ui;

impl Ui {
    /// 激活事件监听循环，启动异步渲染管线
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    /// 执行 UI 状态转换与渲染更新
    fn handle_event(event: CrawlEvent) {
        let multi = get_multi();
        let state = get_state();
        let mut ui = state.write();

        match event {
            CrawlEvent::RunStarted { total_series } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.set_message(format!("📚 {} 个系列待处理", total_series));
                bar.enable_steady_tick(Duration::from_millis(100));
                ui.main_bar = Some(bar);
            }
            CrawlEvent::SeriesStarted { name, page_num, .. } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.set_message(format!("{} · 第 {} 页", truncate_string(&name, 30), page_num));
                bar.enable_steady_tick(Duration::from_millis(100));
                ui.series_bar = Some(bar);
                ui.series_name = name;
                ui.pages = 0;
            }
            CrawlEvent::PageSaved { filename, .. } | CrawlEvent::PageSkipped { filename, .. } => {
                ui.pages += 1;
                let name = ui.series_name.clone();
                let pages = ui.pages;
                if let Some(ref bar) = ui.series_bar {
                    bar.set_message(format!(
                        "{} · {} 页 · {}",
                        truncate_string(&name, 30),
                        pages,
                        truncate_string(&filename, 40)
                    ));
                }
            }
            CrawlEvent::SessionRecycled { reason, .. } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("🔄 RECYCLING: {}", truncate_string(&reason, 60)));
                }
            }
            CrawlEvent::SeriesFinished { name, pages_saved } => {
                if let Some(bar) = ui.series_bar.take() {
                    bar.finish_with_message(format!("✅ {} ({} 页)", name, pages_saved));
                }
            }
            CrawlEvent::SeriesFailed { name, error } => {
                if let Some(bar) = ui.series_bar.take() {
                    bar.abandon_with_message(format!("❌ {}: {}", name, truncate_string(&error, 60)));
                }
            }
            CrawlEvent::RunCompleted => {
                if let Some(ref bar) = ui.main_bar {
                    bar.finish_with_message("✅ COMPLETE");
                }
            }
            CrawlEvent::RunAborted => {
                if let Some(bar) = ui.series_bar.take() {
                    bar.abandon();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.abandon_with_message("⛔ ABORTED");
                }
            }
            _ => {}
        }
    }
}

/// 执行语义化字符串截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
