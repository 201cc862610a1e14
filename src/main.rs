//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖注入及系统生命周期管理。

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

use panelgrab::core::config::ConfigStore;
use panelgrab::core::event::create_event_channel;
use panelgrab::engine::{CrawlEngine, RunOutcome};
use panelgrab::network::browser::BrowserService;
use panelgrab::network::fetcher::ContentFetcher;
use panelgrab::ui::{Ui, get_multi};

/// 进度条感知的日志写入器 (TUI-aware Log Writer)
///
/// 确保非同步日志输出不会破坏终端进度条的渲染布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 按配置文件执行漫画档案遍历
    Run {
        /// 配置与进度存储路径（不存在时生成默认骨架）
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 遥测层初始化 (Telemetry Layer Initialization)
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let store = ConfigStore::open(&config)?;
            let settings = store.settings()?;

            // 建立 UI 事件反馈链路 (Event feedback loop)
            let (event_sender, event_receiver) = create_event_channel();
            let ui_handle = Ui::run(event_receiver);

            // 任务域限制 (Scope isolation for proper RAII cleanup)
            let outcome = {
                // 信号处理与优雅退出 (Signal Handling)
                let shutdown = CancellationToken::new();
                let shutdown_clone = shutdown.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("收到中断信号，将在当前页面边界停止...");
                        shutdown_clone.cancel();
                    }
                });

                let provider = BrowserService::new(settings.browser.clone());
                let mut engine = CrawlEngine::new(provider, ContentFetcher::new(), store)?
                    .with_shutdown(shutdown)
                    .with_events(event_sender);

                engine.run().await?
            };

            // 事件发送端随 engine 析构关闭，UI 循环随之退出
            let _ = ui_handle.await;

            match outcome {
                RunOutcome::Completed => tracing::info!("Complete"),
                RunOutcome::Aborted => tracing::info!("Aborted"),
            }
        }
    }

    Ok(())
}
