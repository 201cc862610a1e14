//! 分页爬取引擎 (Pagination Crawl Engine)
//!
//! 逐系列、逐页推进的状态机：加载页面 -> 提取数据 -> 取回内容 ->
//! 落盘 -> 推进游标。会话级故障触发"丢弃重建后原页重试"的恢复路径，
//! 页数阈值触发主动回收。系列之间严格串行。

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::core::config::{ConfigStore, Settings};
use crate::core::error::{CrawlError, Result};
use crate::core::event::{CrawlEvent, EventSender};
use crate::core::model::{CrawlCursor, DownloadBy, Selector, SeriesState};
use crate::engine::resolver;
use crate::interfaces::{PageDriver, SessionProvider};
use crate::network::fetcher::ContentFetcher;
use crate::utils::{file_exists, page_filename, sanitize_component, save_file, strip_fragment, to_absolute_url};

/// 会话主动回收阈值：同一会话处理满这么多页后重建浏览器，
/// 抑制长时间遍历中的累积性资源泄漏
const SESSION_PAGE_LIMIT: u32 = 50;

/// 运行结果：中止是独立的结局，不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// 单页提取结果
struct PageExtract {
    image_url: Option<String>,
    title: Option<String>,
    next: Option<String>,
    origin: String,
}

/// 爬取引擎
pub struct CrawlEngine<P: SessionProvider> {
    provider: P,
    fetcher: ContentFetcher,
    store: ConfigStore,
    settings: Settings,
    shutdown: CancellationToken,
    events: Option<EventSender>,
}

impl<P: SessionProvider> CrawlEngine<P> {
    pub fn new(provider: P, fetcher: ContentFetcher, store: ConfigStore) -> Result<Self> {
        let settings = store.settings()?;
        Ok(Self {
            provider,
            fetcher,
            store,
            settings,
            shutdown: CancellationToken::new(),
            events: None,
        })
    }

    /// 注入优雅退出令牌
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// 注入事件发送器
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(sender) = &self.events {
            sender.emit(event);
        }
    }

    /// 执行整个运行：按配置顺序串行处理各系列
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let series = self.store.series()?;
        let order = series_order(&series, self.settings.download_by);
        self.emit(CrawlEvent::RunStarted {
            total_series: order.len(),
        });

        for index in order {
            // 取消只在迭代边界检查，见 walk_pages 的重试路径
            if self.shutdown.is_cancelled() {
                self.emit(CrawlEvent::RunAborted);
                return Ok(RunOutcome::Aborted);
            }

            let state = series[index].clone();
            if !state.enabled {
                info!("系列已禁用，跳过: {}", state.name);
                self.emit(CrawlEvent::SeriesSkipped {
                    name: state.name,
                    reason: "disabled".into(),
                });
                continue;
            }
            if state.image_selector.is_none() {
                warn!("系列缺少图片选择器，跳过: {}", state.name);
                self.emit(CrawlEvent::SeriesSkipped {
                    name: state.name,
                    reason: "missing image selector".into(),
                });
                continue;
            }

            let name = state.name.clone();
            match self.walk_series(index, state).await {
                Ok(pages) => {
                    info!("系列遍历完成: {} (共 {} 页)", name, pages);
                    self.emit(CrawlEvent::SeriesFinished {
                        name,
                        pages_saved: pages,
                    });
                }
                Err(CrawlError::Aborted) => {
                    self.emit(CrawlEvent::RunAborted);
                    return Ok(RunOutcome::Aborted);
                }
                Err(e) => {
                    error!("系列遍历失败 [{}]: {}", name, e);
                    self.emit(CrawlEvent::SeriesFailed {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.emit(CrawlEvent::RunCompleted);
        Ok(RunOutcome::Completed)
    }

    /// 遍历单个系列；会话在所有退出路径上都被释放
    async fn walk_series(&mut self, index: usize, mut series: SeriesState) -> Result<u64> {
        let dir = PathBuf::from(&self.settings.output_dir).join(&series.name);
        info!(
            "开始遍历系列: {} (自第 {} 页, {})",
            series.name, series.page_num, series.url
        );
        self.emit(CrawlEvent::SeriesStarted {
            name: series.name.clone(),
            start_url: series.url.clone(),
            page_num: series.page_num,
        });

        let mut session = self.provider.open().await?;
        let result = self.walk_pages(index, &mut series, &mut session, &dir).await;
        session.dispose().await;
        result
    }

    /// 逐页状态机主循环
    async fn walk_pages(
        &mut self,
        index: usize,
        series: &mut SeriesState,
        session: &mut P::Session,
        dir: &Path,
    ) -> Result<u64> {
        let image_selector = series
            .image_selector
            .clone()
            .ok_or_else(|| CrawlError::Config(format!("series {} has no image selector", series.name)))?;

        let mut cursor = CrawlCursor::start(series.url.clone(), series.page_num);
        let mut pages: u64 = 0;

        while let Some(target) = cursor.next.clone() {
            if self.shutdown.is_cancelled() {
                return Err(CrawlError::Aborted);
            }

            // 页数阈值触发主动会话回收
            if cursor.pages_since_restart >= SESSION_PAGE_LIMIT {
                info!(
                    "会话已连续处理 {} 页，主动重建浏览器",
                    cursor.pages_since_restart
                );
                self.emit(CrawlEvent::SessionRecycled {
                    series: series.name.clone(),
                    reason: "page threshold".into(),
                });
                session.dispose().await;
                *session = self.provider.open().await?;
                cursor.pages_since_restart = 0;
            }

            // 步骤 2-6：加载并提取。任何非取消异常都丢弃会话、
            // 重建后原页重试 —— 无退避、无次数上限。
            cursor.failures = 0;
            let page = loop {
                if self.shutdown.is_cancelled() {
                    return Err(CrawlError::Aborted);
                }
                match self.extract_page(&*session, &target, &image_selector, series).await {
                    Ok(extract) => break extract,
                    Err(CrawlError::Aborted) => return Err(CrawlError::Aborted),
                    Err(e) => {
                        cursor.failures += 1;
                        warn!(
                            "页面处理失败 (第 {} 次) [{}]: {}，重建会话后重试",
                            cursor.failures, target, e
                        );
                        self.emit(CrawlEvent::SessionRecycled {
                            series: series.name.clone(),
                            reason: e.to_string(),
                        });
                        session.dispose().await;
                        match self.provider.open().await {
                            Ok(fresh) => *session = fresh,
                            // 重建本身失败也不放弃：下一轮重试会再次尝试
                            Err(open_err) => warn!("会话重建失败: {}", open_err),
                        }
                        cursor.pages_since_restart = 0;
                    }
                }
            };

            cursor.current = target;

            // 没有图片即视为档案走到头（或选择器失配），硬停止而非报错
            let Some(image_url) = page.image_url else {
                info!("页面上未解析到图片，系列结束: {}", series.name);
                break;
            };

            // 取回内容；非 2xx 由 `?` 上抛为该系列的错误
            let asset = match self
                .fetcher
                .fetch(&image_url, session.user_agent(), &page.origin)
                .await?
            {
                Some(asset) => asset,
                None => {
                    info!("资源不可取回，系列结束: {}", image_url);
                    break;
                }
            };

            // 写文件：已存在且不覆盖则跳过
            let ext = asset.extension(&self.settings.fallback_extension);
            let filename = page_filename(cursor.page_num, page.title.as_deref(), &ext);
            let path = dir.join(&filename);
            let existed = file_exists(&path).await;

            if existed && !self.settings.overwrite_existing {
                info!("文件已存在，跳过写入: {}", filename);
                self.emit(CrawlEvent::PageSkipped {
                    series: series.name.clone(),
                    filename,
                });
            } else {
                save_file(&path, &asset.bytes).await?;
                if existed {
                    info!("覆盖写入: {}", filename);
                } else {
                    info!("保存: {}", filename);
                }
                self.emit(CrawlEvent::PageSaved {
                    series: series.name.clone(),
                    filename,
                });
            }
            pages += 1;

            // 推进游标并立即落盘，崩溃后重启不会漏页
            if self.settings.update_config {
                series.url = cursor.current.clone();
                series.page_num = cursor.page_num;
                self.store
                    .record_progress(index, &series.url, series.page_num)?;
            }

            // 归一化下一页；缺席或自指即终止（环路保护）
            cursor.next = page
                .next
                .map(|n| strip_fragment(&n))
                .filter(|n| !n.is_empty() && *n != cursor.current);
            if cursor.next.is_some() {
                cursor.page_num += 1;
                cursor.pages_since_restart += 1;
            }
        }

        Ok(pages)
    }

    /// 步骤 2-6：加载页面并提取图片地址、标题与下一页链接
    async fn extract_page(
        &self,
        session: &P::Session,
        url: &str,
        image_selector: &Selector,
        series: &SeriesState,
    ) -> Result<PageExtract> {
        session.navigate(url).await?;
        session.settle(self.settings.delay_duration()).await;

        let base = Url::parse(url).ok();
        let absolutize = |link: String| match &base {
            Some(base) => to_absolute_url(base, &link),
            None => link,
        };

        let candidates = session.query_image_candidates(image_selector).await?;
        let image_url = resolver::resolve_all(&candidates)
            .into_iter()
            .next()
            .map(|link| absolutize(link));

        let title = match &series.title_selector {
            Some(selector) => session
                .query_text(selector)
                .await?
                .map(|t| sanitize_component(&t))
                .filter(|t| !t.is_empty()),
            None => None,
        };

        let next = match &series.next_selector {
            Some(selector) => session
                .query_attribute(selector, "href")
                .await?
                .map(|link| absolutize(link))
                .filter(|h| !h.is_empty()),
            None => None,
        };

        let origin = session.origin().await?;

        Ok(PageExtract {
            image_url,
            title,
            next,
            origin,
        })
    }
}

/// 系列处理顺序：声明序 / 名称升序 / 名称降序
pub fn series_order(series: &[SeriesState], by: DownloadBy) -> Vec<usize> {
    let mut order: Vec<usize> = (0..series.len()).collect();
    match by {
        DownloadBy::Order => {}
        DownloadBy::NameAsc => order.sort_by(|&a, &b| series[a].name.cmp(&series[b].name)),
        DownloadBy::NameDesc => order.sort_by(|&a, &b| series[b].name.cmp(&series[a].name)),
    }
    order
}
