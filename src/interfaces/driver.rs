//! 会话能力接口
//!
//! 引擎只通过这组窄接口驱动浏览器会话：页面加载、元素查询、生命周期。
//! 生产实现基于 chromiumoxide，测试实现为脚本化假会话。

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{ImageAttrs, Selector};

/// 单个浏览器会话的页面驱动能力
///
/// 失败语义：元素查不到、引用失效一律折算为 `Ok(None)` / 空集，
/// 只有会话整体不可用（浏览器进程没了、句柄已关闭）才返回 Err，
/// 由调用方丢弃本会话并重建。
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 加载页面。先尽力导航到空白页促使上一页资源释放（失败忽略），
    /// 加载完成后滚动到底部，让懒加载内容可查询。
    async fn navigate(&self, url: &str) -> Result<()>;

    /// 等待动态内容安定；尽力而为，不保证就绪
    async fn settle(&self, delay: Duration);

    /// 当前页面的 origin (scheme+host)，之后作为 Referer 使用
    async fn origin(&self) -> Result<String>;

    /// 会话创建时探测到的 User-Agent
    fn user_agent(&self) -> &str;

    /// 匹配元素的可见文本（trim 后）；XPath 携带 attribute 时
    /// 直接返回该属性值。缺席或 trim 后为空均为 None。
    async fn query_text(&self, selector: &Selector) -> Result<Option<String>>;

    /// 匹配元素的指定属性值；缺席为 None
    async fn query_attribute(
        &self,
        selector: &Selector,
        attribute: &str,
    ) -> Result<Option<String>>;

    /// 全部匹配图片元素的原始属性包，按文档顺序
    async fn query_image_candidates(&self, selector: &Selector) -> Result<Vec<ImageAttrs>>;

    /// 幂等释放；多次调用或析构期间调用都不得出错
    async fn dispose(&mut self);
}

/// 会话工厂：每次 open 产出一个全新的会话实例
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: PageDriver;

    async fn open(&self) -> Result<Self::Session>;
}
