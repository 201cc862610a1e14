//! 领域数据模型 (Domain Model)
//!
//! 定义选择器、漫画系列状态、游标以及下载产物等核心结构。

use std::str::FromStr;

use bon::Builder;
use bytes::Bytes;
use serde::de::Error as DeError;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// DOM 定位策略 (Locator Strategy)
///
/// 封闭枚举；未识别的标签回退为 [`Strategy::Id`]，
/// 这是有意的宽容默认，而非错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Strategy {
    #[strum(to_string = "id")]
    Id,
    #[strum(to_string = "xpath")]
    XPath,
    #[strum(to_string = "link_text", serialize = "link text")]
    LinkText,
    #[strum(to_string = "partial_link_text", serialize = "partial link text")]
    PartialLinkText,
    #[strum(to_string = "name")]
    Name,
    #[strum(to_string = "tag_name", serialize = "tag name")]
    TagName,
    #[strum(to_string = "class_name", serialize = "class name")]
    ClassName,
    #[strum(to_string = "css_selector", serialize = "css selector", serialize = "css")]
    CssSelector,
}

impl Strategy {
    /// 解析策略标签，未知标签回退为 Id
    pub fn from_tag(tag: &str) -> Self {
        Self::from_str(tag.trim()).unwrap_or(Self::Id)
    }
}

/// 可执行的 DOM 查询形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomQuery {
    Css(String),
    XPath(String),
}

/// 声明式元素选择器
///
/// 配置中序列化为 2 或 3 元素数组：`[strategy, value[, attribute]]`。
/// XPath 值若携带 `/@attr` 后缀，会在构造时归一化为显式 attribute。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub strategy: Strategy,
    pub value: String,
    pub attribute: Option<String>,
}

impl Selector {
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self::normalize(strategy, value.into(), None)
    }

    pub fn with_attribute(
        strategy: Strategy,
        value: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::normalize(strategy, value.into(), Some(attribute.into()))
    }

    /// 从配置数组构造
    pub fn from_parts(parts: &[String]) -> Result<Self, String> {
        if parts.len() < 2 {
            return Err("selector requires [strategy, value]".into());
        }
        let attribute = parts
            .get(2)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Ok(Self::normalize(
            Strategy::from_tag(&parts[0]),
            parts[1].clone(),
            attribute,
        ))
    }

    fn normalize(strategy: Strategy, value: String, attribute: Option<String>) -> Self {
        // XPath 内联属性后缀: "//img[@id='x']/@alt" -> ("//img[@id='x']", "alt")
        if strategy == Strategy::XPath
            && attribute.is_none()
            && let Some((expr, attr)) = value.rsplit_once("/@")
        {
            let attr = attr.trim();
            if !attr.is_empty() && !expr.is_empty() {
                return Self {
                    strategy,
                    value: expr.to_string(),
                    attribute: Some(attr.to_string()),
                };
            }
        }
        Self {
            strategy,
            value,
            attribute,
        }
    }

    /// 编译为可执行查询
    pub fn to_query(&self) -> DomQuery {
        match self.strategy {
            Strategy::Id => DomQuery::Css(format!("[id={}]", css_string(&self.value))),
            Strategy::Name => DomQuery::Css(format!("[name={}]", css_string(&self.value))),
            Strategy::ClassName => DomQuery::Css(format!("[class~={}]", css_string(&self.value))),
            Strategy::TagName | Strategy::CssSelector => DomQuery::Css(self.value.clone()),
            Strategy::XPath => DomQuery::XPath(self.value.clone()),
            Strategy::LinkText => DomQuery::XPath(format!(
                "//a[normalize-space(.)={}]",
                xpath_literal(&self.value)
            )),
            Strategy::PartialLinkText => DomQuery::XPath(format!(
                "//a[contains(normalize-space(.), {})]",
                xpath_literal(&self.value)
            )),
        }
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.attribute.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.strategy.to_string())?;
        seq.serialize_element(&self.value)?;
        if let Some(attr) = &self.attribute {
            seq.serialize_element(attr)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<String>::deserialize(deserializer)?;
        Selector::from_parts(&parts).map_err(D::Error::custom)
    }
}

/// 转义为带引号的 CSS 字符串字面量
fn css_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// 构造 XPath 字符串字面量，处理混合引号
fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        let parts: Vec<String> = value
            .split('"')
            .map(|p| format!("\"{}\"", p))
            .collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

/// 系列遍历顺序
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DownloadBy {
    #[default]
    Order,
    NameDesc,
    NameAsc,
}

/// 单个漫画系列的持久化状态
///
/// `url` 与 `page_num` 构成断点续传游标：仅在一页完整处理成功、
/// 且 `update_config` 开启时才会被推进并落盘。
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct SeriesState {
    #[serde(default = "default_enabled")]
    #[builder(default = true)]
    pub enabled: bool,

    pub name: String,

    /// 游标：最近一次成功处理的页面地址
    pub url: String,

    /// 游标：输出文件编号，仅在推进到新页面时 +1
    #[serde(default = "default_page_num")]
    #[builder(default = 1)]
    pub page_num: u32,

    pub image_selector: Option<Selector>,
    #[serde(default)]
    pub title_selector: Option<Selector>,
    #[serde(default)]
    pub next_selector: Option<Selector>,
}

fn default_enabled() -> bool {
    true
}
fn default_page_num() -> u32 {
    1
}

/// 单页遍历的瞬态游标
#[derive(Debug, Clone)]
pub struct CrawlCursor {
    /// 当前已加载页面
    pub current: String,
    /// 下一页地址；None 终止遍历
    pub next: Option<String>,
    /// 输出编号
    pub page_num: u32,
    /// 自上次会话重建以来处理的页数，驱动主动回收
    pub pages_since_restart: u32,
    /// 当前页面的连续失败次数，仅用于日志
    pub failures: u32,
}

impl CrawlCursor {
    pub fn start(url: String, page_num: u32) -> Self {
        Self {
            current: url.clone(),
            next: Some(url),
            page_num,
            pages_since_restart: 0,
            failures: 0,
        }
    }
}

/// 单个图片元素的原始属性包
///
/// 由 PageDriver 采集，交给 resolver 解析出唯一下载地址。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAttrs {
    pub src: Option<String>,
    pub srcset: Option<String>,
    pub width: Option<String>,
    pub data_orig_file: Option<String>,
    pub data_image: Option<String>,
}

/// 下载产物：字节 + 声明的内容类型
#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    pub bytes: Bytes,
    pub content_type: String,
}

impl DownloadedAsset {
    /// 推导文件扩展名（不带点）；无法映射时使用配置的回退值
    pub fn extension(&self, fallback: &str) -> String {
        extension_for(&self.content_type, fallback)
    }
}

/// 内容类型到扩展名的确定性映射
pub fn extension_for(content_type: &str, fallback: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let mapped = match essence.as_str() {
        // 未知内容的占位类型，视为未映射
        "" | "application/octet-stream" => None,
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" => Some("bmp"),
        _ => mime_guess::get_mime_extensions_str(&essence)
            .and_then(|exts| exts.first())
            .copied(),
    };

    mapped
        .unwrap_or(fallback.trim_start_matches('.'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_strategy_falls_back_to_id() {
        assert_eq!(Strategy::from_tag("id"), Strategy::Id);
        assert_eq!(Strategy::from_tag("class_name"), Strategy::ClassName);
        assert_eq!(Strategy::from_tag("class name"), Strategy::ClassName);
        assert_eq!(Strategy::from_tag("telepathy"), Strategy::Id);
        assert_eq!(Strategy::from_tag(""), Strategy::Id);
    }

    #[test]
    fn selector_parses_two_and_three_parts() {
        let s = Selector::from_parts(&["id".into(), "cc-comic".into()]).unwrap();
        assert_eq!(s.strategy, Strategy::Id);
        assert_eq!(s.value, "cc-comic");
        assert!(s.attribute.is_none());

        let s =
            Selector::from_parts(&["xpath".into(), "//img[@id='c']".into(), "alt".into()]).unwrap();
        assert_eq!(s.attribute.as_deref(), Some("alt"));

        assert!(Selector::from_parts(&["id".into()]).is_err());
    }

    #[test]
    fn xpath_attribute_suffix_is_normalized() {
        let s = Selector::new(Strategy::XPath, "//img[@id='cc-comic']/@alt");
        assert_eq!(s.value, "//img[@id='cc-comic']");
        assert_eq!(s.attribute.as_deref(), Some("alt"));

        // 非 XPath 策略不做归一化
        let s = Selector::new(Strategy::CssSelector, "a/@b");
        assert!(s.attribute.is_none());
    }

    #[test]
    fn selector_serde_round_trip() {
        let s = Selector::with_attribute(Strategy::XPath, "//img", "alt");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"["xpath","//img","alt"]"#);
        let back: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);

        let s: Selector = serde_json::from_str(r#"["class_name","cc-next"]"#).unwrap();
        assert_eq!(s.strategy, Strategy::ClassName);
    }

    #[test]
    fn query_compilation() {
        assert_eq!(
            Selector::new(Strategy::Id, "cc-comic").to_query(),
            DomQuery::Css(r#"[id="cc-comic"]"#.into())
        );
        assert_eq!(
            Selector::new(Strategy::ClassName, "cc-next").to_query(),
            DomQuery::Css(r#"[class~="cc-next"]"#.into())
        );
        assert_eq!(
            Selector::new(Strategy::TagName, "img").to_query(),
            DomQuery::Css("img".into())
        );
        assert_eq!(
            Selector::new(Strategy::LinkText, "Next").to_query(),
            DomQuery::XPath(r#"//a[normalize-space(.)="Next"]"#.into())
        );
        match Selector::new(Strategy::PartialLinkText, r#"say "next""#).to_query() {
            DomQuery::XPath(x) => assert!(x.starts_with("//a[contains(")),
            q => panic!("unexpected query: {q:?}"),
        }
    }

    #[test]
    fn download_by_parses_known_tags_only() {
        use std::str::FromStr;
        assert_eq!(DownloadBy::from_str("order").unwrap(), DownloadBy::Order);
        assert_eq!(
            DownloadBy::from_str("name_desc").unwrap(),
            DownloadBy::NameDesc
        );
        assert!(DownloadBy::from_str("shuffle").is_err());
    }

    #[test]
    fn extension_mapping_is_deterministic() {
        assert_eq!(extension_for("image/png", "png"), "png");
        assert_eq!(extension_for("image/jpeg; charset=binary", "png"), "jpg");
        assert_eq!(extension_for("application/x-mystery", "png"), "png");
        assert_eq!(extension_for("application/octet-stream", "png"), "png");
        assert_eq!(extension_for("application/x-mystery", ".gif"), "gif");
    }
}
