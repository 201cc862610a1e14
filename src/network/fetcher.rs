//! 内容获取器 (Content Fetcher)
//!
//! 把解析出的图片地址变成字节：普通网络地址走 HTTP GET，
//! 内联 `data:` 地址就地解码。其他 scheme 一律视为"无资源"。

use base64::prelude::*;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use url::Url;

use crate::core::error::Result;
use crate::core::model::DownloadedAsset;

pub struct ContentFetcher {
    client: reqwest::Client,
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// 取回资源字节与内容类型
    ///
    /// `Ok(None)` 表示该地址不是可取回的资源（scheme 不支持、解码失败），
    /// 调用方以"档案走到头"收尾。非 2xx 响应对当前页面是致命错误。
    pub async fn fetch(
        &self,
        url: &str,
        user_agent: &str,
        referer: &str,
    ) -> Result<Option<DownloadedAsset>> {
        if let Some(inline) = url.strip_prefix("data:") {
            return Ok(decode_inline(inline));
        }

        let Ok(parsed) = Url::parse(url) else {
            return Ok(None);
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Ok(None);
        }

        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, user_agent)
            .header(REFERER, referer)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response.bytes().await?;
        Ok(Some(DownloadedAsset {
            bytes,
            content_type,
        }))
    }
}

/// 解码内联 data URL：`mediatype;base64,payload`，仅支持 base64 编码
fn decode_inline(rest: &str) -> Option<DownloadedAsset> {
    let (meta, payload) = rest.split_once(',')?;
    let mediatype = meta.strip_suffix(";base64")?;
    let bytes = BASE64_STANDARD.decode(payload.trim()).ok()?;

    let content_type = if mediatype.is_empty() {
        "application/octet-stream".to_string()
    } else {
        mediatype.to_string()
    };

    Some(DownloadedAsset {
        bytes: Bytes::from(bytes),
        content_type,
    })
}
