use std::path::Path;

use tokio::fs;
use url::Url;

/// 把页面上提取到的 href/src 归一化为绝对地址
pub fn to_absolute_url(base: &Url, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }

    if let Some(path_without_slashes) = href.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), path_without_slashes);
    }

    if href.starts_with("http://") || href.starts_with("https://") || href.starts_with("data:") {
        return href.to_string();
    }

    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// 丢弃 URL 的 fragment 部分
pub fn strip_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

/// 清理标题为合法的路径分量：剔除非法字符与控制符，修剪首尾
pub fn sanitize_component(raw: &str) -> String {
    const MAX_LEN: usize = 150;

    let cleaned: String = raw
        .chars()
        .filter(|c| {
            !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        })
        .collect();

    let trimmed = cleaned.trim().trim_end_matches('.').trim();
    trimmed.chars().take(MAX_LEN).collect()
}

/// 页面输出文件名：`{page_num:05}[ - title].{ext}`
pub fn page_filename(page_num: u32, title: Option<&str>, ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    match title.filter(|t| !t.is_empty()) {
        Some(title) => format!("{:05} - {}.{}", page_num, title, ext),
        None => format!("{:05}.{}", page_num, ext),
    }
}

pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub async fn save_file(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_deterministic_and_zero_padded() {
        assert_eq!(page_filename(1, None, "png"), "00001.png");
        assert_eq!(page_filename(1, None, ".png"), "00001.png");
        assert_eq!(
            page_filename(42, Some("The Heist"), "jpg"),
            "00042 - The Heist.jpg"
        );
        assert_eq!(page_filename(99999, None, "gif"), "99999.gif");
        assert_eq!(page_filename(7, Some(""), "png"), "00007.png");
    }

    #[test]
    fn sanitize_strips_illegal_path_characters() {
        assert_eq!(sanitize_component("A/B\\C:D*E?F\"G<H>I|J"), "ABCDEFGHIJ");
        assert_eq!(sanitize_component("  spaced out  "), "spaced out");
        assert_eq!(sanitize_component("dots..."), "dots");
        assert_eq!(sanitize_component("tab\there"), "tabhere");
    }

    #[test]
    fn fragment_is_discarded() {
        assert_eq!(
            strip_fragment("https://example.com/p/2#comments"),
            "https://example.com/p/2"
        );
        assert_eq!(
            strip_fragment("https://example.com/p/2"),
            "https://example.com/p/2"
        );
        assert_eq!(strip_fragment("not a url#frag"), "not a url");
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("https://comic.example.com/archive/p1.html").unwrap();
        assert_eq!(
            to_absolute_url(&base, "p2.html"),
            "https://comic.example.com/archive/p2.html"
        );
        assert_eq!(
            to_absolute_url(&base, "//cdn.example.com/i.png"),
            "https://cdn.example.com/i.png"
        );
        assert_eq!(
            to_absolute_url(&base, "https://other.example.com/x"),
            "https://other.example.com/x"
        );
        assert!(to_absolute_url(&base, "data:image/png;base64,AA==").starts_with("data:"));
        assert_eq!(to_absolute_url(&base, ""), "");
    }
}
