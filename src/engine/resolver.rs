//! 图片地址解析器 (Image Resolver)
//!
//! 把一个图片元素的原始属性包折算成唯一的可下载地址，
//! 处理 CMS 专有属性与响应式 srcset 候选集。

use crate::core::model::ImageAttrs;

/// 解析 srcset 候选列表，按宽度降序返回 `(width, url)`
///
/// 候选格式 `url 640w`；宽度非数字或缺少 `w` 单位的候选被跳过，不报错。
pub fn parse_srcset(srcset: &str) -> Vec<(u64, String)> {
    let mut candidates: Vec<(u64, String)> = srcset
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split_whitespace();
            let url = pieces.next()?;
            let descriptor = pieces.next()?;
            let width = descriptor.strip_suffix('w')?.parse::<u64>().ok()?;
            Some((width, url.to_string()))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    candidates
}

/// 对单个元素执行解析，首个命中规则获胜：
/// 1. data-orig-file  2. data-image
/// 3. 渲染宽度小于最大 srcset 候选时取该候选
/// 4. src  5. 幸存的最大 srcset 候选
pub fn resolve_one(attrs: &ImageAttrs) -> Option<String> {
    for cms_attr in [&attrs.data_orig_file, &attrs.data_image] {
        if let Some(value) = cms_attr
            && !value.is_empty()
        {
            return Some(value.clone());
        }
    }

    let candidates = attrs
        .srcset
        .as_deref()
        .map(parse_srcset)
        .unwrap_or_default();

    if let Some((largest_width, largest_url)) = candidates.first()
        && let Some(rendered) = attrs
            .width
            .as_deref()
            .and_then(|w| w.trim().parse::<u64>().ok())
        && rendered < *largest_width
    {
        return Some(largest_url.clone());
    }

    if let Some(src) = &attrs.src
        && !src.is_empty()
    {
        return Some(src.clone());
    }

    candidates.into_iter().next().map(|(_, url)| url)
}

/// 解析整个匹配集：逐元素解析后保序去重
pub fn resolve_all(elements: &[ImageAttrs]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    elements
        .iter()
        .filter_map(resolve_one)
        .filter(|url| !url.is_empty() && seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> ImageAttrs {
        ImageAttrs::default()
    }

    #[test]
    fn cms_attributes_win() {
        let a = ImageAttrs {
            data_orig_file: Some("orig.png".into()),
            data_image: Some("cms.png".into()),
            src: Some("small.png".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("orig.png"));

        let a = ImageAttrs {
            data_orig_file: Some(String::new()),
            data_image: Some("cms.png".into()),
            src: Some("small.png".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("cms.png"));
    }

    #[test]
    fn larger_srcset_candidate_beats_rendered_width() {
        let a = ImageAttrs {
            src: Some("direct.jpg".into()),
            srcset: Some("a.jpg 320w, b.jpg 800w".into()),
            width: Some("400".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("b.jpg"));
    }

    #[test]
    fn src_wins_when_rendered_width_covers_candidates() {
        let a = ImageAttrs {
            src: Some("direct.jpg".into()),
            srcset: Some("a.jpg 320w, b.jpg 800w".into()),
            width: Some("900".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("direct.jpg"));

        // src 缺席时回退到最大候选
        let a = ImageAttrs {
            srcset: Some("a.jpg 320w, b.jpg 800w".into()),
            width: Some("900".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("b.jpg"));
    }

    #[test]
    fn equal_width_prefers_src() {
        let a = ImageAttrs {
            src: Some("direct.jpg".into()),
            srcset: Some("b.jpg 800w".into()),
            width: Some("800".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("direct.jpg"));
    }

    #[test]
    fn malformed_srcset_tokens_are_skipped() {
        let parsed = parse_srcset("a.jpg 320w, b.jpg oops, c.jpg 12x, d.jpg, e.jpg 640w");
        assert_eq!(
            parsed,
            vec![(640, "e.jpg".to_string()), (320, "a.jpg".to_string())]
        );
    }

    #[test]
    fn unparsable_rendered_width_is_ignored() {
        let a = ImageAttrs {
            src: Some("direct.jpg".into()),
            srcset: Some("b.jpg 800w".into()),
            width: Some("wide".into()),
            ..attrs()
        };
        assert_eq!(resolve_one(&a).as_deref(), Some("direct.jpg"));
    }

    #[test]
    fn multi_match_dedup_preserves_first_seen_order() {
        let one = ImageAttrs {
            src: Some("x.png".into()),
            ..attrs()
        };
        let two = ImageAttrs {
            src: Some("y.png".into()),
            ..attrs()
        };
        let dup = one.clone();
        assert_eq!(
            resolve_all(&[one, two, dup]),
            vec!["x.png".to_string(), "y.png".to_string()]
        );
    }

    #[test]
    fn empty_bag_resolves_to_none() {
        assert_eq!(resolve_one(&attrs()), None);
        assert!(resolve_all(&[]).is_empty());
    }
}
