//! 内容获取器集成测试
//!
//! 用 wiremock 固定 HTTP 行为：请求头注入、非 2xx 语义与 scheme 过滤。

use base64::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use panelgrab::core::error::CrawlError;
use panelgrab::network::fetcher::ContentFetcher;

const UA: &str = "TestAgent/2.0";
const REFERER: &str = "https://origin.test";

#[tokio::test]
async fn get_sends_user_agent_and_referer() {
    let server = MockServer::start().await;
    let payload = b"\xff\xd8\xff jpeg bytes";

    Mock::given(method("GET"))
        .and(path("/strip.jpg"))
        .and(header("user-agent", UA))
        .and(header("referer", REFERER))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(payload.as_slice()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new();
    let asset = fetcher
        .fetch(&format!("{}/strip.jpg", server.uri()), UA, REFERER)
        .await
        .unwrap()
        .expect("asset");

    assert_eq!(asset.bytes.as_ref(), payload.as_slice());
    assert_eq!(asset.content_type, "image/jpeg");
    assert_eq!(asset.extension("png"), "jpg");
}

#[tokio::test]
async fn non_2xx_status_is_a_fatal_fetch_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new();
    let result = fetcher
        .fetch(&format!("{}/gone.png", server.uri()), UA, REFERER)
        .await;

    assert!(matches!(result, Err(CrawlError::Network(_))));
}

#[tokio::test]
async fn missing_content_type_falls_back_to_octet_stream() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/mystery"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"??".as_slice()))
        .mount(&server)
        .await;

    let fetcher = ContentFetcher::new();
    let asset = fetcher
        .fetch(&format!("{}/mystery", server.uri()), UA, REFERER)
        .await
        .unwrap()
        .expect("asset");

    assert_eq!(asset.content_type, "application/octet-stream");
    // 无法映射时采用配置的回退扩展名
    assert_eq!(asset.extension("png"), "png");
}

#[tokio::test]
async fn unsupported_scheme_yields_no_asset() {
    let fetcher = ContentFetcher::new();
    assert!(
        fetcher
            .fetch("ftp://archive.fake/strip.png", UA, REFERER)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        fetcher
            .fetch("not a url at all", UA, REFERER)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn inline_data_url_decodes_without_network() {
    let payload = b"png-ish bytes";
    let url = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(payload));

    let fetcher = ContentFetcher::new();
    let asset = fetcher.fetch(&url, UA, REFERER).await.unwrap().expect("asset");

    assert_eq!(asset.bytes.as_ref(), payload.as_slice());
    assert_eq!(asset.content_type, "image/png");
}

#[tokio::test]
async fn malformed_inline_payload_yields_no_asset() {
    let fetcher = ContentFetcher::new();
    assert!(
        fetcher
            .fetch("data:image/png;base64,@@@", UA, REFERER)
            .await
            .unwrap()
            .is_none()
    );
    // 仅支持 base64 编码
    assert!(
        fetcher
            .fetch("data:text/plain,hello", UA, REFERER)
            .await
            .unwrap()
            .is_none()
    );
}
