use std::time::Duration;

use server_api::{
    list_performances, performance_detail,
    upstream::{KopisClient, UpstreamConfig},
    ApiContext,
};
use shared::{
    domain::{ListingQuery, PerformanceId},
    error::ErrorCode,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SINGLE: &str = include_str!("fixtures/listing_single.xml");
const MANY: &str = include_str!("fixtures/listing_many.xml");
const EMPTY: &str = include_str!("fixtures/listing_empty.xml");
const DETAIL: &str = include_str!("fixtures/detail.xml");

fn context(base_url: &str, timeout: Duration) -> ApiContext {
    let upstream = KopisClient::new(UpstreamConfig {
        base_url: base_url.to_string(),
        timeout,
        ..UpstreamConfig::default()
    })
    .expect("client");
    ApiContext { upstream }
}

fn xml(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/xml;charset=UTF-8")
}

#[tokio::test]
async fn listing_forwards_parameters_and_normalizes_many_records() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pblprfr"))
        .and(query_param("service", "ABC"))
        .and(query_param("stdate", "20241201"))
        .and(query_param("eddate", "20241231"))
        .and(query_param("cpage", "1"))
        .and(query_param("rows", "20"))
        .and(query_param("sharea", "11"))
        .and(header("user-agent", "Mozilla/5.0"))
        .respond_with(xml(MANY))
        .expect(1)
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let response = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect("listing");

    assert!(response.success);
    assert_eq!(response.count, 2);
    assert_eq!(response.count, response.performances.len());
    assert_eq!(response.performances[0].get("mt20id"), Some("PF132236"));
    assert_eq!(response.performances[1].get("mt20id"), Some("PF132240"));
}

#[tokio::test]
async fn single_record_listing_is_a_list_of_one() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pblprfr"))
        .respond_with(xml(SINGLE))
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let response = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect("listing");

    assert_eq!(response.count, 1);
    assert_eq!(response.performances.len(), 1);
    assert_eq!(response.performances[0].get("prfnm"), Some("햄릿"));
}

#[tokio::test]
async fn empty_envelope_is_a_successful_empty_listing() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml(EMPTY))
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let response = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect("listing");

    assert!(response.success);
    assert_eq!(response.count, 0);
    assert!(response.performances.is_empty());
}

#[tokio::test]
async fn genre_is_forwarded_as_shcate() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pblprfr"))
        .and(query_param("shcate", "AAAA"))
        .and(query_param("sharea", "26"))
        .respond_with(xml(EMPTY))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut query = ListingQuery::new("ABC");
    query.genre = Some("AAAA".into());
    query.sharea = "26".into();

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    list_performances(&ctx, query).await.expect("listing");
}

#[tokio::test]
async fn slow_upstream_is_reported_as_timeout() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml(MANY).set_delay(Duration::from_millis(800)))
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_millis(100));
    let err = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect_err("must time out");
    assert_eq!(err.code, ErrorCode::UpstreamTimeout);
}

#[tokio::test]
async fn non_envelope_body_is_malformed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml("<html><body>maintenance</body></html>"))
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let err = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::UpstreamMalformed);
}

#[tokio::test]
async fn unparseable_body_is_malformed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml("<dbs><db><mt20id>PF1</db></dbs>"))
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let err = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::UpstreamMalformed);
}

#[tokio::test]
async fn error_status_is_an_upstream_failure_even_with_xml_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_raw(EMPTY.as_bytes().to_vec(), "text/xml;charset=UTF-8"),
        )
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let err = list_performances(&ctx, ListingQuery::new("ABC"))
        .await
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::UpstreamFailure);
    assert!(err.message.contains("503"), "{}", err.message);
}

#[tokio::test]
async fn refused_connection_is_an_upstream_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let uri = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let ctx = context(&uri, Duration::from_secs(5));
    let err = list_performances(&ctx, ListingQuery::new("SECRET"))
        .await
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::UpstreamFailure);
    assert!(!err.message.contains("SECRET"), "{}", err.message);
}

#[tokio::test]
async fn detail_returns_a_flat_record() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pblprfr/PF132236"))
        .and(query_param("service", "ABC"))
        .respond_with(xml(DETAIL))
        .expect(1)
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_secs(5));
    let response = performance_detail(&ctx, PerformanceId("PF132236".into()), "ABC")
        .await
        .expect("detail");

    assert!(response.success);
    let performance = &response.performance;
    assert_eq!(performance.get("mt20id"), Some("PF132236"));
    assert_eq!(performance.get("prfcrew"), Some(""));
    assert_eq!(
        performance.0["styurls"]["styurl"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );
    assert_eq!(
        performance.0["relates"]["relate"]["relatenm"],
        serde_json::json!("NOL티켓")
    );
}

#[tokio::test]
async fn detail_timeout_is_reported_as_timeout() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml(DETAIL).set_delay(Duration::from_millis(800)))
        .mount(&upstream)
        .await;

    let ctx = context(&upstream.uri(), Duration::from_millis(100));
    let err = performance_detail(&ctx, PerformanceId("PF132236".into()), "ABC")
        .await
        .expect_err("must time out");
    assert_eq!(err.code, ErrorCode::UpstreamTimeout);
}
