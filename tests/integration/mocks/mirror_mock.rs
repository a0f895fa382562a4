use gateway_pricing::pricing::loader::calculate_hash;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const PRICING_PATH: &str = "/model_prices_and_context_window.json";
pub const HASH_PATH: &str = "/model_prices_and_context_window.sha256";

/// 启动价格镜像 mock,提供文档及其 sha256
pub async fn setup_mirror_mock(document: &str) -> MockServer {
    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, document, &calculate_hash(document.as_bytes())).await;
    mock_server
}

/// 替换镜像内容
///
/// `checksum` 与文档不一致时可模拟被篡改或传输损坏的镜像
pub async fn mount_catalog(server: &MockServer, document: &str, checksum: &str) {
    server.reset().await;

    Mock::given(method("GET"))
        .and(path(PRICING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(document.to_string()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(HASH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{}  model_prices_and_context_window.json\n", checksum)),
        )
        .mount(server)
        .await;
}

/// 镜像整体不可用,所有请求返回 `status`
pub async fn mount_unavailable(server: &MockServer, status: u16) {
    server.reset().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// 前 `failures` 次请求 checksum 返回 503,之后正常
pub async fn mount_flaky_catalog(server: &MockServer, document: &str, failures: u64) {
    mount_catalog(server, document, &calculate_hash(document.as_bytes())).await;

    Mock::given(method("GET"))
        .and(path(HASH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(failures)
        .with_priority(1)
        .mount(server)
        .await;
}
