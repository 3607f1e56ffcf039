//! Integration tests for `BackendClient` using wiremock HTTP mocks.

use std::collections::HashMap;

use bulkops_client::{BackendClient, ClientError, ExportQuery, OrderPages};
use bulkops_coordinator::{ChannelName, FetchState, PagedFetch, StopToken};
use bulkops_core::{ItemId, ItemKind, PageCursor, WorkItem};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> BackendClient {
    BackendClient::with_base_url(base_url, Some("test-token"), 5, "bulkops-test/0.1")
        .expect("client construction should not fail")
}

fn query() -> ExportQuery {
    ExportQuery {
        store: "7".to_owned(),
        all: false,
        unfulfilled_only: true,
    }
}

#[tokio::test]
async fn export_count_reads_pending() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/bulk/export"))
        .and(query_param("store", "7"))
        .and(query_param("unfulfilled_only", "true"))
        .and(query_param("count_only", "true"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pending": 42})))
        .mount(&server)
        .await;

    let count = test_client(&server.uri())
        .export_count(&query())
        .await
        .expect("count should parse");
    assert_eq!(count, 42);
}

#[tokio::test]
async fn export_items_become_product_work_items() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/bulk/export"))
        .and(query_param("store", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"product": 11, "title": "Enamel mug"},
                {"product": "12"}
            ]
        })))
        .mount(&server)
        .await;

    let items = test_client(&server.uri())
        .export_items(&query())
        .await
        .expect("items should parse");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id(), &ItemId::from(11));
    assert_eq!(items[0].kind(), ItemKind::Product);
    assert_eq!(items[0].display_label(), "Enamel mug");
    assert_eq!(items[1].display_label(), "product 12");
}

#[tokio::test]
async fn trigger_export_posts_store_product_and_channel() {
    let server = MockServer::start().await;
    let channel = ChannelName::for_operation(&uuid_nil());

    Mock::given(method("POST"))
        .and(path("/api/bulk/export/item"))
        .and(body_json(json!({
            "store": "7",
            "product": "11",
            "channel": channel.as_str()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    test_client(&server.uri())
        .trigger_export("7", &WorkItem::new(11, ItemKind::Product), &channel)
        .await
        .expect("export should be accepted");
}

#[tokio::test]
async fn error_body_on_success_status_is_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/bulk/export/item"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "store disconnected"})),
        )
        .mount(&server)
        .await;

    let result = test_client(&server.uri())
        .trigger_export(
            "7",
            &WorkItem::new(11, ItemKind::Product),
            &ChannelName::for_operation(&uuid_nil()),
        )
        .await;

    assert!(
        matches!(result, Err(ClientError::Api(ref msg)) if msg == "store disconnected"),
        "expected Api error, got: {result:?}"
    );
}

#[tokio::test]
async fn update_item_posts_payload_to_given_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/orders/tracking"))
        .and(body_json(json!({
            "id": "1001",
            "kind": "order",
            "payload": {"tracking_number": "1Z999"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let item = WorkItem::new(1001, ItemKind::Order).with_payload(json!({"tracking_number": "1Z999"}));
    test_client(&server.uri())
        .update_item("/api/orders/tracking", &item)
        .await
        .expect("update should succeed");
}

#[tokio::test]
async fn delete_line_sends_ids_as_query() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/order/line"))
        .and(query_param("order_id", "55"))
        .and(query_param("line_id", "9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    test_client(&server.uri())
        .delete_line(&ItemId::from(55), &ItemId::from(9))
        .await
        .expect("empty 204 body is a success");
}

#[tokio::test]
async fn rate_limit_maps_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/bulk/export"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client(&server.uri()).export_count(&query()).await;
    assert!(
        matches!(result, Err(ClientError::RateLimited { retry_after_secs: 12 })),
        "expected RateLimited, got: {result:?}"
    );
}

#[tokio::test]
async fn not_found_and_server_error_are_typed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/user-config"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let missing = client.load_user_config().await;
    assert!(
        matches!(missing, Err(ClientError::NotFound { ref url }) if url.ends_with("/api/user-config")),
        "expected NotFound, got: {missing:?}"
    );

    let failed = client.fetch_orders_page("7", None).await;
    assert!(
        matches!(failed, Err(ClientError::UnexpectedStatus { status: 502, .. })),
        "expected UnexpectedStatus, got: {failed:?}"
    );
}

#[tokio::test]
async fn malformed_body_is_a_deserialize_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/bulk/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = test_client(&server.uri()).export_count(&query()).await;
    assert!(
        matches!(result, Err(ClientError::Deserialize { .. })),
        "expected Deserialize, got: {result:?}"
    );
}

#[tokio::test]
async fn user_config_round_trips_through_backend() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/user-config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"bulk_concurrency": 4, "bulk_item_delay_ms": "250"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/user-config"))
        .and(body_json(json!({"bulk_concurrency": 6})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let stored = client.load_user_config().await.expect("config should load");
    assert_eq!(stored["bulk_concurrency"], json!(4));

    let mut update = HashMap::new();
    update.insert("bulk_concurrency".to_owned(), json!(6));
    client
        .save_user_config(&update)
        .await
        .expect("config should save");
}

#[tokio::test]
async fn paged_fetch_follows_order_cursors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(query_param("store", "7"))
        .and(query_param("cursor", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [{"id": 3}],
            "next": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(query_param("store", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [{"id": 1, "name": "#1"}, {"id": 2}],
            "next": "c2"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let source = OrderPages::new(&client, "7");
    let mut fetch = PagedFetch::new(100);
    let state = fetch
        .run(&source, &StopToken::new())
        .await
        .expect("fetch should finish");

    assert_eq!(state, FetchState::Done);
    assert_eq!(fetch.pages_fetched(), 2);
    let ids: Vec<&str> = fetch.items().iter().map(|item| item.id().as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(fetch.resume_cursor(), None);
}

#[tokio::test]
async fn paged_fetch_resumes_from_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(query_param("cursor", "c9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orders": [{"id": 90}]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let source = OrderPages::new(&client, "7");
    let mut fetch = PagedFetch::starting_at(PageCursor::parse("c9"), 100);
    fetch
        .run(&source, &StopToken::new())
        .await
        .expect("fetch should finish");

    assert_eq!(fetch.items().len(), 1);
    assert_eq!(fetch.items()[0].id(), &ItemId::from(90));
}

fn uuid_nil() -> uuid::Uuid {
    uuid::Uuid::nil()
}
