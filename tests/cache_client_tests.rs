mod support;

use std::collections::HashSet;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use storedesk::auth::TokenStore;
use storedesk::cache::Tag;
use storedesk::error::DeskError;
use storedesk::transport::MultipartForm;
use storedesk::util::retry::RetryPolicy;
use wiremock::matchers::{body_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{client_with, envelope, list_body, pair};

async fn mount_get_once(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn mutation_refetches_subscribed_list() {
    let server = MockServer::start().await;
    mount_get_once(&server, "/orders", list_body(&["A", "B"])).await;
    mount_get_once(&server, "/orders", list_body(&["B"])).await;
    Mock::given(method("PATCH"))
        .and(path("/orders/A/status"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({"status": "shipped"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": "A"}))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hubs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&["h1"])))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let orders = client.subscribe("orders.list", json!({})).await.unwrap();
    let _hubs = client.subscribe("hubs.list", json!({})).await.unwrap();
    assert_eq!(orders.snapshot().data, Some(list_body(&["A", "B"])));

    client
        .mutate("orders.updateStatus", json!({"id": "A", "status": "shipped"}))
        .await
        .unwrap();

    let snapshot = orders.snapshot();
    assert_eq!(snapshot.data, Some(list_body(&["B"])));
    assert!(snapshot.is_fresh());
}

#[tokio::test]
async fn refetch_racing_a_mutation_is_followed_up() {
    let server = MockServer::start().await;
    mount_get_once(&server, "/orders", list_body(&["A", "B"])).await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(list_body(&["A", "B"]))
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_get_once(&server, "/orders", list_body(&["B"])).await;
    Mock::given(method("PATCH"))
        .and(path("/orders/A/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": "A"}))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let orders = client.subscribe("orders.list", json!({})).await.unwrap();

    let tags = [Tag::list("Order")];
    let ((), mutation) = tokio::join!(client.invalidate(&tags), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client
            .mutate("orders.updateStatus", json!({"id": "A", "status": "shipped"}))
            .await
    });
    mutation.unwrap();

    let snapshot = orders.snapshot();
    assert_eq!(snapshot.data, Some(list_body(&["B"])));
    assert!(snapshot.is_fresh());
    assert_eq!(
        client.query("orders.list", json!({})).await.unwrap(),
        list_body(&["B"])
    );
}

#[tokio::test]
async fn creating_into_an_empty_list_refetches_it() {
    let server = MockServer::start().await;
    mount_get_once(&server, "/products", list_body(&[])).await;
    mount_get_once(&server, "/products", list_body(&["p1"])).await;
    Mock::given(method("POST"))
        .and(path("/products"))
        .and(body_json(json!({"name": "Runner", "price": 120})))
        .respond_with(ResponseTemplate::new(201).set_body_json(envelope(json!({"id": "p1"}))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let products = client.subscribe("products.list", json!({})).await.unwrap();
    assert_eq!(
        client.cache().provided_tags(products.key()).unwrap(),
        HashSet::from([Tag::list("Product")])
    );

    client
        .mutate("products.create", json!({"name": "Runner", "price": 120}))
        .await
        .unwrap();

    assert_eq!(products.snapshot().data, Some(list_body(&["p1"])));
}

#[tokio::test]
async fn item_invalidation_only_refetches_that_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": "A"}))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": "B"}))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/A/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let _a = client.subscribe("orders.get", json!({"id": "A"})).await.unwrap();
    let _b = client.subscribe("orders.get", json!({"id": "B"})).await.unwrap();

    client.mutate("orders.cancel", json!({"id": "A"})).await.unwrap();
}

#[tokio::test]
async fn fresh_reads_are_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("status", "pending"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(list_body(&["A"]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let (first, second) = tokio::join!(
        client.query("orders.list", json!({"status": "pending"})),
        client.query("orders.list", json!({"status": "pending"}))
    );
    assert_eq!(first.unwrap(), second.unwrap());

    let third = client
        .query("orders.list", json!({"status": "pending"}))
        .await
        .unwrap();
    assert_eq!(third, list_body(&["A"]));
}

#[tokio::test]
async fn unsubscribed_entries_are_refetched_lazily() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hubs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&["h1"])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/hubs/h1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": "h1"}))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    client.query("hubs.list", json!({})).await.unwrap();
    let key = client.cache_key("hubs.list", &json!({})).unwrap();
    assert!(client.cache().contains(&key));

    client
        .mutate("hubs.update", json!({"id": "h1", "name": "North"}))
        .await
        .unwrap();
    assert!(!client.cache().contains(&key));

    client.query("hubs.list", json!({})).await.unwrap();
}

#[tokio::test]
async fn failed_optimistic_update_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/A"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({"id": "A", "status": "pending"}))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/orders/A/status"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": ["status must be one of pending, shipped"],
            "statusCode": 400
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let order = client.subscribe("orders.get", json!({"id": "A"})).await.unwrap();

    let err = client
        .mutate_optimistic(
            "orders.updateStatus",
            json!({"id": "A", "status": "lost"}),
            order.key(),
            |data| data["data"]["status"] = json!("lost"),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(&err, DeskError::Api { status: 400, message } if message.contains("must be one of")),
        "got {err:?}"
    );
    assert_eq!(order.snapshot().data.unwrap()["data"]["status"], json!("pending"));
}

#[tokio::test]
async fn business_error_in_success_response_skips_invalidation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payouts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(&["po1"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payouts/po1/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "payout already settled",
            "statusCode": 409,
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let payouts = client.subscribe("payouts.list", json!({})).await.unwrap();

    let err = client
        .mutate("payouts.approve", json!({"id": "po1"}))
        .await
        .unwrap_err();

    assert!(
        matches!(&err, DeskError::Business { status_code: 409, message } if message == "payout already settled"),
        "got {err:?}"
    );
    assert!(payouts.snapshot().is_fresh());
}

#[tokio::test]
async fn upload_sends_multipart_and_invalidates_product() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"id": "p1"}))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/products/p1/images"))
        .and(header("authorization", "Bearer A1"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(201).set_body_json(envelope(json!({"url": "/img/1.png"}))))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let _product = client.subscribe("products.get", json!({"id": "p1"})).await.unwrap();

    let form = MultipartForm::new().file("image", "1.png", "image/png", vec![0x89, b'P', b'N', b'G']);
    let body = client
        .upload("products.uploadImage", json!({"id": "p1", "alt": "side view"}), form)
        .await
        .unwrap();
    assert_eq!(body["data"]["url"], json!("/img/1.png"));
}

#[tokio::test]
async fn wrong_endpoint_kind_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));

    assert!(matches!(
        client.mutate("orders.list", json!({})).await,
        Err(DeskError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.query("orders.cancel", json!({"id": "A"})).await,
        Err(DeskError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.query("orders.archive", json!({})).await,
        Err(DeskError::UnknownEndpoint(_))
    ));
}

#[tokio::test]
async fn logout_resets_the_cache() {
    let server = MockServer::start().await;
    mount_get_once(&server, "/categories", list_body(&["c1"])).await;

    let (client, store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let mut categories = client.subscribe("categories.list", json!({})).await.unwrap();
    assert!(!client.cache().is_empty());

    client.logout().unwrap();

    assert!(client.cache().is_empty());
    assert_eq!(store.get().unwrap(), None);
    // Pending notifications drain, then the closed entry ends the stream.
    while categories.changed().await.is_some() {}
}

#[tokio::test]
async fn retry_policy_covers_transient_read_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_get_once(&server, "/orders", list_body(&["A"])).await;

    let (client, _store) = client_with(&server, Some(pair("A1", Some("R1"))));
    let client = client.with_retry_policy(RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
        multiplier: 1.0,
    });

    assert_eq!(
        client.query("orders.list", json!({})).await.unwrap(),
        list_body(&["A"])
    );
}
