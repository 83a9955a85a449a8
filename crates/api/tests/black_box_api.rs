use reqwest::StatusCode;
use serde_json::json;

use videostore_infra::config::AppConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = videostore_api::app::build_app(&AppConfig::default()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The API is eventually consistent (command path vs projection update).
/// Poll briefly until `ready` accepts the body at `path`.
async fn get_eventually(
    client: &reqwest::Client,
    url: &str,
    ready: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client.get(url).send().await.unwrap();
        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if ready(&body) {
                return body;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("{url} did not reach the expected state within timeout");
}

async fn add_movie(client: &reqwest::Client, srv: &TestServer, copies: u32) -> String {
    let res = client
        .post(srv.url("/movies"))
        .json(&json!({
            "title": "Blacksmith Of The Banished",
            "overview": "The unexciting life of a boy will be permanently altered.",
            "release_date": "1979-01-18",
            "inventory": copies,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn register_customer(client: &reqwest::Client, srv: &TestServer) -> String {
    let res = client
        .post(srv.url("/customers"))
        .json(&json!({
            "name": "Shelley Rocha",
            "phone": "(322) 510-8695",
            "postal_code": "24309",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn rentals_index_is_an_empty_json_array() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/rentals")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()["content-type"]
            .to_str()
            .unwrap()
            .contains("json")
    );
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn unknown_rental_is_not_found() {
    let srv = TestServer::spawn().await;

    for id in ["-1", "0190b3a4-0000-7000-8000-000000000000"] {
        let res = reqwest::get(srv.url(&format!("/rentals/{id}"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "errors": ["not found"] }));
    }
}

#[tokio::test]
async fn create_rental_returns_the_record() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let movie_id = add_movie(&client, &srv, 2).await;
    let customer_id = register_customer(&client, &srv).await;

    let res = client
        .post(srv.url("/rentals"))
        .json(&json!({ "movie_id": movie_id, "customer_id": customer_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let rental_id = created["id"].as_str().unwrap().to_string();

    let shown = get_eventually(&client, &srv.url(&format!("/rentals/{rental_id}")), |_| true).await;
    assert_eq!(shown["id"], created["id"]);
    assert_eq!(shown["movie_id"].as_str().unwrap(), movie_id);
    assert_eq!(shown["customer_id"].as_str().unwrap(), customer_id);
    assert_eq!(shown["checkout_date"], created["checkout_date"]);
    assert_eq!(shown["due_date"], created["due_date"]);

    let listed = get_eventually(&client, &srv.url("/rentals"), |b| {
        b.as_array().is_some_and(|a| a.len() == 1)
    })
    .await;
    let mut keys: Vec<_> = listed[0].as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["checkout_date", "customer_id", "due_date", "id", "movie_id"]
    );
}

#[tokio::test]
async fn checkout_then_checkin_restores_counters() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let movie_id = add_movie(&client, &srv, 3).await;
    let customer_id = register_customer(&client, &srv).await;
    let pair = json!({ "movie_id": movie_id, "customer_id": customer_id });

    let res = client
        .post(srv.url("/rentals/check-out"))
        .json(&pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["available_inventory"], 2);
    assert_eq!(receipt["movies_checked_out_count"], 1);

    get_eventually(&client, &srv.url(&format!("/movies/{movie_id}")), |m| {
        m["available_inventory"] == 2
    })
    .await;
    let open = get_eventually(
        &client,
        &srv.url(&format!("/customers/{customer_id}/rentals")),
        |r| r.as_array().is_some_and(|a| a.len() == 1),
    )
    .await;
    assert_eq!(open[0]["id"], receipt["rental_id"]);

    let res = client
        .post(srv.url("/rentals/check-in"))
        .json(&pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["available_inventory"], 3);
    assert_eq!(receipt["movies_checked_out_count"], 0);

    get_eventually(&client, &srv.url(&format!("/customers/{customer_id}")), |c| {
        c["movies_checked_out_count"] == 0
    })
    .await;
}

#[tokio::test]
async fn checkout_failures_use_error_bodies() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let movie_id = add_movie(&client, &srv, 1).await;
    let customer_id = register_customer(&client, &srv).await;

    // Unknown movie.
    let res = client
        .post(srv.url("/rentals/check-out"))
        .json(&json!({ "movie_id": "-1", "customer_id": customer_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "errors": ["not found"] }));

    // Unknown customer, either direction.
    let stranger = json!({
        "movie_id": movie_id,
        "customer_id": "0190b3a4-0000-7000-8000-000000000000",
    });
    for path in ["/rentals/check-out", "/rentals/check-in"] {
        let res = client.post(srv.url(path)).json(&stranger).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "errors": ["not found"] }));
    }

    // Nothing to return yet.
    let pair = json!({ "movie_id": movie_id, "customer_id": customer_id });
    let res = client
        .post(srv.url("/rentals/check-in"))
        .json(&pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Last copy goes, then none is left.
    let res = client
        .post(srv.url("/rentals/check-out"))
        .json(&pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client
        .post(srv.url("/rentals/check-out"))
        .json(&pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_bodies_get_error_bodies() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Integer, missing and null ids name no record.
    for body in [
        json!({ "movie_id": 1, "customer_id": 2 }),
        json!({}),
        json!({ "movie_id": null, "customer_id": null }),
    ] {
        let res = client
            .post(srv.url("/rentals/check-out"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{body}");
        let errors: serde_json::Value = res.json().await.unwrap();
        assert_eq!(errors, json!({ "errors": ["not found"] }));
    }

    // Not JSON at all.
    let res = client
        .post(srv.url("/rentals/check-in"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let errors: serde_json::Value = res.json().await.unwrap();
    assert_eq!(errors["errors"].as_array().unwrap().len(), 1);

    // Wrong shape for a typed body.
    let res = client
        .post(srv.url("/movies"))
        .json(&json!({ "inventory": "three" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let errors: serde_json::Value = res.json().await.unwrap();
    assert!(errors["errors"][0].is_string());
}

#[tokio::test]
async fn inventory_cannot_drop_below_copies_on_loan() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let movie_id = add_movie(&client, &srv, 2).await;
    let customer_id = register_customer(&client, &srv).await;

    let res = client
        .post(srv.url("/rentals/check-out"))
        .json(&json!({ "movie_id": movie_id, "customer_id": customer_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url(&format!("/movies/{movie_id}/inventory")))
        .json(&json!({ "inventory": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .post(srv.url(&format!("/movies/{movie_id}/inventory")))
        .json(&json!({ "inventory": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    get_eventually(&client, &srv.url(&format!("/movies/{movie_id}")), |m| {
        m["inventory"] == 5 && m["available_inventory"] == 4
    })
    .await;
}

#[tokio::test]
async fn overdue_lists_rentals_past_due() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let movie_id = add_movie(&client, &srv, 1).await;
    let customer_id = register_customer(&client, &srv).await;

    let res = client
        .post(srv.url("/rentals/check-out"))
        .json(&json!({ "movie_id": movie_id, "customer_id": customer_id }))
        .send()
        .await
        .unwrap();
    let receipt: serde_json::Value = res.json().await.unwrap();
    let due: chrono::NaiveDate = receipt["due_date"].as_str().unwrap().parse().unwrap();

    let on_due = get_eventually(&client, &srv.url(&format!("/rentals/overdue?today={due}")), |_| true).await;
    assert_eq!(on_due, json!([]));

    let day_after = due.succ_opt().unwrap();
    let late = get_eventually(
        &client,
        &srv.url(&format!("/rentals/overdue?today={day_after}")),
        |r| r.as_array().is_some_and(|a| a.len() == 1),
    )
    .await;
    assert_eq!(late[0]["id"], receipt["rental_id"]);
}
