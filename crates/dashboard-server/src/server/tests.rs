use super::{
    config::{Profile, Secret, ServerConfig},
    router,
    state::AppState,
    store::Store,
};
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};
use tower::ServiceExt;

pub(crate) fn test_config(profile: Profile) -> ServerConfig {
    ServerConfig {
        server_addr: "127.0.0.1:0".to_owned(),
        database_url: "sqlite::memory:".to_owned(),
        max_connections: 1,
        api_prefix: "/api".to_owned(),
        profile,
        export_batch_size: 2,
        export_stream_buffer: 4,
        body_limit: 1024 * 1024,
        jwt_secret: Secret::new("test-secret"),
        jwt_expires_in_hours: 1,
        image_dir: scratch_dir().to_string_lossy().into_owned(),
        upload_max_bytes: 1024,
    }
}

/// A fresh directory per call, so upload tests never share files.
fn scratch_dir() -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir().join(format!(
        "dashboard-server-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

/// The router plus a signed-in user's bearer token.
struct TestApp {
    router: Router,
    token: String,
    config: ServerConfig,
}

async fn app_with(profile: Profile) -> TestApp {
    let config = test_config(profile);
    let store = Store::in_memory().await.expect("in-memory database");
    store.migrate().await.expect("schema");
    let router = router(AppState::new(config.clone(), store));

    let mut app = TestApp {
        router,
        token: String::new(),
        config,
    };
    let (status, body) = send_json_as(
        &app,
        None,
        Method::POST,
        "/api/v1/auth/register",
        json!({ "name": "Tester", "email": "tester@example.com", "password": "hunter22" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    app.token = body["data"]["token"]
        .as_str()
        .expect("token")
        .to_owned();
    app
}

async fn app() -> TestApp {
    app_with(Profile::Production).await
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.router.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    (status, headers, body)
}

async fn send_json_as(
    app: &TestApp,
    token: Option<&str>,
    method: Method,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = request
        .body(Body::from(body.to_string()))
        .expect("valid request");
    let (status, _, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

/// Sends `body` as the signed-in user.
async fn send_json(app: &TestApp, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    send_json_as(app, Some(&app.token), method, uri, body).await
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).expect("valid request");
    let (status, _, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

async fn get_json_as(app: &TestApp, token: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("valid request");
    let (status, _, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn product(name: &str, category: &str, price: f64) -> Value {
    json!({ "name": name, "category_name": category, "price": price })
}

async fn product_total(app: &TestApp) -> i64 {
    let (status, body) = get_json(app, "/api/v1/products").await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["pagination"]["total"]
        .as_i64()
        .expect("total is a number")
}

async fn seed(app: &TestApp, products: Vec<Value>) -> Vec<i64> {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/v1/products/bulk",
        json!({ "products": products }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]
        .as_array()
        .expect("created products")
        .iter()
        .map(|p| p["id_product"].as_i64().expect("id"))
        .collect()
}

/// A `multipart/form-data` body with text fields and an optional `foto`.
fn multipart(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    const BOUNDARY: &str = "dashboard-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"foto\"; \
                 filename=\"photo\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn send_form(
    app: &TestApp,
    method: Method,
    uri: &str,
    form: (String, Vec<u8>),
) -> (StatusCode, Value) {
    let (content_type, body) = form;
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
        .body(Body::from(body))
        .expect("valid request");
    let (status, _, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

async fn download(app: &TestApp, request: Request<Body>) -> (StatusCode, Bytes) {
    let (status, _, body) = send(app, request).await;
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["exports_inflight"], 0);
}

#[tokio::test]
async fn created_product_is_committed() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/products",
        product("Kettle", "Kitchen", 19.99),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["data"]["id_product"].as_i64().expect("id");

    let (status, body) = get_json(&app, &format!("/api/v1/products/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Kettle");
}

#[tokio::test]
async fn bulk_create_commits_every_product() {
    let app = app().await;

    let ids = seed(
        &app,
        vec![
            product("Kettle", "Kitchen", 19.99),
            product("Teapot", "Kitchen", 24.5),
            product("Lamp", "Lighting", 40.0),
        ],
    )
    .await;

    assert_eq!(ids.len(), 3);
    assert_eq!(product_total(&app).await, 3);
}

#[tokio::test]
async fn bulk_create_rolls_back_when_any_item_is_invalid() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/products/bulk",
        json!({ "products": [
            product("Kettle", "Kitchen", 19.99),
            product("Teapot", "Kitchen", 24.5),
            product("", "Kitchen", 5.0),
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");
    assert_eq!(product_total(&app).await, 0);
}

#[tokio::test]
async fn missing_product_update_returns_404() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/v1/products/999",
        json!({ "price": 1.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product not found");
}

#[tokio::test]
async fn batch_update_is_all_or_nothing() {
    let app = app().await;
    let ids = seed(&app, vec![product("Kettle", "Kitchen", 10.0)]).await;

    let (status, _) = send_json(
        &app,
        Method::PATCH,
        "/api/v1/products/batch/update",
        json!({ "updates": [
            { "id": ids[0], "data": { "price": 99.0 } },
            { "id": 12345, "data": { "price": 1.0 } },
        ]}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get_json(&app, &format!("/api/v1/products/{}", ids[0])).await;
    assert_eq!(body["data"]["price"], 10.0);
}

#[tokio::test]
async fn batch_delete_rolls_back_when_an_id_is_missing() {
    let app = app().await;
    let ids = seed(
        &app,
        vec![product("Kettle", "Kitchen", 10.0), product("Lamp", "Lighting", 20.0)],
    )
    .await;

    let (status, _) = send_json(
        &app,
        Method::DELETE,
        "/api/v1/products/batch/delete",
        json!({ "ids": [ids[0], ids[1], 777] }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(product_total(&app).await, 2);

    let (status, _) = send_json(
        &app,
        Method::DELETE,
        "/api/v1/products/batch/delete",
        json!({ "ids": ids }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product_total(&app).await, 0);
}

#[tokio::test]
async fn transfer_category_moves_products() {
    let app = app().await;
    let ids = seed(
        &app,
        vec![product("Kettle", "Kitchen", 10.0), product("Lamp", "Lighting", 20.0)],
    )
    .await;

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/v1/products/transfer/category",
        json!({ "productIds": ids, "newCategory": "Home" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = get_json(&app, "/api/v1/products/categories").await;
    assert_eq!(body["data"], json!(["Home"]));
}

#[tokio::test]
async fn listing_filters_and_paginates() {
    let app = app().await;
    seed(
        &app,
        vec![
            product("Red kettle", "Kitchen", 10.0),
            product("Blue kettle", "Kitchen", 12.0),
            product("Lamp", "Lighting", 20.0),
        ],
    )
    .await;

    let (_, body) = get_json(&app, "/api/v1/products?search=kettle&limit=1&page=2").await;

    assert_eq!(body["data"]["pagination"]["total"], 2);
    assert_eq!(body["data"]["pagination"]["totalPages"], 2);
    assert_eq!(body["data"]["products"][0]["name"], "Blue kettle");
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/products",
        json!({ "name": "Kettle" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn unknown_route_is_404_without_detail_in_production() {
    let app = app().await;

    let (status, body) = get_json(&app, "/api/v1/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route /api/v1/nope not found");
    assert!(body.get("detail").is_none());
}

#[tokio::test]
async fn development_profile_adds_error_detail() {
    let app = app_with(Profile::Development).await;

    let (status, body) = get_json(&app, "/api/v1/products/424242").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn custom_export_streams_a_workbook() {
    let app = app().await;
    let request = Request::post("/api/v1/export/custom")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "columns": [
                    { "header": "Name", "key": "name" },
                    { "header": "Qty", "key": "qty", "width": 8 },
                ],
                "data": [{ "name": "Kettle", "qty": 3 }, { "name": "Lamp" }],
                "filename": "stock",
            })
            .to_string(),
        ))
        .expect("valid request");

    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"stock.xlsx\""
    );
    assert!(body.starts_with(b"PK"));
}

#[tokio::test]
async fn custom_export_rejects_non_array_data() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/export/custom",
        json!({
            "columns": [{ "header": "Name", "key": "name" }],
            "data": { "name": "Kettle" },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn custom_export_requires_columns() {
    let app = app().await;

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/v1/export/custom",
        json!({ "data": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn buffer_export_returns_base64_workbook() {
    let app = app().await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/export/buffer",
        json!({
            "columns": [{ "header": "Name", "key": "name" }],
            "data": [{ "name": "Kettle" }],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    let workbook = STANDARD
        .decode(data["buffer"].as_str().expect("base64 string"))
        .expect("valid base64");
    assert!(workbook.starts_with(b"PK"));
    assert_eq!(data["size"], workbook.len());
    assert_eq!(data["rows"], 1);
    assert!(
        data["filename"]
            .as_str()
            .is_some_and(|name| name.starts_with("custom_export_"))
    );
}

#[tokio::test]
async fn product_and_category_exports_page_through_the_table() {
    let app = app().await;
    seed(
        &app,
        vec![
            product("Kettle", "Kitchen", 10.0),
            product("Teapot", "Kitchen", 12.0),
            product("Lamp", "Lighting", 20.0),
            product("Desk", "Office", 80.0),
            product("Chair", "Office", 60.0),
        ],
    )
    .await;

    for uri in [
        "/api/v1/export/products",
        "/api/v1/export/products?category=Office",
        "/api/v1/export/categories",
    ] {
        let request = Request::get(uri).body(Body::empty()).expect("valid request");
        let (status, headers, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK, "{uri}");
        assert!(
            headers[header::CONTENT_DISPOSITION]
                .to_str()
                .is_ok_and(|value| value.ends_with(".xlsx\"")),
            "{uri}"
        );
        assert!(body.starts_with(b"PK"), "{uri}");
    }
}

#[tokio::test]
async fn writes_require_a_valid_bearer_token() {
    let app = app().await;

    for token in [None, Some("not-a-token")] {
        let (status, body) = send_json_as(
            &app,
            token,
            Method::POST,
            "/api/v1/products",
            product("Kettle", "Kitchen", 19.99),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
        assert_eq!(body["status"], "fail");
    }

    assert_eq!(product_total(&app).await, 0);
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = app().await;

    let (status, body) = send_json_as(
        &app,
        None,
        Method::POST,
        "/api/v1/auth/register",
        json!({ "name": "Other", "email": "TESTER@example.com", "password": "pw" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send_json_as(
        &app,
        None,
        Method::POST,
        "/api/v1/auth/login",
        json!({ "email": "tester@example.com", "password": "wrong" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, body) = send_json_as(
        &app,
        None,
        Method::POST,
        "/api/v1/auth/login",
        json!({ "email": "tester@example.com", "password": "hunter22" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], "1h");
    assert!(body["data"]["user"].get("password").is_none());
    let token = body["data"]["token"].as_str().expect("token").to_owned();

    let (status, body) = get_json_as(&app, &token, "/api/v1/auth/profile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "tester@example.com");
    assert!(body["data"].get("password").is_none());

    let (status, _) = get_json(&app, "/api/v1/auth/profile").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json_as(
        &app,
        Some(token.as_str()),
        Method::POST,
        "/api/v1/auth/logout",
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registration_validates_its_fields() {
    let app = app().await;

    let (status, body) = send_json_as(
        &app,
        None,
        Method::POST,
        "/api/v1/auth/register",
        json!({ "name": "Nobody", "email": "not-an-email", "password": "pw" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn statistics_summarize_the_catalogue() {
    let app = app().await;

    let (status, body) = get_json(&app, "/api/v1/products/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalProducts"], 0);
    assert!(body["data"]["avgPrice"].is_null());

    seed(
        &app,
        vec![
            product("Kettle", "Kitchen", 10.0),
            product("Teapot", "Kitchen", 20.0),
            product("Lamp", "Lighting", 45.0),
        ],
    )
    .await;

    let (_, body) = get_json(&app, "/api/v1/products/statistics").await;
    assert_eq!(
        body["data"],
        json!({
            "totalProducts": 3,
            "totalCategories": 2,
            "avgPrice": 25.0,
            "minPrice": 10.0,
            "maxPrice": 45.0,
        })
    );
}

#[tokio::test]
async fn search_and_category_listings_sort_by_name() {
    let app = app().await;
    seed(
        &app,
        vec![
            product("Red kettle", "Kitchen", 10.0),
            product("Blue kettle", "Kitchen", 12.0),
            product("Lamp", "Lighting", 20.0),
        ],
    )
    .await;

    let names = |body: &Value| -> Vec<String> {
        body["data"]["products"]
            .as_array()
            .expect("products")
            .iter()
            .map(|p| p["name"].as_str().expect("name").to_owned())
            .collect()
    };

    let (status, body) = get_json(&app, "/api/v1/products/search/kettle").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), ["Blue kettle", "Red kettle"]);
    assert_eq!(body["data"]["pagination"]["total"], 2);

    let (_, body) = get_json(&app, "/api/v1/products/category/Kitchen?limit=1").await;
    assert_eq!(names(&body), ["Blue kettle"]);
    assert_eq!(body["data"]["pagination"]["totalPages"], 2);
}

#[tokio::test]
async fn price_range_filters_and_requires_a_bound() {
    let app = app().await;
    seed(
        &app,
        vec![
            product("Desk", "Office", 80.0),
            product("Kettle", "Kitchen", 10.0),
            product("Lamp", "Lighting", 20.0),
        ],
    )
    .await;

    let (status, body) = get_json(&app, "/api/v1/products/price-range").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Please provide minPrice or maxPrice");

    let (status, body) = get_json(&app, "/api/v1/products/price-range?minPrice=15").await;
    assert_eq!(status, StatusCode::OK);
    let prices: Vec<f64> = body["data"]["products"]
        .as_array()
        .expect("products")
        .iter()
        .map(|p| p["price"].as_f64().expect("price"))
        .collect();
    assert_eq!(prices, [20.0, 80.0]);

    let (_, body) = get_json(&app, "/api/v1/products/price-range?minPrice=5&maxPrice=15").await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn product_images_are_stored_served_and_replaced() {
    let app = app().await;
    let png: &[u8] = b"\x89PNG\r\n\x1a\nfirst";

    let (status, body) = send_form(
        &app,
        Method::POST,
        "/api/v1/products/with-image",
        multipart(
            &[("name", "Lamp"), ("category_name", "Lighting"), ("price", "20")],
            Some(("image/png", png)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["data"]["id_product"].as_i64().expect("id");
    let first = body["data"]["foto"].as_str().expect("foto").to_owned();
    assert!(first.starts_with("/image/product/img-"));

    let request = Request::get(first.as_str()).body(Body::empty()).expect("valid request");
    let (status, served) = download(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&served[..], png);

    let (status, body) = send_form(
        &app,
        Method::PUT,
        &format!("/api/v1/products/{id}/with-image"),
        multipart(&[("price", "25")], Some(("image/png", b"second".as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["price"], 25.0);
    assert_ne!(body["data"]["foto"], first.as_str());

    let old_file = PathBuf::from(&app.config.image_dir)
        .join(first.trim_start_matches("/image/"));
    assert!(!old_file.exists());

    let _ = std::fs::remove_dir_all(&app.config.image_dir);
}

#[tokio::test]
async fn rejected_upload_leaves_no_product() {
    let app = app().await;

    let (status, _) = send_form(
        &app,
        Method::POST,
        "/api/v1/products/with-image",
        multipart(
            &[("name", "Lamp"), ("category_name", "Lighting"), ("price", "20")],
            Some(("application/pdf", b"%PDF-1.7".as_slice())),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_form(
        &app,
        Method::POST,
        "/api/v1/products/with-image",
        multipart(
            &[("name", "Lamp"), ("category_name", "Lighting"), ("price", "20")],
            Some(("image/png", [0u8; 2048].as_slice())),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "File too large. Maximum size is 1MB.");

    let (status, _) = send_form(
        &app,
        Method::POST,
        "/api/v1/products/with-image",
        multipart(&[("name", "Lamp"), ("price", "20")], Some(("image/png", b"png".as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(product_total(&app).await, 0);
    let stored = std::fs::read_dir(PathBuf::from(&app.config.image_dir).join("product"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0);

    let _ = std::fs::remove_dir_all(&app.config.image_dir);
}

#[tokio::test]
async fn user_export_requires_authentication() {
    let app = app().await;

    let request = Request::get("/api/v1/export/users")
        .body(Body::empty())
        .expect("valid request");
    let (status, _) = download(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get("/api/v1/export/users")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
        .body(Body::empty())
        .expect("valid request");
    let (status, body) = download(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"PK"));
}

#[tokio::test]
async fn report_export_groups_products() {
    let app = app().await;
    seed(
        &app,
        vec![
            product("Kettle", "Kitchen", 10.0),
            product("Teapot", "Kitchen", 12.0),
            product("Lamp", "Lighting", 20.0),
        ],
    )
    .await;

    let request = Request::post("/api/v1/export/report")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "modelName": "Product",
                "groupBy": ["category_name"],
                "columns": [
                    { "header": "Category", "key": "category_name" },
                    { "header": "Products", "key": "count" },
                    { "header": "Total", "key": "total_price" },
                ],
                "filters": { "minPrice": 11 },
                "filename": "by-category",
            })
            .to_string(),
        ))
        .expect("valid request");
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"by-category.xlsx\""
    );
    assert!(body.starts_with(b"PK"));

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/v1/export/report",
        json!({
            "modelName": "Product",
            "groupBy": "id_product",
            "columns": [{ "header": "Products", "key": "count" }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "cannot group by id_product");
}

#[tokio::test]
async fn query_export_runs_only_valid_selects() {
    let app = app().await;
    seed(&app, vec![product("Kettle", "Kitchen", 10.0)]).await;
    let columns = json!([{ "header": "Name", "key": "name" }]);

    let (status, _) = send_json_as(
        &app,
        None,
        Method::POST,
        "/api/v1/export/query",
        json!({ "query": "SELECT name FROM product", "columns": columns.clone() }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for query in ["DELETE FROM product", "SELECT nope FROM product"] {
        let (status, body) = send_json(
            &app,
            Method::POST,
            "/api/v1/export/query",
            json!({ "query": query, "columns": columns.clone() }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}: {body}");
    }
    assert_eq!(product_total(&app).await, 1);

    let request = Request::post("/api/v1/export/query")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
        .body(Body::from(
            json!({
                "query": "SELECT name, price FROM product ORDER BY name;",
                "columns": columns,
                "sheetName": "Names",
            })
            .to_string(),
        ))
        .expect("valid request");
    let (status, body) = download(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"PK"));
}
