use std::{collections::HashSet, sync::Arc};

use automarket::{
    config::Config,
    database::{ListingStore, MemoryStore, UserStore},
    models::{Engine, NewCar},
    router,
    shuffle::seeded_shuffle,
    state::State,
    users::DEFAULT_AVATAR,
};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "letmein";

fn new_car(brand: &str) -> NewCar {
    NewCar {
        brand: brand.to_string(),
        model: "Corolla".to_string(),
        year: 2021,
        price: 18_500.0,
        currency: None,
        engine: Engine {
            kind: "I4".to_string(),
            fuel: "Hybrid".to_string(),
            hp: 138,
            transmission: "CVT".to_string(),
        },
        mileage: Some(12_000),
        condition: None,
        image_url: "https://img.example/corolla.png".to_string(),
        status: None,
        tags: vec!["hybrid".to_string()],
    }
}

async fn app_with_cars(n: usize) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());

    for i in 0..n {
        let car = new_car(&format!("Brand{i}")).into_car().unwrap();
        store.insert(car).await.unwrap();
    }

    let config = Config {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        ..Config::default()
    };
    let state = State::with_store(config, store.clone());

    (router(state), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

fn item_ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn random_pages_split_one_permutation() {
    let (app, store) = app_with_cars(5).await;

    let mut pages = Vec::new();
    for page in 1..=3 {
        let (status, body) = get(&app, &format!("/cars?random=true&seed=abc&limit=2&page={page}")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["page"], page);
        assert_eq!(body["limit"], 2);
        assert_eq!(body["seed"], "abc");
        pages.push(item_ids(&body));
    }

    assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), [2, 2, 1]);

    let all: Vec<String> = pages.concat();
    let expected = seeded_shuffle(&store.list_ids().await.unwrap(), "abc");
    assert_eq!(all, expected);
    assert_eq!(all.iter().collect::<HashSet<_>>().len(), 5);

    for (page, previous) in pages.iter().enumerate() {
        let (_, body) = get(&app, &format!("/cars?random=true&seed=abc&limit=2&page={}", page + 1)).await;
        assert_eq!(&item_ids(&body), previous);
    }
}

#[tokio::test]
async fn missing_seed_is_generated_and_reusable() {
    let (app, _) = app_with_cars(8).await;

    let (status, first) = get(&app, "/cars?random=true&limit=4").await;
    assert_eq!(status, StatusCode::OK);

    let seed = first["seed"].as_str().unwrap().to_string();
    assert_eq!(seed.len(), 32);

    let (_, again) = get(&app, &format!("/cars?random=true&limit=4&seed={seed}")).await;
    assert_eq!(item_ids(&again), item_ids(&first));

    let (_, second) = get(&app, &format!("/cars?random=true&limit=4&page=2&seed={seed}")).await;
    let overlap: HashSet<String> = item_ids(&first).into_iter().collect();
    assert!(item_ids(&second).iter().all(|id| !overlap.contains(id)));
}

#[tokio::test]
async fn malformed_seed_is_replaced() {
    let (app, _) = app_with_cars(3).await;

    let (status, body) = get(&app, "/cars?random=true&seed=%20%20").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seed"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn repeated_query_keys_use_first_value() {
    let (app, _) = app_with_cars(5).await;

    let (status, body) = get(&app, "/cars?page=1&page=2&limit=2&limit=oops").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 2);

    let (status, body) = get(&app, "/cars?random=true&random=false&seed=a&seed=b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seed"], "a");
}

#[tokio::test]
async fn undecodable_seed_is_replaced() {
    let (app, _) = app_with_cars(3).await;

    let (status, body) = get(&app, "/cars?random=true&seed=%FF").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seed"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn different_seeds_give_different_orders() {
    let (app, _) = app_with_cars(10).await;

    let (_, first) = get(&app, "/cars?random=true&seed=abc").await;
    let (_, second) = get(&app, "/cars?random=true&seed=xyz").await;

    assert_ne!(item_ids(&first), item_ids(&second));
}

#[tokio::test]
async fn natural_order_has_no_seed() {
    let (app, store) = app_with_cars(5).await;

    let (status, body) = get(&app, "/cars?limit=2&page=2&seed=abc").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("seed").is_none());
    assert_eq!(body["total"], 5);
    assert_eq!(item_ids(&body), store.list_ids().await.unwrap()[2..4]);
}

#[tokio::test]
async fn bad_pagination_falls_back() {
    let (app, _) = app_with_cars(3).await;

    let (status, body) = get(&app, "/cars?page=abc&limit=-1&random=true&seed=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 100);
    assert_eq!(item_ids(&body).len(), 3);

    let (status, body) = get(&app, "/cars?page=9&limit=2&random=true&seed=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert!(item_ids(&body).is_empty());
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn deleted_cars_are_skipped_without_gaps() {
    let (app, store) = app_with_cars(3).await;

    let (_, before) = get(&app, "/cars?random=true&seed=abc").await;
    let order = item_ids(&before);

    assert!(store.remove(&order[1]).await.unwrap());

    let (status, after) = get(&app, "/cars?random=true&seed=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["total"], 3);
    assert_eq!(item_ids(&after), vec![order[0].clone(), order[2].clone()]);
}

#[tokio::test]
async fn new_cars_wait_for_expiry() {
    let (app, store) = app_with_cars(4).await;

    let (_, before) = get(&app, "/cars?random=true&seed=abc").await;
    store.insert(new_car("Late").into_car().unwrap()).await.unwrap();
    let (_, after) = get(&app, "/cars?random=true&seed=abc").await;

    assert_eq!(after["total"], 4);
    assert_eq!(item_ids(&after), item_ids(&before));

    let (_, fresh) = get(&app, "/cars?random=true&seed=other").await;
    assert_eq!(fresh["total"], 5);
}

fn create_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/cars")
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

fn car_json() -> Value {
    json!({
        "brand": " Honda ",
        "model": "Civic",
        "year": 2022,
        "price": 24000,
        "engine": {"type": "I4", "fuel": "Gasoline", "hp": 158, "transmission": "Manual"},
        "imageUrl": "https://img.example/civic.png",
        "status": "Reserved"
    })
}

#[tokio::test]
async fn create_requires_admin_token() {
    let (app, store) = app_with_cars(0).await;

    let (status, _) = send(&app, create_request(None, car_json())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, create_request(Some("wrong"), car_json())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, create_request(Some("letmei"), car_json())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, create_request(Some("letmeinnow"), car_json())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn create_and_fetch_car() {
    let (app, _) = app_with_cars(0).await;

    let (status, created) = send(&app, create_request(Some(ADMIN_TOKEN), car_json())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["brand"], "Honda");
    assert_eq!(created["currency"], "USD");
    assert_eq!(created["status"], "Reserved");

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = get(&app, &format!("/cars/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_rejects_bad_payloads() {
    let (app, _) = app_with_cars(0).await;

    let mut invalid = car_json();
    invalid["year"] = json!(1500);
    let (status, _) = send(&app, create_request(Some(ADMIN_TOKEN), invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, create_request(Some(ADMIN_TOKEN), json!({"brand": "Kia"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_car() {
    let (app, store) = app_with_cars(2).await;
    let id = store.list_ids().await.unwrap()[0].clone();

    let delete = |token: &str, id: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/cars/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, delete("wrong", &id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, delete(ADMIN_TOKEN, &id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, delete(ADMIN_TOKEN, &id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/cars/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_closed_without_configured_token() {
    let store = Arc::new(MemoryStore::new());
    let app = router(State::with_store(Config::default(), store));

    let (status, _) = send(&app, create_request(Some(ADMIN_TOKEN), car_json())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health() {
    let (app, _) = app_with_cars(0).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn register_stores_normalized_user() {
    let (app, store) = app_with_cars(0).await;

    let (status, body) = send(
        &app,
        post_json(
            "/auth/register",
            json!({"name": "  Ana Ruiz ", "email": " Ana@Example.COM ", "password": "secret1"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], true);

    let user = store.find_user("ana@example.com").await.unwrap().unwrap();
    assert_eq!(user.name, "Ana Ruiz");
    assert_eq!(user.image, DEFAULT_AVATAR);
    assert!(bcrypt::verify("secret1", &user.password_hash).unwrap());
}

#[tokio::test]
async fn register_missing_fields() {
    let (app, _) = app_with_cars(0).await;

    for body in [
        json!({"email": "ana@example.com", "password": "secret1"}),
        json!({"name": "Ana", "email": "   ", "password": "secret1"}),
        json!({"name": "Ana", "email": "ana@example.com"}),
        json!({}),
    ] {
        let (status, _) = send(&app, post_json("/auth/register", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

#[tokio::test]
async fn register_duplicate_email() {
    let (app, _) = app_with_cars(0).await;
    let body = json!({"name": "Ana", "email": "ana@example.com", "password": "secret1"});

    let (status, _) = send(&app, post_json("/auth/register", body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let again = json!({"name": "Other", "email": " ANA@example.com", "password": "another1"});
    let (status, _) = send(&app, post_json("/auth/register", again)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_short_password() {
    let (app, store) = app_with_cars(0).await;

    let body = json!({"name": "Ana", "email": "ana@example.com", "password": "12345"});
    let (status, _) = send(&app, post_json("/auth/register", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!store.user_exists("ana@example.com").await.unwrap());
}

#[tokio::test]
async fn subscribe_upserts_valid_email() {
    let (app, store) = app_with_cars(0).await;

    let (status, body) = send(&app, post_json("/subscribe", json!({"email": "ana@example.com"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let first = store.find_subscriber("ana@example.com").await.unwrap().unwrap();

    let (status, _) = send(&app, post_json("/subscribe", json!({"email": "ana@example.com"}))).await;
    assert_eq!(status, StatusCode::OK);
    let second = store.find_subscriber("ana@example.com").await.unwrap().unwrap();

    assert!(second.created_at >= first.created_at);
}

#[tokio::test]
async fn subscribe_rejects_bad_email() {
    let (app, _) = app_with_cars(0).await;

    for body in [json!({"email": "not-an-email"}), json!({"email": "a b@c.d"}), json!({})] {
        let (status, _) = send(&app, post_json("/subscribe", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
