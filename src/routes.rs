use std::{sync::Arc, time::Instant};

use axum::{
    Json,
    extract::{Path, Query, State as AxumState, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use crate::{
    error::AppError,
    models::{ListingPage, NewCar},
    pagination::{PageParams, order_by_ids, page_window},
    state::State,
    users::{Registration, Subscription},
};

/// Listing parameters, first occurrence of each key wins.
#[derive(Debug, Default, PartialEq)]
pub struct ListingQuery {
    page: Option<String>,
    limit: Option<String>,
    random: Option<String>,
    seed: Option<String>,
}

impl ListingQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();

        for (key, value) in pairs {
            let slot = match key.as_str() {
                "page" => &mut query.page,
                "limit" => &mut query.limit,
                "random" => &mut query.random,
                "seed" => &mut query.seed,
                _ => continue,
            };

            if slot.is_none() {
                *slot = Some(value);
            }
        }

        query
    }
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn listings_handler(
    AxumState(state): AxumState<Arc<State>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListingQuery::from_pairs(pairs);

    let params = PageParams::parse(
        query.page.as_deref(),
        query.limit.as_deref(),
        state.config.default_limit,
        state.config.max_limit,
    );

    let page = if is_truthy(query.random.as_deref()) {
        random_page(&state, params, query.seed.as_deref()).await?
    } else {
        natural_page(&state, params).await?
    };

    Ok(Json(page))
}

async fn natural_page(state: &State, params: PageParams) -> Result<ListingPage, AppError> {
    let skip = usize::try_from(params.skip()).unwrap_or(usize::MAX);
    let limit = usize::try_from(params.limit).unwrap_or(usize::MAX);

    let items = state.store.fetch_page(skip, limit).await?;
    let total = state.store.count().await?;

    Ok(ListingPage {
        items,
        total,
        page: params.page,
        limit: params.limit,
        seed: None,
    })
}

async fn random_page(state: &State, params: PageParams, seed: Option<&str>) -> Result<ListingPage, AppError> {
    state.randomizer.sweep(Instant::now());

    let seed = state.randomizer.resolve_seed(seed);
    let permutation = state
        .randomizer
        .permutation(&seed, || state.store.list_ids())
        .await?;

    let window = &permutation.ids[page_window(permutation.ids.len(), params)];
    let records = state.store.fetch_by_ids(window).await?;
    let (items, dropped) = order_by_ids(window, records);

    if dropped > 0 {
        debug!(seed = %seed, dropped, "Skipped ids deleted since shuffle");
    }

    Ok(ListingPage {
        items,
        total: permutation.ids.len() as u64,
        page: params.page,
        limit: params.limit,
        seed: Some(seed),
    })
}

fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|value| {
        let value = value.trim();
        value == "1" || value.eq_ignore_ascii_case("true")
    })
}

pub async fn car_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let car = state.store.fetch_one(&id).await?.ok_or(AppError::NotFound)?;

    Ok(Json(car))
}

pub async fn create_handler(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    payload: Result<Json<NewCar>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers)?;

    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;
    let car = state.store.insert(payload.into_car()?).await?;

    info!(id = %car.id, brand = %car.brand, model = %car.model, "Car created");

    Ok((StatusCode::CREATED, Json(car)))
}

pub async fn delete_handler(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers)?;

    if !state.store.remove(&id).await? {
        return Err(AppError::NotFound);
    }

    info!(id = %id, "Car deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Bearer token must match the configured admin token.
fn authorize(state: &State, headers: &HeaderMap) -> Result<(), AppError> {
    let expected = state.config.admin_token.as_deref().ok_or(AppError::Unauthorized)?;

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

pub async fn register_handler(
    AxumState(state): AxumState<Arc<State>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;
    let registration = payload.normalize()?;

    if state.users.user_exists(&registration.email).await? {
        return Err(AppError::Conflict);
    }
    registration.check_password()?;

    let user = spawn_blocking(move || registration.into_user())
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))??;
    let email = user.email.clone();

    // lost a race with a concurrent registration
    if !state.users.create_user(user).await? {
        return Err(AppError::Conflict);
    }

    info!(email = %email, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "message": "User registered" })),
    ))
}

pub async fn subscribe_handler(
    AxumState(state): AxumState<Arc<State>>,
    payload: Result<Json<Subscription>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::Invalid("email".into()))?;
    let subscriber = payload.into_subscriber()?;

    state.users.upsert_subscriber(subscriber).await?;

    Ok(Json(json!({ "ok": true })))
}
