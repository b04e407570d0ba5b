//! In-process Petstore stand-in
//!
//! Mirrors the v3 pet endpoints closely enough for the CRUD suite: create
//! answers 200, validation errors come back as `{message}` or as a bare
//! string, and deletes become visible only after a short lag.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Clone)]
struct Store {
    pets: Arc<Mutex<HashMap<i64, Value>>>,
    log: Arc<Mutex<Vec<String>>>,
    delete_lag: Duration,
}

pub struct MockPetstore {
    pub base_url: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockPetstore {
    /// `METHOD /path` for every request received, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

pub fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

pub async fn start(delete_lag: Duration) -> MockPetstore {
    let store = Store {
        pets: Arc::new(Mutex::new(HashMap::new())),
        log: Arc::new(Mutex::new(Vec::new())),
        delete_lag,
    };
    let log = store.log.clone();

    let app = Router::new()
        .route("/api/v3/pet", post(create_pet).put(update_pet))
        .route("/api/v3/pet/:id", get(get_pet).delete(delete_pet))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockPetstore {
        base_url: format!("http://{}/api/v3", addr),
        log,
    }
}

fn bare(status: StatusCode, text: &str) -> Response {
    (status, text.to_string()).into_response()
}

fn parse_pet(bytes: &Bytes) -> Result<(i64, Value), Response> {
    let pet: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(_) => return Err(bare(StatusCode::BAD_REQUEST, "Input error: unable to parse body")),
    };
    if pet.get("name").and_then(Value::as_str).map(str::is_empty).unwrap_or(true) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"code": 400, "message": "No Name provided. Try again?"})),
        )
            .into_response());
    }
    match pet.get("id").and_then(Value::as_i64) {
        Some(id) => Ok((id, pet)),
        None => Err(bare(
            StatusCode::BAD_REQUEST,
            "Input error: couldn't convert `id` to type `class java.lang.Long`",
        )),
    }
}

async fn create_pet(State(store): State<Store>, body: Bytes) -> Response {
    store.log.lock().push("POST /pet".into());
    match parse_pet(&body) {
        Ok((id, pet)) => {
            store.pets.lock().insert(id, pet.clone());
            Json(pet).into_response()
        }
        Err(response) => response,
    }
}

async fn update_pet(State(store): State<Store>, body: Bytes) -> Response {
    store.log.lock().push("PUT /pet".into());
    let (id, pet) = match parse_pet(&body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    let mut pets = store.pets.lock();
    match pets.get_mut(&id) {
        Some(existing) => {
            *existing = pet.clone();
            Json(pet).into_response()
        }
        None => bare(StatusCode::NOT_FOUND, "Pet not found"),
    }
}

async fn get_pet(State(store): State<Store>, Path(id): Path<String>) -> Response {
    store.log.lock().push(format!("GET /pet/{}", id));
    let Ok(id) = id.parse::<i64>() else {
        return bare(StatusCode::BAD_REQUEST, "Invalid ID supplied");
    };
    match store.pets.lock().get(&id) {
        Some(pet) => Json(pet.clone()).into_response(),
        None => bare(StatusCode::NOT_FOUND, "Pet not found"),
    }
}

async fn delete_pet(State(store): State<Store>, Path(id): Path<String>) -> Response {
    store.log.lock().push(format!("DELETE /pet/{}", id));
    let Ok(id) = id.parse::<i64>() else {
        return bare(StatusCode::BAD_REQUEST, "Invalid pet value");
    };
    if !store.pets.lock().contains_key(&id) {
        return bare(StatusCode::NOT_FOUND, "Pet not found");
    }
    // Reads keep seeing the pet for a while, like a replicated backend.
    let pets = store.pets.clone();
    let lag = store.delete_lag;
    tokio::spawn(async move {
        tokio::time::sleep(lag).await;
        pets.lock().remove(&id);
    });
    bare(StatusCode::OK, "Pet deleted")
}
