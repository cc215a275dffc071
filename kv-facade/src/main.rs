//! Thin HTTP facade over `kv-engine`'s `Db`.
//!
//! Owns no state beyond an `Arc<Db>` — no batching, no caching, no additional indexing. See
//! `SPEC_FULL.md` §6 for the routes and status codes this binary is required to produce.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use kv_engine::{Db, Error};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[clap(name = "kv-facade", about = "HTTP facade for kv-engine")]
struct Args {
    /// Directory the database is opened against. Created ahead of time by the caller.
    #[clap(long, env = "KV_FACADE_DIR", parse(from_os_str))]
    dir: PathBuf,

    /// Byte threshold past which the active segment rolls over.
    #[clap(long, env = "KV_FACADE_SEGMENT_SIZE_MAX", default_value = "4194304")]
    segment_size_max: u64,

    /// Address to bind the HTTP server to.
    #[clap(long, env = "KV_FACADE_BIND", default_value = "127.0.0.1:8083")]
    bind: SocketAddr,
}

#[derive(Deserialize)]
struct PutRequest {
    value: String,
}

#[derive(Serialize)]
struct GetResponse {
    key: String,
    value: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let db = Db::open(&args.dir, args.segment_size_max).expect("failed to open database");
    log::info!("opened database at {:?}", args.dir);

    let app = Router::new()
        .route("/db/:key", get(get_key).post(put_key).delete(delete_key))
        .with_state(Arc::new(db));

    log::info!("listening on {}", args.bind);
    axum::Server::bind(&args.bind)
        .serve(app.into_make_service())
        .await
        .expect("server error");
}

async fn get_key(
    State(db): State<Arc<Db>>,
    AxumPath(key): AxumPath<String>,
) -> Result<Json<GetResponse>, ApiError> {
    log::info!("GET /db/{}", key);
    let value = db.get(&key)?;
    Ok(Json(GetResponse { key, value }))
}

async fn put_key(
    State(db): State<Arc<Db>>,
    AxumPath(key): AxumPath<String>,
    body: Result<Json<PutRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<StatusCode, ApiError> {
    log::info!("POST /db/{}", key);
    let Json(body) = body.map_err(|_| ApiError::BadRequest)?;
    db.put(&key, &body.value)?;
    Ok(StatusCode::CREATED)
}

async fn delete_key(
    State(db): State<Arc<Db>>,
    AxumPath(key): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    log::info!("DELETE /db/{}", key);
    db.delete(&key)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Maps engine errors onto the status codes `SPEC_FULL.md` §6 assigns them. `NotFound` is the
/// only variant a client should ever see distinguished from a generic failure; everything else
/// collapses to `500` since the facade has nothing more specific to tell the caller.
enum ApiError {
    NotFound,
    BadRequest,
    Io,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound => ApiError::NotFound,
            _ => ApiError::Io,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::Io => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(db: Db) -> Router {
        Router::new()
            .route("/db/:key", get(get_key).post(put_key).delete(delete_key))
            .with_state(Arc::new(db))
    }

    #[tokio::test]
    async fn put_get_delete_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), 4096).unwrap();
        let app = app(db);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/db/a")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"value":"1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/db/a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/db/a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/db/a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_of_unknown_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path(), 4096).unwrap();
        let app = app(db);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/db/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
