#![allow(dead_code)]

use std::path::Path;

use pantry_api::connection::{connect, migrate};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use warp::{http::Response, hyper::body::Bytes, test::RequestBuilder, Filter, Reply};

pub async fn pool() -> Pool<Sqlite> {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    migrate(&pool).await.unwrap();
    pool
}

/// Pool over a database file in `dir`, so requests run on separate connections.
pub async fn file_pool(dir: &Path, max_connections: u32) -> Pool<Sqlite> {
    let url = format!("sqlite://{}", dir.join("pantry.db").display());
    let pool = connect(&url, max_connections).await.unwrap();
    migrate(&pool).await.unwrap();
    pool
}

pub fn request(method: &str, path: &str) -> RequestBuilder {
    warp::test::request().method(method).path(path)
}

pub fn with_body(method: &str, path: &str, body: &Value) -> RequestBuilder {
    request(method, path).json(body)
}

pub fn body(response: &Response<Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

pub fn etag(response: &Response<Bytes>) -> String {
    response.headers()["etag"].to_str().unwrap().to_owned()
}

/// `POST`s `body` and returns the created entity with its tag.
pub async fn create<F>(api: &F, path: &str, body: Value) -> (Value, String)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = with_body("POST", path, &body).reply(api).await;
    assert_eq!(response.status(), 201, "{:?}", response.body());
    (self::body(&response), etag(&response))
}

pub async fn current_tag<F>(api: &F, path: &str) -> String
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = request("GET", path).reply(api).await;
    assert_eq!(response.status(), 200);
    etag(&response)
}
