use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheValue, QueryKey};
use crate::config::ApiConfig;

use super::remote::Remote;
use super::types::{NewTodo, Todo};
use super::ApiError;

/// Upper bound on silent retries, so a write is never sent more than twice
const MAX_RETRIES: u32 = 1;

/// Resource name of the todo collection
pub const TODOS: &str = "todos";

/// REST client for the todo store
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  retries: u32,
  list_limit: usize,
}

impl ApiClient {
  pub fn new(config: &ApiConfig, token: Option<&str>) -> Result<Self> {
    Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
      let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      retries: config.retries.min(MAX_RETRIES),
      list_limit: config.list_limit,
    })
  }

  /// List todos (first `list_limit` entries)
  pub async fn list_todos(&self) -> Result<Vec<Todo>, ApiError> {
    let mut url = self.url(TODOS)?;
    url
      .query_pairs_mut()
      .append_pair("_limit", &self.list_limit.to_string());

    let response = self.send(Method::GET, url, None).await?;
    decode(response).await
  }

  /// Get a single todo by id
  pub async fn get_todo(&self, id: u64) -> Result<Todo, ApiError> {
    let url = self.url(&format!("{}/{}", TODOS, id))?;
    let response = self.send(Method::GET, url, None).await?;
    decode(response).await
  }

  /// Create a todo; the response carries the server-assigned id
  pub async fn create_todo(&self, draft: &NewTodo) -> Result<Todo, ApiError> {
    let url = self.url(TODOS)?;
    let body = serde_json::to_vec(draft)?;
    let response = self.send(Method::POST, url, Some(body)).await?;
    decode(response).await
  }

  /// Replace a todo with the full payload
  pub async fn update_todo(&self, todo: &Todo) -> Result<Todo, ApiError> {
    let url = self.url(&format!("{}/{}", TODOS, todo.id))?;
    let body = serde_json::to_vec(todo)?;
    let response = self.send(Method::PUT, url, Some(body)).await?;
    decode(response).await
  }

  pub async fn delete_todo(&self, id: u64) -> Result<(), ApiError> {
    let url = self.url(&format!("{}/{}", TODOS, id))?;
    self.send(Method::DELETE, url, None).await?;
    Ok(())
  }

  fn url(&self, path: &str) -> Result<Url, ApiError> {
    let raw = format!("{}/{}", self.base_url, path);
    Url::parse(&raw).map_err(|e| ApiError::Request(format!("invalid url {}: {}", raw, e)))
  }

  /// Send a request, silently retrying idempotent methods at most once.
  ///
  /// POST is never retried: a create that timed out may still have landed.
  async fn send(
    &self,
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
  ) -> Result<reqwest::Response, ApiError> {
    let retries = if method == Method::POST { 0 } else { self.retries };
    let mut attempt = 0;

    loop {
      match self.send_once(method.clone(), url.clone(), body.clone()).await {
        Err(err) if err.is_retryable() && attempt < retries => {
          attempt += 1;
          debug!(%method, %url, error = %err, attempt, "Retrying request");
        }
        Err(err) => {
          warn!(%method, %url, error = %err, "Request failed");
          return Err(err);
        }
        Ok(response) => return Ok(response),
      }
    }
  }

  async fn send_once(
    &self,
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
  ) -> Result<reqwest::Response, ApiError> {
    let mut request = self.http.request(method, url);
    if let Some(body) = body {
      request = request.body(body);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
      return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ApiError::Status {
        status: status.as_u16(),
        body,
      });
    }

    Ok(response)
  }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
  let bytes = response.bytes().await?;
  Ok(serde_json::from_slice(&bytes)?)
}

impl Remote<Todo> for ApiClient {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<CacheValue<Todo>, ApiError>> {
    let client = self.clone();
    let key = key.clone();

    async move {
      match (key.resource(), key.id(), key.segments().len()) {
        (TODOS, None, 1) => client.list_todos().await.map(CacheValue::Collection),
        (TODOS, Some(id), 2) => client.get_todo(id).await.map(CacheValue::Detail),
        _ => Err(ApiError::Request(format!("no endpoint for query key {}", key))),
      }
    }
    .boxed()
  }

  fn create(&self, draft: NewTodo) -> BoxFuture<'static, Result<Todo, ApiError>> {
    let client = self.clone();
    async move { client.create_todo(&draft).await }.boxed()
  }

  fn update(&self, item: Todo) -> BoxFuture<'static, Result<Todo, ApiError>> {
    let client = self.clone();
    async move { client.update_todo(&item).await }.boxed()
  }

  fn delete(&self, id: u64) -> BoxFuture<'static, Result<(), ApiError>> {
    let client = self.clone();
    async move { client.delete_todo(id).await }.boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer, token: Option<&str>) -> ApiClient {
    let config = ApiConfig {
      base_url: server.uri(),
      timeout_ms: 500,
      ..ApiConfig::default()
    };
    ApiClient::new(&config, token).unwrap()
  }

  fn todo(id: u64, completed: bool) -> Todo {
    Todo {
      id,
      title: format!("todo {}", id),
      completed,
      user_id: 1,
    }
  }

  #[tokio::test]
  async fn test_list_sends_limit_and_decodes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/todos"))
      .and(query_param("_limit", "10"))
      .and(header("content-type", "application/json"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"userId": 1, "id": 1, "title": "todo 1", "completed": false},
        {"userId": 1, "id": 2, "title": "todo 2", "completed": true}
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let todos = client_for(&server, None).list_todos().await.unwrap();
    assert_eq!(todos, vec![todo(1, false), todo(2, true)]);
  }

  #[tokio::test]
  async fn test_update_puts_full_item() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
      .and(path("/todos/2"))
      .and(body_json(json!({"id": 2, "title": "todo 2", "completed": true, "userId": 1})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!(
        {"userId": 1, "id": 2, "title": "todo 2", "completed": true}
      )))
      .expect(1)
      .mount(&server)
      .await;

    let updated = client_for(&server, None)
      .update_todo(&todo(2, true))
      .await
      .unwrap();
    assert!(updated.completed);
  }

  #[tokio::test]
  async fn test_create_posts_draft_and_returns_assigned_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/todos"))
      .and(body_json(json!({"title": "new", "completed": false, "userId": 1})))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!(
        {"userId": 1, "id": 201, "title": "new", "completed": false}
      )))
      .expect(1)
      .mount(&server)
      .await;

    let created = client_for(&server, None)
      .create_todo(&NewTodo::new("new", 1))
      .await
      .unwrap();
    assert_eq!(created.id, 201);
  }

  #[tokio::test]
  async fn test_delete_sends_no_body() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
      .and(path("/todos/3"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
      .expect(1)
      .mount(&server)
      .await;

    client_for(&server, None).delete_todo(3).await.unwrap();
  }

  #[tokio::test]
  async fn test_bearer_token_is_injected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/todos/1"))
      .and(header("authorization", "Bearer secret"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!(
        {"userId": 1, "id": 1, "title": "todo 1", "completed": false}
      )))
      .expect(1)
      .mount(&server)
      .await;

    let fetched = client_for(&server, Some("secret")).get_todo(1).await.unwrap();
    assert_eq!(fetched, todo(1, false));
  }

  #[tokio::test]
  async fn test_unauthorized_maps_to_typed_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/todos/1"))
      .respond_with(ResponseTemplate::new(401))
      .expect(1)
      .mount(&server)
      .await;

    let err = client_for(&server, None).get_todo(1).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
  }

  #[tokio::test]
  async fn test_put_is_retried_once_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
      .and(path("/todos/2"))
      .respond_with(ResponseTemplate::new(502))
      .up_to_n_times(1)
      .expect(1)
      .mount(&server)
      .await;

    Mock::given(method("PUT"))
      .and(path("/todos/2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!(
        {"userId": 1, "id": 2, "title": "todo 2", "completed": true}
      )))
      .expect(1)
      .mount(&server)
      .await;

    let updated = client_for(&server, None)
      .update_todo(&todo(2, true))
      .await
      .unwrap();
    assert_eq!(updated.id, 2);
  }

  #[tokio::test]
  async fn test_retry_is_bounded_to_one() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
      .and(path("/todos/2"))
      .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
      .expect(2)
      .mount(&server)
      .await;

    let err = client_for(&server, None)
      .update_todo(&todo(2, true))
      .await
      .unwrap_err();
    assert_eq!(
      err,
      ApiError::Status {
        status: 500,
        body: "boom".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_create_is_never_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/todos"))
      .respond_with(ResponseTemplate::new(503))
      .expect(1)
      .mount(&server)
      .await;

    let err = client_for(&server, None)
      .create_todo(&NewTodo::new("new", 1))
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 503, .. }));
  }

  #[tokio::test]
  async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
      .and(path("/todos/9"))
      .respond_with(ResponseTemplate::new(404))
      .expect(1)
      .mount(&server)
      .await;

    let err = client_for(&server, None).delete_todo(9).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));
  }

  #[tokio::test]
  async fn test_timeout_surfaces_after_one_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/todos/1"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"userId": 1, "id": 1, "title": "t", "completed": false}))
          .set_delay(Duration::from_secs(2)),
      )
      .expect(2)
      .mount(&server)
      .await;

    let err = client_for(&server, None).get_todo(1).await.unwrap_err();
    assert_eq!(err, ApiError::Timeout);
  }

  #[tokio::test]
  async fn test_remote_fetch_routes_by_key_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/todos/5"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!(
        {"userId": 1, "id": 5, "title": "todo 5", "completed": false}
      )))
      .mount(&server)
      .await;

    let client = client_for(&server, None);
    let detail = client
      .fetch(&QueryKey::new(TODOS).with(5u64))
      .await
      .unwrap();
    assert_eq!(detail, CacheValue::Detail(todo(5, false)));

    let err = client.fetch(&QueryKey::new("users")).await.unwrap_err();
    assert!(matches!(err, ApiError::Request(_)));
  }
}
