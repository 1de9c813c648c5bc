//! HTTP implementation of the backend interface.
//!
//! Speaks the backend's REST API over `reqwest` and its realtime channel
//! over server-sent events. Construct with [`HttpBackend::builder`] or from
//! a [`Config`](crate::config::Config).

mod realtime;
mod session;

use crate::backend::{
    AuthMethods, AuthResponse, Backend, EventHandler, ExternalAuth, ListPage, ListQuery,
    OAuth2Provider, Session, SessionListener, Topic,
};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use realtime::Realtime;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use session::SessionState;
use std::sync::Arc;
use std::time::Duration;
use tether_codec::{Payload, RecordId};

/// Page size used when exhausting a collection.
const FULL_LIST_PAGE_SIZE: u32 = 500;

/// The production backend: REST over HTTP plus an SSE realtime channel.
pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
    session: Arc<SessionState>,
    realtime: Arc<Realtime>,
}

impl HttpBackend {
    /// Start building a backend.
    pub fn builder() -> HttpBackendBuilder {
        HttpBackendBuilder::new()
    }

    /// Build a backend from a [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::builder()
            .base_url(&config.base_url)
            .timeout(config.timeout)
            .build()
    }

    /// The backend's base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, collection)
    }

    fn collection_url(&self, collection: &str, tail: &str) -> String {
        format!("{}/api/collections/{}/{}", self.base_url, collection, tail)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(token) = self.session.token() {
            request = request.header("Authorization", token);
        }
        request
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(Error::from_status(status.as_u16(), error_message(response).await))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    fn apply_query(request: RequestBuilder, query: &ListQuery) -> RequestBuilder {
        let mut request = request;
        if let Some(filter) = &query.filter {
            request = request.query(&[("filter", filter)]);
        }
        if let Some(sort) = &query.sort {
            request = request.query(&[("sort", sort)]);
        }
        if let Some(expand) = &query.expand {
            request = request.query(&[("expand", expand)]);
        }
        request
    }

    /// Issue an auth call and adopt the returned session.
    async fn auth_call(&self, request: RequestBuilder) -> Result<AuthResponse> {
        #[derive(Deserialize)]
        struct AuthWire {
            token: String,
            record: Payload,
        }

        let wire: AuthWire = self.fetch_json(request).await?;
        self.session
            .set(Some(wire.token.clone()), Some(wire.record.clone()));
        Ok(AuthResponse {
            token: wire.token,
            record: wire.record,
        })
    }

    fn topic_key(collection: &str, topic: &Topic) -> String {
        match topic {
            Topic::All => collection.to_string(),
            Topic::Record(id) => format!("{collection}/{id}"),
        }
    }
}

async fn error_message(response: Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        query: &ListQuery,
    ) -> Result<ListPage<Payload>> {
        let request = self
            .request(Method::GET, self.records_url(collection))
            .query(&[("page", page), ("perPage", per_page)]);
        self.fetch_json(Self::apply_query(request, query)).await
    }

    async fn full_list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Payload>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .list(collection, page, FULL_LIST_PAGE_SIZE, query)
                .await?;
            let fetched = result.items.len();
            items.extend(result.items);
            if page >= result.total_pages || fetched < FULL_LIST_PAGE_SIZE as usize {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn first(&self, collection: &str, filter: &str) -> Result<Payload> {
        let result = self
            .list(collection, 1, 1, &ListQuery::default().filter(filter))
            .await?;
        result
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no record matching filter: {filter}")))
    }

    async fn one(&self, collection: &str, id: &RecordId) -> Result<Payload> {
        let url = format!("{}/{}", self.records_url(collection), id);
        self.fetch_json(self.request(Method::GET, url)).await
    }

    async fn create(&self, collection: &str, payload: &Payload) -> Result<Payload> {
        let request = self
            .request(Method::POST, self.records_url(collection))
            .json(payload);
        self.fetch_json(request).await
    }

    async fn update(&self, collection: &str, id: &RecordId, patch: &Payload) -> Result<Payload> {
        let url = format!("{}/{}", self.records_url(collection), id);
        let request = self.request(Method::PATCH, url).json(patch);
        self.fetch_json(request).await
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        let url = format!("{}/{}", self.records_url(collection), id);
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn subscribe(&self, collection: &str, topic: Topic, handler: EventHandler) -> Result<()> {
        Realtime::subscribe(&self.realtime, Self::topic_key(collection, &topic), handler).await
    }

    async fn unsubscribe(&self, collection: &str, topic: Topic) -> Result<()> {
        Realtime::unsubscribe(&self.realtime, &Self::topic_key(collection, &topic)).await
    }

    async fn unsubscribe_all(&self) -> Result<()> {
        self.realtime.unsubscribe_all();
        Ok(())
    }

    async fn auth_with_password(
        &self,
        collection: &str,
        identity: &str,
        password_hash: &str,
    ) -> Result<AuthResponse> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "auth-with-password"),
            )
            .json(&json!({ "identity": identity, "password": password_hash }));
        self.auth_call(request).await
    }

    async fn auth_with_oauth2(
        &self,
        collection: &str,
        provider: OAuth2Provider,
        code: &str,
        code_verifier: &str,
        redirect_url: &str,
        create_data: Option<&Payload>,
    ) -> Result<AuthResponse> {
        let mut body = json!({
            "provider": provider.as_str(),
            "code": code,
            "codeVerifier": code_verifier,
            "redirectUrl": redirect_url,
        });
        if let Some(create_data) = create_data {
            body["createData"] = serde_json::Value::Object(create_data.clone());
        }
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "auth-with-oauth2"),
            )
            .json(&body);
        self.auth_call(request).await
    }

    async fn auth_refresh(&self, collection: &str) -> Result<AuthResponse> {
        let request = self.request(Method::POST, self.collection_url(collection, "auth-refresh"));
        self.auth_call(request).await
    }

    async fn request_verification(&self, collection: &str, email: &str) -> Result<()> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "request-verification"),
            )
            .json(&json!({ "email": email }));
        self.execute(request).await?;
        Ok(())
    }

    async fn confirm_verification(&self, collection: &str, token: &str) -> Result<()> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "confirm-verification"),
            )
            .json(&json!({ "token": token }));
        self.execute(request).await?;
        Ok(())
    }

    async fn request_password_reset(&self, collection: &str, email: &str) -> Result<()> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "request-password-reset"),
            )
            .json(&json!({ "email": email }));
        self.execute(request).await?;
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        collection: &str,
        token: &str,
        password_hash: &str,
    ) -> Result<()> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "confirm-password-reset"),
            )
            .json(&json!({
                "token": token,
                "password": password_hash,
                "passwordConfirm": password_hash,
            }));
        self.execute(request).await?;
        Ok(())
    }

    async fn request_email_change(&self, collection: &str, new_email: &str) -> Result<()> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "request-email-change"),
            )
            .json(&json!({ "newEmail": new_email }));
        self.execute(request).await?;
        Ok(())
    }

    async fn confirm_email_change(
        &self,
        collection: &str,
        token: &str,
        password_hash: &str,
    ) -> Result<()> {
        let request = self
            .request(
                Method::POST,
                self.collection_url(collection, "confirm-email-change"),
            )
            .json(&json!({ "token": token, "password": password_hash }));
        self.execute(request).await?;
        Ok(())
    }

    async fn list_auth_methods(&self, collection: &str) -> Result<AuthMethods> {
        self.fetch_json(self.request(Method::GET, self.collection_url(collection, "auth-methods")))
            .await
    }

    async fn list_external_auths(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Vec<ExternalAuth>> {
        let url = format!("{}/{}/external-auths", self.records_url(collection), id);
        self.fetch_json(self.request(Method::GET, url)).await
    }

    async fn unlink_external_auth(
        &self,
        collection: &str,
        id: &RecordId,
        provider: OAuth2Provider,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/external-auths/{}",
            self.records_url(collection),
            id,
            provider.as_str()
        );
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    fn session(&self) -> Session {
        self.session.snapshot()
    }

    fn on_session_change(&self, listener: SessionListener) {
        self.session.listen(listener);
    }

    fn clear_session(&self) {
        self.session.clear();
    }

    fn file_url(&self, collection: &str, id: &RecordId, filename: &str) -> String {
        format!(
            "{}/api/files/{}/{}/{}",
            self.base_url, collection, id, filename
        )
    }
}

/// Builder for [`HttpBackend`].
#[derive(Debug, Default)]
pub struct HttpBackendBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl HttpBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL of the backend (scheme and host, e.g. `http://localhost:8090`).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Request timeout applied to every HTTP call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpBackend> {
        let raw = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;
        let parsed = Url::parse(raw.trim())
            .map_err(|e| Error::Config(format!("invalid base_url {raw:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "unsupported base_url scheme {:?}; expected http(s)",
                parsed.scheme()
            )));
        }
        let base_url = raw.trim().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .build()?;

        let session = Arc::new(SessionState::new());
        let realtime = Arc::new(Realtime::new(
            base_url.clone(),
            http.clone(),
            Arc::clone(&session),
        ));

        Ok(HttpBackend {
            base_url,
            http,
            session,
            realtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_base_url() {
        let result = HttpBackend::builder().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn builder_rejects_bad_urls() {
        for raw in ["not a url", "ftp://example.com"] {
            let result = HttpBackend::builder().base_url(raw).build();
            assert!(matches!(result, Err(Error::Config(_))), "accepted {raw:?}");
        }
    }

    #[test]
    fn builder_normalizes_trailing_slash() {
        let backend = HttpBackend::builder()
            .base_url("http://localhost:8090/")
            .build()
            .unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8090");
    }

    #[test]
    fn url_shapes() {
        let backend = HttpBackend::builder()
            .base_url("http://localhost:8090")
            .build()
            .unwrap();

        assert_eq!(
            backend.records_url("tasks"),
            "http://localhost:8090/api/collections/tasks/records"
        );
        assert_eq!(
            backend.collection_url("users", "auth-refresh"),
            "http://localhost:8090/api/collections/users/auth-refresh"
        );

        let id = RecordId::new("abc123def456789").unwrap();
        assert_eq!(
            backend.file_url("users", &id, "avatar.png"),
            "http://localhost:8090/api/files/users/abc123def456789/avatar.png"
        );
    }

    #[test]
    fn topic_keys() {
        let id = RecordId::new("abc123def456789").unwrap();
        assert_eq!(HttpBackend::topic_key("tasks", &Topic::All), "tasks");
        assert_eq!(
            HttpBackend::topic_key("tasks", &Topic::Record(id)),
            "tasks/abc123def456789"
        );
    }
}
