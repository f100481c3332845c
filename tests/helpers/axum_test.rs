// ABOUTME: Axum HTTP testing utilities for integration tests
// ABOUTME: Drives routers with tower oneshot; keeps status, headers, and body for assertions

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde::Serialize;
use tower::ServiceExt;

/// Helper to build and execute HTTP requests against Axum routers
pub struct AxumTestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl AxumTestRequest {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a new GET request
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Create a new POST request
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Create a new DELETE request
    #[allow(dead_code)]
    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Add a header to the request
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Send the SSO session cookie
    #[allow(dead_code)]
    pub fn sso_cookie(self, session_id: &str) -> Self {
        self.header(header::COOKIE.as_str(), &format!("gk_sso={session_id}"))
    }

    /// Add JSON body to the request
    #[allow(dead_code)]
    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        self.body = Some(serde_json::to_string(data).expect("Failed to serialize JSON"));
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            "application/json".to_owned(),
        ));
        self
    }

    /// Add a form-urlencoded body to the request
    #[allow(dead_code)]
    pub fn form<T: Serialize>(mut self, data: &T) -> Self {
        self.body = Some(serde_urlencoded::to_string(data).expect("Failed to encode form"));
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            "application/x-www-form-urlencoded".to_owned(),
        ));
        self
    }

    /// Execute the request against an Axum router
    pub async fn send(self, app: Router) -> AxumTestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.uri);

        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }

        let body = self.body.unwrap_or_default();
        let request = builder
            .body(Body::from(body))
            .expect("Failed to build request");

        let response = app
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        AxumTestResponse::from_response(response).await
    }
}

/// Wrapper around Axum HTTP response for testing
pub struct AxumTestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

#[allow(dead_code)]
impl AxumTestResponse {
    /// Create from response by eagerly reading the body
    async fn from_response(response: axum::http::Response<Body>) -> Self {
        use axum::body::to_bytes;
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get the response status code as u16 for easy assertion
    pub const fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Header value as a string
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|v| v.to_str().expect("Header is not ASCII").to_owned())
    }

    /// `Location` of a redirect
    pub fn location(&self) -> String {
        self.header(header::LOCATION.as_str())
            .expect("Response has no Location header")
    }

    /// SSO session id set by the response, if any
    pub fn sso_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookie| cookie.strip_prefix("gk_sso="))
            .and_then(|rest| rest.split(';').next())
            .map(str::to_owned)
    }

    /// Raw `Set-Cookie` values
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect()
    }

    /// Get the response body as a JSON value
    pub fn json<T: serde::de::DeserializeOwned>(self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to deserialize JSON response")
    }

    /// Get the response body as a string
    pub fn text(self) -> String {
        String::from_utf8(self.body).expect("Failed to decode response as UTF-8")
    }
}
