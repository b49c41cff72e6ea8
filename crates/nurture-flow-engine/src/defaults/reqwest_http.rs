//! [`HttpCaller`] over a shared `reqwest::Client`.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HttpCallError;
use crate::traits::{HttpCall, HttpCaller, HttpReply};
use crate::types::HttpMethod;

#[derive(Clone, Default)]
pub struct ReqwestHttpCaller {
    client: reqwest::Client,
}

impl ReqwestHttpCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl HttpCaller for ReqwestHttpCaller {
    async fn call(&self, request: HttpCall) -> Result<HttpReply, HttpCallError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| HttpCallError::InvalidRequest {
            message: format!("invalid url '{}': {e}", request.url),
        })?;

        let mut builder = self
            .client
            .request(to_method(request.method), url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpCallError::Timeout {
                    timeout_ms: request.timeout.as_millis() as u64,
                }
            } else if e.is_builder() {
                HttpCallError::InvalidRequest { message: e.to_string() }
            } else {
                HttpCallError::Transport { message: e.to_string() }
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| HttpCallError::Transport {
            message: format!("failed to read response body: {e}"),
        })?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn call(method: HttpMethod, url: String) -> HttpCall {
        HttpCall {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn get_parses_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"plan": "pro"})))
            .mount(&server)
            .await;

        let reply = ReqwestHttpCaller::new()
            .call(call(HttpMethod::Get, format!("{}/contacts/1", server.uri())))
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, json!({"plan": "pro"}));
    }

    #[tokio::test]
    async fn post_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-api-key", "secret"))
            .and(body_json(json!({"contact": "c1"})))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&server)
            .await;

        let mut request = call(HttpMethod::Post, format!("{}/hook", server.uri()));
        request.headers.insert("x-api-key".into(), "secret".into());
        request.body = Some(json!({"contact": "c1"}));

        let reply = ReqwestHttpCaller::new().call(request).await.unwrap();
        assert_eq!(reply.status, 201);
        assert_eq!(reply.body, json!("created"));
    }

    #[tokio::test]
    async fn error_statuses_are_replies_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let reply = ReqwestHttpCaller::new()
            .call(call(HttpMethod::Get, server.uri()))
            .await
            .unwrap();
        assert_eq!(reply.status, 503);
        assert!(reply.is_retryable());
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let mut request = call(HttpMethod::Get, server.uri());
        request.timeout = Duration::from_millis(50);
        let err = ReqwestHttpCaller::new().call(request).await.unwrap_err();
        assert!(matches!(err, HttpCallError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test]
    async fn bad_url_is_not_retryable() {
        let err = ReqwestHttpCaller::new()
            .call(call(HttpMethod::Get, "not a url".into()))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
