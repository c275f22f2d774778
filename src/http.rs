//! Lazily-built HTTP session shared by everything a provider does.
//!
//! One [`HttpClient`] belongs to one provider instance. The underlying
//! `reqwest::Client` (and its connection pool) is created on first use and
//! dropped by [`HttpClient::close`].

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Method, Response};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::consts::{DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT};

/// Form fields sent as `application/x-www-form-urlencoded`.
pub type FormParams = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Certificate verification. Off by default: the target sites are
    /// frequently served with broken chains.
    pub verify_tls: bool,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            verify_tls: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// A request description. Nothing goes on the wire until [`HttpClient::send`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    form: Option<FormParams>,
    timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            form: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<'a>(
        mut self,
        headers: impl IntoIterator<Item = &'a (String, String)>,
    ) -> Self {
        self.headers.extend(headers.into_iter().cloned());
        self
    }

    pub fn form(mut self, params: FormParams) -> Self {
        self.form = Some(params);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The method actually used: a form body always goes out as POST.
    pub fn effective_method(&self) -> Method {
        if self.form.is_some() {
            Method::POST
        } else {
            self.method.clone()
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn has_user_agent(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
    }
}

pub struct HttpClient {
    config: HttpConfig,
    inner: Mutex<Option<Client>>,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    /// The live client, built on first call. Cheap to clone.
    pub fn session(&self) -> Result<Client> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("http client lock poisoned"))?;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .danger_accept_invalid_certs(!self.config.verify_tls)
            .build()
            .context("failed to build http client")?;
        *guard = Some(client.clone());
        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Drop the client. A later request starts a fresh one.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.lock()
            && guard.take().is_some()
        {
            debug!("http session closed");
        }
    }

    pub async fn send(&self, request: Request) -> Result<Response> {
        let client = self.session()?;
        let method = request.effective_method();
        debug!("{} {}", method, request.url);

        let mut builder = client
            .request(method, &request.url)
            .timeout(request.timeout.unwrap_or(self.config.timeout));
        if !request.has_user_agent() {
            builder = builder.header(reqwest::header::USER_AGENT, &self.config.user_agent);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        builder
            .send()
            .await
            .with_context(|| format!("request to {} failed", request.url))
    }

    /// Send and read the body as text, whatever the status code.
    pub async fn text(&self, request: Request) -> Result<String> {
        let url = request.url.clone();
        let response = self.send(request).await?;
        response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_escalates_to_post() {
        let req = Request::get("http://x/").form(FormParams::new());
        assert_eq!(req.effective_method(), Method::POST);
        assert_eq!(Request::get("http://x/").effective_method(), Method::GET);
    }

    #[test]
    fn user_agent_detection_ignores_case() {
        assert!(Request::get("http://x/").header("USER-AGENT", "me").has_user_agent());
        assert!(!Request::get("http://x/").header("Cookie", "a=b").has_user_agent());
    }

    #[test]
    fn client_is_lazy_and_closable() {
        let http = HttpClient::new(HttpConfig::default());
        assert!(!http.is_open());
        http.session().unwrap();
        assert!(http.is_open());
        http.close();
        assert!(!http.is_open());
    }
}
