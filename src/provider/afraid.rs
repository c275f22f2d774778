use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::Provider;
use crate::http::{FormParams, HttpClient, HttpConfig, Request};
use crate::result::HandlerResult;
use crate::store::ProviderData;

const LOGIN_URL: &str = "https://freedns.afraid.org/zc.php?step=2";

/// FreeDNS (afraid.org) credential check.
///
/// Record data: `{"username": "...", "password": "..."}`, optionally
/// `"login_url"` to point somewhere other than freedns.afraid.org.
pub struct Afraid {
    http: HttpClient,
}

impl Afraid {
    pub const TYPE: &'static str = "afraid";

    pub fn new(config: HttpConfig) -> Self {
        Self {
            http: HttpClient::new(config),
        }
    }
}

fn field<'a>(data: &'a ProviderData, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Provider for Afraid {
    async fn handler(&self, data: &ProviderData, _name: &str) -> Result<HandlerResult> {
        let (Some(username), Some(password)) = (field(data, "username"), field(data, "password"))
        else {
            return Ok(HandlerResult::fail(
                "Missing credentials",
                Some("username or password not provided".to_string()),
            ));
        };
        let login_url = field(data, "login_url").unwrap_or(LOGIN_URL);

        info!("checking login for user: {username}");

        let params = FormParams::from([
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
            ("submit".to_string(), "Login".to_string()),
            ("action".to_string(), "auth".to_string()),
        ]);
        let html = self
            .http
            .text(Request::post(login_url).form(params))
            .await?;

        if html.contains(username) {
            Ok(HandlerResult::ok(
                format!("Login successful for {username}"),
                None,
            ))
        } else {
            Ok(HandlerResult::fail(
                format!("Login failed for {username}"),
                Some("Username not found in response page".to_string()),
            ))
        }
    }

    async fn close(&self) {
        self.http.close();
    }
}
