use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::Provider;
use crate::discuz::{Discuz, DiscuzOptions, Session, check_options};
use crate::http::{HttpClient, HttpConfig};
use crate::result::HandlerResult;
use crate::store::ProviderData;

/// JKForum daily routine: credits, profile views, check-in, pokes.
///
/// Record data: `{"base_url": "...", "cookie": "..."}`.
pub struct Jkforum {
    http: HttpClient,
    options: DiscuzOptions,
}

impl Jkforum {
    pub const TYPE: &'static str = "jkforum";

    pub fn new(config: HttpConfig) -> Self {
        Self {
            http: HttpClient::new(config),
            options: DiscuzOptions::default(),
        }
    }

    pub fn with_options(config: HttpConfig, options: DiscuzOptions) -> Result<Self> {
        check_options(&options)?;
        Ok(Self {
            http: HttpClient::new(config),
            options,
        })
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }
}

#[async_trait]
impl Provider for Jkforum {
    async fn handler(&self, data: &ProviderData, name: &str) -> Result<HandlerResult> {
        let session = Session::from_data(data)?;
        let forum = Discuz::new(&self.http, session, &self.options);

        let user_info = forum.user_info().await?;
        info!(account = name, "user info: {user_info}");

        let views = forum.views().await?;
        info!(account = name, "views: {views}");

        let sign = forum.sign().await?;
        info!(account = name, "sign: {sign}");

        let pokes = forum.poke().await?;
        info!(account = name, "poke: {pokes:?}");

        Ok(HandlerResult::ok(
            "Jkforum tasks completed",
            Some(json!({
                "user_info": user_info,
                "views": views.to_string(),
                "sign": sign,
                "poke": pokes,
            })),
        ))
    }

    async fn close(&self) {
        self.http.close();
    }
}
