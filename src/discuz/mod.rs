//! Session-validated automation for Discuz-style forums.
//!
//! A [`Discuz`] borrows its provider's [`HttpClient`] for one handler call.
//! Every page fetched through [`Discuz::request`] must carry the logout link;
//! if it doesn't, the cookie is dead and the call fails with
//! [`AuthenticationError`]. There is no retry here.

pub mod parse;

use anyhow::{Context, Result, bail};
use futures::stream::{self, StreamExt};
use rand::RngExt;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::http::{HttpClient, Request};
use crate::store::ProviderData;

const CREDIT_PATH: &str = "home.php?mod=spacecp&ac=credit&op=base";
const SIGN_PATH: &str = "plugin.php?id=dsu_paulsign:sign";
const SEARCH_PATH: &str = "home.php?gender=0&startage=&endage=&avatarstatus=1&username=\
     &searchsubmit=true&op=sex&mod=spacecp&ac=search&type=base";

/// The page did not look logged-in; the stored cookie needs replacing.
#[derive(Debug, Error)]
#[error("login session expired, log in again ({url})")]
pub struct AuthenticationError {
    pub url: String,
}

/// Tunables for one forum family. Defaults match the dsu_paulsign/poke
/// plugins on traditional-Chinese Discuz boards.
#[derive(Debug, Clone)]
pub struct DiscuzOptions {
    pub view_count: usize,
    /// Populations at or below this size are treated as "no users".
    pub min_user_count: usize,
    pub poke_count: usize,
    pub poke_icon_id: u32,
    pub poke_note: String,
    pub sign_note: String,
    pub signed_marker: String,
    pub sign_form: String,
    pub poke_form: String,
    pub poke_success_marker: String,
    pub logged_in_marker: String,
    /// Upper bound on in-flight requests during views/poke fan-out.
    pub max_concurrency: usize,
}

impl Default for DiscuzOptions {
    fn default() -> Self {
        Self {
            view_count: 11,
            min_user_count: 2,
            poke_count: 10,
            poke_icon_id: 3,
            poke_note: "hello".to_string(),
            sign_note: "hello".to_string(),
            signed_marker: "您今天已經簽到過了".to_string(),
            sign_form: "#qiandao".to_string(),
            poke_form: "#ct form".to_string(),
            poke_success_marker: "已發送".to_string(),
            logged_in_marker: "action=logout".to_string(),
            max_concurrency: 16,
        }
    }
}

/// Where to go and who to be, taken from one record's data.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub base_url: String,
    pub headers: Vec<(String, String)>,
}

impl Session {
    pub fn new(base_url: &str, cookie: Option<&str>) -> Self {
        let headers = cookie
            .map(|c| vec![("Cookie".to_string(), c.to_string())])
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    /// Reads `base_url` (required) and `cookie`.
    pub fn from_data(data: &ProviderData) -> Result<Self> {
        let base_url = data
            .get("base_url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .context("provider data has no base_url")?;
        let cookie = data.get("cookie").and_then(|v| v.as_str());
        Ok(Self::new(base_url, cookie))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewsOutcome {
    /// Population guard tripped; nothing was fetched.
    NoUsers,
    /// Number of profile requests issued.
    Viewed(usize),
}

impl fmt::Display for ViewsOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewsOutcome::NoUsers => write!(f, "No users found"),
            ViewsOutcome::Viewed(n) => write!(f, "Viewed {n} user profiles"),
        }
    }
}

pub struct Discuz<'a> {
    http: &'a HttpClient,
    session: Session,
    options: &'a DiscuzOptions,
}

impl<'a> Discuz<'a> {
    pub fn new(http: &'a HttpClient, session: Session, options: &'a DiscuzOptions) -> Self {
        Self {
            http,
            session,
            options,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.session.base_url, path)
    }

    fn get(&self, url: impl Into<String>) -> Request {
        Request::get(url).headers(&self.session.headers)
    }

    fn post(&self, url: impl Into<String>) -> Request {
        Request::post(url).headers(&self.session.headers)
    }

    /// Resolve a form action against the base URL and flag it as an ajax call.
    fn ajax_action(&self, action: &str) -> String {
        let action = action.trim_matches('/');
        let url = if action.starts_with("http://") || action.starts_with("https://") {
            action.to_string()
        } else {
            self.url(action)
        };
        with_ajax(&url)
    }

    /// Fetch a page that must belong to a logged-in session.
    pub async fn request(&self, request: Request) -> Result<String> {
        let url = request.url().to_string();
        let text = self.http.text(request).await?;
        if !text.contains(&self.options.logged_in_marker) {
            return Err(AuthenticationError { url }.into());
        }
        Ok(text)
    }

    /// Credit summary from the "my credits" page, or empty if the page has none.
    pub async fn user_info(&self) -> Result<String> {
        let html = self.request(self.get(self.url(CREDIT_PATH))).await?;
        Ok(parse::credit_text(&html))
    }

    /// Daily check-in. Returns the "already signed" marker without posting
    /// when the sign page says so, otherwise the raw response to the post.
    pub async fn sign(&self) -> Result<String> {
        let html = self.request(self.get(self.url(SIGN_PATH))).await?;
        if html.contains(&self.options.signed_marker) {
            return Ok(self.options.signed_marker.clone());
        }

        let (mut params, action) = parse::form(&html, &self.options.sign_form);
        params.insert("todaysay".to_string(), self.options.sign_note.clone());

        let action = self.ajax_action(&action);
        self.http.text(self.post(action).form(params)).await
    }

    /// UIDs from the member search listing.
    pub async fn users(&self) -> Result<Vec<String>> {
        let html = self.request(self.get(self.url(SEARCH_PATH))).await?;
        Ok(parse::user_ids(&html))
    }

    /// Visit a random sample of member profiles, all at once.
    pub async fn views(&self) -> Result<ViewsOutcome> {
        let uids = self.users().await?;
        if uids.len() <= self.options.min_user_count {
            return Ok(ViewsOutcome::NoUsers);
        }

        let picked = sample(&uids, self.options.view_count);
        let requests = picked
            .iter()
            .map(|uid| self.http.send(self.get(self.url(&format!("space-uid-{uid}.html")))))
            .collect::<Vec<_>>();
        let responses: Vec<_> = stream::iter(requests)
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let failed = responses.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            debug!("{failed}/{} profile views failed", picked.len());
        }
        Ok(ViewsOutcome::Viewed(picked.len()))
    }

    /// Poke a random sample of members. Each poke stands alone: an error on
    /// one UID counts as "not sent" and the rest carry on.
    pub async fn poke(&self) -> Result<Vec<String>> {
        let uids = self.users().await?;
        if uids.len() <= self.options.min_user_count {
            return Ok(Vec::new());
        }

        let picked = sample(&uids, self.options.poke_count);
        let attempts = picked.iter().map(|uid| async move {
            match self.send_poke(uid).await {
                Ok(sent) => sent,
                Err(e) => {
                    debug!("poke uid {uid} failed: {e:#}");
                    false
                }
            }
        }).collect::<Vec<_>>();
        // `buffered` yields in dispatch order, so results line up with `picked`.
        let sent: Vec<bool> = stream::iter(attempts)
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        Ok(picked
            .iter()
            .zip(sent)
            .filter(|(_, sent)| *sent)
            .map(|(uid, _)| format!("用户 {uid} 的打招呼消息已发送。"))
            .collect())
    }

    async fn send_poke(&self, uid: &str) -> Result<bool> {
        let poke_url = self.url(&format!("home.php?mod=spacecp&ac=poke&op=send&uid={uid}"));
        let html = self.request(self.get(poke_url.as_str())).await?;

        let (mut params, _) = parse::form(&html, &self.options.poke_form);
        params.insert("iconid".to_string(), self.options.poke_icon_id.to_string());
        params.insert("note".to_string(), self.options.poke_note.clone());

        let body = self
            .http
            .text(self.post(with_ajax(&poke_url)).form(params))
            .await?;
        Ok(body.contains(&self.options.poke_success_marker))
    }
}

fn with_ajax(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}inajax=1")
}

/// `count` picks from `uids`, repeats allowed.
fn sample(uids: &[String], count: usize) -> Vec<String> {
    if uids.is_empty() {
        return Vec::new();
    }
    let mut rng = rand::rng();
    (0..count)
        .map(|_| uids[rng.random_range(0..uids.len())].clone())
        .collect()
}

/// Validate the options a provider was configured with.
pub fn check_options(options: &DiscuzOptions) -> Result<()> {
    if options.logged_in_marker.is_empty() {
        bail!("logged_in_marker must not be empty");
    }
    if options.max_concurrency == 0 {
        bail!("max_concurrency must be at least 1");
    }
    Ok(())
}
