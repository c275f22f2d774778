use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vector::discuz::{AuthenticationError, DiscuzOptions};
use vector::http::HttpConfig;
use vector::provider::Provider;
use vector::provider::afraid::Afraid;
use vector::provider::jkforum::Jkforum;
use vector::store::ProviderData;

const LOGOUT_LINK: &str = r#"<a href="member.php?mod=logging&action=logout">退出</a>"#;

fn data(value: serde_json::Value) -> ProviderData {
    value.as_object().unwrap().clone()
}

fn page(body: &str) -> String {
    format!("<html><body>{LOGOUT_LINK}{body}</body></html>")
}

async fn mount_forum(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/home.php"))
        .and(query_param("ac", "credit"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page(r#"<div class="creditl"><em>金錢:</em> 5</div>"#)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home.php"))
        .and(query_param("ac", "search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(
            r#"<ul class="buddy">
                 <li class="bbda"><div class="avt"><a href="space-uid-1.html">a</a></div></li>
                 <li class="bbda"><div class="avt"><a href="space-uid-2.html">b</a></div></li>
                 <li class="bbda"><div class="avt"><a href="space-uid-3.html">c</a></div></li>
               </ul>"#,
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/space-uid-\d+\.html$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plugin.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page("您今天已經簽到過了")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home.php"))
        .and(query_param("ac", "poke"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(
            r#"<div id="ct"><form><input type="hidden" name="formhash" value="x"></form></div>"#,
        )))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/home.php"))
        .and(query_param("ac", "poke"))
        .respond_with(ResponseTemplate::new(200).set_body_string("已發送"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn jkforum_runs_the_daily_routine() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let provider = Jkforum::new(HttpConfig::default());

    let result = provider
        .handler(
            &data(json!({"base_url": server.uri(), "cookie": "auth=1"})),
            "main",
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.message, "Jkforum tasks completed");
    let payload = result.data.unwrap();
    assert_eq!(payload["user_info"], "金錢:5");
    assert_eq!(payload["views"], "Viewed 11 user profiles");
    assert_eq!(payload["sign"], "您今天已經簽到過了");
    assert_eq!(payload["poke"].as_array().unwrap().len(), 10);

    assert!(provider.http().is_open());
    provider.close().await;
    assert!(!provider.http().is_open());
}

#[test]
fn jkforum_with_options_rejects_bad_options() {
    let no_concurrency = DiscuzOptions {
        max_concurrency: 0,
        ..DiscuzOptions::default()
    };
    let err = Jkforum::with_options(HttpConfig::default(), no_concurrency)
        .err()
        .unwrap();
    assert!(err.to_string().contains("max_concurrency"));

    let no_marker = DiscuzOptions {
        logged_in_marker: String::new(),
        ..DiscuzOptions::default()
    };
    let err = Jkforum::with_options(HttpConfig::default(), no_marker)
        .err()
        .unwrap();
    assert!(err.to_string().contains("logged_in_marker"));

    assert!(Jkforum::with_options(HttpConfig::default(), DiscuzOptions::default()).is_ok());
}

#[tokio::test]
async fn jkforum_with_options_uses_custom_counts() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let options = DiscuzOptions {
        view_count: 4,
        poke_count: 2,
        max_concurrency: 1,
        ..DiscuzOptions::default()
    };
    let provider = Jkforum::with_options(HttpConfig::default(), options).unwrap();

    let result = provider
        .handler(
            &data(json!({"base_url": server.uri(), "cookie": "auth=1"})),
            "main",
        )
        .await
        .unwrap();

    let payload = result.data.unwrap();
    assert_eq!(payload["views"], "Viewed 4 user profiles");
    assert_eq!(payload["poke"].as_array().unwrap().len(), 2);
    provider.close().await;
}

#[tokio::test]
async fn jkforum_expired_cookie_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login first</html>"))
        .mount(&server)
        .await;
    let provider = Jkforum::new(HttpConfig::default());

    let err = provider
        .handler(&data(json!({"base_url": server.uri(), "cookie": "old"})), "main")
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<AuthenticationError>().is_some());
}

#[tokio::test]
async fn jkforum_requires_base_url() {
    let provider = Jkforum::new(HttpConfig::default());
    assert!(provider
        .handler(&data(json!({"cookie": "c"})), "main")
        .await
        .is_err());
}

#[tokio::test]
async fn afraid_login_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/zc.php"))
        .and(body_string_contains("username=alice"))
        .and(body_string_contains("action=auth"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Logged in as alice</p>"))
        .mount(&server)
        .await;
    let provider = Afraid::new(HttpConfig::default());

    let result = provider
        .handler(
            &data(json!({
                "username": "alice",
                "password": "pw",
                "login_url": format!("{}/zc.php?step=2", server.uri()),
            })),
            "alice",
        )
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.message, "Login successful for alice");
}

#[tokio::test]
async fn afraid_login_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Invalid login</p>"))
        .mount(&server)
        .await;
    let provider = Afraid::new(HttpConfig::default());

    let result = provider
        .handler(
            &data(json!({
                "username": "alice",
                "password": "bad",
                "login_url": format!("{}/zc.php", server.uri()),
            })),
            "alice",
        )
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Username not found in response page"));
}

#[tokio::test]
async fn afraid_missing_credentials() {
    let provider = Afraid::new(HttpConfig::default());
    let result = provider
        .handler(&data(json!({"username": "alice"})), "alice")
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.message, "Missing credentials");
}
