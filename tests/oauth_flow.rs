//! End-to-end login flow tests against mock provider endpoints.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::json;

use social_auth::error::{
    CallbackErrorKind, Error, ErrorKind, ExchangeErrorKind, HttpErrorKind, StateErrorKind,
};
use social_auth::oauth::{
    AuthFlow, CallbackParams, CanonicalProfile, LoginDelegate, ProviderKind, SessionResult,
};
use social_auth::registry::{ProviderConfig, ProviderEndpoints, Registry};

/// Delegate that mints a fixed session and counts invocations.
struct CountingDelegate {
    calls: AtomicUsize,
}

impl CountingDelegate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginDelegate for CountingDelegate {
    async fn login_with_profile(
        &self,
        profile: &CanonicalProfile,
    ) -> Result<SessionResult, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SessionResult {
            session_token: format!("session-for-{}", profile.external_id),
        })
    }
}

fn endpoints_for(server: &mockito::ServerGuard, with_emails: bool) -> ProviderEndpoints {
    ProviderEndpoints {
        authorize: format!("{}/authorize", server.url()),
        token: format!("{}/token", server.url()),
        userinfo: format!("{}/user", server.url()),
        user_emails: with_emails.then(|| format!("{}/user/emails", server.url())),
    }
}

fn state_param(url: &str) -> String {
    let parsed = url::Url::parse(url).unwrap();
    parsed
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

fn github_flow(
    server: &mockito::ServerGuard,
    delegate: Arc<CountingDelegate>,
) -> AuthFlow {
    let config = ProviderConfig::github(
        "gh-client-id".to_string(),
        "gh-secret".to_string(),
        "https://app.example.com/callback".to_string(),
    )
    .with_endpoints(endpoints_for(server, true));
    AuthFlow::new(Arc::new(Registry::new(vec![config]).unwrap()), delegate)
}

#[tokio::test]
async fn github_full_flow_and_state_replay() {
    let mut server = mockito::Server::new_async().await;

    let token_mock = server
        .mock("POST", "/token")
        .match_header("accept", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "client_id": "gh-client-id",
            "client_secret": "gh-secret",
            "code": "good-code",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"gho_abc","token_type":"bearer","scope":"read:user"}"#)
        .create_async()
        .await;

    let user_mock = server
        .mock("GET", "/user")
        .match_header("authorization", "Bearer gho_abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":42,"login":"octocat","name":"The Octocat","email":null,"avatar_url":"https://avatars.example/42"}"#)
        .create_async()
        .await;

    let emails_mock = server
        .mock("GET", "/user/emails")
        .match_header("authorization", "Bearer gho_abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"email":"second@example.com","primary":false},{"email":"primary@example.com","primary":true}]"#,
        )
        .create_async()
        .await;

    let delegate = CountingDelegate::new();
    let flow = github_flow(&server, delegate.clone());

    let url = flow.authorization_url(ProviderKind::Github).unwrap();
    assert!(url.contains("client_id=gh-client-id"));
    assert!(url.contains("response_type=code"));
    let state = state_param(&url);
    assert!(state.len() >= 32);

    let outcome = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("good-code".to_string()),
            state: state.clone(),
            error: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.profile.external_id, "42");
    assert_eq!(outcome.profile.display_name, "The Octocat");
    assert_eq!(outcome.profile.email, "primary@example.com");
    assert_eq!(outcome.profile.provider, ProviderKind::Github);
    assert_eq!(outcome.profile.raw["login"], "octocat");
    assert_eq!(outcome.session.session_token, "session-for-42");
    assert_eq!(delegate.call_count(), 1);

    // Replaying the consumed state must never succeed again.
    let err = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("good-code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.error_kind,
        ErrorKind::State(StateErrorKind::AlreadyConsumed)
    );
    assert_eq!(delegate.call_count(), 1);

    token_mock.assert_async().await;
    user_mock.assert_async().await;
    emails_mock.assert_async().await;
}

#[tokio::test]
async fn github_email_fallback_to_first_entry() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"gho_abc","token_type":"bearer"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":7,"login":"hubber","email":null}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user/emails")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"email":"first@example.com","primary":false},{"email":"second@example.com","primary":false}]"#)
        .create_async()
        .await;

    let flow = github_flow(&server, CountingDelegate::new());
    let state = state_param(&flow.authorization_url(ProviderKind::Github).unwrap());

    let outcome = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap();

    // No entry is flagged primary, so the first one wins.
    assert_eq!(outcome.profile.email, "first@example.com");
}

#[tokio::test]
async fn github_email_synthesized_when_none_available() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"gho_abc","token_type":"bearer"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":7,"login":"hubber","email":null}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/user/emails")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let flow = github_flow(&server, CountingDelegate::new());
    let state = state_param(&flow.authorization_url(ProviderKind::Github).unwrap());

    let outcome = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.profile.email, "hubber@github.local");
}

#[tokio::test]
async fn wechat_full_flow_with_synthesized_email() {
    let mut server = mockito::Server::new_async().await;

    let token_mock = server
        .mock("GET", "/token")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("appid".into(), "wx-app-id".into()),
            Matcher::UrlEncoded("secret".into(), "wx-secret".into()),
            Matcher::UrlEncoded("code".into(), "wx-code".into()),
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"wx_token","expires_in":7200,"refresh_token":"wx_refresh","openid":"OPENID123","scope":"snsapi_login"}"#)
        .create_async()
        .await;

    let user_mock = server
        .mock("GET", "/user")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("access_token".into(), "wx_token".into()),
            Matcher::UrlEncoded("openid".into(), "OPENID123".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"openid":"OPENID123","nickname":"Wei","headimgurl":"https://wx.example/head.png"}"#)
        .create_async()
        .await;

    let config = ProviderConfig::wechat(
        "wx-app-id".to_string(),
        "wx-secret".to_string(),
        "https://app.example.com/callback".to_string(),
    )
    .with_endpoints(endpoints_for(&server, false));
    let flow = AuthFlow::new(
        Arc::new(Registry::new(vec![config]).unwrap()),
        CountingDelegate::new(),
    );

    let url = flow.authorization_url(ProviderKind::Wechat).unwrap();
    assert!(url.contains("appid=wx-app-id"));
    assert!(!url.contains("client_id="));
    assert!(url.ends_with("#wechat_redirect"));

    let state = state_param(&url);
    let outcome = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Wechat,
            code: Some("wx-code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.profile.external_id, "OPENID123");
    assert_eq!(outcome.profile.display_name, "Wei");
    assert_eq!(outcome.profile.email, "OPENID123@wechat.local");
    assert_eq!(outcome.profile.provider, ProviderKind::Wechat);

    token_mock.assert_async().await;
    user_mock.assert_async().await;
}

#[tokio::test]
async fn wechat_in_band_errcode_is_a_failure() {
    let mut server = mockito::Server::new_async().await;

    // Transport says 200, the payload says otherwise.
    server
        .mock("GET", "/token")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errcode":40001,"errmsg":"invalid credential"}"#)
        .create_async()
        .await;

    let config = ProviderConfig::wechat(
        "wx-app-id".to_string(),
        "wx-secret".to_string(),
        "https://app.example.com/callback".to_string(),
    )
    .with_endpoints(endpoints_for(&server, false));
    let flow = AuthFlow::new(
        Arc::new(Registry::new(vec![config]).unwrap()),
        CountingDelegate::new(),
    );

    let state = state_param(&flow.authorization_url(ProviderKind::Wechat).unwrap());
    let err = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Wechat,
            code: Some("wx-code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err.error_kind,
        ErrorKind::Exchange(ExchangeErrorKind::ProviderApi {
            code: 40001,
            message: "invalid credential".to_string(),
        })
    );
}

#[tokio::test]
async fn google_full_flow() {
    let mut server = mockito::Server::new_async().await;

    let token_mock = server
        .mock("POST", "/token")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), "g-client-id".into()),
            Matcher::UrlEncoded("client_secret".into(), "g-secret".into()),
            Matcher::UrlEncoded("code".into(), "g-code".into()),
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"ya29.token","token_type":"Bearer","expires_in":3599,"scope":"openid email profile"}"#)
        .create_async()
        .await;

    let user_mock = server
        .mock("GET", "/user")
        .match_header("authorization", "Bearer ya29.token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"108","email":"user@gmail.com","name":"G User","picture":"https://g.example/pic"}"#)
        .create_async()
        .await;

    let config = ProviderConfig::google(
        "g-client-id".to_string(),
        "g-secret".to_string(),
        "https://app.example.com/callback".to_string(),
    )
    .with_endpoints(endpoints_for(&server, false));
    let flow = AuthFlow::new(
        Arc::new(Registry::new(vec![config]).unwrap()),
        CountingDelegate::new(),
    );

    let state = state_param(&flow.authorization_url(ProviderKind::Google).unwrap());
    let outcome = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Google,
            code: Some("g-code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.profile.external_id, "108");
    assert_eq!(outcome.profile.email, "user@gmail.com");
    assert_eq!(outcome.profile.provider, ProviderKind::Google);

    token_mock.assert_async().await;
    user_mock.assert_async().await;
}

#[tokio::test]
async fn provider_denied_makes_no_network_calls() {
    let mut server = mockito::Server::new_async().await;

    // Any request to the mock server would fail the test.
    let token_mock = server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;
    let user_mock = server.mock("GET", "/user").expect(0).create_async().await;

    let delegate = CountingDelegate::new();
    let flow = github_flow(&server, delegate.clone());
    let state = state_param(&flow.authorization_url(ProviderKind::Github).unwrap());

    let err = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("code".to_string()),
            state,
            error: Some("access_denied".to_string()),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err.error_kind,
        ErrorKind::Callback(CallbackErrorKind::ProviderDenied)
    );
    assert_eq!(delegate.call_count(), 0);

    token_mock.assert_async().await;
    user_mock.assert_async().await;
}

#[tokio::test]
async fn stalled_token_endpoint_surfaces_as_timeout() {
    use tokio::io::AsyncReadExt;

    // A server that accepts connections, reads the request, and never
    // responds. The configured per-call timeout has to fire.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });

    let config = ProviderConfig::github(
        "gh-client-id".to_string(),
        "gh-secret".to_string(),
        "https://app.example.com/callback".to_string(),
    )
    .with_endpoints(ProviderEndpoints {
        authorize: format!("http://{}/authorize", addr),
        token: format!("http://{}/token", addr),
        userinfo: format!("http://{}/user", addr),
        user_emails: None,
    })
    .with_timeout(std::time::Duration::from_millis(200));

    let flow = AuthFlow::new(
        Arc::new(Registry::new(vec![config]).unwrap()),
        CountingDelegate::new(),
    );
    let state = state_param(&flow.authorization_url(ProviderKind::Github).unwrap());

    let err = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.error_kind, ErrorKind::Http(HttpErrorKind::Timeout));
}

#[tokio::test]
async fn token_exchange_http_failure() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", "/token")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let flow = github_flow(&server, CountingDelegate::new());
    let state = state_param(&flow.authorization_url(ProviderKind::Github).unwrap());

    let err = flow
        .handle_callback(CallbackParams {
            provider: ProviderKind::Github,
            code: Some("code".to_string()),
            state,
            error: None,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err.error_kind,
        ErrorKind::Exchange(ExchangeErrorKind::TokenExchangeFailed)
    );
}
