use leadgate::catalog::Catalog;
use leadgate::orm::Db;
use leadgate::router::*;
use leadgate::settings::Settings;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

async fn state() -> AppState {
    let db = Arc::new(Db::in_memory().await.unwrap());
    AppState::new(db, Settings::default(), Catalog::new(Vec::new()))
}

async fn echo_path(ctx: RequestContext, _state: AppState) -> Response {
    let id = ctx.params.get("id").cloned().unwrap_or_default();
    Response::ok(format!("{} {}", ctx.method, id))
}

// ========== Response struct (JSON, text) ==========

#[test]
fn test_response_ok() {
    let resp = Response::ok("hello world");
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "hello world");
    assert!(resp.headers.is_empty());
}

#[test]
fn test_response_forbidden_and_not_found() {
    let resp = Response::forbidden("nope");
    assert_eq!(resp.status_code, 403);
    assert_eq!(resp.body, "nope");

    let resp = Response::not_found();
    assert_eq!(resp.status_code, 404);
    assert!(resp.body.contains("404"));
}

#[test]
fn test_response_json_success() {
    let mut headers = HashMap::new();
    headers.insert("X-Test".into(), "yes".into());
    let resp = Response::json(json!({"foo": "bar"}), 201, headers);
    assert_eq!(resp.status_code, 201);
    assert_eq!(
        resp.headers.get("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert_eq!(resp.headers.get("X-Test").unwrap(), "yes");
    assert!(resp.body.contains("\"foo\":\"bar\""));
}

struct AlwaysFailsSerialize;

impl serde::Serialize for AlwaysFailsSerialize {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(serde::ser::Error::custom("Forced failure"))
    }
}

#[test]
fn test_response_json_error_branch() {
    let resp = Response::json(AlwaysFailsSerialize, 200, HashMap::new());
    assert_eq!(resp.status_code, 500);
    assert!(resp.body.contains("Serialization failed"));
}

#[test]
fn test_status_text_variants() {
    assert_eq!(status_text(200), "OK");
    assert_eq!(status_text(403), "Forbidden");
    assert_eq!(status_text(413), "Payload Too Large");
    assert_eq!(status_text(422), "Unprocessable Entity");
    assert_eq!(status_text(590), "Unknown");
}

// ========== path matching ==========

#[test]
fn test_static_and_param_matching() {
    assert!(match_path("/", "/").is_some());
    assert!(match_path("/plan", "/plan").is_some());
    let params = match_path("/user/:id", "/user/42").unwrap();
    assert_eq!(params.get("id"), Some(&"42".to_string()));
    assert!(match_path("/foo/bar", "/foo/bar/qux").is_none());
    assert!(match_path("/foo/:id", "/bar/99").is_none());
    assert!(match_path("/", "/plan").is_none());
}

// ========== request parsing ==========

#[test]
fn test_parse_form_decodes_values() {
    let form = parse_form("name=Rahim+Uddin&email=a%40b.com&note=&flag&x=%3Cb%3E");
    assert_eq!(form["name"], "Rahim Uddin");
    assert_eq!(form["email"], "a@b.com");
    assert_eq!(form["note"], "");
    assert_eq!(form["flag"], "");
    assert_eq!(form["x"], "<b>");
}

#[test]
fn test_parse_form_keeps_malformed_escapes() {
    let form = parse_form("a=100%&b=%zz&c=%E0%A6%A2&c=last");
    assert_eq!(form["a"], "100%");
    assert_eq!(form["b"], "%zz");
    assert_eq!(form["c"], "last");
    assert_eq!(parse_form("city=%E0%A6%A2%E0%A6%BE%E0%A6%95%E0%A6%BE")["city"], "ঢাকা");
}

#[test]
fn test_parse_cookies() {
    let cookies = parse_cookies("a=1; leadgate_sid=abc ;theme=dark");
    assert_eq!(cookies["a"], "1");
    assert_eq!(cookies["leadgate_sid"], "abc");
    assert_eq!(cookies["theme"], "dark");
}

#[tokio::test]
async fn test_read_request_with_body() {
    let raw = b"POST /plan?x=1 HTTP/1.1\r\nHost: localhost\r\nCookie: leadgate_sid=s1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 19\r\n\r\nform_type=plan&a=b+";
    let mut stream = &raw[..];
    let ctx = read_request(&mut stream, 1024).await.unwrap();
    assert_eq!(ctx.method, "POST");
    assert_eq!(ctx.path, "/plan");
    assert_eq!(ctx.query.as_deref(), Some("x=1"));
    assert_eq!(ctx.header("Host"), Some("localhost"));
    assert_eq!(ctx.cookie("leadgate_sid"), Some("s1"));
    let form = ctx.form();
    assert_eq!(form["form_type"], "plan");
    assert_eq!(form["a"], "b ");
}

#[tokio::test]
async fn test_read_request_rejects_large_body() {
    let raw = b"POST / HTTP/1.1\r\nContent-Length: 5000\r\n\r\n";
    let mut stream = &raw[..];
    let err = read_request(&mut stream, 1024).await.unwrap_err();
    assert!(matches!(err, leadgate::Error::PayloadTooLarge(1024)));
}

#[tokio::test]
async fn test_read_request_rejects_truncated_head() {
    let raw = b"GET / HTTP/1.1\r\nHost: x\r\n";
    let mut stream = &raw[..];
    assert!(read_request(&mut stream, 1024).await.is_err());
}

// ========== dispatch ==========

#[tokio::test]
async fn test_handle_routes_by_method_and_path() {
    let mut router = Router::new();
    router.add_route("GET", "/user/:id", handler(echo_path), vec![]);
    router.set_app_state(state().await);

    let resp = router.handle(RequestContext::new("GET", "/user/7")).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "GET 7");

    let resp = router.handle(RequestContext::new("POST", "/user/7")).await;
    assert_eq!(resp.status_code, 405);

    let resp = router.handle(RequestContext::new("GET", "/nowhere")).await;
    assert_eq!(resp.status_code, 404);
}

#[tokio::test]
async fn test_route_macro_registers_methods() {
    let mut router = Router::new();
    leadgate::route!(router,
        GET "/a" => { echo_path },
        POST "/a" => { echo_path },
    );
    assert_eq!(router.routes.len(), 2);
    assert_eq!(router.routes[0].method, "GET");
    assert_eq!(router.routes[1].method, "POST");
}

#[tokio::test]
async fn test_middleware_and_post_middleware() {
    let before: Middleware = Arc::new(|ctx: &mut RequestContext| {
        if ctx.path == "/blocked" {
            Some(Response::forbidden("block"))
        } else {
            None
        }
    });
    let post: PostMiddleware = Arc::new(|_ctx: &RequestContext, mut resp: Response| {
        resp.body = format!("{}+PM", resp.body);
        resp
    });

    let mut router = Router::new();
    router.add_middleware(before);
    router.add_post_middleware(post);
    router.add_route("GET", "/blocked", handler(echo_path), vec![]);
    router.add_route("GET", "/open/:id", handler(echo_path), vec![]);
    router.set_app_state(state().await);

    let resp = router.handle(RequestContext::new("GET", "/blocked")).await;
    assert_eq!(resp.status_code, 403);
    assert_eq!(resp.body, "block+PM");

    let resp = router.handle(RequestContext::new("GET", "/open/1")).await;
    assert_eq!(resp.body, "GET 1+PM");
}

#[tokio::test]
async fn test_route_middleware_can_rewrite_params() {
    let rewrite: Middleware = Arc::new(|ctx: &mut RequestContext| -> Option<Response> {
        ctx.params.insert("id".to_string(), "overridden".to_string());
        None
    });
    let mut router = Router::new();
    router.add_route("GET", "/hi/:id", handler(echo_path), vec![rewrite]);
    router.set_app_state(state().await);

    let resp = router.handle(RequestContext::new("GET", "/hi/tomato")).await;
    assert_eq!(resp.body, "GET overridden");
}

#[tokio::test]
async fn test_missing_state_is_server_error() {
    let mut router = Router::new();
    router.add_route("GET", "/", handler(echo_path), vec![]);
    let resp = router.handle(RequestContext::new("GET", "/")).await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_request_timer_feeds_access_log() {
    let mut router = Router::new();
    router.add_middleware(request_timer());
    router.add_post_middleware(access_log());
    router.add_route("GET", "/x/:id", handler(echo_path), vec![]);
    router.set_app_state(state().await);

    let resp = router.handle(RequestContext::new("get", "/x/1")).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "GET 1");
}
