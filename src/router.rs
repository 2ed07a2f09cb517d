/// leadgate HTTP router
///
/// This module provides the small HTTP/1.1 front end the form pages talk to.
/// It allows for:
///
/// - Method, path and parameter-based routing of HTTP endpoints
/// - Global and route-specific middleware (pre and post)
/// - Reading `Content-Length` bodies, cookies and url-encoded forms
///
/// Connections are handled one request each and then closed.
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::intake::{IntakeOptions, Pipeline};
use crate::orm::Db;
use crate::session::SessionStore;
use crate::settings::Settings;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub settings: Settings,
    pub catalog: Arc<Catalog>,
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wires the pipeline to `db` as its store.
    pub fn new(db: Arc<Db>, settings: Settings, catalog: Catalog) -> Self {
        let catalog = Arc::new(catalog);
        let pipeline = Pipeline::new(db.clone(), catalog.clone(), IntakeOptions::from(&settings));
        let sessions = SessionStore::new(
            Duration::from_secs(settings.session.ttl_secs),
            settings.session.max_sessions,
        );
        AppState {
            db,
            settings,
            catalog,
            sessions: Arc::new(sessions),
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Represents the outcome of an HTTP handler.
/// Supports text, JSON, and custom status/headers.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Construct a new HTTP 200 response with text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response::with_status(200, body)
    }

    pub fn with_status(status_code: u16, body: impl Into<String>) -> Self {
        Response {
            status_code,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 403 response with text body.
    pub fn forbidden(body: impl Into<String>) -> Self {
        Response::with_status(403, body)
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Response::with_status(404, "404 Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Response::with_status(405, "405 Method Not Allowed")
    }

    /// Construct a new HTTP JSON response.
    /// Accepts any serde-serializable payload, status, and custom headers.
    pub fn json<T: Serialize>(
        data: T,
        status_code: u16,
        mut headers: HashMap<String, String>,
    ) -> Self {
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        match serde_json::to_string(&data) {
            Ok(body) => Response {
                status_code,
                body,
                headers,
            },
            Err(_) => Response {
                status_code: 500,
                body: "{\"error\": \"Serialization failed\"}".to_string(),
                headers,
            },
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Holds the parsed request and its extracted path parameters.
/// Middleware and handlers can modify/read this context.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub params: HashMap<String, String>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: Vec<u8>,
    pub start_time: Option<Instant>,
}

impl RequestContext {
    pub fn new(method: &str, path: &str) -> Self {
        RequestContext {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Decodes the body as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        parse_form(&String::from_utf8_lossy(&self.body))
    }
}

pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type alias for async handler functions for HTTP routes.
pub type Handler = Arc<dyn Fn(RequestContext, AppState) -> BoxResponse + Send + Sync>;

/// Boxes an async fn into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: RequestContext, state: AppState| Box::pin(f(ctx, state)) as BoxResponse)
}

/// Type alias for synchronous, pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Type alias for post-processing middleware executed after the handler.
/// Post-middleware can inspect/modify the response before it is sent.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

/// Represents a registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub method: String,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The application router.
/// Manages all HTTP routes and global middleware.
#[derive(Clone, Default)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

/// Serializes and sends an HTTP Response over a raw TCP socket connection.
async fn send_response(socket: &mut tokio::net::TcpStream, response: Response) {
    let mut headers = String::new();
    for (key, value) in response.headers {
        headers.push_str(&format!("{}: {}\r\n", key, value));
    }

    let response_text = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\
\r\n{}",
        response.status_code,
        status_text(response.status_code),
        response.body.len(),
        headers,
        response.body
    );

    if let Err(e) = socket.write_all(response_text.as_bytes()).await {
        log::debug!("Client went away before the response was written: {}", e);
    }
}

/// Maps status codes to HTTP status text for responses.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router::default()
    }

    /// Register an HTTP route with method, path pattern, handler, and any route-specific middleware.
    pub fn add_route(
        &mut self,
        method: &str,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    /// Runs one parsed request through middleware, the matching route and post-middleware.
    pub async fn handle(&self, mut ctx: RequestContext) -> Response {
        let mut response = self.dispatch(&mut ctx).await;
        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(&ctx, response);
        }
        response
    }

    async fn dispatch(&self, ctx: &mut RequestContext) -> Response {
        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(&mut *ctx) {
                return response;
            }
        }

        let mut path_matched = false;
        for route in &self.routes {
            let Some(params) = match_path(&route.path_pattern, &ctx.path) else {
                continue;
            };
            path_matched = true;
            if route.method != ctx.method {
                continue;
            }
            ctx.params = params;
            log::debug!("{} {} -> {}", ctx.method, ctx.path, route.path_pattern);

            for middleware in &route.middlewares {
                if let Some(response) = (middleware)(&mut *ctx) {
                    return response;
                }
            }
            let Some(state) = self.app_state.clone() else {
                log::error!("App state not set in Router");
                return Response::with_status(500, "500 Internal Server Error");
            };
            return (route.handler)(ctx.clone(), state).await;
        }

        if path_matched {
            Response::method_not_allowed()
        } else {
            Response::not_found()
        }
    }

    /// Start the HTTP server.
    /// Uses a classic TcpListener and manual HTTP parsing for fine-grained control.
    pub async fn run(self, settings: &Settings) -> Result<()> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let listener = TcpListener::bind(&addr).await?;
        log::info!("HTTP Server running on http://{}", addr);

        let router = Arc::new(self);
        let max_body = settings.max_body_bytes;
        loop {
            let (mut socket, peer) = listener.accept().await?;
            let router = router.clone();
            tokio::spawn(async move {
                let response = match read_request(&mut socket, max_body).await {
                    Ok(ctx) => router.handle(ctx).await,
                    Err(Error::PayloadTooLarge(limit)) => Response::with_status(
                        413,
                        format!("Request body exceeds {} bytes", limit),
                    ),
                    Err(e) => {
                        log::debug!("Bad request from {}: {}", peer, e);
                        Response::with_status(400, "400 Bad Request")
                    }
                };
                send_response(&mut socket, response).await;
            });
        }
    }
}

#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                stringify!($method),
                $path,
                $crate::router::handler($handler),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Reads one request: head up to the blank line, then a `Content-Length` body
/// of at most `max_body` bytes.
pub async fn read_request<R: AsyncRead + Unpin>(
    stream: &mut R,
    max_body: usize,
) -> Result<RequestContext> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(Error::Http("request head too large".into()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Http("connection closed mid-request".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let first_line = lines.next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(Error::Http(format!("bad request line `{}`", first_line)));
    };

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (target, None),
    };
    let mut ctx = RequestContext::new(method, path);
    ctx.query = query;

    for line in lines.filter(|l| !l.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::Http(format!("bad header `{}`", line)));
        };
        ctx.headers
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    ctx.cookies = ctx.header("cookie").map(parse_cookies).unwrap_or_default();

    let length: usize = match ctx.header("content-length") {
        Some(v) => v
            .parse()
            .map_err(|_| Error::Http(format!("bad content-length `{}`", v)))?,
        None => 0,
    };
    if length > max_body {
        return Err(Error::PayloadTooLarge(max_body));
    }

    let mut body = buf[head_end + 4..].to_vec();
    body.truncate(length);
    if body.len() < length {
        let start = body.len();
        body.resize(length, 0);
        stream.read_exact(&mut body[start..]).await?;
    }
    ctx.body = body;
    Ok(ctx)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Splits a `Cookie` header into name/value pairs.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Decodes an `application/x-www-form-urlencoded` string. Later duplicates win.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    form_urlencoded::parse(body.as_bytes()).into_owned().collect()
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}

/// Pre-middleware stamping the request start time for [`access_log`].
pub fn request_timer() -> Middleware {
    Arc::new(|ctx: &mut RequestContext| -> Option<Response> {
        ctx.start_time = Some(Instant::now());
        None
    })
}

/// Post-middleware logging method, path, status and latency.
pub fn access_log() -> PostMiddleware {
    Arc::new(|ctx: &RequestContext, response: Response| {
        let elapsed = ctx
            .start_time
            .map(|t| format!("{:?}", t.elapsed()))
            .unwrap_or_else(|| "-".to_string());
        log::info!(
            "{} {} {} {}",
            ctx.method,
            ctx.path,
            response.status_code,
            elapsed
        );
        response
    })
}
