#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use blog_avail::config::Platform;
use blog_avail::session::{Page, Transport};

// ---------------------------------------------------------------------------
// In-process transport
// ---------------------------------------------------------------------------

pub enum ApiReply {
    Body(&'static str),
    Status(u16),
    Unreachable,
}

enum Probe {
    Page(Page),
    Unreachable,
}

/// A [`Transport`] answering from canned pages, recording every request.
pub struct MockTransport {
    pub platform: Platform,
    probes: HashMap<String, Probe>,
    api: HashMap<String, ApiReply>,
    pub gets: RefCell<Vec<String>>,
    pub posts: RefCell<Vec<Post>>,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub url: String,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            platform: Platform::default(),
            probes: HashMap::new(),
            api: HashMap::new(),
            gets: RefCell::new(Vec::new()),
            posts: RefCell::new(Vec::new()),
        }
    }

    pub fn page(mut self, handle: &str, status: u16, body: &str) -> Self {
        let url = self.platform.blog_url_for(handle);
        let page = Page {
            url: url.clone(),
            status,
            body: body.into(),
            redirects: Vec::new(),
        };
        self.probes.insert(url, Probe::Page(page));
        self
    }

    pub fn taken(self, handle: &str) -> Self {
        let body = format!("{}<body>blocked</body></html>", self.platform.taken_marker);
        self.page(handle, 200, &body)
    }

    pub fn password(self, handle: &str) -> Self {
        let body = format!("<html><form {}></form></html>", self.platform.password_marker);
        self.page(handle, 200, &body)
    }

    pub fn private(mut self, handle: &str) -> Self {
        let url = self.platform.blog_url_for(handle);
        let page = Page {
            url: "https://www.tumblr.com/login".into(),
            status: 200,
            body: "<html>log in to see this blog</html>".into(),
            redirects: vec![format!("{}{handle}", self.platform.login_required_prefix)],
        };
        self.probes.insert(url, Probe::Page(page));
        self
    }

    pub fn probe_fails(mut self, handle: &str) -> Self {
        let url = self.platform.blog_url_for(handle);
        self.probes.insert(url, Probe::Unreachable);
        self
    }

    pub fn api(mut self, handle: &str, reply: ApiReply) -> Self {
        self.api.insert(handle.to_owned(), reply);
        self
    }

    pub fn api_calls(&self) -> usize {
        self.posts.borrow().len()
    }

    pub fn network_calls(&self) -> usize {
        self.gets.borrow().len() + self.posts.borrow().len()
    }
}

fn unreachable_error() -> ureq::Error {
    ureq::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<Page, ureq::Error> {
        self.gets.borrow_mut().push(url.to_owned());
        match self.probes.get(url) {
            Some(Probe::Page(page)) => Ok(page.clone()),
            Some(Probe::Unreachable) => Err(unreachable_error()),
            None => Ok(Page {
                url: url.to_owned(),
                status: 404,
                body: "<html>There's nothing here.</html>".into(),
                redirects: Vec::new(),
            }),
        }
    }

    fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page, ureq::Error> {
        self.posts.borrow_mut().push(Post {
            url: url.to_owned(),
            form: form.to_vec(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        });
        let name = form
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();
        let page = |status: u16, body: &str| Page {
            url: url.to_owned(),
            status,
            body: body.to_owned(),
            redirects: Vec::new(),
        };
        match self.api.get(name) {
            Some(ApiReply::Body(body)) => Ok(page(200, body)),
            Some(ApiReply::Status(status)) => Ok(page(*status, "")),
            Some(ApiReply::Unreachable) => Err(unreachable_error()),
            None => Ok(page(200, "")),
        }
    }
}

// ---------------------------------------------------------------------------
// Local HTTP service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value of a urlencoded form field.
    pub fn field(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(302, "").with_header("Location", location)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }
}

type Route = dyn Fn(&Request, &str) -> Reply + Send + Sync;

/// HTTP/1.1 server on an ephemeral localhost port, one thread per connection.
pub struct MockServer {
    pub base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl MockServer {
    pub fn start<F>(route: F) -> Self
    where
        F: Fn(&Request, &str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));
        let route: Arc<Route> = Arc::new(route);

        let server_base = base.clone();
        let server_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let route = Arc::clone(&route);
                let base = server_base.clone();
                let log = Arc::clone(&server_log);
                thread::spawn(move || serve(stream, &*route, &base, &log));
            }
        });

        Self { base, log }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn requested(&self, method: &str, path: &str) -> bool {
        self.requests()
            .iter()
            .any(|r| r.method == method && r.path == path)
    }

    pub fn platform(&self) -> Platform {
        let base = &self.base;
        Platform {
            login_url: format!("{base}/login"),
            login_form_id: "signup_form".into(),
            logout_url: format!("{base}/logout"),
            availability_url: format!("{base}/api/available"),
            origin: base.clone(),
            referer: format!("{base}/new/blog"),
            blog_url: format!("{base}/blog/{{handle}}/"),
            login_required_prefix: format!("{base}/login_required/"),
            ..Platform::default()
        }
    }
}

fn serve(stream: TcpStream, route: &Route, base: &str, log: &Mutex<Vec<Request>>) {
    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    let mut writer = write_half;
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        match reader.read_line(&mut request_line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_owned();
        let path = parts.next().unwrap_or_default().to_owned();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_owned(), value.trim().to_owned()));
            }
        }

        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }

        let request = Request {
            method,
            path,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        };
        let reply = route(&request, base);
        log.lock().unwrap().push(request);

        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: text/html; charset=utf-8\r\n",
            reply.status,
            reason(reply.status),
            reply.body.len()
        );
        for (name, value) in &reply.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        if writer.write_all(head.as_bytes()).is_err()
            || writer.write_all(reply.body.as_bytes()).is_err()
            || writer.flush().is_err()
        {
            return;
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// A small imitation of the platform
// ---------------------------------------------------------------------------

pub const SESSION_COOKIE: &str = "sid=s3cr3t";

pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<form id="search" action="/search"><input name="q" value=""></form>
<form id="signup_form" method="post" action="/login">
  <input type="hidden" name="form_key" value="abc123">
  <input type="text" name="determine_email">
  <input type="text" name="user[email]">
  <input type="password" name="user[password]">
  <button type="submit">Log in</button>
</form>
</body></html>"#;

/// Routes for a platform with a handful of known blogs:
///
/// | handle   | blog page                  | endpoint |
/// |----------|----------------------------|----------|
/// | `free`   | 404                        | `1`      |
/// | `gone`   | 404                        | empty    |
/// | `staff`  | taken marker               | empty    |
/// | `secret` | password form              | empty    |
/// | `priv`   | redirect to login_required | empty    |
/// | `weird`  | ordinary page              | `1`      |
/// | `broken` | 404                        | HTTP 500 |
pub fn platform_routes(request: &Request, base: &str) -> Reply {
    let platform = Platform::default();
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/login") => Reply::new(200, LOGIN_PAGE),
        ("POST", "/login") => {
            if request.field("user[password]").as_deref() == Some("hunter2") {
                Reply::redirect("/dashboard")
                    .with_header("Set-Cookie", format!("{SESSION_COOKIE}; Path=/"))
            } else {
                Reply::new(403, "bad credentials")
            }
        }
        ("GET", "/dashboard") => Reply::new(200, "<html>dashboard</html>"),
        ("GET", "/logout") => Reply::new(200, "<html>bye</html>"),
        ("GET", "/blog/staff/") => Reply::new(
            200,
            format!("{}<body>blocked</body></html>", platform.taken_marker),
        ),
        ("GET", "/blog/secret/") => Reply::new(
            200,
            format!("<html><form {}></form></html>", platform.password_marker),
        ),
        ("GET", "/blog/priv/") => Reply::redirect(format!("{base}/login_required/priv")),
        ("GET", "/login_required/priv") => Reply::new(200, "<html>log in first</html>"),
        ("GET", "/blog/weird/") => Reply::new(200, "<html>a blog</html>"),
        ("GET", _) => Reply::new(404, "<html>There's nothing here.</html>"),
        ("POST", "/api/available") => match request.field("name").as_deref() {
            Some("free" | "weird") => Reply::new(200, "1"),
            Some("broken") => Reply::new(500, "oops"),
            _ => Reply::new(200, ""),
        },
        _ => Reply::new(404, ""),
    }
}
