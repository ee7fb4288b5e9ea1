//! Login and upload against a throwaway HTTP responder on 127.0.0.1.

use multiview_tasks::api::{ApiClient, LoginRequest, TaskRequest};
use multiview_tasks::batch::{self, Outcome, Summary};
use multiview_tasks::config::Config;
use multiview_tasks::discovery::ViewSet;
use multiview_tasks::error::ApiError;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
    /// Close the socket without answering.
    hang_up: bool,
}

impl Reply {
    fn new(status: u16, body: &str) -> Self {
        Reply {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            hang_up: false,
        }
    }

    fn hang_up() -> Self {
        Reply {
            hang_up: true,
            ..Reply::new(0, "")
        }
    }

    fn cookie(mut self, cookie: &str) -> Self {
        self.headers.push(("Set-Cookie", cookie.to_string()));
        self
    }
}

/// Serves one request per connection until the test process exits.
fn serve<F>(handler: F) -> (String, Arc<Mutex<Vec<Recorded>>>)
where
    F: Fn(&Recorded) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let Some(req) = read_request(&stream) else { continue };
            let reply = handler(&req);
            sink.lock().expect("log lock").push(req);
            write_reply(stream, reply);
        }
    });

    (format!("http://{addr}"), log)
}

fn read_request(stream: &TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (k, v) = line.split_once(':')?;
        headers.push((k.trim().to_ascii_lowercase(), v.trim().to_string()));
    }

    let find = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    let mut body = Vec::new();
    if let Some(len) = find("content-length") {
        body.resize(len.parse().ok()?, 0);
        reader.read_exact(&mut body).ok()?;
    } else if find("transfer-encoding").is_some_and(|v| v.contains("chunked")) {
        loop {
            let mut size = String::new();
            reader.read_line(&mut size).ok()?;
            let size = usize::from_str_radix(size.trim().split(';').next()?, 16).ok()?;
            if size == 0 {
                let mut trailer = String::new();
                while reader.read_line(&mut trailer).ok()? > 2 {
                    trailer.clear();
                }
                break;
            }
            let mut chunk = vec![0; size + 2];
            reader.read_exact(&mut chunk).ok()?;
            chunk.truncate(size);
            body.extend(chunk);
        }
    }

    Some(Recorded {
        method,
        path,
        headers,
        body,
    })
}

fn write_reply(mut stream: TcpStream, reply: Reply) {
    if reply.hang_up {
        let _ = stream.shutdown(std::net::Shutdown::Both);
        return;
    }
    let mut out = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.body.len()
    );
    for (k, v) in reply.headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(&reply.body);
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.flush();
}

fn write_views(dir: &Path, session: &str, part: u32, views: u32) -> Vec<PathBuf> {
    fs::create_dir_all(dir).expect("mkdir");
    (1..=views)
        .map(|view| {
            let path = dir.join(format!("{session}-View{view}-Part{part}.mp4"));
            fs::write(&path, format!("video-bytes-{view}")).expect("write view");
            path
        })
        .collect()
}

fn cvat_like(req: &Recorded) -> Reply {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/api/auth/login") => {
            Reply::new(405, "{}").cookie("csrftoken=tok123; Path=/")
        }
        ("POST", "/api/auth/login") => {
            if req.body_text().contains("\"password\":\"secret\"") {
                Reply::new(200, "{}").cookie("sessionid=s1; Path=/")
            } else {
                Reply::new(400, r#"{"detail":"bad credentials"}"#)
            }
        }
        ("POST", "/api/tasks/create_multiview") => {
            Reply::new(201, r#"{"id": 42, "name": "created", "dimension": "2d"}"#)
        }
        _ => Reply::new(404, "{}"),
    }
}

#[test]
fn login_then_create_sends_csrf_cookie_and_form_fields() {
    let tmp = TempDir::new().expect("tempdir");
    let views = write_views(&tmp.path().join("01"), "00", 1, 2);
    let (host, log) = serve(cvat_like);

    let mut api = ApiClient::new(&host).expect("client");
    api.set_org(Some("team".into()));
    api.login(&LoginRequest {
        username: "admin".into(),
        password: "secret".into(),
    })
    .expect("login");
    assert_eq!(api.csrf_token().as_deref(), Some("tok123"));

    let task = api
        .create_multiview_task(&TaskRequest {
            name: "ds_01-00-Part1".into(),
            session_id: "00".into(),
            part_number: 1,
            views,
        })
        .expect("task created");
    assert_eq!(task.id, 42);
    assert_eq!(task.dimension.as_deref(), Some("2d"));

    let log = log.lock().expect("log lock");
    assert_eq!(log.len(), 3);

    let login = &log[1];
    assert_eq!(login.method, "POST");
    assert_eq!(login.header("x-csrftoken"), Some("tok123"));
    assert!(login.body_text().contains("\"username\":\"admin\""));

    let create = &log[2];
    assert_eq!(create.path, "/api/tasks/create_multiview");
    assert_eq!(create.header("x-csrftoken"), Some("tok123"));
    assert_eq!(create.header("x-organization"), Some("team"));
    assert!(create.header("cookie").unwrap_or_default().contains("sessionid=s1"));
    assert!(create
        .header("content-type")
        .unwrap_or_default()
        .starts_with("multipart/form-data"));

    let body = create.body_text();
    assert!(body.contains("name=\"name\"\r\n\r\nds_01-00-Part1\r\n"), "{body}");
    assert!(body.contains("name=\"session_id\"\r\n\r\n00\r\n"), "{body}");
    assert!(body.contains("name=\"part_number\"\r\n\r\n1\r\n"), "{body}");
    assert!(body.contains("name=\"view_count\"\r\n\r\n2\r\n"), "{body}");
    assert!(body.contains("name=\"video_view1\"; filename=\"00-View1-Part1.mp4\""), "{body}");
    assert!(body.contains("name=\"video_view2\"; filename=\"00-View2-Part1.mp4\""), "{body}");
    assert!(body.contains("video/mp4"), "{body}");
    assert!(body.contains("video-bytes-1"), "{body}");
    assert!(body.contains("video-bytes-2"), "{body}");
}

#[test]
fn token_auth_sets_authorization_header() {
    let tmp = TempDir::new().expect("tempdir");
    let views = write_views(tmp.path(), "00", 1, 1);
    let (host, log) = serve(cvat_like);

    let mut api = ApiClient::new(&host).expect("client");
    api.set_token("abc");
    api.create_multiview_task(&TaskRequest {
        name: "sample".into(),
        session_id: "01".into(),
        part_number: 1,
        views,
    })
    .expect("task created");

    let log = log.lock().expect("log lock");
    assert_eq!(log[0].header("authorization"), Some("Token abc"));
    assert_eq!(log[0].header("x-csrftoken"), None);
}

#[test]
fn rejected_login_reports_status_and_body() {
    let (host, _log) = serve(cvat_like);
    let api = ApiClient::new(&host).expect("client");

    let err = api
        .login(&LoginRequest {
            username: "admin".into(),
            password: "wrong".into(),
        })
        .unwrap_err();
    match err {
        ApiError::LoginRejected { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("bad credentials"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let api = ApiClient::new("http://127.0.0.1:1").expect("client");
    let err = api
        .login(&LoginRequest {
            username: "admin".into(),
            password: "secret".into(),
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
}

#[test]
fn failures_are_counted_and_the_batch_continues() {
    let tmp = TempDir::new().expect("tempdir");
    let sets: Vec<ViewSet> = ["00", "01", "02"]
        .iter()
        .map(|session| ViewSet {
            dataset: "ds".into(),
            subdirectory: "01".into(),
            session_id: session.to_string(),
            part_number: 1,
            views: write_views(tmp.path(), session, 1, 1),
        })
        .collect();

    let (host, log) = serve(|req| {
        if req.body_text().contains("ds_01-01-Part1") {
            Reply::new(500, "boom")
        } else {
            Reply::new(201, r#"{"id": 1, "name": "ok"}"#)
        }
    });

    let api = ApiClient::new(&host).expect("client");
    let summary = batch::submit_all(&api, &sets);
    assert_eq!(summary, Summary { created: 2, failed: 1 });
    assert_eq!(log.lock().expect("log lock").len(), 3);
}

#[test]
fn dropped_connection_counts_as_failure_and_batch_continues() {
    let tmp = TempDir::new().expect("tempdir");
    let sets: Vec<ViewSet> = ["00", "01", "02"]
        .iter()
        .map(|session| ViewSet {
            dataset: "ds".into(),
            subdirectory: "01".into(),
            session_id: session.to_string(),
            part_number: 1,
            views: write_views(tmp.path(), session, 1, 1),
        })
        .collect();

    let (host, log) = serve(|req| {
        if req.body_text().contains("ds_01-01-Part1") {
            Reply::hang_up()
        } else {
            Reply::new(201, r#"{"id": 1, "name": "ok"}"#)
        }
    });

    let api = ApiClient::new(&host).expect("client");
    let summary = batch::submit_all(&api, &sets);
    assert_eq!(summary, Summary { created: 2, failed: 1 });

    let log = log.lock().expect("log lock");
    let uploads = log
        .iter()
        .filter(|r| r.path == "/api/tasks/create_multiview")
        .count();
    assert_eq!(uploads, 3);
}

#[test]
fn dropped_connection_is_a_transport_error() {
    let tmp = TempDir::new().expect("tempdir");
    let views = write_views(tmp.path(), "00", 1, 1);
    let (host, _log) = serve(|_| Reply::hang_up());

    let api = ApiClient::new(&host).expect("client");
    let err = api
        .create_multiview_task(&TaskRequest {
            name: "t".into(),
            session_id: "00".into(),
            part_number: 1,
            views,
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }), "{err}");
}

#[test]
fn non_201_success_codes_count_as_failures() {
    let tmp = TempDir::new().expect("tempdir");
    let views = write_views(tmp.path(), "00", 1, 1);
    let (host, _log) = serve(|_| Reply::new(200, r#"{"id": 1, "name": "ok"}"#));

    let api = ApiClient::new(&host).expect("client");
    let err = api
        .create_multiview_task(&TaskRequest {
            name: "t".into(),
            session_id: "00".into(),
            part_number: 1,
            views,
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::TaskRejected { .. }));
}

#[test]
fn full_batch_run_creates_every_discovered_set() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("data");
    write_views(&root.join("multisensor_home1").join("01"), "00", 1, 5);
    write_views(&root.join("multisensor_home1").join("01"), "01", 1, 2);
    let (host, log) = serve(cvat_like);

    let mut cfg = Config::new(&root);
    cfg.host = host;
    let outcome = batch::run(&cfg, || {
        Ok(LoginRequest {
            username: "admin".into(),
            password: "secret".into(),
        })
    })
    .expect("batch runs");

    assert_eq!(outcome, Outcome::Completed(Summary { created: 1, failed: 0 }));
    let log = log.lock().expect("log lock");
    let uploads: Vec<_> = log
        .iter()
        .filter(|r| r.path == "/api/tasks/create_multiview")
        .collect();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0]
        .body_text()
        .contains("multisensor_home1_01-00-Part1"));
}

#[test]
fn failed_login_aborts_before_any_upload() {
    let tmp = TempDir::new().expect("tempdir");
    write_views(&tmp.path().join("ds").join("01"), "00", 1, 5);
    let (host, log) = serve(cvat_like);

    let mut cfg = Config::new(tmp.path());
    cfg.host = host;
    cfg.datasets = vec!["ds".into()];
    let err = batch::run(&cfg, || {
        Ok(LoginRequest {
            username: "admin".into(),
            password: "nope".into(),
        })
    })
    .unwrap_err();

    assert!(err.to_string().contains("Authentication failed"));
    assert!(log
        .lock()
        .expect("log lock")
        .iter()
        .all(|r| r.path != "/api/tasks/create_multiview"));
}
