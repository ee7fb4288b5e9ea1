// API client module: a small blocking HTTP client for the annotation
// server. Uploads run one after another, so a synchronous reqwest client is
// all that's needed.
//
// Two ways to authenticate:
// - session login (`login`): the server sets `csrftoken` and `sessionid`
//   cookies; the cookie jar keeps them and the CSRF value is echoed back in
//   `X-CSRFToken` on every state-changing request;
// - API token (`set_token`): sent as `Authorization: Token <key>`.

use crate::config::{normalize_host, LOGIN_TIMEOUT, UPLOAD_TIMEOUT};
use crate::discovery::ViewSet;
use crate::error::ApiError;
use reqwest::blocking::{multipart, Client};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";
const ORG_HEADER: &str = "X-Organization";

/// Error bodies are cut to this many characters before being reported.
const MAX_ERROR_BODY: usize = 500;

/// Blocking client bound to one server. Holds the cookie jar so a session
/// login carries over to every later request.
pub struct ApiClient {
    client: Client,
    base_url: String,
    jar: Arc<Jar>,
    token: Option<String>,
    org: Option<String>,
}

/// Login request payload.
#[derive(Serialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// What the server returns for a created task. Only `id` and `name` are
/// guaranteed; `dimension` is reported when present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub dimension: Option<String>,
}

/// Form contents for one multiview task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub name: String,
    pub session_id: String,
    pub part_number: u32,
    /// Uploaded as `video_view1`, `video_view2`, ... in this order.
    pub views: Vec<PathBuf>,
}

impl From<&ViewSet> for TaskRequest {
    fn from(set: &ViewSet) -> Self {
        TaskRequest {
            name: set.task_name(),
            session_id: set.session_id.clone(),
            part_number: set.part_number,
            views: set.views.clone(),
        }
    }
}

impl ApiClient {
    /// Create a client for `host` (e.g. `http://localhost:8080`). No request
    /// is made until `login` or `create_multiview_task` is called.
    pub fn new(host: &str) -> Result<Self, ApiError> {
        let base_url = normalize_host(host);
        Url::parse(&base_url).map_err(|_| ApiError::InvalidHost(host.to_string()))?;

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(LOGIN_TIMEOUT)
            .build()
            .map_err(ApiError::Client)?;
        Ok(ApiClient {
            client,
            base_url,
            jar,
            token: None,
            org: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Use a static API token instead of (or on top of) a session login.
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    /// Organization slug; tasks created afterwards are shared with it.
    pub fn set_org(&mut self, org: Option<String>) {
        self.org = org;
    }

    /// Browser URL of a task.
    pub fn task_url(&self, id: u64) -> String {
        format!("{}/tasks/{}", self.base_url, id)
    }

    /// Current `csrftoken` cookie value, if the server has set one.
    pub fn csrf_token(&self) -> Option<String> {
        let url = Url::parse(&self.base_url).ok()?;
        let cookies = self.jar.cookies(&url)?;
        let cookies = cookies.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == CSRF_COOKIE).then(|| value.to_string())
        })
    }

    /// Headers every mutating request needs: CSRF echo, token, organization.
    fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(csrf) = self.csrf_token() {
            headers.insert(CSRF_HEADER, header_value(CSRF_HEADER, &csrf)?);
        }
        if let Some(t) = &self.token {
            headers.insert(AUTHORIZATION, header_value("Authorization", &format!("Token {t}"))?);
        }
        if let Some(org) = &self.org {
            headers.insert(ORG_HEADER, header_value(ORG_HEADER, org)?);
        }
        Ok(headers)
    }

    /// Session login. A GET on the login endpoint first primes the CSRF
    /// cookie, then the credentials are POSTed as JSON. Only 200 counts as
    /// success.
    pub fn login(&self, req: &LoginRequest) -> Result<(), ApiError> {
        let url = format!("{}/api/auth/login", self.base_url);

        self.client
            .get(&url)
            .send()
            .map_err(|source| transport(&url, source))?;
        debug!("CSRF cookie present: {}", self.csrf_token().is_some());

        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(req)
            .send()
            .map_err(|source| transport(&url, source))?;

        if res.status() != StatusCode::OK {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(ApiError::LoginRejected {
                status,
                body: truncate(&body),
            });
        }
        debug!("Session login accepted for {}", req.username);
        Ok(())
    }

    /// Upload one multiview task as multipart/form-data.
    ///
    /// The view files are opened here and owned by the form; they are closed
    /// when the request finishes, whatever the outcome.
    pub fn create_multiview_task(&self, req: &TaskRequest) -> Result<TaskDescriptor, ApiError> {
        let url = format!("{}/api/tasks/create_multiview", self.base_url);
        let form = build_form(req)?;

        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .map_err(|source| transport(&url, source))?;

        let status = res.status();
        if status != StatusCode::CREATED {
            let body = res.text().unwrap_or_default();
            return Err(ApiError::TaskRejected {
                status,
                body: truncate(&body),
            });
        }
        res.json().map_err(ApiError::InvalidResponse)
    }
}

fn build_form(req: &TaskRequest) -> Result<multipart::Form, ApiError> {
    let mut form = multipart::Form::new()
        .text("name", req.name.clone())
        .text("session_id", req.session_id.clone())
        .text("part_number", req.part_number.to_string())
        .text("view_count", req.views.len().to_string());

    for (i, path) in req.views.iter().enumerate() {
        let part = multipart::Part::file(path)
            .map_err(|source| ApiError::OpenView {
                path: path.clone(),
                source,
            })?
            .mime_str("video/mp4")
            .map_err(ApiError::Multipart)?;
        form = form.part(format!("video_view{}", i + 1), part);
    }
    Ok(form)
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader { name })
}

fn transport(url: &str, source: reqwest::Error) -> ApiError {
    ApiError::Transport {
        url: url.to_string(),
        source,
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
