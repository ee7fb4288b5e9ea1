// API token handling for `create-sample-task`.
//
// The token comes from the command line / environment, or from a file in the
// user's home directory. It can also be minted through the server container
// with `docker compose exec`, in which case it is written to that file so the
// next run can reuse it.

use crate::error::TokenError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// File name of the persisted token inside the home directory.
pub const TOKEN_FILE_NAME: &str = ".multiview_token";

/// Container running the Django backend in the compose project.
pub const SERVER_SERVICE: &str = "cvat_server";

/// `~/.multiview_token`, or `./.multiview_token` when no home dir is known.
pub fn token_file_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(TOKEN_FILE_NAME)
}

/// Persist token into the given file.
pub fn persist_token(path: &Path, token: &str) -> Result<(), TokenError> {
    std::fs::write(path, token).map_err(|source| TokenError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a previously persisted token. A missing or blank file is `None`.
pub fn load_token(path: &Path) -> Result<Option<String>, TokenError> {
    match std::fs::read_to_string(path) {
        Ok(data) => {
            let token = data.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(TokenError::File {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Pick the token to use: an explicit value wins, then the token file.
pub fn resolve_token(explicit: Option<&str>, token_file: &Path) -> Result<String, TokenError> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    load_token(token_file)?.ok_or(TokenError::Missing)
}

/// Django shell snippet that prints (creating if needed) the user's token.
fn token_script(username: &str) -> String {
    format!(
        "from django.contrib.auth.models import User; \
         from rest_framework.authtoken.models import Token; \
         u=User.objects.get(username={username:?}); \
         t,_=Token.objects.get_or_create(user=u); \
         print(t.key)"
    )
}

/// Ask the backend container for `username`'s API token.
///
/// `compose_dir` is the directory holding the compose file.
pub fn fetch_token_from_docker(compose_dir: &Path, username: &str) -> Result<String, TokenError> {
    info!("Fetching API token for {username} from {SERVER_SERVICE}");
    let output = Command::new("docker")
        .args(["compose", "exec", "-T", SERVER_SERVICE])
        .args(["python", "manage.py", "shell", "-c"])
        .arg(token_script(username))
        .current_dir(compose_dir)
        .output()
        .map_err(TokenError::Docker)?;

    if !output.status.success() {
        return Err(TokenError::DockerFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    last_line(&String::from_utf8_lossy(&output.stdout)).ok_or(TokenError::Missing)
}

/// Django's shell may print banners first; the token is the last line.
fn last_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
}
