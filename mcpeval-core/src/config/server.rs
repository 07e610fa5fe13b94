//! Declarative description of one tool server.
//!
//! Servers come either from `[[servers]]` entries in the TOML file or from the
//! compact command-line form `path_or_package[:arg1,arg2][^ENV1=v1,ENV2=v2]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, ServerSpecError};

const LAUNCHERS: &[&str] = &["npx", "uvx", "python", "python3", "node", "deno", "bunx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerTransport {
    Stdio,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub identifier: String,
    pub transport: ServerTransport,
    /// Command, script path or package for stdio; endpoint url for http.
    pub target: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Process environment for stdio servers, request headers for http servers.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

/// Program and arguments actually spawned for a stdio server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerSpec {
    pub fn stdio(identifier: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            transport: ServerTransport::Stdio,
            target: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            workdir: None,
        }
    }

    pub fn http(identifier: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            transport: ServerTransport::Http,
            ..Self::stdio(identifier, url)
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Parse the compact `path_or_package[:arg1,arg2][^ENV1=v1,ENV2=v2]` form.
    ///
    /// Urls starting with `http://` or `https://` select the HTTP transport; their
    /// `:` characters belong to the url, so only the `^` list is recognised.
    pub fn parse(input: &str) -> Result<Self, ServerSpecError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ServerSpecError::Empty);
        }

        let (head, env_part) = match input.split_once('^') {
            Some((head, env)) => (head.trim(), Some(env)),
            None => (input, None),
        };
        let env = env_part.map(parse_env).transpose()?.unwrap_or_default();

        if is_url(head) {
            let identifier = identifier_from_url(head);
            return Ok(Self {
                env,
                ..Self::http(identifier, head)
            });
        }

        let (target, args) = match head.split_once(':') {
            Some((target, args)) => (target.trim(), split_list(args)),
            None => (head, Vec::new()),
        };
        if target.is_empty() {
            return Err(ServerSpecError::MissingTarget {
                spec: input.to_string(),
            });
        }

        Ok(Self {
            identifier: identifier_from_command(target, &args),
            transport: ServerTransport::Stdio,
            target: target.to_string(),
            args,
            env,
            workdir: None,
        })
    }

    /// Resolve how a stdio server is started.
    ///
    /// Python and JavaScript files run through their interpreter and scoped npm
    /// packages (`@scope/name`) through `npx`; anything else runs directly.
    /// `npx` always gets `-y` so a missing package never waits on a prompt.
    pub fn launch_command(&self) -> LaunchCommand {
        let lower = self.target.to_ascii_lowercase();
        let (program, mut args) = if lower.ends_with(".py") {
            ("python3".to_string(), vec![self.target.clone()])
        } else if [".js", ".mjs", ".cjs"].iter().any(|ext| lower.ends_with(ext)) {
            ("node".to_string(), vec![self.target.clone()])
        } else if self.target.starts_with('@') {
            ("npx".to_string(), vec![self.target.clone()])
        } else {
            (self.target.clone(), Vec::new())
        };
        args.extend(self.args.iter().cloned());

        let is_npx = Path::new(&program)
            .file_stem()
            .is_some_and(|stem| stem.eq_ignore_ascii_case("npx"));
        if is_npx && !args.iter().any(|arg| arg == "-y" || arg == "--yes") {
            args.insert(0, "-y".to_string());
        }
        LaunchCommand { program, args }
    }
}

fn is_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env(value: &str) -> Result<BTreeMap<String, String>, ServerSpecError> {
    let mut env = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((key, val)) if !key.trim().is_empty() => {
                env.insert(key.trim().to_string(), val.trim().to_string());
            }
            _ => {
                return Err(ServerSpecError::InvalidEnv {
                    entry: entry.to_string(),
                });
            }
        }
    }
    Ok(env)
}

fn identifier_from_url(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        "http-server".to_string()
    } else {
        host.to_string()
    }
}

fn identifier_from_command(target: &str, args: &[String]) -> String {
    let launcher = Path::new(target)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| LAUNCHERS.contains(&name));
    let base = if launcher {
        args.iter()
            .rev()
            .find(|arg| !arg.starts_with('-'))
            .map(String::as_str)
            .unwrap_or(target)
    } else {
        target
    };
    package_or_file_name(base).unwrap_or_else(|| "server".to_string())
}

fn package_or_file_name(value: &str) -> Option<String> {
    let name = if let Some(scoped) = value.strip_prefix('@') {
        let package = scoped.rsplit('/').next().unwrap_or(scoped);
        package.split('@').next().unwrap_or(package).to_string()
    } else {
        let stem = Path::new(value).file_stem()?.to_str()?;
        stem.split('@').next().unwrap_or(stem).to_string()
    };
    (!name.is_empty()).then_some(name)
}

/// `[[servers]]` entry as written in the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    name: String,
    command: Option<String>,
    url: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    workdir: Option<String>,
}

impl TryFrom<RawServer> for ServerSpec {
    type Error = ConfigError;

    fn try_from(raw: RawServer) -> Result<Self, Self::Error> {
        let expand = |s: &str| -> String {
            shellexpand::full(s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };

        let mut spec = match (raw.command, raw.url) {
            (Some(command), None) => ServerSpec::stdio(raw.name.clone(), expand(&command)),
            (None, Some(url)) => ServerSpec::http(raw.name.clone(), expand(&url)),
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidServer {
                    server: raw.name,
                    reason: "set either 'command' or 'url', not both".into(),
                });
            }
            (None, None) => {
                return Err(ConfigError::InvalidServer {
                    server: raw.name,
                    reason: "one of 'command' or 'url' is required".into(),
                });
            }
        };
        spec.args = raw.args.iter().map(|arg| expand(arg)).collect();
        spec.env = raw
            .env
            .into_iter()
            .map(|(key, value)| (key, expand(&value)))
            .collect();
        spec.workdir = raw.workdir.map(|dir| PathBuf::from(expand(&dir)));
        Ok(spec)
    }
}
