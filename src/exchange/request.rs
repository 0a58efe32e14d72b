use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::files::FileTree;
use super::headers::HeaderList;
use super::server_vars::ServerVars;

/// Decoded query or form parameters, possibly nested (`a[b]=1`).
pub type Params = BTreeMap<String, serde_json::Value>;

pub const FORWARDED_PROTO: &str = "X-Forwarded-Proto";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("HTTP method not specified")]
    MissingMethod,

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    /// `https` only when the forwarded-proto value is exactly `https`.
    pub fn from_forwarded_proto(value: Option<&str>) -> Self {
        match value {
            Some("https") => Scheme::Https,
            _ => Scheme::Http,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime-agnostic view of one inbound HTTP request.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    method: String,
    scheme: Scheme,
    uri: String,
    path: String,
    query_string: String,
    protocol: String,
    headers: HeaderList,
    server: ServerVars,
    cookies: BTreeMap<String, String>,
    query: Params,
    form: Params,
    body: Vec<u8>,
    files: FileTree,
}

impl CanonicalRequest {
    pub fn builder(method: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn server(&self) -> &ServerVars {
        &self.server
    }

    /// Looks up a header through its CGI key, e.g. `HTTP_X_REQUEST_ID`.
    pub fn server_var(&self, key: &str) -> Option<&str> {
        self.server.get(key)
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
    }

    pub fn query(&self) -> &Params {
        &self.query
    }

    pub fn form(&self) -> &Params {
        &self.form
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn files(&self) -> &FileTree {
        &self.files
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }
}

/// Collects runtime-native request fields and produces a
/// [`CanonicalRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: String,
    uri: Option<String>,
    protocol: String,
    server_name: String,
    server_addr: Option<String>,
    server_port: u16,
    remote_addr: String,
    remote_port: u16,
    path_info: Option<String>,
    request_time: Option<(u64, f64)>,
    headers: HeaderList,
    cookies: Vec<(String, String)>,
    query: Params,
    form: Params,
    body: Vec<u8>,
    files: FileTree,
}

impl RequestBuilder {
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: None,
            protocol: "HTTP/1.1".to_string(),
            server_name: "localhost".to_string(),
            server_addr: None,
            server_port: 80,
            remote_addr: "127.0.0.1".to_string(),
            remote_port: 0,
            path_info: None,
            request_time: None,
            headers: HeaderList::new(),
            cookies: Vec::new(),
            query: Params::new(),
            form: Params::new(),
            body: Vec::new(),
            files: FileTree::new(),
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, proto: impl Into<String>) -> Self {
        self.protocol = proto.into();
        self
    }

    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    #[must_use]
    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = Some(addr.into());
        self
    }

    #[must_use]
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    #[must_use]
    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    #[must_use]
    pub fn with_path_info(mut self, path: impl Into<String>) -> Self {
        self.path_info = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_request_time(mut self, secs: u64, float: f64) -> Self {
        self.request_time = Some((secs, float));
        self
    }

    #[must_use]
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push(name, value);
        self
    }

    #[must_use]
    pub fn with_headers<I, K, V>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in iter {
            self.headers.push(k, v);
        }
        self
    }

    #[must_use]
    pub fn with_cookie(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.cookies
            .push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_cookies<I, K, V>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.cookies.extend(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into())),
        );
        self
    }

    #[must_use]
    pub fn with_query(mut self, params: Params) -> Self {
        self.query = params;
        self
    }

    #[must_use]
    pub fn with_form(mut self, params: Params) -> Self {
        self.form = params;
        self
    }

    #[must_use]
    pub fn with_body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = bytes.into();
        self
    }

    #[must_use]
    pub fn with_files(mut self, files: FileTree) -> Self {
        self.files = files;
        self
    }

    pub fn build(self) -> Result<CanonicalRequest, RequestError> {
        let method = normalize_method(&self.method)?;

        let uri = self
            .uri
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "/".to_string());
        let (path, query_string) = parse_uri(&uri);
        let query_string = query_string.unwrap_or_default();

        let scheme =
            Scheme::from_forwarded_proto(self.headers.get(FORWARDED_PROTO));

        let mut cookies = BTreeMap::new();
        for value in self.headers.get_all("Cookie") {
            cookies.extend(parse_cookie_header(value));
        }
        cookies.extend(self.cookies);

        let server_name = self
            .headers
            .get("Host")
            .map(strip_port)
            .unwrap_or(self.server_name.as_str())
            .to_string();

        let mut vars = ServerVars::web_defaults();

        vars.request_method(&method)
            .request_uri(&uri)
            .query_string(&query_string)
            .path_info(self.path_info.as_deref().unwrap_or(path.as_str()))
            .server_protocol(&self.protocol)
            .server_name(&server_name)
            .server_port(self.server_port)
            .remote_addr(&self.remote_addr)
            .remote_port(self.remote_port)
            .https(scheme == Scheme::Https);

        if let Some(ref addr) = self.server_addr {
            vars.server_addr(addr);
        }

        match self.request_time {
            Some((secs, float)) => vars.request_time_from(secs, float),
            None => vars.request_time(),
        };

        for header in &self.headers {
            vars.http_header(header.name(), header.value());
        }

        if !vars.contains("HTTP_COOKIE") && !cookies.is_empty() {
            let cookie_str = cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");

            vars.cookies(&cookie_str);
        }

        if !vars.contains("CONTENT_LENGTH") && !self.body.is_empty() {
            vars.content_length(self.body.len());
        }

        Ok(CanonicalRequest {
            method,
            scheme,
            uri,
            path,
            query_string,
            protocol: self.protocol,
            headers: self.headers,
            server: vars,
            cookies,
            query: self.query,
            form: self.form,
            body: self.body,
            files: self.files,
        })
    }
}

fn normalize_method(raw: &str) -> Result<String, RequestError> {
    let method = raw.trim();

    if method.is_empty() {
        return Err(RequestError::MissingMethod);
    }

    // RFC 9110 token characters
    let valid = method.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
    });

    if !valid {
        return Err(RequestError::InvalidMethod(raw.to_string()));
    }

    Ok(method.to_ascii_uppercase())
}

fn parse_uri(uri: &str) -> (String, Option<String>) {
    match uri.find('?') {
        Some(pos) => (uri[..pos].to_string(), Some(uri[pos + 1..].to_string())),
        None => (uri.to_string(), None),
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host
            .split_once(']')
            .map(|(h, _)| &h[1..])
            .unwrap_or(host);
    }

    host.split_once(':')
        .map(|(h, _)| h)
        .unwrap_or(host)
}

fn parse_cookie_header(value: &str) -> impl Iterator<Item = (String, String)> + '_ {
    value.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), value.trim().to_string()))
    })
}
