use std::time::{SystemTime, UNIX_EPOCH};

/// CGI/1.1 meta-variables exposed to the host application.
///
/// Implements meta-variable semantics per [RFC 3875 §4.1](https://datatracker.ietf.org/doc/html/rfc3875#section-4.1).
/// Request headers land under `HTTP_<NAME>` keys; repeated headers are
/// folded into one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerVars {
    vars: Vec<(String, String)>,
}

impl ServerVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            vars: Vec::with_capacity(cap),
        }
    }

    /// Sets `key`, replacing an earlier value.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let key = key.into();
        let value = value.into();

        match self
            .vars
            .iter_mut()
            .find(|(k, _)| *k == key)
        {
            Some((_, v)) => *v = value,
            None => self.vars.push((key, value)),
        }
        self
    }

    pub fn extend<I, K, V>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in iter {
            self.set(k, v);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.vars.iter()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.vars
    }

    pub fn request_method(&mut self, method: &str) -> &mut Self {
        self.set("REQUEST_METHOD", method)
    }

    pub fn request_uri(&mut self, uri: &str) -> &mut Self {
        self.set("REQUEST_URI", uri)
    }

    pub fn query_string(&mut self, qs: &str) -> &mut Self {
        self.set("QUERY_STRING", qs)
    }

    pub fn path_info(&mut self, path: &str) -> &mut Self {
        self.set("PATH_INFO", path)
    }

    pub fn request_time(&mut self) -> &mut Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        self.set("REQUEST_TIME", now.as_secs().to_string())
            .set("REQUEST_TIME_FLOAT", now.as_secs_f64().to_string())
    }

    /// Uses the runtime's own request timestamp instead of the local clock.
    pub fn request_time_from(&mut self, secs: u64, float: f64) -> &mut Self {
        self.set("REQUEST_TIME", secs.to_string())
            .set("REQUEST_TIME_FLOAT", float.to_string())
    }

    /// Sets `SERVER_NAME` meta-variable.
    ///
    /// Per [RFC 3875 §4.1.14](https://datatracker.ietf.org/doc/html/rfc3875#section-4.1.14).
    pub fn server_name(&mut self, name: &str) -> &mut Self {
        self.set("SERVER_NAME", name)
    }

    pub fn server_port(&mut self, port: u16) -> &mut Self {
        self.set("SERVER_PORT", port.to_string())
    }

    pub fn server_addr(&mut self, addr: &str) -> &mut Self {
        self.set("SERVER_ADDR", addr)
    }

    /// Sets `SERVER_PROTOCOL` meta-variable.
    ///
    /// Per [RFC 3875 §4.1.16](https://datatracker.ietf.org/doc/html/rfc3875#section-4.1.16),
    /// format is `protocol/version` (e.g., `HTTP/1.1`).
    pub fn server_protocol(&mut self, proto: &str) -> &mut Self {
        self.set("SERVER_PROTOCOL", proto)
    }

    pub fn server_software(&mut self, software: &str) -> &mut Self {
        self.set("SERVER_SOFTWARE", software)
    }

    /// Sets `GATEWAY_INTERFACE` meta-variable.
    ///
    /// Per [RFC 3875 §4.1.4](https://datatracker.ietf.org/doc/html/rfc3875#section-4.1.4).
    pub fn gateway_interface(&mut self, gi: &str) -> &mut Self {
        self.set("GATEWAY_INTERFACE", gi)
    }

    pub fn remote_addr(&mut self, addr: &str) -> &mut Self {
        self.set("REMOTE_ADDR", addr)
    }

    pub fn remote_port(&mut self, port: u16) -> &mut Self {
        self.set("REMOTE_PORT", port.to_string())
    }

    pub fn https(&mut self, enabled: bool) -> &mut Self {
        if enabled {
            self.set("HTTPS", "on")
                .set("REQUEST_SCHEME", "https")
        } else {
            self.set("REQUEST_SCHEME", "http")
        }
    }

    /// Normalized lookup key for a request header.
    pub fn header_key(name: &str) -> String {
        let upper = name
            .trim()
            .to_ascii_uppercase()
            .replace('-', "_");

        match upper.as_str() {
            "CONTENT_TYPE" | "CONTENT_LENGTH" => upper,
            _ => format!("HTTP_{}", upper),
        }
    }

    pub fn http_header(&mut self, name: &str, value: &str) -> &mut Self {
        let key = Self::header_key(name);
        let separator = if key == "HTTP_COOKIE" { "; " } else { ", " };

        let merged = match self.get(&key) {
            Some(existing) => format!("{}{}{}", existing, separator, value),
            None => value.to_string(),
        };

        self.set(key, merged)
    }

    pub fn content_type(&mut self, ct: &str) -> &mut Self {
        self.set("CONTENT_TYPE", ct)
    }

    pub fn content_length(&mut self, len: usize) -> &mut Self {
        self.set("CONTENT_LENGTH", len.to_string())
    }

    pub fn cookies(&mut self, cookie_str: &str) -> &mut Self {
        self.set("HTTP_COOKIE", cookie_str)
    }

    /// Creates server variables with CGI/1.1 web defaults.
    ///
    /// Sets:
    /// - `GATEWAY_INTERFACE` to `CGI/1.1` per [RFC 3875 §4.1.4](https://datatracker.ietf.org/doc/html/rfc3875#section-4.1.4)
    /// - `SERVER_SOFTWARE`
    pub fn web_defaults() -> Self {
        let mut vars = Self::with_capacity(24);

        vars.gateway_interface("CGI/1.1")
            .server_software(crate::SERVER_SOFTWARE);

        vars
    }

    pub fn get_content_type(&self) -> Option<&str> {
        self.get("CONTENT_TYPE")
    }

    pub fn get_query_string(&self) -> Option<&str> {
        self.get("QUERY_STRING")
    }

    pub fn get_cookie(&self) -> Option<&str> {
        self.get("HTTP_COOKIE")
    }

    pub fn get_request_method(&self) -> Option<&str> {
        self.get("REQUEST_METHOD")
    }
}
