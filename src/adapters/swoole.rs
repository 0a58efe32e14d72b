//! Swoole/OpenSwoole request and response shapes.
//!
//! A Swoole server hands its `onRequest` callback a request object whose
//! `server` array uses lower-case CGI names, plus `header`, `cookie`, `get`,
//! `post` and `files` arrays and the raw body. [`SwooleRequest`] mirrors that
//! shape (and deserializes from its JSON encoding); [`ResponseSink`] mirrors
//! the response object.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

#[cfg(feature = "tracing")]
use tracing::warn;

use super::AdapterError;
use crate::exchange::{
    CanonicalRequest, CanonicalResponse, FileNode, FileTree, Params,
    UploadedFile,
};
use crate::worker::{respond_guarded, Application};

/// Key/value array in the order the runtime produced it.
///
/// PHP hands absent arrays over as `null` and list arrays as JSON lists;
/// both decode here (`null` as empty, lists keyed `"0"`, `"1"`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, V)> {
        self.0.iter()
    }

    /// Replaces the value of an existing key in place, or appends.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map, a list or null")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedMap::default())
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedMap::default())
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(self)
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, V>()? {
                    entries.push(entry);
                }
                Ok(OrderedMap(entries))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut entries = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element::<V>()? {
                    entries.push((entries.len().to_string(), value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_any(OrderedVisitor(PhantomData))
    }
}

/// One file entry as the runtime reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NativeFile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub content_type: String,
    pub tmp_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub error: u8,
}

/// Native uploaded-file value: a file entry, or a group of named children.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NativeFileNode {
    File(NativeFile),
    Nested(OrderedMap<NativeFileNode>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwooleRequest {
    pub server: OrderedMap<serde_json::Value>,
    #[serde(deserialize_with = "header_pairs")]
    pub header: Vec<(String, String)>,
    pub cookie: OrderedMap<String>,
    pub get: OrderedMap<serde_json::Value>,
    pub post: OrderedMap<serde_json::Value>,
    pub files: OrderedMap<NativeFileNode>,
    #[serde(deserialize_with = "raw_content")]
    pub content: Vec<u8>,
}

impl SwooleRequest {
    pub fn from_json(json: &str) -> Result<Self, AdapterError> {
        Ok(serde_json::from_str(json)?)
    }

    fn server_str(&self, key: &str) -> Option<String> {
        match self.server.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn server_u16(&self, key: &str) -> Option<u16> {
        self.server_str(key)?.parse().ok()
    }

    pub fn into_canonical(self) -> Result<CanonicalRequest, AdapterError> {
        let method = self
            .server_str("request_method")
            .unwrap_or_default();

        let mut uri = self
            .server_str("request_uri")
            .unwrap_or_else(|| "/".to_string());
        if let Some(qs) = self
            .server_str("query_string")
            .filter(|qs| !qs.is_empty())
        {
            if !uri.contains('?') {
                uri.push('?');
                uri.push_str(&qs);
            }
        }

        let mut builder = CanonicalRequest::builder(method).with_uri(uri);

        if let Some(proto) = self.server_str("server_protocol") {
            builder = builder.with_protocol(proto);
        }
        if let Some(addr) = self.server_str("remote_addr") {
            builder = builder.with_remote_addr(addr);
        }
        if let Some(port) = self.server_u16("remote_port") {
            builder = builder.with_remote_port(port);
        }
        if let Some(port) = self.server_u16("server_port") {
            builder = builder.with_server_port(port);
        }
        if let Some(path_info) = self.server_str("path_info") {
            builder = builder.with_path_info(path_info);
        }
        if let Some(secs) = self
            .server_str("request_time")
            .and_then(|s| s.parse::<u64>().ok())
        {
            let float = self
                .server_str("request_time_float")
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(secs as f64);
            builder = builder.with_request_time(secs, float);
        }

        Ok(builder
            .with_headers(self.header)
            .with_cookies(self.cookie)
            .with_query(self.get.into_iter().collect::<Params>())
            .with_form(self.post.into_iter().collect::<Params>())
            .with_files(map_files(self.files))
            .with_body(self.content)
            .build()?)
    }
}

/// Accepts a list of `[name, value]` pairs, a map (document order kept)
/// or `null`.
fn header_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Pairs(Vec<(String, String)>),
        Map(OrderedMap<String>),
    }

    Ok(match Option::<Shape>::deserialize(deserializer)? {
        Some(Shape::Pairs(pairs)) => pairs,
        Some(Shape::Map(map)) => map.into_iter().collect(),
        None => Vec::new(),
    })
}

/// `rawContent()` yields `false` when there is no body.
fn raw_content<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Content {
        Text(String),
        Flag(bool),
    }

    Ok(match Option::<Content>::deserialize(deserializer)? {
        Some(Content::Text(text)) => text.into_bytes(),
        Some(Content::Flag(_)) | None => Vec::new(),
    })
}

/// Maps the runtime's uploaded-file tree into canonical [`FileNode`]s.
pub fn map_files(files: OrderedMap<NativeFileNode>) -> FileTree {
    let mut tree = FileTree::new();
    for (field, node) in ordered(files) {
        let mapped = map_node(field.clone(), node);
        tree.insert(field, mapped);
    }
    tree
}

fn map_node(path: String, node: NativeFileNode) -> FileNode {
    match node {
        NativeFileNode::File(file) => FileNode::File(UploadedFile::from_runtime(
            path,
            file.name,
            file.content_type,
            file.tmp_name,
            file.size,
            file.error,
        )),
        NativeFileNode::Nested(children) => FileNode::Nested(
            ordered(children)
                .into_iter()
                .map(|(key, child)| {
                    let child_path = format!("{}[{}]", path, key);
                    (key, map_node(child_path, child))
                })
                .collect(),
        ),
    }
}

/// Keeps form order, except that list-like groups (`0`, `1`, ..., `10`)
/// are ordered numerically.
fn ordered(map: OrderedMap<NativeFileNode>) -> Vec<(String, NativeFileNode)> {
    let mut entries = map.0;

    if entries
        .iter()
        .all(|(k, _)| k.parse::<usize>().is_ok())
    {
        entries.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
    }

    entries
}

/// Native response object of a callback-style runtime.
pub trait ResponseSink {
    type Error: std::error::Error;

    /// Whether `header` may be called repeatedly for the same name.
    fn supports_repeated_headers(&self) -> bool {
        true
    }

    fn status(&mut self, code: u16) -> Result<(), Self::Error>;

    fn header(&mut self, name: &str, value: &str) -> Result<(), Self::Error>;

    /// Writes one `Set-Cookie` line.
    fn set_cookie(&mut self, cookie: &str) -> Result<(), Self::Error>;

    fn write(&mut self, body: &[u8]) -> Result<(), Self::Error>;

    fn end(&mut self) -> Result<(), Self::Error>;
}

/// Emits `response` through `sink`: status, headers, cookies, body, end.
pub fn emit_response<S>(
    response: CanonicalResponse,
    sink: &mut S,
) -> Result<(), S::Error>
where
    S: ResponseSink + ?Sized,
{
    sink.status(response.status)?;

    if sink.supports_repeated_headers() {
        for header in &response.headers {
            sink.header(header.name(), header.value())?;
        }
    } else {
        for (name, values) in response.headers.grouped() {
            sink.header(name, &values.join(", "))?;
        }
    }

    for cookie in &response.cookies {
        sink.set_cookie(&cookie.to_string())?;
    }

    if !response.body.is_empty() {
        sink.write(&response.body)?;
    }

    sink.end()
}

/// Serves Swoole-style `onRequest` callbacks with a host application.
///
/// Holds no mutable state, so one handler can serve concurrent callbacks
/// when `A: Sync`.
pub struct SwooleHandler<A> {
    app: A,
}

impl<A: Application> SwooleHandler<A> {
    pub fn new(app: A) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn on_request<S>(
        &self,
        request: SwooleRequest,
        sink: &mut S,
    ) -> Result<(), S::Error>
    where
        S: ResponseSink + ?Sized,
    {
        let request = match request.into_canonical() {
            Ok(request) => request,
            Err(e) => {
                #[cfg(feature = "tracing")]
                warn!(error = %e, "Rejecting malformed request");
                let _ = e;
                return emit_response(CanonicalResponse::text(400, "Bad Request"), sink);
            }
        };

        let guarded = respond_guarded(&self.app, &request);
        emit_response(guarded.response, sink)?;

        if guarded.failure.is_none() {
            self.app.terminate(&request);
        }

        Ok(())
    }
}
