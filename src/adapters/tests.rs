use super::*;
use crate::exchange::{
    CanonicalRequest, CanonicalResponse, FileNode, Scheme, SetCookie,
};
use crate::worker::BoxError;
use std::convert::Infallible;
use std::path::Path;

#[derive(Debug, Default)]
struct RecordingSink {
    repeated: bool,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    cookies: Vec<String>,
    body: Vec<u8>,
    writes: usize,
    ended: bool,
}

impl RecordingSink {
    fn repeated() -> Self {
        Self {
            repeated: true,
            ..Default::default()
        }
    }

    fn single_value() -> Self {
        Self::default()
    }
}

impl ResponseSink for RecordingSink {
    type Error = Infallible;

    fn supports_repeated_headers(&self) -> bool {
        self.repeated
    }

    fn status(&mut self, code: u16) -> Result<(), Infallible> {
        self.status = Some(code);
        Ok(())
    }

    fn header(&mut self, name: &str, value: &str) -> Result<(), Infallible> {
        self.headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn set_cookie(&mut self, cookie: &str) -> Result<(), Infallible> {
        self.cookies.push(cookie.to_string());
        Ok(())
    }

    fn write(&mut self, body: &[u8]) -> Result<(), Infallible> {
        self.body.extend_from_slice(body);
        self.writes += 1;
        Ok(())
    }

    fn end(&mut self) -> Result<(), Infallible> {
        self.ended = true;
        Ok(())
    }
}

const UPLOAD_JSON: &str = r#"{
    "server": {
        "request_method": "post",
        "request_uri": "/upload",
        "query_string": "draft=1",
        "server_protocol": "HTTP/1.1",
        "remote_addr": "10.0.0.7",
        "remote_port": 52100,
        "server_port": 9501,
        "request_time": 1700000000,
        "request_time_float": 1700000000.25
    },
    "header": {
        "host": "app.test",
        "x-forwarded-proto": "https",
        "content-type": "multipart/form-data; boundary=x"
    },
    "cookie": {"sid": "abc"},
    "get": {"draft": "1"},
    "post": {"title": "Report"},
    "files": {
        "avatar": {
            "name": "me.png",
            "type": "image/png",
            "tmp_name": "/tmp/swoole.upfile.1",
            "error": 0,
            "size": 1024
        },
        "docs": {
            "10": {"name": "k.pdf", "type": "application/pdf", "tmp_name": "/tmp/u10", "error": 0, "size": 3},
            "2": {"name": "b.pdf", "type": "application/pdf", "tmp_name": "/tmp/u2", "error": 0, "size": 2},
            "0": {"name": "a.pdf", "type": "application/pdf", "tmp_name": "/tmp/u0", "error": 4, "size": 0}
        },
        "gallery": {
            "cover": {
                "main": {"name": "c.jpg", "type": "image/jpeg", "tmp_name": "/tmp/uc", "size": 9}
            }
        }
    },
    "content": "--x--"
}"#;

#[test]
fn test_swoole_request_from_json() {
    let req = SwooleRequest::from_json(UPLOAD_JSON)
        .unwrap()
        .into_canonical()
        .unwrap();

    assert_eq!(req.method(), "POST");
    assert_eq!(req.uri(), "/upload?draft=1");
    assert_eq!(req.path(), "/upload");
    assert_eq!(req.query_string(), "draft=1");
    assert_eq!(req.scheme(), Scheme::Https);
    assert_eq!(req.cookie("sid"), Some("abc"));
    assert_eq!(req.query()["draft"], "1");
    assert_eq!(req.form()["title"], "Report");
    assert_eq!(req.body(), b"--x--");

    assert_eq!(req.server_var("REMOTE_ADDR"), Some("10.0.0.7"));
    assert_eq!(req.server_var("REMOTE_PORT"), Some("52100"));
    assert_eq!(req.server_var("SERVER_PORT"), Some("9501"));
    assert_eq!(req.server_var("SERVER_NAME"), Some("app.test"));
    assert_eq!(req.server_var("HTTPS"), Some("on"));
    assert_eq!(req.server_var("REQUEST_TIME"), Some("1700000000"));
    assert_eq!(req.server_var("HTTP_X_FORWARDED_PROTO"), Some("https"));
    assert_eq!(
        req.server_var("CONTENT_TYPE"),
        Some("multipart/form-data; boundary=x")
    );
    assert_eq!(req.server_var("HTTP_COOKIE"), Some("sid=abc"));
}

#[test]
fn test_swoole_files_are_mapped_recursively() {
    let req = SwooleRequest::from_json(UPLOAD_JSON)
        .unwrap()
        .into_canonical()
        .unwrap();

    let files = req.files();
    assert_eq!(files.len(), 3);

    let avatar = files
        .get("avatar")
        .and_then(FileNode::as_file)
        .unwrap();
    assert_eq!(avatar.field(), "avatar");
    assert_eq!(avatar.filename(), "me.png");
    assert_eq!(avatar.content_type(), "image/png");
    assert_eq!(avatar.temp_path(), Path::new("/tmp/swoole.upfile.1"));
    assert_eq!(avatar.size(), 1024);
    assert!(avatar.skips_upload_check());

    let fields: Vec<_> = files
        .files()
        .iter()
        .map(|f| f.field().to_string())
        .collect();
    assert_eq!(
        fields,
        vec![
            "avatar",
            "docs[0]",
            "docs[2]",
            "docs[10]",
            "gallery[cover][main]",
        ]
    );

    let first_doc = files
        .get("docs")
        .and_then(|n| n.child("0"))
        .and_then(FileNode::as_file)
        .unwrap();
    assert!(!first_doc.is_ok());
}

#[test]
fn test_header_list_shape_keeps_order_and_duplicates() {
    let json = r#"{
        "server": {"request_method": "get", "request_uri": "/"},
        "header": [["Accept", "text/html"], ["X-Trace", "1"], ["accept", "application/json"]]
    }"#;

    let req = SwooleRequest::from_json(json)
        .unwrap()
        .into_canonical()
        .unwrap();

    let names: Vec<_> = req
        .headers()
        .iter()
        .map(|h| h.name().to_string())
        .collect();
    assert_eq!(names, vec!["Accept", "X-Trace", "accept"]);
    assert_eq!(
        req.server_var("HTTP_ACCEPT"),
        Some("text/html, application/json")
    );
    assert_eq!(req.scheme(), Scheme::Http);
}

#[test]
fn test_malformed_native_request() {
    assert!(matches!(
        SwooleRequest::from_json("{\"server\": 3}"),
        Err(AdapterError::Decode(_))
    ));

    let missing_method = SwooleRequest::default().into_canonical();
    assert!(matches!(missing_method, Err(AdapterError::Request(_))));
}

#[test]
fn test_null_and_false_fields_decode_as_empty() {
    let json = r#"{
        "server": {"request_method": "get", "request_uri": "/"},
        "header": null,
        "cookie": null,
        "get": null,
        "post": null,
        "files": null,
        "content": false
    }"#;

    let req = SwooleRequest::from_json(json)
        .unwrap()
        .into_canonical()
        .unwrap();

    assert_eq!(req.method(), "GET");
    assert!(req.headers().is_empty());
    assert!(req.query().is_empty());
    assert!(req.form().is_empty());
    assert!(req.files().is_empty());
    assert!(req.body().is_empty());
    assert_eq!(req.cookie("sid"), None);
}

#[test]
fn test_php_list_arrays_are_index_keyed() {
    let json = r#"{
        "server": {"request_method": "post", "request_uri": "/"},
        "cookie": [],
        "get": ["a", "b"],
        "post": [],
        "files": [],
        "content": ""
    }"#;

    let req = SwooleRequest::from_json(json)
        .unwrap()
        .into_canonical()
        .unwrap();

    assert_eq!(req.query()["0"], "a");
    assert_eq!(req.query()["1"], "b");
    assert!(req.form().is_empty());
    assert!(req.files().is_empty());
}

#[test]
fn test_header_map_shape_keeps_document_order() {
    let json = r#"{
        "server": {"request_method": "get", "request_uri": "/"},
        "header": {"x-zeta": "1", "host": "a", "accept": "b"}
    }"#;

    let req = SwooleRequest::from_json(json)
        .unwrap()
        .into_canonical()
        .unwrap();

    let names: Vec<_> = req
        .headers()
        .iter()
        .map(|h| h.name().to_string())
        .collect();
    assert_eq!(names, vec!["x-zeta", "host", "accept"]);
}

#[test]
fn test_file_fields_keep_form_order() {
    let json = r#"{
        "server": {"request_method": "post", "request_uri": "/"},
        "files": {
            "zeta": {"name": "z.txt", "type": "text/plain", "tmp_name": "/tmp/z", "size": 1, "error": 0},
            "alpha": {"name": "a.txt", "type": "text/plain", "tmp_name": "/tmp/a", "size": 1, "error": 0},
            "meta": {
                "thumb": {"name": "t.png", "type": "image/png", "tmp_name": "/tmp/t", "size": 1, "error": 0},
                "full": {"name": "f.png", "type": "image/png", "tmp_name": "/tmp/f", "size": 1, "error": 0}
            }
        }
    }"#;

    let req = SwooleRequest::from_json(json)
        .unwrap()
        .into_canonical()
        .unwrap();

    let fields: Vec<_> = req
        .files()
        .files()
        .iter()
        .map(|f| f.field().to_string())
        .collect();
    assert_eq!(
        fields,
        vec!["zeta", "alpha", "meta[thumb]", "meta[full]"]
    );
}

fn sample_response() -> CanonicalResponse {
    CanonicalResponse::new(201)
        .with_header("Content-Type", "application/json")
        .with_header("X-Trace", "a")
        .with_header("x-trace", "b")
        .with_header("Vary", "Accept")
        .with_cookie(SetCookie::new("sid", "1").with_path("/"))
        .with_cookie(SetCookie::new("theme", "dark"))
        .with_body(b"{\"ok\":true}".to_vec())
}

#[test]
fn test_emit_repeated_headers_one_write_per_entry() {
    let response = sample_response();
    let entries = response.headers.len();

    let mut sink = RecordingSink::repeated();
    emit_response(response, &mut sink).unwrap();

    assert_eq!(sink.status, Some(201));
    assert_eq!(sink.headers.len(), entries);
    assert_eq!(
        sink.headers[1..3],
        [
            ("X-Trace".to_string(), "a".to_string()),
            ("x-trace".to_string(), "b".to_string())
        ]
    );
    assert_eq!(sink.cookies, vec!["sid=1; Path=/", "theme=dark"]);
    assert_eq!(sink.body, b"{\"ok\":true}");
    assert!(sink.ended);
}

#[test]
fn test_emit_single_value_headers_joined_per_name() {
    let mut sink = RecordingSink::single_value();
    emit_response(sample_response(), &mut sink).unwrap();

    assert_eq!(
        sink.headers,
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("X-Trace".to_string(), "a, b".to_string()),
            ("Vary".to_string(), "Accept".to_string()),
        ]
    );
    assert_eq!(sink.cookies.len(), 2);
}

#[test]
fn test_emit_empty_body_skips_write() {
    let mut sink = RecordingSink::repeated();
    emit_response(CanonicalResponse::new(204), &mut sink).unwrap();

    assert_eq!(sink.writes, 0);
    assert!(sink.ended);
}

fn app(request: &CanonicalRequest) -> Result<CanonicalResponse, BoxError> {
    if request.path() == "/boom" {
        return Err("template missing".into());
    }
    Ok(CanonicalResponse::text(200, request.method()))
}

fn native(method: &str, uri: &str) -> SwooleRequest {
    let mut req = SwooleRequest::default();
    req.server
        .insert("request_method", method.into());
    req.server
        .insert("request_uri", uri.into());
    req
}

#[test]
fn test_handler_failure_yields_500_and_keeps_serving() {
    let handler = SwooleHandler::new(app);

    let mut failed = RecordingSink::repeated();
    handler
        .on_request(native("get", "/boom"), &mut failed)
        .unwrap();
    assert_eq!(failed.status, Some(500));
    assert_eq!(failed.body, b"Internal Server Error");
    assert_eq!(
        failed.headers,
        vec![("Content-Type".to_string(), "text/plain".to_string())]
    );

    let mut ok = RecordingSink::repeated();
    handler
        .on_request(native("delete", "/items/1"), &mut ok)
        .unwrap();
    assert_eq!(ok.status, Some(200));
    assert_eq!(ok.body, b"DELETE");
}

#[test]
fn test_handler_rejects_malformed_request() {
    let handler = SwooleHandler::new(app);
    let mut sink = RecordingSink::repeated();

    handler
        .on_request(native("GE T", "/"), &mut sink)
        .unwrap();

    assert_eq!(sink.status, Some(400));
}

#[test]
fn test_handler_serves_concurrent_callbacks() {
    let handler = SwooleHandler::new(app);

    std::thread::scope(|s| {
        for i in 0..8 {
            let handler = &handler;
            s.spawn(move || {
                let mut sink = RecordingSink::repeated();
                let uri = if i % 2 == 0 { "/boom" } else { "/ok" };
                handler
                    .on_request(native("post", uri), &mut sink)
                    .unwrap();

                let expected = if i % 2 == 0 { 500 } else { 200 };
                assert_eq!(sink.status, Some(expected));
            });
        }
    });
}

#[cfg(feature = "http")]
mod http_interop {
    use super::*;

    struct QueueTransport {
        requests: Vec<http::Request<Vec<u8>>>,
        responses: Vec<http::Response<Vec<u8>>>,
        errors: Vec<String>,
    }

    impl HttpTransport for QueueTransport {
        fn wait_request(
            &mut self,
        ) -> Result<Option<http::Request<Vec<u8>>>, crate::worker::TransportError>
        {
            if self.requests.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.requests.remove(0)))
            }
        }

        fn respond(
            &mut self,
            response: http::Response<Vec<u8>>,
        ) -> Result<(), crate::worker::TransportError> {
            self.responses.push(response);
            Ok(())
        }

        fn error(
            &mut self,
            message: &str,
        ) -> Result<(), crate::worker::TransportError> {
            self.errors.push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_from_http_request() {
        let req = http::Request::builder()
            .method("PATCH")
            .uri("https://app.test/users/7?fields=name")
            .header("X-Forwarded-Proto", "https")
            .header("Accept", "text/html")
            .header("Accept", "application/json")
            .body(b"name=x".to_vec())
            .unwrap();

        let canonical = from_http_request(req).unwrap();

        assert_eq!(canonical.method(), "PATCH");
        assert_eq!(canonical.path(), "/users/7");
        assert_eq!(canonical.query_string(), "fields=name");
        assert!(canonical.is_secure());
        assert_eq!(
            canonical.headers().get_all("accept"),
            vec!["text/html", "application/json"]
        );
        assert_eq!(canonical.server_var("CONTENT_LENGTH"), Some("6"));
        assert_eq!(canonical.server_var("SERVER_PROTOCOL"), Some("HTTP/1.1"));
    }

    #[test]
    fn test_into_http_response_keeps_every_value() {
        let response = into_http_response(sample_response()).unwrap();

        assert_eq!(response.status(), 201);
        assert_eq!(
            response
                .headers()
                .get_all("x-trace")
                .iter()
                .count(),
            2
        );
        assert_eq!(
            response
                .headers()
                .get_all("set-cookie")
                .iter()
                .count(),
            2
        );
        assert_eq!(response.body(), b"{\"ok\":true}");
    }

    #[test]
    fn test_into_http_response_rejects_bad_header() {
        let bad = CanonicalResponse::new(200).with_header("Bad Header", "x");
        assert!(matches!(
            into_http_response(bad),
            Err(AdapterError::InvalidHeader { .. })
        ));

        assert!(matches!(
            into_http_response(CanonicalResponse::new(42)),
            Err(AdapterError::InvalidStatus(42))
        ));
    }

    #[test]
    fn test_psr7_worker_loop() {
        let requests = vec![
            http::Request::builder()
                .uri("/ok")
                .body(Vec::new())
                .unwrap(),
            http::Request::builder()
                .uri("/boom")
                .body(Vec::new())
                .unwrap(),
            http::Request::builder()
                .method("POST")
                .uri("/ok")
                .body(Vec::new())
                .unwrap(),
        ];

        let mut transport = Psr7Transport::new(QueueTransport {
            requests,
            responses: Vec::new(),
            errors: Vec::new(),
        });

        let summary = crate::worker::Worker::new(app)
            .run(&mut transport)
            .unwrap();
        assert_eq!(summary.handled, 3);
        assert_eq!(summary.failed, 1);

        let inner = transport.into_inner();
        let statuses: Vec<u16> = inner
            .responses
            .iter()
            .map(|r| r.status().as_u16())
            .collect();
        assert_eq!(statuses, vec![200, 500, 200]);
        assert_eq!(inner.responses[1].body(), b"Internal Server Error");
        assert_eq!(inner.responses[2].body(), b"POST");
        assert_eq!(inner.errors, vec!["template missing"]);
    }
}
