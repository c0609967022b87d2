mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use common::{FailingTracer, Recorded};
use heureux::schema::{self, Codec};
use heureux::services::{Level, Services, tags};
use heureux::{
    BoundEndpoint, Endpoint, Error, HandlerError, HttpError, InjectOptions, Method, Reply, ResponseValidation,
    Server, ServerOptions, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Deserialize, Serialize)]
struct NewWidget {
    name: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Widget {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WidgetParams {
    id: i64,
}

fn new_widget() -> Codec<NewWidget> {
    Codec::new(schema::object().field("name", schema::string()))
}

fn widget_params() -> Codec<WidgetParams> {
    Codec::new(schema::object().field("id", schema::integer_from_string()))
}

fn plain_server() -> Server {
    Server::new(ServerOptions::default(), Services::new(json!({ "service_name": "widgets" })))
}

fn no_content() -> BoundEndpoint<Value> {
    Endpoint::new(Method::Get, "/test")
        .handler(|_req, h| async move { Ok(h.response(Value::Null).code(StatusCode::NO_CONTENT)) })
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn explicit_id_is_returned_and_204_has_no_body() {
    let mut server = plain_server();
    let id = server.endpoint(no_content().id("test")).unwrap();
    assert_eq!(id, "test");

    let res = server.inject("/test").await.unwrap();
    assert_eq!(res.status_code, StatusCode::NO_CONTENT);
    assert!(res.payload.is_empty());
    assert_eq!(res.result, None);
}

#[test]
fn anonymous_endpoints_are_numbered_in_order() {
    let mut server = plain_server();
    let first = server.endpoint(Endpoint::new(Method::Get, "/a").handler(|_req, h| async move { Ok(h.empty()) }));
    let named = server.endpoint(Endpoint::new(Method::Get, "/b").id("b").handler(|_req, h| async move { Ok(h.empty()) }));
    let second = server.endpoint(Endpoint::new(Method::Get, "/c").handler(|_req, h| async move { Ok(h.empty()) }));

    assert_eq!(first.unwrap(), "endpoint-0");
    assert_eq!(named.unwrap(), "b");
    assert_eq!(second.unwrap(), "endpoint-1");
}

#[test]
fn registration_errors() {
    let mut server = plain_server();
    server.endpoint(no_content().id("test")).unwrap();

    let duplicate = server.endpoint(
        Endpoint::new(Method::Get, "/other")
            .id("test")
            .handler(|_req, h| async move { Ok(h.empty()) }),
    );
    assert!(matches!(duplicate, Err(Error::DuplicateEndpoint(id)) if id == "test"));

    let conflict = server.endpoint(no_content());
    assert!(matches!(conflict, Err(Error::InvalidRoute { .. })));
}

#[test]
fn table_lists_routes_in_registration_order() {
    let mut server = plain_server();
    server.endpoint(no_content().id("test").description("probe").tag("ops")).unwrap();
    server
        .endpoint(
            Endpoint::new(Method::Post, "/widgets")
                .payload(new_widget())
                .handler(|_req, h| async move { Ok(h.empty()) }),
        )
        .unwrap();

    let table = server.table();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].id, "test");
    assert_eq!(table[0].description.as_deref(), Some("probe"));
    assert_eq!(table[0].tags, vec!["ops".to_owned()]);
    assert_eq!((table[1].method, table[1].path.as_str()), (Method::Post, "/widgets"));
}

// ── Validation ────────────────────────────────────────────────────────────────

fn widgets_server() -> Server {
    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Post, "/widgets")
                .payload(new_widget())
                .handler(|req, h| async move {
                    let name = req.payload().name.clone();
                    Ok(h.response(json!({ "id": 1, "name": name })).created("/widgets/1"))
                }),
        )
        .unwrap();
    server
}

#[tokio::test]
async fn missing_payload_field_is_one_400_error() {
    let server = widgets_server();
    let res = server
        .inject(InjectOptions::new(Method::Post, "/widgets").json(json!({})))
        .await
        .unwrap();

    assert_eq!(res.status_code, StatusCode::BAD_REQUEST);
    let body = res.result.unwrap();
    assert_eq!(body["message"], "Invalid request payload input");
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0], "'undefined' supplied to '{ name: string }/name: string'");
    assert!(errors[0].as_str().unwrap().ends_with("name: string'"));
}

#[tokio::test]
async fn valid_payload_reaches_the_handler() {
    let server = widgets_server();
    let res = server
        .inject(InjectOptions::new(Method::Post, "/widgets").json(json!({ "name": "bolt" })))
        .await
        .unwrap();

    assert_eq!(res.status_code, StatusCode::CREATED);
    assert_eq!(res.header("location"), Some("/widgets/1"));
    assert_eq!(res.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(res.result, Some(json!({ "id": 1, "name": "bolt" })));
}

#[tokio::test]
async fn empty_body_decodes_when_no_field_is_required() {
    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Post, "/empty")
                .payload(Codec::<Value>::new(schema::partial().field("name", schema::string())))
                .handler(|req, h| async move { Ok(h.response(req.payload().clone())) }),
        )
        .unwrap();

    let res = server.inject(InjectOptions::new(Method::Post, "/empty")).await.unwrap();
    assert_eq!(res.status_code, StatusCode::OK);
    assert_eq!(res.result, Some(json!({})));

    let res = widgets_server().inject(InjectOptions::new(Method::Post, "/widgets")).await.unwrap();
    assert_eq!(res.status_code, StatusCode::BAD_REQUEST);
    assert_eq!(res.result.unwrap()["errors"], json!(["'undefined' supplied to '{ name: string }'"]));
}

#[tokio::test]
async fn every_violation_is_reported_in_order() {
    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Post, "/sized")
                .payload(Codec::<Value>::new(
                    schema::object()
                        .field("name", schema::string())
                        .field("sizes", schema::array(schema::number())),
                ))
                .handler(|_req, h| async move { Ok(h.empty()) }),
        )
        .unwrap();

    let res = server
        .inject(InjectOptions::new(Method::Post, "/sized").json(json!({ "name": 1, "sizes": [1, "x"] })))
        .await
        .unwrap();

    assert_eq!(res.status_code, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.result.unwrap()["errors"],
        json!([
            "'1' supplied to '{ name: string, sizes: Array<number> }/name: string'",
            "'\"x\"' supplied to '{ name: string, sizes: Array<number> }/sizes: Array<number>/1: number'",
        ])
    );
}

#[tokio::test]
async fn params_fail_before_the_payload_is_decoded() {
    let called = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&called);

    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Put, "/widgets/{id}")
                .params(widget_params())
                .payload(new_widget())
                .handler(move |_req, h| {
                    seen.store(true, Ordering::SeqCst);
                    async move { Ok(h.empty()) }
                }),
        )
        .unwrap();

    let res = server
        .inject(InjectOptions::new(Method::Put, "/widgets/abc").json(json!({ "name": 3 })))
        .await
        .unwrap();

    assert_eq!(res.status_code, StatusCode::BAD_REQUEST);
    let body = res.result.unwrap();
    assert_eq!(body["message"], "Invalid request params input");
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn params_and_query_are_coerced() {
    #[derive(Deserialize)]
    struct Page {
        page: i64,
    }

    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Get, "/widgets/{id}")
                .params(widget_params())
                .query(Codec::<Page>::new(schema::object().field("page", schema::integer_from_string())))
                .response(Codec::<Widget>::new(
                    schema::object().field("id", schema::integer()).field("name", schema::string()),
                ))
                .handler(|req, _h| async move {
                    let name = format!("page {}", req.query().page);
                    Ok(Reply::Payload(Widget { id: req.params().id, name }))
                }),
        )
        .unwrap();

    let res = server.inject("/widgets/42?page=3").await.unwrap();
    assert_eq!(res.status_code, StatusCode::OK);
    assert_eq!(res.result, Some(json!({ "id": 42, "name": "page 3" })));

    let res = server.inject("/widgets/42?page=last").await.unwrap();
    assert_eq!(res.status_code, StatusCode::BAD_REQUEST);
    assert_eq!(res.result.unwrap()["message"], "Invalid request query input");
}

#[tokio::test]
async fn malformed_json_is_rejected_before_validation() {
    let server = widgets_server();
    let res = server
        .inject(
            InjectOptions::new(Method::Post, "/widgets")
                .header("content-type", "application/json")
                .raw("{\"name\":"),
        )
        .await
        .unwrap();

    assert_eq!(res.status_code, StatusCode::BAD_REQUEST);
    assert_eq!(res.result.unwrap()["message"], "Invalid request payload JSON format");
}

// ── Handler outcomes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_routes_are_404() {
    let server = widgets_server();
    let res = server.inject("/widgets").await.unwrap();
    assert_eq!(res.status_code, StatusCode::NOT_FOUND);
    assert_eq!(
        res.result,
        Some(json!({ "statusCode": 404, "error": "Not Found", "message": "Not Found" }))
    );
}

#[tokio::test]
async fn handler_errors_keep_their_status_or_become_500() {
    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Get, "/missing")
                .handler(|_req, _h| async move { Err::<Reply<Value>, _>(HandlerError::from(HttpError::not_found("no such widget"))) }),
        )
        .unwrap();
    server
        .endpoint(Endpoint::new(Method::Get, "/broken").handler(|_req, _h| async move {
            Err::<Reply<Value>, _>(HandlerError::other(std::io::Error::other("disk on fire")))
        }))
        .unwrap();

    let res = server.inject("/missing").await.unwrap();
    assert_eq!(res.status_code, StatusCode::NOT_FOUND);
    assert_eq!(res.result.unwrap()["message"], "no such widget");

    let res = server.inject("/broken").await.unwrap();
    assert_eq!(res.status_code, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.result.unwrap()["message"], "An internal server error occurred");
}

#[tokio::test]
async fn panicking_handler_is_500_and_finalized_once() {
    let rec = Recorded::new();
    let mut server = Server::new(ServerOptions::default(), rec.services());
    server
        .endpoint(Endpoint::new(Method::Get, "/boom").handler(|_req, h| async move {
            let fail = true;
            if fail {
                panic!("boom");
            }
            Ok(h.empty())
        }))
        .unwrap();

    let res = server.inject("/boom").await.unwrap();
    assert_eq!(res.status_code, StatusCode::INTERNAL_SERVER_ERROR);

    let spans = rec.tracer.spans.lock();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].finished, 1);
    assert_eq!(spans[0].tags[tags::HTTP_STATUS_CODE], json!(500));
    assert_eq!(rec.logger.messages(), vec!["request error".to_owned()]);
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_span_and_logger_are_wired() {
    let rec = Recorded::new();
    let mut server = Server::new(ServerOptions::default(), rec.services());
    let id = server
        .endpoint(
            Endpoint::new(Method::Get, "/widgets/{id}")
                .params(widget_params())
                .handler(|req, h| async move {
                    req.logger().info(json!({ "widget": req.params().id }), "loading widget");
                    Ok(h.response(json!({ "id": req.params().id })))
                }),
        )
        .unwrap();

    let res = server
        .inject(InjectOptions::from("/widgets/7").header("x-trace-id", "4bf92f3577b34da6a3ce929d0e0e4736"))
        .await
        .unwrap();
    assert_eq!(res.status_code, StatusCode::OK);

    {
        let spans = rec.tracer.spans.lock();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert!(span.name.ends_with("/widgets/7"), "span name {}", span.name);
        assert_eq!(span.parent.as_ref().unwrap().trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span.tags[tags::COMPONENT], json!("widgets"));
        assert_eq!(span.tags[tags::SPAN_KIND], json!(tags::SPAN_KIND_RPC_SERVER));
        assert_eq!(span.tags[tags::HTTP_METHOD], json!("GET"));
        assert_eq!(span.tags[tags::HTTP_URL], json!(span.name));
        assert_eq!(span.tags[tags::HTTP_STATUS_CODE], json!(200));
        assert_eq!(span.finished, 1);
    }

    assert_eq!(rec.logger.messages(), vec!["loading widget".to_owned(), "sending response".to_owned()]);
    let sent = rec.logger.find("sending response").unwrap();
    assert_eq!(sent.level, Level::Info);
    assert_eq!(sent.bindings["req"]["method"], "GET");
    assert_eq!(sent.data["res"]["payload"], json!({ "id": 7 }));
    assert!(sent.data["latency"].is_u64());

    let metrics = rec.metrics.records.lock();
    let requests = metrics.iter().find(|m| m.stat == heureux::REQUESTS_METRIC).unwrap();
    assert_eq!(requests.kind, "increment");
    assert_eq!(requests.value, 1.0);
    assert!(requests.tags.contains(&("endpoint".to_owned(), id)));
    assert!(requests.tags.contains(&("status".to_owned(), "200".to_owned())));
    assert!(metrics.iter().any(|m| m.stat == heureux::LATENCY_METRIC && m.kind == "histogram"));
}

#[tokio::test]
async fn errors_are_logged_with_their_output() {
    let rec = Recorded::new();
    let mut server = Server::new(ServerOptions::default(), rec.services());
    server
        .endpoint(
            Endpoint::new(Method::Post, "/widgets")
                .payload(new_widget())
                .handler(|_req, h| async move { Ok(h.empty()) }),
        )
        .unwrap();

    server
        .inject(InjectOptions::new(Method::Post, "/widgets").json(json!({})))
        .await
        .unwrap();

    let line = rec.logger.find("request error").unwrap();
    assert_eq!(line.level, Level::Info);
    assert_eq!(line.data["res"]["statusCode"], 400);
    assert_eq!(line.data["err"]["message"], "Invalid request payload input");
    assert_eq!(rec.tracer.spans.lock()[0].tags[tags::HTTP_STATUS_CODE], json!(400));
}

#[tokio::test]
async fn tracer_failure_aborts_the_request() {
    let rec = Recorded::new();
    let services = Services::builder(json!({ "service_name": "widgets" }))
        .logger(Arc::new(rec.logger.clone()))
        .tracer(Arc::new(FailingTracer))
        .build();
    let mut server = Server::new(ServerOptions::default(), services);
    server.endpoint(no_content()).unwrap();

    let res = server.inject("/test").await.unwrap();
    assert_eq!(res.status_code, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(rec.logger.messages().is_empty());
}

#[tokio::test]
async fn config_only_bundle_serves_requests() {
    let mut server = Server::new(ServerOptions::default(), Services::new(json!({ "service_name": "quiet" })));
    server
        .endpoint(Endpoint::<Value>::new(Method::Get, "/ping").handler(|req, h| async move {
            let services = req.services();
            services.logger.info(json!({}), "ignored");
            services.metrics.increment(&["pings"], 1.0, &Default::default());
            req.span().add_tags(Default::default());
            Ok(h.response(json!({ "service": services.config["service_name"] })))
        }))
        .unwrap();

    let res = server.inject("/ping").await.unwrap();
    assert_eq!(res.status_code, StatusCode::OK);
    assert_eq!(res.result, Some(json!({ "service": "quiet" })));
}

// ── Response contract ─────────────────────────────────────────────────────────

fn contract_server(mode: ResponseValidation, rec: &Recorded) -> Server {
    let options = ServerOptions { response_validation: mode, ..ServerOptions::default() };
    let mut server = Server::new(options, rec.services());
    server
        .endpoint(
            Endpoint::new(Method::Get, "/widget")
                .id("widget")
                .response(Codec::<Value>::new(schema::object().field("name", schema::string())))
                .handler(|_req, _h| async move { Ok(Reply::Payload(json!({ "name": 5 }))) }),
        )
        .unwrap();
    server
}

#[tokio::test]
async fn contract_violation_is_enforced_by_default() {
    let rec = Recorded::new();
    let server = contract_server(ResponseValidation::default(), &rec);

    let res = server.inject("/widget").await.unwrap();
    assert_eq!(res.status_code, StatusCode::INTERNAL_SERVER_ERROR);

    let violation = rec.logger.find("response contract violation").unwrap();
    assert_eq!(violation.level, Level::Error);
    assert!(violation.data["err"].as_str().unwrap().contains("endpoint `widget`"));
}

#[tokio::test]
async fn contract_violation_can_be_logged_only() {
    let rec = Recorded::new();
    let server = contract_server(ResponseValidation::Log, &rec);

    let res = server.inject("/widget").await.unwrap();
    assert_eq!(res.status_code, StatusCode::OK);
    assert_eq!(res.result, Some(json!({ "name": 5 })));
    assert!(rec.logger.find("response contract violation").is_some());
}

#[tokio::test]
async fn responses_are_encoded_through_their_codec() {
    let mut server = plain_server();
    server
        .endpoint(
            Endpoint::new(Method::Get, "/count")
                .response(Codec::<Value>::new(schema::object().field("count", schema::number_from_string())))
                .handler(|_req, h| async move { Ok(h.response(json!({ "count": 3 }))) }),
        )
        .unwrap();

    let res = server.inject("/count").await.unwrap();
    assert_eq!(res.result, Some(json!({ "count": "3" })));
}

// ── Server lifecycle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn load_counts_requests() {
    let mut server = plain_server();
    server.endpoint(no_content()).unwrap();

    server.inject("/test").await.unwrap();
    server.inject("/nope").await.unwrap();

    let load = server.load();
    assert_eq!(load.total, 2);
    assert_eq!(load.in_flight, 0);
}

#[tokio::test]
async fn start_serves_http_and_stop_drains() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut server = Server::new(ServerOptions::bind("127.0.0.1", 0), Services::new(json!({})));
    server.endpoint(no_content()).unwrap();
    server.initialize().unwrap();

    let addr = server.start().await.unwrap();
    assert_ne!(addr.port(), 0);
    assert_eq!(server.info().port, addr.port());
    assert!(server.info().started.is_some());
    assert!(matches!(server.start().await, Err(Error::AlreadyStarted)));
    assert!(matches!(server.endpoint(no_content().id("late")), Err(Error::AlreadyStarted)));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /test HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 204"), "{response}");

    server.stop(None).await.unwrap();
    assert!(server.info().started.is_none());
    assert!(matches!(server.stop(None).await, Err(Error::NotRunning)));
}

#[tokio::test]
async fn latency_and_span_start_include_a_slow_upload() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let rec = Recorded::new();
    let mut server = Server::new(ServerOptions::bind("127.0.0.1", 0), rec.services());
    let handled_at = Arc::new(parking_lot::Mutex::new(None::<SystemTime>));
    let seen = Arc::clone(&handled_at);
    server
        .endpoint(Endpoint::new(Method::Post, "/upload").handler(move |_req, h| {
            let seen = Arc::clone(&seen);
            async move {
                *seen.lock() = Some(SystemTime::now());
                Ok(h.empty())
            }
        }))
        .unwrap();
    let addr = server.start().await.unwrap();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"POST /upload HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\n\
              content-length: 2\r\nconnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    stream.write_all(b"{}").await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 204"), "{response}");
    server.stop(None).await.unwrap();

    let sent = rec.logger.find("sending response").unwrap();
    let latency = sent.data["latency"].as_u64().unwrap();
    assert!(latency >= 400, "latency {latency}ms");

    let handled_at = handled_at.lock().unwrap();
    let spans = rec.tracer.spans.lock();
    assert_eq!(spans.len(), 1);
    let waited = handled_at.duration_since(spans[0].start_time).unwrap();
    assert!(waited >= Duration::from_millis(400), "span started {waited:?} before the handler");
}

#[tokio::test]
async fn restart_rebinds_the_fallback_authority() {
    let rec = Recorded::new();
    let mut server = Server::new(ServerOptions::bind("127.0.0.1", 0), rec.services());
    server.endpoint(no_content()).unwrap();

    for _ in 0..2 {
        let addr = server.start().await.unwrap();
        server.inject("/test").await.unwrap();
        let name = rec.tracer.spans.lock().last().unwrap().name.clone();
        assert_eq!(name, format!("http://{addr}/test"));

        server.stop(None).await.unwrap();
        assert_eq!(server.info().uri, format!("http://{addr}"));
    }
}
