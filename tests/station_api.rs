use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use serde_json::{json, Value};
use station_gateway::app::AppState;
use station_gateway::config::StationCfg;
use station_gateway::domain::{FieldValue, Point};
use station_gateway::http::router;
use station_gateway::sink::{PointSink, SinkError};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

/// Forwards every write session to the test, optionally held behind a gate.
struct RecordingSink {
    tx: mpsc::UnboundedSender<Vec<Point>>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl PointSink for RecordingSink {
    async fn write(&self, points: Vec<Point>) -> Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let _ = self.tx.send(points);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl PointSink for FailingSink {
    async fn write(&self, _points: Vec<Point>) -> Result<(), SinkError> {
        Err(SinkError::Transient("connection refused".into()))
    }
}

async fn spawn_app(sink: Arc<dyn PointSink>) -> SocketAddr {
    let state = AppState::new(Arc::new(StationCfg::default()), sink);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

fn recording(gate: Option<Arc<Notify>>) -> (Arc<dyn PointSink>, mpsc::UnboundedReceiver<Vec<Point>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingSink { tx, gate }), rx)
}

fn example_payload() -> Value {
    json!({
        "deviceID": "gw1",
        "batteryLevel": 87,
        "time": 1000,
        "eventId": "e1",
        "tags": [{
            "id": "s1",
            "name": "Sensor A",
            "updateAt": "2023-01-01T00:00:00Z",
            "temperature": 20,
            "humidity": "55%"
        }]
    })
}

async fn post_station(addr: SocketAddr, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/station"))
        .json(body)
        .send()
        .await
        .unwrap()
}

async fn next_session(rx: &mut mpsc::UnboundedReceiver<Vec<Point>>) -> Vec<Point> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("sink was never called")
        .expect("sink channel closed")
}

#[tokio::test]
async fn example_payload_is_written_as_one_session_of_two_points() {
    let (sink, mut rx) = recording(None);
    let addr = spawn_app(sink).await;

    let resp = post_station(addr, &example_payload()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), r#"{"eventId":"e1"}"#);

    let points = next_session(&mut rx).await;
    assert_eq!(points.len(), 2);
    assert_eq!(
        points[0].field_value("temperature"),
        Some(&FieldValue::Float(20.0))
    );
    assert_eq!(
        points[1].field_value("humidity"),
        Some(&FieldValue::String("55%".into()))
    );
    for p in &points {
        assert_eq!(p.tag_value("id"), Some("s1"));
        assert_eq!(p.tag_value("deviceID"), Some("gw1"));
        assert_eq!(p.tag_value("name"), Some("Sensor A"));
        assert_eq!(p.timestamp_ms, 1_672_531_200_000);
    }
}

#[tokio::test]
async fn response_does_not_wait_for_the_sink() {
    let gate = Arc::new(Notify::new());
    let (sink, mut rx) = recording(Some(gate.clone()));
    let addr = spawn_app(sink).await;

    let resp = tokio::time::timeout(
        Duration::from_secs(5),
        post_station(addr, &example_payload()),
    )
    .await
    .expect("response blocked on the sink");
    assert_eq!(resp.text().await.unwrap(), r#"{"eventId":"e1"}"#);
    assert!(rx.try_recv().is_err(), "sink finished before it was released");

    gate.notify_one();
    assert_eq!(next_session(&mut rx).await.len(), 2);
}

#[tokio::test]
async fn empty_tags_submit_no_points() {
    let (sink, mut rx) = recording(None);
    let addr = spawn_app(sink).await;

    let body = json!({
        "deviceID": "gw1", "batteryLevel": 10, "time": 5, "eventId": "empty", "tags": []
    });
    let resp = post_station(addr, &body).await;
    assert_eq!(resp.text().await.unwrap(), r#"{"eventId":"empty"}"#);
    assert!(next_session(&mut rx).await.is_empty());
}

#[tokio::test]
async fn numeric_event_id_is_echoed() {
    let (sink, _rx) = recording(None);
    let addr = spawn_app(sink).await;

    let mut body = example_payload();
    body["eventId"] = json!(1234);
    let resp = post_station(addr, &body).await;
    assert_eq!(resp.text().await.unwrap(), r#"{"eventId":1234}"#);
}

#[tokio::test]
async fn null_event_id_is_echoed_as_null() {
    let (sink, _rx) = recording(None);
    let addr = spawn_app(sink).await;

    let mut body = example_payload();
    body["eventId"] = Value::Null;
    let resp = post_station(addr, &body).await;
    assert_eq!(resp.text().await.unwrap(), r#"{"eventId":null}"#);

    body.as_object_mut().unwrap().remove("eventId");
    let resp = post_station(addr, &body).await;
    assert_eq!(resp.text().await.unwrap(), "{}");
}

#[tokio::test]
async fn sink_failure_is_not_visible_to_the_caller() {
    let addr = spawn_app(Arc::new(FailingSink)).await;

    let resp = post_station(addr, &example_payload()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), r#"{"eventId":"e1"}"#);
}

#[tokio::test]
async fn missing_tags_is_rejected_without_writing() {
    let (sink, mut rx) = recording(None);
    let addr = spawn_app(sink).await;

    let body = json!({ "deviceID": "gw1", "batteryLevel": 10, "time": 5, "eventId": "x" });
    let resp = post_station(addr, &body).await;
    assert!(resp.status().is_client_error(), "got {}", resp.status());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unparseable_update_at_is_a_bad_request() {
    let (sink, mut rx) = recording(None);
    let addr = spawn_app(sink).await;

    let mut body = example_payload();
    body["tags"][0]["updateAt"] = json!("not a date");
    let resp = post_station(addr, &body).await;
    assert_eq!(resp.status(), 400);
    let err: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert!(err["error"].as_str().unwrap().contains("updateAt"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn health_is_ok_without_a_working_sink() {
    let addr = spawn_app(Arc::new(FailingSink)).await;

    let resp = reqwest::get(format!("http://{addr}/api/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), r#"{"status":"OK"}"#);
}
