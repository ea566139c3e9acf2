// tests/metrics_tests.rs
use std::time::Duration;

use logrecycler::metrics::{MetricSink, PrometheusSink, StatsdSink};
use logrecycler::{AppConfig, LineDispatcher, SinkSet, SourceLine, TransformPipeline};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

fn line(text: &str) -> SourceLine {
    SourceLine {
        source: 0,
        line: text.to_string(),
    }
}

async fn receive(socket: &UdpSocket) -> String {
    let mut buf = [0u8; 1024];
    let len = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
        .await
        .expect("no datagram received")
        .unwrap();
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

async fn scrape(port: u16) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("scrape timed out")
        .unwrap();
    response
}

#[tokio::test]
async fn test_statsd_datagrams_per_accepted_line() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let address = server.local_addr().unwrap();

    let config = AppConfig::from_yaml_str(&format!(
        "statsd:\n  address: {}\n  metric: foo.logs\npatterns:\n- regex: hi\n  add:\n    foo: bar\n- regex: noise\n  discard: true\n",
        address
    ))
    .unwrap();
    let mut sinks = SinkSet::from_config(&config).unwrap();
    assert_eq!(sinks.len(), 1);
    sinks.start().unwrap();
    let pipeline = TransformPipeline::new(config.pipeline.clone());

    let mut dispatcher = LineDispatcher::new(&pipeline, &sinks, Vec::new(), Vec::new());
    dispatcher.dispatch(&line("hi")).unwrap();
    dispatcher.dispatch(&line("noise")).unwrap();
    dispatcher.dispatch(&line("other")).unwrap();

    assert_eq!(receive(&server).await, "foo.logs:1|c|#foo:bar");
    // the discarded line sent nothing, so the next datagram is for "other"
    assert_eq!(receive(&server).await, "foo.logs:1|c");

    drop(dispatcher);
    sinks.stop();
}

#[tokio::test]
async fn test_statsd_stop_is_idempotent() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut sink = StatsdSink::new(logrecycler::metrics::StatsdConfig {
        address: server.local_addr().unwrap().to_string(),
        metric: "m".into(),
    });
    sink.start().unwrap();
    sink.stop();
    sink.stop();
    // stopped sinks drop increments silently
    sink.increment(&Default::default());
}

#[tokio::test]
async fn test_prometheus_scrape() {
    let config = AppConfig::from_yaml_str("prometheus:\n  port: 0\nlevelKey: lvl\n").unwrap();
    let prometheus = config.prometheus.clone().unwrap();
    assert_eq!(prometheus.labels, vec!["lvl"]);

    let mut sink = PrometheusSink::new(prometheus).unwrap();
    sink.start().unwrap();
    let port = sink.local_addr().unwrap().port();
    assert_ne!(port, 0);

    let pipeline = TransformPipeline::new(config.pipeline.clone());
    let outcome = pipeline.process("hi");
    sink.increment(outcome.labels().unwrap());

    let response = scrape(port).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("# TYPE logs_total counter"));
    assert!(response.contains("logs_total{lvl=\"INFO\"} 1\n"), "{}", response);

    sink.stop();
    sink.stop();
}

#[tokio::test]
async fn test_prometheus_port_in_use() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let config = AppConfig::from_yaml_str(&format!("prometheus:\n  port: {}\n", port)).unwrap();
    let mut sinks = SinkSet::from_config(&config).unwrap();
    let err = sinks.start().unwrap_err();
    assert!(err.to_string().contains(&port.to_string()));
}
