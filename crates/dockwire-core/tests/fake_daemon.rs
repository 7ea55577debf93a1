//! Client tests against a scripted daemon on a Unix socket.
//!
//! The fake daemon matches `"<METHOD> <path>"` request lines against canned
//! replies and records every request it sees.

use dockwire_core::{
    ClientError, DockerClient, DockerEvent, ErrorCause, EventFilters, LogLine, LogOptions,
    LogStream, RemoveOptions, StreamCallbacks, Target,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::mpsc;

#[derive(Clone)]
struct Reply {
    pieces: Vec<Vec<u8>>,
    hold_open: bool,
}

struct FakeDaemon {
    _dir: tempfile::TempDir,
    client: DockerClient,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeDaemon {
    fn start(routes: Vec<(&str, Reply)>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let routes: HashMap<String, Reply> = routes
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let routes = Arc::new(routes);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((mut conn, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match conn.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let text = String::from_utf8_lossy(&head);
                    let line = text.lines().next().unwrap_or_default();
                    let key = line.trim_end_matches(" HTTP/1.1").to_string();
                    seen.lock().unwrap().push(key.clone());

                    let reply = routes.get(&key).cloned().unwrap_or_else(|| {
                        json(404, r#"{"message":"page not found"}"#)
                    });
                    for piece in &reply.pieces {
                        if conn.write_all(piece).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    if reply.hold_open {
                        while let Ok(n) = conn.read(&mut buf).await {
                            if n == 0 {
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            _dir: dir,
            client: DockerClient::new(Target::unix(&path)),
            requests,
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn json(status: u16, body: &str) -> Reply {
    Reply {
        pieces: vec![format!(
            "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()],
        hold_open: false,
    }
}

fn empty(status: u16) -> Reply {
    Reply {
        pieces: vec![format!("HTTP/1.1 {status} Status\r\n\r\n").into_bytes()],
        hold_open: false,
    }
}

/// Chunked streaming reply; each element becomes one chunk, then the
/// terminating chunk is sent and the connection is kept open.
fn chunked_stream(chunks: &[&[u8]]) -> Reply {
    let mut pieces = vec![b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec()];
    for chunk in chunks {
        let mut piece = format!("{:x}\r\n", chunk.len()).into_bytes();
        piece.extend_from_slice(chunk);
        piece.extend_from_slice(b"\r\n");
        pieces.push(piece);
    }
    pieces.push(b"0\r\n\r\n".to_vec());
    Reply {
        pieces,
        hold_open: true,
    }
}

fn frame(kind: u8, payload: &str) -> Vec<u8> {
    let mut out = vec![kind, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload.as_bytes());
    out
}

const CONTAINERS: &str = r#"[
    {"Id": "a1b2c3d4e5f6a7b8c9d0", "Names": ["/shop-web-1"], "Image": "nginx:1.25", "ImageID": "sha256:1111",
     "Command": "nginx", "Created": 1700000000, "State": "running", "Status": "Up 2 hours",
     "Ports": [{"IP": "0.0.0.0", "PrivatePort": 80, "PublicPort": 8080, "Type": "tcp"}],
     "Labels": {"com.docker.compose.project": "shop", "com.docker.compose.service": "web"}},
    {"Id": "ffffeeeeddddccccbbbb", "Names": ["/loner"], "Image": "redis", "State": "exited",
     "Status": "Exited (0)", "Ports": [], "Labels": null}
]"#;

#[tokio::test]
async fn test_list_containers() {
    let daemon = FakeDaemon::start(vec![("GET /containers/json?all=true", json(200, CONTAINERS))]);

    let containers = daemon.client.list_containers(true).await.unwrap();
    assert_eq!(containers.len(), 2);

    let web = &containers[0];
    assert_eq!(web.name, "shop-web-1");
    assert_eq!(web.short_id, "a1b2c3d4e5f6");
    assert_eq!(web.ports, vec!["0.0.0.0:8080->80/tcp".to_string()]);
    assert_eq!(web.compose.as_ref().unwrap().service, "web");
    assert!(containers[1].compose.is_none());
    assert!(containers[1].labels.is_empty());

    assert_eq!(daemon.requests(), vec!["GET /containers/json?all=true"]);
}

#[tokio::test]
async fn test_inspect_not_found_is_wrapped() {
    let daemon = FakeDaemon::start(vec![(
        "GET /containers/missing/json",
        json(404, r#"{"message":"No such container: missing"}"#),
    )]);

    let err = daemon.client.inspect_container("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        err.to_string(),
        r#"Failed to inspect container missing: HTTP 404: {"message":"No such container: missing"}"#
    );
}

#[tokio::test]
async fn test_invalid_json_is_wrapped() {
    let daemon = FakeDaemon::start(vec![("GET /images/nginx/json", json(200, "{not json"))]);

    let err = daemon.client.inspect_image("nginx").await.unwrap_err();
    assert!(matches!(err.cause(), ErrorCause::Json(_)));
    assert!(err.to_string().starts_with("Failed to inspect image nginx:"));
}

#[tokio::test]
async fn test_lifecycle_paths() {
    let daemon = FakeDaemon::start(vec![
        ("POST /containers/web/start", empty(304)),
        ("POST /containers/web/stop?t=5", empty(204)),
        ("POST /containers/web/restart", empty(204)),
        ("DELETE /containers/web?force=true&v=false", empty(204)),
    ]);
    let client = &daemon.client;

    client.start_container("web").await.unwrap();
    client.stop_container("web", Some(5)).await.unwrap();
    client.restart_container("web", None).await.unwrap();
    client
        .remove_container(
            "web",
            RemoveOptions {
                force: true,
                volumes: false,
            },
        )
        .await
        .unwrap();

    let err = client.stop_container("ghost", None).await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(err.to_string().starts_with("Failed to stop container ghost:"));

    assert_eq!(
        daemon.requests(),
        vec![
            "POST /containers/web/start",
            "POST /containers/web/stop?t=5",
            "POST /containers/web/restart",
            "DELETE /containers/web?force=true&v=false",
            "POST /containers/ghost/stop",
        ]
    );
}

#[tokio::test]
async fn test_images() {
    let daemon = FakeDaemon::start(vec![
        (
            "GET /images/json?all=false",
            json(
                200,
                r#"[{"Id": "sha256:abcdef0123456789", "RepoTags": ["localhost:5000/app:v2", "app:latest"], "Created": 1, "Size": 42, "Containers": -1},
                    {"Id": "sha256:9999999999999999", "RepoTags": null, "Size": 7}]"#,
            ),
        ),
        (
            "DELETE /images/app:latest?force=false&noprune=true",
            json(200, r#"[{"Untagged": "app:latest"}, {"Deleted": "sha256:abcdef0123456789"}]"#),
        ),
    ]);

    let images = daemon.client.list_images(false).await.unwrap();
    let rows: Vec<_> = images
        .iter()
        .map(|i| (i.repository.as_str(), i.tag.as_str(), i.short_id.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("localhost:5000/app", "v2", "abcdef012345"),
            ("app", "latest", "abcdef012345"),
            ("<none>", "<none>", "999999999999"),
        ]
    );

    let removed = daemon
        .client
        .remove_image("app:latest", false, true)
        .await
        .unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(removed[0].untagged.as_deref(), Some("app:latest"));
}

#[tokio::test]
async fn test_container_logs_snapshot() {
    let mut body = frame(1, "hello\n");
    body.extend(frame(2, "warning\n"));
    let mut head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/vnd.docker.multiplexed-stream\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    head.extend(body);

    let daemon = FakeDaemon::start(vec![(
        "GET /containers/web/logs?follow=false&stdout=true&stderr=true&timestamps=false&tail=10",
        Reply {
            pieces: vec![head],
            hold_open: false,
        },
    )]);

    let options = LogOptions {
        follow: true,
        ..LogOptions::default().tail("10")
    };
    let text = daemon.client.container_logs("web", &options).await.unwrap();
    assert_eq!(text, "hello\nwarning\n");
}

#[tokio::test]
async fn test_stream_container_logs() {
    let mut frames = frame(1, "line one\n");
    frames.extend(frame(2, "line two\n"));
    frames.extend(frame(1, "   \n"));
    frames.extend(frame(1, "line three\n"));
    // Chunk boundaries deliberately fall inside frame headers and payloads.
    let chunks: Vec<&[u8]> = vec![&frames[..3], &frames[3..12], &frames[12..30], &frames[30..]];

    let daemon = FakeDaemon::start(vec![(
        "GET /containers/web/logs?follow=true&stdout=true&stderr=true&timestamps=false&tail=all",
        chunked_stream(&chunks),
    )]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));
    let close_count = Arc::clone(&closes);

    let handle = daemon
        .client
        .stream_container_logs(
            "web",
            &LogOptions::default(),
            StreamCallbacks::new(move |line: LogLine| {
                let _ = tx.send(line);
            })
            .on_close(move || {
                close_count.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle.closed())
        .await
        .unwrap();

    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    assert_eq!(
        lines,
        vec![
            LogLine {
                text: "line one".into(),
                stream: LogStream::Stdout
            },
            LogLine {
                text: "line two".into(),
                stream: LogStream::Stderr
            },
            LogLine {
                text: "line three".into(),
                stream: LogStream::Stdout
            },
        ]
    );
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stream_events_with_filters() {
    let start = r#"{"Type":"container","Action":"start","Actor":{"ID":"abc","Attributes":{"name":"web"}},"time":1700000000}"#;
    let die = r#"{"status":"die","id":"abc","from":"nginx","time":1700000001}"#;
    let feed = format!("{start}\n{{garbage\n{die}\n");
    let bytes = feed.as_bytes();
    let chunks: Vec<&[u8]> = vec![&bytes[..20], &bytes[20..bytes.len() - 10], &bytes[bytes.len() - 10..]];

    let daemon = FakeDaemon::start(vec![(
        "GET /events?filters=%7B%22container%22%3A%5B%22abc%22%5D%2C%22type%22%3A%5B%22container%22%5D%7D",
        chunked_stream(&chunks),
    )]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let errors = Arc::new(AtomicUsize::new(0));
    let error_count = Arc::clone(&errors);

    let handle = daemon
        .client
        .stream_events(
            &EventFilters::new().container("abc").event_type("container"),
            StreamCallbacks::new(move |event: DockerEvent| {
                let _ = tx.send(event);
            })
            .on_error(move |_: ClientError| {
                error_count.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle.closed())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "start");
    assert_eq!(events[0].actor_name(), Some("web"));
    assert_eq!(events[1].action, "die");
    assert_eq!(events[1].actor.id, "abc");
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stream_rejected_is_wrapped() {
    let daemon = FakeDaemon::start(vec![]);

    let err = daemon
        .client
        .stream_container_logs(
            "ghost",
            &LogOptions::default(),
            StreamCallbacks::new(|_: LogLine| {}),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err
        .to_string()
        .starts_with("Failed to stream logs for container ghost: HTTP 404"));
}

#[tokio::test]
async fn test_cancel_event_stream() {
    let daemon = FakeDaemon::start(vec![(
        "GET /events",
        Reply {
            pieces: vec![b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n".to_vec()],
            hold_open: true,
        },
    )]);

    let closes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let close_count = Arc::clone(&closes);
    let error_count = Arc::clone(&errors);

    let handle = daemon
        .client
        .stream_events(
            &EventFilters::new(),
            StreamCallbacks::new(|_: DockerEvent| {})
                .on_error(move |_| {
                    error_count.fetch_add(1, Ordering::SeqCst);
                })
                .on_close(move || {
                    close_count.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();

    assert!(!handle.is_closed());
    handle.cancel();
    handle.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle.closed())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_container_details() {
    let inspect = r#"{
        "Id": "a1b2c3d4e5f6a7b8c9d0", "Name": "/shop-web-1", "Path": "nginx", "Args": [],
        "State": {"Status": "running", "Running": true},
        "HostConfig": {"NetworkMode": "bridge"},
        "Config": {"Image": "nginx:1.25"},
        "NetworkSettings": {"Networks": {"bridge": {"IPAddress": "172.17.0.2"}}},
        "Mounts": []
    }"#;
    let df = r#"{
        "LayersSize": 5000,
        "Images": [{"Id": "sha256:1111", "Size": 5000, "Containers": 1}],
        "Containers": [{"Id": "a1b2c3d4e5f6a7b8c9d0", "State": "running", "SizeRw": 12, "SizeRootFs": 5012}],
        "Volumes": []
    }"#;
    let daemon = FakeDaemon::start(vec![
        ("GET /containers/web/json", json(200, inspect)),
        ("GET /system/df", json(200, df)),
    ]);

    let details = daemon.client.container_details("web").await.unwrap();
    assert_eq!(details.summary.name, "shop-web-1");
    assert_eq!(details.summary.command, "nginx");
    assert_eq!(
        details.network.networks[0].ip_address.as_deref(),
        Some("172.17.0.2")
    );
    assert_eq!(details.disk_usage.size_rw, Some(12));
    assert_eq!(details.disk_usage.system.images.size, 5000);
    assert!(details.mounts.is_empty());
}

/// Runs against the local daemon.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_live_daemon_listing() {
    let client = DockerClient::from_env();
    client.list_containers(true).await.unwrap();
    client.list_images(false).await.unwrap();
    client.disk_usage().await.unwrap();
}
