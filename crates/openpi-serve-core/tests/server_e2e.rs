//! End-to-end serving over TCP: metadata handshake, request/response,
//! per-request failure isolation, and recording through the pipeline.

use std::net::SocketAddr;

use std::sync::Arc;

use openpi_runtime::fakes::{EchoPolicy, MemoryConfigRegistry, MemoryPolicyLoader};
use openpi_runtime::{ModelConfig, PolicyMetadata, TrainConfig};
use openpi_serve_core::wire::encode_observation;
use openpi_serve_core::{
    read_records, CheckpointCatalog, CheckpointDescriptor, EnvironmentMode, PolicyFactory,
    PolicyServer, PolicySpecResolver, ServerFrame, ServingArguments, ServingPipeline,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pipeline() -> ServingPipeline<MemoryConfigRegistry, MemoryPolicyLoader> {
    let registry = MemoryConfigRegistry::new()
        .with_config(TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0()), None)
        .with_config(TrainConfig::new("custom", ModelConfig::pi05()), None);
    ServingPipeline::new(
        PolicySpecResolver::new(CheckpointCatalog::builtin(), registry),
        PolicyFactory::new(MemoryPolicyLoader::new()),
    )
}

async fn start(
    pipeline: ServingPipeline<MemoryConfigRegistry, MemoryPolicyLoader>,
    args: ServingArguments,
) -> (SocketAddr, JoinHandle<()>) {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = pipeline.bind(&args, loopback).await.expect("bind");
    let addr = server.local_addr();
    let handle = tokio::spawn(async move {
        let _ = server.serve_forever().await;
    });
    (addr, handle)
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn next_frame(&mut self) -> ServerFrame {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read")
            .expect("server closed connection");
        ServerFrame::decode(&line).expect("decode frame")
    }

    async fn send_raw(&mut self, line: &[u8]) {
        self.writer.write_all(line).await.expect("write");
    }

    async fn infer(&mut self, observation: serde_json::Value) -> ServerFrame {
        let line = encode_observation(&observation).unwrap();
        self.writer.write_all(&line).await.expect("write");
        self.next_frame().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_is_sent_before_first_exchange() {
    let (addr, server) = start(pipeline(), ServingArguments::default()).await;
    let mut client = Client::connect(addr).await;

    match client.next_frame().await {
        ServerFrame::Metadata { metadata } => {
            assert_eq!(metadata.config_name, "pi0_aloha_sim");
            assert_eq!(
                metadata.checkpoint_dir,
                "gs://openpi-assets/checkpoints/pi0_aloha_sim"
            );
        }
        other => panic!("expected metadata frame, got {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn failed_request_does_not_end_the_connection() {
    let (addr, server) = start(pipeline(), ServingArguments::default()).await;
    let mut client = Client::connect(addr).await;
    client.next_frame().await;

    let first = client.infer(json!({"fail": true})).await;
    assert!(matches!(first, ServerFrame::Error { .. }));

    client.send_raw(b"{definitely not json\n").await;
    match client.next_frame().await {
        ServerFrame::Error { message } => assert!(message.contains("malformed")),
        other => panic!("expected error frame, got {other:?}"),
    }

    let third = client.infer(json!({"state": [0.0]})).await;
    match third {
        ServerFrame::Actions { actions } => assert_eq!(actions["echo"]["state"], json!([0.0])),
        other => panic!("expected actions frame, got {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn one_policy_serves_many_connections() {
    let (addr, server) = start(pipeline(), ServingArguments::default()).await;

    let mut a = Client::connect(addr).await;
    let mut b = Client::connect(addr).await;
    a.next_frame().await;
    b.next_frame().await;

    let ra = a.infer(json!({"who": "a"})).await;
    let rb = b.infer(json!({"who": "b"})).await;
    let (ServerFrame::Actions { actions: ra }, ServerFrame::Actions { actions: rb }) = (ra, rb)
    else {
        panic!("expected two actions frames");
    };
    assert_eq!(ra["echo"]["who"], "a");
    assert_eq!(rb["echo"]["who"], "b");
    // Shared instance: the call counter advances across connections.
    assert_ne!(ra["call"], rb["call"]);
    server.abort();
}

#[tokio::test]
async fn default_prompt_reaches_the_policy() {
    let args = ServingArguments::default().with_default_prompt("transfer the cube");
    let (addr, server) = start(pipeline(), args).await;
    let mut client = Client::connect(addr).await;
    client.next_frame().await;

    match client.infer(json!({"state": []})).await {
        ServerFrame::Actions { actions } => {
            assert_eq!(actions["echo"]["prompt"], "transfer the cube")
        }
        other => panic!("expected actions frame, got {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn record_flag_writes_one_record_per_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let record_dir = dir.path().join("policy_records");
    let pipeline = pipeline().with_record_dir(&record_dir);
    let args = ServingArguments {
        record: true,
        ..ServingArguments::for_env(EnvironmentMode::Droid)
            .with_checkpoint(CheckpointDescriptor::new("custom", "/tmp/ckpt"))
    };

    let (addr, server) = start(pipeline, args).await;
    let mut client = Client::connect(addr).await;
    match client.next_frame().await {
        ServerFrame::Metadata { metadata } => assert_eq!(metadata.config_name, "custom"),
        other => panic!("expected metadata frame, got {other:?}"),
    }

    for i in 0..3 {
        let frame = client.infer(json!({ "t": i })).await;
        assert!(matches!(frame, ServerFrame::Actions { .. }));
    }

    let records = read_records(&record_dir).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].inputs, json!({"t": 2}));
    server.abort();
}

#[tokio::test]
async fn non_utf8_line_gets_error_frame_and_connection_survives() {
    let (addr, server) = start(pipeline(), ServingArguments::default()).await;
    let mut client = Client::connect(addr).await;
    client.next_frame().await;

    client.send_raw(b"\xff\xfe\n").await;
    match client.next_frame().await {
        ServerFrame::Error { message } => assert!(message.contains("malformed")),
        other => panic!("expected error frame, got {other:?}"),
    }

    match client.infer(json!({"a": 1})).await {
        ServerFrame::Actions { actions } => assert_eq!(actions["echo"]["a"], 1),
        other => panic!("expected actions frame, got {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn overlong_line_gets_error_frame_and_connection_survives() {
    let config = TrainConfig::new("pi0_aloha_sim", ModelConfig::pi0());
    let metadata = PolicyMetadata::for_config(&config, "/tmp/ckpt");
    let policy = Arc::new(EchoPolicy::new(metadata.clone()));
    let bound = PolicyServer::new(policy, metadata)
        .with_max_frame_bytes(64)
        .bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = bound.local_addr();
    let server = tokio::spawn(async move {
        let _ = bound.serve_forever().await;
    });

    let mut client = Client::connect(addr).await;
    client.next_frame().await;

    let mut long_line = format!("{{\"pad\":\"{}\"}}", "x".repeat(500)).into_bytes();
    long_line.push(b'\n');
    client.send_raw(&long_line).await;
    match client.next_frame().await {
        ServerFrame::Error { message } => assert!(message.contains("exceeds 64 bytes")),
        other => panic!("expected error frame, got {other:?}"),
    }

    match client.infer(json!({"a": 2})).await {
        ServerFrame::Actions { actions } => assert_eq!(actions["echo"]["a"], 2),
        other => panic!("expected actions frame, got {other:?}"),
    }
    server.abort();
}
