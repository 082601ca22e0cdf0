//! Echo client
//!
//! Exercises the echo server end to end over plain HTTP/1.1.
//!
//! Usage:
//!   # First, start the server in another terminal:
//!   cargo run --bin echo-server
//!
//!   # Then run the client (defaults to http://localhost:3000/rpc):
//!   cargo run --bin echo-client
//!
//!   # Or specify a custom endpoint:
//!   cargo run --bin echo-client -- http://localhost:8080/rpc

use std::env;

use anyhow::{Context, ensure};
use anyrpc_axum::PROTOBUF_CONTENT_TYPE;
use anyrpc_core::Envelope;
use anyrpc_examples::{EchoRequest, EchoResponse, RAW_ECHO_TYPE_URL, SleepRequest, SleepResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode, header};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use prost::Message;

type HttpClient = Client<HttpConnector, Full<Bytes>>;

async fn call(client: &HttpClient, url: &str, body: Vec<u8>) -> anyhow::Result<(StatusCode, Bytes)> {
    let request = Request::post(url)
        .header(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
        .body(Full::new(Bytes::from(body)))?;
    let response = client.request(request).await.context("request failed")?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = env::args()
        .nth(1)
        .or_else(|| env::var("SERVER_URL").ok())
        .unwrap_or_else(|| "http://localhost:3000/rpc".to_string());
    let client: HttpClient = Client::builder(TokioExecutor::new()).build_http();

    println!("=== anyrpc echo client ===");
    println!("Endpoint: {url}");
    println!();

    println!("Test 1: typed echo...");
    {
        let request = Envelope::pack(&EchoRequest {
            message: "hello".into(),
        });
        let (status, body) = call(&client, &url, request.encode_to_vec()).await?;
        ensure!(status == StatusCode::OK, "unexpected status {status}");
        let response = EchoResponse::decode(body)?;
        ensure!(response.message == "hello", "unexpected echo {:?}", response.message);
        println!("  PASS: echoed {:?} (request #{})", response.message, response.handled);
    }

    println!("Test 2: raw echo returns payload bytes verbatim...");
    {
        let payload = Bytes::from_static(b"\x00\x01\x02 not protobuf \xff");
        let request = Envelope::new(RAW_ECHO_TYPE_URL, payload.clone())?;
        let (status, body) = call(&client, &url, request.encode_to_vec()).await?;
        ensure!(status == StatusCode::OK, "unexpected status {status}");
        ensure!(body == payload, "payload changed in transit");
        println!("  PASS: {} bytes echoed", body.len());
    }

    println!("Test 3: sleeping handler...");
    {
        let request = Envelope::pack(&SleepRequest { millis: 50 });
        let (status, body) = call(&client, &url, request.encode_to_vec()).await?;
        ensure!(status == StatusCode::OK, "unexpected status {status}");
        let response = SleepResponse::decode(body)?;
        println!("  PASS: slept {}ms on a worker", response.slept_millis);
    }

    println!("Test 4: unknown type is unimplemented...");
    {
        let request = Envelope::new("type.googleapis.com/anyrpc.example.v1.Nope", Bytes::new())?;
        let (status, body) = call(&client, &url, request.encode_to_vec()).await?;
        ensure!(status == StatusCode::NOT_IMPLEMENTED, "unexpected status {status}");
        let error: serde_json::Value = serde_json::from_slice(&body)?;
        println!("  PASS: {}", error["message"]);
    }

    println!("Test 5: truncated envelope is rejected...");
    {
        let mut body = Envelope::pack(&EchoRequest {
            message: "cut short".into(),
        })
        .encode_to_vec();
        body.truncate(body.len() - 4);
        let (status, body) = call(&client, &url, body).await?;
        ensure!(status == StatusCode::BAD_REQUEST, "unexpected status {status}");
        let error: serde_json::Value = serde_json::from_slice(&body)?;
        println!("  PASS: {}", error["code"]);
    }

    println!();
    println!("All tests passed.");
    Ok(())
}
