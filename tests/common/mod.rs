//! 集成测试公共设施
//!
//! 用 JSON 编解码手写两个 gRPC 服务（Greeter 和 Flaky），形状与 tonic 生成的
//! 代码一致，避免测试依赖 protoc。

#![allow(dead_code)]

use std::convert::Infallible;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};

use bytes::{Buf, BufMut, Bytes};
use duplex_kit::utils::{extract_client_id, extract_trace_parent};
use duplex_kit::{DuplexServer, wait_for_server_ready};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::net::TcpListener;
use tonic::body::Body as TonicBody;
use tonic::client::GrpcService;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::server::{NamedService, ServerStreamingService, UnaryService};
use tonic::transport::{Certificate, ClientTlsConfig};
use tonic::{Request, Response, Status};

pub const SAY_HELLO: &str = "/helloworld.Greeter/SayHello";
pub const FLAKY_CALL: &str = "/test.Flaky/Call";
pub const FLAKY_STREAM: &str = "/test.Flaky/Stream";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
    pub trace_parent: Option<String>,
    pub client_id: Option<String>,
}

/// JSON 编解码
pub struct JsonCodec<E, D>(PhantomData<(E, D)>);

impl<E, D> Default for JsonCodec<E, D> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<E, D> Clone for JsonCodec<E, D> {
    fn clone(&self) -> Self {
        Self(PhantomData)
    }
}

pub struct JsonEncoder<E>(PhantomData<E>);
pub struct JsonDecoder<D>(PhantomData<D>);

impl<E, D> Codec for JsonCodec<E, D>
where
    E: Serialize + Send + 'static,
    D: DeserializeOwned + Send + 'static,
{
    type Encode = E;
    type Decode = D;
    type Encoder = JsonEncoder<E>;
    type Decoder = JsonDecoder<D>;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(PhantomData)
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(PhantomData)
    }
}

impl<E: Serialize> Encoder for JsonEncoder<E> {
    type Item = E;
    type Error = Status;

    fn encode(&mut self, item: E, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        let bytes = serde_json::to_vec(&item).map_err(|e| Status::internal(e.to_string()))?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

impl<D: DeserializeOwned> Decoder for JsonDecoder<D> {
    type Item = D;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<D>, Status> {
        let bytes = src.copy_to_bytes(src.remaining());
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Status::invalid_argument(e.to_string()))
    }
}

fn unimplemented_response() -> http::Response<TonicBody> {
    Status::unimplemented("").into_http()
}

/// Greeter 服务：回显名字，并带回服务端看到的 traceparent 和客户端标识
#[derive(Clone, Default)]
pub struct GreeterServer;

impl NamedService for GreeterServer {
    const NAME: &'static str = "helloworld.Greeter";
}

struct SayHelloSvc;

impl UnaryService<HelloRequest> for SayHelloSvc {
    type Response = HelloReply;
    type Future = BoxFuture<'static, Result<Response<HelloReply>, Status>>;

    fn call(&mut self, request: Request<HelloRequest>) -> Self::Future {
        Box::pin(async move {
            let trace_parent = extract_trace_parent(&request);
            let client_id = extract_client_id(&request);
            let name = request.into_inner().name;
            if name.is_empty() {
                return Err(Status::invalid_argument("name is required"));
            }
            Ok(Response::new(HelloReply {
                message: format!("Hello {name}"),
                trace_parent,
                client_id,
            }))
        })
    }
}

impl tower::Service<http::Request<TonicBody>> for GreeterServer {
    type Response = http::Response<TonicBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<TonicBody>) -> Self::Future {
        match req.uri().path() {
            SAY_HELLO => Box::pin(async move {
                let mut grpc =
                    tonic::server::Grpc::new(JsonCodec::<HelloReply, HelloRequest>::default());
                Ok(grpc.unary(SayHelloSvc, req).await)
            }),
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

/// Flaky 服务：前 `failures` 次调用（或流建立）返回指定错误，之后成功
///
/// 流式方法建立成功后发送两条消息，然后以 `Unavailable` 中断。
#[derive(Clone)]
pub struct FlakyServer {
    attempts: Arc<AtomicU32>,
    failures: u32,
    code: tonic::Code,
}

impl FlakyServer {
    pub fn new(failures: u32, code: tonic::Code) -> Self {
        Self {
            attempts: Arc::new(AtomicU32::new(0)),
            failures,
            code,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl NamedService for FlakyServer {
    const NAME: &'static str = "test.Flaky";
}

struct FlakyCallSvc(FlakyServer);

impl UnaryService<HelloRequest> for FlakyCallSvc {
    type Response = HelloReply;
    type Future = BoxFuture<'static, Result<Response<HelloReply>, Status>>;

    fn call(&mut self, request: Request<HelloRequest>) -> Self::Future {
        let flaky = self.0.clone();
        Box::pin(async move {
            let attempt = flaky.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= flaky.failures {
                return Err(Status::new(flaky.code, format!("attempt {attempt} failed")));
            }
            let trace_parent = extract_trace_parent(&request);
            Ok(Response::new(HelloReply {
                message: format!("{} after {attempt}", request.into_inner().name),
                trace_parent,
                client_id: None,
            }))
        })
    }
}

struct FlakyStreamSvc(FlakyServer);

impl ServerStreamingService<HelloRequest> for FlakyStreamSvc {
    type Response = HelloReply;
    type ResponseStream = BoxStream<'static, Result<HelloReply, Status>>;
    type Future = BoxFuture<'static, Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<HelloRequest>) -> Self::Future {
        let flaky = self.0.clone();
        Box::pin(async move {
            let attempt = flaky.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= flaky.failures {
                return Err(Status::new(flaky.code, format!("open {attempt} failed")));
            }
            let name = request.into_inner().name;
            let reply = |n: u32| HelloReply {
                message: format!("{name} #{n}"),
                trace_parent: None,
                client_id: None,
            };
            let items = vec![
                Ok(reply(1)),
                Ok(reply(2)),
                Err(Status::unavailable("stream broken")),
            ];
            Ok(Response::new(futures::stream::iter(items).boxed()))
        })
    }
}

impl tower::Service<http::Request<TonicBody>> for FlakyServer {
    type Response = http::Response<TonicBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<TonicBody>) -> Self::Future {
        match req.uri().path() {
            FLAKY_CALL => {
                let svc = FlakyCallSvc(self.clone());
                Box::pin(async move {
                    let mut grpc =
                        tonic::server::Grpc::new(JsonCodec::<HelloReply, HelloRequest>::default());
                    Ok(grpc.unary(svc, req).await)
                })
            }
            FLAKY_STREAM => {
                let svc = FlakyStreamSvc(self.clone());
                Box::pin(async move {
                    let mut grpc =
                        tonic::server::Grpc::new(JsonCodec::<HelloReply, HelloRequest>::default());
                    Ok(grpc.server_streaming(svc, req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

/// 以 gRPC 方式调用 `path`，形状与生成的客户端一致
pub async fn unary_call<T>(
    channel: T,
    path: &'static str,
    request: Request<HelloRequest>,
) -> Result<Response<HelloReply>, Status>
where
    T: GrpcService<TonicBody>,
    T::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T::ResponseBody: http_body::Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as http_body::Body>::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    let mut grpc = tonic::client::Grpc::new(channel)
        .max_decoding_message_size(duplex_kit::MAX_RECV_MSG_SIZE)
        .max_encoding_message_size(duplex_kit::MAX_SEND_MSG_SIZE);
    grpc.ready()
        .await
        .map_err(|e| Status::unknown(format!("service was not ready: {}", e.into())))?;
    let codec = JsonCodec::<HelloRequest, HelloReply>::default();
    let path = http::uri::PathAndQuery::from_static(path);
    grpc.unary(request, path, codec).await
}

pub async fn say_hello<T>(channel: T, name: &str) -> Result<Response<HelloReply>, Status>
where
    T: GrpcService<TonicBody>,
    T::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T::ResponseBody: http_body::Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as http_body::Body>::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    let request = Request::new(HelloRequest {
        name: name.to_string(),
    });
    unary_call(channel, SAY_HELLO, request).await
}

/// `localhost` 的自签名证书
pub struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl TestCert {
    pub fn localhost() -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        }
    }

    pub fn server_config(&self) -> Arc<rustls::ServerConfig> {
        duplex_kit::server_config_from_pem(self.cert_pem.as_bytes(), self.key_pem.as_bytes())
            .unwrap()
    }

    /// 信任该证书、按 `localhost` 校验的客户端配置
    pub fn client_tls(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&self.cert_pem))
            .domain_name("localhost")
    }
}

/// 绑定随机端口
pub async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// 在后台启动服务器并等待就绪
pub async fn spawn_server(server: DuplexServer, listener: TcpListener) -> SocketAddr {
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve_with_listener(listener).await;
    });
    wait_for_server_ready(addr).await.unwrap();
    addr
}

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn http1_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// HTTP/2 prior-knowledge（h2c）客户端
pub fn h2c_client() -> HttpClient {
    Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build_http()
}

/// 发送请求并读完响应体
pub async fn send(
    client: &HttpClient,
    request: http::Request<Full<Bytes>>,
) -> (http::response::Parts, Bytes) {
    let response = client.request(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts, body)
}

pub async fn get(client: &HttpClient, url: &str) -> (http::StatusCode, String) {
    let request = http::Request::get(url)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (parts, body) = send(client, request).await;
    (parts.status, String::from_utf8_lossy(&body).into_owned())
}
