use std::error::Error;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use micro_h3::client::H3Client;
use micro_h3::config::H3Config;
use micro_h3::connection::H3Connection;
use micro_h3::handler::make_handler;
use micro_h3::protocol::RecvBody;
use micro_h3::transport::memory::MemoryConnection;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let (client, server) = MemoryConnection::pair();

    let cancel = CancellationToken::new();
    let connection = H3Connection::new(Arc::new(server), H3Config::default());
    let server = tokio::spawn(connection.process(Arc::new(make_handler(hello_world)), cancel.clone()));

    let client = match H3Client::connect(Arc::new(client), H3Config::default()).await {
        Ok(client) => client,
        Err(e) => {
            error!(cause = %e, "connect failed");
            return;
        }
    };

    let request = Request::post("https://localhost/greet").body(Full::new(Bytes::from_static(b"micro-h3"))).unwrap();
    match client.send_request(request).await {
        Ok(response) => {
            let status = response.status();
            match response.into_body().collect().await {
                Ok(body) => info!(%status, body = ?body.to_bytes(), "received response"),
                Err(e) => error!(cause = %e, "failed to read response body"),
            }
        }
        Err(e) => error!(cause = %e, "request failed"),
    }

    if let Err(e) = client.close().await {
        error!(cause = %e, "close failed");
    }
    match server.await {
        Ok(Ok(reason)) => info!(?reason, "server connection closed"),
        Ok(Err(e)) => error!(cause = %e, "server connection failed"),
        Err(e) => error!(cause = %e, "server task failed"),
    }
}

async fn hello_world(request: Request<RecvBody>) -> Result<Response<Full<Bytes>>, Box<dyn Error + Send + Sync>> {
    let path = request.uri().path().to_string();
    info!(%path, "request");

    let body = request.into_body().collect().await?.to_bytes();
    let name = std::str::from_utf8(&body)?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(format!("Hello {name}!\r\n"))))?;
    Ok(response)
}
