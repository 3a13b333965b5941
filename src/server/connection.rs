// Connection handling module
// Serves one accepted TCP connection on its own tokio task

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::engine::Engine;
use crate::logger;

/// Spawn a task serving HTTP/1.1 requests from `stream` until the peer closes.
///
/// Every request on the connection goes through `Engine::serve_http`. A
/// handler panic unwinds this task only and drops the connection.
pub fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, engine: Arc<Engine>) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<Incoming>| {
            let engine = Arc::clone(&engine);
            async move { engine.serve_http(req, peer_addr).await }
        });

        if let Err(err) = http1::Builder::new()
            .keep_alive(true)
            .serve_connection(io, service)
            .await
        {
            logger::log_connection_error(&err);
        }
    });
}
