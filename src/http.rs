//! HTTP transport
//!
//! `POST /mcp` takes one JSON-RPC message per request body; notifications are
//! acknowledged with `202 Accepted` and no body. `GET /health` reports the
//! emulated server's status.

use {
    crate::{health::HealthChecker, server::ProtocolServer},
    anyhow::{Context, Result},
    std::{net::SocketAddr, sync::Arc},
    tokio::net::TcpListener,
    tokio_stream::wrappers::TcpListenerStream,
    tracing::info,
    warp::{http::StatusCode, hyper::body::Bytes, reply, Filter, Rejection, Reply},
};

/// Route tree for the HTTP transport
pub fn routes(
    server: Arc<ProtocolServer>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = Arc::new(HealthChecker::default());

    let mcp_route = warp::path!("mcp")
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_server(server.clone()))
        .and_then(handle_mcp_post);

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(with_server(server))
        .map(move |server: Arc<ProtocolServer>| {
            reply::json(&health.get_json_status(server.registry(), server.state()))
        });

    mcp_route.or(health_route)
}

fn with_server(
    server: Arc<ProtocolServer>,
) -> impl Filter<Extract = (Arc<ProtocolServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}

async fn handle_mcp_post(body: Bytes, server: Arc<ProtocolServer>) -> Result<reply::Response, Rejection> {
    Ok(match server.handle_bytes(&body).await {
        Some(response) => reply::with_status(reply::json(&response), StatusCode::OK).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    })
}

/// Bind `127.0.0.1:port` (0 picks a free port) and return the bound address
/// with the serving future.
pub async fn bind_http(
    server: Arc<ProtocolServer>,
    port: u16,
) -> Result<(SocketAddr, impl std::future::Future<Output = ()>)> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind to {addr}"))?;
    let local_addr = listener.local_addr().context("Listener has no local address")?;

    let serve = warp::serve(routes(server)).run_incoming(TcpListenerStream::new(listener));
    Ok((local_addr, serve))
}

/// Serve the HTTP transport until the process is stopped.
pub async fn serve_http(server: Arc<ProtocolServer>, port: u16) -> Result<()> {
    let (addr, serve) = bind_http(server, port).await?;
    info!(%addr, "Serving protocol on http://{addr}/mcp");
    serve.await;
    Ok(())
}
