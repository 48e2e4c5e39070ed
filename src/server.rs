//! TCP front end: one accept loop handing each connection off to its own
//! task, and a per-connection loop that reads a frame, dispatches it to
//! the engine, and writes the response frame back.

use std::{net::SocketAddr, sync::Arc};

use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    engine::Engine,
    err_at,
    protocol::{dispatch, read_frame, write_frame},
    Result,
};

/// Bind `engine.config().bind_addr` and serve connections until the
/// process is stopped. Each connection is handled on its own task; a
/// single slow or malformed connection cannot starve the others.
pub async fn serve(engine: Arc<Engine>) -> Result<()> {
    let addr = engine.config().bind_addr.clone();
    let listener = err_at!(IOError, TcpListener::bind(&addr).await)?;
    info!(target: "shardb::server", "listening on {}", listener.local_addr().map(|a| a.to_string()).unwrap_or(addr));
    accept_loop(engine, listener).await
}

/// Bind without serving, returning the listener and its resolved local
/// address — lets callers (tests, embedders picking an ephemeral port)
/// learn the actual bound port before accepting connections.
pub async fn bind(bind_addr: &str) -> Result<(TcpListener, SocketAddr)> {
    let listener = err_at!(IOError, TcpListener::bind(bind_addr).await)?;
    let addr = err_at!(IOError, listener.local_addr())?;
    Ok((listener, addr))
}

pub async fn accept_loop(engine: Arc<Engine>, listener: TcpListener) -> Result<()> {
    loop {
        let (socket, peer) = err_at!(IOError, listener.accept().await)?;
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(engine, socket).await {
                warn!(target: "shardb::server", "connection {} closed: {}", peer, err);
            }
        });
    }
}

async fn handle_connection(engine: Arc<Engine>, mut socket: TcpStream) -> Result<()> {
    let cfg = engine.config().clone();
    loop {
        let frame = match read_frame(&mut socket, &cfg).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => return Err(err),
        };
        if frame.is_empty() {
            continue;
        }

        let response = dispatch(&engine, &frame).await?;
        let body = crate::protocol::encode_value(&response)?;
        write_frame(&mut socket, &body, &cfg).await?;
    }
}

#[cfg(test)]
#[path = "server_test.rs"]
mod server_test;
