//! TCP glue: a connection listener and a connect helper.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::proxy::Proxy;
use crate::responder::Responder;
use crate::transport::framed::{FramedConfig, FramedStream};

/// Accept connections forever, serving each on its own task.
///
/// A connection failing only ends that connection; the loop itself returns
/// `Err` only when accepting fails.
pub async fn serve(listener: TcpListener, responder: Arc<Responder>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        tracing::info!(%addr, "connection accepted");
        let responder = responder.clone();
        tokio::spawn(async move {
            let mut framed = FramedStream::new(stream, FramedConfig::default());
            match responder.run_connection(&mut framed).await {
                Ok(()) => tracing::info!(%addr, "connection closed"),
                Err(err) => tracing::warn!(%addr, error = %err, "connection failed"),
            }
        });
    }
}

/// Connect to a responder, returning a ready proxy.
pub async fn connect(
    addr: impl ToSocketAddrs,
    protocol: Arc<crate::protocol::Protocol>,
) -> Result<Proxy<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    Ok(Proxy::new(
        protocol,
        FramedStream::new(stream, FramedConfig::default()),
    ))
}
