use std::{
    io,
    net::SocketAddr,
};

use tokio::net::{
    TcpListener,
    TcpStream,
};

use crate::Endpoint;

#[async_trait::async_trait]
pub trait StreamOps: Sized {
    async fn connect(endpoint: &Endpoint) -> io::Result<Self>;
    fn peer(&self) -> Option<SocketAddr>;
}

#[async_trait::async_trait]
pub trait ListenerOps: Sized {
    type Stream;

    async fn bind(endpoint: &Endpoint) -> io::Result<Self>;
    async fn accept_stream(&self) -> io::Result<(Self::Stream, SocketAddr)>;
    fn local(&self) -> Option<SocketAddr>;
}

#[async_trait::async_trait]
impl StreamOps for TcpStream {
    #[tracing::instrument(err, fields(endpoint = %endpoint))]
    async fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        stream.set_nodelay(true)?;

        Ok(stream)
    }

    #[inline]
    fn peer(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

#[async_trait::async_trait]
impl ListenerOps for TcpListener {
    type Stream = TcpStream;

    #[tracing::instrument(err, fields(endpoint = %endpoint))]
    async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        TcpListener::bind((endpoint.host.as_str(), endpoint.port)).await
    }

    #[tracing::instrument(err, skip(self), fields(local = ?self.local()))]
    async fn accept_stream(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, addr) = self.accept().await?;
        stream.set_nodelay(true)?;

        Ok((stream, addr))
    }

    #[inline]
    fn local(&self) -> Option<SocketAddr> {
        self.local_addr().ok()
    }
}
