//! 전송 계층 인터페이스
//!
//! 신뢰성 있고 순서가 보장되는 바이트 스트림만 가정한다. 혼잡 제어와
//! 재전송은 전송 계층 구현의 몫. 기본 구현은 TCP.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// 들어오는 연결 수락기
#[async_trait]
pub trait Acceptor: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// 연결 하나 수락
    async fn accept(&mut self) -> io::Result<(Self::Conn, SocketAddr)>;

    /// 바인드된 로컬 주소
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// 전송 계층
#[async_trait]
pub trait Transport: Send + Sync {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    type Acceptor: Acceptor<Conn = Self::Conn>;

    /// 주소에 바인드
    async fn listen(&self, addr: &str) -> io::Result<Self::Acceptor>;

    /// 주소로 연결. 연결과 피어 주소 반환
    async fn dial(&self, addr: &str) -> io::Result<(Self::Conn, SocketAddr)>;
}

/// 수락 루프를 계속 돌려도 되는 일시적 에러인지
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// TCP 전송 계층
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

/// TCP 수락기
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        let _ = stream.set_nodelay(true);
        Ok((stream, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Conn = TcpStream;
    type Acceptor = TcpAcceptor;

    async fn listen(&self, addr: &str) -> io::Result<TcpAcceptor> {
        let listener = TcpListener::bind(addr).await?;
        debug!("TCP listener bound on {}", listener.local_addr()?);
        Ok(TcpAcceptor { listener })
    }

    async fn dial(&self, addr: &str) -> io::Result<(TcpStream, SocketAddr)> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        let peer = stream.peer_addr()?;
        Ok((stream, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_dial_and_accept() {
        let transport = TcpTransport;
        let mut acceptor = transport.listen("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let (mut conn, peer) = TcpTransport.dial(&addr.to_string()).await.unwrap();
            assert_eq!(peer, addr);
            conn.write_all(b"ping").await.unwrap();
        });

        let (mut conn, _peer) = acceptor.accept().await.unwrap();
        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"ping");
        client.await.unwrap();
    }

    #[test]
    fn test_transient_errors() {
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert!(is_transient_accept_error(&aborted));

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(!is_transient_accept_error(&denied));
    }
}
