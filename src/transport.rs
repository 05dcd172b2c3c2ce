//! 데이터그램 전송 계층
//!
//! 프로토콜 로직은 [`Transport`] 트레이트만 본다.
//! 실제 UDP 소켓은 [`UdpTransport`], 테스트용 손실 링크는
//! [`crate::simulator::SimulatedEndpoint`]가 구현한다.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// 비연결형 데이터그램 전송
///
/// 모든 메서드가 `&self`이며 송신은 상대가 없어도 실패하지 않는
/// UDP 의미론을 따른다.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// 데이터그램 1개 송신
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// 데이터그램 1개 수신 (도착할 때까지 대기)
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// 바인딩된 로컬 주소
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// tokio UDP 소켓 기반 전송
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// 소켓 바인딩
    ///
    /// `0.0.0.0:0`이면 OS가 임시 포트를 할당한다.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
