//! 결정적 손실 링크 시뮬레이터
//!
//! 실제 네트워크 없이 재전송/재조립 로직을 검증하기 위한 메모리 내 링크.
//! 두 엔드포인트가 [`Transport`]를 구현하며 방향별로 결함을 주입한다.
//!
//! | 결함        | 동작                                          |
//! |-------------|-----------------------------------------------|
//! | `Drop`      | 데이터그램을 조용히 버림                       |
//! | `Duplicate` | 같은 데이터그램을 두 번 전달                   |
//! | `Delay(n)`  | 같은 방향으로 n개가 더 송신된 뒤에 전달 (역전) |
//!
//! 규칙에 해당하지 않는 데이터그램은 시드 고정 난수로 `loss_rate` 확률만큼 버린다.

use std::future;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::trace;

use crate::transport::Transport;

/// 주입할 결함 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Drop,
    Duplicate,
    Delay(usize),
}

/// 결함 적용 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// 이 방향으로 n번째(0부터) 송신된 데이터그램
    Nth(usize),

    /// 내용이 정확히 일치하는 데이터그램, 앞에서부터 `times`개
    Payload { bytes: Bytes, times: usize },
}

#[derive(Debug, Clone)]
struct FaultRule {
    matcher: Match,
    fault: Fault,
}

/// 방향별 결함 설정
#[derive(Debug, Clone, Default)]
struct DirectionConfig {
    rules: Vec<FaultRule>,
    loss_rate: f64,
}

/// 시뮬레이터 빌더
#[derive(Debug, Clone)]
pub struct LinkSimulator {
    forward: DirectionConfig,
    backward: DirectionConfig,
    seed: u64,
}

impl Default for LinkSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkSimulator {
    /// 결함 없는 투명 링크
    pub fn new() -> Self {
        Self {
            forward: DirectionConfig::default(),
            backward: DirectionConfig::default(),
            seed: 0x5357_5000,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// a → b 방향 결함
    pub fn forward_fault(mut self, matcher: Match, fault: Fault) -> Self {
        self.forward.rules.push(FaultRule { matcher, fault });
        self
    }

    /// b → a 방향 결함
    pub fn backward_fault(mut self, matcher: Match, fault: Fault) -> Self {
        self.backward.rules.push(FaultRule { matcher, fault });
        self
    }

    pub fn forward_loss(mut self, loss_rate: f64) -> Self {
        self.forward.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn backward_loss(mut self, loss_rate: f64) -> Self {
        self.backward.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    /// 두 엔드포인트 생성, 각자 상대 주소로 보낸 데이터그램만 전달된다
    pub fn connect(self, a: SocketAddr, b: SocketAddr) -> (SimulatedEndpoint, SimulatedEndpoint) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let endpoint_a = SimulatedEndpoint {
            local: a,
            peer: b,
            outbound: Mutex::new(LinkState::new(self.forward, self.seed)),
            peer_tx: b_tx,
            inbox: tokio::sync::Mutex::new(a_rx),
        };
        let endpoint_b = SimulatedEndpoint {
            local: b,
            peer: a,
            outbound: Mutex::new(LinkState::new(self.backward, self.seed.rotate_left(17))),
            peer_tx: a_tx,
            inbox: tokio::sync::Mutex::new(b_rx),
        };

        (endpoint_a, endpoint_b)
    }
}

/// 보류 중인 (역전 대상) 데이터그램
#[derive(Debug)]
struct Held {
    remaining: usize,
    bytes: Bytes,
}

/// 한 방향 링크 상태
#[derive(Debug)]
struct LinkState {
    rules: Vec<FaultRule>,
    loss_rate: f64,
    rng: StdRng,
    sent: usize,
    delivered: usize,
    dropped: usize,
    held: Vec<Held>,
    log: Vec<Bytes>,
}

impl LinkState {
    fn new(config: DirectionConfig, seed: u64) -> Self {
        Self {
            rules: config.rules,
            loss_rate: config.loss_rate,
            rng: StdRng::seed_from_u64(seed),
            sent: 0,
            delivered: 0,
            dropped: 0,
            held: Vec::new(),
            log: Vec::new(),
        }
    }

    /// 이 데이터그램에 적용할 규칙 소비
    fn take_fault(&mut self, index: usize, bytes: &[u8]) -> Option<Fault> {
        let pos = self.rules.iter().position(|rule| match &rule.matcher {
            Match::Nth(n) => *n == index,
            Match::Payload { bytes: expected, times } => *times > 0 && expected[..] == *bytes,
        })?;

        let fault = self.rules[pos].fault;
        let exhausted = match &mut self.rules[pos].matcher {
            Match::Payload { times, .. } => {
                *times -= 1;
                *times == 0
            }
            Match::Nth(_) => true,
        };
        if exhausted {
            self.rules.remove(pos);
        }
        Some(fault)
    }

    /// 송신 1건 처리 후 실제로 전달할 데이터그램 목록
    fn route(&mut self, bytes: Bytes) -> Vec<Bytes> {
        let index = self.sent;
        self.sent += 1;
        self.log.push(bytes.clone());

        let mut deliveries = Vec::new();

        // 기존 보류분 카운트다운
        let mut released = Vec::new();
        self.held.retain_mut(|held| {
            if held.remaining <= 1 {
                released.push(held.bytes.clone());
                false
            } else {
                held.remaining -= 1;
                true
            }
        });

        match self.take_fault(index, &bytes) {
            Some(Fault::Drop) => {
                trace!("sim: drop #{}", index);
                self.dropped += 1;
            }
            Some(Fault::Duplicate) => {
                trace!("sim: duplicate #{}", index);
                deliveries.push(bytes.clone());
                deliveries.push(bytes);
            }
            Some(Fault::Delay(0)) => deliveries.push(bytes),
            Some(Fault::Delay(n)) => {
                trace!("sim: hold #{} for {} datagrams", index, n);
                self.held.push(Held {
                    remaining: n,
                    bytes,
                });
            }
            None => {
                if self.loss_rate > 0.0 && self.rng.gen::<f64>() < self.loss_rate {
                    trace!("sim: random loss #{}", index);
                    self.dropped += 1;
                } else {
                    deliveries.push(bytes);
                }
            }
        }

        deliveries.extend(released);
        self.delivered += deliveries.len();
        deliveries
    }
}

/// 시뮬레이션 링크의 한쪽 끝
#[derive(Debug)]
pub struct SimulatedEndpoint {
    local: SocketAddr,
    peer: SocketAddr,
    outbound: Mutex<LinkState>,
    peer_tx: mpsc::UnboundedSender<(Bytes, SocketAddr)>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Bytes, SocketAddr)>>,
}

impl SimulatedEndpoint {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 이 엔드포인트가 송신한 데이터그램 수
    pub fn sent_count(&self) -> usize {
        self.outbound.lock().sent
    }

    /// 상대에게 실제 전달된 데이터그램 수 (중복 포함)
    pub fn delivered_count(&self) -> usize {
        self.outbound.lock().delivered
    }

    /// 링크에서 버려진 데이터그램 수
    pub fn dropped_count(&self) -> usize {
        self.outbound.lock().dropped
    }

    /// 송신한 데이터그램 전체 기록 (송신 순서)
    pub fn sent_log(&self) -> Vec<Bytes> {
        self.outbound.lock().log.clone()
    }
}

impl Transport for SimulatedEndpoint {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let bytes = Bytes::copy_from_slice(buf);

        if target != self.peer {
            // 아무도 듣지 않는 주소: UDP처럼 조용히 사라짐
            let mut link = self.outbound.lock();
            link.sent += 1;
            link.dropped += 1;
            link.log.push(bytes);
            return Ok(buf.len());
        }

        let deliveries = self.outbound.lock().route(bytes);
        for datagram in deliveries {
            // 상대가 이미 사라졌어도 송신은 성공
            let _ = self.peer_tx.send((datagram, self.local));
        }

        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some((datagram, from)) => {
                // 버퍼보다 긴 데이터그램은 잘린다
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok((len, from))
            }
            None => future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (SocketAddr, SocketAddr) {
        (
            "10.0.0.1:5000".parse().unwrap(),
            "10.0.0.2:6000".parse().unwrap(),
        )
    }

    async fn recv(endpoint: &SimulatedEndpoint) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let (len, _) = endpoint.recv_from(&mut buf).await.unwrap();
        buf[..len].to_vec()
    }

    #[tokio::test]
    async fn test_transparent_link() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = LinkSimulator::new().connect(a_addr, b_addr);

        a.send_to(b"one", b_addr).await.unwrap();
        b.send_to(b"two", a_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"one");
        assert_eq!(from, a_addr);
        assert_eq!(recv(&a).await, b"two");
    }

    #[tokio::test]
    async fn test_drop_and_duplicate_rules() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = LinkSimulator::new()
            .forward_fault(Match::Nth(0), Fault::Drop)
            .forward_fault(Match::Nth(1), Fault::Duplicate)
            .connect(a_addr, b_addr);

        a.send_to(b"lost", b_addr).await.unwrap();
        a.send_to(b"twice", b_addr).await.unwrap();
        a.send_to(b"last", b_addr).await.unwrap();

        assert_eq!(recv(&b).await, b"twice");
        assert_eq!(recv(&b).await, b"twice");
        assert_eq!(recv(&b).await, b"last");
        assert_eq!(a.sent_count(), 3);
        assert_eq!(a.dropped_count(), 1);
        assert_eq!(a.delivered_count(), 3);
    }

    #[tokio::test]
    async fn test_delay_reorders() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = LinkSimulator::new()
            .forward_fault(Match::Nth(0), Fault::Delay(2))
            .connect(a_addr, b_addr);

        for msg in [&b"0"[..], b"1", b"2", b"3"] {
            a.send_to(msg, b_addr).await.unwrap();
        }

        assert_eq!(recv(&b).await, b"1");
        assert_eq!(recv(&b).await, b"2");
        assert_eq!(recv(&b).await, b"0");
        assert_eq!(recv(&b).await, b"3");
    }

    #[tokio::test]
    async fn test_payload_rule_counts_down() {
        let (a_addr, b_addr) = addrs();
        let (a, b) = LinkSimulator::new()
            .forward_fault(
                Match::Payload {
                    bytes: Bytes::from_static(b"ack"),
                    times: 2,
                },
                Fault::Drop,
            )
            .connect(a_addr, b_addr);

        for _ in 0..3 {
            a.send_to(b"ack", b_addr).await.unwrap();
        }

        assert_eq!(recv(&b).await, b"ack");
        assert_eq!(a.dropped_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_target_goes_nowhere() {
        let (a_addr, b_addr) = addrs();
        let (a, _b) = LinkSimulator::new().connect(a_addr, b_addr);

        let len = a
            .send_to(b"x", "10.0.0.9:1".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(a.dropped_count(), 1);
        assert_eq!(a.delivered_count(), 0);
    }

    #[tokio::test]
    async fn test_seeded_loss_is_reproducible() {
        let (a_addr, b_addr) = addrs();
        let run = |seed| async move {
            let (a, _b) = LinkSimulator::new()
                .seed(seed)
                .forward_loss(0.5)
                .connect(a_addr, b_addr);
            for _ in 0..64 {
                a.send_to(b"x", b_addr).await.unwrap();
            }
            a.dropped_count()
        };

        let first = run(7).await;
        assert_eq!(first, run(7).await);
        assert!(first > 0 && first < 64);
    }
}
