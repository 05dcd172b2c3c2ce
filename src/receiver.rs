//! 수신자
//!
//! - 모든 데이터그램에 ACK 중복 송신 (ACK 손실 보정)
//! - 순서대로 온 청크는 즉시 기록, 앞선 청크는 재정렬 버퍼에 보관
//! - 종료 마커 수신 시 버퍼 정리 후 파일 닫고 다음 전송 대기
//! - 출력 파일은 seq 0을 기록할 때 생성 (그 전에는 메모리 버퍼만 사용)
//!
//! 전송 상태: `IDLE → RECEIVING → CLOSED(→ IDLE)`.
//! 닫힌 뒤 늦게 도착한 중복 청크(seq > 0)는 새 전송을 열지만 파일은 만들지 않고,
//! 다음 종료 마커에서 기록 없이 버려진다.
//! 송신자별 세션 구분은 없다. 전송 도중 다른 송신자의 청크도 같은 전송으로 취급한다.

use std::io::ErrorKind;
use std::mem;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::BufWriter;
use tracing::{debug, error, info, warn};

use crate::chunk::{Chunk, SeqNum};
use crate::message::{Ack, Datagram};
use crate::reassembly::{Placement, Reassembly};
use crate::stats::ReceiveStats;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 출력 파일명 결정
///
/// 출력 경로가 주어지면 그대로, 아니면 송신자 주소로 이름을 만든다.
/// 예: `received_10_0_0_5_51234.bin`
pub fn output_path_for(base: Option<&Path>, peer: SocketAddr, config: &Config) -> PathBuf {
    if let Some(base) = base {
        return base.to_path_buf();
    }

    let host = peer
        .ip()
        .to_string()
        .replace(|c: char| c == '.' || c == ':', "_");

    PathBuf::from(format!(
        "{}_{}_{}.{}",
        config.fallback_prefix,
        host,
        peer.port(),
        config.fallback_extension
    ))
}

/// 데이터그램 1개 처리 결과
#[derive(Debug)]
pub enum Progress {
    /// 무시 (짧은 데이터그램, 헤더만 있는 청크, 열린 전송 없는 종료 마커)
    Ignored,

    /// 진행 중인 전송에 반영
    Accepted(Placement),

    /// 종료 마커로 전송 완료
    Closed(TransferSummary),
}

/// 완료된 전송 요약
#[derive(Debug)]
pub struct TransferSummary {
    pub path: PathBuf,
    pub peer: SocketAddr,
    pub stats: ReceiveStats,
}

/// 전송 상태
enum State {
    Idle,
    Receiving {
        path: PathBuf,
        reassembly: Reassembly<BufWriter<File>>,
    },
}

/// 수신자
pub struct Receiver<T> {
    /// 설정
    config: Config,

    /// 전송 계층
    transport: T,

    /// 지정 출력 경로 (없으면 송신자 주소 기반)
    output: Option<PathBuf>,

    state: State,

    /// 완료된 전송 수
    completed: u64,

    recv_buf: Vec<u8>,
}

impl<T: Transport> Receiver<T> {
    /// 새 수신자 생성
    pub fn new(config: Config, transport: T, output: Option<PathBuf>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            recv_buf: vec![0u8; config.recv_buffer_size],
            config,
            transport,
            output,
            state: State::Idle,
            completed: 0,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 파일이 열린 전송이 있는지
    pub fn is_receiving(&self) -> bool {
        matches!(self.state, State::Receiving { .. })
    }

    /// 진행 중인 전송의 기대 시퀀스
    pub fn expected_seq(&self) -> Option<SeqNum> {
        match &self.state {
            State::Idle => None,
            State::Receiving { reassembly, .. } => Some(reassembly.expected_seq()),
        }
    }

    /// 완료된 전송 수
    pub fn completed_transfers(&self) -> u64 {
        self.completed
    }

    /// 외부 중단까지 전송을 계속 받는다
    ///
    /// 파일 오류는 현재 전송만 버리고 계속, 소켓 오류는 반환한다.
    pub async fn run(&mut self) -> Result<()> {
        match self.transport.local_addr() {
            Ok(addr) => info!("Receiver listening on {}", addr),
            Err(_) => info!("Receiver listening"),
        }

        loop {
            match self.receive_transfer().await {
                Ok(summary) => {
                    debug!("Transfer from {} stored at {:?}", summary.peer, summary.path);
                }
                Err(e) if e.is_transport() => {
                    error!("Receiver socket failure: {}", e);
                    self.abort_transfer();
                    return Err(e);
                }
                Err(e) => {
                    error!("Transfer failed: {}", e);
                    self.abort_transfer();
                }
            }
        }
    }

    /// 전송 1회를 종료 마커까지 받는다
    pub async fn receive_transfer(&mut self) -> Result<TransferSummary> {
        loop {
            let (len, from) = match self.transport.recv_from(&mut self.recv_buf).await {
                Ok(received) => received,
                // 이미 떠난 송신자에게 보낸 ACK의 ICMP 오류
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    debug!("Ignoring connection reset: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Transport(e)),
            };

            let datagram = Bytes::copy_from_slice(&self.recv_buf[..len]);
            if let Progress::Closed(summary) = self.handle_datagram(&datagram, from).await? {
                return Ok(summary);
            }
        }
    }

    /// 데이터그램 1개 처리
    pub async fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Result<Progress> {
        let Some(parsed) = Datagram::parse(datagram) else {
            debug!("Dropping malformed datagram ({} bytes) from {}", datagram.len(), from);
            return Ok(Progress::Ignored);
        };

        // 이미 반영된 청크라도 ACK (송신자가 멈추지 않도록)
        self.send_acks(parsed.ack_seq(), from).await;

        match parsed {
            Datagram::EndMarker => self.close(from).await,
            Datagram::Data(chunk) => self.accept(chunk, from).await,
            Datagram::Empty(seq) => {
                debug!("Ignoring header-only datagram seq {} from {}", seq, from);
                if let State::Receiving { reassembly, .. } = &mut self.state {
                    reassembly.note_ignored();
                }
                Ok(Progress::Ignored)
            }
        }
    }

    /// 현재 전송 폐기 (버퍼, 커서, 파일 모두)
    pub fn abort_transfer(&mut self) {
        if let State::Receiving { path, reassembly } = mem::replace(&mut self.state, State::Idle) {
            warn!(
                "Aborting transfer into {:?} at seq {} ({} bytes written, {} buffered)",
                path,
                reassembly.expected_seq(),
                reassembly.stats().bytes_written,
                reassembly.buffered_len()
            );
        }
    }

    async fn accept(&mut self, chunk: Chunk, from: SocketAddr) -> Result<Progress> {
        if let State::Idle = self.state {
            self.begin(from);
        }

        // 커서가 처음 기록할 때만 파일 생성
        let opening = match &self.state {
            State::Receiving { path, reassembly } if reassembly.needs_writer(chunk.seq) => {
                Some(path.clone())
            }
            _ => None,
        };
        if let Some(path) = opening {
            let writer = match File::create(&path).await {
                Ok(file) => BufWriter::new(file),
                Err(e) => {
                    self.abort_transfer();
                    return Err(e.into());
                }
            };
            info!("File opened as {:?} from sender {}", path, from);
            if let State::Receiving { reassembly, .. } = &mut self.state {
                reassembly.attach(writer);
            }
        }

        match &mut self.state {
            State::Receiving { reassembly, .. } => {
                let seq = chunk.seq;
                let placement = reassembly.accept(chunk).await?;
                debug!("seq {} from {}: {:?}", seq, from, placement);
                Ok(Progress::Accepted(placement))
            }
            State::Idle => Ok(Progress::Ignored),
        }
    }

    /// 첫 데이터 청크에서 전송 시작 (파일명만 결정)
    fn begin(&mut self, from: SocketAddr) {
        let path = output_path_for(self.output.as_deref(), from, &self.config);

        info!("==== Start of reception ====");
        debug!("Transfer from {} will be stored at {:?}", from, path);

        self.state = State::Receiving {
            path,
            reassembly: Reassembly::deferred(from),
        };
    }

    /// 종료 마커 처리
    async fn close(&mut self, from: SocketAddr) -> Result<Progress> {
        let (path, reassembly) = match mem::replace(&mut self.state, State::Idle) {
            State::Receiving { path, reassembly } => (path, reassembly),
            State::Idle => {
                debug!("End-marker from {} with no open transfer", from);
                return Ok(Progress::Ignored);
            }
        };

        info!("Reliable EOF received from {}. Flushing buffer and closing.", from);

        let peer = reassembly.peer();
        let (writer, stats) = reassembly.finish().await?;
        if writer.is_none() {
            // seq 0 없이 닫힘: 늦은 중복 청크뿐이었음
            warn!(
                "==== End of reception ==== nothing written to {:?} ({} stray chunks discarded)",
                path, stats.discarded_at_close
            );
            return Ok(Progress::Ignored);
        }
        drop(writer);

        self.completed += 1;
        info!(
            "==== End of reception ==== {:?}: {} bytes, {} chunks, {} duplicates, {} reordered, {:.2}s ({:.2} MB/s)",
            path,
            stats.bytes_written,
            stats.chunks_written,
            stats.duplicates,
            stats.buffered,
            stats.elapsed().as_secs_f64(),
            stats.throughput_mbps()
        );

        Ok(Progress::Closed(TransferSummary { path, peer, stats }))
    }

    async fn send_acks(&self, seq: SeqNum, to: SocketAddr) {
        let ack = Ack::new(seq).to_bytes();

        for _ in 0..self.config.ack_repeat {
            if let Err(e) = self.transport.send_to(&ack, to).await {
                warn!("ACK 전송 실패: seq={}, {}", seq, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{LinkSimulator, SimulatedEndpoint};

    fn addrs() -> (SocketAddr, SocketAddr) {
        (
            "10.1.1.1:12001".parse().unwrap(),
            "10.1.1.2:40123".parse().unwrap(),
        )
    }

    fn data(seq: SeqNum, payload: &[u8]) -> Vec<u8> {
        Chunk::new(seq, Bytes::copy_from_slice(payload)).to_bytes().to_vec()
    }

    fn end() -> Vec<u8> {
        Chunk::end_marker().to_bytes().to_vec()
    }

    fn setup(output: &Path) -> (Receiver<SimulatedEndpoint>, SimulatedEndpoint, SocketAddr) {
        let (local, remote) = addrs();
        let (link, peer) = LinkSimulator::new().connect(local, remote);
        let receiver = Receiver::new(Config::default(), link, Some(output.to_path_buf())).unwrap();
        (receiver, peer, remote)
    }

    #[test]
    fn test_output_path_explicit() {
        let config = Config::default();
        let peer = "10.0.0.5:51234".parse().unwrap();
        let path = output_path_for(Some(Path::new("out.jpg")), peer, &config);
        assert_eq!(path, PathBuf::from("out.jpg"));
    }

    #[test]
    fn test_output_path_fallback_from_address() {
        let config = Config::default();

        let v4 = output_path_for(None, "10.0.0.5:51234".parse().unwrap(), &config);
        assert_eq!(v4, PathBuf::from("received_10_0_0_5_51234.bin"));

        let v6 = output_path_for(None, "[::1]:9000".parse().unwrap(), &config);
        assert_eq!(v6, PathBuf::from("received___1_9000.bin"));
    }

    #[tokio::test]
    async fn test_out_of_order_then_end_marker() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        receiver.handle_datagram(&data(0, b"AAA"), from).await.unwrap();
        let progress = receiver.handle_datagram(&data(2, b"CCC"), from).await.unwrap();
        assert!(matches!(progress, Progress::Accepted(Placement::Buffered)));
        let progress = receiver.handle_datagram(&data(1, b"BBB"), from).await.unwrap();
        assert!(matches!(
            progress,
            Progress::Accepted(Placement::Written { flushed: 1 })
        ));
        assert_eq!(receiver.expected_seq(), Some(3));

        match receiver.handle_datagram(&end(), from).await.unwrap() {
            Progress::Closed(summary) => {
                assert_eq!(summary.path, output);
                assert_eq!(summary.peer, from);
                assert_eq!(summary.stats.chunks_written, 3);
            }
            other => panic!("expected close, got {:?}", other),
        }

        assert_eq!(std::fs::read(&output).unwrap(), b"AAABBBCCC");
        assert!(!receiver.is_receiving());
        assert_eq!(receiver.expected_seq(), None);
        assert_eq!(receiver.completed_transfers(), 1);
    }

    #[tokio::test]
    async fn test_every_datagram_acked_redundantly() {
        let dir = tempfile::tempdir().unwrap();
        let (mut receiver, peer, from) = setup(&dir.path().join("out.bin"));

        receiver.handle_datagram(&data(0, b"x"), from).await.unwrap();
        receiver.handle_datagram(&data(0, b"x"), from).await.unwrap();

        let progress = receiver.handle_datagram(&data(0, b"x"), from).await.unwrap();
        assert!(matches!(progress, Progress::Accepted(Placement::Duplicate)));
        assert_eq!(receiver.transport().sent_count(), 9);

        let mut buf = [0u8; 16];
        for _ in 0..9 {
            let (len, _) = peer.recv_from(&mut buf).await.unwrap();
            assert_eq!(Ack::from_bytes(&buf[..len]), Some(Ack::new(0)));
        }
    }

    #[tokio::test]
    async fn test_short_datagram_not_acked() {
        let dir = tempfile::tempdir().unwrap();
        let (mut receiver, _peer, from) = setup(&dir.path().join("out.bin"));

        let progress = receiver.handle_datagram(&[0, 1], from).await.unwrap();
        assert!(matches!(progress, Progress::Ignored));
        assert_eq!(receiver.transport().sent_count(), 0);
        assert!(!receiver.is_receiving());
    }

    #[tokio::test]
    async fn test_header_only_chunk_acked_but_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        let progress = receiver.handle_datagram(&[0, 0, 0, 0], from).await.unwrap();
        assert!(matches!(progress, Progress::Ignored));
        assert_eq!(receiver.transport().sent_count(), 3);
        assert!(!receiver.is_receiving());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_end_marker_without_data_opens_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        let progress = receiver.handle_datagram(&end(), from).await.unwrap();
        assert!(matches!(progress, Progress::Ignored));
        assert_eq!(receiver.transport().sent_count(), 3);
        assert!(!output.exists());
        assert_eq!(receiver.completed_transfers(), 0);
    }

    #[tokio::test]
    async fn test_repeated_end_markers_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        receiver.handle_datagram(&data(0, b"payload"), from).await.unwrap();
        receiver.handle_datagram(&end(), from).await.unwrap();

        for _ in 0..10 {
            let progress = receiver.handle_datagram(&end(), from).await.unwrap();
            assert!(matches!(progress, Progress::Ignored));
        }

        assert_eq!(std::fs::read(&output).unwrap(), b"payload");
        assert_eq!(receiver.completed_transfers(), 1);
        assert!(!receiver.is_receiving());
    }

    #[tokio::test]
    async fn test_sequential_transfers_reset_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        receiver.handle_datagram(&data(0, b"first-"), from).await.unwrap();
        receiver.handle_datagram(&data(1, b"transfer"), from).await.unwrap();
        receiver.handle_datagram(&end(), from).await.unwrap();

        // 새 전송은 커서 0부터
        let progress = receiver.handle_datagram(&data(0, b"second"), from).await.unwrap();
        assert!(matches!(
            progress,
            Progress::Accepted(Placement::Written { flushed: 0 })
        ));
        assert_eq!(receiver.expected_seq(), Some(1));
        receiver.handle_datagram(&end(), from).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"second");
        assert_eq!(receiver.completed_transfers(), 2);
    }

    #[tokio::test]
    async fn test_abort_discards_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut receiver, _peer, from) = setup(&dir.path().join("out.bin"));

        receiver.handle_datagram(&data(0, b"a"), from).await.unwrap();
        receiver.handle_datagram(&data(5, b"f"), from).await.unwrap();
        assert_eq!(receiver.expected_seq(), Some(1));

        receiver.abort_transfer();
        assert!(!receiver.is_receiving());

        // 다음 데이터 청크로 새 전송 시작
        receiver.handle_datagram(&data(0, b"z"), from).await.unwrap();
        assert_eq!(receiver.expected_seq(), Some(1));
    }

    #[tokio::test]
    async fn test_receive_transfer_from_link() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, peer, _) = setup(&output);
        let target = peer.peer_addr();

        peer.send_to(&[9], target).await.unwrap();
        peer.send_to(&data(1, b"world"), target).await.unwrap();
        peer.send_to(&data(0, b"hello "), target).await.unwrap();
        peer.send_to(&end(), target).await.unwrap();

        let summary = receiver.receive_transfer().await.unwrap();
        assert_eq!(summary.stats.chunks_written, 2);
        assert_eq!(summary.stats.buffered, 1);
        assert_eq!(std::fs::read(&output).unwrap(), b"hello world");

        // 짧은 데이터그램에는 ACK 없음, 첫 ACK는 seq 1
        let mut buf = [0u8; 16];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, target);
        assert_eq!(Ack::from_bytes(&buf[..len]), Some(Ack::new(1)));
        assert_eq!(receiver.transport().sent_count(), 9);
    }

    #[tokio::test]
    async fn test_late_duplicate_after_close_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        receiver.handle_datagram(&data(0, b"first-"), from).await.unwrap();
        receiver.handle_datagram(&data(1, b"second"), from).await.unwrap();
        receiver.handle_datagram(&end(), from).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"first-second");

        // 재전송 사본이 종료 마커보다 늦게 도착
        let progress = receiver.handle_datagram(&data(1, b"second"), from).await.unwrap();
        assert!(matches!(progress, Progress::Accepted(Placement::Buffered)));
        assert!(receiver.is_receiving());
        assert_eq!(std::fs::read(&output).unwrap(), b"first-second");

        // 추가 종료 마커가 빈 전송을 닫는다
        let progress = receiver.handle_datagram(&end(), from).await.unwrap();
        assert!(matches!(progress, Progress::Ignored));
        assert!(!receiver.is_receiving());

        assert_eq!(std::fs::read(&output).unwrap(), b"first-second");
        assert_eq!(receiver.completed_transfers(), 1);
    }

    #[tokio::test]
    async fn test_file_created_only_at_seq_zero() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        receiver.handle_datagram(&data(2, b"C"), from).await.unwrap();
        receiver.handle_datagram(&data(1, b"B"), from).await.unwrap();
        assert!(receiver.is_receiving());
        assert!(!output.exists());

        let progress = receiver.handle_datagram(&data(0, b"A"), from).await.unwrap();
        assert!(matches!(
            progress,
            Progress::Accepted(Placement::Written { flushed: 2 })
        ));
        assert!(output.exists());

        receiver.handle_datagram(&end(), from).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"ABC");
    }

    #[tokio::test]
    async fn test_open_failure_deferred_until_seq_zero() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing-dir").join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        // 앞선 청크는 파일 없이 버퍼링
        let progress = receiver.handle_datagram(&data(1, b"b"), from).await.unwrap();
        assert!(matches!(progress, Progress::Accepted(Placement::Buffered)));

        let err = receiver.handle_datagram(&data(0, b"a"), from).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!receiver.is_receiving());
    }

    #[tokio::test]
    async fn test_open_failure_surfaces_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing-dir").join("out.bin");
        let (mut receiver, _peer, from) = setup(&output);

        let err = receiver.handle_datagram(&data(0, b"a"), from).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_transport());
        assert!(!receiver.is_receiving());
    }
}
