//! 송신자
//!
//! - 입력을 고정 크기 청크로 분할, 0부터 시퀀스 부여
//! - Stop-and-Wait: 청크마다 ACK를 받을 때까지 재전송 (재시도 상한)
//! - 종료 마커 핸드쉐이크 후 추가 종료 마커 중복 송신

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::chunk::{Chunk, ChunkReader, SeqNum};
use crate::message::Ack;
use crate::stats::SendStats;
use crate::transport::Transport;
use crate::{Config, Error, Result, END_MARKER};

/// ACK 대기 1회의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckWait {
    /// 기대한 시퀀스의 ACK 수신
    Matched,

    /// 다른 시퀀스 ACK 또는 ACK가 아닌 데이터그램 (같은 시도 안에서 계속 대기)
    Ignored,

    /// 시도 시간 초과 (재전송 대상)
    TimedOut,
}

/// 송신자
pub struct Sender<T> {
    /// 설정
    config: Config,

    /// 전송 계층
    transport: T,

    /// 수신자 주소
    target: SocketAddr,

    /// 전송 통계
    stats: SendStats,

    /// ACK 수신 버퍼
    recv_buf: Vec<u8>,
}

impl<T: Transport> Sender<T> {
    /// 새 송신자 생성
    pub fn new(config: Config, transport: T, target: SocketAddr) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            recv_buf: vec![0u8; config.recv_buffer_size],
            config,
            transport,
            target,
            stats: SendStats::new(),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 마지막 (또는 진행 중인) 전송의 통계
    pub fn stats(&self) -> &SendStats {
        &self.stats
    }

    /// 파일 전송
    ///
    /// 파일이 없으면 아무것도 송신하지 않고 [`Error::InputNotFound`].
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<SendStats> {
        let path = path.as_ref();

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::InputNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        info!("Sending file {:?} to {}", path, self.target);
        self.send_stream(file).await
    }

    /// 임의 스트림 전송 (입력 끝까지 청크 단위)
    pub async fn send_stream<R: AsyncRead + Unpin>(&mut self, reader: R) -> Result<SendStats> {
        self.stats = SendStats::new();
        let mut chunks = ChunkReader::new(reader, self.config.chunk_size);

        while let Some(chunk) = chunks.next_chunk().await? {
            let datagram = chunk.to_bytes();
            self.send_reliable(&datagram, chunk.seq).await?;

            self.stats.chunks_acked += 1;
            self.stats.bytes_acked += chunk.data.len() as u64;
            debug!("Chunk {} acknowledged ({} bytes)", chunk.seq, chunk.data.len());
        }

        // 종료 마커도 같은 송신/ACK 루프
        let marker = Chunk::end_marker().to_bytes();
        self.send_reliable(&marker, END_MARKER).await?;
        info!("End-marker acknowledged after {} chunks", chunks.next_seq());

        self.send_trailing_end_markers().await;
        self.stats.finish();

        info!(
            "File transmission complete: {} bytes, {} chunks, {} retransmissions, {:.2}s ({:.2} MB/s)",
            self.stats.bytes_acked,
            self.stats.chunks_acked,
            self.stats.retransmissions,
            self.stats.elapsed().as_secs_f64(),
            self.stats.throughput_mbps()
        );

        Ok(self.stats.clone())
    }

    /// 데이터그램 1개를 ACK 받을 때까지 송신
    ///
    /// 타임아웃으로 끝난 시도마다 재시도 1회. `max_retries`에 도달하면 실패.
    async fn send_reliable(&mut self, datagram: &[u8], seq: SeqNum) -> Result<()> {
        let mut retries = 0u32;

        loop {
            self.transport
                .send_to(datagram, self.target)
                .await
                .map_err(Error::Transport)?;
            self.stats.datagrams_sent += 1;
            if retries > 0 {
                self.stats.retransmissions += 1;
            }

            // 불일치 ACK는 마감 시간을 연장하지 않는다
            let deadline = Instant::now() + self.config.ack_timeout();
            loop {
                match self.await_ack(seq, deadline).await? {
                    AckWait::Matched => return Ok(()),
                    AckWait::Ignored => self.stats.ignored_datagrams += 1,
                    AckWait::TimedOut => break,
                }
            }

            retries += 1;
            if retries >= self.config.max_retries {
                warn!("Too many retries waiting for ACK {}", seq);
                return Err(Error::RetriesExhausted { seq, retries });
            }

            debug!("ACK {} timed out, retransmitting (retry {})", seq, retries);
        }
    }

    /// 마감 시간까지 데이터그램 1개 대기
    pub async fn await_ack(&mut self, seq: SeqNum, deadline: Instant) -> Result<AckWait> {
        let received = timeout_at(deadline, self.transport.recv_from(&mut self.recv_buf)).await;

        match received {
            Err(_) => Ok(AckWait::TimedOut),
            Ok(Ok((len, _from))) => match Ack::from_bytes(&self.recv_buf[..len]) {
                Some(ack) if ack.seq == seq => Ok(AckWait::Matched),
                Some(ack) => {
                    debug!("Ignoring ACK {} while waiting for {}", ack.seq, seq);
                    Ok(AckWait::Ignored)
                }
                None => Ok(AckWait::Ignored),
            },
            // 상대가 아직 리슨하지 않을 때 일부 OS가 돌려주는 ICMP 오류
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                ) =>
            {
                debug!("Transient receive error: {}", e);
                Ok(AckWait::Ignored)
            }
            Ok(Err(e)) => Err(Error::Transport(e)),
        }
    }

    /// 핸드쉐이크 후 추가 종료 마커 (결과와 무관)
    async fn send_trailing_end_markers(&mut self) {
        let marker = Chunk::end_marker().to_bytes();

        for _ in 0..self.config.trailing_end_markers {
            match self.transport.send_to(&marker, self.target).await {
                Ok(_) => self.stats.datagrams_sent += 1,
                Err(e) => debug!("Trailing end-marker send failed: {}", e),
            }
            sleep(self.config.trailing_end_marker_interval()).await;
        }
    }
}
