//! 수신측 재조립 상태
//!
//! 전송 1회 동안의 기대 시퀀스 커서, 재정렬 버퍼, 출력 writer를 묶는다.
//! `IDLE → RECEIVING` 전이에서 생성되고 종료 마커 처리 시 [`Reassembly::finish`]로 닫힌다.
//! 네트워크 없이 `Vec<u8>` writer로 단위 테스트할 수 있다.
//!
//! writer는 나중에 붙일 수 있다 ([`Reassembly::deferred`]). 커서가 첫 청크를
//! 기록하기 전까지는 메모리 버퍼만 쓰므로, 이미 닫힌 전송의 늦은 중복 청크가
//! 완료된 출력 파일을 건드리지 않는다.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::chunk::{Chunk, SeqNum};
use crate::stats::ReceiveStats;
use crate::{Error, Result};

/// 청크 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 즉시 기록됨, 이어서 버퍼에서 `flushed`개가 함께 기록됨
    Written { flushed: usize },

    /// 커서보다 앞선 청크, 버퍼에 보관
    Buffered,

    /// 이미 기록된 시퀀스
    Duplicate,
}

/// 전송 1회의 재조립 상태
#[derive(Debug)]
pub struct Reassembly<W> {
    /// 첫 기록 전까지 비어 있을 수 있음
    writer: Option<W>,

    /// 이 전송을 연 송신자 주소
    peer: SocketAddr,

    /// 다음으로 기록할 시퀀스 (= 지금까지 기록한 청크 수)
    expected: SeqNum,

    /// 커서보다 앞서 도착한 청크
    pending: BTreeMap<SeqNum, Bytes>,

    stats: ReceiveStats,
}

impl<W: AsyncWrite + Unpin> Reassembly<W> {
    pub fn new(writer: W, peer: SocketAddr) -> Self {
        Self {
            writer: Some(writer),
            ..Self::deferred(peer)
        }
    }

    /// writer 없이 시작 (앞선 청크는 버퍼에만 보관)
    pub fn deferred(peer: SocketAddr) -> Self {
        Self {
            writer: None,
            peer,
            expected: 0,
            pending: BTreeMap::new(),
            stats: ReceiveStats::new(),
        }
    }

    /// 이 청크를 받기 전에 writer를 붙여야 하는지
    ///
    /// 커서 위치 청크가 왔는데 아직 writer가 없을 때만 `true`.
    pub fn needs_writer(&self, seq: SeqNum) -> bool {
        self.writer.is_none() && seq == self.expected
    }

    pub fn attach(&mut self, writer: W) {
        self.writer = Some(writer);
    }

    pub fn is_attached(&self) -> bool {
        self.writer.is_some()
    }

    pub fn expected_seq(&self) -> SeqNum {
        self.expected
    }

    /// 재정렬 버퍼에 보관 중인 청크 수
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }

    /// 무시한 데이터그램 기록
    pub fn note_ignored(&mut self) {
        self.stats.ignored_datagrams += 1;
    }

    /// 페이로드가 있는 데이터 청크 처리
    pub async fn accept(&mut self, chunk: Chunk) -> Result<Placement> {
        if chunk.seq == self.expected {
            self.write(chunk.data).await?;
            let flushed = self.drain_contiguous().await?;
            if flushed > 0 {
                debug!("seq {} filled gap, flushed {} buffered", chunk.seq, flushed);
            }
            Ok(Placement::Written { flushed })
        } else if chunk.seq > self.expected {
            // 같은 키 재전송은 동일 바이트로 덮어쓰기
            self.pending.insert(chunk.seq, chunk.data);
            self.stats.record_buffered(self.pending.len());
            Ok(Placement::Buffered)
        } else {
            self.stats.duplicates += 1;
            Ok(Placement::Duplicate)
        }
    }

    /// 종료 마커 처리: 이어지는 버퍼분만 기록하고 writer를 닫는다
    ///
    /// 공백 뒤에 남은 청크는 기록하지 않고 버린다.
    /// writer가 한 번도 붙지 않았으면 (seq 0 미도착) `None`.
    pub async fn finish(mut self) -> Result<(Option<W>, ReceiveStats)> {
        if self.writer.is_none() {
            self.stats.discarded_at_close = self.pending.len();
            return Ok((None, self.stats));
        }

        self.drain_contiguous().await?;

        if !self.pending.is_empty() {
            warn!(
                "Discarding {} buffered chunks beyond gap at seq {}",
                self.pending.len(),
                self.expected
            );
        }
        self.stats.discarded_at_close = self.pending.len();
        self.pending.clear();

        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await?;
        }
        Ok((self.writer, self.stats))
    }

    async fn drain_contiguous(&mut self) -> Result<usize> {
        let mut flushed = 0;
        while let Some(data) = self.pending.remove(&self.expected) {
            self.write(data).await?;
            flushed += 1;
        }
        Ok(flushed)
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "no writer attached at reassembly cursor",
            ))
        })?;
        writer.write_all(&data).await?;
        self.stats.record_write(data.len());
        self.expected += 1;
        Ok(())
    }
}
