//! 전송 통계

use std::time::{Duration, Instant};

/// 송신 통계 (파일 1개 전송 단위)
#[derive(Debug, Clone)]
pub struct SendStats {
    /// 총 송신 데이터그램 수 (재전송, 추가 종료 마커 포함)
    pub datagrams_sent: u64,

    /// 재전송 횟수
    pub retransmissions: u64,

    /// ACK 대기 중 무시한 데이터그램 수 (불일치 ACK, 비 ACK)
    pub ignored_datagrams: u64,

    /// 확인 완료된 데이터 청크 수
    pub chunks_acked: u64,

    /// 확인 완료된 페이로드 바이트
    pub bytes_acked: u64,

    /// 시작 시간
    pub started_at: Instant,

    /// 완료 시간
    pub completed_at: Option<Instant>,
}

impl SendStats {
    pub fn new() -> Self {
        Self {
            datagrams_sent: 0,
            retransmissions: 0,
            ignored_datagrams: 0,
            chunks_acked: 0,
            bytes_acked: 0,
            started_at: Instant::now(),
            completed_at: None,
        }
    }

    /// 완료 기록
    pub fn finish(&mut self) {
        self.completed_at = Some(Instant::now());
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.completed_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }

    /// 처리율 (MB/s)
    pub fn throughput_mbps(&self) -> f64 {
        throughput(self.bytes_acked, self.elapsed())
    }

    /// 재전송 비율 (0.0 ~ 1.0)
    pub fn retransmission_ratio(&self) -> f64 {
        if self.datagrams_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.datagrams_sent as f64
    }
}

impl Default for SendStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신 통계 (전송 1회 단위)
#[derive(Debug, Clone)]
pub struct ReceiveStats {
    /// 기록된 청크 수 (= 최종 기대 시퀀스)
    pub chunks_written: u64,

    /// 기록된 바이트
    pub bytes_written: u64,

    /// 이미 기록된 시퀀스의 중복 수신
    pub duplicates: u64,

    /// 순서가 앞서 도착해 버퍼에 들어간 청크 수
    pub buffered: u64,

    /// 재정렬 버퍼 최대 크기
    pub peak_buffered: usize,

    /// 무시한 데이터그램 (헤더만 있는 청크)
    pub ignored_datagrams: u64,

    /// 종료 시점에 공백 뒤에 남아 버려진 청크 수
    pub discarded_at_close: usize,

    pub started_at: Instant,
}

impl ReceiveStats {
    pub fn new() -> Self {
        Self {
            chunks_written: 0,
            bytes_written: 0,
            duplicates: 0,
            buffered: 0,
            peak_buffered: 0,
            ignored_datagrams: 0,
            discarded_at_close: 0,
            started_at: Instant::now(),
        }
    }

    /// 청크 기록
    pub fn record_write(&mut self, size: usize) {
        self.chunks_written += 1;
        self.bytes_written += size as u64;
    }

    /// 버퍼링 기록
    pub fn record_buffered(&mut self, buffer_len: usize) {
        self.buffered += 1;
        self.peak_buffered = self.peak_buffered.max(buffer_len);
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 처리율 (MB/s)
    pub fn throughput_mbps(&self) -> f64 {
        throughput(self.bytes_written, self.elapsed())
    }
}

impl Default for ReceiveStats {
    fn default() -> Self {
        Self::new()
    }
}

fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / secs / 1_000_000.0
}
