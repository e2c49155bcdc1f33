//! 전송 통계

use std::time::{Duration, Instant};

use crate::session::{SessionReport, SessionStatus};

/// 세션 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간 (진행 중이면 None)
    pub end_time: Option<Instant>,

    /// 완료된 유닛 수
    pub units_completed: u64,

    /// 실패한 유닛 수
    pub units_failed: u64,

    /// 유닛 내용 바이트 (헤더 제외)
    pub payload_bytes: u64,

    /// 연결로 오간 총 바이트 (헤더, 서브프레임 접두사 포함)
    pub wire_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            units_completed: 0,
            units_failed: 0,
            payload_bytes: 0,
            wire_bytes: 0,
        }
    }

    /// 완료된 유닛 기록
    pub fn record_unit(&mut self, bytes: u64) {
        self.units_completed += 1;
        self.payload_bytes += bytes;
    }

    /// 실패한 유닛 기록 (일부 받은 바이트도 내용 바이트로 셈)
    pub fn record_failure(&mut self, partial_bytes: u64) {
        self.units_failed += 1;
        self.payload_bytes += partial_bytes;
    }

    /// 종료 표시
    pub fn finish(&mut self, wire_bytes: u64) {
        self.wire_bytes = wire_bytes;
        self.end_time = Some(Instant::now());
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 내용 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.payload_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Units: {} ok / {} failed | Payload: {} bytes | Wire: {} bytes | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.units_completed,
            self.units_failed,
            self.payload_bytes,
            self.wire_bytes,
            self.throughput() / 1_000_000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신기 전체 누적 통계
#[derive(Debug, Clone)]
pub struct ReceiverStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 수락한 세션 수
    pub sessions_accepted: u64,

    /// 정상 종료된 세션 수
    pub sessions_completed: u64,

    /// 실패한 세션 수
    pub sessions_failed: u64,

    /// 종료 유예 시간 초과로 중단된 세션 수
    pub sessions_aborted: u64,

    /// 완료된 유닛 수
    pub units_completed: u64,

    /// 실패한 유닛 수
    pub units_failed: u64,

    /// 받은 내용 바이트
    pub payload_bytes: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            sessions_accepted: 0,
            sessions_completed: 0,
            sessions_failed: 0,
            sessions_aborted: 0,
            units_completed: 0,
            units_failed: 0,
            payload_bytes: 0,
        }
    }

    /// 끝난 세션 결과 반영
    pub fn record_session(&mut self, report: &SessionReport) {
        match report.status {
            SessionStatus::Complete => self.sessions_completed += 1,
            SessionStatus::Failed => self.sessions_failed += 1,
        }
        self.units_completed += report.stats.units_completed;
        self.units_failed += report.stats.units_failed;
        self.payload_bytes += report.stats.payload_bytes;
    }

    /// 아직 끝나지 않은 세션 수
    pub fn sessions_active(&self) -> u64 {
        self.sessions_accepted.saturating_sub(
            self.sessions_completed + self.sessions_failed + self.sessions_aborted,
        )
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Uptime: {:.1}s | Sessions: {} accepted, {} ok, {} failed, {} aborted | Units: {} ok / {} failed | Payload: {} bytes",
            self.start_time.elapsed().as_secs_f64(),
            self.sessions_accepted,
            self.sessions_completed,
            self.sessions_failed,
            self.sessions_aborted,
            self.units_completed,
            self.units_failed,
            self.payload_bytes,
        )
    }
}

impl Default for ReceiverStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_accounting() {
        let mut stats = TransferStats::new();
        stats.record_unit(100);
        stats.record_unit(50);
        stats.record_failure(7);
        stats.finish(200);

        assert_eq!(stats.units_completed, 2);
        assert_eq!(stats.units_failed, 1);
        assert_eq!(stats.payload_bytes, 157);
        assert_eq!(stats.wire_bytes, 200);
        assert!(stats.end_time.is_some());
        assert!(stats.summary().contains("2 ok / 1 failed"));
    }

    #[test]
    fn test_active_sessions() {
        let mut stats = ReceiverStats::new();
        stats.sessions_accepted = 5;
        stats.sessions_completed = 2;
        stats.sessions_failed = 1;
        assert_eq!(stats.sessions_active(), 2);
    }
}
