//! 세션 핸들러 (수신측 연결 하나)
//!
//! 유닛마다 `AwaitingHeader -> ReadingContent -> (Complete | Failed)` 를 반복한다.
//!
//! - 헤더 시작에서 EOF: 세션 정상 종료
//! - 경로 정책 위반: 아무것도 쓰지 않고 세션 실패
//! - 내용 수신 중 에러/EOF: 임시 파일 삭제 후 세션 실패
//!
//! 세션 에러는 이 세션 안에서 끝나며 수신기나 다른 세션에 영향을 주지 않는다.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::{FrameReader, UnitHeader};
use crate::config::PathPolicy;
use crate::error::ErrorKind;
use crate::resolver;
use crate::staging::StagedFile;
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 세션 종료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Complete,
    Failed,
}

/// 유닛 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Complete,
    Failed(ErrorKind),
}

/// 유닛 하나의 처리 보고
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// 보낸 쪽 주소
    pub peer: Option<SocketAddr>,

    /// 헤더에 선언된 원격 경로
    pub remote_path: String,

    /// 확정된 로컬 경로 (경로 변환 실패 시 None)
    pub destination: Option<PathBuf>,

    /// 받은 내용 바이트
    pub bytes: u64,

    pub status: UnitStatus,
}

/// 세션 처리 보고
#[derive(Debug)]
pub struct SessionReport {
    pub peer: Option<SocketAddr>,

    /// 처리 순서대로의 유닛 보고
    pub units: Vec<UnitReport>,

    pub stats: TransferStats,

    pub status: SessionStatus,

    /// 실패 원인
    pub error: Option<Error>,
}

/// 세션 상태
enum SessionState {
    AwaitingHeader,
    ReadingContent(UnitHeader),
    Complete,
    Failed(Error),
}

/// 세션 핸들러
pub struct SessionHandler {
    config: Arc<Config>,
    policy: Arc<PathPolicy>,
    peer: Option<SocketAddr>,
    events: Option<mpsc::Sender<UnitReport>>,
}

impl SessionHandler {
    pub fn new(config: Arc<Config>, policy: Arc<PathPolicy>, peer: Option<SocketAddr>) -> Self {
        Self {
            config,
            policy,
            peer,
            events: None,
        }
    }

    /// 유닛 보고를 완료 순서대로 받을 채널 연결
    ///
    /// 채널이 가득 차 있으면 보고를 버린다 (세션은 기다리지 않음)
    pub fn with_events(mut self, events: Option<mpsc::Sender<UnitReport>>) -> Self {
        self.events = events;
        self
    }

    /// 연결이 끝날 때까지 세션 처리
    pub async fn run<R: AsyncRead + Unpin>(self, conn: R) -> SessionReport {
        let mut reader = FrameReader::new(conn, &self.config);
        let mut stats = TransferStats::new();
        let mut units = Vec::new();
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];

        debug!("Session started");

        let mut state = SessionState::AwaitingHeader;
        let error = loop {
            state = match state {
                SessionState::AwaitingHeader => match reader.read_header().await {
                    Ok(Some(header)) => {
                        debug!(path = %header.path, length = ?header.length, "Unit header");
                        SessionState::ReadingContent(header)
                    }
                    Ok(None) => SessionState::Complete,
                    Err(e) => SessionState::Failed(e),
                },
                SessionState::ReadingContent(header) => {
                    let mut destination = None;
                    let mut received = 0u64;
                    let result = self
                        .receive_unit(&mut reader, &header, &mut buf, &mut destination, &mut received)
                        .await;

                    let (status, next) = match result {
                        Ok(()) => {
                            stats.record_unit(received);
                            info!(
                                path = %header.path,
                                bytes = received,
                                "Unit received -> {:?}",
                                destination.as_deref().unwrap_or(self.policy.base_directory.as_path())
                            );
                            (UnitStatus::Complete, SessionState::AwaitingHeader)
                        }
                        Err(e) => {
                            stats.record_failure(received);
                            warn!(path = %header.path, bytes = received, "Unit failed: {}", e);
                            (UnitStatus::Failed(e.kind()), SessionState::Failed(e))
                        }
                    };

                    let report = UnitReport {
                        peer: self.peer,
                        remote_path: header.path,
                        destination,
                        bytes: received,
                        status,
                    };
                    self.publish(&report);
                    units.push(report);
                    next
                }
                SessionState::Complete => break None,
                SessionState::Failed(e) => break Some(e),
            };
        };

        stats.finish(reader.bytes_read());

        let status = match &error {
            None => {
                info!("Session complete: {}", stats.summary());
                SessionStatus::Complete
            }
            Some(e) => {
                warn!("Session failed: {} | {}", e, stats.summary());
                SessionStatus::Failed
            }
        };

        SessionReport {
            peer: self.peer,
            units,
            stats,
            status,
            error: error.map(|e| e.aborted(reader.bytes_read(), self.peer)),
        }
    }

    fn publish(&self, report: &UnitReport) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(report.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                warn!(path = %report.remote_path, "Event channel full, unit report dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// 유닛 하나 수신. 경로 확인 → 임시 파일에 내용 기록 → rename
    async fn receive_unit<R: AsyncRead + Unpin>(
        &self,
        reader: &mut FrameReader<R>,
        header: &UnitHeader,
        buf: &mut [u8],
        destination: &mut Option<PathBuf>,
        received: &mut u64,
    ) -> Result<()> {
        let resolved = resolver::resolve(&header.path, &self.policy)?;
        resolver::check_no_symlink_escape(&self.policy.base_directory, &resolved).await?;
        *destination = Some(resolved.clone());

        let mut staged = StagedFile::create(&resolved).await?;
        let mut content = reader.content(header.length);
        loop {
            let n = content.read_chunk(buf).await?;
            if n == 0 {
                break;
            }
            staged.write_all(&buf[..n]).await?;
            *received = content.received();
        }

        staged.commit().await?;
        Ok(())
    }
}
