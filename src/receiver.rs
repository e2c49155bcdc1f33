//! 수신 리스너
//!
//! - 연결 수락 후 세션마다 태스크 하나 생성
//! - 세마포어로 동시 세션 수 제한 (가득 차면 빈 자리가 날 때까지 수락 대기)
//! - 종료 신호 시 수락 중단, 유예 시간 동안 진행 중 세션 대기 후 나머지 중단

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::PathPolicy;
use crate::session::{SessionHandler, UnitReport};
use crate::stats::ReceiverStats;
use crate::transport::{is_transient_accept_error, Acceptor, TcpTransport, Transport};
use crate::{Config, Error, Result};

/// 수신자
pub struct Receiver<T: Transport = TcpTransport> {
    /// 설정
    config: Arc<Config>,

    /// 경로 정책 (기준 디렉토리는 정규화된 절대 경로)
    policy: Arc<PathPolicy>,

    /// 연결 수락기
    acceptor: T::Acceptor,

    /// 바인드된 주소
    local_addr: SocketAddr,

    /// 동시 세션 제한
    limiter: Arc<Semaphore>,

    /// 누적 통계
    stats: Arc<RwLock<ReceiverStats>>,

    /// 유닛 보고 채널
    events: Option<mpsc::Sender<UnitReport>>,
}

impl<T: Transport> Receiver<T> {
    /// 기준 디렉토리 확인 후 주소에 바인드
    pub async fn bind(
        transport: &T,
        address: &str,
        config: Config,
        policy: PathPolicy,
    ) -> Result<Self> {
        config.validate()?;

        let base = &policy.base_directory;
        let metadata = tokio::fs::metadata(base)
            .await
            .map_err(|e| Error::local_io(base, e))?;
        if !metadata.is_dir() {
            return Err(Error::Config(format!(
                "기준 디렉토리가 디렉토리가 아님: {}",
                base.display()
            )));
        }
        let base_directory = tokio::fs::canonicalize(base)
            .await
            .map_err(|e| Error::local_io(base, e))?;
        let policy = PathPolicy {
            base_directory,
            ..policy
        };

        let acceptor = transport
            .listen(address)
            .await
            .map_err(|e| Error::transport(format!("bind {}", address), e))?;
        let local_addr = acceptor
            .local_addr()
            .map_err(|e| Error::transport("local_addr", e))?;

        info!(
            "Receiving on {} into {:?} (strip: {}, max sessions: {})",
            local_addr, policy.base_directory, policy.strip_paths, config.max_sessions
        );

        Ok(Self {
            limiter: Arc::new(Semaphore::new(config.max_sessions)),
            config: Arc::new(config),
            policy: Arc::new(policy),
            acceptor,
            local_addr,
            stats: Arc::new(RwLock::new(ReceiverStats::new())),
            events: None,
        })
    }

    /// 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// 실행 중에도 읽을 수 있는 누적 통계 핸들
    pub fn stats(&self) -> Arc<RwLock<ReceiverStats>> {
        self.stats.clone()
    }

    /// 모든 세션의 유닛 보고를 받을 채널 연결
    pub fn with_events(mut self, events: mpsc::Sender<UnitReport>) -> Self {
        self.events = Some(events);
        self
    }

    /// 종료 신호까지 수락 루프 실행
    ///
    /// 수락 에러 중 일시적인 것만 무시하고 나머지는 반환한다.
    /// 어느 경우든 진행 중 세션은 유예 시간 안에서 정리한 뒤 돌아온다.
    pub async fn run(self, shutdown: CancellationToken) -> Result<ReceiverStats> {
        let Receiver {
            config,
            policy,
            mut acceptor,
            limiter,
            stats,
            events,
            ..
        } = self;

        let mut sessions = JoinSet::new();

        let result = loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_join(joined);
                    continue;
                }
                permit = limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let (conn, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                accepted = acceptor.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!("Accept failed, continuing: {}", e);
                        continue;
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        break Err(Error::transport("accept", e));
                    }
                },
            };

            stats.write().sessions_accepted += 1;

            let handler = SessionHandler::new(config.clone(), policy.clone(), Some(peer))
                .with_events(events.clone());
            let session_stats = stats.clone();
            let span = info_span!("session", %peer);
            span.in_scope(|| info!("Session accepted"));

            sessions.spawn(
                async move {
                    let _permit = permit;
                    let report = handler.run(conn).await;
                    session_stats.write().record_session(&report);
                }
                .instrument(span),
            );
        };

        // 수락 중단
        drop(acceptor);

        let in_flight = sessions.len();
        if in_flight > 0 {
            info!(
                "Waiting up to {:?} for {} in-flight sessions",
                config.shutdown_grace(),
                in_flight
            );

            let deadline = tokio::time::sleep(config.shutdown_grace());
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    joined = sessions.join_next() => match joined {
                        Some(joined) => log_join(joined),
                        None => break,
                    },
                }
            }

            if !sessions.is_empty() {
                warn!(
                    "Aborting {} sessions after shutdown grace period",
                    sessions.len()
                );
                let aborted = abort_remaining(&mut sessions).await;
                stats.write().sessions_aborted += aborted;
            }
        }

        let summary = stats.read().clone();
        info!("Receiver stopped: {}", summary.summary());
        result.map(|()| summary)
    }
}

/// 남은 세션 태스크를 중단하고 실제로 취소된 태스크 수 반환
///
/// 중단 직전에 끝난 세션은 이미 `record_session`으로 집계되었으므로 세지 않는다.
async fn abort_remaining(sessions: &mut JoinSet<()>) -> u64 {
    sessions.abort_all();

    let mut aborted = 0;
    while let Some(joined) = sessions.join_next().await {
        match joined {
            Err(e) if e.is_cancelled() => aborted += 1,
            joined => log_join(joined),
        }
    }
    aborted
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("Session task panicked: {}", e),
        Err(e) => debug!("Session task cancelled: {}", e),
    }
}
