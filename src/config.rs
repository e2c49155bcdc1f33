//! 전송 설정
//!
//! - `Config`: 프로세스당 한 번 만들어지는 튜닝 값 (청크 크기, 세션 수 제한, 타임아웃)
//! - `PathPolicy`: 원격 경로를 로컬 경로로 옮길 때의 규칙
//!
//! 두 값 모두 생성 후 변경하지 않고 Sender / Receiver 생성자로 넘긴다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, MAX_PATH_LEN};

/// skiff 설정
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// 송신 시 입력을 읽는 단위 / 스트리밍 서브프레임 크기 (바이트)
    pub chunk_size: usize,

    /// 헤더에 선언 가능한 최대 경로 길이 (바이트)
    pub max_path_len: u32,

    /// 유닛 하나의 최대 선언 길이 (None 이면 제한 없음)
    pub max_unit_size: Option<u64>,

    /// 스트리밍 서브프레임 하나의 최대 길이
    pub max_stream_chunk: u32,

    /// 동시에 처리하는 최대 세션 수
    pub max_sessions: usize,

    /// 연결 유휴 타임아웃 (밀리초)
    /// 읽기 한 번이 이 시간 동안 진행되지 않으면 세션 실패
    pub idle_timeout_ms: u64,

    /// 종료 신호 후 진행 중 세션을 기다리는 시간 (밀리초)
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_path_len: MAX_PATH_LEN,
            max_unit_size: None,
            max_stream_chunk: 16 * 1024 * 1024, // 16MB
            max_sessions: 64,
            idle_timeout_ms: 30_000,    // 30초
            shutdown_grace_ms: 10_000,  // 10초
        }
    }
}

impl Config {
    /// 유휴 타임아웃
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// 종료 유예 시간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            chunk_size: 16 * 1024,          // 16KB
            max_stream_chunk: 1024 * 1024,  // 1MB
            max_sessions: 4,
            idle_timeout_ms: 60_000,
            shutdown_grace_ms: 5_000,
            ..Self::default()
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            chunk_size: 1024 * 1024,        // 1MB
            max_sessions: 256,
            idle_timeout_ms: 15_000,
            ..Self::default()
        }
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size 는 0 보다 커야 함".into()));
        }
        if self.chunk_size as u64 > self.max_stream_chunk as u64 {
            return Err(Error::Config(format!(
                "chunk_size({}) 가 max_stream_chunk({}) 보다 큼",
                self.chunk_size, self.max_stream_chunk
            )));
        }
        if self.max_path_len == 0 {
            return Err(Error::Config("max_path_len 는 0 보다 커야 함".into()));
        }
        if self.max_sessions == 0 {
            return Err(Error::Config("max_sessions 는 0 보다 커야 함".into()));
        }
        if self.idle_timeout_ms == 0 {
            return Err(Error::Config("idle_timeout_ms 는 0 보다 커야 함".into()));
        }
        Ok(())
    }

    /// TOML 문자열에서 설정 파싱 (빠진 필드는 기본값)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(format!("TOML 파싱 실패: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정 로드
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::local_io(path, e))?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }
}

/// 경로 정책
///
/// 수신측은 `strip_paths`와 `base_directory`로 목적지를 정하고,
/// 송신측은 `absolute_paths`로 헤더에 실을 경로 라벨을 정한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    /// 마지막 경로 조각(파일 이름)만 사용
    pub strip_paths: bool,

    /// 송신측이 절대 경로를 선언하는지 여부
    pub absolute_paths: bool,

    /// 모든 쓰기가 머물러야 하는 루트
    pub base_directory: PathBuf,
}

impl PathPolicy {
    /// 수신측 정책 생성
    pub fn receiving(base_directory: impl Into<PathBuf>, strip_paths: bool) -> Self {
        Self {
            strip_paths,
            absolute_paths: false,
            base_directory: base_directory.into(),
        }
    }

    /// 송신측 정책 생성
    pub fn sending(absolute_paths: bool) -> Self {
        Self {
            strip_paths: false,
            absolute_paths,
            base_directory: PathBuf::from("."),
        }
    }
}
