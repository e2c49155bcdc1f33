//! 단계적 쓰기 (임시 이름으로 쓰고 완료 시 원자적 rename)
//!
//! 최종 이름으로는 완전한 파일만 보인다. `commit` 전에 드롭되면
//! (에러, 세션 중단, 태스크 abort) 임시 파일을 지운다.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{Error, Result};

/// 임시 이름 충돌 시 재시도 횟수
const MAX_CREATE_ATTEMPTS: usize = 8;

/// 임시 파일 경로 생성: `<parent>/.skiff.<random>.part`
///
/// 목적지 이름을 넣지 않으므로 이름 길이 제한(NAME_MAX)에 걸리지 않는다
fn temp_path_for(destination: &Path) -> Result<PathBuf> {
    let parent = destination.parent().ok_or_else(|| Error::InvalidPath {
        path: destination.display().to_string(),
        reason: "상위 디렉토리 없음",
    })?;
    if destination.file_name().is_none() {
        return Err(Error::InvalidPath {
            path: destination.display().to_string(),
            reason: "파일 이름 없음",
        });
    }

    Ok(parent.join(format!(".skiff.{:016x}.part", rand::random::<u64>())))
}

/// 단계적으로 쓰이는 목적지 파일
pub struct StagedFile {
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    committed: bool,
}

impl StagedFile {
    /// 목적지 옆에 임시 파일 생성 (없는 상위 디렉토리는 만든다)
    ///
    /// 여기서 만든 상위 디렉토리는 유닛이 실패해도 지우지 않는다 (빈 디렉토리로 남음)
    pub async fn create(destination: &Path) -> Result<Self> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::local_io(parent, e))?;
        }

        let mut attempt = 0;
        loop {
            let temp_path = temp_path_for(destination)?;
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await
            {
                Ok(file) => {
                    debug!("Staging {:?} via {:?}", destination, temp_path);
                    return Ok(Self {
                        file: Some(file),
                        temp_path,
                        final_path: destination.to_path_buf(),
                        written: 0,
                        committed: false,
                    });
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::AlreadyExists
                        && attempt + 1 < MAX_CREATE_ATTEMPTS =>
                {
                    attempt += 1;
                }
                Err(e) => return Err(Error::local_io(temp_path, e)),
            }
        }
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// 지금까지 쓴 바이트
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            Error::local_io(
                &self.temp_path,
                std::io::Error::new(std::io::ErrorKind::Other, "이미 닫힌 파일"),
            )
        })?;
        file.write_all(data)
            .await
            .map_err(|e| Error::local_io(&self.temp_path, e))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// 디스크에 내리고 최종 이름으로 rename. 같은 목적지는 마지막 rename 이 이긴다
    pub async fn commit(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::local_io(&self.temp_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| Error::local_io(&self.temp_path, e))?;
        }

        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| Error::local_io(&self.final_path, e))?;
        self.committed = true;

        Ok(self.final_path.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // 일부 플랫폼은 열린 파일을 지울 수 없으므로 먼저 닫는다
        drop(self.file.take());
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => debug!("Discarded staged file {:?}", self.temp_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.temp_path.display(),
                error = %e,
                "Failed to clean up staged file"
            ),
        }
    }
}
