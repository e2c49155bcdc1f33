//! 원격 경로 → 로컬 목적지 경로 변환
//!
//! - `resolve`: I/O 없는 순수 함수. 피어가 보낸 경로를 정책에 맞게 정규화하고
//!   기준 디렉토리 아래로 붙인다.
//! - `check_no_symlink_escape`: 쓰기 직전에 심볼릭 링크로 기준 디렉토리를
//!   벗어나는지 확인 (I/O 수행)
//!
//! 원격 경로는 피어가 통제하는 값이므로 `/`와 `\` 모두 구분자로 취급한다.

use std::path::{Path, PathBuf};

use crate::config::PathPolicy;
use crate::{Error, Result};

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn traversal(remote_path: &str) -> Error {
    Error::PathTraversal {
        path: remote_path.to_string(),
    }
}

fn invalid(remote_path: &str, reason: &'static str) -> Error {
    Error::InvalidPath {
        path: remote_path.to_string(),
        reason,
    }
}

/// 경로 조각 하나 검사
fn check_segment(segment: &str, remote_path: &str) -> Result<()> {
    if segment.contains('\0') {
        return Err(invalid(remote_path, "NUL 문자 포함"));
    }

    // 드라이브 문자, NTFS 대체 데이터 스트림 방지
    #[cfg(windows)]
    if segment.contains(':') {
        return Err(invalid(remote_path, "콜론 포함"));
    }

    Ok(())
}

/// 어휘적 정규화: `.`/빈 조각 무시, 선두 루트 제거, `..`는 한 단계 위로
fn normalize(remote_path: &str) -> Result<Vec<&str>> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in remote_path.split(is_separator) {
        match segment {
            "" | "." => continue,
            ".." => {
                // 루트 위로 올라가면 거부
                if segments.pop().is_none() {
                    return Err(traversal(remote_path));
                }
            }
            name => {
                check_segment(name, remote_path)?;
                segments.push(name);
            }
        }
    }

    if segments.is_empty() {
        return Err(invalid(remote_path, "파일 이름 없음"));
    }

    Ok(segments)
}

/// 원격 경로를 로컬 목적지 경로로 변환
///
/// 결과는 항상 `policy.base_directory`의 하위 경로이며 기준 디렉토리 자신은
/// 될 수 없다. 절대 경로로 선언된 경우에도 루트를 떼고 기준 디렉토리 아래에
/// 다시 붙인다 (`/var/log/messages` → `<base>/var/log/messages`).
pub fn resolve(remote_path: &str, policy: &PathPolicy) -> Result<PathBuf> {
    if remote_path.is_empty() {
        return Err(invalid(remote_path, "빈 경로"));
    }

    let segments = if policy.strip_paths {
        // rsplit 은 항상 최소 한 개를 돌려준다
        let name = remote_path.rsplit(is_separator).next().unwrap_or_default();
        match name {
            ".." => return Err(traversal(remote_path)),
            "" | "." => return Err(invalid(remote_path, "파일 이름 없음")),
            name => {
                check_segment(name, remote_path)?;
                vec![name]
            }
        }
    } else {
        normalize(remote_path)?
    };

    let mut resolved = policy.base_directory.clone();
    for segment in segments {
        resolved.push(segment);
    }

    Ok(resolved)
}

/// 심볼릭 링크를 통한 기준 디렉토리 이탈 검사
///
/// 목적지에서 가장 가까운 실제 존재하는 조상을 정규화해서 기준 디렉토리
/// 아래에 있는지 확인한다. 아직 없는 경로 부분은 이후 쓰기 과정에서 일반
/// 디렉토리로 만들어진다.
pub async fn check_no_symlink_escape(base: &Path, resolved: &Path) -> Result<()> {
    let canonical_base = tokio::fs::canonicalize(base)
        .await
        .map_err(|e| Error::local_io(base, e))?;

    let mut probe = resolved.to_path_buf();
    loop {
        match tokio::fs::canonicalize(&probe).await {
            Ok(canonical) => {
                if canonical.starts_with(&canonical_base) {
                    return Ok(());
                }
                return Err(Error::PathTraversal {
                    path: resolved.display().to_string(),
                });
            }
            Err(_) => {
                if !probe.pop() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn policy(strip: bool) -> PathPolicy {
        PathPolicy::receiving("/srv/inbox", strip)
    }

    #[test]
    fn test_relative_path_joined_under_base() {
        let resolved = resolve("a/b/c.txt", &policy(false)).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/inbox/a/b/c.txt"));
    }

    #[test]
    fn test_strip_keeps_file_name_only() {
        let resolved = resolve("a/b/c.txt", &policy(true)).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/inbox/c.txt"));

        let resolved = resolve("c.txt", &policy(true)).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/inbox/c.txt"));
    }

    #[test]
    fn test_absolute_path_rerooted() {
        let resolved = resolve("/var/log/messages", &policy(false)).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/inbox/var/log/messages"));
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let err = resolve("../../etc/passwd", &policy(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);

        let err = resolve("a/../../etc/passwd", &policy(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);

        let err = resolve("/../etc/passwd", &policy(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);
    }

    #[test]
    fn test_backslash_traversal_rejected() {
        let err = resolve("..\\..\\windows\\system.ini", &policy(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);
    }

    #[test]
    fn test_inner_parent_stays_inside() {
        let resolved = resolve("a/./b/../c.txt", &policy(false)).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/inbox/a/c.txt"));
    }

    #[test]
    fn test_strip_with_parent_name() {
        let err = resolve("a/b/..", &policy(true)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);
    }

    #[test]
    fn test_invalid_paths() {
        for remote in ["", "/", ".", "a/..", "./."] {
            let err = resolve(remote, &policy(false)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath, "remote = {:?}", remote);
        }

        let err = resolve("dir/", &policy(true)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);

        let err = resolve("bad\0name", &policy(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_plain_directory_passes_symlink_check() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = dir.path().join("new/sub/file.bin");
        check_no_symlink_escape(dir.path(), &resolved).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let base = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), base.path().join("link")).unwrap();

        let resolved = base.path().join("link/file.bin");
        let err = check_no_symlink_escape(base.path(), &resolved)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);
    }
}
