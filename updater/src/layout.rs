//! 설치 형태 판별
//!
//! 대상 디렉터리의 `lib/` 아래에 런타임 전용 확장자(`jar`) 파일이 있으면 JVM 배포판,
//! 없으면 네이티브 배포판입니다. 디스크 상태만 보는 순수 함수이므로 몇 번을 호출해도
//! 결과가 같습니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::settings::UpdateSettings;

/// 인식 가능한 설치 형태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    ManagedRuntime,
    NativeBinary,
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutKind::ManagedRuntime => write!(f, "managed-runtime"),
            LayoutKind::NativeBinary => write!(f, "native-binary"),
        }
    }
}

/// 판별 결과 + 보존 규칙. 한 번 실행하는 동안 바뀌지 않음
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutProfile {
    pub kind: LayoutKind,
    pub preserve_dirs: Vec<String>,
    pub plugin_whitelist: Vec<String>,
    /// 복사 전에 오래된 라이브러리 파일 정리 여부
    pub purge_before_copy: bool,
}

/// 대상 디렉터리의 설치 형태 판별
pub fn classify_installation(target_dir: &Path, settings: &UpdateSettings) -> LayoutProfile {
    let managed = &settings.layout.managed;
    let kind = if has_marker_file(
        &target_dir.join(&managed.marker_dir),
        &managed.marker_extension,
    ) {
        LayoutKind::ManagedRuntime
    } else {
        LayoutKind::NativeBinary
    };
    tracing::info!("[Layout] {} classified as {}", target_dir.display(), kind);
    settings.profile_for(kind)
}

fn has_marker_file(dir: &Path, extension: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
    })
}
