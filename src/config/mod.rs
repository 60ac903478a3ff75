//! 업데이터 설정 파일 관리
//!
//! `hs-updater.toml`에서 [`UpdateSettings`]를 로드합니다. 파일이 없으면 기본값,
//! 형식이 잘못된 파일은 설정 오류입니다.
//!
//! ## 검색 순서
//! 1. `--config <path>` (숨은 옵션)
//! 2. 환경 변수 `HS_UPDATER_CONFIG`
//! 3. 실행 파일 옆 `config/hs-updater.toml`
//! 4. 실행 파일 옆 `hs-updater.toml`
//! 5. CWD의 `config/hs-updater.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use hs_updater_lib::UpdateSettings;

pub const CONFIG_FILE_NAME: &str = "hs-updater.toml";
pub const CONFIG_ENV: &str = "HS_UPDATER_CONFIG";

/// 자동 검색 후보 경로 (우선순위 순)
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join("config").join(CONFIG_FILE_NAME));
            paths.push(dir.join(CONFIG_FILE_NAME));
        }
    }
    paths.push(PathBuf::from("config").join(CONFIG_FILE_NAME));
    paths
}

/// 설정 파일 경로 결정. 명시 경로는 존재 여부와 관계없이 그대로 사용
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    candidate_paths().into_iter().find(|p| p.is_file())
}

/// 설정 로드
///
/// 명시했거나 환경 변수로 지정한 파일이 없으면 오류, 자동 검색에서 못 찾으면 기본값.
pub fn load_settings(explicit: Option<&Path>) -> Result<UpdateSettings> {
    match config_file_path(explicit) {
        Some(path) => {
            let settings = load_from(&path)?;
            tracing::info!("[Config] Loaded {}", path.display());
            Ok(settings)
        }
        None => {
            tracing::debug!("[Config] No {} found, using defaults", CONFIG_FILE_NAME);
            Ok(UpdateSettings::default())
        }
    }
}

pub fn load_from(path: &Path) -> Result<UpdateSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_settings(&content).with_context(|| format!("invalid config file {}", path.display()))
}

pub fn parse_settings(content: &str) -> Result<UpdateSettings> {
    Ok(toml::from_str(content)?)
}
