//! 업데이트 파이프라인 설정
//!
//! 모든 필드는 기본값을 가지므로 설정 파일은 바꾸고 싶은 키만 적으면 됩니다.
//!
//! ```toml
//! wait_for_exit_secs = 10
//! purge_filter_enabled = false
//!
//! [layout.managed]
//! plugin_whitelist = ["hs-script-base-card-plugin"]
//!
//! [repository]
//! default_source = "gitee"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::layout::{LayoutKind, LayoutProfile};
use crate::repository::SourceKind;

/// 파이프라인 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdateSettings {
    /// 대상 디렉터리 아래 스테이징 디렉터리 이름
    pub staging_dir_name: String,
    /// 자기 업데이트 시 새 실행 파일에 붙는 접미사
    pub updater_backup_suffix: String,

    pub wait_for_exit_secs: u64,
    pub poll_interval_ms: u64,
    pub wait_report_every_secs: u64,
    pub kill_settle_ms: u64,

    pub lock_prompt_timeout_secs: u64,
    pub lock_retry_delay_ms: u64,
    /// 잠금 해결 후 같은 파일에 대한 재시도 횟수. 소진되면 그 파일은 건너뜀
    pub lock_retry_attempts: u32,

    pub close_countdown_secs: u64,
    pub self_update_delay_secs: u64,

    /// 대상 디렉터리 안에 있는 업데이트 패키지를 성공 후 삭제
    pub delete_payload_after_update: bool,

    /// 오래된 파일 정리 시 확장자 필터 사용 여부. 끄면 보존 대상이 아닌 모든 파일을 삭제
    pub purge_filter_enabled: bool,
    pub purge_extensions: Vec<String>,
    /// 보존 디렉터리 외에 정리에서 제외할 디렉터리 이름
    pub purge_extra_excludes: Vec<String>,

    /// 파일을 건드리기 전에 이름으로 강제 종료할 동반 프로세스
    pub kill_process_names: Vec<String>,

    pub layout: LayoutSettings,
    pub repository: RepositorySettings,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            staging_dir_name: "_temp_update".into(),
            updater_backup_suffix: ".bak".into(),
            wait_for_exit_secs: 5,
            poll_interval_ms: 500,
            wait_report_every_secs: 2,
            kill_settle_ms: 1000,
            lock_prompt_timeout_secs: 300,
            lock_retry_delay_ms: 2000,
            lock_retry_attempts: 2,
            close_countdown_secs: 10,
            self_update_delay_secs: 2,
            delete_payload_after_update: false,
            purge_filter_enabled: true,
            purge_extensions: vec!["jar".into(), "dll".into()],
            purge_extra_excludes: vec!["log".into()],
            kill_process_names: Vec::new(),
            layout: LayoutSettings::default(),
            repository: RepositorySettings::default(),
        }
    }
}

impl UpdateSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_for_exit(&self) -> Duration {
        Duration::from_secs(self.wait_for_exit_secs)
    }

    pub fn wait_report_every(&self) -> Duration {
        Duration::from_secs(self.wait_report_every_secs)
    }

    pub fn kill_settle(&self) -> Duration {
        Duration::from_millis(self.kill_settle_ms)
    }

    pub fn lock_prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_prompt_timeout_secs)
    }

    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    /// 정리 단계에서 사용할 확장자 필터 (비활성이면 None)
    pub fn purge_filter(&self) -> Option<&[String]> {
        if self.purge_filter_enabled {
            Some(&self.purge_extensions)
        } else {
            None
        }
    }

    /// 모든 대기 시간을 0으로 (테스트와 무인 실행용)
    pub fn without_delays(mut self) -> Self {
        self.poll_interval_ms = 1;
        self.wait_report_every_secs = 0;
        self.kill_settle_ms = 0;
        self.lock_prompt_timeout_secs = 0;
        self.lock_retry_delay_ms = 0;
        self.close_countdown_secs = 0;
        self
    }

    /// 설치 형태별 보존 규칙
    pub fn profile_for(&self, kind: LayoutKind) -> LayoutProfile {
        match kind {
            LayoutKind::ManagedRuntime => LayoutProfile {
                kind,
                preserve_dirs: self.layout.managed.preserve_dirs.clone(),
                plugin_whitelist: self.layout.managed.plugin_whitelist.clone(),
                purge_before_copy: self.layout.managed.purge_before_copy,
            },
            LayoutKind::NativeBinary => LayoutProfile {
                kind,
                preserve_dirs: self.layout.native.preserve_dirs.clone(),
                plugin_whitelist: self.layout.native.plugin_whitelist.clone(),
                purge_before_copy: self.layout.native.purge_before_copy,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LayoutSettings {
    pub managed: ManagedLayoutSettings,
    pub native: NativeLayoutSettings,
}

/// JVM 배포판: `lib/*.jar` 존재로 판별
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagedLayoutSettings {
    pub marker_dir: String,
    pub marker_extension: String,
    pub preserve_dirs: Vec<String>,
    pub plugin_whitelist: Vec<String>,
    pub purge_before_copy: bool,
}

impl Default for ManagedLayoutSettings {
    fn default() -> Self {
        Self {
            marker_dir: "lib".into(),
            marker_extension: "jar".into(),
            preserve_dirs: vec!["config".into(), "data".into()],
            plugin_whitelist: vec![
                "hs-script-base-card-plugin".into(),
                "hs-script-base-strategy-plugin".into(),
            ],
            purge_before_copy: true,
        }
    }
}

/// 네이티브 배포판
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NativeLayoutSettings {
    pub preserve_dirs: Vec<String>,
    pub plugin_whitelist: Vec<String>,
    pub purge_before_copy: bool,
}

impl Default for NativeLayoutSettings {
    fn default() -> Self {
        Self {
            preserve_dirs: vec!["config".into(), "data".into()],
            plugin_whitelist: Vec::new(),
            purge_before_copy: false,
        }
    }
}

/// 릴리즈 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositorySettings {
    pub project: String,
    pub github_owner: String,
    pub gitee_owner: String,
    pub asset_prefix: String,
    pub default_source: SourceKind,
    pub request_timeout_secs: u64,
    /// 릴리즈 API 루트 재정의 (미러, 로컬 테스트 서버)
    pub api_base_url: Option<String>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            project: "Hearthstone-Script".into(),
            github_owner: "xjw580".into(),
            gitee_owner: "zergqueen".into(),
            asset_prefix: "hs-script".into(),
            default_source: SourceKind::Github,
            request_timeout_secs: 30,
            api_base_url: None,
        }
    }
}
