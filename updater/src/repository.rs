//! 릴리즈 저장소 — GitHub / Gitee 릴리즈 API
//!
//! 버전 확인(`check`, `latest`)에서만 사용되며 업데이트 파이프라인과는 무관합니다.
//! 저장소마다 "최신 릴리즈"를 고르는 방법이 다릅니다:
//!
//! | 저장소 | 미리보기(preview) | 정식 |
//! |--------|-------------------|------|
//! | GitHub | `/releases` 목록의 첫 항목 | `/releases/latest` |
//! | Gitee  | `/releases/latest` | `/releases` 목록 중 가장 높은 정식 버전 |

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, UpdateError};
use crate::release::Release;
use crate::settings::RepositorySettings;

/// 릴리즈 소스 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
    Gitee,
}

impl std::str::FromStr for SourceKind {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(SourceKind::Github),
            "gitee" => Ok(SourceKind::Gitee),
            other => Err(UpdateError::Config(format!("unknown repository '{}'", other))),
        }
    }
}

/// 릴리즈 저장소 인터페이스
pub trait Repository: Send + Sync {
    fn name(&self) -> &'static str;
    fn domain(&self) -> &str;
    fn owner(&self) -> &str;
    fn project(&self) -> &str;
    /// 최신 릴리즈 조회 API 주소
    fn latest_release_url(&self, preview: bool) -> String;
    /// API 응답 본문에서 최신 릴리즈 선택
    fn select_latest(&self, body: &str, preview: bool) -> Result<Release>;
}

/// 설정으로부터 저장소 생성
pub fn repository_for(kind: SourceKind, settings: &RepositorySettings) -> Box<dyn Repository> {
    let api_base = settings.api_base_url.as_deref();
    match kind {
        SourceKind::Github => {
            let repo = GitHubRepository::new(&settings.github_owner, &settings.project);
            Box::new(match api_base {
                Some(base) => repo.with_api_base(base),
                None => repo,
            })
        }
        SourceKind::Gitee => {
            let repo = GiteeRepository::new(&settings.gitee_owner, &settings.project);
            Box::new(match api_base {
                Some(base) => repo.with_api_base(base),
                None => repo,
            })
        }
    }
}

/// 에셋 다운로드 주소
pub fn download_url(repo: &dyn Repository, release: &Release, asset_prefix: &str, native: bool) -> String {
    format!(
        "https://{}/{}/{}/releases/download/{}/{}",
        repo.domain(),
        repo.owner(),
        repo.project(),
        release.tag_name,
        release.file_name(asset_prefix, native)
    )
}

/// 릴리즈 페이지 주소
pub fn page_url(repo: &dyn Repository, release: &Release) -> String {
    format!(
        "https://{}/{}/{}/releases/tag/{}",
        repo.domain(),
        repo.owner(),
        repo.project(),
        release.tag_name
    )
}

fn parse_one(body: &str) -> Result<Release> {
    serde_json::from_str(body)
        .map_err(|e| UpdateError::Repository(format!("invalid release response: {}", e)))
}

fn parse_list(body: &str) -> Result<Vec<Release>> {
    serde_json::from_str(body)
        .map_err(|e| UpdateError::Repository(format!("invalid release list: {}", e)))
}

// ══════════════════════════════════════════════════════
// GitHub
// ══════════════════════════════════════════════════════

pub struct GitHubRepository {
    owner: String,
    project: String,
    api_base: String,
}

impl GitHubRepository {
    pub fn new(owner: &str, project: &str) -> Self {
        Self {
            owner: owner.to_string(),
            project: project.to_string(),
            api_base: "https://api.github.com".to_string(),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

impl Repository for GitHubRepository {
    fn name(&self) -> &'static str {
        "github"
    }

    fn domain(&self) -> &str {
        "github.com"
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn project(&self) -> &str {
        &self.project
    }

    fn latest_release_url(&self, preview: bool) -> String {
        let base = format!("{}/repos/{}/{}/releases", self.api_base, self.owner, self.project);
        if preview {
            base
        } else {
            format!("{}/latest", base)
        }
    }

    fn select_latest(&self, body: &str, preview: bool) -> Result<Release> {
        if !preview {
            // GitHub의 latest는 프리릴리스를 제외한 최신
            return parse_one(body);
        }
        parse_list(body)?
            .into_iter()
            .next()
            .ok_or_else(|| UpdateError::Repository("no releases published".into()))
    }
}

// ══════════════════════════════════════════════════════
// Gitee
// ══════════════════════════════════════════════════════

pub struct GiteeRepository {
    owner: String,
    project: String,
    api_base: String,
}

impl GiteeRepository {
    pub fn new(owner: &str, project: &str) -> Self {
        Self {
            owner: owner.to_string(),
            project: project.to_string(),
            api_base: "https://gitee.com/api/v5".to_string(),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

impl Repository for GiteeRepository {
    fn name(&self) -> &'static str {
        "gitee"
    }

    fn domain(&self) -> &str {
        "gitee.com"
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn project(&self) -> &str {
        &self.project
    }

    fn latest_release_url(&self, preview: bool) -> String {
        let base = format!("{}/repos/{}/{}/releases", self.api_base, self.owner, self.project);
        if preview {
            // Gitee의 latest는 프리릴리스 포함
            format!("{}/latest", base)
        } else {
            base
        }
    }

    fn select_latest(&self, body: &str, preview: bool) -> Result<Release> {
        if preview {
            return parse_one(body);
        }
        parse_list(body)?
            .into_iter()
            .filter(|r| !r.is_prerelease)
            .fold(None, |best: Option<Release>, r| match best {
                Some(b) if !r.is_newer_than(&b) => Some(b),
                _ => Some(r),
            })
            .ok_or_else(|| UpdateError::Repository("no stable release found".into()))
    }
}

// ══════════════════════════════════════════════════════
// HTTP 클라이언트
// ══════════════════════════════════════════════════════

/// 릴리즈 API HTTP 클라이언트
pub struct ReleaseClient {
    http: reqwest::Client,
}

impl ReleaseClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hs-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| UpdateError::Repository(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// 최신 릴리즈 조회
    pub async fn latest_release(&self, repo: &dyn Repository, preview: bool) -> Result<Release> {
        let url = repo.latest_release_url(preview);
        tracing::info!("[Release] Fetching {} ({})", url, repo.name());

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| UpdateError::Repository(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpdateError::Repository(format!(
                "{} API error ({}): {}",
                repo.name(),
                status,
                body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::Repository(format!("failed to read response: {}", e)))?;
        let release = repo.select_latest(&body, preview)?;
        tracing::info!("[Release] Latest on {}: {}", repo.name(), release.tag_name);
        Ok(release)
    }
}
