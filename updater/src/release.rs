//! 릴리즈 정보와 버전 비교
//!
//! 태그 형식은 `v4.2.1-GA`, `4.3.0-BETA` 처럼 숫자 코어 + 선택적 채널 접미사입니다.
//! 코어가 같으면 채널 순위로 비교합니다: GA > PATCH > DEV > BETA > (알 수 없음) > TEST

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

/// 릴리즈 API 응답 (필요한 필드만)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(rename = "prerelease", default)]
    pub is_prerelease: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Release {
    /// 비교용. 현재 설치 버전처럼 태그만 아는 경우
    pub fn from_tag(tag: &str) -> Self {
        Self {
            tag_name: tag.to_string(),
            ..Self::default()
        }
    }

    /// 배포 에셋 파일 이름: `{prefix}-native_{tag}.zip` 또는 `{prefix}_{tag}.zip`
    pub fn file_name(&self, asset_prefix: &str, native: bool) -> String {
        if native {
            format!("{}-native_{}.zip", asset_prefix, self.tag_name)
        } else {
            format!("{}_{}.zip", asset_prefix, self.tag_name)
        }
    }

    /// 버전 비교. 상대 태그가 비어 있으면 항상 이쪽이 더 새로움
    pub fn compare_to(&self, other: &Release) -> Ordering {
        if other.tag_name.is_empty() {
            return Ordering::Greater;
        }
        compare_versions(&self.tag_name, &other.tag_name)
    }

    pub fn is_newer_than(&self, other: &Release) -> bool {
        self.compare_to(other) == Ordering::Greater
    }
}

fn version_core() -> &'static Regex {
    static CORE: OnceLock<Regex> = OnceLock::new();
    CORE.get_or_init(|| Regex::new(r"\d+(\.\d+)*").expect("static regex"))
}

/// 채널 접미사 순위
fn channel_rank(suffix: &str) -> i32 {
    let upper = suffix.to_uppercase();
    if upper.contains("GA") {
        10
    } else if upper.contains("PATCH") {
        8
    } else if upper.contains("DEV") {
        4
    } else if upper.contains("BETA") {
        2
    } else if upper.contains("TEST") {
        -1
    } else {
        0
    }
}

/// 두 버전 문자열 비교 (`v` 접두사 허용)
///
/// 숫자 코어를 찾을 수 없으면 같은 것으로 취급합니다.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (Some(core_a), Some(core_b)) = (version_core().find(a), version_core().find(b)) else {
        tracing::warn!("[Release] Unparseable version: '{}' vs '{}'", a, b);
        return Ordering::Equal;
    };
    let parse = |core: &str| -> Vec<u64> {
        core.split('.').map(|p| p.parse().unwrap_or(0)).collect()
    };
    let va = parse(core_a.as_str());
    let vb = parse(core_b.as_str());

    for (x, y) in va.iter().zip(vb.iter()) {
        match x.cmp(y) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    if va.len() != vb.len() {
        return va.len().cmp(&vb.len());
    }

    let suffix_a = a.split('-').nth(1);
    let suffix_b = b.split('-').nth(1);
    match (suffix_a, suffix_b) {
        (Some(sa), Some(sb)) => channel_rank(sa).cmp(&channel_rank(sb)),
        // 접미사가 있는 쪽이 위
        _ => a.split('-').count().cmp(&b.split('-').count()),
    }
}
