//! 명령어 핸들러
//!
//! ## 종료 코드
//! - `0` — 성공
//! - `1` — 업데이트 실패, 인자 오류, 저장소 조회 실패

use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};

use hs_updater_lib::repository::{self, download_url, page_url};
use hs_updater_lib::{
    Caveat, Orchestrator, PayloadSource, Release, ReleaseClient, Repository, UpdateReport, UpdateRequest,
    UpdateSettings,
};

use crate::cli::{CheckArgs, ReleaseArgs, UpdateArgs};
use crate::console::{ConsolePrompt, ConsoleSink};
use crate::tui;

// ═══════════════════════════════════════════════════════
// update
// ═══════════════════════════════════════════════════════

pub fn build_request(args: &UpdateArgs) -> UpdateRequest {
    let mut request = UpdateRequest::new(PayloadSource::from_path(&args.payload), &args.target_dir);
    if let Some(pid) = args.pid {
        request = request.watch_pid(pid);
    }
    if let Some(flag) = &args.pause {
        request = request.pause(flag.clone());
    }
    if let Some(program) = &args.main_program {
        request = request.relaunch(program.clone());
    }
    request
}

pub fn cmd_update(settings: &UpdateSettings, args: &UpdateArgs) -> anyhow::Result<()> {
    let request = build_request(args);
    tracing::info!(
        "[Update] payload={} target={} pid={:?}",
        request.payload.path().display(),
        request.target_dir.display(),
        request.watched_pid
    );

    let result = if args.gui {
        tui::run_update(settings, &request)
    } else {
        let sink = ConsoleSink::new();
        let prompt = ConsolePrompt::new();
        Orchestrator::new(settings, &sink)
            .with_prompt(&prompt)
            .run(&request)
            .map_err(anyhow::Error::from)
    };

    let report = result.context("Update failed")?;
    for warning in caveat_warnings(&report) {
        eprintln!("⚠ {}", warning);
    }
    Ok(())
}

/// 성공 메시지에 포함되지 않은 주의 사항
pub fn caveat_warnings(report: &UpdateReport) -> Vec<String> {
    report
        .caveats
        .iter()
        .filter_map(|caveat| match caveat {
            Caveat::LockedFilesSkipped(paths) => Some(format!(
                "{} locked file(s) were not updated: {}",
                paths.len(),
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Caveat::SelfUpdateNotScheduled {
                replacement: Some(path),
                reason,
            } => Some(format!(
                "The updater itself was not replaced ({}). The new version is at {}",
                reason,
                path.display()
            )),
            Caveat::SelfUpdateNotScheduled {
                replacement: None,
                reason,
            } => Some(format!("The updater itself was not replaced ({})", reason)),
            Caveat::CleanupFailed { path, reason } => {
                Some(format!("Could not remove {} ({})", path.display(), reason))
            }
            // 성공 메시지에 이미 포함
            Caveat::RelaunchFailed { .. } => None,
        })
        .collect()
}

// ═══════════════════════════════════════════════════════
// check / latest
// ═══════════════════════════════════════════════════════

async fn fetch_latest(
    settings: &UpdateSettings,
    args: &ReleaseArgs,
) -> anyhow::Result<(Box<dyn Repository>, Release)> {
    let kind = args.repo.unwrap_or(settings.repository.default_source);
    let repo = repository::repository_for(kind, &settings.repository);
    let client = ReleaseClient::new(Duration::from_secs(settings.repository.request_timeout_secs))?;
    tracing::info!(
        "[Release] Looking up latest {} release ({})",
        if args.dev { "preview" } else { "stable" },
        if args.native { "native" } else { "jvm" }
    );
    let latest = client.latest_release(repo.as_ref(), args.dev).await?;
    Ok((repo, latest))
}

pub async fn cmd_check(settings: &UpdateSettings, args: &CheckArgs) -> anyhow::Result<()> {
    let (repo, latest) = fetch_latest(settings, &args.release).await?;
    let current = Release::from_tag(&args.current_version);
    let prefix = &settings.repository.asset_prefix;

    if args.release.interactive {
        print_check_report(repo.as_ref(), &latest, &current, prefix, args.release.native);
    } else {
        let out = check_json(repo.as_ref(), &latest, &current, prefix, args.release.native);
        println!("{}", serde_json::to_string(&out)?);
    }
    Ok(())
}

pub async fn cmd_latest(settings: &UpdateSettings, args: &ReleaseArgs) -> anyhow::Result<()> {
    let (repo, latest) = fetch_latest(settings, args).await?;
    let prefix = &settings.repository.asset_prefix;

    if args.interactive {
        print_latest_report(repo.as_ref(), &latest, prefix, args.native);
    } else {
        let out = latest_json(repo.as_ref(), &latest, prefix, args.native);
        println!("{}", serde_json::to_string(&out)?);
    }
    Ok(())
}

pub fn check_json(repo: &dyn Repository, latest: &Release, current: &Release, prefix: &str, native: bool) -> Value {
    if latest.is_newer_than(current) {
        json!({
            "hasUpdate": true,
            "currentVersion": current.tag_name,
            "latestVersion": latest.tag_name,
            "isPreRelease": latest.is_prerelease,
            "isNative": native,
            "body": latest.body.clone().unwrap_or_default(),
            "downloadUrl": download_url(repo, latest, prefix, native),
            "pageUrl": page_url(repo, latest),
        })
    } else {
        json!({
            "hasUpdate": false,
            "currentVersion": current.tag_name,
            "latestVersion": latest.tag_name,
            "isNative": native,
        })
    }
}

pub fn latest_json(repo: &dyn Repository, latest: &Release, prefix: &str, native: bool) -> Value {
    json!({
        "tagName": latest.tag_name,
        "isPreRelease": latest.is_prerelease,
        "isNative": native,
        "name": latest.name.clone().unwrap_or_default(),
        "body": latest.body.clone().unwrap_or_default(),
        "downloadUrl": download_url(repo, latest, prefix, native),
        "pageUrl": page_url(repo, latest),
    })
}

// ═══════════════════════════════════════════════════════
// 대화형 출력
// ═══════════════════════════════════════════════════════

fn flavor(native: bool) -> &'static str {
    if native {
        "Native"
    } else {
        "JVM"
    }
}

fn print_check_report(repo: &dyn Repository, latest: &Release, current: &Release, prefix: &str, native: bool) {
    println!();
    println!("========================================");
    println!("  Version check");
    println!("========================================");
    println!("  Current:  {}", current.tag_name);
    println!("  Latest:   {}", latest.tag_name);
    println!("  Build:    {}", flavor(native));

    if latest.is_newer_than(current) {
        println!("  Status:   ⬆ update available");
        if let Some(body) = latest.body.as_deref().filter(|b| !b.is_empty()) {
            println!();
            println!("Release notes:");
            println!("{}", body);
        }
        println!();
        println!("  Download: {}", download_url(repo, latest, prefix, native));
        println!("  Page:     {}", page_url(repo, latest));
    } else {
        println!("  Status:   ✓ up to date");
    }
    println!("========================================");
}

fn print_latest_report(repo: &dyn Repository, latest: &Release, prefix: &str, native: bool) {
    println!();
    println!("========================================");
    println!("  Latest release");
    println!("========================================");
    println!("  Version:     {}", latest.tag_name);
    println!("  Build:       {}", flavor(native));
    println!("  Pre-release: {}", if latest.is_prerelease { "yes" } else { "no" });
    if let Some(name) = latest.name.as_deref().filter(|n| !n.is_empty()) {
        println!("  Name:        {}", name);
    }
    if let Some(body) = latest.body.as_deref().filter(|b| !b.is_empty()) {
        println!();
        println!("Release notes:");
        println!("{}", body);
    }
    println!();
    println!("  Download:    {}", download_url(repo, latest, prefix, native));
    println!("  Page:        {}", page_url(repo, latest));
    println!("========================================");
}
