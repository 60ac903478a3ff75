//! 파일 트리 작업 — 압축 해제, 제외 규칙이 있는 복사, 오래된 파일 정리
//!
//! 복사는 두 단계로 나뉩니다:
//! 1. [`plan_copy`]: 원본 트리를 훑어 보존/화이트리스트 규칙을 적용한 복사 목록 작성
//! 2. [`TreeCopier::run`]: 목록을 순서대로 실행하며 파일마다 진행률 보고
//!
//! 전체 파일 수를 먼저 알기 때문에 진행률이 파일 수에 대해 선형입니다.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{CopyFault, Result, UpdateError};
use crate::process::LockResolution;

/// 부분적으로만 내려가는 플러그인 디렉터리 이름
const PLUGIN_DIR_NAMES: [&str; 2] = ["plugin", "plugins"];

// ══════════════════════════════════════════════════════
// 압축 해제
// ══════════════════════════════════════════════════════

/// zip 아카이브를 `dest_dir`에 풀기
///
/// 모든 엔트리 이름을 먼저 검증하므로 `..` 또는 절대 경로 엔트리가 하나라도 있으면
/// 아무 파일도 쓰지 않고 [`UpdateError::ZipSlip`]을 반환합니다.
/// 반환값은 기록한 파일 수입니다.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = fs::File::open(archive_path)
        .map_err(|e| UpdateError::io("open archive", archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| UpdateError::Archive {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let archive_err = |source| UpdateError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let mut targets = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(archive_err)?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| UpdateError::ZipSlip {
                entry: entry.name().to_string(),
            })?;
        let out_path = dest_dir.join(&relative);
        if !out_path.starts_with(dest_dir) {
            return Err(UpdateError::ZipSlip {
                entry: entry.name().to_string(),
            });
        }
        targets.push(out_path);
    }

    fs::create_dir_all(dest_dir).map_err(|e| UpdateError::io("create staging", dest_dir, e))?;

    let mut written = 0;
    for (i, out_path) in targets.into_iter().enumerate() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| UpdateError::io("create directory", &out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| UpdateError::io("create directory", parent, e))?;
        }
        let mut outfile = fs::File::create(&out_path)
            .map_err(|e| UpdateError::io("create file", &out_path, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| UpdateError::io("extract", &out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode)).ok();
        }
        written += 1;
    }

    tracing::info!(
        "[Extract] {} file(s) from {} → {}",
        written,
        archive_path.display(),
        dest_dir.display()
    );
    Ok(written)
}

/// 압축이 한 겹의 최상위 폴더로 감싸져 있으면 그 폴더를, 아니면 `dir` 그대로 반환
pub fn find_single_extracted_root(dir: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| UpdateError::io("read directory", dir, e))?
        .collect::<io::Result<_>>()
        .map_err(|e| UpdateError::io("read directory", dir, e))?;

    if let [only] = entries.as_slice() {
        let path = only.path();
        if path.is_dir() {
            tracing::debug!("[Extract] Unwrapping single root folder {}", path.display());
            return Ok(path);
        }
    }
    Ok(dir.to_path_buf())
}

/// `root` 아래에서 파일 이름이 `name`인 첫 번째 파일 검색
pub fn find_file(root: &Path, name: &std::ffi::OsStr) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && names_match(e.file_name(), name))
        .map(|e| e.into_path())
}

#[cfg(windows)]
fn names_match(a: &std::ffi::OsStr, b: &std::ffi::OsStr) -> bool {
    a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy())
}

#[cfg(not(windows))]
fn names_match(a: &std::ffi::OsStr, b: &std::ffi::OsStr) -> bool {
    a == b
}

/// 두 경로가 같은 파일을 가리키는지 (둘 다 존재해야 true)
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn name_in(name: &std::ffi::OsStr, list: &[String]) -> bool {
    let name = name.to_string_lossy();
    list.iter().any(|n| *n == name)
}

// ══════════════════════════════════════════════════════
// 복사 계획
// ══════════════════════════════════════════════════════

/// 복사 시 적용되는 규칙
#[derive(Debug, Clone, Copy)]
pub struct CopyRules<'a> {
    /// 통째로 건너뛰는 디렉터리 이름 (모든 깊이에서 정확히 일치)
    pub preserve_dirs: &'a [String],
    /// `plugin`/`plugins` 아래에서 예외적으로 갱신하는 하위 디렉터리
    pub plugin_whitelist: &'a [String],
}

/// 실행할 복사 목록
#[derive(Debug, Default)]
pub struct CopyPlan {
    pub dirs: Vec<PathBuf>,
    pub files: Vec<(PathBuf, PathBuf)>,
    pub skipped_dirs: Vec<PathBuf>,
}

impl CopyPlan {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// `src_dir` → `dst_dir` 복사 목록 작성
pub fn plan_copy(src_dir: &Path, dst_dir: &Path, rules: &CopyRules<'_>) -> Result<CopyPlan> {
    let mut plan = CopyPlan::default();
    plan_dir(src_dir, dst_dir, rules, true, &mut plan)?;
    Ok(plan)
}

fn plan_dir(
    src: &Path,
    dst: &Path,
    rules: &CopyRules<'_>,
    apply_exclusions: bool,
    plan: &mut CopyPlan,
) -> Result<()> {
    plan.dirs.push(dst.to_path_buf());

    let mut entries: Vec<_> = fs::read_dir(src)
        .map_err(|e| UpdateError::io("read directory", src, e))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let file_type = entry
            .file_type()
            .map_err(|e| UpdateError::io("stat", &src_path, e))?;

        if !file_type.is_dir() {
            plan.files.push((src_path, dst_path));
            continue;
        }

        if apply_exclusions {
            let is_plugin_dir = PLUGIN_DIR_NAMES
                .iter()
                .any(|p| name.to_string_lossy() == *p);
            if is_plugin_dir && !rules.plugin_whitelist.is_empty() {
                plan_plugin_dir(&src_path, &dst_path, rules, plan)?;
                continue;
            }
            if name_in(&name, rules.preserve_dirs) {
                tracing::debug!("[Copy] Preserving {}", dst_path.display());
                plan.skipped_dirs.push(dst_path);
                continue;
            }
        }
        plan_dir(&src_path, &dst_path, rules, apply_exclusions, plan)?;
    }
    Ok(())
}

/// 화이트리스트에 있는 플러그인만 제외 규칙 없이 통째로 복사
fn plan_plugin_dir(src: &Path, dst: &Path, rules: &CopyRules<'_>, plan: &mut CopyPlan) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(src)
        .map_err(|e| UpdateError::io("read directory", src, e))?
        .filter_map(|e| e.ok())
        .collect();
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let name = child.file_name();
        let dst_path = dst.join(&name);
        if !name_in(&name, rules.plugin_whitelist) {
            tracing::debug!("[Copy] Plugin not whitelisted, keeping {}", dst_path.display());
            plan.skipped_dirs.push(dst_path);
            continue;
        }
        let src_path = child.path();
        if src_path.is_dir() {
            plan_dir(&src_path, &dst_path, rules, false, plan)?;
        } else {
            plan.dirs.push(dst.to_path_buf());
            plan.files.push((src_path, dst_path));
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════
// 복사 실행
// ══════════════════════════════════════════════════════

/// 파일 한 개를 쓰는 방법. 테스트에서 잠금 상황을 흉내낼 때 교체합니다.
pub trait FileWriter: Send + Sync {
    fn copy_file(&self, src: &Path, dst: &Path) -> std::result::Result<(), CopyFault>;
}

/// 실제 파일 시스템 쓰기
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWriter;

impl FileWriter for FsWriter {
    fn copy_file(&self, src: &Path, dst: &Path) -> std::result::Result<(), CopyFault> {
        let existed = dst.exists();
        fs::copy(src, dst)
            .map(|_| ())
            .map_err(|e| CopyFault::classify(e, existed))
    }
}

/// 복사 결과 요약
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub skipped_self: Vec<PathBuf>,
    pub skipped_locked: Vec<PathBuf>,
}

/// 복사 목록 실행기
pub struct TreeCopier<'a> {
    writer: &'a dyn FileWriter,
    self_exe: Option<&'a Path>,
    retry_attempts: u32,
}

impl<'a> TreeCopier<'a> {
    pub fn new(writer: &'a dyn FileWriter, self_exe: Option<&'a Path>, retry_attempts: u32) -> Self {
        Self {
            writer,
            self_exe,
            retry_attempts,
        }
    }

    /// 목록 실행
    ///
    /// - `on_locked`: 공유 위반 발생 시 해결 방법 결정 (재시도/건너뛰기/중단)
    /// - `on_file`: 파일 하나 처리할 때마다 `(처리 수, 전체 수, 대상 경로)`
    pub fn run(
        &self,
        plan: &CopyPlan,
        on_locked: &mut dyn FnMut(&Path) -> Result<LockResolution>,
        on_file: &mut dyn FnMut(usize, usize, &Path),
    ) -> Result<CopyReport> {
        for dir in &plan.dirs {
            fs::create_dir_all(dir).map_err(|e| UpdateError::io("create directory", dir, e))?;
        }

        let total = plan.files.len();
        let mut report = CopyReport::default();
        for (done, (src, dst)) in plan.files.iter().enumerate() {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| UpdateError::io("create directory", parent, e))?;
            }

            if self.self_exe.map(|exe| is_same_file(dst, exe)).unwrap_or(false) {
                tracing::info!("[Copy] Skipping running executable {}", dst.display());
                report.skipped_self.push(dst.clone());
            } else if self.copy_one(src, dst, on_locked)? {
                report.copied += 1;
            } else {
                report.skipped_locked.push(dst.clone());
            }
            on_file(done + 1, total, dst.as_path());
        }

        tracing::info!(
            "[Copy] {} copied, {} locked skip(s), {} self skip(s)",
            report.copied,
            report.skipped_locked.len(),
            report.skipped_self.len()
        );
        Ok(report)
    }

    /// 파일 하나 복사. 잠금으로 건너뛰면 `Ok(false)`
    fn copy_one(
        &self,
        src: &Path,
        dst: &Path,
        on_locked: &mut dyn FnMut(&Path) -> Result<LockResolution>,
    ) -> Result<bool> {
        let mut retries_left = self.retry_attempts;
        loop {
            match self.writer.copy_file(src, dst) {
                Ok(()) => return Ok(true),
                Err(CopyFault::Io(e)) => return Err(UpdateError::io("copy", dst, e)),
                Err(CopyFault::Locked(e)) => {
                    tracing::warn!("[Copy] {} is locked: {}", dst.display(), e);
                    if retries_left == 0 {
                        tracing::warn!("[Copy] Still locked after retries, skipping {}", dst.display());
                        return Ok(false);
                    }
                    match on_locked(dst)? {
                        LockResolution::Retry => retries_left -= 1,
                        LockResolution::Skip => {
                            tracing::warn!("[Copy] Skipping locked file {}", dst.display());
                            return Ok(false);
                        }
                        LockResolution::Abort => return Err(UpdateError::Aborted(dst.to_path_buf())),
                    }
                }
            }
        }
    }
}

// ══════════════════════════════════════════════════════
// 정리
// ══════════════════════════════════════════════════════

/// 오래된 파일 정리
///
/// 조상 디렉터리 중 하나라도 이름이 `exclude_dirs`에 있으면 보존합니다(문자열 접두사가
/// 아니라 경로 구성요소 단위 비교). `extensions`가 주어지면 해당 확장자 파일만 삭제합니다.
/// `keep`에 있는 경로(실행 중인 업데이터, 대상 안에 있는 업데이트 패키지 등)는
/// 파일이든 디렉터리든 통째로 건너뜁니다.
/// 반환값은 삭제한 파일 수입니다.
pub fn delete_stale_files(
    target_dir: &Path,
    exclude_dirs: &[String],
    extensions: Option<&[String]>,
    keep: &[PathBuf],
) -> Result<usize> {
    let keep: Vec<PathBuf> = keep.iter().filter_map(|k| fs::canonicalize(k).ok()).collect();
    let walker = WalkDir::new(target_dir).into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        if e.file_type().is_dir() && name_in(e.file_name(), exclude_dirs) {
            return false;
        }
        keep.is_empty()
            || fs::canonicalize(e.path())
                .map(|p| !keep.contains(&p))
                .unwrap_or(true)
    });

    let mut removed = 0;
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(target_dir).to_path_buf();
            UpdateError::io("walk", &path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        if let Some(exts) = extensions {
            let matches = path
                .extension()
                .map(|ext| exts.iter().any(|x| ext.to_string_lossy().eq_ignore_ascii_case(x)))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("[Purge] Removed {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("[Purge] Could not remove {}: {}", path.display(), e),
        }
    }

    tracing::info!("[Purge] {} stale file(s) removed from {}", removed, target_dir.display());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn zip_with(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn never_locked(_: &Path) -> Result<LockResolution> {
        panic!("no lock expected")
    }

    #[test]
    fn extract_recreates_nested_structure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("p.zip");
        zip_with(&archive, &[("bin/", ""), ("bin/app.exe", "new"), ("lib/a.jar", "a")]);

        let dest = dir.path().join("out");
        let written = extract_archive(&archive, &dest).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(dest.join("bin/app.exe")).unwrap(), "new");
        assert!(dest.join("lib/a.jar").is_file());
    }

    #[test]
    fn extract_rejects_zip_slip_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        zip_with(&archive, &[("ok.txt", "fine"), ("../../evil.txt", "pwned")]);

        let dest = dir.path().join("a/b/out");
        let err = extract_archive(&archive, &dest).unwrap_err();
        assert!(matches!(err, UpdateError::ZipSlip { .. }));
        assert!(!dest.join("ok.txt").exists());
        assert!(!dir.path().join("a/evil.txt").exists());
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn extract_reports_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();
        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.is_integrity_error());
    }

    #[test]
    fn single_root_is_unwrapped() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("app-v2/app.exe"), "x");
        assert_eq!(find_single_extracted_root(dir.path()).unwrap(), dir.path().join("app-v2"));
    }

    #[test]
    fn two_top_level_entries_stay_at_root() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("app-v2/app.exe"), "x");
        write(&dir.path().join("README.txt"), "x");
        assert_eq!(find_single_extracted_root(dir.path()).unwrap(), dir.path());
    }

    #[test]
    fn single_file_is_not_unwrapped() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("app.exe"), "x");
        assert_eq!(find_single_extracted_root(dir.path()).unwrap(), dir.path());
    }

    #[test]
    fn plugin_whitelist_carve_out() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("plugin/alpha/x.txt"), "x");
        write(&src.join("plugin/beta/y.txt"), "y");
        fs::create_dir_all(&dst).unwrap();

        let preserve = strings(&["plugin"]);
        let whitelist = strings(&["alpha"]);
        let rules = CopyRules {
            preserve_dirs: &preserve,
            plugin_whitelist: &whitelist,
        };
        let plan = plan_copy(&src, &dst, &rules).unwrap();
        TreeCopier::new(&FsWriter, None, 0)
            .run(&plan, &mut never_locked, &mut |_, _, _| {})
            .unwrap();

        assert!(dst.join("plugin/alpha/x.txt").is_file());
        assert!(!dst.join("plugin/beta/y.txt").exists());
    }

    #[test]
    fn whitelisted_plugin_ignores_nested_preserve_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("plugins/alpha/config/defaults.ini"), "d");

        let preserve = strings(&["config"]);
        let whitelist = strings(&["alpha"]);
        let rules = CopyRules {
            preserve_dirs: &preserve,
            plugin_whitelist: &whitelist,
        };
        let plan = plan_copy(&src, &dst, &rules).unwrap();
        assert_eq!(plan.file_count(), 1);
    }

    #[test]
    fn preserve_dirs_are_skipped_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src.join("config/settings.ini"), "new");
        write(&src.join("sub/data/save.dat"), "new");
        write(&src.join("sub/keep.txt"), "new");

        let preserve = strings(&["config", "data"]);
        let rules = CopyRules {
            preserve_dirs: &preserve,
            plugin_whitelist: &[],
        };
        let plan = plan_copy(&src, &dir.path().join("dst"), &rules).unwrap();
        let targets: Vec<_> = plan.files.iter().map(|(_, d)| d.clone()).collect();
        assert_eq!(targets, vec![dir.path().join("dst/sub/keep.txt")]);
        assert_eq!(plan.skipped_dirs.len(), 2);
    }

    #[test]
    fn copy_never_overwrites_running_executable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("updater.exe"), "new");
        write(&src.join("app.exe"), "new");
        write(&dst.join("updater.exe"), "running");

        let self_exe = dst.join("updater.exe");
        let rules = CopyRules {
            preserve_dirs: &[],
            plugin_whitelist: &[],
        };
        let plan = plan_copy(&src, &dst, &rules).unwrap();
        let report = TreeCopier::new(&FsWriter, Some(&self_exe), 0)
            .run(&plan, &mut never_locked, &mut |_, _, _| {})
            .unwrap();

        assert_eq!(fs::read_to_string(&self_exe).unwrap(), "running");
        assert_eq!(fs::read_to_string(dst.join("app.exe")).unwrap(), "new");
        assert_eq!(report.skipped_self, vec![self_exe]);
    }

    #[test]
    fn progress_reports_every_file_linearly() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        for name in ["a", "b", "c/d", "c/e"] {
            write(&src.join(name), name);
        }
        let plan = plan_copy(
            &src,
            &dir.path().join("dst"),
            &CopyRules {
                preserve_dirs: &[],
                plugin_whitelist: &[],
            },
        )
        .unwrap();

        let mut seen = Vec::new();
        TreeCopier::new(&FsWriter, None, 0)
            .run(&plan, &mut never_locked, &mut |done, total, _| seen.push((done, total)))
            .unwrap();
        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    /// 처음 `locked_times`번은 공유 위반을 돌려주는 writer
    struct FlakyWriter {
        locked_times: Mutex<u32>,
    }

    impl FileWriter for FlakyWriter {
        fn copy_file(&self, src: &Path, dst: &Path) -> std::result::Result<(), CopyFault> {
            let mut left = self.locked_times.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(CopyFault::Locked(io::Error::new(io::ErrorKind::Other, "sharing violation")));
            }
            FsWriter.copy_file(src, dst)
        }
    }

    fn single_file_plan(dir: &Path) -> CopyPlan {
        let src = dir.join("src");
        write(&src.join("game.dll"), "new");
        plan_copy(
            &src,
            &dir.join("dst"),
            &CopyRules {
                preserve_dirs: &[],
                plugin_whitelist: &[],
            },
        )
        .unwrap()
    }

    #[test]
    fn locked_file_is_retried_then_copied() {
        let dir = tempfile::tempdir().unwrap();
        let plan = single_file_plan(dir.path());
        let writer = FlakyWriter { locked_times: Mutex::new(1) };

        let mut asked = 0;
        let report = TreeCopier::new(&writer, None, 2)
            .run(
                &plan,
                &mut |_| {
                    asked += 1;
                    Ok(LockResolution::Retry)
                },
                &mut |_, _, _| {},
            )
            .unwrap();
        assert_eq!(asked, 1);
        assert_eq!(report.copied, 1);
        assert!(dir.path().join("dst/game.dll").is_file());
    }

    #[test]
    fn exhausted_retries_skip_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let plan = single_file_plan(dir.path());
        let writer = FlakyWriter { locked_times: Mutex::new(10) };

        let report = TreeCopier::new(&writer, None, 2)
            .run(&plan, &mut |_| Ok(LockResolution::Retry), &mut |_, _, _| {})
            .unwrap();
        assert_eq!(report.copied, 0);
        assert_eq!(report.skipped_locked, vec![dir.path().join("dst/game.dll")]);
    }

    #[test]
    fn abort_resolution_fails_the_copy() {
        let dir = tempfile::tempdir().unwrap();
        let plan = single_file_plan(dir.path());
        let writer = FlakyWriter { locked_times: Mutex::new(1) };

        let err = TreeCopier::new(&writer, None, 2)
            .run(&plan, &mut |_| Ok(LockResolution::Abort), &mut |_, _, _| {})
            .unwrap_err();
        assert!(matches!(err, UpdateError::Aborted(_)));
    }

    #[test]
    fn purge_respects_ancestor_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("app.exe"), "x");
        write(&root.join("lib/old.jar"), "x");
        write(&root.join("config/settings.ini"), "x");
        write(&root.join("lib/plugin/pluginXYZ/inner.jar"), "x");
        write(&root.join("lib/configs/other.jar"), "x");

        let excludes = strings(&["config", "plugin"]);
        let removed = delete_stale_files(root, &excludes, None, &[]).unwrap();

        assert_eq!(removed, 3);
        assert!(!root.join("app.exe").exists());
        assert!(!root.join("lib/old.jar").exists());
        assert!(!root.join("lib/configs/other.jar").exists());
        assert!(root.join("config/settings.ini").exists());
        assert!(root.join("lib/plugin/pluginXYZ/inner.jar").exists());
    }

    #[test]
    fn purge_extension_filter_limits_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("lib/old.jar"), "x");
        write(&root.join("native.DLL"), "x");
        write(&root.join("readme.txt"), "x");

        let exts = strings(&["jar", "dll"]);
        let removed = delete_stale_files(root, &[], Some(&exts), &[]).unwrap();
        assert_eq!(removed, 2);
        assert!(root.join("readme.txt").exists());
    }

    #[test]
    fn purge_keeps_listed_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("updater.exe"), "x");
        let keep = vec![dir.path().join("updater.exe")];
        assert_eq!(delete_stale_files(dir.path(), &[], None, &keep).unwrap(), 0);
    }

    #[test]
    fn purge_keeps_listed_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("hs-script_v4.1/lib/new.jar"), "x");
        write(&dir.path().join("lib/old.jar"), "x");
        let keep = vec![dir.path().join("hs-script_v4.1")];
        assert_eq!(delete_stale_files(dir.path(), &[], None, &keep).unwrap(), 1);
        assert!(dir.path().join("hs-script_v4.1/lib/new.jar").exists());
    }

    #[test]
    fn find_file_searches_recursively() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("nested/bin/hs-updater.exe"), "x");
        let found = find_file(dir.path(), std::ffi::OsStr::new("hs-updater.exe"));
        assert_eq!(found, Some(dir.path().join("nested/bin/hs-updater.exe")));
        assert!(find_file(dir.path(), std::ffi::OsStr::new("missing.exe")).is_none());
    }
}
