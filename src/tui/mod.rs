//! 터미널 진행 창 (`update --gui`)
//!
//! 창(메인 스레드)과 업데이트 파이프라인(워커 스레드)은 [`ChannelSink`]로만 통신합니다.
//! 창을 먼저 닫아도 파이프라인은 끝까지 실행되고, 그 뒤의 카운트다운은 생략됩니다.

pub mod app;
pub mod render;

use std::io::{self, stdout};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use hs_updater_lib::{ChannelSink, Orchestrator, ProgressEvent, UpdateReport, UpdateRequest, UpdateSettings};

use app::{WindowState, FAILURE_LINGER};

const TICK: Duration = Duration::from_millis(50);

// ═══════════════════════════════════════════════════════
// 엔트리포인트
// ═══════════════════════════════════════════════════════

/// 진행 창을 띄우고 워커 스레드에서 업데이트 실행
pub fn run_update(settings: &UpdateSettings, request: &UpdateRequest) -> anyhow::Result<UpdateReport> {
    let (sink, events) = ChannelSink::channel();
    let title = window_title(request);

    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("update-pipeline".into())
            .spawn_scoped(scope, move || {
                Orchestrator::new(settings, &sink)
                    .with_prompt(&sink)
                    .run(request)
            })?;

        if let Err(e) = run_window(events, title) {
            tracing::warn!("[Window] Progress window failed: {}", e);
        }

        let report = worker
            .join()
            .map_err(|_| anyhow!("update pipeline thread panicked"))??;
        Ok(report)
    })
}

fn window_title(request: &UpdateRequest) -> String {
    let name = request
        .main_program
        .as_deref()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hs-script".into());
    format!("{} updater", name)
}

/// 창이 떠 있는 동안만 유효한 패닉 훅
///
/// 패닉 시 `cleanup`을 먼저 실행한 뒤 이전 훅으로 넘기고, drop 시 이전 훅을 되돌립니다.
struct PanicHookGuard {
    restore: Option<Box<dyn FnOnce()>>,
}

impl PanicHookGuard {
    fn install(cleanup: fn()) -> Self {
        let previous = Arc::new(std::panic::take_hook());
        let chained = Arc::clone(&previous);
        std::panic::set_hook(Box::new(move |info| {
            cleanup();
            (*chained)(info);
        }));

        let restore = move || {
            // 우리 훅을 내려야 `chained` 참조가 풀림
            drop(std::panic::take_hook());
            match Arc::try_unwrap(previous) {
                Ok(hook) => std::panic::set_hook(hook),
                Err(_) => tracing::warn!("[Window] Panic hook was replaced elsewhere, leaving default"),
            }
        };
        Self {
            restore: Some(Box::new(restore)),
        }
    }
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

/// 파이프라인이 끝날 때까지 창 유지. 실패하면 키 입력이나 시간 초과까지 오류를 보여줌
fn run_window(events: Receiver<ProgressEvent>, title: String) -> anyhow::Result<()> {
    let _hook = PanicHookGuard::install(restore_terminal);

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut state = WindowState::new(title);
    let result = event_loop(&mut terminal, &mut state, &events, FAILURE_LINGER);

    // ── 정리 ──────────────────────────────────────────
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &mut WindowState,
    events: &Receiver<ProgressEvent>,
    failure_linger: Duration,
) -> anyhow::Result<()> {
    loop {
        while state.finished_at.is_none() {
            match events.try_recv() {
                Ok(event) => state.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    state.pipeline_finished(Instant::now());
                    if state.awaiting_dismissal() {
                        tracing::debug!("[Window] Pipeline failed, waiting for key press");
                    }
                }
            }
        }
        let now = Instant::now();
        state.expire_modal(now);

        terminal.draw(|f| render::render(state, f))?;

        if state.finished_at.is_some() && state.should_close(now, failure_linger) {
            tracing::debug!("[Window] Pipeline finished, closing window");
            return Ok(());
        }

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                // Release/Repeat 이벤트 무시
                if key.kind == KeyEventKind::Press {
                    state.handle_key(key);
                }
            }
        }

        if state.quit {
            if state.finished_at.is_none() {
                tracing::info!("[Window] Closed by user, update continues in background");
            }
            return Ok(());
        }
    }
}
