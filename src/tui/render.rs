//! 진행 창 렌더링 — 제목, 상태, 게이지, 상세 로그, 결과 배너, 확인 대화상자

use std::time::Instant;

use ratatui::prelude::*;
use ratatui::widgets::{Block, BorderType, Borders, Clear, Gauge, Paragraph, Wrap};

use super::app::{Modal, Outcome, WindowState};

fn border() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn title() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

pub fn render(state: &WindowState, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // 상태
            Constraint::Length(3), // 게이지
            Constraint::Min(5),    // 상세 로그
            Constraint::Length(3), // 결과 배너
            Constraint::Length(1), // 힌트
        ])
        .split(frame.area());

    let status = Paragraph::new(state.status.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border())
            .title(Span::styled(format!(" {} ", state.title), title())),
    );
    frame.render_widget(status, chunks[0]);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).border_style(border()))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(state.percent.min(100));
    frame.render_widget(gauge, chunks[1]);

    render_details(state, frame, chunks[2]);
    render_banner(&state.outcome, frame, chunks[3]);

    let hint = if state.modal.is_some() {
        " y: retry   n: skip file   a: abort update"
    } else if state.awaiting_dismissal() {
        " Press any key to close"
    } else {
        " q/Esc: close window"
    };
    frame.render_widget(Paragraph::new(Span::styled(hint, border())), chunks[4]);

    if let Some(modal) = &state.modal {
        render_modal(modal, frame);
    }
}

fn render_details(state: &WindowState, frame: &mut Frame, area: Rect) {
    // 마지막 줄이 항상 보이도록 아래쪽만 표시
    let visible = area.height.saturating_sub(2) as usize;
    let skip = state.details.len().saturating_sub(visible);
    let lines: Vec<Line> = state
        .details
        .iter()
        .skip(skip)
        .map(|l| Line::from(l.as_str()))
        .collect();
    let details = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border())
            .title(" Details "),
    );
    frame.render_widget(details, area);
}

fn render_banner(outcome: &Outcome, frame: &mut Frame, area: Rect) {
    let (text, style) = match outcome {
        Outcome::Running => return,
        Outcome::Failed(message) => (
            format!("✗ {}", message),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Outcome::Succeeded(message) => (
            format!("✓ {}", message),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
    };
    let banner = Paragraph::new(Span::styled(text, style))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(style));
    frame.render_widget(banner, area);
}

fn render_modal(modal: &Modal, frame: &mut Frame) {
    let area = frame.area();
    let question_lines = modal.question.lines().count() as u16;
    let height = (question_lines + 5).min(area.height.saturating_sub(2));
    let width = 70.min(area.width.saturating_sub(4));
    let popup = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    );

    let mut lines: Vec<Line> = modal.question.lines().map(Line::from).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("[y]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::raw(" yes   "),
        Span::styled("[n]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::raw(" no   "),
        Span::styled("[a]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            " abort      (default in {}s)",
            modal.remaining(Instant::now()).as_secs()
        )),
    ]));

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" File in use "),
        ),
        popup,
    );
}
