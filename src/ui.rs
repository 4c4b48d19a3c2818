use crate::app::{ActiveInput, App, InputMode, Row, RowDisplay};
use crate::countdown::TickEvent;
use chrono::Local;
use crossterm::event::{self, Event as CEvent};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn percent_of(length: u16, percent: u16) -> u16 {
    (u32::from(length) * u32::from(percent) / 100) as u16
}

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length((r.width.saturating_sub(width)) / 2),
                Constraint::Length(width),
                Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn get_legend(input_mode: &InputMode) -> Line<'static> {
    let keys: &[(&str, &str)] = match input_mode {
        InputMode::Normal => &[
            (" q ", ": Quit "),
            (" j ", ": Down "),
            (" k ", ": Up "),
            (" a ", ": Add Task "),
            (" f ", ": Finish "),
            (" d ", ": Delete "),
        ],
        InputMode::Editing => &[
            (" i ", ": Insert "),
            (" Tab ", ": Switch Field "),
            (" Enter ", ": Submit "),
            (" Esc ", ": Cancel "),
        ],
        InputMode::Insert => &[(" Tab ", ": Switch Field "), (" Esc ", ": Done Typing ")],
        InputMode::ConfirmDelete => &[(" y ", ": Delete "), (" n ", ": Keep ")],
    };

    let mut spans = Vec::new();
    for (key, action) in keys {
        spans.push(Span::styled(*key, Style::default().fg(Color::Red)));
        spans.push(Span::raw(*action));
    }
    Line::from(spans)
}

fn row_item(row: &Row, timestamp_format: &str) -> ListItem<'static> {
    let title = if row.display == RowDisplay::Finished {
        vec![
            Span::styled("DONE ", Style::default().fg(Color::Green)),
            Span::styled(
                row.task.task.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]
    } else {
        vec![Span::styled(
            row.task.task.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )]
    };

    let deadline = row
        .task
        .deadline
        .with_timezone(&Local)
        .format(timestamp_format)
        .to_string();

    ListItem::new(Text::from(vec![
        Line::from(title),
        Line::from(Span::styled(
            format!("Added on: {}", row.task.timestamp),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(vec![
            Span::styled("Deadline: ", Style::default().fg(Color::Yellow)),
            Span::styled(deadline, Style::default().fg(Color::Yellow)),
            Span::raw("  "),
            Span::styled(row.countdown_text(), Style::default().fg(Color::Red)),
        ]),
    ]))
}

fn draw_task_list(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)].as_ref())
        .split(area);

    // Left panel: Task list
    let tasks_widget = if !app.rows.is_empty() {
        let items: Vec<ListItem> = app
            .rows
            .iter()
            .map(|row| row_item(row, app.timestamp_format()))
            .collect();

        List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Tasks"))
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ")
    } else {
        List::new(vec![ListItem::new("No tasks yet. Press 'a' to add one")])
            .block(Block::default().borders(Borders::ALL).title("Tasks"))
    };

    f.render_stateful_widget(tasks_widget, chunks[0], &mut app.state);

    // Right panel: Task details
    let detail_block = Block::default().borders(Borders::ALL).title("Task Details");

    let paragraph = match app.selected_row() {
        Some(row) => {
            let bold = Style::default().add_modifier(Modifier::BOLD);
            let deadline = row
                .task
                .deadline
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string();
            let state = match row.display {
                RowDisplay::Finished => "Finished",
                RowDisplay::Expired => "Expired",
                _ => "Running",
            };
            let lines = vec![
                Line::from(vec![Span::styled("Task: ", bold), Span::raw(row.task.task.clone())]),
                Line::from(vec![Span::styled("Id: ", bold), Span::raw(row.task.id.to_string())]),
                Line::from(vec![
                    Span::styled("Added on: ", bold),
                    Span::raw(row.task.timestamp.clone()),
                ]),
                Line::from(vec![Span::styled("Deadline: ", bold), Span::raw(deadline)]),
                Line::from(vec![Span::styled("State: ", bold), Span::raw(state)]),
                Line::from(Span::styled(row.countdown_text(), Style::default().fg(Color::Red))),
            ];
            Paragraph::new(lines)
        }
        None => Paragraph::new("Select a task to view its details"),
    };
    f.render_widget(paragraph.block(detail_block).wrap(Wrap { trim: true }), chunks[1]);
}

fn draw_form(f: &mut Frame, app: &App, area: Rect) {
    let popup_width = percent_of(area.width, 60).saturating_sub(2).max(10);

    let title_lines = calculate_wrapped_lines(&app.new_task_title, popup_width.saturating_sub(2));
    let title_height = std::cmp::max(title_lines as u16, 1) + 2;

    let popup_height = std::cmp::min(title_height + 3 + 2, area.height);
    let popup_area = centered_rect_absolute(popup_width + 2, popup_height, area);

    let block_title = match app.input_mode {
        InputMode::Insert => "New Task (typing, Esc when done)",
        _ => "New Task (Press Enter to Submit)",
    };
    let popup_block = Block::default()
        .title(block_title)
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Green));

    f.render_widget(Clear, popup_area);
    let inner = popup_block.inner(popup_area);
    f.render_widget(popup_block, popup_area);

    let fields = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(title_height), Constraint::Length(3)].as_ref())
        .split(inner);

    let field_style = |active: bool| {
        if active {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::White)
        }
    };

    let title_input = Paragraph::new(app.new_task_title.as_str())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Task")
                .border_style(field_style(app.active_input == ActiveInput::Title)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(title_input, fields[0]);

    let deadline_input = Paragraph::new(app.new_task_deadline.as_str())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Deadline (2024-06-01T17:30, +1d2h, in 45m)")
                .border_style(field_style(app.active_input == ActiveInput::Deadline)),
        );
    f.render_widget(deadline_input, fields[1]);
}

fn draw_confirm(f: &mut Frame, app: &App, area: Rect) {
    let message = app.status.clone().unwrap_or_default();
    let popup_width = percent_of(area.width, 60).max(20);
    let lines = calculate_wrapped_lines(&message, popup_width.saturating_sub(2)).max(1);
    let popup_area = centered_rect_absolute(popup_width, lines as u16 + 2, area);

    let popup = Paragraph::new(message)
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title("Delete Task")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Red)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, popup_area);
    f.render_widget(popup, popup_area);
}

pub fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();

    // Split the main layout into body and footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([Constraint::Min(0), Constraint::Length(2)].as_ref())
        .split(size);

    let body_chunk = chunks[0];
    let footer_chunk = chunks[1];

    draw_task_list(f, app, body_chunk);
    match app.input_mode {
        InputMode::Normal => {}
        InputMode::Editing | InputMode::Insert => draw_form(f, app, body_chunk),
        InputMode::ConfirmDelete => draw_confirm(f, app, body_chunk),
    }

    // Legend and the latest status message in the footer
    let mut footer = vec![get_legend(&app.input_mode)];
    if let Some(status) = &app.status {
        footer.push(Line::from(Span::styled(
            status.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    let legend = Paragraph::new(footer)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });

    f.render_widget(legend, footer_chunk);
}

pub fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut ticks: UnboundedReceiver<TickEvent>,
) -> io::Result<()> {
    loop {
        while let Ok(tick) = ticks.try_recv() {
            app.on_tick(tick);
        }

        terminal.draw(|f| draw(f, &mut app))?;

        // Handle input
        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if app.handle_input(key) {
                    return Ok(());
                }
            }
        }
    }
}

fn calculate_wrapped_lines(text: &str, max_width: u16) -> usize {
    let max_width = max_width.max(1) as usize;
    let mut line_count = 0;
    for line in text.lines() {
        let line_width = line.chars().count();
        line_count += line_width.div_ceil(max_width).max(1);
    }
    line_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::TickerRegistry;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::{MemoryKeyValue, TaskStore};
    use chrono::TimeZone;
    use ratatui::backend::TestBackend;
    use tokio::sync::mpsc;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for row in buffer.content.chunks(buffer.area.width as usize) {
            for cell in row {
                text.push_str(cell.symbol());
            }
            text.push('\n');
        }
        text
    }

    fn app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(
            Box::new(TaskStore::open(MemoryKeyValue::new()).unwrap()),
            Box::new(RecordingNotifier::default()),
            TickerRegistry::new(Duration::from_secs(1), tx),
            "%Y-%m-%d %H:%M",
        )
    }

    #[test]
    fn test_calculate_wrapped_lines() {
        assert_eq!(calculate_wrapped_lines("", 10), 0);
        assert_eq!(calculate_wrapped_lines("short", 10), 1);
        assert_eq!(calculate_wrapped_lines("exactly ten", 10), 2);
        assert_eq!(calculate_wrapped_lines("a\n\nb", 10), 3);
    }

    #[tokio::test]
    async fn test_draws_empty_list_and_legend() {
        let mut app = app();
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();

        terminal.draw(|f| draw(f, &mut app)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("No tasks yet"));
        assert!(text.contains(": Add Task"));
    }

    #[tokio::test]
    async fn test_draws_task_row_with_countdown() {
        let mut app = app();
        let now = Local.with_ymd_and_hms(2030, 1, 15, 12, 0, 0).unwrap();
        app.new_task_title = "Buy milk".to_string();
        app.new_task_deadline = "+2d".to_string();
        assert!(app.submit(now));
        let mut terminal = Terminal::new(TestBackend::new(120, 20)).unwrap();

        terminal.draw(|f| draw(f, &mut app)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("Buy milk"));
        assert!(text.contains("Added on: 2030-01-15 12:00"));
        assert!(text.contains("Countdown: 2d 0h 0m 0s"));

        let (id, deadline) = (app.rows[0].task.id, app.rows[0].task.deadline);
        app.on_tick(TickEvent {
            id,
            at: deadline - chrono::Duration::milliseconds(90_061_000),
        });
        terminal.draw(|f| draw(f, &mut app)).unwrap();

        assert!(buffer_text(&terminal).contains("Countdown: 1d 1h 1m 1s"));
    }

    #[tokio::test]
    async fn test_draws_popups_on_very_wide_terminal() {
        let mut app = app();
        app.input_mode = InputMode::Editing;
        app.new_task_title = "Walk dog".to_string();
        let mut terminal = Terminal::new(TestBackend::new(1200, 30)).unwrap();

        terminal.draw(|f| draw(f, &mut app)).unwrap();
        assert!(buffer_text(&terminal).contains("New Task"));

        app.input_mode = InputMode::ConfirmDelete;
        app.status = Some("Delete \"Walk dog\"? (y/n)".to_string());
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        assert!(buffer_text(&terminal).contains("Delete Task"));
    }

    #[test]
    fn test_percent_of_wide_lengths() {
        assert_eq!(percent_of(100, 60), 60);
        assert_eq!(percent_of(1200, 60), 720);
        assert_eq!(percent_of(u16::MAX, 60), 39321);
    }

    #[tokio::test]
    async fn test_draws_form_popup() {
        let mut app = app();
        app.input_mode = InputMode::Editing;
        app.new_task_title = "Walk dog".to_string();
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();

        terminal.draw(|f| draw(f, &mut app)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("New Task"));
        assert!(text.contains("Walk dog"));
        assert!(text.contains(": Submit"));
    }
}
