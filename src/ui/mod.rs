use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, EditorField};
use crate::config::{AppConfig, CardPalette, Rgb};
use crate::notes::{render_content, Note};

const ELLIPSIS: &str = "…";

pub fn draw_app(frame: &mut Frame, state: &AppState, config: &AppConfig) {
    let palette = CardPalette::for_name(config.cards.palette);
    let area = frame.size();
    frame.render_widget(
        Block::default().style(Style::default().bg(color(palette.background))),
        area,
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(area);

    if state.is_editing() {
        render_editor(frame, state, &palette, vertical[0]);
    } else {
        render_cards(frame, state, &palette, vertical[0]);
    }
    render_status(frame, state, &palette, vertical[1]);

    if state.pending_delete().is_some() {
        render_delete_overlay(frame, state, &palette);
    }
}

fn color(rgb: Rgb) -> Color {
    let Rgb(r, g, b) = rgb;
    Color::Rgb(r, g, b)
}

fn card_style(palette: &CardPalette) -> Style {
    Style::default()
        .bg(color(palette.card))
        .fg(color(palette.text))
}

fn render_cards(frame: &mut Frame, state: &AppState, palette: &CardPalette, area: Rect) {
    let cards = state.cards();
    if cards.is_empty() {
        let empty = Paragraph::new("No notes yet. Press 'a' to add one.")
            .style(Style::default().fg(color(palette.text)))
            .wrap(Wrap { trim: true });
        frame.render_widget(empty, area);
        return;
    }

    let columns = state.columns();
    let card_height = (state.preview_lines() as u16).saturating_add(2).max(3);
    let visible_rows = usize::from((area.height / card_height).max(1));
    let selected_row = state.selected_index() / columns;
    let first_row = selected_row.saturating_sub(visible_rows - 1);

    for (row_offset, row) in cards
        .chunks(columns)
        .skip(first_row)
        .take(visible_rows)
        .enumerate()
    {
        let row_area = Rect {
            x: area.x,
            y: area.y + row_offset as u16 * card_height,
            width: area.width,
            height: card_height.min(area.height.saturating_sub(row_offset as u16 * card_height)),
        };
        let slots = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, columns as u32); columns])
            .split(row_area);
        for (col, note) in row.iter().enumerate() {
            let index = (first_row + row_offset) * columns + col;
            let selected = index == state.selected_index();
            render_card(frame, note, selected, state.preview_lines(), palette, slots[col]);
        }
    }
}

fn render_card(
    frame: &mut Frame,
    note: &Note,
    selected: bool,
    preview_lines: usize,
    palette: &CardPalette,
    area: Rect,
) {
    let inner_width = usize::from(area.width.saturating_sub(4));
    let title = if note.title.trim().is_empty() {
        "Untitled".to_string()
    } else {
        truncate_to_width(&note.title, inner_width)
    };
    let mut border_style = Style::default().fg(color(palette.text));
    let mut title_style = Style::default().add_modifier(Modifier::BOLD);
    if selected {
        border_style = Style::default()
            .fg(color(palette.accent))
            .add_modifier(Modifier::BOLD);
        title_style = title_style.fg(color(palette.accent));
    }

    let rendered = render_content(&note.content);
    let lines: Vec<Line> = rendered
        .lines()
        .take(preview_lines)
        .map(|line| Line::from(line.to_string()))
        .collect();
    let card = Paragraph::new(Text::from(lines))
        .style(card_style(palette))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(Span::styled(format!(" {title} "), title_style)),
        );
    frame.render_widget(card, area);
}

fn render_editor(frame: &mut Frame, state: &AppState, palette: &CardPalette, area: Rect) {
    let Some(draft) = state.editor().draft() else {
        return;
    };
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let fields = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(halves[0]);

    let focused = Style::default()
        .fg(color(palette.accent))
        .add_modifier(Modifier::BOLD);
    let unfocused = Style::default().fg(color(palette.text));
    let (title_border, content_border) = match state.field() {
        EditorField::Title => (focused, unfocused),
        EditorField::Content => (unfocused, focused),
    };
    let heading = if draft.is_draft() { "New note" } else { "Title" };

    let title = Paragraph::new(draft.title.as_str())
        .style(card_style(palette))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(title_border)
                .title(heading),
        );
    frame.render_widget(title, fields[0]);

    let content = Paragraph::new(draft.content.as_str())
        .style(card_style(palette))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(content_border)
                .title("Content"),
        );
    frame.render_widget(content, fields[1]);

    let preview = Paragraph::new(render_content(&draft.content))
        .style(card_style(palette))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(unfocused)
                .title(format!("Preview · updated {}", draft.updated_at.label())),
        );
    frame.render_widget(preview, halves[1]);

    let (field_area, text) = match state.field() {
        EditorField::Title => (fields[0], draft.title.as_str()),
        EditorField::Content => (fields[1], draft.content.as_str()),
    };
    let line_count = text.split('\n').count().max(1) as u16;
    let last_line = text.rsplit('\n').next().unwrap_or_default();
    let x = field_area.x + 1 + last_line.width() as u16;
    let y = field_area.y + line_count;
    if x < field_area.right().saturating_sub(1) && y < field_area.bottom().saturating_sub(1) {
        frame.set_cursor(x, y);
    }
}

fn render_status(frame: &mut Frame, state: &AppState, palette: &CardPalette, area: Rect) {
    let help = if state.pending_delete().is_some() {
        "y/Enter delete • n/Esc keep"
    } else if state.is_editing() && state.editor().can_delete() {
        "Tab switch field • Ctrl-s save • Ctrl-d delete • Esc close"
    } else if state.is_editing() {
        "Tab switch field • Ctrl-s save • Esc close"
    } else {
        "←↓↑→/hjkl move • Enter open • a add • q quit"
    };
    let message = match (state.editor().notice(), state.status_message()) {
        (Some(notice), _) => Span::styled(
            notice.to_string(),
            Style::default()
                .fg(color(palette.error))
                .add_modifier(Modifier::BOLD),
        ),
        (None, Some(status)) => {
            Span::styled(status.to_string(), Style::default().fg(color(palette.text)))
        }
        (None, None) => Span::raw(""),
    };
    let count = state.list().len();
    let footer = Paragraph::new(vec![
        Line::from(message),
        Line::from(Span::styled(
            format!("{count} note(s) • {help}"),
            Style::default()
                .fg(color(palette.text))
                .add_modifier(Modifier::DIM),
        )),
    ]);
    frame.render_widget(footer, area);
}

fn render_delete_overlay(frame: &mut Frame, state: &AppState, palette: &CardPalette) {
    let Some(prompt) = state.pending_delete() else {
        return;
    };
    let area = centered_rect(50, 30, frame.size());
    frame.render_widget(Clear, area);
    let title = if prompt.title.trim().is_empty() {
        "Untitled".to_string()
    } else {
        truncate_to_width(&prompt.title, usize::from(area.width.saturating_sub(4)))
    };
    let paragraph = Paragraph::new(vec![
        Line::from(Span::styled(
            "Delete this note?",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(title),
        Line::from(""),
        Line::from(Span::styled(
            "y/Enter to delete • n/Esc to keep",
            Style::default().add_modifier(Modifier::DIM),
        )),
    ])
    .style(card_style(palette))
    .block(
        Block::default()
            .title("Delete Note")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color(palette.error))),
    )
    .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let budget = max_width.saturating_sub(ELLIPSIS.width());
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let width = grapheme.width();
        if used + width > budget {
            break;
        }
        used += width;
        out.push_str(grapheme);
    }
    out.push_str(ELLIPSIS);
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::repository::DEFAULT_COLLECTION;
    use crate::notes::NoteRepository;
    use crate::store::MemoryStore;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::sync::Arc;

    fn render(state: &AppState) -> anyhow::Result<String> {
        let mut terminal = Terminal::new(TestBackend::new(80, 20))?;
        let config = AppConfig::default();
        terminal.draw(|frame| draw_app(frame, state, &config))?;
        let buffer = terminal.backend().buffer();
        let width = usize::from(buffer.area.width);
        let rows: Vec<String> = buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect();
        Ok(rows.join("\n"))
    }

    fn state_with_note(confirm_delete: bool) -> anyhow::Result<(NoteRepository, AppState)> {
        let repo = NoteRepository::new(Arc::new(MemoryStore::new()), DEFAULT_COLLECTION);
        repo.create("Groceries", "- milk\n- eggs")?;
        let mut state = AppState::new(2, 4, confirm_delete);
        state.apply_snapshot(repo.fetch_all()?);
        Ok((repo, state))
    }

    #[test]
    fn card_grid_shows_rendered_preview() -> anyhow::Result<()> {
        let (_repo, state) = state_with_note(true)?;
        let screen = render(&state)?;
        assert!(screen.contains("Groceries"));
        assert!(screen.contains("● Milk"));
        assert!(screen.contains("● Eggs"));
        assert!(!screen.contains("- milk"));
        Ok(())
    }

    #[test]
    fn editor_shows_raw_text_beside_preview() -> anyhow::Result<()> {
        let (_repo, mut state) = state_with_note(true)?;
        state.open_selected();
        let screen = render(&state)?;
        assert!(screen.contains("- milk"));
        assert!(screen.contains("● Milk"));
        Ok(())
    }

    #[test]
    fn delete_hint_only_shown_for_stored_notes() -> anyhow::Result<()> {
        let (_repo, mut state) = state_with_note(true)?;
        state.open_new();
        let draft_screen = render(&state)?;
        assert!(draft_screen.contains("Ctrl-s save"));
        assert!(!draft_screen.contains("Ctrl-d"));

        state.close_editor();
        state.open_selected();
        let stored_screen = render(&state)?;
        assert!(stored_screen.contains("Ctrl-d delete"));
        Ok(())
    }

    #[test]
    fn delete_prompt_renders_overlay() -> anyhow::Result<()> {
        let (repo, mut state) = state_with_note(true)?;
        state.open_selected();
        state.request_delete(&repo)?;
        let screen = render(&state)?;
        assert!(screen.contains("Delete this note?"));
        Ok(())
    }

    #[test]
    fn empty_list_shows_hint() -> anyhow::Result<()> {
        let state = AppState::new(2, 4, true);
        let screen = render(&state)?;
        assert!(screen.contains("No notes yet"));
        Ok(())
    }

    #[test]
    fn truncation_respects_display_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_to_width("日本語テキスト", 5), "日本…");
    }
}
