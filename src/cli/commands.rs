use std::fmt::Write as _;

use anyhow::{Context, Result};

use crate::app::App;
use crate::notes::{render_content, Note, NoteList, NoteRepository};

const SNIPPET_CHARS: usize = 160;

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn list_notes(repo: &NoteRepository) -> Result<()> {
    let mut list = NoteList::new();
    list.apply_snapshot(repo.fetch_all().context("reading notes")?);
    print!("{}", format_note_list(&list.sorted_view()));
    Ok(())
}

fn format_note_list(notes: &[&Note]) -> String {
    if notes.is_empty() {
        return "No notes yet.\n".to_string();
    }
    let mut out = String::new();
    for note in notes {
        let title = if note.title.trim().is_empty() {
            "<untitled>"
        } else {
            note.title.as_str()
        };
        let _ = writeln!(&mut out, "#{}  {}", note.id, title);
        let _ = writeln!(&mut out, "    updated {}", note.updated_at.label());
        if let Some(snippet) = build_snippet(&note.content) {
            let _ = writeln!(&mut out, "    {snippet}");
        }
        out.push('\n');
    }
    out
}

fn build_snippet(content: &str) -> Option<String> {
    let rendered = render_content(content);
    let segments: Vec<&str> = rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join(" ").chars().take(SNIPPET_CHARS).collect())
    }
}
