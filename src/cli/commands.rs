use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::Args;
use time::format_description::well_known::Rfc3339;

use crate::model::{Note, NoteId};
use crate::sync::{Intent, SyncDriver, SyncEngine, SyncPhase};

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show notes whose title or content contains this text (case-insensitive)
    #[arg()]
    pub query: Vec<String>,
    /// Limit the number of notes printed
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct NoteRef {
    /// Note id or a unique prefix of it
    #[arg()]
    pub id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note
    #[arg(long)]
    pub title: Option<String>,
    /// Note content. If omitted, piped stdin is used.
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note id or a unique prefix of it
    pub id: String,
    /// Replace the title
    #[arg(long)]
    pub title: Option<String>,
    /// Replace the content
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note id or a unique prefix of it
    pub id: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

pub fn list_notes(driver: &mut SyncDriver, args: ListArgs) -> Result<()> {
    driver.apply(Intent::Search(args.query.join(" ")));
    let engine = driver.engine();
    let notes: Vec<&Note> = engine
        .visible_notes()
        .into_iter()
        .take(args.limit)
        .collect();
    if notes.is_empty() && !engine.search_query().trim().is_empty() {
        println!("No notes match \"{}\".", engine.search_query().trim());
        return report_status(engine);
    }
    print!("{}", format_note_list(&notes, engine.selected_id()));
    report_status(engine)
}

pub fn show_note(driver: &SyncDriver, args: NoteRef) -> Result<()> {
    let engine = driver.engine();
    let note = match args.id {
        Some(raw) => {
            let id = resolve_id(engine, &raw)?;
            engine.notes().get(&id).context("note vanished")?
        }
        None => engine.selected_note().context("there are no notes")?,
    };
    print!("{}", format_note(note));
    report_status(engine)
}

pub async fn new_note(driver: &mut SyncDriver, args: NewArgs) -> Result<()> {
    let content = match args.content {
        Some(content) => Some(content),
        None => read_stdin()?,
    };

    driver.apply(Intent::Create);
    driver.flush().await;
    let edited = args.title.is_some() || content.is_some();
    if let Some(title) = args.title {
        driver.apply(Intent::EditTitle(title.trim().to_owned()));
    }
    if let Some(content) = content {
        driver.apply(Intent::EditContent(content));
    }
    if edited {
        driver.apply(Intent::Save);
        driver.flush().await;
    }

    let engine = driver.engine();
    if let Some(note) = engine.selected_note() {
        println!("Created note {}", note.id);
    }
    report_status(engine)
}

pub async fn edit_note(driver: &mut SyncDriver, args: EditArgs) -> Result<()> {
    if args.title.is_none() && args.content.is_none() {
        bail!("nothing to change: pass --title and/or --content");
    }
    let id = resolve_id(driver.engine(), &args.id)?;
    driver.apply(Intent::Select(id.clone()));
    if let Some(title) = args.title {
        driver.apply(Intent::EditTitle(title));
    }
    if let Some(content) = args.content {
        driver.apply(Intent::EditContent(content));
    }
    driver.apply(Intent::Save);
    driver.flush().await;
    println!("Updated note {id}");
    report_status(driver.engine())
}

pub async fn delete_note(driver: &mut SyncDriver, args: DeleteArgs) -> Result<()> {
    let id = resolve_id(driver.engine(), &args.id)?;
    if !args.yes {
        let title = driver
            .engine()
            .notes()
            .get(&id)
            .map(display_title)
            .unwrap_or_default();
        let answer = prompt(&format!("Delete \"{title}\"? [y/N]"))?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }
    driver.apply(Intent::Delete(id.clone()));
    driver.flush().await;
    let engine = driver.engine();
    if engine.notes().contains(&id) {
        println!("Delete of {id} was rolled back");
    } else {
        println!("Deleted note {id}");
    }
    report_status(engine)
}

pub fn select_note(driver: &mut SyncDriver, args: NoteRef) -> Result<()> {
    let Some(raw) = args.id else {
        bail!("which note? pass an id or id prefix");
    };
    let id = resolve_id(driver.engine(), &raw)?;
    driver.apply(Intent::Select(id.clone()));
    println!("Selected note {id}");
    report_status(driver.engine())
}

pub fn report_sync(driver: &SyncDriver, configured: bool) -> Result<()> {
    let engine = driver.engine();
    if !configured {
        println!("local-only: no note service configured");
    }
    println!("{} notes", engine.notes().len());
    report_status(engine)
}

/// Print the status line and turn an error status into a failing exit.
fn report_status(engine: &SyncEngine) -> Result<()> {
    let status = engine.status();
    if status.phase() == SyncPhase::Error {
        bail!(
            "sync error: {}",
            status.message().unwrap_or("unknown failure")
        );
    }
    if engine.is_dirty() {
        eprintln!("status: {} (unsaved changes)", status.phase());
    } else {
        eprintln!("status: {}", status.phase());
    }
    Ok(())
}

/// Exact id, or the single note whose id starts with `raw`.
fn resolve_id(engine: &SyncEngine, raw: &str) -> Result<NoteId> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("note id cannot be empty");
    }
    let exact = NoteId::new(raw);
    if engine.notes().contains(&exact) {
        return Ok(exact);
    }
    let mut matches = engine
        .notes()
        .iter()
        .filter(|note| note.id.as_str().starts_with(raw));
    match (matches.next(), matches.next()) {
        (Some(note), None) => Ok(note.id.clone()),
        (None, _) => bail!("no note matches '{raw}'"),
        (Some(_), Some(_)) => bail!("'{raw}' matches more than one note"),
    }
}

fn format_note_list(notes: &[&Note], selected: Option<&NoteId>) -> String {
    if notes.is_empty() {
        return "No notes found.\n".to_string();
    }
    let mut out = String::new();
    for note in notes {
        let marker = if Some(&note.id) == selected { '*' } else { ' ' };
        let _ = writeln!(&mut out, "{marker} {}  {}", note.id, display_title(note));
        let _ = writeln!(&mut out, "    updated {}", format_timestamp(note));
        if let Some(preview) = preview_line(&note.content) {
            let _ = writeln!(&mut out, "    {preview}");
        }
    }
    out
}

fn format_note(note: &Note) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "# {}", display_title(note));
    let _ = writeln!(&mut out, "id       {}", note.id);
    let _ = writeln!(&mut out, "updated  {}", format_timestamp(note));
    out.push('\n');
    out.push_str(&note.content);
    if !note.content.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn display_title(note: &Note) -> String {
    let title = note.title.trim();
    if title.is_empty() {
        "(untitled)".to_string()
    } else {
        title.to_string()
    }
}

fn format_timestamp(note: &Note) -> String {
    note.updated_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| note.updated_at.unix_timestamp().to_string())
}

fn preview_line(content: &str) -> Option<String> {
    const PREVIEW_CHARS: usize = 72;
    let line = content.lines().map(str::trim).find(|line| !line.is_empty())?;
    let mut preview: String = line.chars().take(PREVIEW_CHARS).collect();
    if line.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    Some(preview)
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{} ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("reading confirmation")?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note content from stdin")?;
    Ok((!buf.is_empty()).then_some(buf))
}
