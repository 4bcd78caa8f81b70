//! worklog journal command implementations.
//!
//! Entries are written and listed as the resolved user; nobody reads another
//! user's journal.

use chrono::NaiveDate;

use crate::cli::{GlobalOptions, Workspace};
use crate::error::{Error, Result};
use crate::journal::{Emotion, Entry, NewEntry};
use crate::output::{emit_success, Report};

pub struct AddOptions {
    pub text: String,
    pub occasion: Option<String>,
    pub emotions: Vec<String>,
    pub globals: GlobalOptions,
}

pub struct ListOptions {
    pub limit: Option<usize>,
    pub globals: GlobalOptions,
}

#[derive(serde::Serialize)]
struct JournalListOutput {
    user: String,
    total: usize,
    entries: Vec<Entry>,
}

#[derive(serde::Serialize)]
struct EmotionListOutput {
    total: usize,
    emotions: Vec<Emotion>,
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let occasion = options.occasion.as_deref().map(parse_occasion).transpose()?;

    let ws = Workspace::open(&options.globals)?;
    let user = ws.user(&options.globals)?;
    let entry = ws.storage.update_journal(|journal| {
        journal.add_entry(NewEntry {
            user: user.clone(),
            occasion,
            text: options.text.clone(),
            emotions: options.emotions.clone(),
        })
    })?;
    tracing::info!(entry = %entry.id, user = %entry.user, occasion = %entry.occasion, "journal entry added");

    let mut human = Report::new("Journal entry added");
    human.field("ID", entry.id.to_string());
    human.field("Occasion", entry.occasion.to_string());
    if !entry.emotions.is_empty() {
        human.field("Emotions", entry.emotions.join(", "));
    }
    human.next_step("worklog journal ls");

    emit_success(options.globals.output(), "journal add", &entry, Some(&human))
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let user = ws.user(&options.globals)?;
    let journal = ws.storage.read_journal()?;

    let mine = journal.my_entries(&user);
    let total = mine.len();
    let entries: Vec<Entry> = mine
        .into_iter()
        .take(options.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    let mut human = Report::new(format!("Journal of {user}"));
    human.field("Total", total.to_string());
    for entry in &entries {
        human.journal_row(entry);
    }
    if total == 0 {
        human.next_step("worklog journal add <text>");
    }

    let output = JournalListOutput {
        user,
        total,
        entries,
    };
    emit_success(options.globals.output(), "journal ls", &output, Some(&human))
}

pub fn run_emotions(globals: GlobalOptions) -> Result<()> {
    let ws = Workspace::open(&globals)?;
    let emotions = ws.storage.read_journal()?.emotions;

    let mut human = Report::new("Emotions");
    human.field("Total", emotions.len().to_string());
    for emotion in &emotions {
        human.row(emotion.name.clone());
    }

    let output = EmotionListOutput {
        total: emotions.len(),
        emotions,
    };
    emit_success(globals.output(), "journal emotions", &output, Some(&human))
}

fn parse_occasion(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidArgument(format!("Invalid occasion '{raw}'. Expected YYYY-MM-DD"))
    })
}
