//! Personal journal.
//!
//! A journal entry is a dated text written by one user, optionally tagged with
//! emotions. Emotions form a shared vocabulary of unique names; tagging an
//! entry with a name the journal has not seen yet adds it. Each user only
//! reads their own entries, newest occasion first.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Longest entry text accepted, in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

const MAX_EMOTION_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emotion {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub user: String,
    pub occasion: NaiveDate,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emotions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Journal::add_entry`]
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub user: String,
    /// Defaults to today's local date
    pub occasion: Option<NaiveDate>,
    pub text: String,
    pub emotions: Vec<String>,
}

/// Emotions and entries of every user, persisted as one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Sorted by name
    #[serde(default)]
    pub emotions: Vec<Emotion>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Journal {
    pub fn add_entry(&mut self, input: NewEntry) -> Result<Entry> {
        self.add_entry_at(input, Utc::now(), Local::now().date_naive())
    }

    pub fn add_entry_at(
        &mut self,
        input: NewEntry,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Entry> {
        let user = input.user.trim();
        if user.is_empty() {
            return Err(Error::InvalidArgument(
                "journal entries need an author".to_string(),
            ));
        }
        let text = input.text.trim();
        if text.is_empty() {
            return Err(Error::InvalidArgument(
                "journal entry text cannot be empty".to_string(),
            ));
        }
        let chars = text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(Error::InvalidArgument(format!(
                "journal entry is {chars} characters (max {MAX_TEXT_CHARS})"
            )));
        }

        let mut emotions: Vec<String> = Vec::new();
        for raw in &input.emotions {
            let name = emotion_name(raw)?;
            if !emotions.iter().any(|e| e == name) {
                emotions.push(name.to_string());
            }
        }
        // Validate everything before touching the vocabulary.
        for name in &emotions {
            self.register_emotion(name, now);
        }

        let entry = Entry {
            id: Uuid::new_v4(),
            user: user.to_string(),
            occasion: input.occasion.unwrap_or(today),
            text: text.to_string(),
            emotions,
            created_at: now,
            updated_at: now,
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Add a name to the vocabulary. Names are unique.
    pub fn add_emotion(&mut self, name: &str) -> Result<Emotion> {
        let name = emotion_name(name)?;
        if self.emotion(name).is_some() {
            return Err(Error::AlreadyExists(format!("emotion '{name}'")));
        }
        Ok(self.register_emotion(name, Utc::now()))
    }

    pub fn emotion(&self, name: &str) -> Option<&Emotion> {
        self.emotions.iter().find(|e| e.name == name)
    }

    /// `user`'s entries, latest occasion first. Entries on the same day keep
    /// newest-written first.
    pub fn my_entries(&self, user: &str) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.iter().filter(|e| e.user == user).collect();
        entries.sort_by(|a, b| {
            b.occasion
                .cmp(&a.occasion)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        entries
    }

    fn register_emotion(&mut self, name: &str, now: DateTime<Utc>) -> Emotion {
        match self.emotions.binary_search_by(|e| e.name.as_str().cmp(name)) {
            Ok(index) => self.emotions[index].clone(),
            Err(index) => {
                let emotion = Emotion {
                    name: name.to_string(),
                    created_at: now,
                };
                self.emotions.insert(index, emotion.clone());
                emotion
            }
        }
    }
}

fn emotion_name(raw: &str) -> Result<&str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument("emotion name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_EMOTION_CHARS {
        return Err(Error::InvalidArgument(format!(
            "emotion name longer than {MAX_EMOTION_CHARS} characters"
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 18, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn entry(user: &str, text: &str) -> NewEntry {
        NewEntry {
            user: user.to_string(),
            text: text.to_string(),
            ..NewEntry::default()
        }
    }

    #[test]
    fn occasion_defaults_to_today() {
        let mut journal = Journal::default();
        let added = journal
            .add_entry_at(entry("alice", "  quiet day "), now(), day(6))
            .unwrap();
        assert_eq!(added.occasion, day(6));
        assert_eq!(added.text, "quiet day");

        let dated = NewEntry {
            occasion: Some(day(1)),
            ..entry("alice", "catching up")
        };
        assert_eq!(journal.add_entry_at(dated, now(), day(6)).unwrap().occasion, day(1));
    }

    #[test]
    fn entries_need_author_and_text() {
        let mut journal = Journal::default();
        assert!(matches!(
            journal.add_entry_at(entry(" ", "text"), now(), day(6)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            journal.add_entry_at(entry("alice", "\n\t"), now(), day(6)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(journal.entries.is_empty());
    }

    #[test]
    fn text_is_capped_in_characters() {
        let mut journal = Journal::default();
        let at_limit = "é".repeat(MAX_TEXT_CHARS);
        assert!(journal.add_entry_at(entry("alice", &at_limit), now(), day(6)).is_ok());

        let over = "x".repeat(MAX_TEXT_CHARS + 1);
        let err = journal
            .add_entry_at(entry("alice", &over), now(), day(6))
            .unwrap_err();
        assert!(err.to_string().contains("max 5000"));
        assert_eq!(journal.entries.len(), 1);
    }

    #[test]
    fn my_entries_are_own_and_latest_first() {
        let mut journal = Journal::default();
        for (user, d) in [("alice", 2), ("bob", 9), ("alice", 7), ("alice", 4)] {
            let input = NewEntry {
                occasion: Some(day(d)),
                ..entry(user, "note")
            };
            journal.add_entry_at(input, now(), day(9)).unwrap();
        }

        let occasions: Vec<NaiveDate> = journal
            .my_entries("alice")
            .iter()
            .map(|e| e.occasion)
            .collect();
        assert_eq!(occasions, vec![day(7), day(4), day(2)]);
        assert!(journal.my_entries("carol").is_empty());
    }

    #[test]
    fn same_day_entries_list_newest_written_first() {
        let mut journal = Journal::default();
        let first = journal.add_entry_at(entry("alice", "morning"), now(), day(6)).unwrap();
        let later = now() + chrono::Duration::hours(2);
        let second = journal.add_entry_at(entry("alice", "evening"), later, day(6)).unwrap();

        let ids: Vec<Uuid> = journal.my_entries("alice").iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn emotions_are_unique_and_sorted() {
        let mut journal = Journal::default();
        let input = NewEntry {
            emotions: vec!["tired".into(), " calm ".into(), "tired".into()],
            ..entry("alice", "long day")
        };
        let added = journal.add_entry_at(input, now(), day(6)).unwrap();
        assert_eq!(added.emotions, vec!["tired".to_string(), "calm".to_string()]);

        let names: Vec<&str> = journal.emotions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["calm", "tired"]);

        assert!(matches!(journal.add_emotion("calm"), Err(Error::AlreadyExists(_))));
        journal.add_emotion("anxious").unwrap();
        assert_eq!(journal.emotions[0].name, "anxious");
    }

    #[test]
    fn bad_emotion_rejects_whole_entry() {
        let mut journal = Journal::default();
        let input = NewEntry {
            emotions: vec!["happy".into(), "  ".into()],
            ..entry("alice", "text")
        };
        assert!(journal.add_entry_at(input, now(), day(6)).is_err());
        assert!(journal.emotions.is_empty());
        assert!(journal.entries.is_empty());
    }
}
