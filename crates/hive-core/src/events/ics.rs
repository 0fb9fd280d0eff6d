//! iCalendar (RFC 5545) export

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum octets per content line before folding
const MAX_LINE_OCTETS: usize = 75;

const UID_DOMAIN: &str = "hive";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_day: bool,
}

/// Renders events as a VCALENDAR document
#[derive(Debug, Clone)]
pub struct IcsCalendar {
    name: String,
    generated_at: DateTime<Utc>,
}

impl IcsCalendar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generated_at: Utc::now(),
        }
    }

    /// Fix the DTSTAMP written on every event
    pub fn with_timestamp(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn render(&self, events: &[CalendarEvent]) -> String {
        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//Hive//Campus Events//EN".to_string(),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:PUBLISH".to_string(),
            format!("X-WR-CALNAME:{}", escape_text(&self.name)),
        ];

        for event in events {
            self.push_event(&mut lines, event);
        }
        lines.push("END:VCALENDAR".to_string());

        let mut out = String::new();
        for line in &lines {
            out.push_str(&fold_line(line));
            out.push_str("\r\n");
        }
        out
    }

    fn push_event(&self, lines: &mut Vec<String>, event: &CalendarEvent) {
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}@{}", event.id, UID_DOMAIN));
        lines.push(format!("DTSTAMP:{}", format_datetime(&self.generated_at)));

        if event.all_day {
            let start = event.starts_at.date_naive();
            // DTEND is exclusive for DATE values
            let end = event
                .ends_at
                .map(|e| exclusive_end_date(&e))
                .filter(|e| *e > start)
                .unwrap_or_else(|| start.succ_opt().unwrap_or(start));
            lines.push(format!("DTSTART;VALUE=DATE:{}", format_date(&start)));
            lines.push(format!("DTEND;VALUE=DATE:{}", format_date(&end)));
        } else {
            let end = event
                .ends_at
                .filter(|e| *e > event.starts_at)
                .unwrap_or(event.starts_at + Duration::hours(1));
            lines.push(format!("DTSTART:{}", format_datetime(&event.starts_at)));
            lines.push(format!("DTEND:{}", format_datetime(&end)));
        }

        lines.push(format!("SUMMARY:{}", escape_text(&event.title)));
        if let Some(description) = &event.description {
            lines.push(format!("DESCRIPTION:{}", escape_text(description)));
        }
        if let Some(location) = &event.location {
            lines.push(format!("LOCATION:{}", escape_text(location)));
        }
        lines.push("END:VEVENT".to_string());
    }
}

/// First day not covered by an all-day event ending at `end`
fn exclusive_end_date(end: &DateTime<Utc>) -> NaiveDate {
    let date = end.date_naive();
    if end.time() == NaiveTime::MIN {
        date
    } else {
        date.succ_opt().unwrap_or(date)
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Escape a TEXT value
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Fold a content line at 75 octets without splitting a UTF-8 sequence
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    // Continuation lines start with a space, which counts toward the limit
    let mut limit = MAX_LINE_OCTETS;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > limit {
            out.push_str("\r\n ");
            width = 0;
            limit = MAX_LINE_OCTETS - 1;
        }
        out.push(c);
        width += len;
    }
    out
}
