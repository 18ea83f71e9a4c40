//! Calendar invites
//!
//! Builds RFC 5545 `.ics` payloads for booking confirmations.

use crate::email::Attachment;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const PRODID: &str = "-//Outreach//Booking Confirmation//EN";

/// Maximum octets per content line before folding
const MAX_LINE_OCTETS: usize = 75;

/// A single booked session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarInvite {
    /// Globally unique id, stable across updates of the same booking
    pub uid: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub organizer: Option<Participant>,
    #[serde(default)]
    pub attendee: Option<Participant>,
    /// Defaults to now when rendering
    #[serde(default)]
    pub stamp: Option<DateTime<Utc>>,
}

/// Organizer or attendee
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

impl CalendarInvite {
    pub fn new(
        uid: impl Into<String>,
        summary: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            summary: summary.into(),
            start,
            end,
            description: None,
            location: None,
            url: None,
            organizer: None,
            attendee: None,
            stamp: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn organizer(mut self, name: Option<&str>, email: impl Into<String>) -> Self {
        self.organizer = Some(Participant {
            name: name.map(str::to_string),
            email: email.into(),
        });
        self
    }

    pub fn attendee(mut self, name: Option<&str>, email: impl Into<String>) -> Self {
        self.attendee = Some(Participant {
            name: name.map(str::to_string),
            email: email.into(),
        });
        self
    }

    /// Builder method: fix DTSTAMP (defaults to the render time)
    pub fn stamp(mut self, stamp: DateTime<Utc>) -> Self {
        self.stamp = Some(stamp);
        self
    }

    /// Render the invite as an iCalendar document with CRLF line endings
    pub fn to_ics(&self) -> String {
        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{}", PRODID),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:REQUEST".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", escape_text(&self.uid)),
            format!("DTSTAMP:{}", format_utc(self.stamp.unwrap_or_else(Utc::now))),
            format!("DTSTART:{}", format_utc(self.start)),
            format!("DTEND:{}", format_utc(self.end)),
            format!("SUMMARY:{}", escape_text(&self.summary)),
        ];

        if let Some(description) = &self.description {
            lines.push(format!("DESCRIPTION:{}", escape_text(description)));
        }
        if let Some(location) = &self.location {
            lines.push(format!("LOCATION:{}", escape_text(location)));
        }
        if let Some(url) = &self.url {
            lines.push(format!("URL:{}", url));
        }
        if let Some(organizer) = &self.organizer {
            lines.push(participant_line("ORGANIZER", organizer, ""));
        }
        if let Some(attendee) = &self.attendee {
            lines.push(participant_line(
                "ATTENDEE",
                attendee,
                ";ROLE=REQ-PARTICIPANT;PARTSTAT=NEEDS-ACTION;RSVP=TRUE",
            ));
        }

        lines.push("STATUS:CONFIRMED".to_string());
        lines.push("SEQUENCE:0".to_string());
        lines.push("END:VEVENT".to_string());
        lines.push("END:VCALENDAR".to_string());

        let mut out = String::new();
        for line in lines {
            out.push_str(&fold_line(&line));
            out.push_str("\r\n");
        }
        out
    }

    /// The invite as an `invite.ics` email attachment
    pub fn as_attachment(&self) -> Attachment {
        Attachment::new("invite.ics", self.to_ics().into_bytes())
            .content_type("text/calendar; charset=utf-8; method=REQUEST")
    }
}

fn participant_line(property: &str, participant: &Participant, params: &str) -> String {
    let cn = participant
        .name
        .as_deref()
        .map(|n| format!(";CN={}", quote_param(n)))
        .unwrap_or_default();
    format!("{}{}{}:mailto:{}", property, cn, params, participant.email)
}

/// UTC timestamp in `YYYYMMDDTHHMMSSZ` form
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape a TEXT value (backslash, semicolon, comma, newline)
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Parameter values containing `:`, `;` or `,` must be quoted; DQUOTE itself
/// is not allowed and is dropped.
fn quote_param(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| *c != '"').collect();
    if cleaned.contains([':', ';', ',']) {
        format!("\"{}\"", cleaned)
    } else {
        cleaned
    }
}

/// Fold a content line at 75 octets without splitting UTF-8 sequences.
/// Continuation lines start with a single space.
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut current = 0;
    // The leading space of a continuation line counts toward its limit
    let mut limit = MAX_LINE_OCTETS;

    for c in line.chars() {
        let width = c.len_utf8();
        if current + width > limit {
            out.push_str("\r\n ");
            current = 0;
            limit = MAX_LINE_OCTETS - 1;
        }
        out.push(c);
        current += width;
    }
    out
}
