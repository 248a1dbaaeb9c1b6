//! Text and JSON rendering for command output.

use aroha_core::{CrisisAccess, History, SessionSummary, UnreadableRecord, VerifyReport};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::constants::CRISIS_RESOURCES;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn history_lines(history: &History) -> Vec<String> {
    history
        .turns
        .iter()
        .map(|turn| {
            let emotion = turn
                .emotion
                .as_deref()
                .map(|tag| format!(" ({})", tag))
                .unwrap_or_default();
            format!(
                "[{}] {}{}: {}",
                format_timestamp(&turn.timestamp),
                turn.role,
                emotion,
                turn.content
            )
        })
        .collect()
}

pub fn session_lines(sessions: &[SessionSummary]) -> Vec<String> {
    sessions
        .iter()
        .map(|session| {
            format!(
                "{}  {}  {} record{}",
                session.id,
                format_timestamp(&session.created_at),
                session.record_count,
                if session.record_count == 1 { "" } else { "s" }
            )
        })
        .collect()
}

pub fn crisis_lines(entries: &[CrisisAccess]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let emotion = entry
                .emotion
                .as_deref()
                .map(|tag| format!(" [{}]", tag))
                .unwrap_or_default();
            format!(
                "[{}]{} {}",
                format_timestamp(&entry.timestamp),
                emotion,
                entry.resources.join(", ")
            )
        })
        .collect()
}

pub fn print_crisis_banner() {
    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("{:^60}", "CRISIS RESOURCES");
    println!("{}", rule);
    for resource in CRISIS_RESOURCES {
        println!("{}: {}", resource.name, resource.contact);
    }
    println!("{}", rule);
}

/// Warn on stderr about skipped records. Never prints content.
pub fn warn_unreadable(unreadable: &[UnreadableRecord]) {
    if unreadable.is_empty() {
        return;
    }
    let seqs: Vec<String> = unreadable.iter().map(|r| r.seq.to_string()).collect();
    eprintln!(
        "Warning: {} record{} could not be read (seq {})",
        unreadable.len(),
        if unreadable.len() == 1 { "" } else { "s" },
        seqs.join(", ")
    );
}

pub fn verify_lines(report: &VerifyReport) -> Vec<String> {
    let mut lines = vec![
        format!("Sessions: {}", report.sessions),
        format!(
            "Records: {} ({} readable, {} unreadable)",
            report.records,
            report.readable(),
            report.unreadable.len()
        ),
    ];
    for (kind, counts) in &report.by_kind {
        lines.push(format!(
            "- {}: {} readable, {} unreadable",
            kind, counts.readable, counts.unreadable
        ));
    }
    for record in &report.unreadable {
        lines.push(format!(
            "  ! session {} seq {}: {}",
            record.session_id, record.seq, record.reason
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use aroha_core::{Role, Turn};

    #[test]
    fn test_history_lines_include_role_and_emotion() {
        let mut history = History::empty("s1");
        history.turns.push(Turn {
            seq: 1,
            role: Role::User,
            content: "I feel anxious".to_string(),
            timestamp: Utc::now(),
            emotion: Some("anxious".to_string()),
        });
        history.turns.push(Turn {
            seq: 2,
            role: Role::Assistant,
            content: "I'm here for you".to_string(),
            timestamp: Utc::now(),
            emotion: None,
        });

        let lines = history_lines(&history);
        assert!(lines[0].ends_with("user (anxious): I feel anxious"));
        assert!(lines[1].ends_with("assistant: I'm here for you"));
    }

    #[test]
    fn test_session_lines_pluralize() {
        let sessions = vec![
            SessionSummary {
                id: "s1".to_string(),
                created_at: Utc::now(),
                record_count: 1,
            },
            SessionSummary {
                id: "s2".to_string(),
                created_at: Utc::now(),
                record_count: 3,
            },
        ];
        let lines = session_lines(&sessions);
        assert!(lines[0].ends_with("1 record"));
        assert!(lines[1].ends_with("3 records"));
    }
}
