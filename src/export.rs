//! # Session Export
//!
//! Serves `/sessions/{id}/download`, the URL `processing-complete` events
//! reference. Renders the persisted session, transcript, and summary records
//! as plain text (default) or structured JSON.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::{SessionRecord, SummaryRecord, TranscriptRecord};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    format: Option<String>,
}

/// Plain-text rendering: header, transcript section, then a summary section
/// with numbered lists. Sessions without a summary render without that
/// section.
pub fn render_text(
    session: &SessionRecord,
    transcript: &TranscriptRecord,
    summary: Option<&SummaryRecord>,
) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", session.title));
    out.push_str(&format!("Date: {}\n", session.created_at.format("%Y-%m-%d %H:%M UTC")));
    out.push_str(&format!("Duration: {}s\n", session.duration_secs));
    out.push_str(&format!("Source: {}\n", session.audio_source.as_str()));
    out.push('\n');

    out.push_str("=== TRANSCRIPT ===\n\n");
    out.push_str(&transcript.content);
    out.push('\n');

    if let Some(summary) = summary {
        out.push_str("\n=== SUMMARY ===\n\n");
        out.push_str(&summary.summary.content);
        out.push('\n');

        render_numbered_section(&mut out, "Key Points", &summary.summary.key_points);
        render_numbered_section(&mut out, "Action Items", &summary.summary.action_items);
        render_numbered_section(&mut out, "Decisions", &summary.summary.decisions);
    }

    out
}

fn render_numbered_section(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{}:\n", heading));
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item));
    }
}

/// Structured rendering with the same fields as the text export.
pub fn render_json(
    session: &SessionRecord,
    transcript: &TranscriptRecord,
    summary: Option<&SummaryRecord>,
) -> serde_json::Value {
    json!({
        "session": session,
        "transcript": transcript.content,
        "summary": summary.map(|s| &s.summary),
    })
}

/// `GET /sessions/{id}/download?format=txt|json`.
pub async fn download_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DownloadQuery>,
) -> AppResult<HttpResponse> {
    let session_id = path.into_inner();

    let session = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session '{}' does not exist", session_id)))?;
    let transcript = state
        .store
        .get_transcript(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No transcript for session '{}'", session_id)))?;
    let summary = state.store.get_summary(&session_id).await?;

    match query.format.as_deref().unwrap_or("txt") {
        "txt" => {
            let body = render_text(&session, &transcript, summary.as_ref());
            Ok(HttpResponse::Ok()
                .content_type("text/plain; charset=utf-8")
                .insert_header((
                    "Content-Disposition",
                    format!("attachment; filename=\"session-{}.txt\"", session_id),
                ))
                .body(body))
        }
        "json" => Ok(HttpResponse::Ok().json(render_json(&session, &transcript, summary.as_ref()))),
        other => Err(AppError::BadRequest(format!(
            "Unsupported format '{}'; use 'txt' or 'json'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Summary;
    use crate::session::{AudioSource, SessionStatus};
    use chrono::Utc;

    fn session() -> SessionRecord {
        SessionRecord {
            session_id: "s1".into(),
            user_id: "u1".into(),
            title: "Weekly sync".into(),
            audio_source: AudioSource::Microphone,
            status: SessionStatus::Completed,
            duration_secs: 90,
            created_at: Utc::now(),
        }
    }

    fn transcript() -> TranscriptRecord {
        TranscriptRecord {
            session_id: "s1".into(),
            content: "Speaker 1: hello\nworld".into(),
            created_at: Utc::now(),
        }
    }

    fn summary() -> SummaryRecord {
        SummaryRecord {
            session_id: "s1".into(),
            summary: Summary {
                content: "A short meeting.".into(),
                key_points: vec!["greeted each other".into(), "wrapped up".into()],
                action_items: vec!["follow up".into()],
                decisions: vec![],
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_text_rendering_has_all_sections() {
        let rendered = render_text(&session(), &transcript(), Some(&summary()));

        assert!(rendered.starts_with("Weekly sync\n"));
        assert!(rendered.contains("Duration: 90s"));
        assert!(rendered.contains("=== TRANSCRIPT ===\n\nSpeaker 1: hello\nworld"));
        assert!(rendered.contains("=== SUMMARY ===\n\nA short meeting."));
        assert!(rendered.contains("Key Points:\n1. greeted each other\n2. wrapped up"));
        assert!(rendered.contains("Action Items:\n1. follow up"));
        // Empty lists are omitted entirely.
        assert!(!rendered.contains("Decisions:"));
    }

    #[test]
    fn test_text_rendering_without_summary() {
        let rendered = render_text(&session(), &transcript(), None);
        assert!(rendered.contains("=== TRANSCRIPT ==="));
        assert!(!rendered.contains("=== SUMMARY ==="));
    }

    #[test]
    fn test_json_rendering_shape() {
        let value = render_json(&session(), &transcript(), Some(&summary()));
        assert_eq!(value["session"]["sessionId"], "s1");
        assert_eq!(value["transcript"], "Speaker 1: hello\nworld");
        assert_eq!(value["summary"]["keyPoints"][1], "wrapped up");

        let no_summary = render_json(&session(), &transcript(), None);
        assert!(no_summary["summary"].is_null());
    }
}
