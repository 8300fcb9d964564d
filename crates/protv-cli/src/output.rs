//! Output formatting for CLI

use console::style;
use protv_core::{ChannelRecord, PlaybackStatus, SessionSnapshot};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON, or `{}` if the value cannot be serialized
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Tabled)]
struct ChannelRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Fav")]
    favorite: &'static str,
}

/// Render a channel listing
pub fn channels<F>(channels: &[&ChannelRecord], format: OutputFormat, is_favorite: F) -> String
where
    F: Fn(&str) -> bool,
{
    match format {
        OutputFormat::Json => to_json(&channels),
        OutputFormat::Table => {
            let rows = channels.iter().map(|c| ChannelRow {
                id: c.id.clone(),
                name: c.name.clone(),
                category: c.category.clone(),
                quality: c.quality_hint.to_string(),
                favorite: if is_favorite(&c.id) { "*" } else { "" },
            });
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Text => channels
            .iter()
            .map(|c| {
                let star = if is_favorite(&c.id) { "*" } else { " " };
                format!("{} {:<8} {} [{}] {}", star, c.id, c.name, c.category, c.quality_hint)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[derive(Serialize)]
struct StatusEvent<'a> {
    time: String,
    #[serde(flatten)]
    snapshot: &'a SessionSnapshot,
}

/// One status line per published session state
pub fn status_line(snapshot: &SessionSnapshot, format: OutputFormat) -> String {
    let time = chrono::Utc::now().format("%H:%M:%S").to_string();

    if format == OutputFormat::Json {
        let event = StatusEvent { time, snapshot };
        return serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
    }

    let status = match snapshot.status {
        PlaybackStatus::Playing => style(snapshot.status.to_string()).green(),
        PlaybackStatus::Failed => style(snapshot.status.to_string()).red(),
        PlaybackStatus::Buffering | PlaybackStatus::Connecting => {
            style(snapshot.status.to_string()).yellow()
        }
        _ => style(snapshot.status.to_string()).dim(),
    };

    let mut line = format!(
        "[{}] {:<10} relay={} retries={} quality={} speed={}",
        time, status, snapshot.using_relay, snapshot.retry_count, snapshot.quality, snapshot.rate
    );
    if !snapshot.qualities.is_empty() {
        line.push_str(&format!(" available={}", snapshot.qualities.join(",")));
    }
    if let Some(reason) = snapshot.failure {
        line.push_str(&format!("\n  {}", style(reason.message()).red()));
    }
    line
}
