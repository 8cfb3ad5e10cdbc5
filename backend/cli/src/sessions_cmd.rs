//! CLI Sessions Subcommands
//!
//! Read-only inspection of stored sessions, straight from disk.

use anyhow::Result;
use clap::Subcommand;
use conductor_session::{time, SessionLayout, SessionStore, StreamWriter, SummaryWriter, TranscriptWriter};

use crate::terminal_output::{note_info, render_table, status_label, Column};

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List sessions, newest first
    List {
        /// Show at most this many sessions
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show metadata and summaries of a session
    Show { session_id: String },
    /// Print the streaming log of a session
    Log { session_id: String },
}

pub async fn run(layout: SessionLayout, cmd: SessionCommands) -> Result<()> {
    match cmd {
        SessionCommands::List { limit } => list(layout, limit).await,
        SessionCommands::Show { session_id } => show(layout, &session_id).await,
        SessionCommands::Log { session_id } => {
            let log = StreamWriter::new(layout).read_log(&session_id).await?;
            print!("{log}");
            Ok(())
        }
    }
}

async fn list(layout: SessionLayout, limit: Option<usize>) -> Result<()> {
    let store = SessionStore::new(layout.clone());
    let summaries = SummaryWriter::new(layout);
    let mut sessions = store.list_sessions().await?;
    if let Some(limit) = limit {
        sessions.truncate(limit);
    }
    if sessions.is_empty() {
        note_info("No sessions yet.");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(sessions.len());
    for meta in &sessions {
        let last_status = summaries
            .read_summaries(&meta.session_id)
            .await?
            .into_iter()
            .max_by_key(|s| s.end_time)
            .map(|s| s.status.to_string())
            .unwrap_or_else(|| "none".to_string());
        rows.push(vec![
            meta.session_id.clone(),
            meta.agent_name.clone(),
            time::iso_millis(&meta.created_at),
            meta.invocation_count.to_string(),
            status_label(&last_status),
        ]);
    }

    let columns = [
        Column::left("Session"),
        Column::left("Agent").max_width(24),
        Column::left("Created"),
        Column::right("Runs"),
        Column::left("Last status"),
    ];
    print!("{}", render_table(&columns, &rows));
    Ok(())
}

async fn show(layout: SessionLayout, session_id: &str) -> Result<()> {
    let store = SessionStore::new(layout.clone());
    let metadata = store.load_session(session_id).await?;
    let records = TranscriptWriter::new(layout.clone()).read_records(session_id).await?;
    let summaries = SummaryWriter::new(layout).read_summaries(session_id).await?;

    println!("Session:      {}", metadata.session_id);
    println!("Agent:        {}", metadata.agent_name);
    println!("Created:      {}", time::iso_millis(&metadata.created_at));
    println!("Last updated: {}", time::iso_millis(&metadata.last_updated));
    println!("Invocations:  {}", metadata.invocation_count);
    println!("Records:      {}", records.len());
    if let Some(external) = &metadata.external_session_id {
        println!("Resume id:    {external}");
    }

    if summaries.is_empty() {
        return Ok(());
    }
    println!();
    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|s| {
            vec![
                s.agent_name.clone(),
                status_label(&s.status.to_string()),
                s.message_count.to_string(),
                s.tools_used.iter().cloned().collect::<Vec<_>>().join(", "),
                s.errors.first().cloned().unwrap_or_default(),
            ]
        })
        .collect();
    let columns = [
        Column::left("Agent"),
        Column::left("Status"),
        Column::right("Messages"),
        Column::left("Tools").max_width(40),
        Column::left("Error").max_width(60),
    ];
    print!("{}", render_table(&columns, &rows));
    Ok(())
}
