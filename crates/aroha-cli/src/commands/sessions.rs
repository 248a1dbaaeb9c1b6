use anyhow::Context;

use crate::app::AppContext;
use crate::cli::{HistoryArgs, RecordArgs};
use crate::output::{history_lines, print_json, session_lines, warn_unreadable};

pub fn handle_begin(ctx: &AppContext, label: Option<&str>) -> anyhow::Result<()> {
    let session_id = ctx.store()?.begin_session(label)?;
    println!("{}", session_id);
    Ok(())
}

pub fn handle_sessions(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let sessions = ctx.store()?.sessions()?;

    if json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        if !ctx.quiet() {
            println!("No sessions yet.");
        }
        return Ok(());
    }
    for line in session_lines(&sessions) {
        println!("{}", line);
    }
    Ok(())
}

pub fn handle_history(ctx: &AppContext, args: &HistoryArgs) -> anyhow::Result<()> {
    let store = ctx.store()?;
    let history = match args.limit {
        Some(limit) => store.recent_history(&args.session, limit),
        None => store.history(&args.session),
    }
    .with_context(|| format!("Failed to read history of session {}", args.session))?;

    if args.json {
        print_json(&history)?;
    } else if history.is_empty() {
        if !ctx.quiet() {
            println!("No turns in session {}.", args.session);
        }
    } else {
        for line in history_lines(&history) {
            println!("{}", line);
        }
    }

    warn_unreadable(&history.unreadable);
    Ok(())
}

pub fn handle_record(ctx: &AppContext, args: &RecordArgs) -> anyhow::Result<()> {
    let handle = ctx.store()?.record_turn(
        &args.session,
        args.role,
        &args.text,
        args.emotion.as_deref(),
    )?;

    if !ctx.quiet() {
        println!("Recorded turn {} in session {}", handle.seq, handle.session_id);
    }
    Ok(())
}

pub fn handle_delete(ctx: &AppContext, session: &str) -> anyhow::Result<()> {
    let removed = ctx.store()?.delete_session(session)?;
    if !ctx.quiet() {
        println!("Deleted session {} ({} records)", session, removed);
    }
    Ok(())
}
