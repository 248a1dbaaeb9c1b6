use crate::app::AppContext;
use crate::cli::CrisisArgs;
use crate::constants::CRISIS_RESOURCES;
use crate::output::{crisis_lines, print_crisis_banner, print_json, warn_unreadable};

pub fn handle_crisis(ctx: &AppContext, args: &CrisisArgs) -> anyhow::Result<()> {
    let store = ctx.store()?;

    if args.log {
        let log = store.crisis_log(&args.session)?;
        if args.json {
            print_json(&log)?;
        } else {
            if log.entries.is_empty() && !ctx.quiet() {
                println!("No crisis resources shown in session {}.", args.session);
            }
            for line in crisis_lines(&log.entries) {
                println!("{}", line);
            }
        }
        warn_unreadable(&log.unreadable);
        return Ok(());
    }

    let ids: Vec<&str> = CRISIS_RESOURCES.iter().map(|r| r.id).collect();
    let handle = store.log_crisis_access(&args.session, &ids, args.emotion.as_deref())?;

    if args.json {
        let resources: Vec<serde_json::Value> = CRISIS_RESOURCES
            .iter()
            .map(|r| serde_json::json!({ "id": r.id, "name": r.name, "contact": r.contact }))
            .collect();
        return print_json(&serde_json::json!({
            "session_id": handle.session_id,
            "seq": handle.seq,
            "resources": resources,
        }));
    }

    print_crisis_banner();
    Ok(())
}
