use std::fmt;

use crate::app::AppContext;
use crate::output::{print_json, verify_lines};

/// Verification found records that cannot be read.
#[derive(Debug)]
pub struct IntegrityFailed {
    pub unreadable: usize,
}

impl fmt::Display for IntegrityFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Integrity check failed: {} unreadable record{}",
            self.unreadable,
            if self.unreadable == 1 { "" } else { "s" }
        )
    }
}

impl std::error::Error for IntegrityFailed {}

pub fn handle_check(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let report = ctx.store()?.verify()?;

    if json {
        print_json(&report)?;
    } else if report.is_clean() {
        if !ctx.quiet() {
            println!("Integrity check: OK");
            for line in verify_lines(&report) {
                println!("{}", line);
            }
        }
    } else {
        eprintln!("Integrity check: FAILED");
        for line in verify_lines(&report) {
            eprintln!("{}", line);
        }
        eprintln!("Hint: Unreadable records were written with another secret or modified on disk.");
    }

    if !report.is_clean() {
        return Err(IntegrityFailed {
            unreadable: report.unreadable.len(),
        }
        .into());
    }
    Ok(())
}
