use std::io::{self, Write};

use chrono::SecondsFormat;

use crate::session::LoginOutcome;

pub fn summary(outcome: &LoginOutcome) -> String {
    let mut lines = Vec::new();

    match &outcome.saved_to {
        Some(path) => lines.push(format!("AWS credentials written to {}", path.display())),
        None => lines.push("No AWS credentials were written".to_string()),
    }
    for (account, entry) in &outcome.credentials {
        lines.push(format!(
            "  [{}] expires {}",
            account,
            entry.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    if !outcome.skipped.is_empty() {
        lines.push(format!("Skipped {} role(s):", outcome.skipped.len()));
        for skipped in &outcome.skipped {
            lines.push(format!("  {}: {}", skipped.role_arn, skipped.reason));
        }
    }

    lines.join("\n")
}

pub fn print_summary(outcome: &LoginOutcome) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", summary(outcome));
    let _ = stdout.flush();
}
