/// Format a whole-second countdown as MM:SS (minutes may exceed 59).
pub fn format_clock(total_secs: u64) -> String {
    let mins = total_secs / 60;
    let secs = total_secs % 60;

    format!("{:02}:{:02}", mins, secs)
}

/// An answer counts as unanswered when it is empty or whitespace-only.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
