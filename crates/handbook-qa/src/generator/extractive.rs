use super::{parse_marker, NOT_FOUND_ANSWER};

pub const MAX_LINES: usize = 15;

/// Quote context lines as bullets tagged with their page.
///
/// Deterministic and offline. Lines that precede any numbered page marker
/// are skipped; at most [`MAX_LINES`] bullets are emitted.
pub fn extractive_answer(context: &str) -> String {
    let mut current_page: Option<u32> = None;
    let mut pages: Vec<u32> = Vec::new();
    let mut bullets: Vec<String> = Vec::new();

    for line in context.lines().map(str::trim) {
        if let Some(page) = parse_marker(line) {
            if page.is_some() {
                current_page = page;
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let Some(page) = current_page else { continue };
        if bullets.len() == MAX_LINES {
            break;
        }
        if !pages.contains(&page) {
            pages.push(page);
        }
        bullets.push(format!("\u{2022} [Page {page}] {line}"));
    }

    if bullets.is_empty() {
        return NOT_FOUND_ANSWER.to_string();
    }
    let label = if pages.len() == 1 { "Page" } else { "Pages" };
    let pages = pages.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
    format!(
        "According to the employee handbook ({label} {pages}), here is the relevant information:\n\n{}",
        bullets.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_carry_page_of_latest_marker() {
        let ctx = "[Source: Page 1]\n3. Leave Policy\nEmployees get 15 days annual leave.\n\n[Source: Page 4]\nSick leave is 10 days.";
        let out = extractive_answer(ctx);
        assert_eq!(
            out,
            "According to the employee handbook (Pages 1, 4), here is the relevant information:\n\n\
             \u{2022} [Page 1] 3. Leave Policy\n\
             \u{2022} [Page 1] Employees get 15 days annual leave.\n\
             \u{2022} [Page 4] Sick leave is 10 days."
        );
    }

    #[test]
    fn caps_at_fifteen_lines() {
        let body: String = (0..40).map(|i| format!("line {i}\n")).collect();
        let out = extractive_answer(&format!("[Source: Page 2]\n{body}"));
        assert_eq!(out.matches('\u{2022}').count(), MAX_LINES);
        assert!(out.contains("line 14") && !out.contains("line 15"));
    }

    #[test]
    fn unknown_page_reuses_previous_marker() {
        let out = extractive_answer("[Source: Page 3]\nfirst\n\n[Source: Page ?]\nsecond");
        assert!(out.contains("\u{2022} [Page 3] second"));
    }

    #[test]
    fn nothing_under_a_numbered_marker_is_not_found() {
        assert_eq!(extractive_answer(""), NOT_FOUND_ANSWER);
        assert_eq!(extractive_answer("[Source: Page ?]\norphan text"), NOT_FOUND_ANSWER);
        assert_eq!(extractive_answer("[Source: Page 1]\n\n   \n"), NOT_FOUND_ANSWER);
    }

    #[test]
    fn is_deterministic() {
        let ctx = "[Source: Page 1]\nA\nB";
        assert_eq!(extractive_answer(ctx), extractive_answer(ctx));
    }
}
