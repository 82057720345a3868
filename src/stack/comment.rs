//! The managed stack overview embedded in every PR body of a stack.

use crate::providers::PrInfo;

pub const START_MARKER: &str = "<!-- weave-stack:start -->";
pub const END_MARKER: &str = "<!-- weave-stack:end -->";

/// Overview of `stack` (bottom to top) as seen from PR `current`
pub fn render(stack: &[PrInfo], current: u64) -> String {
    let mut out = String::new();
    out.push_str(START_MARKER);
    out.push('\n');
    out.push_str("**Stack** (bottom to top):\n\n");
    for pr in stack {
        if pr.number == current {
            out.push_str(&format!("- **#{} {}** (this PR)\n", pr.number, pr.title));
        } else {
            out.push_str(&format!("- #{} {}\n", pr.number, pr.title));
        }
    }
    out.push_str(END_MARKER);
    out
}

/// Body without the managed block
pub fn strip(body: &str) -> String {
    match (body.find(START_MARKER), body.find(END_MARKER)) {
        (Some(start), Some(end)) if end > start => {
            let before = body[..start].trim_end();
            let after = body[end + END_MARKER.len()..].trim_start();
            match (before.is_empty(), after.is_empty()) {
                (true, _) => after.to_string(),
                (false, true) => before.to_string(),
                (false, false) => format!("{before}\n\n{after}"),
            }
        }
        _ => body.to_string(),
    }
}

/// Replace the managed block in `body` (or append one), leaving the rest untouched
pub fn upsert(body: &str, block: &str) -> String {
    match (body.find(START_MARKER), body.find(END_MARKER)) {
        (Some(start), Some(end)) if end > start => format!(
            "{}{}{}",
            &body[..start],
            block,
            &body[end + END_MARKER.len()..]
        ),
        _ if body.trim().is_empty() => block.to_string(),
        _ => format!("{}\n\n{}", body.trim_end(), block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake::pr;
    use crate::providers::PrState;

    fn stack() -> Vec<PrInfo> {
        vec![
            pr(1, "a", "main", PrState::Open),
            pr(2, "b", "a", PrState::Open),
        ]
    }

    #[test]
    fn test_render_highlights_current() {
        let block = render(&stack(), 2);
        assert!(block.starts_with(START_MARKER));
        assert!(block.ends_with(END_MARKER));
        assert!(block.contains("- #1 PR 1\n"));
        assert!(block.contains("- **#2 PR 2** (this PR)\n"));
    }

    #[test]
    fn test_upsert_replaces_existing_block_only() {
        let original = format!("Intro\n\n{}\n\nFooter", render(&stack(), 1));
        let mut bigger = stack();
        bigger.push(pr(3, "c", "b", PrState::Open));
        let updated = upsert(&original, &render(&bigger, 1));

        assert!(updated.starts_with("Intro\n\n"));
        assert!(updated.ends_with("\n\nFooter"));
        assert!(updated.contains("#3 PR 3"));
        assert_eq!(updated.matches(START_MARKER).count(), 1);
    }

    #[test]
    fn test_upsert_appends_and_is_stable() {
        let block = render(&stack(), 1);
        let once = upsert("Body text", &block);
        assert_eq!(once, format!("Body text\n\n{block}"));
        assert_eq!(upsert(&once, &block), once);
        assert_eq!(strip(&once), "Body text");
    }
}
