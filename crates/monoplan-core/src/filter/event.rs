//! Trigger event / branch filtering.
//!
//! Branch patterns use minimatch syntax: `*`, `?` and `[...]` stop at `/`,
//! `**` spans directories, `{a,b}` sets expand to alternatives and `[^...]`
//! negates like `[!...]`.

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::domain::{EventKind, Job, TriggerEvent, TriggerSpec};
use crate::error::PlanResult;

/// Shell-style, case-sensitive; `*` and `?` stop at `/`.
const BRANCH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Keeps jobs whose trigger spec accepts the event.
#[derive(Debug, Clone)]
pub struct EventFilter<'a> {
    event: &'a TriggerEvent,
    kind: EventKind,
}

impl<'a> EventFilter<'a> {
    /// Fails with `UnsupportedEvent` for event names the planner does not know.
    pub fn new(event: &'a TriggerEvent) -> PlanResult<Self> {
        Ok(Self {
            kind: event.kind()?,
            event,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// True iff `on` declares this event and, if it restricts branches, one
    /// of its patterns matches the event's branch.
    pub fn matches(&self, on: &TriggerSpec) -> bool {
        let Some(trigger) = on.get(self.kind.as_str()) else {
            return false;
        };
        let Some(branches) = trigger.as_ref().and_then(|t| t.branches.as_ref()) else {
            return true;
        };

        let branch = self.event.branch_for(self.kind);
        branches.iter().any(|pattern| branch_matches(pattern, branch))
    }

    /// Split `jobs` into (kept, dropped).
    pub fn apply(&self, jobs: Vec<Job>) -> (Vec<Job>, Vec<Job>) {
        let (kept, dropped): (Vec<Job>, Vec<Job>) =
            jobs.into_iter().partition(|job| self.matches(&job.on));
        debug!(
            event = self.kind.as_str(),
            kept = kept.len(),
            dropped = dropped.len(),
            "event filter applied"
        );
        (kept, dropped)
    }
}

fn branch_matches(pattern: &str, branch: &str) -> bool {
    expand_braces(pattern)
        .iter()
        .any(|alt| match Pattern::new(&alt.replace("[^", "[!")) {
            Ok(p) => p.matches_with(branch, BRANCH_MATCH),
            Err(e) => {
                warn!(pattern, error = %e, "invalid branch pattern never matches");
                false
            }
        })
}

/// Expand `{a,b}` sets, nested ones included. A brace pair without a
/// top-level comma is literal.
fn expand_braces(pattern: &str) -> Vec<String> {
    for (open, _) in pattern.match_indices('{') {
        let mut depth = 0usize;
        let mut bounds = vec![open];
        let mut close = None;
        for (offset, c) in pattern[open..].char_indices() {
            let at = open + offset;
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(at);
                        break;
                    }
                }
                ',' if depth == 1 => bounds.push(at),
                _ => {}
            }
        }
        let Some(close) = close else { continue };
        if bounds.len() == 1 {
            continue;
        }
        bounds.push(close);

        let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
        return bounds
            .windows(2)
            .flat_map(|w| expand_braces(&format!("{prefix}{}{suffix}", &pattern[w[0] + 1..w[1]])))
            .collect();
    }
    vec![pattern.to_string()]
}
