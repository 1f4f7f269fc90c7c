//! Timeline reports for recorded hook events.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::events::{HookEvent, HookKind};
use crate::runtime::fault::Fault;

const TIMELINE_TEMPLATE: &str = include_str!("templates/timeline.txt");

/// One rendered timeline line.
#[derive(Debug, Clone, Serialize)]
struct TimelineRow {
    indent: String,
    hook: &'static str,
    name: String,
    context: String,
    outcome: String,
}

impl TimelineRow {
    fn from_event(event: &HookEvent) -> Self {
        let outcome = match (event.hook, event.result, &event.value) {
            (HookKind::Finish, Some(result), Some(value)) => {
                format!(" -> {} {}", result.as_str(), value)
            }
            _ => String::new(),
        };
        Self {
            indent: "  ".repeat(event.depth),
            hook: event.hook.as_str(),
            name: event.name.clone(),
            context: event.context.to_string(),
            outcome,
        }
    }
}

/// Render events as an indented text timeline, one line per hook call.
///
/// Nesting follows invocation depth. A fault, if any, is the last line.
pub fn render_timeline(events: &[HookEvent], fault: Option<&Fault>) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("timeline", TIMELINE_TEMPLATE)
        .context("load timeline template")?;
    let rows: Vec<TimelineRow> = events.iter().map(TimelineRow::from_event).collect();
    let rendered = env.get_template("timeline")?.render(context! {
        rows => rows,
        fault => fault.map(ToString::to_string),
    })?;
    Ok(rendered)
}

/// Render events as JSON lines.
pub fn render_json_lines(events: &[HookEvent]) -> Result<String> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event).context("serialize hook event")?);
        out.push('\n');
    }
    Ok(out)
}
