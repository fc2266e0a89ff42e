//! Interactive approval gate and human review on a line-oriented console.
//!
//! ```text
//! approve                  approve the current draft
//! revise <feedback>        ask the planner to revise the draft
//! retry <task> <note>      retry a task that needs a human, with a note
//! handoff <task>           take a task over by hand
//! quit                     stop asking
//! ```

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use deck_coordination::state::HumanAction;
use deck_coordination::{HumanDirective, Orchestrator, Plan, TaskStatus, TasklistView};
use tokio::io::{AsyncBufRead, Lines};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Approve,
    Revise(String),
    Retry { task_id: String, note: String },
    HandOff { task_id: String },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

pub fn parse_console_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "" => Err(ConsoleError::Empty),
        "approve" | "a" => Ok(ConsoleCommand::Approve),
        "quit" | "q" | "exit" => Ok(ConsoleCommand::Quit),
        "revise" => {
            if rest.is_empty() {
                return Err(ConsoleError::Usage("revise <feedback>"));
            }
            Ok(ConsoleCommand::Revise(rest.to_string()))
        }
        "retry" => match rest.split_once(char::is_whitespace) {
            Some((task_id, note)) if !note.trim().is_empty() => Ok(ConsoleCommand::Retry {
                task_id: task_id.to_string(),
                note: note.trim().to_string(),
            }),
            _ => Err(ConsoleError::Usage("retry <task> <note>")),
        },
        "handoff" | "hand-off" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err(ConsoleError::Usage("handoff <task>"));
            }
            Ok(ConsoleCommand::HandOff {
                task_id: rest.to_string(),
            })
        }
        other => Err(ConsoleError::Unknown(other.to_string())),
    }
}

/// Draft plan as shown at the approval gate
pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Draft plan {} ({} slides)", plan.id, plan.len());
    for (i, spec) in plan.slides.iter().enumerate() {
        let _ = writeln!(out, "  [{}] layout {}", i + 1, spec.layout_id);
        for (role, fragment) in &spec.content {
            let _ = writeln!(out, "      {:<16} {}", role.to_string(), one_line(fragment, 60));
        }
        if let Some(instructions) = &spec.instructions {
            let _ = writeln!(out, "      notes            {}", one_line(instructions, 60));
        }
    }
    out
}

/// Tasklist view: one row per slide, explanations for tasks that need a
/// human.
pub fn render_view(view: &TasklistView) -> String {
    let mut out = String::new();
    let c = &view.counts;
    let _ = writeln!(
        out,
        "Plan {} v{}: {} succeeded, {} pending, {} in flight, {} retrying, {} need a human, {} handed off",
        view.plan_id,
        view.plan_version,
        c.succeeded,
        c.pending,
        c.in_flight,
        c.retrying,
        c.needs_human,
        c.handed_off
    );

    for task in &view.tasks {
        let status = if task.handed_off {
            "handed_off".to_string()
        } else {
            task.status.to_string()
        };
        let _ = writeln!(
            out,
            "  [{}] {:<12} attempts {}  {}  {}",
            task.slide_index + 1,
            status,
            task.attempts,
            task.task_id,
            task.last_explanation
                .as_deref()
                .map(|e| one_line(e, 80))
                .unwrap_or_default()
        );
        for correction in &task.corrections {
            let _ = writeln!(out, "        corrected: {}", correction);
        }
        if task.status == TaskStatus::NeedsHuman && !task.actions.is_empty() {
            let actions: Vec<&str> = task
                .actions
                .iter()
                .map(|a| match a {
                    HumanAction::RetryWithNote => "retry <task> <note>",
                    HumanAction::HandOff => "handoff <task>",
                })
                .collect();
            let _ = writeln!(out, "        actions: {}", actions.join(" | "));
        }
    }
    out
}

fn one_line(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}

async fn prompt<R, W>(lines: &mut Lines<R>, out: &mut W, text: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{}", text)?;
    out.flush()?;
    lines.next_line().await.context("Failed to read from console")
}

/// Show the draft until it is approved (`true`) or the user quits (`false`).
/// End of input counts as quitting.
pub async fn approval_gate<R, W>(
    orchestrator: &Orchestrator,
    plan_id: &str,
    lines: &mut Lines<R>,
    out: &mut W,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        let draft = orchestrator
            .draft_plan(plan_id)
            .await
            .with_context(|| format!("Plan {} has no draft", plan_id))?;
        write!(out, "{}", render_plan(&draft))?;

        let Some(line) = prompt(lines, out, "approve | revise <feedback> | quit > ").await? else {
            return Ok(false);
        };
        match parse_console_command(&line) {
            Ok(ConsoleCommand::Approve) => return Ok(true),
            Ok(ConsoleCommand::Quit) => return Ok(false),
            Ok(ConsoleCommand::Revise(feedback)) => {
                if let Err(e) = orchestrator.revise_draft_plan(plan_id, &feedback).await {
                    warn!(plan_id, error = %e, "Revision failed");
                    writeln!(out, "Revision failed, the draft is unchanged: {}", e)?;
                }
            }
            Ok(_) => writeln!(out, "Only approve, revise or quit apply to a draft")?,
            Err(e) => writeln!(out, "{}", e)?,
        }
    }
}

/// Print the settled view and take human decisions until nothing needs a
/// human or the user quits. Returns the last view.
pub async fn review_loop<R, W>(
    orchestrator: &Orchestrator,
    plan_id: &str,
    lines: &mut Lines<R>,
    out: &mut W,
) -> Result<TasklistView>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        let view = orchestrator.wait_for_settled(plan_id).await?;
        write!(out, "{}", render_view(&view))?;
        if view.awaiting_human().next().is_none() {
            return Ok(view);
        }

        let Some(line) = prompt(lines, out, "retry <task> <note> | handoff <task> | quit > ").await?
        else {
            return Ok(view);
        };
        let (task_id, directive) = match parse_console_command(&line) {
            Ok(ConsoleCommand::Retry { task_id, note }) => {
                (task_id, HumanDirective::RetryWithNote { note })
            }
            Ok(ConsoleCommand::HandOff { task_id }) => (task_id, HumanDirective::HandOff),
            Ok(ConsoleCommand::Quit) => return Ok(view),
            Ok(_) => {
                writeln!(out, "Only retry, handoff or quit apply now")?;
                continue;
            }
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };

        if let Err(e) = orchestrator.on_human_feedback(&task_id, directive).await {
            writeln!(out, "Not applied: {}", e)?;
        }
    }
}
