//! Built-in support tools.

use chrono::Local;
use serde_json::{Value, json};

use super::registry::{ToolCategory, ToolRegistry};
use crate::session::state::{MAX_CHECKIN_MINUTES, SessionState, StepAdvance};

fn str_arg<'a>(args: &'a Value, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Numeric argument; providers sometimes send integers as floats.
fn num_arg(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key)
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|n| n.is_finite())
        .unwrap_or(default)
}

/// Render whole numbers without a trailing `.0`.
fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn object(properties: Value) -> Value {
    json!({ "type": "object", "properties": properties })
}

fn create_microsteps(state: &mut SessionState, args: &Value) -> String {
    let task = str_arg(args, "task", "task");
    let count = num_arg(args, "count", 3.0);
    state.start_task(task, count.max(0.0) as u32);
    format!("Created {} micro-steps for: {task}", fmt_num(count))
}

fn get_current_step(state: &mut SessionState, _args: &Value) -> String {
    let Some(progress) = state.current_task.as_ref() else {
        return "No active task".to_string();
    };
    let step = progress.current_step + 1;
    if step > progress.total_steps {
        return format!(
            "All {} steps complete for: {}",
            progress.total_steps, progress.task
        );
    }
    format!(
        "Step {step} of {} for: {}",
        progress.total_steps, progress.task
    )
}

fn mark_step_complete(state: &mut SessionState, _args: &Value) -> String {
    match state.complete_step() {
        StepAdvance::NoActiveTask => "No active task to update".to_string(),
        StepAdvance::Advanced { step, remaining } => {
            format!("Step {step} complete! {remaining} steps remaining.")
        }
        StepAdvance::Finished { task, total } => {
            format!("All done! Completed all {total} steps for: {task}")
        }
    }
}

fn get_current_time(_state: &mut SessionState, _args: &Value) -> String {
    Local::now().format("%I:%M %p").to_string()
}

fn create_reminder(_state: &mut SessionState, args: &Value) -> String {
    let task = str_arg(args, "task", "task");
    let minutes = num_arg(args, "minutes", 5.0);
    format!("Reminder set: '{task}' in {} minutes", fmt_num(minutes))
}

fn schedule_checkin(state: &mut SessionState, args: &Value) -> String {
    let minutes = num_arg(args, "minutes", 3.0);
    match state.schedule_checkin(minutes) {
        Some(_) => format!("Check-in scheduled for {} minutes from now", fmt_num(minutes)),
        None => format!(
            "Can't schedule a check-in {} minutes out; pick 0 to {} minutes",
            fmt_num(minutes),
            fmt_num(MAX_CHECKIN_MINUTES)
        ),
    }
}

fn get_time_since_last_checkin(state: &mut SessionState, _args: &Value) -> String {
    match state.minutes_since_checkin() {
        Some(elapsed) => format!("{elapsed:.1} minutes since last check-in"),
        None => "No previous check-in recorded".to_string(),
    }
}

fn log_micro_win(state: &mut SessionState, args: &Value) -> String {
    let description = str_arg(args, "description", "accomplishment");
    let category = str_arg(args, "category", "general");
    state.log_win(description);
    format!("Win logged ({category}): {description}")
}

/// Older name for `log_micro_win`; ignores the category.
fn log_win(state: &mut SessionState, args: &Value) -> String {
    let description = str_arg(args, "description", "");
    log_micro_win(state, &json!({ "description": description }))
}

fn start_breathing_exercise(_state: &mut SessionState, args: &Value) -> String {
    let breaths = num_arg(args, "breaths", 3.0);
    if breaths <= 3.0 {
        return "Quick reset: Breathe in slowly... hold... breathe out. Let's do that together."
            .to_string();
    }
    format!(
        "Let's take {} slow breaths together. I'll count with you.",
        fmt_num(breaths)
    )
}

fn sensory_check(_state: &mut SessionState, _args: &Value) -> String {
    "Quick sensory check - is it the noise, the light, or something in your body that's bothering you?"
        .to_string()
}

fn grounding_exercise(_state: &mut SessionState, args: &Value) -> String {
    match str_arg(args, "technique", "5-4-3-2-1") {
        "5-4-3-2-1" => "Name 5 things you can see right now.",
        "body_scan" => "Notice your feet on the floor. Feel your hands.",
        _ => "What's one thing you can see right in front of you?",
    }
    .to_string()
}

fn suggest_break(_state: &mut SessionState, args: &Value) -> String {
    let minutes = num_arg(args, "duration_minutes", 5.0);
    if minutes <= 2.0 {
        "Quick 2-minute reset - step away, stretch, come back fresh.".to_string()
    } else if minutes <= 5.0 {
        format!(
            "Take {} minutes. Get some water, move around a bit.",
            fmt_num(minutes)
        )
    } else {
        format!(
            "Let's take a proper {}-minute break. Set a timer and really step away.",
            fmt_num(minutes)
        )
    }
}

fn reframe_thought(_state: &mut SessionState, args: &Value) -> String {
    match str_arg(args, "thought_type", "overwhelm") {
        "perfectionism" => "This is prototype mode - it just needs to exist, not be perfect.",
        "catastrophizing" => "What do we actually know for sure vs. what we're imagining?",
        "rsd" => "That feeling is real and intense. Let's separate the feeling from the facts.",
        "overwhelm" => "You don't have to solve everything. What's ONE tiny thing?",
        "imposter" => "You're learning. Everyone starts somewhere.",
        _ => "Let's pause and look at this from a different angle.",
    }
    .to_string()
}

/// Register every built-in tool on `registry`.
pub fn register_builtins(registry: &mut ToolRegistry) {
    use ToolCategory::*;

    registry.register(
        "create_microsteps",
        "Break a task into small micro-steps and start tracking it",
        TaskCreation,
        object(json!({
            "task": { "type": "string" },
            "count": { "type": "integer" }
        })),
        create_microsteps,
    );
    registry.register(
        "get_current_step",
        "Get the micro-step the user should work on now",
        Informational,
        object(json!({})),
        get_current_step,
    );
    registry.register(
        "mark_step_complete",
        "Mark the current micro-step as done",
        StepProgress,
        object(json!({})),
        mark_step_complete,
    );
    registry.register(
        "get_current_time",
        "Get the current local time",
        Informational,
        object(json!({})),
        get_current_time,
    );
    registry.register(
        "create_reminder",
        "Set a reminder for a task",
        Scheduling,
        object(json!({
            "task": { "type": "string" },
            "minutes": { "type": "number" }
        })),
        create_reminder,
    );
    registry.register(
        "schedule_checkin",
        "Schedule a check-in with the user",
        Scheduling,
        object(json!({ "minutes": { "type": "number" } })),
        schedule_checkin,
    );
    registry.register(
        "get_time_since_last_checkin",
        "Minutes since the last check-in was scheduled",
        Informational,
        object(json!({})),
        get_time_since_last_checkin,
    );
    registry.register(
        "log_micro_win",
        "Log a small win",
        WinLogging,
        object(json!({
            "description": { "type": "string" },
            "category": { "type": "string" }
        })),
        log_micro_win,
    );
    registry.register(
        "log_win",
        "Log a small win",
        WinLogging,
        object(json!({ "description": { "type": "string" } })),
        log_win,
    );
    registry.register(
        "start_breathing_exercise",
        "Guide a short breathing exercise",
        Regulation,
        object(json!({ "breaths": { "type": "integer" } })),
        start_breathing_exercise,
    );
    registry.register(
        "sensory_check",
        "Prompt a quick check of the sensory environment",
        Regulation,
        object(json!({})),
        sensory_check,
    );
    registry.register(
        "grounding_exercise",
        "Start a grounding exercise",
        Regulation,
        object(json!({
            "technique": { "type": "string", "enum": ["5-4-3-2-1", "body_scan", "simple"] }
        })),
        grounding_exercise,
    );
    registry.register(
        "suggest_break",
        "Suggest a structured break",
        Regulation,
        object(json!({ "duration_minutes": { "type": "number" } })),
        suggest_break,
    );
    registry.register(
        "reframe_thought",
        "Offer a reframe for a negative thought pattern",
        Regulation,
        object(json!({
            "thought_type": {
                "type": "string",
                "enum": ["perfectionism", "catastrophizing", "rsd", "overwhelm", "imposter"]
            }
        })),
        reframe_thought,
    );
}

impl ToolRegistry {
    /// Registry preloaded with the built-in support tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }
}
