//! Retry-feedback builder
//!
//! Shapes the follow-up prompt for the next attempt from what the scorers
//! said about the previous ones: compile diagnostics, diff output, a
//! reminder of the best candidate so far, and stall recovery when the
//! difference count stops improving.

use tracing::debug;

use crate::pipeline::AttemptSummary;
use crate::plugins::agent::AGENT_PLUGIN_ID;
use crate::plugins::compiler::COMPILER_PLUGIN_ID;
use crate::plugins::objdiff::OBJDIFF_PLUGIN_ID;

pub const STALL_RECOVERY_MESSAGE: &str = "You appear to be stuck: the difference count has not improved \
     over the last several attempts. Step back, re-read the target assembly, and re-derive the control \
     flow from scratch instead of patching the previous candidate.";

/// Remembers how many scored attempts had accumulated at the last stall
/// trigger, so recovery does not re-fire on every following attempt.
#[derive(Debug, Default)]
pub struct StallTracker {
    qualifying_at_trigger: usize,
}

/// Difference count of an attempt, if it compiled and was scored
pub fn difference_count(summary: &AttemptSummary) -> Option<u64> {
    summary
        .result(OBJDIFF_PLUGIN_ID)?
        .data
        .as_ref()?
        .get("differenceCount")?
        .as_u64()
}

/// Candidate source an attempt produced
pub fn generated_code(summary: &AttemptSummary) -> Option<&str> {
    summary
        .result(AGENT_PLUGIN_ID)?
        .data
        .as_ref()?
        .get("generatedCode")?
        .as_str()
}

/// Build the follow-up prompt for the next attempt
pub fn build_followup(previous: &[AttemptSummary], tracker: &mut StallTracker, stall_threshold: usize) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(last) = previous.last() {
        if let Some(compiler) = last.result(COMPILER_PLUGIN_ID).filter(|r| r.failed()) {
            let diagnostics = compiler
                .output
                .clone()
                .or_else(|| compiler.error.clone())
                .unwrap_or_default();
            sections.push(format!(
                "The code failed to compile:\n{diagnostics}\nFix the errors and provide the corrected function."
            ));
        } else if let Some(objdiff) = last.result(OBJDIFF_PLUGIN_ID) {
            let diff = objdiff
                .output
                .clone()
                .or_else(|| objdiff.error.clone())
                .unwrap_or_default();
            let count = difference_count(last)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "some".to_string());
            sections.push(format!(
                "The code compiled but the assembly does not match the target ({count} differences remain).\n\
                 {diff}\nAdjust the code so the generated assembly matches exactly."
            ));
        } else if let Some(agent) = last.result(AGENT_PLUGIN_ID).filter(|r| r.failed()) {
            sections.push(format!(
                "The previous attempt failed: {}",
                agent.error.clone().unwrap_or_default()
            ));
        } else {
            sections.push("The previous attempt failed. Try a different approach.".to_string());
        }
    }

    if let Some(reminder) = best_attempt_reminder(previous) {
        sections.push(reminder);
    }

    if stall_detected(previous, tracker, stall_threshold) {
        debug!("stall detected, appending recovery guidance");
        sections.push(STALL_RECOVERY_MESSAGE.to_string());
    }

    sections.join("\n\n")
}

/// A stall is `stall_threshold` scored attempts since the last trigger with
/// no improvement from the first to the last of that window. Triggering
/// re-arms only after `stall_threshold` new scored attempts accumulate.
fn stall_detected(previous: &[AttemptSummary], tracker: &mut StallTracker, stall_threshold: usize) -> bool {
    if stall_threshold == 0 {
        return false;
    }

    let qualifying: Vec<u64> = previous.iter().filter_map(difference_count).collect();
    let start = tracker.qualifying_at_trigger.min(qualifying.len());
    let fresh = &qualifying[start..];
    if fresh.len() < stall_threshold {
        return false;
    }

    let window = &fresh[fresh.len() - stall_threshold..];
    if window[window.len() - 1] >= window[0] {
        tracker.qualifying_at_trigger = qualifying.len();
        return true;
    }
    false
}

/// When the latest compiled attempt regressed against the best prior one,
/// remind the model of the best candidate and its score.
fn best_attempt_reminder(previous: &[AttemptSummary]) -> Option<String> {
    let compiled: Vec<(usize, u64)> = previous
        .iter()
        .enumerate()
        .filter_map(|(index, summary)| difference_count(summary).map(|count| (index, count)))
        .collect();

    let (_, last_count) = *compiled.last()?;
    let (best_index, best_count) = compiled[..compiled.len() - 1]
        .iter()
        .copied()
        .min_by_key(|(_, count)| *count)?;

    if last_count <= best_count {
        return None;
    }

    let code = generated_code(&previous[best_index])?;
    Some(format!(
        "Reminder: attempt {} is still your best result ({} differences). Its code:\n```c\n{}\n```\n\
         Start from it rather than from the latest candidate.",
        previous[best_index].attempt_number, best_count, code
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PluginResult;
    use std::collections::HashMap;

    fn compiled_attempt(attempt_number: u32, count: u64, code: &str) -> AttemptSummary {
        let mut results = HashMap::new();
        results.insert(
            AGENT_PLUGIN_ID.to_string(),
            PluginResult::success(AGENT_PLUGIN_ID, "Claude Agent")
                .with_data(serde_json::json!({ "generatedCode": code })),
        );
        results.insert(
            COMPILER_PLUGIN_ID.to_string(),
            PluginResult::success(COMPILER_PLUGIN_ID, "Compiler"),
        );
        results.insert(
            OBJDIFF_PLUGIN_ID.to_string(),
            PluginResult::failure(OBJDIFF_PLUGIN_ID, "Object Diff", "Assembly does not match target")
                .with_output(format!("{count} difference(s) against the target."))
                .with_data(serde_json::json!({ "differenceCount": count })),
        );
        AttemptSummary {
            attempt_number,
            results,
        }
    }

    fn failed_compile_attempt(attempt_number: u32, diagnostics: &str) -> AttemptSummary {
        let mut results = HashMap::new();
        results.insert(
            AGENT_PLUGIN_ID.to_string(),
            PluginResult::success(AGENT_PLUGIN_ID, "Claude Agent")
                .with_data(serde_json::json!({ "generatedCode": "int broken(void)" })),
        );
        results.insert(
            COMPILER_PLUGIN_ID.to_string(),
            PluginResult::failure(COMPILER_PLUGIN_ID, "Compiler", "Compilation failed").with_output(diagnostics),
        );
        AttemptSummary {
            attempt_number,
            results,
        }
    }

    #[test]
    fn test_compile_errors_shape_the_followup() {
        let previous = vec![failed_compile_attempt(1, "walk.c:3: error: expected ';'")];
        let mut tracker = StallTracker::default();

        let followup = build_followup(&previous, &mut tracker, 3);
        assert!(followup.contains("failed to compile"));
        assert!(followup.contains("expected ';'"));
        assert!(!followup.contains(STALL_RECOVERY_MESSAGE));
    }

    #[test]
    fn test_diff_output_shapes_the_followup() {
        let previous = vec![compiled_attempt(1, 9, "int walk(void) { return 9; }")];
        let mut tracker = StallTracker::default();

        let followup = build_followup(&previous, &mut tracker, 3);
        assert!(followup.contains("9 differences remain"));
        assert!(followup.contains("does not match the target"));
    }

    #[test]
    fn test_stall_triggers_after_threshold_flat_attempts() {
        let previous: Vec<AttemptSummary> = (1..=3)
            .map(|n| compiled_attempt(n, 10, "int walk(void) { return 1; }"))
            .collect();
        let mut tracker = StallTracker::default();

        let followup = build_followup(&previous, &mut tracker, 3);
        assert!(followup.contains(STALL_RECOVERY_MESSAGE));
    }

    #[test]
    fn test_stall_does_not_retrigger_until_rearmed() {
        let mut tracker = StallTracker::default();

        // Attempts 1..3 at 10: triggers.
        let mut previous: Vec<AttemptSummary> = (1..=3)
            .map(|n| compiled_attempt(n, 10, "int walk(void) { return 1; }"))
            .collect();
        assert!(build_followup(&previous, &mut tracker, 3).contains(STALL_RECOVERY_MESSAGE));

        // Attempt 4 still at 10: no retrigger, the tracker is not re-armed.
        previous.push(compiled_attempt(4, 10, "int walk(void) { return 1; }"));
        assert!(!build_followup(&previous, &mut tracker, 3).contains(STALL_RECOVERY_MESSAGE));

        // Attempts 5 and 6 accumulate the three fresh scored attempts: re-triggers.
        previous.push(compiled_attempt(5, 10, "int walk(void) { return 1; }"));
        previous.push(compiled_attempt(6, 10, "int walk(void) { return 1; }"));
        assert!(build_followup(&previous, &mut tracker, 3).contains(STALL_RECOVERY_MESSAGE));
    }

    #[test]
    fn test_stall_skips_compile_failures() {
        // Two scored attempts split by compile failures never fill the window.
        let previous = vec![
            compiled_attempt(1, 10, "a"),
            failed_compile_attempt(2, "boom"),
            failed_compile_attempt(3, "boom"),
            compiled_attempt(4, 10, "b"),
        ];
        let mut tracker = StallTracker::default();

        assert!(!build_followup(&previous, &mut tracker, 3).contains(STALL_RECOVERY_MESSAGE));
    }

    #[test]
    fn test_improving_window_is_not_a_stall() {
        let previous = vec![
            compiled_attempt(1, 10, "a"),
            compiled_attempt(2, 8, "b"),
            compiled_attempt(3, 5, "c"),
        ];
        let mut tracker = StallTracker::default();

        assert!(!build_followup(&previous, &mut tracker, 3).contains(STALL_RECOVERY_MESSAGE));
    }

    #[test]
    fn test_best_attempt_reminder_on_regression() {
        let previous = vec![
            compiled_attempt(1, 4, "int walk(void) { return 4; }"),
            compiled_attempt(2, 11, "int walk(void) { return 11; }"),
        ];
        let mut tracker = StallTracker::default();

        let followup = build_followup(&previous, &mut tracker, 5);
        assert!(followup.contains("attempt 1 is still your best result (4 differences)"));
        assert!(followup.contains("int walk(void) { return 4; }"));
    }

    #[test]
    fn test_no_reminder_when_improving() {
        let previous = vec![
            compiled_attempt(1, 11, "int walk(void) { return 11; }"),
            compiled_attempt(2, 4, "int walk(void) { return 4; }"),
        ];
        let mut tracker = StallTracker::default();

        let followup = build_followup(&previous, &mut tracker, 5);
        assert!(!followup.contains("still your best result"));
    }

    #[test]
    fn test_no_reminder_when_matching_best() {
        let previous = vec![compiled_attempt(1, 4, "a"), compiled_attempt(2, 4, "b")];
        let mut tracker = StallTracker::default();

        let followup = build_followup(&previous, &mut tracker, 5);
        assert!(!followup.contains("still your best result"));
    }
}
