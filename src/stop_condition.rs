//! Stop conditions for the step loop.
//!
//! Conditions are evaluated after each step that produced tool outputs. If any
//! condition in the run's list returns `true`, the loop stops.

use crate::step::StepResult;

/// A predicate over the steps recorded so far.
pub trait StopCondition: Send + Sync {
    /// Check if the loop should stop based on the current steps.
    fn should_stop(&self, steps: &[StepResult]) -> bool;
}

/// OR-combine a list of conditions. An empty list never stops.
pub fn is_stop_condition_met(conditions: &[Box<dyn StopCondition>], steps: &[StepResult]) -> bool {
    conditions.iter().any(|c| c.should_stop(steps))
}

/// Stop when the number of steps reaches a specified count.
pub struct StepCountIs {
    count: usize,
}

impl StopCondition for StepCountIs {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.len() >= self.count
    }
}

/// Create a stop condition that stops after a specific number of steps.
///
/// # Example
///
/// ```rust,ignore
/// let condition = step_count_is(10); // Stop after 10 steps
/// ```
pub fn step_count_is(count: usize) -> Box<dyn StopCondition> {
    Box::new(StepCountIs { count })
}

/// Stop when the last step called a specific tool.
pub struct HasToolCall {
    tool_name: String,
}

impl StopCondition for HasToolCall {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.last().is_some_and(|last| {
            last.tool_calls()
                .iter()
                .any(|call| call.tool_name == self.tool_name)
        })
    }
}

/// Create a stop condition that stops when a specific tool is called.
///
/// ```rust,ignore
/// let condition = has_tool_call("finalAnswer");
/// ```
pub fn has_tool_call(tool_name: impl Into<String>) -> Box<dyn StopCondition> {
    Box::new(HasToolCall {
        tool_name: tool_name.into(),
    })
}

/// Stop when the last step produced text and called no tools.
pub struct HasTextResponse;

impl StopCondition for HasTextResponse {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps
            .last()
            .is_some_and(|last| last.tool_calls().is_empty() && !last.text().is_empty())
    }
}

pub fn has_text_response() -> Box<dyn StopCondition> {
    Box::new(HasTextResponse)
}

/// Stops when ANY of the conditions are met.
pub struct AnyOf {
    conditions: Vec<Box<dyn StopCondition>>,
}

impl StopCondition for AnyOf {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        is_stop_condition_met(&self.conditions, steps)
    }
}

/// ```rust,ignore
/// let condition = any_of(vec![
///     step_count_is(20),
///     has_tool_call("finalAnswer"),
/// ]);
/// ```
pub fn any_of(conditions: Vec<Box<dyn StopCondition>>) -> Box<dyn StopCondition> {
    Box::new(AnyOf { conditions })
}

/// Stops when ALL of the conditions are met. An empty list never stops.
pub struct AllOf {
    conditions: Vec<Box<dyn StopCondition>>,
}

impl StopCondition for AllOf {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.should_stop(steps))
    }
}

pub fn all_of(conditions: Vec<Box<dyn StopCondition>>) -> Box<dyn StopCondition> {
    Box::new(AllOf { conditions })
}

/// Custom stop condition using a closure.
pub struct CustomCondition<F>
where
    F: Fn(&[StepResult]) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> StopCondition for CustomCondition<F>
where
    F: Fn(&[StepResult]) -> bool + Send + Sync,
{
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        (self.predicate)(steps)
    }
}

/// Create a custom stop condition using a closure.
///
/// ```rust,ignore
/// let condition = custom_condition(|steps| {
///     steps.iter().any(|s| s.tool_calls().len() > 3)
/// });
/// ```
pub fn custom_condition<F>(predicate: F) -> Box<dyn StopCondition>
where
    F: Fn(&[StepResult]) -> bool + Send + Sync + 'static,
{
    Box::new(CustomCondition { predicate })
}

/// Stop when the last step has tool results.
pub struct HasToolResult;

impl StopCondition for HasToolResult {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps
            .last()
            .is_some_and(|last| !last.tool_results().is_empty())
    }
}

pub fn has_tool_result() -> Box<dyn StopCondition> {
    Box::new(HasToolResult)
}

/// Stop when the last step has no tool calls.
pub struct HasNoToolCalls;

impl StopCondition for HasNoToolCalls {
    fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.last().is_some_and(|last| last.tool_calls().is_empty())
    }
}

pub fn has_no_tool_calls() -> Box<dyn StopCondition> {
    Box::new(HasNoToolCalls)
}
