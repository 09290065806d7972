use kiwi_providers::Usage;
use std::time::Duration;

/// Token counts and timing for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMetrics {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub wall_time: Duration,
    pub model_time: Duration,
    pub tool_time: Duration,
}

impl ResponseMetrics {
    pub fn add_usage(&mut self, usage: &Usage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
    }

    /// Record the turn's wall time; never less than model plus tool time.
    pub fn finish(&mut self, wall_time: Duration) {
        self.wall_time = wall_time.max(self.model_time + self.tool_time);
    }

    /// Time spent neither waiting on the model nor running tools.
    pub fn overhead(&self) -> Duration {
        self.wall_time.saturating_sub(self.model_time + self.tool_time)
    }

    pub fn format_summary(&self, label: &str) -> String {
        format!(
            "[{}] Tokens: {} prompt + {} completion = {} total | Time: {:.2}s (LLM: {:.2}s, Tools: {:.2}s, Other: {:.2}s)",
            label,
            self.prompt_tokens,
            self.completion_tokens,
            self.total_tokens,
            self.wall_time.as_secs_f64(),
            self.model_time.as_secs_f64(),
            self.tool_time.as_secs_f64(),
            self.overhead().as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_time_covers_components() {
        let mut metrics = ResponseMetrics {
            model_time: Duration::from_millis(700),
            tool_time: Duration::from_millis(500),
            ..Default::default()
        };
        metrics.finish(Duration::from_millis(1000));
        assert_eq!(metrics.wall_time, Duration::from_millis(1200));
        assert_eq!(metrics.overhead(), Duration::ZERO);

        metrics.finish(Duration::from_millis(1500));
        assert_eq!(metrics.overhead(), Duration::from_millis(300));
    }

    #[test]
    fn test_summary_format() {
        let mut metrics = ResponseMetrics::default();
        metrics.add_usage(&Usage::new(120, 30));
        metrics.model_time = Duration::from_millis(1500);
        metrics.tool_time = Duration::from_millis(250);
        metrics.finish(Duration::from_millis(2000));

        assert_eq!(
            metrics.format_summary("mock/mock-model"),
            "[mock/mock-model] Tokens: 120 prompt + 30 completion = 150 total | Time: 2.00s (LLM: 1.50s, Tools: 0.25s, Other: 0.25s)"
        );
    }
}
