//! Rendering a batch result for the caller.

use crate::domain::{Backend, BatchResult};

/// Lines shown to the user after a batch.
///
/// A partial failure always shows both sides; a batch with errors is never
/// summarized as a success.
pub fn render(backend: Backend, result: &BatchResult) -> String {
    if result.ok.is_empty() && result.errors.is_empty() {
        return format!("{backend}: nothing to deliver");
    }

    let mut out = String::new();
    if !result.ok.is_empty() {
        out.push_str(&format!("{backend}: delivered to {}\n", result.ok.join(", ")));
    }
    if !result.errors.is_empty() {
        out.push_str(&format!("{backend}: failed:\n"));
        for line in &result.errors {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryOutcome, DeliveryStatus, Recipient};

    fn batch(ok: &[&str], failed: &[(&str, &str)]) -> BatchResult {
        let mut result = BatchResult::default();
        for r in ok {
            result.record(DeliveryOutcome {
                recipient: Recipient::Channel(r.to_string()),
                status: DeliveryStatus::Delivered,
            });
        }
        for (r, reason) in failed {
            result.record(DeliveryOutcome {
                recipient: Recipient::Channel(r.to_string()),
                status: DeliveryStatus::Failed(reason.to_string()),
            });
        }
        result
    }

    #[test]
    fn full_success_lists_recipients() {
        let out = render(Backend::Slack, &batch(&["#general", "#dev"], &[]));
        assert_eq!(out, "Slack: delivered to #general, #dev");
    }

    #[test]
    fn partial_failure_shows_both_lists() {
        let out = render(Backend::Telegram, &batch(&["@a"], &[("@b", "boom")]));
        assert!(out.contains("delivered to @a"));
        assert!(out.contains("failed:"));
        assert!(out.contains("@b: boom"));
    }

    #[test]
    fn full_failure_never_reads_as_success() {
        let out = render(Backend::Telegram, &batch(&[], &[("@b", "boom")]));
        assert!(!out.contains("delivered"));
        assert!(out.contains("@b: boom"));
    }

    #[test]
    fn empty_batch_reports_nothing_to_deliver() {
        let out = render(Backend::Slack, &BatchResult::default());
        assert_eq!(out, "Slack: nothing to deliver");
    }
}
