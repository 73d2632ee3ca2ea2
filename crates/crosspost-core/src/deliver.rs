//! Fan-out delivery over one backend session.

use tracing::{debug, info};

use crate::{
    domain::{BatchResult, ContentPayload, DeliveryOutcome, DeliveryStatus, Recipient},
    errors::Error,
    ports::SendGate,
    session::Session,
    Result,
};

/// Re-enables the caller's send affordance when the batch is over, on every
/// exit path.
struct GateGuard<'a> {
    gate: &'a dyn SendGate,
}

impl<'a> GateGuard<'a> {
    fn engage(gate: &'a dyn SendGate) -> Self {
        gate.set_busy(true);
        Self { gate }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.set_busy(false);
    }
}

/// Delivers `payload` to every recipient, one attempt each, in input order.
///
/// Holds the session's exclusive lock for the whole batch: concurrent
/// batches on the same session queue behind each other, while batches on
/// other sessions proceed in parallel. A failed recipient is recorded into
/// the error list and the loop moves on; the batch always runs to
/// completion, with exactly one outcome per recipient and no retries.
pub async fn deliver_all(
    session: &Session,
    recipients: &[Recipient],
    payload: &ContentPayload,
    ui_gate: &dyn SendGate,
) -> Result<BatchResult> {
    if payload.is_empty() {
        return Err(Error::EmptyPayload);
    }

    let _serialized = session.gate().lock().await;
    let _busy = GateGuard::engage(ui_gate);

    info!(
        backend = %session.backend(),
        recipients = recipients.len(),
        "delivering batch"
    );

    let mut result = BatchResult::default();
    for recipient in recipients {
        let status = match session.sender().send(recipient, payload).await {
            Ok(()) => {
                debug!(%recipient, "delivered");
                DeliveryStatus::Delivered
            }
            Err(e) => {
                debug!(%recipient, error = %e, "send failed");
                DeliveryStatus::Failed(e.to_string())
            }
        };
        result.record(DeliveryOutcome {
            recipient: recipient.clone(),
            status,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::Backend;
    use crate::ports::{NullGate, SendPort};

    /// Sender that records attempts, fails selected recipients, and keeps a
    /// high-water mark of concurrent in-flight sends.
    #[derive(Default)]
    struct FakeSender {
        fail: Vec<String>,
        sent: StdMutex<Vec<String>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl FakeSender {
        fn failing(recipients: &[&str]) -> Self {
            Self {
                fail: recipients.iter().map(|r| r.to_string()).collect(),
                ..Self::default()
            }
        }

        fn with_gauge(in_flight: Arc<AtomicUsize>, max_in_flight: Arc<AtomicUsize>) -> Self {
            Self {
                in_flight,
                max_in_flight,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SendPort for FakeSender {
        async fn send(&self, recipient: &Recipient, _payload: &ContentPayload) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let key = recipient.to_string();
            self.sent.lock().unwrap().push(key.clone());
            if self.fail.contains(&key) {
                return Err(Error::External("simulated outage".to_string()));
            }
            Ok(())
        }
    }

    struct RecordingGate {
        busy: AtomicBool,
        transitions: StdMutex<Vec<bool>>,
    }

    impl RecordingGate {
        fn new() -> Self {
            Self {
                busy: AtomicBool::new(false),
                transitions: StdMutex::new(Vec::new()),
            }
        }
    }

    impl SendGate for RecordingGate {
        fn set_busy(&self, busy: bool) {
            self.busy.store(busy, Ordering::SeqCst);
            self.transitions.lock().unwrap().push(busy);
        }
    }

    fn recipients(names: &[&str]) -> Vec<Recipient> {
        names
            .iter()
            .map(|n| Recipient::Channel(n.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn one_outcome_per_recipient_in_input_order() {
        let session = Session::new(Backend::Telegram, Arc::new(FakeSender::default()));
        let targets = recipients(&["@a", "@b", "@c"]);

        let result = deliver_all(&session, &targets, &ContentPayload::text("hi"), &NullGate)
            .await
            .unwrap();

        assert_eq!(result.attempted(), targets.len());
        assert_eq!(result.ok, vec!["@a", "@b", "@c"]);
        assert!(result.errors.is_empty());
        assert!(result.is_full_success());
    }

    #[tokio::test]
    async fn failure_in_the_middle_does_not_stop_the_batch() {
        let session = Session::new(
            Backend::Telegram,
            Arc::new(FakeSender::failing(&["@b"])),
        );
        let targets = recipients(&["@a", "@b", "@c"]);

        let result = deliver_all(&session, &targets, &ContentPayload::text("hi"), &NullGate)
            .await
            .unwrap();

        assert_eq!(result.ok, vec!["@a", "@c"]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("@b: "));
        assert!(result.is_partial());
        assert_eq!(result.attempted(), targets.len());
    }

    #[tokio::test]
    async fn empty_payload_is_rejected_before_any_send() {
        let sender = Arc::new(FakeSender::default());
        let session = Session::new(Backend::Telegram, sender.clone());
        let targets = recipients(&["@a"]);

        let err = deliver_all(&session, &targets, &ContentPayload::default(), &NullGate)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmptyPayload));
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batches_on_the_same_session_never_interleave() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));
        let sender = Arc::new(FakeSender::with_gauge(in_flight, max.clone()));
        let session = Arc::new(Session::new(Backend::Telegram, sender));

        let payload = ContentPayload::text("hi");
        let a = {
            let session = session.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                deliver_all(&session, &recipients(&["@a1", "@a2"]), &payload, &NullGate).await
            })
        };
        let b = {
            let session = session.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                deliver_all(&session, &recipients(&["@b1", "@b2"]), &payload, &NullGate).await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(max.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batches_on_different_sessions_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));
        let telegram = Arc::new(Session::new(
            Backend::Telegram,
            Arc::new(FakeSender::with_gauge(in_flight.clone(), max.clone())),
        ));
        let slack = Arc::new(Session::new(
            Backend::Slack,
            Arc::new(FakeSender::with_gauge(in_flight, max.clone())),
        ));

        let payload = ContentPayload::text("hi");
        let telegram_targets = recipients(&["@t1", "@t2"]);
        let slack_targets = recipients(&["#s1", "#s2"]);
        let (a, b) = tokio::join!(
            deliver_all(&telegram, &telegram_targets, &payload, &NullGate),
            deliver_all(&slack, &slack_targets, &payload, &NullGate),
        );
        a.unwrap();
        b.unwrap();

        assert!(max.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn ui_gate_is_released_even_on_total_failure() {
        let session = Session::new(
            Backend::Slack,
            Arc::new(FakeSender::failing(&["#a", "#b"])),
        );
        let gate = RecordingGate::new();
        let targets = recipients(&["#a", "#b"]);

        let result = deliver_all(&session, &targets, &ContentPayload::text("hi"), &gate)
            .await
            .unwrap();

        assert!(result.is_full_failure());
        assert!(!gate.busy.load(Ordering::SeqCst));
        assert_eq!(gate.transitions.lock().unwrap().as_slice(), &[true, false]);
    }
}
