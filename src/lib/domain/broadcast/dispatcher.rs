//! Bounded-concurrency fan-out of one message to many recipients

use std::sync::Arc;

use anyhow::anyhow;
use tokio::{
    sync::{mpsc, OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::{
    broadcast::{
        classify,
        errors::TransportError,
        outcome::{FailedRecipient, OutcomeAccumulator},
        CancelToken, DispatchOutcome, FailureKind, Message, Transport, AUTH_REMEDIATION,
    },
    recipients::{RecipientAddress, RecipientSet},
};

/// Attempts in flight when the caller does not choose
pub const DEFAULT_CONCURRENCY: usize = 50;

/// One broadcast: a message, its recipients, and how to run it
#[derive(Debug)]
pub struct DispatchJob {
    recipients: RecipientSet,
    message: Arc<Message>,
    concurrency: usize,
    cancel: Option<CancelToken>,
}

impl DispatchJob {
    /// Create a job with [`DEFAULT_CONCURRENCY`] and no cancellation
    pub fn new(recipients: RecipientSet, message: impl Into<Arc<Message>>) -> Self {
        Self {
            recipients,
            message: message.into(),
            concurrency: DEFAULT_CONCURRENCY,
            cancel: None,
        }
    }

    /// Limit the number of attempts in flight. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Stop admitting attempts once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What a finished attempt sends to the collector
#[derive(Debug)]
struct AttemptReport {
    address: RecipientAddress,
    result: Result<(), TransportError>,
}

/// Owns an attempt's gate permit and its reporting duty.
///
/// If the attempt ends without reporting (panic or abort) the guard reports an
/// unknown failure on drop. The report is always sent before the permit is
/// released.
struct AttemptGuard {
    address: Option<RecipientAddress>,
    reports: mpsc::UnboundedSender<AttemptReport>,
    _permit: OwnedSemaphorePermit,
}

impl AttemptGuard {
    fn report(mut self, result: Result<(), TransportError>) {
        if let Some(address) = self.address.take() {
            let _ = self.reports.send(AttemptReport { address, result });
        }
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if let Some(address) = self.address.take() {
            let _ = self.reports.send(AttemptReport {
                address,
                result: Err(TransportError::UnknownError(anyhow!(
                    "send attempt ended without a result"
                ))),
            });
        }
    }
}

/// The dispatch engine
#[derive(Debug)]
pub struct Dispatcher<T>
where
    T: Transport,
{
    transport: Arc<T>,
}

impl<T> Dispatcher<T>
where
    T: Transport,
{
    /// Create a dispatcher sending through `transport`
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Send `message` to every recipient with at most `concurrency` attempts in flight.
    pub async fn broadcast(
        &self,
        recipients: &RecipientSet,
        message: Arc<Message>,
        concurrency: usize,
    ) -> DispatchOutcome {
        let job = DispatchJob::new(recipients.clone(), message).with_concurrency(concurrency);

        self.run(job, |_| {}).await
    }

    /// Run a broadcast to completion.
    ///
    /// Attempts are admitted in recipient order. A failed attempt is classified
    /// and recorded; it never stops the others. `on_progress` is called once per
    /// delivered recipient, in completion order. Returns when every admitted
    /// attempt has finished.
    pub async fn run<P>(&self, job: DispatchJob, on_progress: P) -> DispatchOutcome
    where
        P: FnMut(&RecipientAddress) + Send,
    {
        let id = Uuid::now_v7();
        let limit = job.concurrency.clamp(1, Semaphore::MAX_PERMITS);
        let span = info_span!("broadcast", %id, recipients = job.recipients.len(), concurrency = limit);

        self.dispatch(id, limit, job, on_progress)
            .instrument(span)
            .await
    }

    async fn dispatch<P>(
        &self,
        id: Uuid,
        limit: usize,
        job: DispatchJob,
        mut on_progress: P,
    ) -> DispatchOutcome
    where
        P: FnMut(&RecipientAddress) + Send,
    {
        let DispatchJob {
            recipients,
            message,
            cancel,
            ..
        } = job;

        let mut accumulator = OutcomeAccumulator::new(id, recipients.len());

        if recipients.is_empty() {
            info!("No recipients, nothing to send");
            return accumulator.finish(Vec::new(), false);
        }

        info!(
            "Starting broadcast to {} recipients (concurrency={})",
            recipients.len(),
            limit
        );

        let gate = Arc::new(Semaphore::new(limit));
        let (reports, mut incoming) = mpsc::unbounded_channel::<AttemptReport>();
        let mut attempts = JoinSet::new();

        let schedule = async {
            let mut cancel = cancel;
            let mut pending = recipients.into_iter();
            let mut skipped = Vec::new();

            while let Some(address) = pending.next() {
                let permit = match cancel.as_mut() {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        permit = Arc::clone(&gate).acquire_owned() => permit.ok(),
                    },
                    None => Arc::clone(&gate).acquire_owned().await.ok(),
                };

                let Some(permit) = permit else {
                    skipped.push(address);
                    skipped.extend(pending);
                    break;
                };

                let guard = AttemptGuard {
                    address: Some(address.clone()),
                    reports: reports.clone(),
                    _permit: permit,
                };
                let transport = Arc::clone(&self.transport);
                let message = Arc::clone(&message);

                attempts.spawn(async move {
                    let result = transport.send_one(&message, &address).await;
                    guard.report(result);
                });
            }

            // the collector stops once every attempt has dropped its sender
            drop(reports);

            skipped
        };

        let collect = async {
            let mut auth_hint_logged = false;

            while let Some(AttemptReport { address, result }) = incoming.recv().await {
                match result {
                    Ok(()) => {
                        info!("Delivered to {}", address);
                        accumulator.record_success();
                        on_progress(&address);
                    }
                    Err(err) => {
                        let kind = classify(&err);

                        match kind {
                            FailureKind::AuthFailure => {
                                error!("Authentication failed sending to {}: {}", address, err);

                                if !auth_hint_logged {
                                    error!("{}", AUTH_REMEDIATION);
                                    auth_hint_logged = true;
                                }
                            }
                            FailureKind::Unknown => {
                                error!("Failed to deliver to {}: {:?}", address, err);
                            }
                            _ => warn!("Failed to deliver to {} ({}): {}", address, kind, err),
                        }

                        accumulator.record_failure(FailedRecipient {
                            address,
                            kind,
                            detail: err.to_string(),
                        });
                    }
                }
            }
        };

        let (skipped, ()) = tokio::join!(schedule, collect);

        while let Some(joined) = attempts.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    error!("Send attempt panicked: {}", err);
                }
            }
        }

        let cancelled = !skipped.is_empty();

        if cancelled {
            warn!(
                "Broadcast cancelled, {} recipients were not attempted",
                skipped.len()
            );
        }

        let outcome = accumulator.finish(skipped, cancelled);

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed.len(),
            skipped = outcome.skipped.len(),
            "Broadcast completed."
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use mockall::predicate::always;
    use testresult::TestResult;

    use crate::domain::broadcast::{cancellation, tests::MockTransport};

    use super::*;

    fn recipients(count: usize) -> RecipientSet {
        (1..=count)
            .map(|i| RecipientAddress::new_unchecked(&format!("r{i}@x.com")))
            .collect()
    }

    /// Sleeps for a fixed delay per attempt and records how many ran at once
    #[derive(Default)]
    struct SlowTransport {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
        panic_for: Option<&'static str>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send_one(
            &self,
            _message: &Message,
            to: &RecipientAddress,
        ) -> Result<(), TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(to.to_string());

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_for == Some(to.as_str()) {
                panic!("transport blew up");
            }

            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_delivered_in_order_when_serialized() -> TestResult {
        let mut transport = MockTransport::new();

        transport
            .expect_send_one()
            .with(always(), always())
            .times(2)
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::new(Arc::new(transport));
        let recipients: RecipientSet = ["a@x.com", "b@x.com"]
            .into_iter()
            .map(RecipientAddress::new_unchecked)
            .collect();

        let mut progress = Vec::new();

        let outcome = dispatcher
            .run(
                DispatchJob::new(recipients, Message::default()).with_concurrency(1),
                |address| progress.push(address.to_string()),
            )
            .await;

        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.succeeded, 2);
        assert!(outcome.failed.is_empty());
        assert!(outcome.is_success());
        assert_eq!(progress, vec!["a@x.com", "b@x.com"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_one_failure_does_not_affect_the_others() -> TestResult {
        let mut transport = MockTransport::new();

        transport
            .expect_send_one()
            .withf(|_, to| to.as_str() == "r5@x.com")
            .times(1)
            .returning(|_, _| {
                Err(TransportError::Rejected {
                    code: 550,
                    message: "5.1.1 mailbox unavailable".to_string(),
                })
            });

        transport
            .expect_send_one()
            .withf(|_, to| to.as_str() != "r5@x.com")
            .times(9)
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::new(Arc::new(transport));

        let mut progress = 0;

        let outcome = dispatcher
            .run(
                DispatchJob::new(recipients(10), Message::default()).with_concurrency(3),
                |_| progress += 1,
            )
            .await;

        assert_eq!(outcome.succeeded, 9);
        assert_eq!(progress, outcome.succeeded);
        assert_eq!(
            outcome.failed,
            vec![FailedRecipient {
                address: RecipientAddress::new_unchecked("r5@x.com"),
                kind: FailureKind::RecipientRejected,
                detail: "server replied 550: 5.1.1 mailbox unavailable".to_string(),
            }]
        );
        assert!(outcome.is_partial_failure());

        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_every_attempt() {
        let mut transport = MockTransport::new();

        transport.expect_send_one().times(3).returning(|_, _| {
            Err(TransportError::Rejected {
                code: 535,
                message: "5.7.8 Username and Password not accepted".to_string(),
            })
        });

        let dispatcher = Dispatcher::new(Arc::new(transport));

        let outcome = dispatcher
            .broadcast(&recipients(3), Arc::new(Message::default()), 2)
            .await;

        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.count_of(FailureKind::AuthFailure), 3);
        assert!(!outcome.is_partial_failure());
    }

    #[tokio::test]
    async fn test_empty_recipient_set_makes_no_calls() {
        let mut transport = MockTransport::new();

        transport.expect_send_one().times(0);

        let dispatcher = Dispatcher::new(Arc::new(transport));

        let outcome = dispatcher
            .broadcast(&RecipientSet::new(), Arc::new(Message::default()), 10)
            .await;

        assert_eq!(outcome.total, 0);
        assert_eq!(outcome.succeeded, 0);
        assert!(outcome.failed.is_empty());
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_never_exceeded() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(20),
            ..Default::default()
        });

        let dispatcher = Dispatcher::new(Arc::clone(&transport));

        let outcome = dispatcher
            .broadcast(&recipients(10), Arc::new(Message::default()), 2)
            .await;

        assert_eq!(outcome.succeeded, 10);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_treated_as_one() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(5),
            ..Default::default()
        });

        let dispatcher = Dispatcher::new(Arc::clone(&transport));

        let outcome = dispatcher
            .broadcast(&recipients(3), Arc::new(Message::default()), 0)
            .await;

        assert_eq!(outcome.succeeded, 3);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_each_recipient_is_attempted_exactly_once() {
        let transport = Arc::new(SlowTransport::default());

        let dispatcher = Dispatcher::new(Arc::clone(&transport));

        dispatcher
            .broadcast(&recipients(25), Arc::new(Message::default()), 7)
            .await;

        let mut calls = transport.calls.lock().unwrap().clone();
        calls.sort();
        calls.dedup();

        assert_eq!(calls.len(), 25);
    }

    #[tokio::test]
    async fn test_panicking_attempt_is_isolated() {
        let transport = Arc::new(SlowTransport {
            panic_for: Some("r2@x.com"),
            ..Default::default()
        });

        let dispatcher = Dispatcher::new(transport);

        let outcome = dispatcher
            .broadcast(&recipients(4), Arc::new(Message::default()), 2)
            .await;

        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].address.as_str(), "r2@x.com");
        assert_eq!(outcome.failed[0].kind, FailureKind::Unknown);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everyone() {
        let mut transport = MockTransport::new();

        transport.expect_send_one().times(0);

        let (handle, token) = cancellation();
        handle.cancel();

        let dispatcher = Dispatcher::new(Arc::new(transport));

        let outcome = dispatcher
            .run(
                DispatchJob::new(recipients(3), Message::default()).with_cancellation(token),
                |_| {},
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.skipped, recipients(3).into_iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_cancellation_stops_admission_but_finishes_in_flight() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(10),
            ..Default::default()
        });

        let (handle, token) = cancellation();

        let dispatcher = Dispatcher::new(Arc::clone(&transport));

        let outcome = dispatcher
            .run(
                DispatchJob::new(recipients(6), Message::default())
                    .with_concurrency(1)
                    .with_cancellation(token),
                |_| handle.cancel(),
            )
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.succeeded >= 1);
        assert!(outcome.skipped.len() >= 4);
        assert_eq!(outcome.succeeded + outcome.skipped.len(), 6);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }
}
