//! Request/response correlation.
//!
//! The wire protocol carries no request identifiers: the only way to match a
//! response to its command is to guarantee that at most one command is in
//! flight per session. The correlator enforces that with a single command
//! slot, matches the next framed line to the most recently written command,
//! applies the per-attempt timeout, and retries per policy.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tracing::{debug, warn};

use crate::ble::transport::CommandTransport;
use crate::error::{Error, Result};
use crate::policy::RetryPolicy;
use crate::protocol::{Command, Response};

/// Serializes command execution over one transport session.
pub struct RequestCorrelator {
    /// Write side of the session.
    transport: Arc<dyn CommandTransport>,
    /// Framed response lines from the notification pump.
    ///
    /// The mutex doubles as the command slot: whoever holds it owns the
    /// session's single in-flight command.
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Retry budget shared by all commands in the session.
    policy: RetryPolicy,
}

impl RequestCorrelator {
    /// Create a correlator over a transport and its line stream.
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        lines: mpsc::UnboundedReceiver<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            lines: Mutex::new(lines),
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
        }
    }

    /// Execute one command and decode its response.
    ///
    /// Fails fast with [`Error::Busy`] if another command is in flight:
    /// callers serialize explicitly or accept rejection; nothing queues.
    /// Timeouts are retried with backoff until the attempt budget runs out;
    /// decode failures surface immediately since a garbled reply will not
    /// self-correct. The command slot is released on every exit path,
    /// including cancellation.
    pub async fn execute(&self, command: &Command) -> Result<Response> {
        let mut lines = self.lines.try_lock().map_err(|_| Error::Busy)?;

        let wire = command.encode();
        let mut attempt = 0;

        loop {
            attempt += 1;

            // Anything already in the channel predates this command: an
            // unsolicited push, or the late reply to a timed-out attempt.
            // Dropping it here is what keeps correlation honest.
            while let Ok(stale) = lines.try_recv() {
                warn!("Discarding unsolicited response line: {:?}", stale);
            }

            debug!("Sending `{}` (attempt {})", command, attempt);
            self.transport.write_line(wire.as_bytes()).await?;

            match time::timeout(self.policy.attempt_timeout, lines.recv()).await {
                Ok(Some(line)) => {
                    debug!("Received response: {:?}", line);
                    return command.decode_response(&line);
                }
                Ok(None) => return Err(Error::ConnectionLost),
                Err(_) if attempt < self.policy.max_attempts => {
                    warn!(
                        "No response to `{}` within {:?}, retrying",
                        command, self.policy.attempt_timeout
                    );
                    time::sleep(self.policy.backoff).await;
                }
                Err(_) => {
                    return Err(Error::Timeout {
                        command: command.verb().to_string(),
                    });
                }
            }
        }
    }

    /// The policy this correlator retries with.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::MockCommandTransport;
    use crate::data::TemperatureUnit;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_millis(10),
        )
    }

    /// Transport whose writes are answered by a scripted reply function.
    fn scripted_transport<F>(reply: F) -> (Arc<dyn CommandTransport>, mpsc::UnboundedReceiver<String>)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mock = MockCommandTransport::new();
        mock.expect_write_line().returning(move |data| {
            let command = String::from_utf8_lossy(data);
            if let Some(line) = reply(command.trim_end_matches('\r')) {
                tx.send(line).unwrap();
            }
            Ok(())
        });
        (Arc::new(mock), rx)
    }

    #[tokio::test]
    async fn test_response_matched_to_command() {
        let (transport, rx) = scripted_transport(|command| {
            assert_eq!(command, "read temp");
            Some("60.0".to_string())
        });
        let correlator = RequestCorrelator::new(transport, rx, fast_policy(3));

        let response = correlator.execute(&Command::ReadTemperature).await.unwrap();
        assert_eq!(response, Response::Temperature(60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_attempt_budget() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let mut mock = MockCommandTransport::new();
        // Never replies; the full budget must be spent.
        mock.expect_write_line().times(3).returning(|_| Ok(()));
        let correlator = RequestCorrelator::new(Arc::new(mock), rx, fast_policy(3));

        let err = correlator.execute(&Command::Start).await.unwrap_err();
        match err {
            Error::Timeout { command } => assert_eq!(command, "start"),
            other => panic!("unexpected error: {other:?}"),
        }
        drop(tx);
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mock = MockCommandTransport::new();
        let reply_tx = tx.clone();
        mock.expect_write_line().times(1).returning(move |_| {
            reply_tx.send("not-a-number".to_string()).unwrap();
            Ok(())
        });
        let correlator = RequestCorrelator::new(Arc::new(mock), rx, fast_policy(3));

        let err = correlator
            .execute(&Command::ReadTemperature)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_stale_lines_drained_before_send() {
        let (tx, rx) = mpsc::unbounded_channel();
        // Leftover reply from a previous timed-out command.
        tx.send("99.9".to_string()).unwrap();

        let mut mock = MockCommandTransport::new();
        let reply_tx = tx.clone();
        mock.expect_write_line().returning(move |_| {
            reply_tx.send("c".to_string()).unwrap();
            Ok(())
        });
        let correlator = RequestCorrelator::new(Arc::new(mock), rx, fast_policy(3));

        // The stale temperature line must not be attributed to this command.
        let response = correlator.execute(&Command::ReadUnit).await.unwrap();
        assert_eq!(response, Response::Unit(TemperatureUnit::Celsius));
    }

    #[tokio::test]
    async fn test_second_command_rejected_while_in_flight() {
        let (_tx, rx) = mpsc::unbounded_channel::<String>();
        let mut mock = MockCommandTransport::new();
        mock.expect_write_line().returning(|_| Ok(()));
        let correlator = Arc::new(RequestCorrelator::new(
            Arc::new(mock),
            rx,
            RetryPolicy::single_attempt(Duration::from_secs(60)),
        ));

        let in_flight = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.execute(&Command::Start).await })
        };

        // Let the first command claim the slot.
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }

        let err = correlator.execute(&Command::Stop).await.unwrap_err();
        assert!(matches!(err, Error::Busy));

        in_flight.abort();
    }

    #[tokio::test]
    async fn test_slot_released_after_cancellation() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let mut mock = MockCommandTransport::new();
        let reply_tx = tx.clone();
        let mut calls = 0u32;
        mock.expect_write_line().returning_st(move |_| {
            calls += 1;
            if calls > 1 {
                reply_tx.send("stop".to_string()).unwrap();
            }
            Ok(())
        });
        let correlator = Arc::new(RequestCorrelator::new(
            Arc::new(mock),
            rx,
            RetryPolicy::single_attempt(Duration::from_secs(60)),
        ));

        let in_flight = {
            let correlator = correlator.clone();
            tokio::spawn(async move { correlator.execute(&Command::Start).await })
        };
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        // Cancel the first command mid-flight; the slot must come back.
        in_flight.abort();
        let _ = in_flight.await;

        let response = correlator.execute(&Command::Stop).await.unwrap();
        assert_eq!(response, Response::Ack("stop".to_string()));
    }

    #[tokio::test]
    async fn test_connection_lost_when_channel_closes() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(tx);
        let mut mock = MockCommandTransport::new();
        mock.expect_write_line().returning(|_| Ok(()));
        let correlator = RequestCorrelator::new(Arc::new(mock), rx, fast_policy(3));

        let err = correlator.execute(&Command::Start).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let mut mock = MockCommandTransport::new();
        let reply_tx = tx.clone();
        let mut calls = 0u32;
        mock.expect_write_line().times(2).returning_st(move |_| {
            calls += 1;
            // Silent on the first attempt, answers the retry.
            if calls == 2 {
                reply_tx.send("60.0".to_string()).unwrap();
            }
            Ok(())
        });
        let correlator = RequestCorrelator::new(Arc::new(mock), rx, fast_policy(3));

        let response = correlator.execute(&Command::ReadTemperature).await.unwrap();
        assert_eq!(response, Response::Temperature(60.0));
    }
}
