//! The line monitor loop.
//!
//! ```text
//!   open ──> Running ──(read_line → emit)──> Running
//!               │
//!               ├─ cancelled ─────> Stopping(ok)  ── print notice
//!               └─ read/write err ─> Stopping(err)
//!
//!   Stopping ──(flush partial line, close)──> Closed
//! ```
//!
//! Cancellation is observed at the one suspension point, the blocked read,
//! so a shutdown request never waits out the read timeout. The connection is
//! consumed by [`run`], which closes it on every way out of the loop.

use std::io::Write;
use tokio_util::sync::CancellationToken;

use crate::{connection::Connection, error::Result, line, tracing::prelude::*};

/// Printed to the output when the user interrupts the monitor.
pub const SHUTDOWN_NOTICE: &str = "Stopping...";

enum State {
    Running,
    Stopping(Result<()>),
}

/// Print lines from `connection` to `out` until `running` is cancelled or the
/// connection fails.
///
/// Returns `Ok(())` after an interrupt. A read or write failure is returned
/// as an error, after the connection has been closed.
///
/// A partial line still buffered when the loop stops is printed as if it had
/// been terminated, ahead of the shutdown notice.
pub async fn run<W>(
    mut connection: Connection,
    running: CancellationToken,
    out: &mut W,
) -> Result<()>
where
    W: Write + ?Sized,
{
    info!(
        endpoint = %connection.endpoint(),
        baud = connection.baud_rate(),
        "Monitoring. Press Ctrl-C to stop."
    );

    let mut lines_seen: u64 = 0;
    let mut state = State::Running;

    let outcome = loop {
        state = match state {
            State::Running => {
                let read = tokio::select! {
                    biased;
                    _ = running.cancelled() => None,
                    read = connection.read_line() => Some(read),
                };

                match read {
                    None => State::Stopping(Ok(())),
                    Some(Ok(None)) => State::Running,
                    Some(Ok(Some(bytes))) => {
                        lines_seen += 1;
                        match line::emit(&bytes, &mut *out) {
                            Ok(()) => State::Running,
                            Err(e) => State::Stopping(Err(e.into())),
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Connection lost");
                        State::Stopping(Err(e.into()))
                    }
                }
            }
            State::Stopping(outcome) => break outcome,
        };
    };

    let outcome = finish_output(&mut connection, &mut *out, outcome);

    if let Err(e) = connection.close().await {
        warn!(error = %e, "Error closing connection");
    }
    info!(lines = lines_seen, "Monitor stopped");
    outcome
}

// Flush the unterminated tail and, after an interrupt, the notice. A write
// failure here only matters if nothing else went wrong first.
fn finish_output<W>(connection: &mut Connection, out: &mut W, outcome: Result<()>) -> Result<()>
where
    W: Write + ?Sized,
{
    let mut written = Ok(());
    if let Some(partial) = connection.take_partial() {
        debug!(len = partial.len(), "Flushing partial line");
        written = line::emit(&partial, &mut *out);
    }
    if outcome.is_ok() && written.is_ok() {
        written = writeln!(out, "{}", SHUTDOWN_NOTICE).and_then(|_| out.flush());
    }

    match (outcome, written) {
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => Err(e.into()),
        (Ok(()), Ok(())) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::tests::fake_connection, error::Error};
    use std::{io, time::Duration};

    fn text(out: &[u8]) -> &str {
        std::str::from_utf8(out).unwrap()
    }

    /// Writer that fails every write.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_while_blocked() {
        let (conn, fake) = fake_connection();
        fake.send(b"HELLO\r\n");
        fake.send(b"A\xffB\n");

        let running = CancellationToken::new();
        let mut out = Vec::new();
        let (result, ()) = tokio::join!(run(conn, running.clone(), &mut out), async {
            // several read timeouts pass with nothing arriving
            tokio::time::sleep(Duration::from_secs(5)).await;
            running.cancel();
        });

        result.unwrap();
        assert_eq!(text(&out), "HELLO\nA\u{FFFD}B\nStopping...\n");
        assert_eq!(fake.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_before_first_read() {
        let (conn, fake) = fake_connection();
        fake.send(b"queued\n");

        let running = CancellationToken::new();
        running.cancel();
        let mut out = Vec::new();
        run(conn, running, &mut out).await.unwrap();

        assert_eq!(text(&out), "Stopping...\n");
        assert_eq!(fake.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_line_printed_before_notice() {
        let (conn, fake) = fake_connection();
        fake.send(b"done\nhalf a li");

        let running = CancellationToken::new();
        let mut out = Vec::new();
        let (result, ()) = tokio::join!(run(conn, running.clone(), &mut out), async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            running.cancel();
        });

        result.unwrap();
        assert_eq!(text(&out), "done\nhalf a li\nStopping...\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_drop_closes_and_fails() {
        let (conn, fake) = fake_connection();
        fake.send(b"last words\n");
        fake.send(b"cut of");
        fake.fail(io::ErrorKind::ConnectionReset);

        let mut out = Vec::new();
        let result = run(conn, CancellationToken::new(), &mut out).await;

        match result {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {:?}", other),
        }
        // no shutdown notice on failure
        assert_eq!(text(&out), "last words\ncut of\n");
        assert_eq!(fake.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_eof_closes_and_fails() {
        let (conn, fake) = fake_connection();
        fake.send(b"bye\n");
        let closes = fake.closes.clone();
        drop(fake);

        let mut out = Vec::new();
        let result = run(conn, CancellationToken::new(), &mut out).await;

        assert!(matches!(
            result,
            Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
        assert_eq!(text(&out), "bye\n");
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_failure_still_closes() {
        let (conn, fake) = fake_connection();
        fake.send(b"HELLO\n");

        let result = run(conn, CancellationToken::new(), &mut BrokenPipe).await;

        assert!(matches!(result, Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(fake.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_produces_no_output() {
        let (conn, fake) = fake_connection();
        let running = CancellationToken::new();
        let mut out = Vec::new();
        let (result, ()) = tokio::join!(run(conn, running.clone(), &mut out), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            assert!(!running.is_cancelled());
            running.cancel();
        });

        result.unwrap();
        assert_eq!(text(&out), "Stopping...\n");
        assert_eq!(fake.close_count(), 1);
    }
}
