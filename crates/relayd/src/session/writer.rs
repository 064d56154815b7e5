//! Writer task: drains a session's outbound queue onto the connection.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::SessionError;
use crate::registry::{OutboundReceiver, SessionId};

/// Writes every queued line, `\n`-terminated, until the queue closes or the
/// session is cancelled.
///
/// On cancellation the lines already queued (the timeout notice, typically)
/// are flushed before the connection is shut down. A failed or timed-out
/// write cancels the session so the reader side tears it down.
pub async fn deliver_loop<W>(
    writer: W,
    mut outbound: OutboundReceiver,
    cancel_token: CancellationToken,
    write_timeout: Duration,
    session_id: SessionId,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    loop {
        tokio::select! {
            biased;

            next = outbound.recv() => {
                let Some(line) = next else {
                    debug!(session_id = %session_id, "Outbound queue closed");
                    break;
                };
                if let Err(e) = write_line(&mut writer, &line, write_timeout).await {
                    debug!(session_id = %session_id, error = %e, "Write failed, closing session");
                    cancel_token.cancel();
                    break;
                }
            }

            _ = cancel_token.cancelled() => {
                while let Ok(line) = outbound.try_recv() {
                    if write_line(&mut writer, &line, write_timeout).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(session_id = %session_id, error = %e, "Connection shutdown failed");
    }
}

async fn write_line<W>(
    writer: &mut BufWriter<W>,
    line: &str,
    write_timeout: Duration,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    match timeout(write_timeout, async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Io(e.to_string())),
        Err(_) => Err(SessionError::WriteTimeout),
    }
}
