//! Typed input for running without a microphone

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::Listen;
use crate::{Error, Result};

/// Reads one non-blank line per listen
///
/// End of input is reported as [`Error::InputClosed`], which stops the
/// pipeline.
pub struct KeyboardListener<R = BufReader<Stdin>> {
    lines: Mutex<Lines<R>>,
}

impl KeyboardListener {
    /// Listen on standard input
    #[must_use]
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> KeyboardListener<R> {
    /// Listen on any line-oriented reader
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
        }
    }
}

#[async_trait]
impl<R> Listen for KeyboardListener<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn listen(&self, cancel: &CancellationToken) -> Result<String> {
        let mut lines = self.lines.lock().await;

        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(String::new()),
                line = lines.next_line() => line?,
            };

            match line {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => return Ok(line.trim().to_string()),
                None => return Err(Error::InputClosed("end of keyboard input".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_skips_blank_lines() {
        let keyboard = KeyboardListener::from_reader(&b"\n   \n  hello there \nsecond\n"[..]);
        let cancel = CancellationToken::new();

        assert_eq!(keyboard.listen(&cancel).await.unwrap(), "hello there");
        assert_eq!(keyboard.listen(&cancel).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_end_of_input_is_fatal() {
        let keyboard = KeyboardListener::from_reader(&b"only\n\n"[..]);
        let cancel = CancellationToken::new();

        assert_eq!(keyboard.listen(&cancel).await.unwrap(), "only");
        let err = keyboard.listen(&cancel).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_cancel_returns_empty() {
        let (_writer, reader) = tokio::io::duplex(64);
        let keyboard = KeyboardListener::from_reader(BufReader::new(reader));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(keyboard.listen(&cancel).await.unwrap(), "");
    }
}
