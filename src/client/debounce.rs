use std::time::Duration;

use futures::stream::Stream;
use tokio::sync::mpsc;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Emits the most recent value once nothing new has arrived for
/// `window`. A burst of submissions results in a single one, the
/// last. When the sender closes, a pending value is still emitted.
pub fn debounce<T: Send + 'static>(
    mut rx: mpsc::Receiver<T>,
    window: Duration,
) -> impl Stream<Item = T> {
    async_stream::stream! {
        while let Some(mut latest) = rx.recv().await {
            let mut closed = false;
            loop {
                match tokio::time::timeout(window, rx.recv()).await {
                    Ok(Some(next)) => latest = next,
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    // Quiet for a whole window
                    Err(_) => break,
                }
            }

            yield latest;

            if closed {
                break;
            }
        }
    }
}
