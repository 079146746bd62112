use core::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

const LOG_TARGET: &str = "   batcher";

/// Groups a stream of items into batches.
///
/// A batch is flushed when `window` has passed since its first item arrived or when it
/// holds `max_items` items, whichever comes first. Closing the input does not cut the
/// window short: the last batch is still flushed once its window elapses. Empty batches
/// are never emitted.
#[derive(Debug, Clone, Copy)]
pub struct WindowedBatcher {
    window: Duration,
    max_items: usize,
}

impl WindowedBatcher {
    #[must_use]
    pub fn new(window: Duration, max_items: usize) -> Self {
        Self {
            window,
            max_items: max_items.max(1),
        }
    }

    /// Moves items from `input` to `output` in batches until `input` closes or `output` is dropped.
    pub async fn run<T: Send>(self, mut input: mpsc::Receiver<T>, output: mpsc::Sender<Vec<T>>) {
        let mut batch = Vec::with_capacity(self.max_items);
        let mut deadline: Option<Instant> = None;

        loop {
            let received = match deadline {
                Some(deadline) => tokio::select! {
                    item = input.recv() => Some(item),
                    () = sleep_until(deadline) => None,
                },
                None => Some(input.recv().await),
            };

            let reason = match received {
                Some(Some(item)) => {
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + self.window);
                    }

                    batch.push(item);
                    if batch.len() < self.max_items {
                        continue;
                    }
                    "full"
                }
                Some(None) => {
                    if let Some(deadline) = deadline {
                        sleep_until(deadline).await;
                        log::debug!(target: LOG_TARGET, "Flushing {} items, input closed", batch.len());
                        let _ = output.send(batch).await;
                    }
                    return;
                }
                None => "window elapsed",
            };

            log::debug!(target: LOG_TARGET, "Flushing {} items, {reason}", batch.len());
            deadline = None;
            let full = core::mem::replace(&mut batch, Vec::with_capacity(self.max_items));
            if output.send(full).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_batcher(window_secs: u64, max_items: usize) -> (mpsc::Sender<u32>, mpsc::Receiver<Vec<u32>>) {
        let (tx, rx) = mpsc::channel(16);
        let (batch_tx, batch_rx) = mpsc::channel(16);
        drop(tokio::spawn(
            WindowedBatcher::new(Duration::from_secs(window_secs), max_items).run(rx, batch_tx),
        ));
        (tx, batch_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_when_window_elapses() {
        let (tx, mut batches) = spawn_batcher(3, 50);
        let start = Instant::now();

        for i in 0..3 {
            tx.send(i).await.unwrap();
        }

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch, vec![0, 1, 2]);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_when_full() {
        let (tx, mut batches) = spawn_batcher(3, 2);
        let start = Instant::now();

        for i in 0..5 {
            tx.send(i).await.unwrap();
        }

        assert_eq!(batches.recv().await.unwrap(), vec![0, 1]);
        assert_eq!(batches.recv().await.unwrap(), vec![2, 3]);
        assert!(start.elapsed() < Duration::from_secs(3));

        drop(tx);
        assert_eq!(batches.recv().await.unwrap(), vec![4]);
        assert!(batches.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_input_still_waits_for_window() {
        let (tx, mut batches) = spawn_batcher(3, 50);
        let start = Instant::now();

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(batches.recv().await.unwrap(), vec![1, 2]);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(batches.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_starts_at_first_item() {
        let (tx, mut batches) = spawn_batcher(3, 50);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let start = Instant::now();
        tx.send(7).await.unwrap();

        assert_eq!(batches.recv().await.unwrap(), vec![7]);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_closed_empty_input_emits_nothing() {
        let (tx, mut batches) = spawn_batcher(3, 50);
        drop(tx);
        assert!(batches.recv().await.is_none());
    }
}
