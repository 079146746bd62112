use crate::pipeline::LOG_TARGET;
use tokio::sync::mpsc;

/// Number of items buffered between two stages
pub const CHANNEL_CAPACITY: usize = 64;

/// Starts a stage that runs `work` on every item of `input` in a task of its own.
///
/// Each task gets a clone of the stage's output sender and may send any number of items,
/// in any order relative to other tasks. The returned receiver closes once `input` has
/// closed and every task has finished.
pub fn spawn_stage<I, O, F, Fut>(name: &'static str, mut input: mpsc::Receiver<I>, work: F) -> mpsc::Receiver<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I, mpsc::Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    drop(tokio::spawn(async move {
        let mut dispatched = 0_usize;
        while let Some(item) = input.recv().await {
            dispatched += 1;
            drop(tokio::spawn(work(item, tx.clone())));
        }

        log::debug!(target: LOG_TARGET, "Stage '{name}' input closed after {dispatched} items");
    }));

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[tokio::test]
    async fn test_stage_fans_out_and_closes() {
        let (tx, rx) = mpsc::channel(8);
        let mut output = spawn_stage("double", rx, |n: u64, out: mpsc::Sender<u64>| async move {
            tokio::time::sleep(Duration::from_millis(40 - n * 10)).await;
            let _ = out.send(n).await;
            let _ = out.send(n + 100).await;
        });

        for n in 0..4 {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(n) = output.recv().await {
            seen.push(n);
        }

        assert_eq!(seen.len(), 8);
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 100, 101, 102, 103]);
    }

    #[tokio::test]
    async fn test_stage_may_drop_items() {
        let (tx, rx) = mpsc::channel(8);
        let mut output = spawn_stage("evens", rx, |n: u32, out: mpsc::Sender<u32>| async move {
            if n % 2 == 0 {
                let _ = out.send(n).await;
            }
        });

        for n in 0..6 {
            tx.send(n).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(n) = output.recv().await {
            seen.push(n);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 2, 4]);
    }
}
