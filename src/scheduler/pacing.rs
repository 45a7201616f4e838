use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Strictly ordered, paced sequence of operations.
///
/// Each operation starts no earlier than `delay` after the previous one
/// finished. The first operation starts immediately.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last_finished: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_finished: None,
        }
    }

    /// Resolves once the next operation may start
    pub async fn ready(&self) {
        if let Some(last) = self.last_finished {
            tokio::time::sleep_until(last + self.delay).await;
        }
    }

    pub async fn run<F, T>(&mut self, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        self.ready().await;
        let output = operation.await;
        self.last_finished = Some(Instant::now());
        output
    }
}
