use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};

/// Audio bytes in arrival order
///
/// The sequence number is the chunk's position in the session's queue,
/// assigned when the worker dequeues it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub sequence: u64,
    pub data: Bytes,
}

/// Why an enqueue did not happen; the rejected bytes are handed back
#[derive(Debug)]
pub enum EnqueueError {
    Full(Bytes),
    Closed(Bytes),
}

/// Create a bounded audio queue holding at most `capacity` chunks
pub fn audio_queue(capacity: usize) -> (AudioQueueSender, AudioQueueReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        AudioQueueSender { tx, capacity },
        AudioQueueReceiver { rx, next_sequence: 0 },
    )
}

/// Producer half, owned by the session
pub struct AudioQueueSender {
    tx: mpsc::Sender<Bytes>,
    capacity: usize,
}

impl AudioQueueSender {
    /// Enqueue without waiting
    pub fn try_enqueue(&self, data: Bytes) -> Result<(), EnqueueError> {
        self.tx.try_send(data).map_err(|e| match e {
            TrySendError::Full(data) => EnqueueError::Full(data),
            TrySendError::Closed(data) => EnqueueError::Closed(data),
        })
    }

    /// Enqueue, waiting at most `wait` for space
    pub async fn enqueue_timeout(&self, data: Bytes, wait: Duration) -> Result<(), EnqueueError> {
        if wait.is_zero() {
            return self.try_enqueue(data);
        }

        self.tx.send_timeout(data, wait).await.map_err(|e| match e {
            SendTimeoutError::Timeout(data) => EnqueueError::Full(data),
            SendTimeoutError::Closed(data) => EnqueueError::Closed(data),
        })
    }

    /// Chunks currently waiting
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the session's single recognition worker
pub struct AudioQueueReceiver {
    rx: mpsc::Receiver<Bytes>,
    next_sequence: u64,
}

impl AudioQueueReceiver {
    /// Wait for the next chunk; `None` once the queue is closed and empty
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        let data = self.rx.recv().await?;
        Some(self.sequence(data))
    }

    pub fn try_recv(&mut self) -> Option<AudioChunk> {
        let data = self.rx.try_recv().ok()?;
        Some(self.sequence(data))
    }

    /// Refuse new chunks; already queued chunks can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }

    fn sequence(&mut self, data: Bytes) -> AudioChunk {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        AudioChunk { sequence, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(byte: u8) -> Bytes {
        Bytes::from(vec![byte; 4])
    }

    #[test]
    fn test_full_queue_rejects_until_dequeue() {
        let (tx, mut rx) = audio_queue(10);

        for i in 0..10 {
            assert!(tx.try_enqueue(chunk(i)).is_ok(), "chunk {} should fit", i);
        }
        assert_eq!(tx.len(), 10);

        match tx.try_enqueue(chunk(10)) {
            Err(EnqueueError::Full(data)) => assert_eq!(data, chunk(10)),
            other => panic!("expected Full, got {:?}", other),
        }

        let first = rx.try_recv().expect("queued chunk");
        assert_eq!(first.sequence, 0);
        assert_eq!(first.data, chunk(0));

        assert!(tx.try_enqueue(chunk(10)).is_ok());
    }

    #[test]
    fn test_chunks_are_sequenced_in_arrival_order() {
        let (tx, mut rx) = audio_queue(8);
        for i in 0..5 {
            tx.try_enqueue(chunk(i)).unwrap();
        }

        let received: Vec<AudioChunk> = std::iter::from_fn(|| rx.try_recv()).collect();
        let sequences: Vec<u64> = received.iter().map(|c| c.sequence).collect();
        let payloads: Vec<Bytes> = received.into_iter().map(|c| c.data).collect();

        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert_eq!(payloads, (0..5).map(chunk).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_close_keeps_queued_chunks() {
        let (tx, mut rx) = audio_queue(4);
        tx.try_enqueue(chunk(1)).unwrap();
        tx.try_enqueue(chunk(2)).unwrap();

        rx.close();
        assert!(matches!(tx.try_enqueue(chunk(3)), Err(EnqueueError::Closed(_))));

        assert_eq!(rx.recv().await.map(|c| c.sequence), Some(0));
        assert_eq!(rx.recv().await.map(|c| c.sequence), Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_bounded_wait_times_out_as_full() {
        let (tx, _rx) = audio_queue(1);
        tx.try_enqueue(chunk(0)).unwrap();

        let outcome = tx.enqueue_timeout(chunk(1), Duration::from_millis(20)).await;
        assert!(matches!(outcome, Err(EnqueueError::Full(_))));
    }

    #[tokio::test]
    async fn test_bounded_wait_succeeds_when_space_frees() {
        let (tx, mut rx) = audio_queue(1);
        tx.try_enqueue(chunk(0)).unwrap();

        let consumer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let first = rx.recv().await;
            (first, rx)
        });

        assert!(tx.enqueue_timeout(chunk(1), Duration::from_secs(2)).await.is_ok());
        let (first, _rx) = consumer.await.unwrap();
        assert_eq!(first.map(|c| c.sequence), Some(0));
    }
}
