use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::models::document::DocumentType;

#[derive(Debug)]
pub struct IngestTask {
    pub document_id: Uuid,
    pub doc_type: DocumentType,
    pub data: Vec<u8>,
}

/// FIFO work queue feeding the ingestion worker pool. Uploads always
/// enqueue; a full pool just means the document stays pending until a
/// worker frees up.
pub struct IngestQueue {
    queue: Mutex<VecDeque<IngestTask>>,
    notify: Notify,
}

impl IngestQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn enqueue(&self, task: IngestTask) {
        {
            let mut queue = self.queue.lock().await;
            // Re-submitting a queued document is a no-op
            if queue.iter().any(|t| t.document_id == task.document_id) {
                return;
            }
            queue.push_back(task);
        }
        self.notify.notify_one();
    }

    pub async fn dequeue(&self) -> IngestTask {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(task) = queue.pop_front() {
                    return task;
                }
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: Uuid) -> IngestTask {
        IngestTask {
            document_id: id,
            doc_type: DocumentType::Txt,
            data: b"content".to_vec(),
        }
    }

    #[tokio::test]
    async fn fifo_order() {
        let queue = IngestQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.enqueue(task(a)).await;
        queue.enqueue(task(b)).await;

        assert_eq!(queue.dequeue().await.document_id, a);
        assert_eq!(queue.dequeue().await.document_id, b);
    }

    #[tokio::test]
    async fn duplicate_document_not_enqueued_twice() {
        let queue = IngestQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(task(id)).await;
        queue.enqueue(task(id)).await;
        assert_eq!(queue.len().await, 1);
    }
}
