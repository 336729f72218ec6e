use heapless::Deque;

pub trait MessageQueueInterface<T> {
    /// Hands the message back when the queue is full.
    fn enqueue(&mut self, message: T) -> Result<(), T>;
    fn dequeue(&mut self) -> Option<T>;
    fn clear(&mut self);
}

/// Fixed-capacity FIFO feeding the control loop.
pub struct MessageQueue<T, const N: usize> {
    queue: Deque<T, N>,
}

impl<T, const N: usize> MessageQueue<T, N> {
    pub const fn new() -> Self {
        MessageQueue { queue: Deque::new() }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T, const N: usize> Default for MessageQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> MessageQueueInterface<T> for MessageQueue<T, N> {
    fn enqueue(&mut self, message: T) -> Result<(), T> {
        self.queue.push_back(message)
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    fn clear(&mut self) {
        self.queue.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_capacity() {
        let mut mq: MessageQueue<u8, 2> = MessageQueue::new();
        assert!(mq.enqueue(1).is_ok());
        assert!(mq.enqueue(2).is_ok());
        assert_eq!(mq.enqueue(3), Err(3));
        assert_eq!(mq.dequeue(), Some(1));
        assert_eq!(mq.len(), 1);
        mq.clear();
        assert!(mq.is_empty());
        assert_eq!(mq.dequeue(), None);
    }
}
