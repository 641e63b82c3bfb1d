//! Packet subscription fanout: every ingress datagram that parses to a
//! [`PacketRecord`] is published to all push subscribers synchronously and
//! to all pull subscribers' queues, best-effort.

use ipv6_frame::PacketRecord;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type SubscriptionId = u64;

/// A pull-mode subscription: an async stream of [`PacketRecord`]s.
///
/// The backing queue is unbounded per spec: a slow consumer grows memory
/// rather than applying backpressure to the ingress path.
pub type PacketStream = UnboundedReceiverStream<PacketRecord>;

type Consumer = Box<dyn Fn(&PacketRecord) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Fanout {
    next_id: AtomicU64,
    consumers: Mutex<Vec<(SubscriptionId, Consumer)>>,
    pull_senders: Mutex<Vec<mpsc::UnboundedSender<PacketRecord>>>,
}

impl Fanout {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a push subscriber, invoked synchronously on the ingress
    /// path for every parsed datagram. A panicking consumer is caught and
    /// logged; it does not interrupt delivery to other subscribers.
    pub(crate) fn subscribe(&self, consumer: impl Fn(&PacketRecord) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.consumers.lock().push((id, Box::new(consumer)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.consumers.lock().retain(|(existing, _)| *existing != id);
    }

    /// Registers a pull subscriber and returns its stream. The stream ends
    /// cleanly once the tunnel stops.
    pub(crate) fn packet_stream(&self) -> PacketStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pull_senders.lock().push(tx);
        UnboundedReceiverStream::new(rx)
    }

    pub(crate) fn publish(&self, record: &PacketRecord) {
        for (_, consumer) in self.consumers.lock().iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| consumer(record)));
            if result.is_err() {
                tracing::warn!("packet consumer panicked; continuing fanout to remaining subscribers");
            }
        }

        self.pull_senders.lock().retain(|tx| tx.send(record.clone()).is_ok());
    }

    /// Drops all subscribers; push consumers stop being called and pull
    /// streams observe end-of-stream.
    pub(crate) fn close(&self) {
        self.consumers.lock().clear();
        self.pull_senders.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipv6_frame::Protocol;
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    fn record(dest_port: u16) -> PacketRecord {
        PacketRecord {
            protocol: Protocol::Udp,
            src: "fd00:0:0:0:0:0:0:2".into(),
            dst: "fd00:0:0:0:0:0:0:1".into(),
            source_port: 1234,
            dest_port,
            payload: bytes::Bytes::new(),
        }
    }

    #[test]
    fn push_subscriber_sees_records_in_publish_order() {
        let fanout = Fanout::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        fanout.subscribe(move |r| seen_clone.lock().push(r.dest_port));

        fanout.publish(&record(1));
        fanout.publish(&record(2));
        fanout.publish(&record(3));

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let fanout = Fanout::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let id = fanout.subscribe(move |r| seen_clone.lock().push(r.dest_port));

        fanout.publish(&record(1));
        fanout.unsubscribe(id);
        fanout.publish(&record(2));

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn panicking_consumer_does_not_starve_other_subscribers() {
        let fanout = Fanout::new();
        fanout.subscribe(|_| panic!("boom"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        fanout.subscribe(move |r| seen_clone.lock().push(r.dest_port));

        fanout.publish(&record(42));

        assert_eq!(*seen.lock(), vec![42]);
    }

    #[tokio::test]
    async fn pull_subscriber_receives_records_in_order() {
        let fanout = Fanout::new();
        let mut stream = fanout.packet_stream();

        fanout.publish(&record(1));
        fanout.publish(&record(2));

        assert_eq!(stream.next().await.unwrap().dest_port, 1);
        assert_eq!(stream.next().await.unwrap().dest_port, 2);
    }

    #[tokio::test]
    async fn all_consumers_observe_the_same_order() {
        let fanout = Fanout::new();
        let mut a = fanout.packet_stream();
        let mut b = fanout.packet_stream();

        fanout.publish(&record(1));
        fanout.publish(&record(2));

        assert_eq!(a.next().await.unwrap().dest_port, 1);
        assert_eq!(a.next().await.unwrap().dest_port, 2);
        assert_eq!(b.next().await.unwrap().dest_port, 1);
        assert_eq!(b.next().await.unwrap().dest_port, 2);
    }

    #[tokio::test]
    async fn close_ends_pull_streams_and_push_consumers_stop_being_called() {
        let fanout = Fanout::new();
        let mut stream = fanout.packet_stream();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        fanout.subscribe(move |r| seen_clone.lock().push(r.dest_port));

        fanout.publish(&record(1));
        fanout.close();
        fanout.publish(&record(2));

        assert_eq!(stream.next().await.unwrap().dest_port, 1);
        assert!(stream.next().await.is_none());
        assert_eq!(*seen.lock(), vec![1]);
    }
}
