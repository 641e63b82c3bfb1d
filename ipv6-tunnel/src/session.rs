//! `TunnelSession`: binds a byte-stream transport, the virtual interface,
//! and the configurator into the Created→Configured→Forwarding→Stopping→
//! Stopped lifecycle, with a single idempotent [`TunnelSession::stop`].

use crate::error::TunnelError;
use crate::fanout::{Fanout, PacketStream, SubscriptionId};
use crate::signals;
use bytes::Bytes;
use ipv6_frame::{read_handshake_response, write_handshake_request, Demultiplexer, PacketRecord, TunnelParameters};
use parking_lot::Mutex as SyncMutex;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, Notify, OnceCell};
use tun_device::VirtualInterfaceHandle;

/// MTU requested by the client in the handshake; the server's response may
/// negotiate a smaller value but never a larger one.
const CLIENT_REQUESTED_MTU: u32 = 16000;
/// Read budget for a single egress poll of the interface.
const EGRESS_READ_BUDGET: usize = 16384;
/// Egress polling interval; the interface has no readiness notification of
/// its own, so the egress loop samples it cooperatively.
const EGRESS_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Configured,
    Forwarding,
    Stopping,
    Stopped,
}

/// Erases the concrete byte-stream transport type so `TunnelSession` itself
/// stays non-generic.
trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> TunnelStream for T {}

/// Shared tunnel state, kept alive by the ingress/egress tasks, the
/// [`TunnelSession`] handle, and the process-wide signal registry.
pub(crate) struct Inner {
    handle: VirtualInterfaceHandle,
    fanout: Fanout,
    params: TunnelParameters,
    configurator: Box<dyn iface_config::Configurator>,
    notify: Notify,
    cancelled: AtomicBool,
    state: SyncMutex<SessionState>,
    writer: AsyncMutex<Option<WriteHalf<Box<dyn TunnelStream>>>>,
    tasks: AsyncMutex<Vec<tokio::task::JoinHandle<()>>>,
    cleanup: OnceCell<()>,
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    fn request_stop(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Runs the single in-flight teardown; concurrent callers all await the
    /// same completion via `OnceCell::get_or_init`.
    pub(crate) async fn stop(self: &Arc<Self>) {
        self.cleanup
            .get_or_init(|| {
                let inner = self.clone();
                async move { inner.teardown().await }
            })
            .await;
    }

    async fn teardown(&self) {
        self.set_state(SessionState::Stopping);
        self.request_stop();

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        self.handle.close();
        self.fanout.close();
        self.set_state(SessionState::Stopped);
    }
}

fn spawn_stop(inner: &Arc<Inner>) {
    let inner = inner.clone();
    tokio::spawn(async move { inner.stop().await });
}

/// A running tunnel: virtual interface plus the byte-stream transport to
/// the remote peer, wired together by the ingress/egress loops.
pub struct TunnelSession {
    inner: Arc<Inner>,
}

impl TunnelSession {
    pub(crate) fn registry_handle(&self) -> Arc<Inner> {
        self.inner.clone()
    }
}

impl TunnelSession {
    /// Performs the handshake, opens and configures the virtual interface,
    /// and starts forwarding. Any failure tears down whatever partial state
    /// was already created and returns [`TunnelError::SetupFailed`].
    pub async fn connect<S>(stream: S, requested_name: Option<&str>) -> Result<Self, TunnelError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut stream = stream;

        write_handshake_request(&mut stream, CLIENT_REQUESTED_MTU).await?;
        let params = read_handshake_response(&mut stream).await?;

        let handle = VirtualInterfaceHandle::open(requested_name)?;

        let configurator = iface_config::platform_configurator();
        if let Err(e) = configurator.configure(handle.name(), &params.client_address.to_string(), params.mtu) {
            handle.close();
            return Err(TunnelError::SetupFailed(e.to_string()));
        }
        let server_route = iface_config::Route::new(format!("{}/128", params.server_address));
        if let Err(e) = configurator.add_route(handle.name(), &server_route) {
            handle.close();
            return Err(TunnelError::SetupFailed(e.to_string()));
        }

        let boxed: Box<dyn TunnelStream> = Box::new(stream);
        let (reader, writer) = tokio::io::split(boxed);

        let inner = Arc::new(Inner {
            handle,
            fanout: Fanout::new(),
            params,
            configurator,
            notify: Notify::new(),
            cancelled: AtomicBool::new(false),
            state: SyncMutex::new(SessionState::Configured),
            writer: AsyncMutex::new(Some(writer)),
            tasks: AsyncMutex::new(Vec::new()),
            cleanup: OnceCell::new(),
        });

        let ingress = tokio::spawn(ingress_loop(inner.clone(), reader));
        let egress = tokio::spawn(egress_loop(inner.clone()));
        inner.tasks.lock().await.extend([ingress, egress]);
        inner.set_state(SessionState::Forwarding);

        signals::register(&inner);

        Ok(Self { inner })
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn client_address(&self) -> Ipv6Addr {
        self.inner.params.client_address
    }

    pub fn server_address(&self) -> Ipv6Addr {
        self.inner.params.server_address
    }

    pub fn interface_name(&self) -> &str {
        self.inner.handle.name()
    }

    pub fn stats(&self) -> Result<iface_config::InterfaceStats, TunnelError> {
        Ok(self.inner.configurator.stats(self.inner.handle.name())?)
    }

    /// Registers a push subscriber, called synchronously from the ingress
    /// loop for every datagram that parses to a [`PacketRecord`].
    pub fn subscribe(&self, consumer: impl Fn(&PacketRecord) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.fanout.subscribe(consumer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.fanout.unsubscribe(id)
    }

    /// Returns a pull-mode stream of [`PacketRecord`]s.
    pub fn packet_stream(&self) -> PacketStream {
        self.inner.fanout.packet_stream()
    }

    /// Idempotent. Stops forwarding, closes the interface, and shuts the
    /// transport down gracefully. A re-entrant call observes the same
    /// in-flight (or already-completed) cleanup.
    pub async fn stop(&self) {
        self.inner.stop().await
    }
}

async fn ingress_loop(inner: Arc<Inner>, mut reader: ReadHalf<Box<dyn TunnelStream>>) {
    use tokio::io::AsyncReadExt;

    let mut demux = Demultiplexer::new();
    let mut buf = vec![0u8; EGRESS_READ_BUDGET];

    loop {
        if inner.cancelled.load(Ordering::Acquire) {
            break;
        }

        tokio::select! {
            _ = inner.notify.notified() => {
                if inner.cancelled.load(Ordering::Acquire) {
                    break;
                }
            }
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!("transport closed by peer, stopping tunnel");
                        spawn_stop(&inner);
                        break;
                    }
                    Ok(n) => {
                        for datagram in demux.feed(&buf[..n]) {
                            deliver_datagram(&inner, datagram);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "transport read error, stopping tunnel");
                        spawn_stop(&inner);
                        break;
                    }
                }
            }
        }
    }
}

fn deliver_datagram(inner: &Arc<Inner>, datagram: Bytes) {
    if let Err(e) = inner.handle.write(&datagram) {
        tracing::warn!(error = %e, "failed to write datagram to virtual interface");
    }

    if let Some(record) = ipv6_frame::parse_packet_record(&datagram) {
        inner.fanout.publish(&record);
    }
}

async fn egress_loop(inner: Arc<Inner>) {
    use tokio::io::AsyncWriteExt as _;

    let mut ticker = tokio::time::interval(EGRESS_POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = inner.notify.notified() => {
                if inner.cancelled.load(Ordering::Acquire) {
                    break;
                }
            }
            _ = ticker.tick() => {
                if inner.cancelled.load(Ordering::Acquire) {
                    break;
                }

                match inner.handle.read(EGRESS_READ_BUDGET) {
                    Ok(bytes) if bytes.is_empty() => {}
                    Ok(bytes) => {
                        let mut guard = inner.writer.lock().await;
                        let Some(writer) = guard.as_mut() else { break };
                        if let Err(e) = writer.write_all(&bytes).await {
                            tracing::warn!(error = %e, "transport write error, stopping tunnel");
                            drop(guard);
                            spawn_stop(&inner);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "virtual interface read error, stopping tunnel");
                        spawn_stop(&inner);
                        break;
                    }
                }
            }
        }
    }
}
