//! 组播公告与收集运行时。
//!
//! # 教案式说明
//! - **意图 (Why)**：每个服务进程周期性地向固定组播组宣告自己的 `(domain, service, uri)`，
//!   同时收集其它进程的公告，建立跨域调用所需的端点表；
//! - **契约 (What)**：
//!   - 发送端每个 `announce_period` 发送一次本地公告，发送失败只记日志；
//!   - 接收端对每个报文调用 [`Discovery::observe`]：格式错误丢弃、自身公告丢弃、已知键忽略、
//!     首次出现的键写入注册表并通知 [`DiscoveryListener`]；
//!   - 接收失败时记一条告警并等待一个 `announce_period` 再读，持续的套接字错误不会空转；
//!   - 两个循环都是可取消的 [`BackgroundTask`]，由 [`DiscoveryHandle::shutdown`] 回收；
//! - **执行 (How)**：`socket2` 负责 `SO_REUSEADDR` 与入组，随后转换为 Tokio `UdpSocket`，
//!   发送与接收共享同一个套接字。

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, OnceLock};

use sheetfed_core::config::DiscoveryConfig;
use sheetfed_core::{BackgroundTask, ServiceEndpoint, ServiceName, StopSignal, spawn_periodic};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::announcement::Announcement;
use crate::error::{AnnouncementError, DiscoveryError};
use crate::registry::{EndpointRegistry, Registration};

/// 首次发现某个 `(domain, service)` 时的回调。
///
/// 回调在收集循环中同步执行，实现方不得阻塞；需要 I/O 时自行派生任务。
pub trait DiscoveryListener: Send + Sync + 'static {
    fn on_registered(&self, endpoint: &ServiceEndpoint);
}

/// 单个报文的处理结果。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Observation {
    Registered(ServiceEndpoint),
    AlreadyKnown,
    SelfAnnouncement,
    Malformed(AnnouncementError),
}

/// 一个服务进程的发现引擎。
pub struct Discovery {
    local: ServiceEndpoint,
    config: DiscoveryConfig,
    registry: EndpointRegistry,
    listener: OnceLock<Arc<dyn DiscoveryListener>>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("local", &self.local)
            .field("group", &self.config.group_addr())
            .field("known", &self.registry.len())
            .finish()
    }
}

impl Discovery {
    pub fn new(local: ServiceEndpoint, config: DiscoveryConfig, registry: EndpointRegistry) -> Self {
        Self {
            local,
            config,
            registry,
            listener: OnceLock::new(),
        }
    }

    /// 安装注册回调；只能安装一次，重复安装返回 `false`。
    pub fn set_listener(&self, listener: Arc<dyn DiscoveryListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    pub fn local(&self) -> &ServiceEndpoint {
        &self.local
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn known_uris_of(&self, domain: &str, service: ServiceName) -> Vec<String> {
        self.registry.known_uris_of(domain, service)
    }

    /// 处理一个收到的报文。
    pub fn observe(&self, payload: &[u8]) -> Observation {
        let announcement = match Announcement::parse(payload) {
            Ok(announcement) => announcement,
            Err(err) => {
                debug!(error = %err, "dropping malformed announcement");
                return Observation::Malformed(err);
            }
        };
        if announcement.domain == self.local.domain && announcement.service == self.local.service {
            return Observation::SelfAnnouncement;
        }

        let endpoint = announcement.into_endpoint();
        match self.registry.register(endpoint.clone()) {
            Registration::AlreadyKnown => Observation::AlreadyKnown,
            Registration::Added => {
                info!(
                    domain = %endpoint.domain,
                    service = %endpoint.service,
                    uri = %endpoint.uri,
                    "discovered service endpoint"
                );
                if let Some(listener) = self.listener.get() {
                    listener.on_registered(&endpoint);
                }
                Observation::Registered(endpoint)
            }
        }
    }

    /// 接收循环：逐个报文交给 [`Discovery::observe`]，直到收到停止信号。
    async fn collect<S: DatagramSource>(&self, source: &S, mut stop: StopSignal) {
        let backoff = self.config.announce_period();
        // 多读一个字节，超长报文才能被识别并丢弃。
        let mut buf = vec![0u8; self.config.max_datagram + 1];
        loop {
            let received = tokio::select! {
                _ = stop.stopped() => break,
                received = source.recv(&mut buf) => received,
            };
            match received {
                Ok(len) => {
                    self.observe(&buf[..len]);
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "discovery receive failed"
                    );
                    tokio::select! {
                        _ = stop.stopped() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// 绑定组播套接字并启动发送、接收两个循环。
    pub fn start(self: &Arc<Self>) -> Result<DiscoveryHandle, DiscoveryError> {
        let socket = Arc::new(bind_group(&self.config)?);
        let target = SocketAddr::V4(self.config.group_addr());
        let payload = Arc::new(Announcement::from(&self.local).encode());

        let announcer = {
            let socket = Arc::clone(&socket);
            let name = format!("announce:{}:{}", self.local.domain, self.local.service);
            spawn_periodic(name, self.config.announce_period(), move || {
                let socket = Arc::clone(&socket);
                let payload = Arc::clone(&payload);
                async move {
                    if let Err(err) = socket.send_to(&payload, target).await {
                        warn!(error = %err, %target, "failed to send announcement");
                    }
                }
            })
        };

        let collector = {
            let this = Arc::clone(self);
            let name = format!("collect:{}:{}", self.local.domain, self.local.service);
            BackgroundTask::spawn(name, move |stop| async move {
                this.collect(socket.as_ref(), stop).await;
            })
        };

        info!(
            domain = %self.local.domain,
            service = %self.local.service,
            group = %target,
            "discovery started"
        );
        Ok(DiscoveryHandle {
            announcer,
            collector,
        })
    }
}

/// 运行中的发现循环。
#[derive(Debug)]
pub struct DiscoveryHandle {
    announcer: BackgroundTask,
    collector: BackgroundTask,
}

impl DiscoveryHandle {
    pub fn is_running(&self) -> bool {
        !(self.announcer.is_finished() || self.collector.is_finished())
    }

    pub async fn shutdown(self) {
        self.announcer.shutdown().await;
        self.collector.shutdown().await;
    }
}

/// 接收循环读取报文的来源，返回写入 `buf` 的字节数。
trait DatagramSource: Sync {
    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> impl Future<Output = io::Result<usize>> + Send + 'a;
}

impl DatagramSource for UdpSocket {
    fn recv<'a>(&'a self, buf: &'a mut [u8]) -> impl Future<Output = io::Result<usize>> + Send + 'a {
        async move { self.recv_from(buf).await.map(|(len, _peer)| len) }
    }
}

fn bind_group(config: &DiscoveryConfig) -> Result<UdpSocket, DiscoveryError> {
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
    let socket_err = |source| DiscoveryError::Socket {
        addr: bind_addr.to_string(),
        source,
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(socket_err)?;
    // 同一主机上的多个域进程共享组播端口。
    socket.set_reuse_address(true).map_err(socket_err)?;
    socket.bind(&bind_addr.into()).map_err(socket_err)?;
    socket
        .join_multicast_v4(&config.group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|source| DiscoveryError::Join {
            group: config.group.to_string(),
            source,
        })?;
    socket.set_multicast_loop_v4(true).map_err(socket_err)?;
    socket.set_nonblocking(true).map_err(socket_err)?;

    UdpSocket::from_std(socket.into()).map_err(socket_err)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// 按顺序吐出预置结果，耗尽后每次都返回 I/O 错误。
    #[derive(Default)]
    struct Scripted {
        datagrams: Mutex<VecDeque<Vec<u8>>>,
        reads: AtomicUsize,
    }

    impl DatagramSource for Scripted {
        fn recv<'a>(
            &'a self,
            buf: &'a mut [u8],
        ) -> impl Future<Output = io::Result<usize>> + Send + 'a {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let next = self.datagrams.lock().unwrap().pop_front();
            async move {
                match next {
                    Some(datagram) => {
                        buf[..datagram.len()].copy_from_slice(&datagram);
                        Ok(datagram.len())
                    }
                    None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "socket closed")),
                }
            }
        }
    }

    fn discovery() -> Arc<Discovery> {
        let config = DiscoveryConfig {
            announce_period_ms: 1_000,
            ..DiscoveryConfig::default()
        };
        Arc::new(Discovery::new(
            ServiceEndpoint::new("alpha", ServiceName::Users, "http://alpha/users/rest"),
            config,
            EndpointRegistry::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn receive_errors_back_off_for_one_announce_period() {
        let discovery = discovery();
        let source = Arc::new(Scripted::default());
        source
            .datagrams
            .lock()
            .unwrap()
            .push_back(b"beta:sheets\thttp://beta/sheets/soap".to_vec());

        let task = {
            let discovery = Arc::clone(&discovery);
            let source = Arc::clone(&source);
            BackgroundTask::spawn("collect:test", move |stop| async move {
                discovery.collect(source.as_ref(), stop).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        // 一次成功读取，随后 t=0s、1s、2s 各一次失败读取。
        assert_eq!(source.reads.load(Ordering::SeqCst), 4);
        assert_eq!(
            discovery.known_uris_of("beta", ServiceName::Spreadsheets),
            ["http://beta/sheets/soap"]
        );

        task.shutdown().await;
        assert_eq!(source.reads.load(Ordering::SeqCst), 4);
    }
}
