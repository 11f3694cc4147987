//! 请求处理上下文：每个处理器显式拿到存储、帧源和网络状态
//!
//! HTTP 服务器在自己的任务里调用处理器，所以上下文要能跨线程共享。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::bootstrap::NetworkMode;
use crate::control::NetworkStatus;
use crate::credential::CredentialStore;
use crate::stream::{FrameSource, StreamConfig, StreamSlots};

/// Device-level operations outside the request path.
pub trait System {
    /// Reboot once `delay` has passed. Returns immediately so the caller can
    /// finish its reply.
    fn restart_after(&self, delay: Duration);

    /// Dump allocator state to the log.
    fn log_heap(&self) {}
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_body: usize,
    /// Gap between the update reply and the restart, so the reply can flush.
    pub restart_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            max_body: 1024,
            restart_delay: Duration::from_secs(2),
        }
    }
}

pub struct AppContext<F: FrameSource> {
    store: Mutex<Box<dyn CredentialStore + Send>>,
    /// `None` when the image sensor failed to initialise.
    pub frames: Option<F>,
    network: Mutex<Box<dyn NetworkStatus + Send>>,
    pub mode: NetworkMode,
    pub system: Box<dyn System + Send + Sync>,
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub streams: StreamSlots,
}

impl<F: FrameSource> AppContext<F> {
    pub fn new(
        store: Box<dyn CredentialStore + Send>,
        frames: Option<F>,
        network: Box<dyn NetworkStatus + Send>,
        mode: NetworkMode,
        system: Box<dyn System + Send + Sync>,
    ) -> Self {
        debug_assert!(mode.is_terminal(), "serving before bootstrap finished");
        let stream = StreamConfig::default();
        Self {
            store: Mutex::new(store),
            frames,
            network: Mutex::new(network),
            mode,
            system,
            server: ServerConfig::default(),
            streams: StreamSlots::new(stream.max_sessions),
            stream,
        }
    }

    pub fn with_server_config(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.streams = StreamSlots::new(stream.max_sessions);
        self.stream = stream;
        self
    }

    pub fn store(&self) -> MutexGuard<'_, Box<dyn CredentialStore + Send>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn network(&self) -> MutexGuard<'_, Box<dyn NetworkStatus + Send>> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
