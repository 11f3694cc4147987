//! 启动联网：先尝试加入已知 WiFi，失败后切换为自建热点
//!
//! 每次上电只运行一次。`Joined` 与 `SelfHosted` 都是本次启动的终态，
//! 想重新尝试加入网络只能通过 `/update_wifi` 写入新凭据并重启。

use std::time::Duration;

use crate::credential::{CredentialStore, NetworkCredential};

/// 自建热点的固定名称
pub const AP_SSID: &str = "CamLink-Setup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Joining,
    Joined,
    SelfHosted,
}

impl NetworkMode {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NetworkMode::Joining)
    }

    /// Interface label reported by `/status`.
    pub fn label(self) -> &'static str {
        match self {
            NetworkMode::SelfHosted => "AP",
            // station interface is the one being brought up while joining
            NetworkMode::Joining | NetworkMode::Joined => "STA",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub ap_ssid: String,
    /// Used when the store has no record.
    pub default_credential: Option<NetworkCredential>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            attempts: 20,
            retry_delay: Duration::from_millis(500),
            ap_ssid: AP_SSID.to_string(),
            default_credential: NetworkCredential::compiled_default(),
        }
    }
}

/// The radio operations the bootstrap needs.
pub trait WifiRadio {
    /// Start associating; must not wait for the result.
    fn begin_join(&mut self, credential: &NetworkCredential) -> anyhow::Result<()>;

    /// Associated and holding an address.
    fn is_joined(&mut self) -> bool;

    fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<()>;
}

/// Result of one boot-time bootstrap run.
#[derive(Debug)]
pub struct BootOutcome {
    pub mode: NetworkMode,
    pub credential: Option<NetworkCredential>,
    pub attempts_used: u32,
}

pub struct Bootstrap {
    config: BootstrapConfig,
    mode: NetworkMode,
}

impl Bootstrap {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            mode: NetworkMode::Joining,
        }
    }

    /// Picks the credential for this boot: stored record first, then the
    /// configured default.
    pub fn resolve_credential<S>(&self, store: &S) -> Option<NetworkCredential>
    where
        S: CredentialStore + ?Sized,
    {
        match store.load() {
            Some(credential) => {
                log::info!("Loaded stored credential for SSID: {:?}", credential.name);
                Some(credential)
            }
            None => {
                let fallback = self.config.default_credential.clone();
                log::info!(
                    "No stored credential, default SSID: {:?}",
                    fallback.as_ref().map(|c| c.name.as_str())
                );
                fallback
            }
        }
    }

    /// Runs Joining to a terminal mode. The retry budget bounds the total wait
    /// to `attempts * retry_delay`.
    pub fn run<S, R>(mut self, store: &S, radio: &mut R) -> anyhow::Result<BootOutcome>
    where
        S: CredentialStore + ?Sized,
        R: WifiRadio,
    {
        let credential = self.resolve_credential(store);

        let mut attempts_used = 0;
        if let Some(credential) = &credential {
            attempts_used = self.join(credential, radio);
        }

        if self.mode == NetworkMode::Joined {
            log::info!(
                "Joined {:?} after {} polls",
                credential.as_ref().map(|c| &c.name),
                attempts_used
            );
        } else {
            log::warn!("Falling back to self-hosted network {:?}", self.config.ap_ssid);
            radio.start_access_point(&self.config.ap_ssid)?;
            self.mode = NetworkMode::SelfHosted;
        }

        Ok(BootOutcome {
            mode: self.mode,
            credential,
            attempts_used,
        })
    }

    fn join<R: WifiRadio>(&mut self, credential: &NetworkCredential, radio: &mut R) -> u32 {
        if let Err(e) = radio.begin_join(credential) {
            log::error!("Failed to start joining {:?}: {:?}", credential.name, e);
            return 0;
        }

        for attempt in 1..=self.config.attempts {
            if radio.is_joined() {
                self.mode = NetworkMode::Joined;
                return attempt;
            }
            log::debug!(
                "Waiting for {:?} ({}/{})",
                credential.name,
                attempt,
                self.config.attempts
            );
            std::thread::sleep(self.config.retry_delay);
        }

        self.config.attempts
    }
}
