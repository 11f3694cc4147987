//! WiFi 凭据模型与持久化接口

use serde::{Deserialize, Serialize};

/// 编译期默认凭据，首次上电时使用
static DEFAULT_SSID: Option<&str> = std::option_env!("CAMLINK_WIFI_SSID");
static DEFAULT_PASS: Option<&str> = std::option_env!("CAMLINK_WIFI_PASS");

/// A {network-name, secret} pair. Immutable once the boot session loads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCredential {
    pub name: String,
    pub secret: String,
}

impl NetworkCredential {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
        }
    }

    /// The compiled-in fallback, or `None` when the build carried no SSID.
    pub fn compiled_default() -> Option<Self> {
        let name = DEFAULT_SSID.unwrap_or_default();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, DEFAULT_PASS.unwrap_or_default()))
    }

    pub fn is_open(&self) -> bool {
        self.secret.is_empty()
    }
}

/// On-flash layout of the credential record: exactly `ssid` and `password`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredRecord {
    pub ssid: String,
    pub password: String,
}

impl StoredRecord {
    pub fn encode(credential: &NetworkCredential) -> Result<String, StoreError> {
        let record = StoredRecord {
            ssid: credential.name.clone(),
            password: credential.secret.clone(),
        };
        serde_json::to_string(&record).map_err(|e| StoreError::Encode(e.to_string()))
    }

    /// Returns `None` for anything that is not a usable record.
    pub fn decode(raw: &str) -> Option<NetworkCredential> {
        match serde_json::from_str::<StoredRecord>(raw) {
            Ok(record) if !record.ssid.is_empty() => {
                Some(NetworkCredential::new(record.ssid, record.password))
            }
            Ok(_) => None,
            Err(e) => {
                log::error!("Stored credential record is corrupt: {}", e);
                None
            }
        }
    }
}

/// 持久化错误
#[derive(Debug)]
pub enum StoreError {
    /// 序列化失败
    Encode(String),
    /// 写入存储失败
    Write(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Encode(msg) => write!(f, "failed to encode credential: {}", msg),
            StoreError::Write(msg) => write!(f, "failed to write credential: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Non-volatile home of the single credential record.
pub trait CredentialStore {
    /// Fails soft: any read problem is reported as absent.
    fn load(&self) -> Option<NetworkCredential>;

    /// Must be durable when it returns `Ok`.
    fn save(&mut self, credential: &NetworkCredential) -> Result<(), StoreError>;
}
