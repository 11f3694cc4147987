//! 控制接口：`/update_wifi` 与 `/status`
//!
//! 两个操作都是一次请求一次响应，调用之间不保留任何状态。

use std::net::Ipv4Addr;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::bootstrap::NetworkMode;
use crate::credential::{CredentialStore, NetworkCredential};

/// 802.11 limits: SSID is at most 32 bytes, a WPA2 passphrase at most 64.
pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;

/// Live view of the active network interface.
pub trait NetworkStatus {
    fn ip_address(&self) -> Option<Ipv4Addr>;

    /// dBm of the associated AP, 0 when there is none.
    fn rssi(&self) -> i32;
}

/// JSON reply produced by a control operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    /// Restart the device once the reply has been flushed.
    pub restart: bool,
}

impl Reply {
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_string(value)
            .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string());
        Self {
            status,
            body,
            restart: false,
        }
    }

    pub fn error(status: StatusCode, reason: impl std::fmt::Display) -> Self {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
        }
        Self::json(
            status,
            &ErrorBody {
                error: reason.to_string(),
            },
        )
    }
}

/// 凭据更新失败原因
#[derive(Debug)]
pub enum UpdateError {
    /// 请求体为空
    MissingBody,
    /// 不是 JSON 对象
    Malformed(String),
    /// ssid 缺失或为空
    MissingSsid,
    /// ssid 超过 32 字节
    SsidTooLong(usize),
    /// 密码超过 64 字节
    PasswordTooLong(usize),
    /// 写入存储失败
    Storage(String),
}

impl UpdateError {
    pub fn status(&self) -> StatusCode {
        match self {
            UpdateError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateError::MissingBody => write!(f, "missing request body"),
            UpdateError::Malformed(msg) => write!(f, "invalid JSON: {}", msg),
            UpdateError::MissingSsid => write!(f, "ssid is required"),
            UpdateError::SsidTooLong(len) => {
                write!(f, "ssid is {} bytes, at most {} allowed", len, MAX_SSID_LEN)
            }
            UpdateError::PasswordTooLong(len) => write!(
                f,
                "password is {} bytes, at most {} allowed",
                len, MAX_PASSWORD_LEN
            ),
            UpdateError::Storage(msg) => write!(f, "failed to save credentials: {}", msg),
        }
    }
}

impl std::error::Error for UpdateError {}

/// Update payload. `password: None` (absent) and `Some("")` are kept apart.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub ssid: Option<String>,
    pub password: Option<String>,
}

impl UpdateRequest {
    pub fn parse(body: Option<&[u8]>) -> Result<Self, UpdateError> {
        let body = match body {
            Some(b) if !b.iter().all(u8::is_ascii_whitespace) => b,
            _ => return Err(UpdateError::MissingBody),
        };

        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| UpdateError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(UpdateError::Malformed("expected an object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| UpdateError::Malformed(e.to_string()))
    }

    pub fn into_credential(self) -> Result<NetworkCredential, UpdateError> {
        let ssid = match self.ssid {
            Some(ssid) if !ssid.is_empty() => ssid,
            _ => return Err(UpdateError::MissingSsid),
        };
        if ssid.len() > MAX_SSID_LEN {
            return Err(UpdateError::SsidTooLong(ssid.len()));
        }
        if let Some(password) = &self.password {
            if password.len() > MAX_PASSWORD_LEN {
                return Err(UpdateError::PasswordTooLong(password.len()));
            }
        }
        let password = self.password.unwrap_or_else(|| {
            log::warn!("No password given for {:?}, saving as open network", ssid);
            String::new()
        });
        Ok(NetworkCredential::new(ssid, password))
    }
}

pub fn update_credentials<S>(store: &mut S, body: Option<&[u8]>) -> Reply
where
    S: CredentialStore + ?Sized,
{
    match try_update(store, body) {
        Ok(credential) => {
            log::info!("Saved credential for SSID: {:?}, rebooting", credential.name);
            let mut reply = Reply::json(
                StatusCode::OK,
                &serde_json::json!({ "status": "saved, rebooting" }),
            );
            reply.restart = true;
            reply
        }
        Err(e) => {
            match &e {
                UpdateError::Storage(_) => log::error!("Credential update failed: {}", e),
                _ => log::info!("Rejected credential update: {}", e),
            }
            Reply::error(e.status(), e)
        }
    }
}

fn try_update<S: CredentialStore + ?Sized>(
    store: &mut S,
    body: Option<&[u8]>,
) -> Result<NetworkCredential, UpdateError> {
    let credential = UpdateRequest::parse(body)?.into_credential()?;
    store
        .save(&credential)
        .map_err(|e| UpdateError::Storage(e.to_string()))?;
    Ok(credential)
}

#[derive(Debug, Serialize)]
struct StatusBody {
    ip: String,
    rssi: i32,
    mode: &'static str,
}

pub fn status<N: NetworkStatus + ?Sized>(network: &N, mode: NetworkMode) -> Reply {
    let body = StatusBody {
        ip: network
            .ip_address()
            .unwrap_or(Ipv4Addr::UNSPECIFIED)
            .to_string(),
        rssi: network.rssi(),
        mode: mode.label(),
    };
    Reply::json(StatusCode::OK, &body)
}
