//! HTTP 路由：三条固定路由加上 `/stream` 的 HEAD 检查
//!
//! 连接管理、请求头解析和 404/405 由 ESP-IDF 的 httpd 负责，这里只处理
//! 已经路由好的请求，通过 `Exchange` 与具体的服务器解耦。

mod handlers;

use std::io;

use http::{Method, StatusCode};

pub use handlers::{dispatch, handle_status, handle_stream, handle_stream_head, handle_update};

/// One routed request, as the HTTP server hands it to a handler.
pub trait Exchange {
    type Writer: io::Write;

    /// Reads request body bytes; `Ok(0)` at the end of the body.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Sends the status line and headers, then hands back the body writer.
    fn respond(self, status: StatusCode, headers: &[(&str, &str)]) -> io::Result<Self::Writer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Stream,
    /// `HEAD /stream`: reachability check before opening the stream.
    StreamHead,
    UpdateWifi,
    Status,
}

/// Every registered path and method. Anything else is answered by the server
/// itself: 404 for an unknown path, 405 for a known path with another method.
pub const ROUTES: [(&str, Method, Route); 4] = [
    ("/stream", Method::GET, Route::Stream),
    ("/stream", Method::HEAD, Route::StreamHead),
    ("/update_wifi", Method::POST, Route::UpdateWifi),
    ("/status", Method::GET, Route::Status),
];

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Result<Self, StatusCode> {
        let mut known_path = false;
        for (p, m, route) in &ROUTES {
            if *p == path {
                if m == method {
                    return Ok(*route);
                }
                known_path = true;
            }
        }
        if known_path {
            Err(StatusCode::METHOD_NOT_ALLOWED)
        } else {
            Err(StatusCode::NOT_FOUND)
        }
    }
}
