//! ESP-IDF httpd 适配：把固定路由注册到 `EspHttpServer`
//!
//! httpd 在自己的任务里按顺序调用处理器。接收和发送都有 httpd 自带的
//! 超时，迟迟不发请求的客户端会被它断开。

use std::io;
use std::sync::Arc;

use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request, Response};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Read as _;
use http::StatusCode;

use crate::context::AppContext;
use crate::server::{dispatch, Exchange, ROUTES};
use crate::stream::FrameSource;

fn to_io<E: std::fmt::Debug>(e: E) -> io::Error {
    io::Error::other(format!("{:?}", e))
}

pub struct HttpExchange<'r, 'c> {
    req: Request<&'r mut EspHttpConnection<'c>>,
}

impl<'r, 'c> Exchange for HttpExchange<'r, 'c> {
    type Writer = ResponseWriter<'r, 'c>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.req.read(buf).map_err(to_io)
    }

    fn respond(self, status: StatusCode, headers: &[(&str, &str)]) -> io::Result<Self::Writer> {
        let resp = self
            .req
            .into_response(status.as_u16(), status.canonical_reason(), headers)
            .map_err(to_io)?;
        Ok(ResponseWriter {
            resp,
            failed: false,
        })
    }
}

/// Response body writer. Any failed send marks the peer as gone.
pub struct ResponseWriter<'r, 'c> {
    resp: Response<&'r mut EspHttpConnection<'c>>,
    failed: bool,
}

impl ResponseWriter<'_, '_> {
    pub fn is_open(&self) -> bool {
        !self.failed
    }
}

impl io::Write for ResponseWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        esp_idf_svc::io::Write::write(&mut self.resp, buf).map_err(|e| {
            self.failed = true;
            to_io(e)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        esp_idf_svc::io::Write::flush(&mut self.resp).map_err(|e| {
            self.failed = true;
            to_io(e)
        })
    }
}

fn esp_method(method: &http::Method) -> anyhow::Result<Method> {
    if *method == http::Method::GET {
        Ok(Method::Get)
    } else if *method == http::Method::HEAD {
        Ok(Method::Head)
    } else if *method == http::Method::POST {
        Ok(Method::Post)
    } else {
        anyhow::bail!("unsupported method {}", method)
    }
}

/// Starts httpd and registers every route. Dropping the server stops it.
pub fn start<F>(ctx: Arc<AppContext<F>>) -> anyhow::Result<EspHttpServer<'static>>
where
    F: FrameSource + Send + Sync + 'static,
{
    let config = Configuration {
        http_port: ctx.server.port,
        stack_size: 10240,
        max_uri_handlers: ROUTES.len(),
        // idle keep-alive sockets give way to new clients
        lru_purge_enable: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&config)?;

    for (path, method, route) in ROUTES {
        let ctx = ctx.clone();
        server.fn_handler::<anyhow::Error, _>(path, esp_method(&method)?, move |req| {
            log::info!("{:?} {}", route, req.uri());
            dispatch(route, HttpExchange { req }, &ctx, ResponseWriter::is_open)?;
            Ok(())
        })?;
    }

    log::info!("HTTP server started on port {}", ctx.server.port);
    Ok(server)
}
