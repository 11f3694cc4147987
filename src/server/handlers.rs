//! HTTP 路由处理器

use std::io::{self, Write};

use http::StatusCode;

use super::{Exchange, Route};
use crate::context::AppContext;
use crate::control::{self, Reply};
use crate::stream::{FrameSource, StreamSession, STREAM_HEADERS};

const JSON_HEADERS: [(&str, &str); 1] = [("Content-Type", "application/json")];

/// Runs the handler for `route`. `is_open` is only consulted by `/stream`.
pub fn dispatch<E, F, P>(route: Route, ex: E, ctx: &AppContext<F>, is_open: P) -> io::Result<()>
where
    E: Exchange,
    F: FrameSource,
    P: FnMut(&E::Writer) -> bool,
{
    match route {
        Route::Stream => handle_stream(ex, ctx, is_open),
        Route::StreamHead => handle_stream_head(ex, ctx),
        Route::UpdateWifi => handle_update(ex, ctx),
        Route::Status => handle_status(ex, ctx),
    }
}

fn write_reply<E: Exchange>(ex: E, reply: &Reply) -> io::Result<()> {
    let mut out = ex.respond(reply.status, &JSON_HEADERS)?;
    out.write_all(reply.body.as_bytes())?;
    out.flush()
}

/// Reads at most `limit + 1` bytes, so an oversized body is detectable
/// without draining it.
fn read_body<E: Exchange>(ex: &mut E, limit: usize) -> io::Result<Vec<u8>> {
    let mut body = vec![0u8; limit + 1];
    let mut len = 0;
    while len < body.len() {
        match ex.read(&mut body[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    body.truncate(len);
    Ok(body)
}

/// `GET /stream`: multipart head, then one part per step until the
/// transport closes.
pub fn handle_stream<E, F, P>(ex: E, ctx: &AppContext<F>, is_open: P) -> io::Result<()>
where
    E: Exchange,
    F: FrameSource,
    P: FnMut(&E::Writer) -> bool,
{
    let Some(frames) = &ctx.frames else {
        let reply = Reply::error(StatusCode::SERVICE_UNAVAILABLE, "camera unavailable");
        return write_reply(ex, &reply);
    };
    let Some(_slot) = ctx.streams.try_acquire() else {
        log::warn!("Refusing viewer, {} streams active", ctx.streams.active());
        let reply = Reply::error(StatusCode::SERVICE_UNAVAILABLE, "too many viewers");
        return write_reply(ex, &reply);
    };

    let mut out = ex.respond(StatusCode::OK, &STREAM_HEADERS)?;
    log::info!("Stream opened");
    let mut session = StreamSession::new(frames, ctx.stream.clone());
    let sent = session.run(&mut out, is_open);
    log::info!("Stream closed after {} frames", sent);
    ctx.system.log_heap();
    Ok(())
}

/// `HEAD /stream`: same head as the stream, no body, no capture.
pub fn handle_stream_head<E, F>(ex: E, ctx: &AppContext<F>) -> io::Result<()>
where
    E: Exchange,
    F: FrameSource,
{
    if ctx.frames.is_some() {
        ex.respond(StatusCode::OK, &STREAM_HEADERS)?;
    } else {
        ex.respond(StatusCode::SERVICE_UNAVAILABLE, &[])?;
    }
    Ok(())
}

/// `POST /update_wifi`: validate, persist, reply, then restart.
pub fn handle_update<E, F>(mut ex: E, ctx: &AppContext<F>) -> io::Result<()>
where
    E: Exchange,
    F: FrameSource,
{
    let limit = ctx.server.max_body;
    let body = match read_body(&mut ex, limit) {
        Ok(body) if body.len() > limit => {
            log::warn!("Update body exceeds {} bytes", limit);
            let reason = format!("request body exceeds {} bytes", limit);
            return write_reply(ex, &Reply::error(StatusCode::PAYLOAD_TOO_LARGE, reason));
        }
        Ok(body) => body,
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            log::warn!("Timed out reading update body");
            let reply = Reply::error(StatusCode::REQUEST_TIMEOUT, "timed out reading request body");
            return write_reply(ex, &reply);
        }
        Err(e) => return Err(e),
    };

    let reply = {
        let mut store = ctx.store();
        let body = Some(body.as_slice()).filter(|b| !b.is_empty());
        control::update_credentials(&mut **store, body)
    };

    let sent = write_reply(ex, &reply);
    if reply.restart {
        log::info!("Restarting in {:?} to apply new credentials", ctx.server.restart_delay);
        ctx.system.restart_after(ctx.server.restart_delay);
    }
    sent
}

/// `GET /status`.
pub fn handle_status<E, F>(ex: E, ctx: &AppContext<F>) -> io::Result<()>
where
    E: Exchange,
    F: FrameSource,
{
    let reply = control::status(&**ctx.network(), ctx.mode);
    write_reply(ex, &reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{Bootstrap, BootstrapConfig, NetworkMode};
    use crate::context::ServerConfig;
    use crate::credential::NetworkCredential;
    use crate::mock::{
        Captured, FixedNetwork, MemoryStore, MockExchange, MockWriter, RecordingSystem,
        ScriptedFrames,
    };
    use crate::stream::StreamConfig;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn context(
        frames: Option<ScriptedFrames>,
        mode: NetworkMode,
    ) -> (AppContext<ScriptedFrames>, MemoryStore, RecordingSystem) {
        let store = MemoryStore::default();
        let system = RecordingSystem::default();
        let ip = match mode {
            NetworkMode::SelfHosted => Ipv4Addr::new(192, 168, 4, 1),
            _ => Ipv4Addr::new(10, 0, 0, 7),
        };
        let ctx = AppContext::new(
            Box::new(store.clone()),
            frames,
            Box::new(FixedNetwork::new(Some(ip), -55)),
            mode,
            Box::new(system.clone()),
        )
        .with_stream_config(StreamConfig {
            yield_interval: Duration::ZERO,
            ..Default::default()
        });
        (ctx, store, system)
    }

    fn exchange(route: Route, ctx: &AppContext<ScriptedFrames>, ex: MockExchange) -> Captured {
        let captured = ex.captured();
        dispatch(route, ex, ctx, MockWriter::is_open).unwrap();
        captured.take()
    }

    fn update(ctx: &AppContext<ScriptedFrames>, body: &str) -> Captured {
        exchange(Route::UpdateWifi, ctx, MockExchange::new(body))
    }

    #[test]
    fn test_update_then_reload_round_trip() {
        let (ctx, store, system) = context(None, NetworkMode::SelfHosted);

        let reply = update(&ctx, r#"{"ssid":"x","password":"y"}"#);

        assert_eq!(reply.status, Some(StatusCode::OK));
        assert_eq!(reply.header("content-type"), Some("application/json"));
        assert_eq!(reply.text(), r#"{"status":"saved, rebooting"}"#);
        assert_eq!(system.restarts(), 1);
        assert_eq!(system.last_delay(), Some(ServerConfig::default().restart_delay));

        // after the restart the bootstrap reads the same flash
        let bootstrap = Bootstrap::new(BootstrapConfig {
            default_credential: None,
            ..Default::default()
        });
        let reloaded = bootstrap.resolve_credential(&store.clone());
        assert_eq!(reloaded, Some(NetworkCredential::new("x", "y")));
    }

    #[test]
    fn test_invalid_update_does_not_restart() {
        let (ctx, store, system) = context(None, NetworkMode::Joined);

        let reply = update(&ctx, r#"{"ssid":""}"#);
        assert_eq!(reply.status, Some(StatusCode::BAD_REQUEST));
        assert!(reply.text().starts_with(r#"{"error":"#));

        let reply = update(&ctx, "hello");
        assert_eq!(reply.status, Some(StatusCode::BAD_REQUEST));

        let reply = update(&ctx, "");
        assert_eq!(reply.text(), r#"{"error":"missing request body"}"#);

        assert_eq!(store.saves(), 0);
        assert_eq!(system.restarts(), 0);
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let (ctx, store, system) = context(None, NetworkMode::SelfHosted);
        let body = format!(r#"{{"ssid":"x","password":"{}"}}"#, "p".repeat(2000));

        let reply = update(&ctx, &body);

        assert_eq!(reply.status, Some(StatusCode::PAYLOAD_TOO_LARGE));
        assert_eq!(store.saves(), 0);
        assert_eq!(system.restarts(), 0);
    }

    #[test]
    fn test_body_at_the_limit_is_read_whole() {
        let (ctx, store, _) = context(None, NetworkMode::SelfHosted);
        let padding = ctx.server.max_body - r#"{"ssid":"x","password":"y"}"#.len();
        let body = format!(r#"{{"ssid":"x",{}"password":"y"}}"#, " ".repeat(padding));
        assert_eq!(body.len(), ctx.server.max_body);

        let reply = update(&ctx, &body);

        assert_eq!(reply.status, Some(StatusCode::OK));
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn test_stalled_body_times_out() {
        let (ctx, store, system) = context(None, NetworkMode::SelfHosted);

        let reply = exchange(Route::UpdateWifi, &ctx, MockExchange::stalled());

        assert_eq!(reply.status, Some(StatusCode::REQUEST_TIMEOUT));
        assert_eq!(store.saves(), 0);
        assert_eq!(system.restarts(), 0);
    }

    #[test]
    fn test_status_by_mode() {
        let (ctx, _, _) = context(None, NetworkMode::SelfHosted);
        let reply = exchange(Route::Status, &ctx, MockExchange::empty());
        assert_eq!(reply.status, Some(StatusCode::OK));
        assert_eq!(reply.text(), r#"{"ip":"192.168.4.1","rssi":-55,"mode":"AP"}"#);

        let (ctx, _, _) = context(None, NetworkMode::Joined);
        let reply = exchange(Route::Status, &ctx, MockExchange::empty());
        assert_eq!(reply.text(), r#"{"ip":"10.0.0.7","rssi":-55,"mode":"STA"}"#);
    }

    #[test]
    fn test_stream_without_camera() {
        let (ctx, _, _) = context(None, NetworkMode::Joined);
        let reply = exchange(Route::Stream, &ctx, MockExchange::empty());
        assert_eq!(reply.status, Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(reply.text(), r#"{"error":"camera unavailable"}"#);
    }

    #[test]
    fn test_stream_head_sends_no_body() {
        let frames = ScriptedFrames::repeating(vec![0xff, 0xd8, 0xff, 0xd9]);
        let (ctx, _, _) = context(Some(frames.clone()), NetworkMode::Joined);

        let reply = exchange(Route::StreamHead, &ctx, MockExchange::empty());

        assert_eq!(reply.status, Some(StatusCode::OK));
        assert_eq!(
            reply.header("Content-Type"),
            Some("multipart/x-mixed-replace; boundary=frame")
        );
        assert!(reply.body.is_empty());
        assert_eq!(frames.checkouts(), 0);

        let (ctx, _, _) = context(None, NetworkMode::Joined);
        let reply = exchange(Route::StreamHead, &ctx, MockExchange::empty());
        assert_eq!(reply.status, Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(reply.body.is_empty());
    }

    #[test]
    fn test_stream_stops_when_predicate_closes() {
        let frames = ScriptedFrames::new(vec![Some(vec![1, 2, 3]), None, Some(vec![4, 5])]);
        let (ctx, _, _) = context(Some(frames.clone()), NetworkMode::Joined);
        let ex = MockExchange::empty();
        let captured = ex.captured();

        let mut budget = 4;
        handle_stream(ex, &ctx, move |_: &MockWriter| {
            budget -= 1;
            budget > 0
        })
        .unwrap();

        let reply = captured.take();
        assert_eq!(reply.status, Some(StatusCode::OK));
        let text = String::from_utf8_lossy(&reply.body);
        assert_eq!(text.matches("--frame\r\n").count(), 2);
        assert!(text.contains("Content-Length: 3\r\n\r\n\u{1}\u{2}\u{3}\r\n"));
        assert_eq!(frames.releases(), 2);
        assert_eq!(frames.outstanding(), 0);
        assert_eq!(ctx.streams.active(), 0);
    }

    #[test]
    fn test_client_disconnect_ends_stream() {
        let frames = ScriptedFrames::repeating(vec![0x5a; 512]);
        let (ctx, _, _) = context(Some(frames.clone()), NetworkMode::Joined);

        let reply = exchange(Route::Stream, &ctx, MockExchange::empty().failing_after(2048));

        assert_eq!(reply.body.len(), 2048);
        assert!(frames.checkouts() >= 1);
        assert_eq!(frames.outstanding(), 0);
        assert_eq!(frames.max_outstanding(), 1);
        assert_eq!(ctx.streams.active(), 0);
    }

    #[test]
    fn test_viewers_beyond_capacity_are_refused() {
        let frames = ScriptedFrames::repeating(vec![1; 8]);
        let (ctx, _, _) = context(Some(frames.clone()), NetworkMode::Joined);
        let held: Vec<_> = (0..ctx.stream.max_sessions)
            .map(|_| ctx.streams.try_acquire())
            .collect();
        assert!(held.iter().all(Option::is_some));

        let reply = exchange(Route::Stream, &ctx, MockExchange::empty());

        assert_eq!(reply.status, Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(reply.text(), r#"{"error":"too many viewers"}"#);
        assert_eq!(frames.checkouts(), 0);

        drop(held);
        let reply = exchange(Route::Stream, &ctx, MockExchange::empty().failing_after(64));
        assert_eq!(reply.status, Some(StatusCode::OK));
        assert_eq!(frames.outstanding(), 0);
    }
}
