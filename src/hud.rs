//! Localhost WebSocket HUD broadcaster.
//!
//! The frame thread never touches a socket: it drops the latest value per
//! message type into a coalescing mailbox and moves on. An I/O thread drains
//! the mailbox, serializes, throttles and fans out to connected clients; a
//! second thread accepts connections and validates the session token. The
//! mailbox never holds more than one value per message type, so a slow or
//! absent consumer costs nothing but overwrites.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use base64::Engine;
use log::{debug, info, warn};
use opencv::{
    core::{Mat, Size, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::{Message, WebSocket};
use uuid::Uuid;

use crate::config::HudConfig;
use crate::{Error, Result};

/// Width camera frames are resized to before JPEG encoding
const CAMERA_FRAME_WIDTH: i32 = 320;
/// JPEG quality for camera frames
const CAMERA_JPEG_QUALITY: i32 = 50;
/// Client inactivity window before the broadcaster closes the socket
const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Keepalive ping interval
const PING_INTERVAL: Duration = Duration::from_secs(10);
/// Mailbox poll interval for the I/O thread
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Server → client HUD messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HudMessage {
    Scroll { vy: f64, speed: f64 },
    Hide,
    Touchproof { active: bool, hands: u32 },
    Camera { frame: String, width: u32, height: u32 },
    Config { position: String, opacity: f64 },
    Status { note: String },
}

/// Client → server HUD messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Mode { expanded: bool },
    CameraEnabled { enabled: bool },
}

/// Deterministic per-type rate limiter keyed on frame timestamps.
///
/// The interval rounds up so the effective rate never exceeds the requested
/// one.
#[derive(Debug)]
pub struct Throttle {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl Throttle {
    #[must_use]
    pub fn from_hz(hz: u32) -> Self {
        Self {
            interval_ms: 1000_u64.div_ceil(u64::from(hz.max(1))),
            last_ms: None,
        }
    }

    /// True when enough time has passed since the last accepted event;
    /// accepting consumes the slot.
    pub fn ready(&mut self, t_ms: u64) -> bool {
        match self.last_ms {
            Some(last) if t_ms.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(t_ms);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}

#[derive(Default)]
struct Slots {
    scroll: Option<HudMessage>,
    hide: bool,
    touchproof: Option<HudMessage>,
    camera: Option<HudMessage>,
    status: Option<HudMessage>,
}

impl Slots {
    fn store(&mut self, message: HudMessage) {
        match message {
            HudMessage::Scroll { .. } => self.scroll = Some(message),
            HudMessage::Hide => self.hide = true,
            HudMessage::Touchproof { .. } => self.touchproof = Some(message),
            HudMessage::Camera { .. } => self.camera = Some(message),
            HudMessage::Status { .. } => self.status = Some(message),
            // config is emitted directly on connect, never queued
            HudMessage::Config { .. } => {}
        }
    }

    fn is_empty(&self) -> bool {
        self.scroll.is_none()
            && !self.hide
            && self.touchproof.is_none()
            && self.camera.is_none()
            && self.status.is_none()
    }
}

struct Mailbox {
    slots: Mutex<Slots>,
    available: Condvar,
}

/// Frame-thread handle for publishing HUD events
#[derive(Clone)]
pub struct HudPublisher {
    mailbox: Arc<Mailbox>,
    client_count: Arc<AtomicUsize>,
    camera_wanted: Arc<AtomicBool>,
}

impl HudPublisher {
    /// Queue the latest value of a message type; never blocks. The mailbox
    /// retains one value per type, so with no clients connected events are
    /// simply overwritten until someone cares.
    pub fn publish(&self, message: HudMessage) {
        let mut slots = self.mailbox.slots.lock().unwrap();
        slots.store(message);
        self.mailbox.available.notify_one();
    }

    /// Drain pending messages in send order without a running broadcaster.
    /// Diagnostic support; the I/O thread normally owns the drain.
    pub fn take_pending(&self) -> Vec<HudMessage> {
        let mut slots = self.mailbox.slots.lock().unwrap();
        let mut out = Vec::new();
        if let Some(msg) = slots.touchproof.take() {
            out.push(msg);
        }
        if let Some(msg) = slots.scroll.take() {
            out.push(msg);
        }
        if std::mem::take(&mut slots.hide) {
            out.push(HudMessage::Hide);
        }
        if let Some(msg) = slots.status.take() {
            out.push(msg);
        }
        if let Some(msg) = slots.camera.take() {
            out.push(msg);
        }
        out
    }

    /// True when at least one client is connected
    #[must_use]
    pub fn has_clients(&self) -> bool {
        self.client_count.load(Ordering::Relaxed) > 0
    }

    /// True when some client is in expanded mode with camera enabled, so
    /// encoding a camera frame is worth the work
    #[must_use]
    pub fn camera_wanted(&self) -> bool {
        self.camera_wanted.load(Ordering::Relaxed)
    }

    /// Publisher with no broadcaster behind it: HUD-disabled runs and tests.
    /// Messages land in the mailbox and stay there until overwritten.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            mailbox: Arc::new(Mailbox {
                slots: Mutex::new(Slots::default()),
                available: Condvar::new(),
            }),
            client_count: Arc::new(AtomicUsize::new(0)),
            camera_wanted: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct Client {
    ws: WebSocket<TcpStream>,
    expanded: bool,
    camera_enabled: bool,
    last_activity: Instant,
    last_ping: Instant,
    dead: bool,
}

impl Client {
    fn send(&mut self, message: &HudMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("HUD serialization failed: {e}");
                return;
            }
        };
        match self.ws.send(Message::Text(json)) {
            Ok(()) => {}
            // a slow client loses the message, the frame pipeline does not
            Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                debug!("HUD client send failed: {e}");
                self.dead = true;
            }
        }
    }

    fn drain_incoming(&mut self) {
        loop {
            match self.ws.read() {
                Ok(Message::Text(text)) => {
                    self.last_activity = Instant::now();
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Mode { expanded }) => self.expanded = expanded,
                        Ok(ClientMessage::CameraEnabled { enabled }) => {
                            self.camera_enabled = enabled;
                        }
                        Err(e) => {
                            warn!("dropping HUD client after malformed message: {e}");
                            self.dead = true;
                            return;
                        }
                    }
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    self.last_activity = Instant::now();
                }
                Ok(Message::Close(_)) => {
                    self.dead = true;
                    return;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!("HUD client read failed: {e}");
                    self.dead = true;
                    return;
                }
            }
        }
    }

    fn keepalive(&mut self) {
        if self.last_activity.elapsed() > CLIENT_IDLE_TIMEOUT {
            debug!("closing idle HUD client");
            let _ = self.ws.close(None);
            self.dead = true;
            return;
        }
        if self.last_ping.elapsed() > PING_INTERVAL {
            self.last_ping = Instant::now();
            if self.ws.send(Message::Ping(Vec::new())).is_err() {
                self.dead = true;
            }
        }
    }
}

/// Localhost WebSocket publisher with throttling and session token
pub struct HudBroadcaster {
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    io_handle: Option<JoinHandle<()>>,
    local_port: u16,
    token: Option<String>,
}

impl HudBroadcaster {
    /// Bind the HUD port and start the accept and I/O threads.
    ///
    /// # Errors
    ///
    /// [`Error::HudPortInUse`] when the port is already bound; other I/O
    /// errors bubble up as [`Error::Io`].
    pub fn bind(config: &HudConfig) -> Result<(Self, HudPublisher)> {
        let listener = TcpListener::bind(("127.0.0.1", config.port)).map_err(|e| {
            if e.kind() == ErrorKind::AddrInUse {
                Error::HudPortInUse(config.port)
            } else {
                Error::Io(e)
            }
        })?;
        let local_port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        // empty token disables the check, None generates a fresh one
        let token = match &config.token {
            Some(token) if token.is_empty() => None,
            Some(token) => Some(token.clone()),
            None => {
                let token = Uuid::new_v4().to_string();
                info!("HUD session token: {token}");
                Some(token)
            }
        };

        let publisher = HudPublisher::detached();
        let shutdown = Arc::new(AtomicBool::new(false));
        let clients: Arc<Mutex<VecDeque<Client>>> = Arc::new(Mutex::new(VecDeque::new()));

        let accept_handle = {
            let shutdown = Arc::clone(&shutdown);
            let clients = Arc::clone(&clients);
            let client_count = Arc::clone(&publisher.client_count);
            let token = token.clone();
            let hello = HudMessage::Config {
                position: config.position.clone(),
                opacity: config.opacity,
            };
            std::thread::Builder::new()
                .name("hud-accept".to_string())
                .spawn(move || accept_loop(&listener, &shutdown, &clients, &client_count, token.as_deref(), &hello))?
        };

        let io_handle = {
            let shutdown = Arc::clone(&shutdown);
            let clients = Arc::clone(&clients);
            let mailbox = Arc::clone(&publisher.mailbox);
            let client_count = Arc::clone(&publisher.client_count);
            let camera_wanted = Arc::clone(&publisher.camera_wanted);
            let hud_hz = config.hud_hz;
            let camera_hz = config.camera_hz;
            std::thread::Builder::new()
                .name("hud-io".to_string())
                .spawn(move || {
                    io_loop(
                        &shutdown,
                        &clients,
                        &mailbox,
                        &client_count,
                        &camera_wanted,
                        hud_hz,
                        camera_hz,
                    );
                })?
        };

        info!("HUD broadcaster listening on ws://127.0.0.1:{local_port}/hud");

        Ok((
            Self {
                shutdown,
                accept_handle: Some(accept_handle),
                io_handle: Some(io_handle),
                local_port,
                token,
            },
            publisher,
        ))
    }

    /// Port actually bound (differs from config when it asked for 0)
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_port
    }

    /// Session token clients must present, if any
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Stop both threads and close client sockets
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.io_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HudBroadcaster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: &TcpListener,
    shutdown: &AtomicBool,
    clients: &Mutex<VecDeque<Client>>,
    client_count: &AtomicUsize,
    token: Option<&str>,
    hello: &HudMessage,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("HUD connection from {addr}");
                match handshake(stream, token) {
                    Ok(ws) => {
                        let mut client = Client {
                            ws,
                            expanded: false,
                            camera_enabled: true,
                            last_activity: Instant::now(),
                            last_ping: Instant::now(),
                            dead: false,
                        };
                        client.send(hello);
                        let mut clients = clients.lock().unwrap();
                        clients.push_back(client);
                        client_count.store(clients.len(), Ordering::Relaxed);
                    }
                    Err(e) => debug!("HUD handshake rejected: {e}"),
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!("HUD accept failed: {e}");
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn handshake(stream: TcpStream, token: Option<&str>) -> Result<WebSocket<TcpStream>> {
    // handshake runs blocking with a timeout, steady-state I/O is nonblocking
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let check = |req: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        if req.uri().path() != "/hud" {
            return Err(reject(404, "unknown path"));
        }
        if let Some(expected) = token {
            let presented = req
                .uri()
                .query()
                .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("token=")));
            if presented != Some(expected) {
                return Err(reject(403, "invalid session token"));
            }
        }
        Ok(response)
    };

    let ws = tungstenite::accept_hdr(stream, check)
        .map_err(|e| Error::HudClient(format!("handshake failed: {e}")))?;
    ws.get_ref().set_nonblocking(true)?;
    ws.get_ref().set_read_timeout(None)?;
    ws.get_ref().set_write_timeout(None)?;
    Ok(ws)
}

fn reject(status: u16, reason: &str) -> ErrorResponse {
    ErrorResponse::builder()
        .status(status)
        .body(Some(reason.to_string()))
        .unwrap_or_default()
}

fn io_loop(
    shutdown: &AtomicBool,
    clients: &Mutex<VecDeque<Client>>,
    mailbox: &Mailbox,
    client_count: &AtomicUsize,
    camera_wanted: &AtomicBool,
    hud_hz: u32,
    camera_hz: u32,
) {
    let mut scroll_throttle = WallThrottle::from_hz(hud_hz);
    let mut touchproof_throttle = WallThrottle::from_hz(hud_hz);
    let mut camera_throttle = WallThrottle::from_hz(camera_hz);

    while !shutdown.load(Ordering::SeqCst) {
        let pending = {
            let slots = mailbox.slots.lock().unwrap();
            let (mut slots, _) = mailbox
                .available
                .wait_timeout_while(slots, DRAIN_INTERVAL, |s| s.is_empty())
                .unwrap();

            let mut pending = Slots::default();
            if slots.touchproof.is_some() && touchproof_throttle.ready() {
                pending.touchproof = slots.touchproof.take();
            }
            if slots.scroll.is_some() && scroll_throttle.ready() {
                pending.scroll = slots.scroll.take();
            }
            if slots.camera.is_some() && camera_throttle.ready() {
                pending.camera = slots.camera.take();
            }
            pending.hide = std::mem::take(&mut slots.hide);
            pending.status = slots.status.take();
            pending
        };

        let mut clients = clients.lock().unwrap();
        let any_expanded = clients.iter().any(|c| c.expanded && c.camera_enabled);
        for client in clients.iter_mut() {
            client.drain_incoming();
            if client.dead {
                continue;
            }
            if let Some(msg) = &pending.touchproof {
                client.send(msg);
            }
            if let Some(msg) = &pending.scroll {
                client.send(msg);
            }
            if pending.hide {
                client.send(&HudMessage::Hide);
            }
            if let Some(msg) = &pending.status {
                client.send(msg);
            }
            if client.expanded && client.camera_enabled {
                if let Some(msg) = &pending.camera {
                    client.send(msg);
                }
            }
            client.keepalive();
        }
        clients.retain(|c| !c.dead);
        client_count.store(clients.len(), Ordering::Relaxed);
        camera_wanted.store(any_expanded, Ordering::Relaxed);
    }

    // deterministic teardown: tell clients we are gone
    let mut clients = clients.lock().unwrap();
    for client in clients.iter_mut() {
        let _ = client.ws.close(None);
    }
    clients.clear();
    client_count.store(0, Ordering::Relaxed);
}

// Wall-clock variant of Throttle for the I/O thread, which has no frame
// timestamps.
struct WallThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl WallThrottle {
    fn from_hz(hz: u32) -> Self {
        Self {
            interval: Duration::from_millis(1000_u64.div_ceil(u64::from(hz.max(1)))),
            last: None,
        }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Resize, JPEG-encode and base64-wrap a camera frame for the HUD.
///
/// # Errors
///
/// Propagates OpenCV failures from resize or encode.
pub fn encode_camera_frame(frame: &Mat) -> Result<HudMessage> {
    let (w, h) = (frame.cols(), frame.rows());
    if w <= 0 || h <= 0 {
        return Err(Error::InvalidInput("empty camera frame".to_string()));
    }
    let out_h = (f64::from(h) * f64::from(CAMERA_FRAME_WIDTH) / f64::from(w)).round() as i32;

    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(CAMERA_FRAME_WIDTH, out_h.max(1)),
        0.0,
        0.0,
        imgproc::INTER_AREA,
    )?;

    let mut jpeg = Vector::<u8>::new();
    let mut params = Vector::<i32>::new();
    params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
    params.push(CAMERA_JPEG_QUALITY);
    imgcodecs::imencode(".jpg", &resized, &mut jpeg, &params)?;

    Ok(HudMessage::Camera {
        frame: base64::engine::general_purpose::STANDARD.encode(jpeg.to_vec()),
        width: CAMERA_FRAME_WIDTH as u32,
        height: out_h.max(1) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_string(&HudMessage::Scroll { vy: -3.5, speed: 0.5 }).unwrap();
        assert_eq!(json, r#"{"type":"scroll","vy":-3.5,"speed":0.5}"#);

        let json = serde_json::to_string(&HudMessage::Hide).unwrap();
        assert_eq!(json, r#"{"type":"hide"}"#);

        let json = serde_json::to_string(&HudMessage::Touchproof {
            active: true,
            hands: 1,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"touchproof","active":true,"hands":1}"#);

        let json = serde_json::to_string(&HudMessage::Config {
            position: "bottom-right".to_string(),
            opacity: 0.8,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"config","position":"bottom-right","opacity":0.8}"#);
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"mode","expanded":true}"#).unwrap();
        assert_eq!(msg, ClientMessage::Mode { expanded: true });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"camera_enabled","enabled":false}"#).unwrap();
        assert_eq!(msg, ClientMessage::CameraEnabled { enabled: false });

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_throttle_respects_rate() {
        let mut throttle = Throttle::from_hz(60);
        let mut sent = 0;
        for t_ms in 0..1000 {
            if throttle.ready(t_ms) {
                sent += 1;
            }
        }
        assert!(sent <= 60, "sent {sent} messages in 1s at 60 Hz");
        assert!(sent >= 55);
    }

    #[test]
    fn test_throttle_first_event_passes() {
        let mut throttle = Throttle::from_hz(30);
        assert!(throttle.ready(500));
        assert!(!throttle.ready(510));
        assert!(throttle.ready(500 + 34));
    }

    #[test]
    fn test_throttle_reset() {
        let mut throttle = Throttle::from_hz(30);
        assert!(throttle.ready(0));
        throttle.reset();
        assert!(throttle.ready(1));
    }

    #[test]
    fn test_slots_coalesce_latest() {
        let mut slots = Slots::default();
        slots.store(HudMessage::Scroll { vy: 1.0, speed: 0.1 });
        slots.store(HudMessage::Scroll { vy: 2.0, speed: 0.2 });
        assert_eq!(slots.scroll, Some(HudMessage::Scroll { vy: 2.0, speed: 0.2 }));
        assert!(!slots.is_empty());
    }

    #[test]
    fn test_publisher_retains_one_per_type() {
        let publisher = HudPublisher::detached();
        assert!(!publisher.has_clients());
        publisher.publish(HudMessage::Scroll { vy: 1.0, speed: 0.1 });
        publisher.publish(HudMessage::Scroll { vy: 9.0, speed: 0.9 });
        publisher.publish(HudMessage::Hide);
        let pending = publisher.take_pending();
        assert_eq!(
            pending,
            vec![HudMessage::Scroll { vy: 9.0, speed: 0.9 }, HudMessage::Hide]
        );
        assert!(publisher.take_pending().is_empty());
    }
}
