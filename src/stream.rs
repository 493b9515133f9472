//! MJPEG dashboard stream.
//!
//! A tiny multipart/x-mixed-replace push server. The accept loop runs on one
//! background thread; frames are JPEG-encoded and fanned out on the control
//! thread by [`MjpegHandle::push_frame`], so the vision loop keeps sole
//! ownership of frame data. Dead clients are dropped on the first failed
//! write.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::ImageEncoder;

use crate::frame::Frame;

const BOUNDARY: &str = "txvisionframe";

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub addr: String,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8090".to_string(),
            quality: 75,
        }
    }
}

pub struct MjpegServer {
    cfg: StreamConfig,
}

#[derive(Debug)]
pub struct MjpegHandle {
    pub addr: SocketAddr,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    quality: u8,
}

impl MjpegServer {
    pub fn new(cfg: StreamConfig) -> Self {
        Self { cfg }
    }

    /// Bind and start the accept thread.
    pub fn spawn(self) -> Result<MjpegHandle> {
        let listener = TcpListener::bind(&self.cfg.addr)
            .with_context(|| format!("bind mjpeg server to {}", self.cfg.addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let clients: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_clients = Arc::clone(&clients);
        let accept_shutdown = Arc::clone(&shutdown);
        let join = std::thread::spawn(move || {
            accept_loop(listener, accept_clients, accept_shutdown);
        });

        log::info!("stream: mjpeg server listening on {}", addr);
        Ok(MjpegHandle {
            addr,
            clients,
            shutdown,
            join: Some(join),
            quality: self.cfg.quality,
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                let header = format!(
                    "HTTP/1.0 200 OK\r\n\
                     Content-Type: multipart/x-mixed-replace; boundary={}\r\n\
                     Cache-Control: no-cache\r\n\
                     Connection: close\r\n\r\n",
                    BOUNDARY
                );
                if stream.write_all(header.as_bytes()).is_ok() {
                    log::info!("stream: viewer connected from {}", peer);
                    let mut clients = clients.lock().unwrap_or_else(|e| e.into_inner());
                    clients.push(stream);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                log::warn!("stream: accept failed: {}", err);
                std::thread::sleep(Duration::from_millis(200));
            }
        }
    }
}

impl MjpegHandle {
    /// Encode one frame and push it to every connected viewer.
    pub fn push_frame(&self, frame: &Frame) -> Result<()> {
        let mut jpeg = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        encoder
            .write_image(
                frame.data(),
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("encode frame as jpeg")?;

        let part = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            BOUNDARY,
            jpeg.len()
        );

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.retain_mut(|stream| {
            stream
                .write_all(part.as_bytes())
                .and_then(|_| stream.write_all(&jpeg))
                .and_then(|_| stream.write_all(b"\r\n"))
                .is_ok()
        });
        Ok(())
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| anyhow!("mjpeg accept thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for MjpegHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn loopback_server() -> MjpegHandle {
        MjpegServer::new(StreamConfig {
            addr: "127.0.0.1:0".to_string(),
            quality: 75,
        })
        .spawn()
        .expect("spawn")
    }

    #[test]
    fn pushes_jpeg_parts_to_connected_viewer() {
        let handle = loopback_server();
        let mut viewer = TcpStream::connect(handle.addr).expect("connect");
        viewer
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");

        // Wait for the accept thread to register the viewer.
        for _ in 0..100 {
            if handle.client_count() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(handle.client_count(), 1);

        let mut frame = Frame::black(280, 210);
        frame.fill_rect(0, 0, 280, 210, (10, 120, 30));
        handle.push_frame(&frame).expect("push");

        let mut buf = vec![0u8; 4096];
        let n = viewer.read(&mut buf).expect("read");
        let head = String::from_utf8_lossy(&buf[..n]);
        assert!(head.starts_with("HTTP/1.0 200 OK"), "head: {}", head);
        assert!(head.contains("multipart/x-mixed-replace"));

        handle.stop().expect("stop");
    }

    #[test]
    fn dead_viewers_are_dropped_on_push() {
        let handle = loopback_server();
        {
            let viewer = TcpStream::connect(handle.addr).expect("connect");
            for _ in 0..100 {
                if handle.client_count() == 1 {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            drop(viewer);
        }

        let frame = Frame::black(8, 8);
        // The first push may still succeed into the OS buffer; the second
        // observes the closed socket.
        for _ in 0..5 {
            let _ = handle.push_frame(&frame);
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(handle.client_count(), 0);

        handle.stop().expect("stop");
    }
}
