//! Minimal MJPEG HTTP server
//!
//! Run with: cargo run --example mjpeg_server [BIND_ADDR] [WIDTH] [HEIGHT] [ROTATION]
//!
//! Examples:
//!   cargo run --example mjpeg_server                        # binds to 127.0.0.1:8080, 1280x720
//!   cargo run --example mjpeg_server 0.0.0.0:8080           # all interfaces
//!   cargo run --example mjpeg_server localhost 640 480 180  # small and upside down
//!
//! Open http://localhost:8080/ in a browser, or:
//!   ffplay -f mjpeg http://localhost:8080/
//!
//! Every viewer shares the same rpicam-vid process. It starts with the first
//! viewer and stops when the last one disconnects.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rpicam_rs::mjpeg::MultipartEncoder;
use rpicam_rs::{Camera, CaptureConfig, Error};

const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:8081" -> 127.0.0.1:8081
/// - "0.0.0.0" -> 0.0.0.0:8080
/// - "0.0.0.0:8081" -> 0.0.0.0:8081
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn parse_number(args: &[String], index: usize, name: &str, default: u32) -> Result<u32, String> {
    match args.get(index) {
        Some(value) => value
            .parse()
            .map_err(|_| format!("Invalid {}: '{}'", name, value)),
        None => Ok(default),
    }
}

fn print_usage() {
    eprintln!("Usage: mjpeg_server [BIND_ADDR] [WIDTH] [HEIGHT] [ROTATION]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 127.0.0.1:8080)");
    eprintln!("  WIDTH        Video width (default: 1280)");
    eprintln!("  HEIGHT       Video height (default: 720)");
    eprintln!("  ROTATION     Video rotation in degrees (default: 0)");
}

/// Read the request head and return the request line
async fn read_request_line(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        if head.len() >= MAX_REQUEST_HEAD {
            return Ok(None);
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        head.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&head);
    Ok(text.lines().next().map(str::to_string))
}

async fn handle_viewer(camera: Camera, mut socket: TcpStream, peer: SocketAddr) -> std::io::Result<()> {
    let Some(request_line) = read_request_line(&mut socket).await? else {
        return Ok(());
    };

    let mut parts = request_line.split_whitespace();
    let (method, path) = (parts.next().unwrap_or(""), parts.next().unwrap_or(""));
    if method != "GET" || path != "/" {
        socket
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return Ok(());
    }

    let stream = match camera.attach().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Failed to start camera");
            let body = format!("Failed to start camera: {}\n", e);
            let response = format!(
                "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await?;
            return Ok(());
        }
    };

    tracing::info!(peer = %peer, subscriber_id = stream.id(), "Viewer connected");

    let encoder = MultipartEncoder::default();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        encoder.content_type()
    );

    let result = async {
        socket.write_all(header.as_bytes()).await?;
        loop {
            let frame = match stream.pull().await {
                Ok(frame) => frame,
                Err(Error::EndOfStream) | Err(Error::Closed) => break,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Failed to get camera frame");
                    break;
                }
            };
            let part = encoder.encode_part(frame.bytes());
            frame.release();
            socket.write_all(&part).await?;
        }
        socket.write_all(&encoder.closing()).await
    }
    .await;

    stream.close().await;
    tracing::info!(peer = %peer, "Viewer disconnected");
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let parsed = (|| -> Result<_, String> {
        let bind_addr = match args.get(1) {
            Some(addr) => parse_bind_addr(addr)?,
            None => SocketAddr::from(([127, 0, 0, 1], 8080)),
        };
        let width = parse_number(&args, 2, "width", 1280)?;
        let height = parse_number(&args, 3, "height", 720)?;
        let rotation = parse_number(&args, 4, "rotation", 0)?;
        Ok((bind_addr, width, height, rotation))
    })();

    let (bind_addr, width, height, rotation) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rpicam_rs=info".parse()?)
                .add_directive("mjpeg_server=info".parse()?),
        )
        .init();

    let camera = Camera::new(CaptureConfig::with_resolution(width, height).rotation(rotation));

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, width, height, "HTTP server listening");

    let accept_loop = async {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let camera = camera.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_viewer(camera, socket, peer).await {
                            tracing::debug!(peer = %peer, error = %e, "Viewer connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    // Ends every viewer's stream and stops rpicam-vid
    camera.shutdown().await;

    Ok(())
}
