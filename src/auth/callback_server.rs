//! One-shot localhost listener for the OAuth redirect.
//!
//! Used by the `mslogin` binary: it waits for Microsoft to redirect the
//! browser back to the callback path, shows a short page, and hands the full
//! callback URL to the caller.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Where to listen and which path counts as the callback.
#[derive(Debug, Clone)]
pub struct CallbackOptions {
    pub port: u16,
    pub callback_path: String,
}

impl CallbackOptions {
    /// The redirect URI a browser will hit.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.callback_path)
    }
}

/// Result from the callback server.
#[derive(Debug)]
pub enum CallbackResult {
    /// Successfully received callback with the full URL.
    Success(String),
    /// Server was cancelled.
    Cancelled,
    /// Error occurred.
    Error(String),
}

/// Start the callback server and wait for a single OAuth callback.
///
/// Returns the full callback URL (including query parameters) when received.
pub fn start_callback_server(
    options: &CallbackOptions,
    cancel_rx: mpsc::Receiver<()>,
) -> CallbackResult {
    let addr = format!("127.0.0.1:{}", options.port);

    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind callback server to {}: {}", addr, e);
            return CallbackResult::Error(format!("Failed to start server: {}", e));
        }
    };

    // Non-blocking so cancellation is noticed
    if let Err(e) = listener.set_nonblocking(true) {
        error!("Failed to set non-blocking mode: {}", e);
        return CallbackResult::Error(format!("Server configuration error: {}", e));
    }

    info!("OAuth callback server listening on {}", addr);

    loop {
        match cancel_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                info!("Callback server cancelled");
                return CallbackResult::Cancelled;
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match listener.accept() {
            Ok((stream, peer_addr)) => {
                debug!("Connection from {}", peer_addr);
                if let Some(url) = handle_connection(stream, options) {
                    info!("OAuth callback received");
                    return CallbackResult::Success(url);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                return CallbackResult::Error(format!("Connection error: {}", e));
            }
        }
    }
}

/// Handle an incoming HTTP connection.
///
/// Returns Some(url) if this was an OAuth callback, None otherwise.
fn handle_connection(mut stream: TcpStream, options: &CallbackOptions) -> Option<String> {
    // Accepted sockets may inherit non-blocking mode from the listener
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));

    let mut buffer = [0; 4096];
    let bytes_read = match stream.read(&mut buffer) {
        Ok(n) => n,
        Err(e) => {
            debug!("Failed to read request: {}", e);
            return None;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);
    let request_line = request.lines().next()?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();

    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", "text/plain", "Bad Request");
        return None;
    }

    let (method, target) = (parts[0], parts[1]);
    let path = target.split('?').next().unwrap_or(target);

    if method != "GET" {
        send_response(&mut stream, 405, "Method Not Allowed", "text/plain", "Method Not Allowed");
        return None;
    }

    if path != options.callback_path {
        send_response(&mut stream, 404, "Not Found", "text/plain", "Not Found");
        return None;
    }

    let callback_url = format!("http://localhost:{}{}", options.port, target);

    // Error callbacks are still handed back so the caller can report them
    if target.contains("error=") {
        send_page(&mut stream, "Sign-in failed", &error_description(target));
        return Some(callback_url);
    }

    if !target.contains("code=") {
        send_response(&mut stream, 400, "Bad Request", "text/plain", "Missing authorization code");
        return None;
    }

    send_page(
        &mut stream,
        "Signed in",
        "You can close this tab and return to the terminal.",
    );

    Some(callback_url)
}

fn error_description(target: &str) -> String {
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "error_description")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| "Authentication was cancelled or failed.".to_string())
}

fn send_page(stream: &mut TcpStream, title: &str, message: &str) {
    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\"><title>{title}</title></head>\n\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 4rem;\">\n\
         <h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>",
        title = escape_html(title),
        message = escape_html(message),
    );
    send_response(stream, 200, "OK", "text/html; charset=utf-8", &html);
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn send_response(stream: &mut TcpStream, status: u16, reason: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );

    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
