//! Minimal segmentation endpoint for driving the real HTTP client.

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine};
use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum Behavior {
    AlwaysSucceed,
    FailFirst(usize),
    AlwaysStatus(u16),
    FailFiles(Vec<String>),
    /// 200 with a body that is not the expected JSON.
    Garbage,
}

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub file_name: Option<String>,
    pub part_content_type: Option<String>,
    pub expires_header: bool,
}

pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let requests = Arc::clone(&requests);
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let behavior = behavior.clone();
                    let requests = Arc::clone(&requests);
                    let recorded = Arc::clone(&recorded);
                    tokio::spawn(async move {
                        let _ = serve(stream, &behavior, &requests, &recorded).await;
                    });
                }
            })
        };

        Self {
            addr,
            requests,
            recorded,
            handle,
        }
    }

    pub fn url(&self) -> reqwest::Url {
        reqwest::Url::parse(&format!("http://{}/u2net", self.addr)).unwrap()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    behavior: &Behavior,
    requests: &AtomicUsize,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let (head, body) = read_request(&mut stream).await?;
    let previous = requests.fetch_add(1, Ordering::SeqCst);

    let part_headers = find(&body, b"\r\n\r\n")
        .map(|end| String::from_utf8_lossy(&body[..end]).into_owned())
        .unwrap_or_default();
    let file_name = between(&part_headers, "filename=\"", "\"");
    let part_content_type = part_headers
        .lines()
        .find_map(|line| strip_header(line, "content-type"));
    let expires_header = part_headers
        .lines()
        .any(|line| strip_header(line, "expires").as_deref() == Some("0"));

    recorded.lock().unwrap().push(RecordedRequest {
        method: head.split_whitespace().next().unwrap_or_default().to_string(),
        file_name: file_name.clone(),
        part_content_type,
        expires_header,
    });

    let fail = match behavior {
        Behavior::AlwaysSucceed | Behavior::Garbage => None,
        Behavior::FailFirst(n) => (previous < *n).then_some(500),
        Behavior::AlwaysStatus(status) => Some(*status),
        Behavior::FailFiles(names) => file_name
            .as_ref()
            .filter(|name| names.contains(*name))
            .map(|_| 500),
    };

    let response = match (fail, behavior) {
        (Some(status), _) => format!(
            "HTTP/1.1 {status} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        ),
        (None, Behavior::Garbage) => json_response("{\"unexpected\": true}"),
        (None, _) => json_response(&matte_for(&body)),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn json_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// A mask matching the uploaded JPEG's size, wrapped the way the service wraps it.
fn matte_for(multipart_body: &[u8]) -> String {
    let start = find(multipart_body, b"\r\n\r\n").map_or(0, |i| i + 4);
    let end = rfind(multipart_body, b"\r\n--").unwrap_or(multipart_body.len());
    let upload = image::load_from_memory(&multipart_body[start..end]).unwrap();

    let mask = GrayImage::from_pixel(upload.width(), upload.height(), Luma([255]));
    let mut png = Vec::new();
    mask.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();

    serde_json::json!({ "matte": general_purpose::STANDARD.encode(png) }).to_string()
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(i) = find(&buf, b"\r\n\r\n") {
            break i;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut rest = buf[header_end + 4..].to_vec();

    let content_length = head
        .lines()
        .find_map(|line| strip_header(line, "content-length"))
        .and_then(|v| v.parse::<usize>().ok());
    let chunked = head
        .lines()
        .any(|line| strip_header(line, "transfer-encoding").is_some_and(|v| v.contains("chunked")));

    if let Some(len) = content_length {
        while rest.len() < len {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            rest.extend_from_slice(&chunk[..n]);
        }
        rest.truncate(len);
        return Ok((head, rest));
    }

    if chunked {
        while find(&rest, b"\r\n0\r\n\r\n").is_none() && !rest.starts_with(b"0\r\n\r\n") {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            rest.extend_from_slice(&chunk[..n]);
        }
        return Ok((head, dechunk(&rest)));
    }

    Ok((head, rest))
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    while let Some(line_end) = find(data, b"\r\n") {
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size = usize::from_str_radix(size_line.split(';').next().unwrap_or("0").trim(), 16)
            .unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        let end = (start + size).min(data.len());
        body.extend_from_slice(&data[start..end]);
        data = &data[(end + 2).min(data.len())..];
    }
    body
}

fn strip_header(line: &str, name: &str) -> Option<String> {
    let (key, value) = line.split_once(':')?;
    key.trim()
        .eq_ignore_ascii_case(name)
        .then(|| value.trim().to_string())
}

fn between(haystack: &str, start: &str, end: &str) -> Option<String> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(haystack[from..from + len].to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Writes `names` as small RGB images into `dir`.
pub fn write_inputs(dir: &Path, names: &[&str], size: (u32, u32)) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        image::RgbImage::from_fn(size.0, size.1, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
        .save(dir.join(name))
        .unwrap();
    }
}

pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
