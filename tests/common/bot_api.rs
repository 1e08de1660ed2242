//! Mock Bot API server serving one sticker set

use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use stickerpack_dl::Config;
use stickerpack_dl::config::{DownloadConfig, PackagingConfig, ProviderConfig, RetryConfig};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Bot token used by every mock route
pub const TOKEN: &str = "123456:TEST";

/// A still sticker: solid colour, distinct per index
pub fn png_sticker(index: usize, width: u32, height: u32) -> Vec<u8> {
    let shade = (index * 7 % 256) as u8;
    let mut out = Cursor::new(Vec::new());
    RgbaImage::from_pixel(width, height, Rgba([shade, 255 - shade, 128, 255]))
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Pipeline configuration pointed at the mock server
pub fn test_config(server: &MockServer, base_dir: &Path) -> Config {
    Config {
        provider: ProviderConfig {
            api_base: server.uri(),
            bot_token: TOKEN.to_string(),
            ..Default::default()
        },
        retry: RetryConfig {
            initial_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        },
        download: DownloadConfig {
            base_dir: base_dir.to_path_buf(),
            ..Default::default()
        },
        packaging: PackagingConfig {
            send_delay: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Serve `getStickerSet` for `name` with one still sticker per file, plus
/// `getFile` and the file downloads
///
/// Sticker `i` has file id `f<i>` and lives at `stickers/f<i>.webp`.
pub async fn mount_still_pack(server: &MockServer, name: &str, files: Vec<Vec<u8>>) {
    let stickers: Vec<_> = (0..files.len())
        .map(|i| {
            json!({
                "file_id": format!("f{}", i),
                "file_unique_id": format!("u{}", i),
                "width": 512,
                "height": 512,
                "is_animated": false,
                "is_video": false
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("/bot{}/getStickerSet", TOKEN)))
        .and(query_param("name", name))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "name": name, "title": name, "stickers": stickers }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/bot{}/getFile", TOKEN)))
        .respond_with(|request: &Request| {
            let file_id = request
                .url
                .query_pairs()
                .find(|(key, _)| key == "file_id")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {
                    "file_id": file_id,
                    "file_path": format!("stickers/{}.webp", file_id)
                }
            }))
        })
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/file/bot[^/]+/stickers/f\d+\.webp$"))
        .respond_with(move |request: &Request| {
            let index = request
                .url
                .path()
                .rsplit('/')
                .next()
                .and_then(|name| name.strip_prefix('f'))
                .and_then(|name| name.strip_suffix(".webp"))
                .and_then(|n| n.parse::<usize>().ok());
            match index.and_then(|i| files.get(i)) {
                Some(bytes) => ResponseTemplate::new(200).set_body_bytes(bytes.clone()),
                None => ResponseTemplate::new(404),
            }
        })
        .mount(server)
        .await;
}

/// Serve `getStickerSet` for `name` as rejected by the API
pub async fn mount_invalid_pack(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/bot{}/getStickerSet", TOKEN)))
        .and(query_param("name", name))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: STICKERSET_INVALID"
        })))
        .mount(server)
        .await;
}
