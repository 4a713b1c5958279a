//! データセットの取得
//!
//! 固定URLからZIPアーカイブをダウンロードし、展開後にアーカイブを削除します。
//! 失敗時の再試行は行いません。

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DatasetError;

/// URLからアーカイブをダウンロードする
///
/// 2xx以外のレスポンスはエラーになります。戻り値は書き込んだバイト数です。
pub fn download_archive(url: &str, archive_path: &Path) -> Result<u64> {
    log::info!("ダウンロード開始: {}", url);

    let mut response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to request {}", url))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DatasetError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    if let Some(parent) = archive_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let file = File::create(archive_path)
        .with_context(|| format!("Failed to create {}", archive_path.display()))?;
    let mut writer = BufWriter::new(file);
    let bytes = response
        .copy_to(&mut writer)
        .with_context(|| format!("Failed to download {}", url))?;
    writer.flush()?;

    log::info!(
        "ダウンロード完了: {} ({:.2} MB)",
        archive_path.display(),
        bytes as f64 / 1024.0 / 1024.0
    );
    Ok(bytes)
}

/// ZIPアーカイブを展開する
///
/// 展開先の外へ出るエントリはzipクレート側で拒否されます。
pub fn extract_archive(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Invalid zip archive: {}", archive_path.display()))?;

    std::fs::create_dir_all(extract_dir)
        .with_context(|| format!("Failed to create directory {}", extract_dir.display()))?;
    archive
        .extract(extract_dir)
        .with_context(|| format!("Failed to extract {}", archive_path.display()))?;

    log::info!(
        "{} エントリを展開しました: {}",
        archive.len(),
        extract_dir.display()
    );
    Ok(())
}

/// ダウンロード・展開・アーカイブ削除をまとめて行う
///
/// 展開先ディレクトリを返します。途中で失敗した場合、部分的な生成物は残ります。
pub fn fetch_dataset(url: &str, archive_path: &Path, extract_dir: &Path) -> Result<PathBuf> {
    download_archive(url, archive_path)?;
    extract_archive(archive_path, extract_dir)?;
    std::fs::remove_file(archive_path)
        .with_context(|| format!("Failed to remove {}", archive_path.display()))?;
    Ok(extract_dir.to_path_buf())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::Path;

    /// `dataset/<label>/<file>` 構成のZIPをメモリ上に作成
    pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for (name, bytes) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(bytes).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(12, 12, image::Rgb(color));
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// 1リクエストだけ応答するHTTPサーバを起動してURLを返す
    pub fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                let header = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status_line,
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{}/dataset.zip", addr)
    }

    pub fn write_file(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_fetch_extracts_and_removes_archive() {
        let png = png_bytes([255, 0, 0]);
        let zip = build_zip(&[
            ("dataset/none/0.png", png.as_slice()),
            ("dataset/fist/0.png", png.as_slice()),
        ]);
        let url = serve_once("200 OK", zip);

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("hand_gesture_recognition_dataset.zip");
        let out = fetch_dataset(&url, &archive, dir.path()).unwrap();

        assert_eq!(out, dir.path());
        assert!(!archive.exists());
        assert!(dir.path().join("dataset/none/0.png").is_file());
        assert!(dir.path().join("dataset/fist/0.png").is_file());
    }

    #[test]
    fn test_missing_resource_is_error() {
        let url = serve_once("404 Not Found", b"missing".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");

        let err = fetch_dataset(&url, &archive, dir.path()).unwrap_err();
        match err.downcast_ref::<DatasetError>() {
            Some(DatasetError::HttpStatus { status, .. }) => assert_eq!(*status, 404),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!archive.exists());
    }

    #[test]
    fn test_corrupt_archive_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        write_file(&archive, b"this is not a zip file");

        assert!(extract_archive(&archive, &dir.path().join("out")).is_err());
    }
}
