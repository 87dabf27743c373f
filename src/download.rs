use std::io::{self, Write};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::api_client::ApiClient;
use crate::error::Result;

/// Strips the static-serving prefixes the backend prepends to a video
/// location. The download endpoint expects a bare path under `static/`.
pub fn clean_video_path(location: &str) -> String {
    let path = location.trim();
    let path = path.strip_prefix("/api/static/").unwrap_or(path);
    let path = path.strip_prefix("/static/").unwrap_or(path);
    let path = path.strip_prefix("static/").unwrap_or(path);
    path.to_string()
}

/// Downloads the rendered video to `output_dir`, streaming to a temporary
/// file that is renamed into place once complete.
pub async fn download_video(
    api: &ApiClient,
    video_location: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    let video_path = clean_video_path(video_location);
    let file_name = video_path.rsplit('/').next().unwrap_or("video.mp4");
    let output_path = output_dir.join(file_name);
    let temp_path = output_path.with_extension("downloading");

    if let Some(parent) = output_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let url = api.build_url(&format!(
        "/download_video?video_path={}",
        urlencoding::encode(&video_path)
    ));
    let response = api.client().get(&url).send().await?.error_for_status()?;

    let total_size = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(&temp_path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        file.write_all(&chunk).await?;

        downloaded += chunk.len() as u64;
        if total_size > 0 {
            let progress = (downloaded as f64 / total_size as f64) * 100.0;
            print!(
                "\rDownloading... {:.1}% ({}/{} bytes)",
                progress, downloaded, total_size
            );
            io::stdout().flush()?;
        }
    }
    if total_size > 0 {
        println!(
            "\rDownload complete: {}/{} bytes (100%)    ",
            downloaded, total_size
        );
    } else {
        println!("\rDownload complete: {} bytes", downloaded);
    }

    drop(file);
    tokio::fs::rename(&temp_path, &output_path).await?;
    info!(path = %output_path.display(), "video saved");
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_static_serving_prefixes() {
        assert_eq!(clean_video_path("/api/static/lecture.mp4"), "lecture.mp4");
        assert_eq!(clean_video_path("/static/lecture.mp4"), "lecture.mp4");
        assert_eq!(clean_video_path("static/lecture.mp4"), "lecture.mp4");
        assert_eq!(clean_video_path("lecture.mp4"), "lecture.mp4");
        assert_eq!(
            clean_video_path("  /api/static/out/run42.mp4  "),
            "out/run42.mp4"
        );
    }
}
