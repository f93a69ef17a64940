//! HLS master playlist -> quality menu entries

use crate::{
    error::Error,
    types::{QualityLevel, Resolution},
    Result,
};
use m3u8_rs::{MasterPlaylist, Playlist};
use tracing::debug;
use url::Url;

/// Parse a playlist into selectable quality levels, highest first.
///
/// A media playlist has a single rendition and yields no levels; the menu
/// then only offers "Auto".
pub fn parse_quality_ladder(content: &[u8], base_url: &Url) -> Result<Vec<QualityLevel>> {
    let playlist = m3u8_rs::parse_playlist_res(content)
        .map_err(|e| Error::InvalidResponseShape(format!("Failed to parse HLS playlist: {:?}", e)))?;

    match playlist {
        Playlist::MasterPlaylist(master) => extract_levels(&master, base_url),
        Playlist::MediaPlaylist(_) => {
            debug!(url = %base_url, "Media playlist has no variants");
            Ok(Vec::new())
        }
    }
}

fn extract_levels(master: &MasterPlaylist, base_url: &Url) -> Result<Vec<QualityLevel>> {
    let mut levels: Vec<QualityLevel> = Vec::new();

    for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
        let uri = base_url
            .join(&variant.uri)
            .map_err(|e| Error::InvalidResponseShape(format!("Invalid URI '{}': {}", variant.uri, e)))?;

        let resolution = variant.resolution.map(|r| Resolution {
            width: r.width as u32,
            height: r.height as u32,
        });

        let label = match resolution {
            Some(r) => r.quality_name().to_string(),
            None => format!("{} kbps", variant.bandwidth / 1000),
        };

        // Same tier twice (e.g. two audio groups): keep the richer variant
        if let Some(existing) = levels.iter_mut().find(|l| l.label == label) {
            if variant.bandwidth > existing.bandwidth {
                existing.bandwidth = variant.bandwidth;
                existing.uri = uri;
                existing.resolution = resolution;
            }
            continue;
        }

        levels.push(QualityLevel {
            label,
            resolution,
            bandwidth: variant.bandwidth,
            uri,
        });
    }

    levels.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
    Ok(levels)
}
