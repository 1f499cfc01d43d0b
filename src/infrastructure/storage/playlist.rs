use std::fmt::Write;

use super::artifacts::MANIFEST_EXT;
use crate::modules::content::model::RenditionSet;

/// Renders the master playlist: one stream entry per rendition, ascending
/// by height, each pointing at `<label>/index.m3u8` relative to the master.
pub fn render_master(renditions: &RenditionSet) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for rendition in renditions.iter() {
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            rendition.bandwidth,
            rendition.resolution()
        );
        let _ = writeln!(out, "{}/index.{MANIFEST_EXT}", rendition.label);
    }
    out
}

/// Rendition playlist paths referenced by a master playlist, in order.
pub fn variant_uris(master: &str) -> Vec<&str> {
    master
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
