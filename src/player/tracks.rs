//! Track listing and selection rules

use crate::player::engine::{TextTrack, VariantTrack};
use crate::protocol::{TextTrackInfo, TrackInfo};
use std::collections::BTreeMap;

/// Role of the primary audio rendition
pub const MAIN_ROLE: &str = "main";

/// Collapse variants into one user-facing entry per resolution
///
/// Representatives prefer codecs outside `excluded_codec`; entries are
/// sorted by ascending height and the active flag follows the height of
/// whichever variant the engine is actually playing.
pub fn list_variant_tracks(tracks: &[VariantTrack], excluded_codec: &str) -> Vec<TrackInfo> {
    let mut by_height: BTreeMap<u32, &VariantTrack> = BTreeMap::new();
    for track in tracks {
        by_height
            .entry(track.height)
            .and_modify(|current| {
                if current.codec_family_is(excluded_codec) && !track.codec_family_is(excluded_codec) {
                    *current = track;
                }
            })
            .or_insert(track);
    }

    let active_height = tracks.iter().find(|t| t.active).map(|t| t.height);

    by_height
        .into_values()
        .map(|track| TrackInfo {
            id: track.id,
            height: track.height,
            width: track.width,
            bandwidth: track.bandwidth,
            label: format!("{}p", track.height),
            active: Some(track.height) == active_height,
        })
        .collect()
}

/// Language tags match exactly or on their primary subtag
pub fn language_matches(track_language: &str, wanted: &str) -> bool {
    if wanted.is_empty() {
        return false;
    }
    if track_language.eq_ignore_ascii_case(wanted) {
        return true;
    }
    let primary = |tag: &str| tag.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase();
    primary(track_language) == primary(wanted)
}

/// Pick the variant for an explicit height choice
///
/// Height matches exactly and the excluded codec family never qualifies.
/// A requested language narrows the set; if nothing matches, the main
/// audio role is tried, then the height-only set.
pub fn pick_variant<'a>(
    tracks: &'a [VariantTrack],
    height: u32,
    language: Option<&str>,
    excluded_codec: &str,
) -> Option<&'a VariantTrack> {
    let candidates: Vec<&VariantTrack> = tracks
        .iter()
        .filter(|t| t.height == height && !t.codec_family_is(excluded_codec))
        .collect();

    if let Some(language) = language {
        if let Some(track) = candidates.iter().find(|t| language_matches(&t.language, language)) {
            return Some(track);
        }
        if let Some(track) = candidates.iter().find(|t| t.has_role(MAIN_ROLE)) {
            return Some(track);
        }
    }

    candidates.first().copied()
}

pub fn list_text_tracks(tracks: &[TextTrack]) -> Vec<TextTrackInfo> {
    tracks
        .iter()
        .map(|track| TextTrackInfo {
            id: track.id,
            language: track.language.clone(),
            label: track.label.clone(),
            kind: track.kind.clone(),
            active: track.active,
        })
        .collect()
}

pub fn pick_text_track<'a>(tracks: &'a [TextTrack], language: &str) -> Option<&'a TextTrack> {
    tracks
        .iter()
        .find(|t| t.language.eq_ignore_ascii_case(language))
        .or_else(|| tracks.iter().find(|t| language_matches(&t.language, language)))
}
