//! Routing through the load graph
//!
//! ```text
//! detach ──> attach ──> media-source ──> manifest-parser ──> manifest ──> drm-engine ──> load
//!              │  ▲
//!              │  └──── unload <── any loaded state
//!              └──> src-equals
//! ```
//!
//! Given where the walker is and where it has been asked to go, pick the
//! single next state. Routing is pure; the walker owns all effects.

use super::LoadPathState;

/// Which branch a load takes, decided once when the load is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// Media pipeline plus manifest parsing and DRM
    MediaSource,
    /// Assign the URI straight to the media element
    SrcEquals,
}

/// Destination of a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Detach,
    Attach { initialize_media_source: bool },
    Load { path: LoadPath },
}

/// Detours a walk must take before heading for its goal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Detours {
    /// Tear the current load down first, even if it matches the goal
    pub unload: bool,
    /// Release the current media element first
    pub detach: bool,
}

/// Next state to enter, or `None` once the goal is reached
pub fn next_step(at: LoadPathState, goal: Goal, detours: Detours) -> Option<LoadPathState> {
    use LoadPathState::*;

    if detours.detach && at != Detach {
        return Some(toward_detach(at));
    }
    if detours.unload && at.is_loaded() {
        return Some(Unload);
    }

    match goal {
        Goal::Detach => (at != Detach).then(|| toward_detach(at)),
        Goal::Attach {
            initialize_media_source,
        } => match at {
            Detach | Unload => Some(Attach),
            Attach if initialize_media_source => Some(MediaSource),
            Attach | MediaSource => None,
            _ => Some(Unload),
        },
        Goal::Load {
            path: LoadPath::MediaSource,
        } => match at {
            Detach | Unload => Some(Attach),
            Attach => Some(MediaSource),
            MediaSource => Some(ManifestParser),
            ManifestParser => Some(Manifest),
            Manifest => Some(DrmEngine),
            DrmEngine => Some(Load),
            Load => None,
            SrcEquals => Some(Unload),
        },
        Goal::Load {
            path: LoadPath::SrcEquals,
        } => match at {
            Detach | Unload => Some(Attach),
            Attach => Some(SrcEquals),
            SrcEquals => None,
            _ => Some(Unload),
        },
    }
}

fn toward_detach(at: LoadPathState) -> LoadPathState {
    use LoadPathState::*;
    match at {
        Attach | MediaSource | Detach => Detach,
        Unload => Attach,
        _ => Unload,
    }
}
