//! Load Path - attach/load/unload/detach orchestration for one playback session
//!
//! Handles:
//! - Walking the state graph one step at a time
//! - Interrupting an in-flight walk when a newer request supersedes it
//! - Aborting manifest and DRM retries on unload, detach and destroy
//! - Reporting every state entered, then an idle notification
//!
//! # Architecture
//!
//! ```text
//!   caller                      LoadPathController                  walker task
//!  ────────                    ────────────────────               ─────────────
//!  load(req) ──> issue ticket (cancels superseded tickets) ──mpsc──> run command
//!                      │                                              │
//!                      │                                   next_step() per state
//!                      │                                              │
//!  await   <──────────────────── oneshot reply <──────────────── settled state
//!  subscribe() <──────────────── broadcast <──── StateChanged / Idle / Error
//!  state()     <──────────────── watch     <──── current state
//! ```
//!
//! Requests are issued synchronously: the ticket is taken and any superseded
//! walk is cancelled before the returned future is first polled. The walker
//! runs one command at a time, so callers never observe two walks at once.

mod routing;
mod walker;

pub use routing::{next_step, Detours, Goal, LoadPath};

use crate::{
    asset::{AssetDescriptor, LoadSource},
    config::LoadPathConfig,
    drm::DrmSettings,
    engine::{Collaborators, MediaElement},
    net::{RequestFilter, ResponseFilter},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walker::Walker;

// ============================================================================
// States and events
// ============================================================================

/// Where the load path currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPathState {
    Detach,
    Attach,
    MediaSource,
    ManifestParser,
    Manifest,
    DrmEngine,
    Load,
    Unload,
    SrcEquals,
}

impl LoadPathState {
    pub const ALL: [LoadPathState; 9] = [
        LoadPathState::Detach,
        LoadPathState::Attach,
        LoadPathState::MediaSource,
        LoadPathState::ManifestParser,
        LoadPathState::Manifest,
        LoadPathState::DrmEngine,
        LoadPathState::Load,
        LoadPathState::Unload,
        LoadPathState::SrcEquals,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LoadPathState::Detach => "detach",
            LoadPathState::Attach => "attach",
            LoadPathState::MediaSource => "media-source",
            LoadPathState::ManifestParser => "manifest-parser",
            LoadPathState::Manifest => "manifest",
            LoadPathState::DrmEngine => "drm-engine",
            LoadPathState::Load => "load",
            LoadPathState::Unload => "unload",
            LoadPathState::SrcEquals => "src-equals",
        }
    }

    /// States that hold load resources and must pass through `unload` to leave
    pub fn is_loaded(&self) -> bool {
        matches!(
            self,
            LoadPathState::ManifestParser
                | LoadPathState::Manifest
                | LoadPathState::DrmEngine
                | LoadPathState::Load
                | LoadPathState::SrcEquals
        )
    }

    /// Teardown states run to completion even when their walk is interrupted
    pub fn is_teardown(&self) -> bool {
        matches!(self, LoadPathState::Unload | LoadPathState::Detach)
    }
}

impl fmt::Display for LoadPathState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notifications published by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPathEvent {
    /// A state was entered
    StateChanged(LoadPathState),
    /// No request is pending; the walker has settled in this state
    Idle(LoadPathState),
    /// A walk failed; reported once per failed walk
    Error { code: &'static str, message: String },
}

// ============================================================================
// Load requests
// ============================================================================

/// What to load, and how
#[derive(Clone)]
pub struct LoadRequest {
    source: LoadSource,
    start_time: Option<f64>,
    mime_type: Option<String>,
    drm: DrmSettings,
    configuration: Value,
    request_filter: Option<RequestFilter>,
    response_filter: Option<ResponseFilter>,
}

impl LoadRequest {
    /// Load a manifest or media URI with no DRM and no filters
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            source: LoadSource::Manifest {
                uri: uri.into(),
                mime_type: None,
            },
            start_time: None,
            mime_type: None,
            drm: DrmSettings::default(),
            configuration: Value::Object(Default::default()),
            request_filter: None,
            response_filter: None,
        }
    }

    /// Load an asset: its resolved source, DRM settings, configuration and filters
    pub fn from_asset(asset: &AssetDescriptor) -> Result<Self> {
        asset.validate()?;
        Ok(Self {
            source: asset.load_source()?,
            start_time: None,
            mime_type: None,
            drm: asset.drm_settings(),
            configuration: asset.player_configuration(),
            request_filter: asset.request_filter().cloned(),
            response_filter: asset.response_filter().cloned(),
        })
    }

    pub fn with_start_time(mut self, seconds: f64) -> Self {
        self.start_time = Some(seconds);
        self
    }

    /// Override the MIME type used to pick a manifest parser
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Explicit MIME type, falling back to the one the source declares
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref().or_else(|| self.source.mime_type())
    }

    pub fn drm_settings(&self) -> &DrmSettings {
        &self.drm
    }

    pub fn configuration(&self) -> &Value {
        &self.configuration
    }

    pub fn request_filter(&self) -> Option<&RequestFilter> {
        self.request_filter.as_ref()
    }

    pub fn response_filter(&self) -> Option<&ResponseFilter> {
        self.response_filter.as_ref()
    }
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("source", &self.source)
            .field("start_time", &self.start_time)
            .field("mime_type", &self.mime_type)
            .field("drm", &self.drm)
            .field("request_filter", &self.request_filter.is_some())
            .field("response_filter", &self.response_filter.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Commands and tickets
// ============================================================================

pub(crate) enum Command {
    Attach {
        element: Arc<MediaElement>,
        initialize_media_source: bool,
    },
    Load(Box<LoadRequest>),
    Unload {
        initialize_media_source: bool,
    },
    Detach,
    Destroy,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Attach { .. } => "attach",
            Command::Load(_) => "load",
            Command::Unload { .. } => "unload",
            Command::Detach => "detach",
            Command::Destroy => "destroy",
        }
    }

    /// Issuing this command cancels every interruptible request still outstanding
    fn supersedes(&self) -> bool {
        !matches!(self, Command::Attach { .. })
    }

    fn is_interruptible(&self) -> bool {
        matches!(
            self,
            Command::Attach { .. } | Command::Load(_) | Command::Unload { .. }
        )
    }
}

pub(crate) struct Ticket {
    id: u64,
    token: CancellationToken,
}

/// Outstanding requests, oldest first
#[derive(Default)]
pub(crate) struct TicketBook {
    next_id: u64,
    outstanding: Vec<(u64, bool, CancellationToken)>,
}

impl TicketBook {
    fn issue(&mut self, supersedes: bool, interruptible: bool) -> Ticket {
        if supersedes {
            for (id, _, token) in self.outstanding.iter().filter(|(_, can, _)| *can) {
                if !token.is_cancelled() {
                    debug!(ticket = id, "Interrupting request");
                    token.cancel();
                }
            }
        }
        self.next_id += 1;
        let token = CancellationToken::new();
        self.outstanding
            .push((self.next_id, interruptible, token.clone()));
        Ticket {
            id: self.next_id,
            token,
        }
    }

    fn finish(&mut self, id: u64) {
        self.outstanding.retain(|(outstanding, _, _)| *outstanding != id);
    }
}

pub(crate) type Reply = oneshot::Sender<Result<LoadPathState>>;

pub(crate) struct Envelope {
    ticket: Ticket,
    command: Command,
    reply: Reply,
}

// ============================================================================
// Controller
// ============================================================================

/// Drives one playback session through the load graph.
///
/// Every operation is issued when called, not when awaited, and resolves to
/// the state its walk settled in. The walker task stops when the controller
/// is dropped or destroyed.
pub struct LoadPathController {
    config: LoadPathConfig,
    commands: mpsc::UnboundedSender<Envelope>,
    tickets: Arc<Mutex<TicketBook>>,
    destroyed: AtomicBool,
    state_rx: watch::Receiver<LoadPathState>,
    events: broadcast::Sender<LoadPathEvent>,
}

impl LoadPathController {
    /// Create a detached controller. Must be called within a Tokio runtime.
    pub fn new(collaborators: Collaborators, config: LoadPathConfig) -> Self {
        Self::spawn(collaborators, config, None)
    }

    /// Create a controller that implicitly attaches `element` on first load
    pub fn with_media_element(
        collaborators: Collaborators,
        config: LoadPathConfig,
        element: Arc<MediaElement>,
    ) -> Self {
        Self::spawn(collaborators, config, Some(element))
    }

    fn spawn(
        collaborators: Collaborators,
        config: LoadPathConfig,
        default_element: Option<Arc<MediaElement>>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LoadPathState::Detach);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let tickets = Arc::new(Mutex::new(TicketBook::default()));

        let walker = Walker::new(
            collaborators,
            config.clone(),
            default_element,
            state_tx,
            events.clone(),
            tickets.clone(),
        );
        tokio::spawn(walker.run(command_rx));

        info!(
            initialize_media_source = config.initialize_media_source,
            "Load path controller created"
        );

        Self {
            config,
            commands,
            tickets,
            destroyed: AtomicBool::new(false),
            state_rx,
            events,
        }
    }

    /// Current state
    pub fn state(&self) -> LoadPathState {
        *self.state_rx.borrow()
    }

    /// Watch the current state
    pub fn watch_state(&self) -> watch::Receiver<LoadPathState> {
        self.state_rx.clone()
    }

    /// Subscribe to state changes, idle notifications and errors
    pub fn subscribe(&self) -> broadcast::Receiver<LoadPathEvent> {
        self.events.subscribe()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &LoadPathConfig {
        &self.config
    }

    /// Attach to a media element, initializing a media source per configuration
    pub fn attach(
        &self,
        element: Arc<MediaElement>,
    ) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        self.attach_with(element, self.config.initialize_media_source)
    }

    /// Attach to a media element. The media source is only initialized when
    /// requested and supported by the platform.
    pub fn attach_with(
        &self,
        element: Arc<MediaElement>,
        initialize_media_source: bool,
    ) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        self.submit(Command::Attach {
            element,
            initialize_media_source,
        })
    }

    /// Load content, attaching the default element first if needed
    pub fn load(
        &self,
        request: LoadRequest,
    ) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        self.submit(Command::Load(Box::new(request)))
    }

    /// Tear the current load down and return to `attach`
    pub fn unload(&self) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        self.unload_with(self.config.initialize_media_source)
    }

    pub fn unload_with(
        &self,
        initialize_media_source: bool,
    ) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        self.submit(Command::Unload {
            initialize_media_source,
        })
    }

    /// Unload if needed, then release the media element
    pub fn detach(&self) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        self.submit(Command::Detach)
    }

    /// Detach and refuse every later request
    pub fn destroy(&self) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        let already_destroyed = self.destroyed.swap(true, Ordering::SeqCst);
        let dispatched = if already_destroyed {
            None
        } else {
            Some(self.dispatch(Command::Destroy))
        };
        async move {
            match dispatched {
                Some(receiver) => settle(receiver).await,
                None => Ok(LoadPathState::Detach),
            }
        }
    }

    fn submit(
        &self,
        command: Command,
    ) -> impl Future<Output = Result<LoadPathState>> + Send + 'static {
        let dispatched = if self.is_destroyed() {
            Err(Error::Destroyed)
        } else {
            Ok(self.dispatch(command))
        };
        async move { settle(dispatched?).await }
    }

    fn dispatch(&self, command: Command) -> Result<oneshot::Receiver<Result<LoadPathState>>> {
        let ticket = self
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issue(command.supersedes(), command.is_interruptible());

        info!(request = command.name(), ticket = ticket.id, "Request issued");

        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Envelope {
                ticket,
                command,
                reply,
            })
            .map_err(|_| Error::Internal("load path task has stopped".into()))?;
        Ok(receiver)
    }
}

async fn settle(
    receiver: Result<oneshot::Receiver<Result<LoadPathState>>>,
) -> Result<LoadPathState> {
    receiver?
        .await
        .map_err(|_| Error::Internal("load path task dropped the request".into()))?
}

impl fmt::Debug for LoadPathController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPathController")
            .field("state", &self.state())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
