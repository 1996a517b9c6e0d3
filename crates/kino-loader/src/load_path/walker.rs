//! Walker task - owns the media element, the active load and every collaborator call

use super::{
    routing::{next_step, Detours, Goal, LoadPath},
    Command, Envelope, LoadPathEvent, LoadPathState, LoadRequest, TicketBook,
};
use crate::{
    asset::LoadSource,
    config::LoadPathConfig,
    engine::{AdResolver, Collaborators, Manifest, ManifestParser, MediaElement},
    net::NetworkSession,
    retry::with_retry,
    Error, Result,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Everything one load owns between `manifest-parser`/`src-equals` and `unload`
struct ActiveLoad {
    request: LoadRequest,
    network: NetworkSession,
    uri: Option<String>,
    parser: Option<Arc<dyn ManifestParser>>,
    manifest: Option<Manifest>,
}

impl ActiveLoad {
    fn new(request: LoadRequest, network: NetworkSession) -> Self {
        Self {
            request,
            network,
            uri: None,
            parser: None,
            manifest: None,
        }
    }
}

pub(super) struct Walker {
    collaborators: Collaborators,
    config: LoadPathConfig,
    state: LoadPathState,
    detours: Detours,
    /// Attached element
    element: Option<Arc<MediaElement>>,
    /// Element to take on the next `attach` step
    pending_element: Option<Arc<MediaElement>>,
    /// Element used when loading while detached
    default_element: Option<Arc<MediaElement>>,
    /// A media source was (or is being) set up and needs clearing
    pipeline_ready: bool,
    /// Load issued but not yet past `manifest-parser`/`src-equals`
    loading: Option<ActiveLoad>,
    active: Option<ActiveLoad>,
    /// States entered so far, used to detect walks that visited nothing
    entered: u64,
    state_tx: watch::Sender<LoadPathState>,
    events: broadcast::Sender<LoadPathEvent>,
    tickets: Arc<Mutex<TicketBook>>,
}

impl Walker {
    pub(super) fn new(
        collaborators: Collaborators,
        config: LoadPathConfig,
        default_element: Option<Arc<MediaElement>>,
        state_tx: watch::Sender<LoadPathState>,
        events: broadcast::Sender<LoadPathEvent>,
        tickets: Arc<Mutex<TicketBook>>,
    ) -> Self {
        Self {
            collaborators,
            config,
            state: LoadPathState::Detach,
            detours: Detours::default(),
            element: None,
            pending_element: None,
            default_element,
            pipeline_ready: false,
            loading: None,
            active: None,
            entered: 0,
            state_tx,
            events,
            tickets,
        }
    }

    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Envelope>) {
        let mut pending: Option<Envelope> = None;

        loop {
            let envelope = match pending.take() {
                Some(envelope) => envelope,
                None => match commands.recv().await {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let Envelope {
                ticket,
                command,
                reply,
            } = envelope;
            let destroying = matches!(command, Command::Destroy);

            let result = if ticket.token.is_cancelled() {
                debug!(ticket = ticket.id, "Request superseded before it started");
                // The element still applies to whichever walk comes next
                if let Command::Attach { element, .. } = command {
                    self.adopt_element(element);
                }
                Err(Error::LoadInterrupted)
            } else {
                self.execute(command, &ticket.token).await
            };

            self.tickets
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finish(ticket.id);

            if destroying {
                commands.close();
                while let Ok(stale) = commands.try_recv() {
                    let _ = stale.reply.send(Err(Error::Destroyed));
                }
                self.emit(LoadPathEvent::Idle(self.state));
                let _ = reply.send(result);
                info!("Load path destroyed");
                break;
            }

            match commands.try_recv() {
                Ok(next) => pending = Some(next),
                Err(_) => {
                    debug!(state = %self.state, "Idle");
                    self.emit(LoadPathEvent::Idle(self.state));
                }
            }
            let _ = reply.send(result);
        }
    }

    async fn execute(
        &mut self,
        command: Command,
        token: &CancellationToken,
    ) -> Result<LoadPathState> {
        match command {
            Command::Attach {
                element,
                initialize_media_source,
            } => self.attach(element, initialize_media_source, token).await,
            Command::Load(request) => self.load(*request, token).await,
            Command::Unload {
                initialize_media_source,
            } => self.unload(initialize_media_source, token).await,
            Command::Detach => {
                let result = self.walk(Goal::Detach, token).await;
                self.pending_element = None;
                result
            }
            Command::Destroy => {
                let result = self.walk(Goal::Detach, token).await;
                self.default_element = None;
                self.pending_element = None;
                result
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    #[instrument(skip(self, element, token), fields(element = element.label()))]
    async fn attach(
        &mut self,
        element: Arc<MediaElement>,
        initialize_media_source: bool,
        token: &CancellationToken,
    ) -> Result<LoadPathState> {
        if self.adopt_element(element) && self.state.is_loaded() {
            debug!(state = %self.state, "Already attached and loaded");
            return Ok(self.state);
        }

        let initialize_media_source =
            initialize_media_source && self.collaborators.media_pipeline.is_supported();
        self.walk(
            Goal::Attach {
                initialize_media_source,
            },
            token,
        )
        .await
    }

    /// Queue `element` for the next attach step. Returns true when it is already attached.
    fn adopt_element(&mut self, element: Arc<MediaElement>) -> bool {
        let same = self
            .element
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &element));
        if !same {
            if self.element.is_some() {
                self.detours.detach = true;
            }
            self.pending_element = Some(element);
        }
        same
    }

    #[instrument(skip(self, request, token), fields(source = ?request.source()))]
    async fn load(
        &mut self,
        request: LoadRequest,
        token: &CancellationToken,
    ) -> Result<LoadPathState> {
        let has_element = self.element.is_some()
            || self.pending_element.is_some()
            || self.default_element.is_some();
        if !has_element {
            return Err(Error::NotAttached);
        }

        let path = self.choose_path(&request);
        info!(?path, from = %self.state, "Loading");

        if self.state.is_loaded() || self.state == LoadPathState::Unload {
            self.detours.unload = true;
        }

        let network = self.network_session(&request);
        self.loading = Some(ActiveLoad::new(request, network));
        let result = self.walk(Goal::Load { path }, token).await;
        self.loading = None;
        result
    }

    async fn unload(
        &mut self,
        initialize_media_source: bool,
        token: &CancellationToken,
    ) -> Result<LoadPathState> {
        if self.state == LoadPathState::Detach {
            self.confirm_state();
            return Ok(self.state);
        }

        if self.state.is_loaded() || self.state == LoadPathState::Unload {
            self.detours.unload = true;
        }

        let initialize_media_source =
            initialize_media_source && self.collaborators.media_pipeline.is_supported();
        let entered_before = self.entered;
        let result = self
            .walk(
                Goal::Attach {
                    initialize_media_source,
                },
                token,
            )
            .await;

        if result.is_ok() && self.entered == entered_before {
            self.confirm_state();
        }
        result
    }

    /// Decided once per load: the manifest path needs a media pipeline and
    /// either an ad-resolved stream or a parser for the URI
    fn choose_path(&self, request: &LoadRequest) -> LoadPath {
        if !self.collaborators.media_pipeline.is_supported() {
            return LoadPath::SrcEquals;
        }
        let source = request.source();
        if source.needs_ad_resolution() {
            return LoadPath::MediaSource;
        }
        let uri = source.direct_uri().unwrap_or_default();
        if self.collaborators.parsers.can_parse(uri, request.mime_type()) {
            LoadPath::MediaSource
        } else {
            LoadPath::SrcEquals
        }
    }

    /// A fresh session, with its own filter context, for every load
    fn network_session(&self, request: &LoadRequest) -> NetworkSession {
        let mut session = NetworkSession::new(self.collaborators.networking.clone());
        if let Some(filter) = request.request_filter() {
            session = session.with_request_filter(filter.clone());
        }
        if let Some(filter) = request.response_filter() {
            session = session.with_response_filter(filter.clone());
        }
        session
    }

    // ========================================================================
    // Walking
    // ========================================================================

    async fn walk(&mut self, goal: Goal, token: &CancellationToken) -> Result<LoadPathState> {
        match self.walk_to(goal, token).await {
            Ok(()) => {
                info!(state = %self.state, "Walk complete");
                Ok(self.state)
            }
            Err(err) if err.is_interruption() => {
                warn!(state = %self.state, "Walk interrupted");
                Err(err)
            }
            Err(err) => {
                warn!(state = %self.state, error = %err, "Walk failed");
                self.emit(LoadPathEvent::Error {
                    code: err.error_code(),
                    message: err.to_string(),
                });
                if self.state.is_loaded() {
                    self.recover().await;
                }
                Err(err)
            }
        }
    }

    /// Release whatever a failed load left behind and settle in `attach`
    async fn recover(&mut self) {
        self.detours.unload = true;
        let goal = Goal::Attach {
            initialize_media_source: false,
        };
        if let Err(err) = self.walk_to(goal, &CancellationToken::new()).await {
            warn!(state = %self.state, error = %err, "Recovery walk failed");
        }
    }

    async fn walk_to(&mut self, goal: Goal, token: &CancellationToken) -> Result<()> {
        while let Some(next) = next_step(self.state, goal, self.detours) {
            if token.is_cancelled() {
                return Err(Error::LoadInterrupted);
            }

            let previous = self.state;
            self.enter(next);

            let outcome = if next.is_teardown() {
                self.run_step(next).await
            } else {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::LoadInterrupted),
                    result = self.run_step(next) => result,
                }
            };

            if let Err(err) = outcome {
                if matches!(next, LoadPathState::Attach | LoadPathState::MediaSource) {
                    if next == LoadPathState::MediaSource {
                        self.abandon_media_source().await;
                    }
                    debug!(from = %next, to = %previous, "Step abandoned, reverting");
                    self.state = previous;
                    self.state_tx.send_replace(previous);
                    self.emit(LoadPathEvent::StateChanged(previous));
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn enter(&mut self, state: LoadPathState) {
        debug!(from = %self.state, to = %state, "Entering state");
        self.state = state;
        self.entered += 1;
        match state {
            LoadPathState::Unload => self.detours.unload = false,
            LoadPathState::Detach => self.detours.detach = false,
            _ => {}
        }
        self.state_tx.send_replace(state);
        self.emit(LoadPathEvent::StateChanged(state));
    }

    /// Report the current state again without moving
    fn confirm_state(&self) {
        debug!(state = %self.state, "Confirming state");
        self.emit(LoadPathEvent::StateChanged(self.state));
    }

    fn emit(&self, event: LoadPathEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn run_step(&mut self, state: LoadPathState) -> Result<()> {
        match state {
            LoadPathState::Detach => {
                self.release_element().await;
                Ok(())
            }
            LoadPathState::Attach => self.take_element(),
            LoadPathState::MediaSource => self.initialize_media_source().await,
            LoadPathState::ManifestParser => self.select_parser().await,
            LoadPathState::Manifest => self.fetch_manifest().await,
            LoadPathState::DrmEngine => self.init_drm().await,
            LoadPathState::Load => self.start_pipeline().await,
            LoadPathState::SrcEquals => self.assign_src().await,
            LoadPathState::Unload => {
                self.teardown().await;
                Ok(())
            }
        }
    }

    fn take_element(&mut self) -> Result<()> {
        // On the way to a detach the old element stays until released
        if !self.detours.detach {
            if let Some(element) = self.pending_element.take() {
                self.element = Some(element);
            }
        }
        if self.element.is_none() {
            self.element = self.default_element.clone();
        }
        match &self.element {
            Some(element) => {
                debug!(element = element.label(), "Element attached");
                Ok(())
            }
            None => Err(Error::NotAttached),
        }
    }

    async fn initialize_media_source(&mut self) -> Result<()> {
        let element = self.element.clone().ok_or(Error::NotAttached)?;
        self.pipeline_ready = true;
        let src = self.collaborators.media_pipeline.initialize(&element).await?;
        element.assign_src(Some(src));
        Ok(())
    }

    /// Undo a media pipeline that never finished initializing
    async fn abandon_media_source(&mut self) {
        if self.pipeline_ready {
            self.collaborators.media_pipeline.clear().await;
            self.pipeline_ready = false;
        }
        if let Some(element) = &self.element {
            element.assign_src(None);
        }
    }

    async fn select_parser(&mut self) -> Result<()> {
        self.promote_load();
        let active = self.active_load()?;
        let source = active.request.source().clone();
        let mime_type = active.request.mime_type().map(String::from);
        let network = active.network.clone();

        let uri = resolve_uri(self.collaborators.ads.as_ref(), &source, &network).await?;
        let parser = self
            .collaborators
            .parsers
            .find(&uri, mime_type.as_deref())
            .ok_or_else(|| Error::NoManifestParser { uri: uri.clone() })?;

        debug!(uri = %uri, "Manifest parser selected");
        let active = self.active_load()?;
        active.uri = Some(uri);
        active.parser = Some(parser);
        Ok(())
    }

    async fn fetch_manifest(&mut self) -> Result<()> {
        let active = self.active_load()?;
        let parser = active
            .parser
            .clone()
            .ok_or_else(|| Error::Internal("no manifest parser selected".into()))?;
        let uri = active.uri.clone().unwrap_or_default();
        let network = active.network.clone();
        let retry = self.config.manifest_retry.clone();

        let (parser, uri, network) = (&*parser, uri.as_str(), &network);
        let manifest = with_retry(&retry, "manifest", move |attempt| {
            debug!(uri, attempt, "Fetching manifest");
            parser.start(uri, network)
        })
        .await?;

        info!(
            uri,
            is_live = manifest.is_live,
            variants = manifest.variant_count,
            "Manifest parsed"
        );
        self.active_load()?.manifest = Some(manifest);
        Ok(())
    }

    async fn init_drm(&mut self) -> Result<()> {
        let active = self.active_load()?;
        let manifest = active
            .manifest
            .clone()
            .ok_or_else(|| Error::Internal("no manifest to protect".into()))?;
        let settings = active.request.drm_settings().clone();
        let network = active.network.clone();
        let drm = self.collaborators.drm.clone();
        let retry = self.config.drm_retry.clone();

        let (drm, manifest, settings, network) = (&*drm, &manifest, &settings, &network);
        with_retry(&retry, "drm", move |_| drm.init(manifest, settings, network)).await
    }

    async fn start_pipeline(&mut self) -> Result<()> {
        let active = self.active_load()?;
        let manifest = active
            .manifest
            .clone()
            .ok_or_else(|| Error::Internal("no manifest to play".into()))?;
        let start_time = active.request.start_time();
        self.collaborators
            .media_pipeline
            .start(&manifest, start_time)
            .await
    }

    async fn assign_src(&mut self) -> Result<()> {
        self.promote_load();
        let element = self.element.clone().ok_or(Error::NotAttached)?;
        let active = self.active_load()?;
        let source = active.request.source().clone();
        let network = active.network.clone();

        let uri = resolve_uri(self.collaborators.ads.as_ref(), &source, &network).await?;
        element.assign_src(Some(uri.clone()));
        debug!(uri = %uri, "Source assigned directly");
        self.active_load()?.uri = Some(uri);
        Ok(())
    }

    /// Release load resources. Never fails; safe with nothing to release.
    async fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(parser) = &active.parser {
                parser.stop().await;
            }
            if active.manifest.is_some() {
                self.collaborators.drm.destroy().await;
            }
            debug!(session = %active.network.context().session_id(), "Load released");
        }
        if self.pipeline_ready {
            self.collaborators.media_pipeline.clear().await;
            self.pipeline_ready = false;
        }
        if let Some(element) = &self.element {
            element.assign_src(None);
        }
    }

    async fn release_element(&mut self) {
        if self.pipeline_ready {
            self.collaborators.media_pipeline.clear().await;
            self.pipeline_ready = false;
        }
        if let Some(element) = self.element.take() {
            element.assign_src(None);
            debug!(element = element.label(), "Element released");
        }
        self.default_element = None;
    }

    fn promote_load(&mut self) {
        if let Some(load) = self.loading.take() {
            self.active = Some(load);
        }
    }

    fn active_load(&mut self) -> Result<&mut ActiveLoad> {
        self.active
            .as_mut()
            .ok_or_else(|| Error::Internal("no load in progress".into()))
    }
}

async fn resolve_uri(
    ads: Option<&Arc<dyn AdResolver>>,
    source: &LoadSource,
    network: &NetworkSession,
) -> Result<String> {
    if let Some(uri) = source.direct_uri() {
        return Ok(uri.to_string());
    }
    let ads = ads.ok_or_else(|| Error::AdResolution("no ad resolver configured".into()))?;
    let uri = ads.resolve(source, network).await?;
    info!(uri = %uri, "Ad stream resolved");
    Ok(uri)
}
