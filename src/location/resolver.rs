//! Location resolver: orchestrates the fallback chain.
//!
//! Device (high accuracy) → device (low accuracy) → IP API → built-in default.
//! Device fixes are enriched with a place name by reverse geocoding.
//!
//! The chain is an explicit [`Stage`] machine: [`transition`] is pure, and
//! the resolver performs the effect of each stage and feeds the outcome back
//! as an [`Event`]. Each attempt gets an id under the snapshot's write lock,
//! and only the latest attempt may commit.

use super::device::{DeviceLocator, FixedLocator, GpsdLocator, NoDevice};
use super::providers::{self, IpApiLookup, IpLookup, NominatimGeocoder, ReverseGeocoder};
use super::types::{
    Coordinates, DeviceError, LocationError, LocationSnapshot, LocationSource, Phase, Place,
    PositionRequest, ResolutionStatus, ResolvedLocation,
};
use crate::config::{Config, DeviceConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Extra time granted to a device backend past its own request timeout.
const DEVICE_GRACE: Duration = Duration::from_secs(1);

/// User-visible notification sink (toast, banner, stderr line).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that only logs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "calorie_quest::notice", "{}", message);
    }
}

/// Terminal outcome of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub location: ResolvedLocation,
    pub source: LocationSource,
    pub using_fallback: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Idle,
    HighAccuracy,
    /// Carries the high-accuracy failure, which is what the user hears about.
    LowAccuracy { first_error: DeviceError },
    IpLookup { device_error: Option<DeviceError> },
    Enrichment { coords: Coordinates, source: LocationSource },
    DefaultLocation { device_error: Option<DeviceError> },
    Resolved(Resolution),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start { device_available: bool },
    DeviceFix(Coordinates),
    DeviceFailed(DeviceError),
    IpLocated(ResolvedLocation),
    IpFailed,
    Enriched(Option<Place>),
    DefaultAdopted,
}

/// Advance the chain by one step.
pub fn transition(stage: Stage, event: Event) -> Stage {
    match (stage, event) {
        (Stage::Idle, Event::Start { device_available: false }) => {
            Stage::IpLookup { device_error: None }
        }
        (Stage::Idle, Event::Start { device_available: true }) => Stage::HighAccuracy,

        (Stage::HighAccuracy, Event::DeviceFix(coords)) => Stage::Enrichment {
            coords,
            source: LocationSource::DeviceHigh,
        },
        // A lower accuracy request cannot change a permission decision.
        (Stage::HighAccuracy, Event::DeviceFailed(DeviceError::PermissionDenied)) => {
            Stage::IpLookup { device_error: Some(DeviceError::PermissionDenied) }
        }
        (Stage::HighAccuracy, Event::DeviceFailed(first_error)) => {
            Stage::LowAccuracy { first_error }
        }

        (Stage::LowAccuracy { .. }, Event::DeviceFix(coords)) => Stage::Enrichment {
            coords,
            source: LocationSource::DeviceLow,
        },
        (Stage::LowAccuracy { first_error }, Event::DeviceFailed(_)) => {
            Stage::IpLookup { device_error: Some(first_error) }
        }

        (Stage::Enrichment { coords, source }, Event::Enriched(place)) => {
            let location = match place {
                Some(place) => ResolvedLocation::with_place(coords, place),
                None => ResolvedLocation::bare(coords),
            };
            Stage::Resolved(Resolution {
                location,
                source,
                using_fallback: false,
                error_message: None,
            })
        }

        (Stage::IpLookup { .. }, Event::IpLocated(location)) => Stage::Resolved(Resolution {
            location,
            source: LocationSource::IpLookup,
            using_fallback: false,
            error_message: None,
        }),
        (Stage::IpLookup { device_error }, Event::IpFailed) => {
            Stage::DefaultLocation { device_error }
        }

        (Stage::DefaultLocation { device_error }, Event::DefaultAdopted) => {
            Stage::Resolved(Resolution {
                location: providers::default_location(),
                source: LocationSource::Default,
                using_fallback: true,
                error_message: Some(fallback_message(device_error)),
            })
        }

        (resolved @ Stage::Resolved(_), _) => resolved,
        (stage, event) => {
            warn!(?stage, ?event, "unexpected location event, using default location");
            Stage::DefaultLocation { device_error: None }
        }
    }
}

fn fallback_message(device_error: Option<DeviceError>) -> String {
    match device_error {
        Some(err) => format!("{} Using default location.", err),
        None => "Could not determine your location. Using default location.".to_string(),
    }
}

/// The location resolver with its fallback pipeline.
pub struct LocationResolver {
    device: Arc<dyn DeviceLocator>,
    ip_lookup: Arc<dyn IpLookup>,
    geocoder: Arc<dyn ReverseGeocoder>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<LocationSnapshot>,
}

impl LocationResolver {
    pub fn new(
        device: Arc<dyn DeviceLocator>,
        ip_lookup: Arc<dyn IpLookup>,
        geocoder: Arc<dyn ReverseGeocoder>,
    ) -> Self {
        let (state, _) = watch::channel(LocationSnapshot::default());
        Self {
            device,
            ip_lookup,
            geocoder,
            notifier: Arc::new(LogNotifier),
            state,
        }
    }

    /// Build the production resolver from configuration.
    pub fn from_config(config: &Config) -> Self {
        let device: Arc<dyn DeviceLocator> = match &config.device {
            DeviceConfig::Gpsd { addr } => Arc::new(GpsdLocator::new(addr.clone())),
            DeviceConfig::Fixed { latitude, longitude } => {
                Arc::new(FixedLocator::new(Coordinates::new(*latitude, *longitude)))
            }
            DeviceConfig::Disabled => Arc::new(NoDevice),
        };
        let services = &config.services;
        let agent = providers::http_agent(
            &services.user_agent,
            Duration::from_secs(services.http_timeout_secs),
        );
        Self::new(
            device,
            Arc::new(IpApiLookup::new(agent.clone(), services.ip_lookup_url.clone())),
            Arc::new(NominatimGeocoder::new(agent, services.reverse_geocode_url.clone())),
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LocationSnapshot {
        self.state.borrow().clone()
    }

    /// Start an attempt in the background. The snapshot is already pending
    /// when this returns.
    pub fn resolve(self: &Arc<Self>) {
        let attempt = self.begin();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.finish(attempt).await;
        });
    }

    /// Start a fresh attempt, superseding any pending one.
    pub fn retry(self: &Arc<Self>) {
        self.resolve();
    }

    /// Run one attempt to completion and return the snapshot afterwards.
    ///
    /// The returned snapshot belongs to a newer attempt if one started
    /// meanwhile.
    pub async fn resolve_now(&self) -> LocationSnapshot {
        let attempt = self.begin();
        self.finish(attempt).await;
        self.snapshot()
    }

    async fn finish(&self, attempt: u64) {
        info!(attempt, "resolving location");
        let resolution = self.run_attempt().await;
        self.commit(attempt, resolution);
    }

    fn begin(&self) -> u64 {
        let mut attempt = 0;
        self.state.send_modify(|snap| {
            snap.attempt += 1;
            snap.status = ResolutionStatus::pending();
            snap.source = None;
            attempt = snap.attempt;
        });
        attempt
    }

    fn commit(&self, attempt: u64, resolution: Resolution) {
        let notice = if resolution.using_fallback {
            resolution.error_message.clone()
        } else {
            None
        };
        let source = resolution.source;

        let committed = self.state.send_if_modified(|snap| {
            if snap.attempt != attempt {
                return false;
            }
            snap.location = Some(resolution.location);
            snap.source = Some(resolution.source);
            snap.status = ResolutionStatus {
                phase: Phase::Resolved,
                using_fallback: resolution.using_fallback,
                error_message: resolution.error_message,
            };
            true
        });

        if !committed {
            debug!(attempt, "discarding result of superseded attempt");
            return;
        }
        info!(attempt, %source, "location resolved");
        if let Some(message) = notice {
            self.notifier.notify(&message);
        }
    }

    async fn run_attempt(&self) -> Resolution {
        let mut stage = Stage::Idle;
        loop {
            stage = match stage {
                Stage::Resolved(resolution) => return resolution,
                current => {
                    let event = self.perform(&current).await;
                    transition(current, event)
                }
            };
        }
    }

    async fn perform(&self, stage: &Stage) -> Event {
        match stage {
            Stage::Idle => {
                let device_available = self.device.is_available().await;
                if !device_available {
                    info!("{}", LocationError::CapabilityUnavailable);
                }
                Event::Start { device_available }
            }
            Stage::HighAccuracy => self.request_position(PositionRequest::HIGH_ACCURACY).await,
            Stage::LowAccuracy { .. } => {
                self.request_position(PositionRequest::LOW_ACCURACY).await
            }
            Stage::IpLookup { .. } => match self.ip_lookup.locate().await {
                Ok(location) => Event::IpLocated(location),
                Err(e) => {
                    info!("IP geolocation failed: {}", e);
                    Event::IpFailed
                }
            },
            Stage::Enrichment { coords, .. } => match self.geocoder.reverse(*coords).await {
                Ok(place) => Event::Enriched(Some(place)),
                Err(e) => {
                    info!("reverse geocoding failed, keeping bare coordinates: {}", e);
                    Event::Enriched(None)
                }
            },
            Stage::DefaultLocation { .. } => Event::DefaultAdopted,
            Stage::Resolved(_) => unreachable!("resolved stage has no effect"),
        }
    }

    async fn request_position(&self, request: PositionRequest) -> Event {
        let deadline = request.timeout + DEVICE_GRACE;
        let result = tokio::time::timeout(deadline, self.device.current_position(request))
            .await
            .unwrap_or(Err(DeviceError::Timeout));

        match result {
            Ok(coords) if coords.is_valid() => Event::DeviceFix(coords),
            Ok(coords) => {
                warn!(?coords, "device returned an invalid position");
                Event::DeviceFailed(DeviceError::PositionUnavailable)
            }
            Err(e) => {
                info!(accuracy = ?request.accuracy, "{}", LocationError::from(e));
                Event::DeviceFailed(e)
            }
        }
    }
}
