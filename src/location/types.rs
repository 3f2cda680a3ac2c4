//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A bare coordinate pair in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Finite and inside the lat/lon ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Which tier produced the coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    DeviceHigh,
    DeviceLow,
    IpLookup,
    Default,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceHigh => write!(f, "Device (high accuracy)"),
            Self::DeviceLow => write!(f, "Device (low accuracy)"),
            Self::IpLookup => write!(f, "IP"),
            Self::Default => write!(f, "Default"),
        }
    }
}

/// The resolver's output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl ResolvedLocation {
    /// Coordinates only, no enrichment.
    pub fn bare(coords: Coordinates) -> Self {
        Self {
            latitude: coords.latitude,
            longitude: coords.longitude,
            city: None,
            country: None,
        }
    }

    pub fn with_place(coords: Coordinates, place: Place) -> Self {
        Self {
            latitude: coords.latitude,
            longitude: coords.longitude,
            city: place.city,
            country: place.country,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn display_line(&self) -> String {
        let place = match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (Some(city), None) => city.clone(),
            (None, Some(country)) => country.clone(),
            (None, None) => "Unknown place".to_string(),
        };
        format!(
            "\u{1F4CD} {}\n  \u{1F4D0} {}",
            place,
            format_coords(self.latitude, self.longitude)
        )
    }
}

/// Human-readable place name attached by reverse geocoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Place {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Format coordinates as `34.0522°N, 118.2437°W`.
pub fn format_coords(lat: f64, lon: f64) -> String {
    let ns = if lat >= 0.0 { 'N' } else { 'S' };
    let ew = if lon >= 0.0 { 'E' } else { 'W' };
    format!("{:.4}\u{00B0}{}, {:.4}\u{00B0}{}", lat.abs(), ns, lon.abs(), ew)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pending,
    Resolved,
}

/// How the current resolution attempt is progressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStatus {
    pub phase: Phase,
    pub using_fallback: bool,
    pub error_message: Option<String>,
}

impl ResolutionStatus {
    pub fn pending() -> Self {
        Self {
            phase: Phase::Pending,
            using_fallback: false,
            error_message: None,
        }
    }
}

/// The reactive value published to consumers.
///
/// `location` keeps the previous attempt's value while a new attempt is pending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSnapshot {
    pub location: Option<ResolvedLocation>,
    pub status: ResolutionStatus,
    pub source: Option<LocationSource>,
    pub attempt: u64,
}

impl Default for LocationSnapshot {
    fn default() -> Self {
        Self {
            location: None,
            status: ResolutionStatus::pending(),
            source: None,
            attempt: 0,
        }
    }
}

impl LocationSnapshot {
    pub fn loading(&self) -> bool {
        self.status.phase == Phase::Pending
    }

    pub fn error(&self) -> Option<&str> {
        self.status.error_message.as_deref()
    }

    pub fn using_fallback(&self) -> bool {
        self.status.using_fallback
    }
}

/// Accuracy mode for a device position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    High,
    Low,
}

/// Parameters for one device position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRequest {
    pub accuracy: Accuracy,
    pub timeout: Duration,
    /// Oldest cached fix that may be returned. Zero means a fresh fix.
    pub max_age: Duration,
}

impl PositionRequest {
    pub const HIGH_ACCURACY: Self = Self {
        accuracy: Accuracy::High,
        timeout: Duration::from_secs(10),
        max_age: Duration::ZERO,
    };

    pub const LOW_ACCURACY: Self = Self {
        accuracy: Accuracy::Low,
        timeout: Duration::from_secs(20),
        max_age: Duration::from_secs(30),
    };
}

/// Why a device position request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Location access denied.")]
    PermissionDenied,
    #[error("Location information is unavailable.")]
    PositionUnavailable,
    #[error("The request to get your location timed out.")]
    Timeout,
}

/// Location resolution errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Geolocation is not supported on this device")]
    CapabilityUnavailable,
    #[error("Device geolocation failed: {0}")]
    Device(#[from] DeviceError),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}
