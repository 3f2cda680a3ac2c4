//! Device geolocation backends.
//!
//! The resolver only sees [`DeviceLocator`]. A gpsd daemon is the real
//! device; a fixed coordinate stands in for a user-entered position; and
//! [`NoDevice`] models a host without any geolocation capability.

use super::types::{Accuracy, Coordinates, DeviceError, PositionRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// How long the availability check waits for gpsd to accept a connection.
const AVAILABILITY_TIMEOUT: Duration = Duration::from_millis(500);

/// A source of device position fixes.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    /// Whether this host exposes a geolocation capability at all.
    async fn is_available(&self) -> bool;

    async fn current_position(&self, request: PositionRequest) -> Result<Coordinates, DeviceError>;
}

/// No geolocation capability.
pub struct NoDevice;

#[async_trait]
impl DeviceLocator for NoDevice {
    async fn is_available(&self) -> bool {
        false
    }

    async fn current_position(
        &self,
        _request: PositionRequest,
    ) -> Result<Coordinates, DeviceError> {
        Err(DeviceError::PositionUnavailable)
    }
}

/// A position the user configured by hand.
pub struct FixedLocator {
    coords: Coordinates,
}

impl FixedLocator {
    pub fn new(coords: Coordinates) -> Self {
        Self { coords }
    }
}

#[async_trait]
impl DeviceLocator for FixedLocator {
    async fn is_available(&self) -> bool {
        true
    }

    async fn current_position(
        &self,
        _request: PositionRequest,
    ) -> Result<Coordinates, DeviceError> {
        if self.coords.is_valid() {
            Ok(self.coords)
        } else {
            Err(DeviceError::PositionUnavailable)
        }
    }
}

// ─── gpsd ───────────────────────────────────────────────────────

/// One JSON report from gpsd. Only TPV reports carry a position.
#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    time: Option<DateTime<Utc>>,
}

/// Reads fixes from a gpsd daemon over its JSON socket protocol.
pub struct GpsdLocator {
    addr: String,
}

impl GpsdLocator {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn read_fix(
        &self,
        request: PositionRequest,
        started: DateTime<Utc>,
    ) -> Result<Coordinates, DeviceError> {
        let stream = TcpStream::connect(&self.addr).await.map_err(device_error)?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(WATCH_COMMAND).await.map_err(device_error)?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await.map_err(device_error)? {
            let report: GpsdReport = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    trace!("skipping gpsd line: {}", e);
                    continue;
                }
            };
            if let Some(coords) = accept_fix(&report, request, started) {
                return Ok(coords);
            }
        }

        debug!("gpsd at {} closed the stream without a usable fix", self.addr);
        Err(DeviceError::PositionUnavailable)
    }
}

#[async_trait]
impl DeviceLocator for GpsdLocator {
    /// gpsd counts as present when its socket accepts connections. A
    /// permission error still means a device exists; the position request
    /// reports the denial.
    async fn is_available(&self) -> bool {
        match tokio::time::timeout(AVAILABILITY_TIMEOUT, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) if e.kind() == io::ErrorKind::PermissionDenied => true,
            Ok(Err(e)) => {
                debug!("gpsd at {} not reachable: {}", self.addr, e);
                false
            }
            Err(_) => {
                debug!("gpsd at {} did not accept within {:?}", self.addr, AVAILABILITY_TIMEOUT);
                false
            }
        }
    }

    async fn current_position(&self, request: PositionRequest) -> Result<Coordinates, DeviceError> {
        let started = Utc::now();
        match tokio::time::timeout(request.timeout, self.read_fix(request, started)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout),
        }
    }
}

fn device_error(err: io::Error) -> DeviceError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
        io::ErrorKind::TimedOut => DeviceError::Timeout,
        _ => DeviceError::PositionUnavailable,
    }
}

/// gpsd mode: 2 = 2D fix, 3 = 3D fix.
fn required_mode(accuracy: Accuracy) -> u8 {
    match accuracy {
        Accuracy::High => 3,
        Accuracy::Low => 2,
    }
}

fn accept_fix(
    report: &GpsdReport,
    request: PositionRequest,
    started: DateTime<Utc>,
) -> Option<Coordinates> {
    if report.class != "TPV" || report.mode < required_mode(request.accuracy) {
        return None;
    }
    let coords = Coordinates::new(report.lat?, report.lon?);
    if !coords.is_valid() {
        return None;
    }

    // Reports without a timestamp are live; timestamped ones must be recent enough.
    if let Some(time) = report.time {
        let max_age =
            chrono::Duration::from_std(request.max_age).unwrap_or(chrono::Duration::zero());
        if time < started - max_age {
            return None;
        }
    }
    Some(coords)
}
