//! Network location providers: IP geolocation, Nominatim reverse geocoding,
//! and the built-in default location.

use super::types::{Coordinates, LocationError, Place, ResolvedLocation};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_IP_LOOKUP_URL: &str = "https://ipapi.co/json/";
pub const DEFAULT_REVERSE_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_USER_AGENT: &str = "CalorieQuest/1.0";

// ─── Default location ───────────────────────────────────────────

const DEFAULT_LATITUDE: f64 = 34.052235;
const DEFAULT_LONGITUDE: f64 = -118.243683;
const DEFAULT_CITY: &str = "Los Angeles";
const DEFAULT_COUNTRY: &str = "USA";

/// The last-resort location (Los Angeles).
pub fn default_location() -> ResolvedLocation {
    ResolvedLocation {
        latitude: DEFAULT_LATITUDE,
        longitude: DEFAULT_LONGITUDE,
        city: Some(DEFAULT_CITY.to_string()),
        country: Some(DEFAULT_COUNTRY.to_string()),
    }
}

// ─── Capabilities ───────────────────────────────────────────────

/// Coarse location from the caller's public IP.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn locate(&self) -> Result<ResolvedLocation, LocationError>;
}

/// Place name for a coordinate.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coords: Coordinates) -> Result<Place, LocationError>;
}

/// Build the shared blocking HTTP agent. The user agent identifies us to
/// Nominatim, which rejects anonymous clients.
pub fn http_agent(user_agent: &str, timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

fn network_error(err: ureq::Error) -> LocationError {
    match err {
        ureq::Error::Status(code, _) => LocationError::Network(format!("HTTP {}", code)),
        ureq::Error::Transport(t) => LocationError::Network(t.to_string()),
    }
}

/// Run a blocking ureq call on tokio's blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, LocationError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LocationError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LocationError::Network(format!("lookup task failed: {}", e)))?
}

// ─── IP-based geolocation ───────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResult {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    country_name: Option<String>,
}

/// IP geolocation against ipapi.co (or a compatible endpoint).
pub struct IpApiLookup {
    agent: ureq::Agent,
    url: String,
}

impl IpApiLookup {
    pub fn new(agent: ureq::Agent, url: impl Into<String>) -> Self {
        Self { agent, url: url.into() }
    }
}

#[async_trait]
impl IpLookup for IpApiLookup {
    async fn locate(&self) -> Result<ResolvedLocation, LocationError> {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let result: IpApiResult = blocking(move || {
            agent
                .get(&url)
                .call()
                .map_err(network_error)?
                .into_json::<IpApiResult>()
                .map_err(|e| LocationError::InvalidResponse(e.to_string()))
        })
        .await?;
        location_from_ip(result)
    }
}

fn location_from_ip(r: IpApiResult) -> Result<ResolvedLocation, LocationError> {
    if r.error {
        return Err(LocationError::InvalidResponse(
            r.reason.unwrap_or_else(|| "lookup refused".into()),
        ));
    }
    let lat = r.latitude.ok_or_else(|| LocationError::InvalidResponse("no latitude".into()))?;
    let lon = r.longitude.ok_or_else(|| LocationError::InvalidResponse("no longitude".into()))?;
    if !Coordinates::new(lat, lon).is_valid() {
        return Err(LocationError::InvalidResponse(format!(
            "coordinates out of range: {}, {}",
            lat, lon
        )));
    }

    Ok(ResolvedLocation {
        latitude: lat,
        longitude: lon,
        city: r.city.filter(|s| !s.is_empty()),
        country: r.country_name.filter(|s| !s.is_empty()),
    })
}

// ─── Nominatim reverse geocoding ────────────────────────────────

#[derive(Deserialize, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
    country: Option<String>,
}

#[derive(Deserialize)]
struct NominatimReverse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

/// Reverse geocoding via OpenStreetMap Nominatim.
pub struct NominatimGeocoder {
    agent: ureq::Agent,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(agent: ureq::Agent, url: impl Into<String>) -> Self {
        Self { agent, url: url.into() }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coords: Coordinates) -> Result<Place, LocationError> {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let result: NominatimReverse = blocking(move || {
            agent
                .get(&url)
                .query("format", "json")
                .query("lat", &coords.latitude.to_string())
                .query("lon", &coords.longitude.to_string())
                .call()
                .map_err(network_error)?
                .into_json::<NominatimReverse>()
                .map_err(|e| LocationError::InvalidResponse(e.to_string()))
        })
        .await?;
        let place = place_from_reverse(result)?;
        debug!(?place, "reverse geocoded {}, {}", coords.latitude, coords.longitude);
        Ok(place)
    }
}

fn place_from_reverse(r: NominatimReverse) -> Result<Place, LocationError> {
    if let Some(msg) = r.error {
        return Err(LocationError::InvalidResponse(msg));
    }
    let addr = r.address.unwrap_or_default();
    Ok(Place {
        city: addr.city.or(addr.town).or(addr.village).or(addr.suburb),
        country: addr.country,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn ip(json: &str) -> IpApiResult {
        serde_json::from_str(json).unwrap()
    }

    fn reverse(json: &str) -> NominatimReverse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_default_location_is_los_angeles() {
        let loc = default_location();
        assert_eq!(loc.city.as_deref(), Some("Los Angeles"));
        assert_eq!(loc.country.as_deref(), Some("USA"));
        assert!(loc.coordinates().is_valid());
    }

    #[test]
    fn test_ip_result_parsed() {
        let loc = location_from_ip(ip(
            r#"{"ip":"1.2.3.4","latitude":10.0,"longitude":20.0,"city":"X","country_name":"Y"}"#,
        ))
        .unwrap();
        assert_eq!(
            loc,
            ResolvedLocation {
                latitude: 10.0,
                longitude: 20.0,
                city: Some("X".into()),
                country: Some("Y".into()),
            }
        );
    }

    #[test]
    fn test_ip_error_body_rejected() {
        let err = location_from_ip(ip(r#"{"error":true,"reason":"RateLimited"}"#)).unwrap_err();
        assert_eq!(err, LocationError::InvalidResponse("RateLimited".into()));
    }

    #[test]
    fn test_ip_missing_coordinates_rejected() {
        assert!(location_from_ip(ip(r#"{"city":"X"}"#)).is_err());
        assert!(location_from_ip(ip(r#"{"latitude":100.0,"longitude":0.0}"#)).is_err());
    }

    #[test]
    fn test_reverse_prefers_city_then_town() {
        let place = place_from_reverse(reverse(
            r#"{"address":{"town":"Smallville","village":"V","country":"USA"}}"#,
        ))
        .unwrap();
        assert_eq!(place.city.as_deref(), Some("Smallville"));
        assert_eq!(place.country.as_deref(), Some("USA"));

        let place = place_from_reverse(reverse(
            r#"{"address":{"city":"Los Angeles","suburb":"Echo Park","country":"USA"}}"#,
        ))
        .unwrap();
        assert_eq!(place.city.as_deref(), Some("Los Angeles"));
    }

    #[test]
    fn test_reverse_tolerates_partial_address() {
        let place = place_from_reverse(reverse(r#"{"address":{"suburb":"Echo Park"}}"#)).unwrap();
        assert_eq!(place.city.as_deref(), Some("Echo Park"));
        assert_eq!(place.country, None);

        let place = place_from_reverse(reverse(r#"{"place_id":1}"#)).unwrap();
        assert_eq!(place, Place::default());
    }

    #[test]
    fn test_reverse_error_body_is_failure() {
        assert!(place_from_reverse(reverse(r#"{"error":"Unable to geocode"}"#)).is_err());
    }

    /// Answer a single HTTP request and hand back the raw request head.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base, handle)
    }

    fn agent() -> ureq::Agent {
        http_agent(DEFAULT_USER_AGENT, Duration::from_secs(5))
    }

    fn sends_user_agent(request: &str) -> bool {
        request
            .lines()
            .any(|line| line.eq_ignore_ascii_case("user-agent: CalorieQuest/1.0"))
    }

    #[tokio::test]
    async fn test_geocoder_identifies_itself() {
        let body = r#"{"address":{"city":"Boston","country":"United States"}}"#;
        let (base, server) = serve_once("200 OK", body).await;
        let geocoder = NominatimGeocoder::new(agent(), format!("{}/reverse", base));

        let place = geocoder.reverse(Coordinates::new(42.36, -71.06)).await.unwrap();
        assert_eq!(place.city.as_deref(), Some("Boston"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /reverse?format=json&lat=42.36&lon=-71.06 HTTP/1.1"));
        assert!(sends_user_agent(&request));
    }

    #[tokio::test]
    async fn test_geocoder_server_error_is_failure() {
        let (base, server) = serve_once("503 Service Unavailable", "").await;
        let geocoder = NominatimGeocoder::new(agent(), format!("{}/reverse", base));

        let err = geocoder.reverse(Coordinates::new(40.0, -70.0)).await.unwrap_err();
        assert_eq!(err, LocationError::Network("HTTP 503".into()));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /reverse?format=json&lat=40&lon=-70 HTTP/1.1"));
        assert!(sends_user_agent(&request));
    }

    #[tokio::test]
    async fn test_ip_lookup_over_http() {
        let body = r#"{"latitude":10.0,"longitude":20.0,"city":"X","country_name":"Y"}"#;
        let (base, server) = serve_once("200 OK", body).await;
        let lookup = IpApiLookup::new(agent(), format!("{}/json/", base));

        let loc = lookup.locate().await.unwrap();
        assert_eq!(loc.coordinates(), Coordinates::new(10.0, 20.0));
        assert_eq!(loc.city.as_deref(), Some("X"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /json/ HTTP/1.1"));
        assert!(sends_user_agent(&request));
    }

    #[tokio::test]
    async fn test_ip_lookup_server_error_is_failure() {
        let (base, server) = serve_once("503 Service Unavailable", "").await;
        let lookup = IpApiLookup::new(agent(), format!("{}/json/", base));

        let err = lookup.locate().await.unwrap_err();
        assert_eq!(err, LocationError::Network("HTTP 503".into()));
        server.await.unwrap();
    }
}
