//! Location subsystem for CalorieQuest.
//!
//! Resolves the user's position through a tiered fallback chain (device,
//! IP lookup, built-in default), enriches device fixes with a place name,
//! and publishes the result as a watchable snapshot.

pub mod device;
pub mod providers;
pub mod resolver;
pub mod types;

pub use device::{DeviceLocator, FixedLocator, GpsdLocator, NoDevice};
pub use providers::{default_location, IpLookup, ReverseGeocoder};
pub use resolver::{LocationResolver, LogNotifier, Notifier};
pub use types::{
    format_coords, Coordinates, DeviceError, LocationError, LocationSnapshot, LocationSource,
    Phase, Place, ResolutionStatus, ResolvedLocation,
};
