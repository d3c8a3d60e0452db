pub mod cache;
pub mod geocoder;

pub use cache::AddressResolver;
pub use geocoder::{ArcGisGeocoder, Coordinates, Geocoder};
