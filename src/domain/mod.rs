pub mod listing;
pub mod table;

pub use listing::{RawListing, RawValue, DATE_PARSED, OFFER_ID};
pub use table::{Table, Value};
