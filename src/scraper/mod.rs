pub mod extractor;
pub mod fetcher;
pub mod proxies;
pub mod scraper_error;
pub mod selectors;

pub use extractor::{Extract, Extractor};
pub use fetcher::Fetcher;
pub use proxies::refresh_proxies;
pub use scraper_error::{FetchFailure, ScraperError};
