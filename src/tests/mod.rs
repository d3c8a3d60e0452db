mod geocode_tests;
pub mod utils;
