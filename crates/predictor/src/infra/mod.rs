pub mod db;
pub mod weather;

// Synthetic weather only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod weather_mock;
