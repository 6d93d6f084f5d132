pub mod cloud_cover;
pub mod ephemeris;
pub mod geodesy;
pub mod journey_simulator;
