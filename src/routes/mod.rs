pub mod journey_routes;
