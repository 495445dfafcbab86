mod camera;
mod routes;
mod server;
mod telemetry;
mod tracking;

pub mod app;
pub mod config;
pub mod display;
pub mod frame;
pub mod gate;
pub mod income;
pub mod pipeline;
pub mod publisher;
pub mod selection;
pub mod serializer;

#[cfg(test)]
mod testing;

pub use app::start_app;
