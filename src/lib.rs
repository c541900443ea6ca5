pub mod app;
pub mod atlas;
pub mod building;
pub mod camera3d;
pub mod city;
pub mod cli;
pub mod config;
pub mod effects;
pub mod events;
pub mod input;
pub mod instancing;
pub mod layout;
pub mod lod;
pub mod picking;
pub mod renderer;
pub mod rise;
pub mod spatial;
pub mod time;

pub use app::{run, run_with_overrides, App};
