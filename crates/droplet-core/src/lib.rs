pub mod camera;
pub mod config;
pub mod consts;
pub mod controller;
pub mod detection;
pub mod error;
pub mod filters;
pub mod frame;
pub mod histogram;
pub mod io;
pub mod profile;
pub mod ring_buffer;
