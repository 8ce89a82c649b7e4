pub mod error;
pub mod packet;
pub mod sequence;
pub mod health;
pub mod calibration;
pub mod kalman;
pub mod integration;
pub mod conditioning;
pub mod spectrum;
pub mod metrics;
pub mod status;
pub mod config;
pub mod pipeline;
pub mod traits;
pub mod net;
pub mod simulator;
pub mod controller;
