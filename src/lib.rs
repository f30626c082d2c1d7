pub mod audio;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod model;
pub mod queue;
pub mod recommend;
pub mod session;
pub mod sleep_timer;
pub mod storage;
pub mod usage;
