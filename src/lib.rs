// src/lib.rs

pub mod board;
pub mod engine;
pub mod moves;
pub mod net;
pub mod rules;
