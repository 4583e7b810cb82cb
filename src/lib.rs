pub mod analysis;
pub mod capture;
pub mod companion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod journal;
pub mod paths;
pub mod presentation;
pub mod scan;
pub mod service;
