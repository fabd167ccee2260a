pub mod aggregator;
pub mod artifacts;
pub mod assembler;
pub mod base_model;
pub mod calibration;
pub mod cohorts;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod feature_spec;
pub mod h2h;
pub mod history;
pub mod injury;
pub mod logistic;
pub mod per;
pub mod predict;
pub mod records;
pub mod seasons;
pub mod store;
pub mod synthetic;
