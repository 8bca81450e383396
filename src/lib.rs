pub mod climatology;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod output;
pub mod parser;
pub mod runner;
pub mod sites;
pub mod stats;
pub mod survey;
