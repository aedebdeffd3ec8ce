pub mod config;
pub mod discovery;
pub mod extractor;
pub mod fetcher;
pub mod output;
pub mod patterns;
pub mod pipeline;
