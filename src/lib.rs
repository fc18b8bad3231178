pub mod article;
pub mod arxiv;
pub mod config;
pub mod detex;
pub mod retry;
pub mod slack;
pub mod translate;
