mod collector;
mod orchestrator;

pub use collector::ResultCollector;
pub use orchestrator::{FetchOrchestrator, FetchReport};
