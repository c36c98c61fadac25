pub mod columns;
pub mod coordinator;
pub mod cursor;
pub mod export;
pub mod extractor;
pub mod materializer;
pub mod normalizer;
pub mod outcome;
pub mod pacing;
