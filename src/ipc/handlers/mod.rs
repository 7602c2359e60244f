pub mod backup;
pub mod core;
pub mod elements;
pub mod responses;
pub mod results;
pub mod sessions;
pub mod storage;
