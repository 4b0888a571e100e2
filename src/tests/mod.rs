#[cfg(test)]
pub mod common;

mod cache_and_dedup;
