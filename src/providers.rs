pub mod base;
pub mod configs;
pub mod converse;
pub mod fallback;

#[cfg(test)]
pub mod mock;
